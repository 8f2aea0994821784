use crate::error::RegistryError;

/// Upper bound for any page or search limit, whatever the environment says.
pub const HARD_MAX_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: HARD_MAX_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            default_page_size: 50,
            max_page_size: HARD_MAX_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub pool_size: usize,
}

impl DatabaseConfig {
    /// The URL with any password replaced, for logging.
    pub fn redacted_url(&self) -> String {
        redact_database_url(&self.database_url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub database: DatabaseConfig,
    pub search: SearchConfig,
    pub pagination: PageConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, RegistryError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, RegistryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or_else(|| RegistryError::ConfigError {
            message: "DATABASE_URL environment variable is required".to_string(),
        })?;

        let pool_size = parse_or(&lookup, "DB_POOL_SIZE", 5)?;
        if pool_size == 0 {
            return Err(RegistryError::ConfigError {
                message: "DB_POOL_SIZE must be at least 1".to_string(),
            });
        }

        let search = SearchConfig {
            default_limit: parse_or(&lookup, "SEARCH_DEFAULT_LIMIT", 50)?,
            max_limit: parse_or(&lookup, "SEARCH_MAX_LIMIT", HARD_MAX_LIMIT)?,
        };
        check_limits("SEARCH", search.default_limit, search.max_limit)?;

        let pagination = PageConfig {
            default_page_size: parse_or(&lookup, "DEFAULT_PAGE_SIZE", 50)?,
            max_page_size: parse_or(&lookup, "MAX_PAGE_SIZE", HARD_MAX_LIMIT)?,
        };
        check_limits("PAGE", pagination.default_page_size, pagination.max_page_size)?;

        Ok(Self {
            database: DatabaseConfig {
                database_url,
                pool_size,
            },
            search,
            pagination,
        })
    }
}

fn parse_or<F>(lookup: &F, key: &str, default: usize) -> Result<usize, RegistryError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e| RegistryError::ConfigError {
            message: format!("Invalid {}: '{}' ({})", key, raw, e),
        }),
        None => Ok(default),
    }
}

fn check_limits(prefix: &str, default: usize, max: usize) -> Result<(), RegistryError> {
    if max == 0 || max > HARD_MAX_LIMIT {
        return Err(RegistryError::ConfigError {
            message: format!(
                "{} max limit must be between 1 and {}, got {}",
                prefix, HARD_MAX_LIMIT, max
            ),
        });
    }
    if default == 0 || default > max {
        return Err(RegistryError::ConfigError {
            message: format!(
                "{} default limit must be between 1 and {}, got {}",
                prefix, max, default
            ),
        });
    }
    Ok(())
}

pub fn redact_database_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://").map(|i| i + 3) else {
        return url.to_string();
    };
    let Some(at) = url.rfind('@').filter(|&at| at > scheme_end) else {
        return url.to_string();
    };
    let credentials = &url[scheme_end..at];
    match credentials.find(':') {
        Some(colon) => format!(
            "{}{}:***{}",
            &url[..scheme_end],
            &credentials[..colon],
            &url[at..]
        ),
        None => url.to_string(),
    }
}
