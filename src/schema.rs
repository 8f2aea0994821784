diesel::table! {
    datasets (id) {
        id -> Int8,
        fqn -> Text,
        connection_name -> Text,
        database_name -> Text,
        schema_name -> Text,
        table_name -> Text,
        source_system -> Text,
        description -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    dataset_columns (id) {
        id -> Int8,
        dataset_id -> Int8,
        name -> Text,
        data_type -> Text,
        description -> Nullable<Text>,
    }
}

diesel::table! {
    lineage (id) {
        id -> Int8,
        upstream_id -> Int8,
        downstream_id -> Int8,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(dataset_columns -> datasets (dataset_id));

diesel::allow_tables_to_appear_in_same_query!(datasets, dataset_columns, lineage,);
