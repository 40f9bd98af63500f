use proptest::prelude::*;

/// Strategy for generating output column names, plain identifiers or names needing quotes
pub fn column_name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z][a-zA-Z0-9_]{0,12}",
        "[a-z]{1,6} [a-z]{1,6}",
    ]
}

/// Strategy for generating distinct column lists
pub fn columns_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(column_name_strategy(), 1..5)
        .prop_map(|columns| columns.into_iter().collect())
}

/// Strategy for generating action statements that bind nothing themselves
pub fn action_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("CREATE null".to_string()),
        Just("SET n.updated = true".to_string()),
        Just("MERGE (m:Marker) ON CREATE SET m.at = timestamp()".to_string()),
        "CREATE \\(:[A-Z][a-z]{1,8}\\)",
    ]
}

/// Strategy for generating (rows, batch size) pairs
pub fn batching_strategy() -> impl Strategy<Value = (i64, usize)> {
    (0i64..200, 1usize..64)
}
