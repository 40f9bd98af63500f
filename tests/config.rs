//! Configuration Tests
//!
//! Engine configuration loaded from files and environment variables, and per-call
//! iteration options parsed from caller maps.

use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

use periodic_core::execution::{BatchMode, NeverTerminated};
use periodic_core::test_utils::{rows, MemoryStore};
use periodic_core::{ConfigManager, IterateConfig, Periodic, PeriodicConfig, PeriodicError};

fn options(value: serde_json::Value) -> IterateConfig {
    IterateConfig::from_map(value.as_object().unwrap()).unwrap()
}

#[test]
fn yaml_and_json_files_are_merged() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("periodic.yaml"),
        "pool:\n  worker_threads: 3\nlogging:\n  format: json\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("periodic.staging.json"),
        r#"{"dispatch": {"default_batch_size": 7}}"#,
    )
    .unwrap();

    let manager =
        ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "staging")
            .unwrap();

    assert_eq!(manager.environment(), "staging");
    assert_eq!(manager.config_directory(), dir.path());
    assert_eq!(manager.config().pool.worker_threads, 3);
    assert_eq!(manager.config().dispatch.default_batch_size, 7);
    assert_eq!(manager.config().logging.format, "json");
}

#[test]
fn environment_variables_override_files() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("periodic.toml"),
        "[dispatch]\nretry_backoff_max_ms = 1000\n",
    )
    .unwrap();
    std::env::set_var("PERIODIC__DISPATCH__RETRY_BACKOFF_MAX_MS", "7000");

    let manager =
        ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
            .unwrap();

    assert_eq!(manager.config().dispatch.retry_backoff_max_ms, 7000);
}

#[test]
fn unknown_logging_format_is_rejected() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("periodic.toml"), "[logging]\nformat = \"xml\"\n").unwrap();

    let result =
        ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");
    assert!(matches!(result, Err(PeriodicError::ConfigurationError(_))));
}

#[test]
fn iterate_options_parse_from_a_camel_case_map() {
    let config = options(json!({
        "batchSize": 5,
        "parallel": true,
        "concurrency": 2,
        "retries": 3,
        "batchMode": "single",
        "failedParams": 4,
        "params": {"label": "Person"}
    }));

    assert_eq!(config.batch_mode().unwrap(), BatchMode::Single);
    assert_eq!(config.params["label"], json!("Person"));

    let dispatch = config
        .dispatch_options(&PeriodicConfig::default(), false)
        .unwrap();
    assert_eq!(dispatch.batch_size, 5);
    assert_eq!(dispatch.effective_concurrency(), 2);
    assert_eq!(dispatch.retry.retries, 3);
    assert_eq!(dispatch.failed_params, Some(4));
    assert!(!dispatch.iterate_list);
}

#[test]
fn legacy_iterate_list_flag_selects_the_mode() {
    assert_eq!(
        options(json!({"iterateList": false})).batch_mode().unwrap(),
        BatchMode::Single
    );
    assert_eq!(
        options(json!({"iterateList": false, "batchMode": "BATCH"}))
            .batch_mode()
            .unwrap(),
        BatchMode::Batch
    );
}

#[test]
fn invalid_iterate_options_are_rejected() {
    for invalid in [
        json!({"batchSize": 0}),
        json!({"concurrency": -1}),
        json!({"retries": -2}),
        json!({"batchMode": "SOMETIMES"}),
    ] {
        let err = options(invalid.clone()).validate().unwrap_err();
        assert!(
            matches!(err, PeriodicError::ConfigurationError(_)),
            "{invalid} gave {err:?}"
        );
    }
}

#[tokio::test]
async fn engine_default_batch_size_applies_when_unset() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("periodic.toml"),
        "[pool]\nworker_threads = 2\n\n[dispatch]\ndefault_batch_size = 7\n",
    )
    .unwrap();
    let manager =
        ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
            .unwrap();
    let store = Arc::new(MemoryStore::new().with_rows(&["id"], rows(20)));
    let periodic = Periodic::from_manager(store, &manager).unwrap();

    let result = periodic
        .iterate(
            "MATCH (n) RETURN id(n) AS id",
            "SET n.seen = true",
            &options(json!({})),
            Arc::new(NeverTerminated),
        )
        .await
        .unwrap();

    assert_eq!(result.batches, 3);
    assert_eq!(result.total, 20);
}
