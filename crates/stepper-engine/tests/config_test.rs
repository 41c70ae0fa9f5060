use std::io::Write;
use std::path::PathBuf;
use stepper_engine::config::{ConfigError, ConfigLoader, StepperConfig};
use tempfile::NamedTempFile;

#[test]
fn test_defaults() {
    let config = StepperConfig::default();
    assert_eq!(config.interpreter.wait_for_element_timeout_ms, 5000);
    assert_eq!(config.interpreter.default_quiet_ms, 500);
    assert!(!config.interpreter.stop_on_error);
    assert_eq!(config.observer.poll_interval_ms, 10);
    assert_eq!(config.bridge.response_timeout_ms, None);
    assert_eq!(config.remote.port, 9001);
}

#[tokio::test]
async fn test_partial_file_keeps_other_defaults() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "interpreter:\n  stop_on_error: true\n  wait_for_element_timeout_ms: 1500\nbridge:\n  response_timeout_ms: 60000\nstorage:\n  path: /tmp/stepper-test/store.json"
    )
    .unwrap();

    let config = ConfigLoader::load_from(file.path()).await.unwrap();
    assert!(config.interpreter.stop_on_error);
    assert_eq!(config.interpreter.wait_for_element_timeout_ms, 1500);
    assert_eq!(config.interpreter.element_poll_interval_ms, 250);
    assert_eq!(config.bridge.response_timeout_ms, Some(60000));
    assert_eq!(config.bridge.channel_capacity, 64);
    assert_eq!(
        config.storage.resolved_path(),
        PathBuf::from("/tmp/stepper-test/store.json")
    );
    assert_eq!(config.observer.buffer_capacity, 1000);
}

#[tokio::test]
async fn test_invalid_yaml_is_parse_error() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "interpreter: [not, a, map]").unwrap();
    assert!(matches!(
        ConfigLoader::load_from(file.path()).await,
        Err(ConfigError::Parse(_))
    ));
}

#[tokio::test]
async fn test_missing_file_is_io_error() {
    let result = ConfigLoader::load_from(&PathBuf::from("/definitely/not/here.yaml")).await;
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[test]
fn test_default_store_path_is_under_stepper_dir() {
    let path = StepperConfig::default().storage.resolved_path();
    assert!(path.ends_with("stepper/store.json"));
}

#[tokio::test]
async fn test_first_existing_candidate_wins() {
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("stepper.yaml");
    let home = dir.path().join("config.yaml");
    std::fs::write(&home, "remote:\n  port: 9100\n").unwrap();

    let config = ConfigLoader::load_first(&[local.clone(), home.clone()])
        .await
        .unwrap();
    assert_eq!(config.remote.port, 9100);

    std::fs::write(&local, "remote:\n  port: 9200\n").unwrap();
    let config = ConfigLoader::load_first(&[local, home]).await.unwrap();
    assert_eq!(config.remote.port, 9200);
}

#[tokio::test]
async fn test_no_candidates_and_empty_file_give_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigLoader::load_first(&[dir.path().join("absent.yaml")])
        .await
        .unwrap();
    assert_eq!(config.remote.port, 9001);

    let empty = dir.path().join("empty.yaml");
    std::fs::write(&empty, "\n").unwrap();
    let config = ConfigLoader::load_from(&empty).await.unwrap();
    assert_eq!(config.interpreter.default_quiet_ms, 500);
}

#[test]
fn test_search_paths_start_local() {
    let paths = ConfigLoader::search_paths();
    assert_eq!(paths[0], PathBuf::from("./stepper.yaml"));
}
