//! Tests for config module

use sightline::config::{expand_tilde, Config, LogFormat};
use sightline::{Error, Rotation};
use sightline_store::RefreshPolicy;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_default_config() {
    let config = Config::default();

    assert_eq!(config.elasticsearch.url, "http://localhost:9200");
    assert_eq!(config.elasticsearch.refresh, RefreshPolicy::WaitFor);
    assert_eq!(config.index.alias, "sightline");
    assert_eq!(config.index.prefix, "sightline_entries");
    assert_eq!(config.index.rotation, Rotation::Daily);
    assert_eq!(config.repository.default_limit, 50);
    assert_eq!(config.repository.occurrence_scan_limit, 1000);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert!(config.validate().is_ok());
}

#[test]
fn test_expand_tilde() {
    let home = dirs::home_dir().unwrap();

    let expanded = expand_tilde(&PathBuf::from("~/logs/sightline.log")).unwrap();
    assert_eq!(expanded, home.join("logs/sightline.log"));

    let expanded = expand_tilde(&PathBuf::from("~")).unwrap();
    assert_eq!(expanded, home);

    let expanded = expand_tilde(&PathBuf::from("relative/path")).unwrap();
    assert_eq!(expanded, PathBuf::from("relative/path"));
}

#[test]
fn test_load_missing_file_gives_defaults() {
    let temp = tempdir().unwrap();
    let config = Config::load_from(&temp.path().join("absent.toml")).unwrap();
    assert_eq!(config.index.alias, "sightline");
    assert!(!temp.path().join("absent.toml").exists());
}

#[test]
fn test_partial_file_keeps_defaults() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[elasticsearch]
url = "https://search.internal:9243"
username = "elastic"
password = "changeme"
refresh = "false"

[index]
alias = "telemetry"
rotation = "none"
shards = 2

[logging]
level = "debug"
format = "json"
file = "~/sightline.log"
"#,
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.elasticsearch.url, "https://search.internal:9243");
    assert_eq!(config.elasticsearch.refresh, RefreshPolicy::False);
    assert_eq!(config.elasticsearch.max_retries, 3);
    assert_eq!(config.index.alias, "telemetry");
    assert_eq!(config.index.prefix, "sightline_entries");
    assert_eq!(config.index.rotation, Rotation::None);
    assert_eq!(config.index.shards, Some(2));
    assert_eq!(config.index.replicas, None);
    assert_eq!(config.repository.occurrence_scan_limit, 1000);
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(
        config.logging.file,
        Some(dirs::home_dir().unwrap().join("sightline.log"))
    );
}

#[test]
fn test_save_and_load() {
    let temp = tempdir().unwrap();
    let config_path = temp.path().join("nested/config.toml");

    let mut config = Config::default();
    config.elasticsearch.url = "http://es:9200".to_string();
    config.index.replicas = Some(0);
    config.repository.default_limit = 25;
    config.logging.level = "sightline=trace".to_string();

    config.save(&config_path).unwrap();
    let loaded = Config::load_from(&config_path).unwrap();

    assert_eq!(loaded.elasticsearch.url, "http://es:9200");
    assert_eq!(loaded.index, config.index);
    assert_eq!(loaded.repository, config.repository);
    assert_eq!(loaded.logging.level, "sightline=trace");
}

#[test]
fn test_load_or_create_writes_defaults() {
    let temp = tempdir().unwrap();
    let config_path = temp.path().join(".sightline/config.toml");

    let config = Config::load_or_create(&config_path).unwrap();
    assert!(config_path.exists());
    assert_eq!(config.index.alias, "sightline");

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[elasticsearch]"));
    assert!(content.contains("[index]"));
}

#[test]
fn test_invalid_files_are_config_errors() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("config.toml");

    std::fs::write(&path, "[elasticsearch\nurl = ").unwrap();
    assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));

    std::fs::write(&path, "[elasticsearch]\nurl = \"localhost:9200\"\n").unwrap();
    assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));

    std::fs::write(&path, "[repository]\ndefault_limit = 0\n").unwrap();
    assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
}

#[test]
fn test_env_overrides_apply_on_finish() {
    let mut config = Config::default();
    config
        .finish(|key| match key {
            "SIGHTLINE_ES_URL" => Some("http://override:9200".to_string()),
            "SIGHTLINE_ES_USERNAME" => Some("ops".to_string()),
            "SIGHTLINE_ES_PASSWORD" => Some("secret".to_string()),
            _ => None,
        })
        .unwrap();

    assert_eq!(config.elasticsearch.url, "http://override:9200");
    assert_eq!(config.elasticsearch.username.as_deref(), Some("ops"));
    assert_eq!(config.elasticsearch.password.as_deref(), Some("secret"));

    let mut bad = Config::default();
    let result = bad.finish(|key| (key == "SIGHTLINE_ES_URL").then(|| "nonsense".to_string()));
    assert!(result.is_err());
}

#[test]
fn test_create_store_and_repository_wiring() {
    let config = Config::default();
    let store = config.create_store().unwrap();
    let repository = config.repository(store);
    assert_eq!(repository.query_options().limit, 50);
}
