use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use imgdupe::config::{Config, ENV_PREFIX};
use imgdupe::duplicates::Policy;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .extract()
        .unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.io_threads, 4);
}

#[test]
fn test_config_load_from_toml() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
database = "/var/lib/imgdupe/library.sqlite"
table = "library"
io_threads = 8
policy = "fast"
compute_perceptual = false
ignore_patterns = ["*.tmp", "thumbs/"]
"#,
    )
    .unwrap();

    let config = Config::load(Some(&path)).unwrap();

    assert_eq!(config.database, PathBuf::from("/var/lib/imgdupe/library.sqlite"));
    assert_eq!(config.table, "library");
    assert_eq!(config.io_threads, 8);
    assert_eq!(config.policy, Policy::Fast);
    assert!(!config.compute_perceptual);
    assert_eq!(config.ignore_patterns, vec!["*.tmp", "thumbs/"]);
}

#[test]
fn test_config_env_overrides_toml() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "skip_hidden = false\nreport_dir = \"/from/file\"\n").unwrap();

    std::env::set_var("IMGDUPE_SKIP_HIDDEN", "true");
    std::env::set_var("IMGDUPE_REPORT_DIR", "/from/env");

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .unwrap();

    std::env::remove_var("IMGDUPE_SKIP_HIDDEN");
    std::env::remove_var("IMGDUPE_REPORT_DIR");

    assert!(config.skip_hidden);
    assert_eq!(config.report_dir, PathBuf::from("/from/env"));
}

#[test]
fn test_config_invalid_values_rejected() {
    let dir = tempdir().unwrap();

    let bad_policy = dir.path().join("policy.toml");
    fs::write(&bad_policy, "policy = \"sloppy\"\n").unwrap();
    assert!(Config::load(Some(&bad_policy)).is_err());

    let bad_table = dir.path().join("table.toml");
    fs::write(&bad_table, "table = \"images where 1=1\"\n").unwrap();
    assert!(Config::load(Some(&bad_table)).is_err());

    let zero_threads = dir.path().join("threads.toml");
    fs::write(&zero_threads, "io_threads = 0\n").unwrap();
    assert!(Config::load(Some(&zero_threads)).is_err());
}

#[test]
fn test_config_written_toml_loads_back() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let config = Config {
        table: "phone_backup".to_string(),
        io_threads: 2,
        policy: Policy::Fast,
        ..Config::default()
    };
    fs::write(&path, config.to_toml().unwrap()).unwrap();

    let loaded = Config::load(Some(&path)).unwrap();
    assert_eq!(loaded.table, "phone_backup");
    assert_eq!(loaded.io_threads, 2);
    assert_eq!(loaded.policy, Policy::Fast);
}
