use irstore_ir::{Context, ContextConfig, UniquerConfig, ENV_PRELOAD_DIALECTS, ENV_THREADING};
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_configuration() {
    let config = ContextConfig::default();
    assert!(config.validate().is_ok());
    assert!(config.preload_dialects.is_empty());
    assert!(config.uniquer.threading);
}

#[test]
fn test_config_file_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("irstore.toml");

    let config = ContextConfig {
        uniquer: UniquerConfig {
            shard_count: 2,
            track_stats: false,
            ..UniquerConfig::default()
        },
        preload_dialects: vec!["arith".to_string(), "func".to_string()],
    };
    config.to_file(&config_path).unwrap();
    assert!(config_path.exists());

    let loaded = ContextConfig::from_file(&config_path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_invalid_config_file_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("bad.toml");

    fs::write(&config_path, "preload_dialects = [\"1bad\"]\n").unwrap();
    assert!(ContextConfig::from_file(&config_path).is_err());

    fs::write(&config_path, "[uniquer]\nshard_count = 0\n").unwrap();
    let err = ContextConfig::from_file(&config_path).unwrap_err();
    assert!(format!("{err:#}").contains("Shard count"));

    assert!(ContextConfig::from_file(temp_dir.path().join("missing.toml")).is_err());
}

#[test]
fn test_config_json_and_schema() {
    let config = ContextConfig {
        preload_dialects: vec!["scf".to_string()],
        ..ContextConfig::default()
    };
    let json = config.to_json().unwrap();
    assert_eq!(ContextConfig::from_json(&json).unwrap(), config);

    let schema = ContextConfig::json_schema().unwrap();
    assert!(schema.contains("preload_dialects"));
    assert!(schema.contains("shard_count"));
}

#[test]
fn test_preloaded_dialects_are_available() {
    let config = ContextConfig {
        preload_dialects: vec!["arith".to_string(), "func".to_string(), "arith".to_string()],
        ..ContextConfig::default()
    };
    let ctx = Context::with_config(config).unwrap();

    let namespaces: Vec<_> = ctx.dialects().map(|d| d.namespace()).collect();
    assert_eq!(namespaces, vec!["builtin", "arith", "func"]);
    assert!(ctx.lookup_dialect("func").is_some());
    assert!(ctx.lookup_dialect("scf").is_none());
}

#[test]
fn test_overrides_shape_the_context() {
    let vars: HashMap<&str, &str> = [
        (ENV_THREADING, "false"),
        (ENV_PRELOAD_DIALECTS, "test"),
    ]
    .into();
    let mut config = ContextConfig::default();
    config.apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()));

    let ctx = Context::with_config(config).unwrap();
    assert!(!ctx.config().uniquer.threading);
    assert_eq!(ctx.config().uniquer.effective_shard_count(), 1);
    assert!(ctx.lookup_dialect("test").is_some());
}

#[test]
fn test_invalid_config_fails_context_creation() {
    let config = ContextConfig {
        uniquer: UniquerConfig {
            arena_chunk_bytes: 8,
            ..UniquerConfig::default()
        },
        ..ContextConfig::default()
    };
    assert!(Context::with_config(config).is_err());
}
