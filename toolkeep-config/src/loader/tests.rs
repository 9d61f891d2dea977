use std::collections::HashMap;
use std::fs;

use tempfile::TempDir;

use super::{ConfigLayerEntry, ConfigLayerSource, ConfigLayerStack, ConfigManager, ToolkeepConfig};
use crate::constants::{CONFIG_FILE_NAME, USER_CONFIG_DIR};

fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn missing_files_yield_defaults() {
    let workspace = TempDir::new().expect("workspace");
    let manager =
        ConfigManager::load_from_workspace_with_env(workspace.path(), lookup_from(&[]))
            .expect("load defaults");

    let config = manager.config();
    assert!(config.backend.url.is_none());
    assert_eq!(config.session.ttl_seconds, 3600);
    assert_eq!(config.lock.ttl_ms, 30_000);
    assert_eq!(config.cache.fast_capacity, 1000);
    assert!(manager.layers().is_empty());
    assert!(manager.config_path().is_none());
}

#[test]
fn workspace_overrides_user_layer() {
    let home = TempDir::new().expect("home");
    let workspace = TempDir::new().expect("workspace");

    let user_dir = home.path().join(USER_CONFIG_DIR);
    fs::create_dir_all(&user_dir).expect("user dir");
    fs::write(
        user_dir.join(CONFIG_FILE_NAME),
        "[session]\nttl_seconds = 120\nmax_history = 5\n",
    )
    .expect("user config");
    fs::write(
        workspace.path().join(CONFIG_FILE_NAME),
        "[session]\nttl_seconds = 60\n",
    )
    .expect("workspace config");

    let home_str = home.path().to_string_lossy().to_string();
    let manager = ConfigManager::load_from_workspace_with_env(
        workspace.path(),
        lookup_from(&[("HOME", home_str.as_str())]),
    )
    .expect("load layered");

    assert_eq!(manager.config().session.ttl_seconds, 60);
    assert_eq!(manager.config().session.max_history, 5);
    assert_eq!(manager.layers().len(), 2);
    assert!(matches!(
        manager.layers().first().map(|l| &l.source),
        Some(ConfigLayerSource::User { .. })
    ));
    assert_eq!(
        manager.config_path(),
        Some(workspace.path().join(CONFIG_FILE_NAME).as_path())
    );
}

#[test]
fn env_backend_url_wins_over_file() {
    let workspace = TempDir::new().expect("workspace");
    fs::write(
        workspace.path().join(CONFIG_FILE_NAME),
        "[backend]\nurl = \"redis://file:6379\"\n",
    )
    .expect("workspace config");

    let manager = ConfigManager::load_from_workspace_with_env(
        workspace.path(),
        lookup_from(&[
            ("TOOLKEEP_BACKEND_URL", "redis://env:6379"),
            ("REDIS_URL", "redis://fallback:6379"),
        ]),
    )
    .expect("load with env");

    assert_eq!(
        manager.config().backend.url.as_deref(),
        Some("redis://env:6379")
    );
    assert!(matches!(
        manager.layers().last().map(|l| &l.source),
        Some(ConfigLayerSource::Environment)
    ));
}

#[test]
fn redis_url_used_when_backend_url_missing() {
    let workspace = TempDir::new().expect("workspace");
    let manager = ConfigManager::load_from_workspace_with_env(
        workspace.path(),
        lookup_from(&[("REDIS_URL", "redis://fallback:6379"), ("TOOLKEEP_FORCE_MEMORY", "yes")]),
    )
    .expect("load with env");

    let backend = &manager.config().backend;
    assert_eq!(backend.url.as_deref(), Some("redis://fallback:6379"));
    assert!(backend.force_memory);
    assert!(backend.shared_url().is_none());
}

#[test]
fn explicit_file_is_loaded() {
    let dir = TempDir::new().expect("dir");
    let path = dir.path().join("custom.toml");
    fs::write(&path, "[cache]\nenabled = false\n").expect("write config");

    let manager = ConfigManager::load_from_file_with_env(&path, lookup_from(&[]))
        .expect("load explicit");
    assert!(!manager.config().cache.enabled);
    assert_eq!(manager.config_path(), Some(path.as_path()));
}

#[test]
fn invalid_values_fail_validation() {
    let workspace = TempDir::new().expect("workspace");
    fs::write(
        workspace.path().join(CONFIG_FILE_NAME),
        "[lock]\nttl_ms = 0\n",
    )
    .expect("workspace config");

    let err = ConfigManager::load_from_workspace_with_env(workspace.path(), lookup_from(&[]))
        .expect_err("zero lock ttl is rejected");
    assert!(format!("{err:#}").contains("lock"));
}

#[test]
fn malformed_toml_is_reported() {
    let workspace = TempDir::new().expect("workspace");
    fs::write(workspace.path().join(CONFIG_FILE_NAME), "[session\n").expect("write");

    let result = ConfigManager::load_from_workspace_with_env(workspace.path(), lookup_from(&[]));
    assert!(result.is_err());
}

#[test]
fn from_toml_str_fills_defaults() {
    let config = ToolkeepConfig::from_toml_str("[debug]\ntrace_level = \"debug\"\n")
        .expect("parse config");
    assert_eq!(config.backend.key_prefix, "toolkeep");
    assert_eq!(config.cache.default_ttl_seconds, 300);
}

#[test]
fn later_layers_replace_scalars_and_merge_tables() {
    let mut stack = ConfigLayerStack::default();
    let user: toml::Value = toml::from_str("[a]\nx = 1\ny = 2\n[c]\nkeep = 1\n").expect("user");
    let workspace: toml::Value =
        toml::from_str("c = \"flat\"\n[a]\ny = 3\n[b]\nz = true\n").expect("workspace");
    stack.push(ConfigLayerEntry::new(
        ConfigLayerSource::User { file: "user.toml".into() },
        user,
    ));
    stack.push(ConfigLayerEntry::new(
        ConfigLayerSource::Workspace { file: "toolkeep.toml".into() },
        workspace,
    ));

    let merged = stack.effective_config();
    assert_eq!(merged["a"]["x"].as_integer(), Some(1));
    assert_eq!(merged["a"]["y"].as_integer(), Some(3));
    assert_eq!(merged["b"]["z"].as_bool(), Some(true));
    assert_eq!(merged["c"].as_str(), Some("flat"));
}
