use drydock::config::Config;

use super::fixture_config;

#[test]
fn test_load_valid_full_config() {
    let config = Config::from_file(fixture_config("valid_full.toml")).expect("Failed to load config");

    assert_eq!(config.language_ids(), vec!["python", "shell"]);
    assert_eq!(config.default_limits.memory_mb, Some(256));
    assert_eq!(config.default_limits.timeout, Some(10.0));

    let shell = config.get_language("SH").expect("alias not resolved");
    assert_eq!(config.effective_limits(shell).timeout, Some(2.0));
    assert_eq!(config.effective_limits(shell).memory_mb, Some(256));
}

#[test]
fn test_load_valid_minimal_config() {
    let config =
        Config::from_file(fixture_config("valid_minimal.toml")).expect("Failed to load config");

    assert!(config.languages.contains_key("shell"));
}

#[test]
fn test_load_layers_file_over_embedded_defaults() {
    let config = Config::load(Some(fixture_config("valid_minimal.toml").as_ref()))
        .expect("Failed to load config");

    // Embedded languages survive, the file adds its own
    assert!(config.get_language("python").is_ok());
    assert!(config.get_language("shell").is_ok());
}

#[test]
fn test_load_invalid_missing_placeholder() {
    let result = Config::from_file(fixture_config("invalid_missing_placeholder.toml"));
    assert!(result.is_err());
}

#[test]
fn test_load_invalid_zero_memory() {
    let result = Config::from_file(fixture_config("invalid_zero_memory.toml"));
    assert!(result.is_err());
}

#[test]
fn test_load_invalid_empty_image() {
    let result = Config::from_file(fixture_config("invalid_empty_image.toml"));
    assert!(result.is_err());
}

#[test]
fn test_load_missing_file() {
    let result = Config::from_file(fixture_config("does_not_exist.toml"));
    assert!(matches!(result, Err(drydock::ConfigError::ReadFile { .. })));
}

#[test]
fn test_load_mixed_case_language_ids() {
    let config =
        Config::from_file(fixture_config("valid_mixed_case.toml")).expect("Failed to load config");

    assert_eq!(config.language_ids(), vec!["shell"]);
    for id in ["shell", "Shell", "SHELL", "sh"] {
        assert!(config.get_language(id).is_ok(), "{id} not resolved");
    }
}

#[test]
fn test_partial_limits_keep_reference_ceilings() {
    let config =
        Config::from_file(fixture_config("valid_mixed_case.toml")).expect("Failed to load config");

    assert_eq!(config.default_limits.timeout, Some(5.0));
    assert_eq!(config.default_limits.memory_mb, Some(512));
    assert_eq!(config.default_limits.cpus, Some(1.0));
    assert_eq!(config.default_limits.pids_limit, Some(256));
}
