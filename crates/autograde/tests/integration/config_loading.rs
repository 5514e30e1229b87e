use autograde::config::Config;
use autograde::{ConfigError, FileEncoding};

use super::fixture_config;

#[test]
fn test_load_valid_config() {
    let config = Config::from_file(fixture_config("valid_full.toml")).expect("Failed to load config");

    assert_eq!(config.assignment, 5);
    assert_eq!(config.problems, 2);
    assert_eq!(config.parallelism, 2);
    assert_eq!(config.target_encoding, FileEncoding::Big5);
    assert_eq!(config.toolchain.command[0], "cl");
    assert_eq!(config.validator.deny.len(), 2);
    assert_eq!(config.preprocess.rewrites.len(), 1);
    assert_eq!(config.preprocess.prologue.len(), 1);
    assert_eq!(
        config.report_path(),
        std::path::PathBuf::from("reports/hw_05.csv")
    );
    assert_eq!(config.archive_name("s1"), "s1_hw_w05.zip");
}

#[test]
fn test_load_minimal_config() {
    let config =
        Config::from_file(fixture_config("valid_minimal.toml")).expect("Failed to load config");

    assert_eq!(config.problems, 1);
    assert_eq!(config.timeout, 10.0);
    assert!(config.extract.is_none());
}

#[test]
fn test_load_missing_file() {
    let result = Config::from_file(fixture_config("does_not_exist.toml"));
    assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
}

#[test]
fn test_load_invalid_zero_problems() {
    let result = Config::from_file(fixture_config("invalid_zero_problems.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_invalid_source_pattern() {
    let result = Config::from_file(fixture_config("invalid_source_pattern.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_invalid_deny_pattern() {
    let result = Config::from_file(fixture_config("invalid_deny_pattern.toml"));
    assert!(matches!(result, Err(ConfigError::Pattern { .. })));
}

#[test]
fn test_load_invalid_encoding() {
    let result = Config::from_file(fixture_config("invalid_encoding.toml"));
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn test_load_invalid_timeout() {
    let result = Config::from_file(fixture_config("invalid_timeout.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_example_config_round_trips() {
    let config = Config::parse_toml(autograde::EXAMPLE_CONFIG).expect("Example config is valid");
    assert!(config.extract.is_some());
    assert_eq!(config.validator.deny.len(), 4);
}
