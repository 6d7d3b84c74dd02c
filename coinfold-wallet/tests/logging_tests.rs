use coinfold_wallet::logging::{self, LogConfig, LogLevel};
use serde_json::json;
use std::sync::Once;
use tempfile::TempDir;

// Ensure logging is only initialized once across all tests
static INIT: Once = Once::new();

fn setup_logging() {
    INIT.call_once(|| {
        let config = LogConfig {
            level: LogLevel::Error,
            log_file: None,
            include_timestamps: false,
            include_source_location: false,
            json_format: false,
        };

        // Another test binary may already own the global logger
        let _ = logging::init(&config);
    });
}

#[test]
fn test_logging_initialization() {
    setup_logging();

    logging::set_log_level(LogLevel::Info);
    logging::set_log_level(LogLevel::Trace);
    assert_eq!(log::max_level(), log::LevelFilter::Trace);
    logging::set_log_level(LogLevel::Error);
    assert_eq!(log::max_level(), log::LevelFilter::Error);
}

#[test]
fn test_context_helpers_accept_structured_params() {
    setup_logging();

    logging::log_selection(LogLevel::Debug, "Eligible inputs chosen", Some(json!({ "selected": 2 })));
    logging::log_storage(LogLevel::Info, "Deleting unspendable outputs", None);
    logging::log_transaction(
        LogLevel::Warn,
        "Authored draft",
        Some(json!({ "change": "bcrt1qexampleexampleexample", "inputs": [1, 2] })),
    );
}

#[test]
fn test_default_config() {
    let config = LogConfig::default();

    assert_eq!(config.level, LogLevel::Info);
    assert!(config.log_file.is_none());
    assert!(config.include_timestamps);
    assert!(!config.include_source_location);
    assert!(!config.json_format);
}

#[test]
fn test_unwritable_log_file_is_reported_or_ignored() {
    let dir = TempDir::new().unwrap();
    let config = LogConfig {
        log_file: Some(dir.path().join("missing").join("engine.log").display().to_string()),
        ..LogConfig::default()
    };

    // Only the first init in a process does any work
    match logging::init(&config) {
        Ok(()) => {}
        Err(message) => assert!(message.contains("Failed to open log file")),
    }
}

#[test]
fn test_sanitization() {
    assert_eq!(logging::sanitize_for_logging(""), "");
    assert_eq!(logging::sanitize_for_logging("short"), "*****");
    assert_eq!(
        logging::sanitize_for_logging("bcrt1qw508d6qejxtdg4y5r3zarvary0c5xw7k"),
        "bcrt...xw7k"
    );
}
