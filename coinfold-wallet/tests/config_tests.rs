use anyhow::Result;
use bitcoin::Network;
use coinfold_wallet::config::{self, Config};
use coinfold_wallet::logging::LogLevel;
use coinfold_wallet::{SendMode, SpendRequest};
use std::fs;
use tempfile::TempDir;

// Helper function to create a temporary directory and config file for testing
fn setup_test_config(content: &str) -> (TempDir, std::path::PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, content).expect("Failed to write test config");
    (temp_dir, config_path)
}

#[test]
fn test_ensure_config_exists_creates_default() -> Result<()> {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nested").join("config.toml");

    config::ensure_config_exists(&config_path)?;
    assert!(config_path.exists(), "Config file was not created");

    let loaded = Config::load(&config_path)?;
    assert_eq!(loaded, Config::default());
    Ok(())
}

#[test]
fn test_ensure_config_exists_keeps_existing_file() -> Result<()> {
    let (_dir, path) = setup_test_config("[wallet]\nfee_sat_per_kb = 5000\n");

    config::ensure_config_exists(&path)?;
    assert_eq!(Config::load(&path)?.wallet.fee_sat_per_kb, 5000);
    Ok(())
}

#[test]
fn test_load_full_config() -> Result<()> {
    let (_dir, path) = setup_test_config(
        r#"
        [wallet]
        network = "Regtest"
        fee_sat_per_kb = 2500
        min_conf = 3
        input_min_height = 120
        max_inputs = 50

        [chain]
        coinbase_maturity = 50
        burn_window = 1000
        burn_lookahead = 10

        [logging]
        level = "warn"
        json_format = true
        "#,
    );

    let config = Config::load(&path)?;
    config.validate()?;
    assert_eq!(config.wallet.network()?, Network::Regtest);
    assert_eq!(config.logging.level, LogLevel::Warn);
    assert!(config.logging.json_format);

    let params = config.chain_params()?;
    assert_eq!(params.network, Network::Regtest);
    assert_eq!(params.coinbase_maturity, 50);
    assert_eq!(params.burn_window, 1000);
    assert_eq!(params.burn_lookahead, 10);

    let request = SpendRequest::from_config(Vec::new(), &config.wallet);
    assert_eq!(request.fee_sat_per_kb, 2500);
    assert_eq!(request.min_conf, 3);
    assert_eq!(request.input_min_height, 120);
    assert_eq!(request.effective_max_inputs(), Some(50));
    assert_eq!(request.send_mode, SendMode::Broadcast);
    Ok(())
}

#[test]
fn test_partial_config_uses_defaults() -> Result<()> {
    let (_dir, path) = setup_test_config("[chain]\ncoinbase_maturity = 20\n");

    let config = Config::load(&path)?;
    assert_eq!(config.wallet, Default::default());
    assert_eq!(config.chain.coinbase_maturity, 20);
    assert_eq!(config.chain.burn_window, Config::default().chain.burn_window);
    Ok(())
}

#[test]
fn test_save_and_reload() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("saved.toml");

    let mut config = Config::default();
    config.wallet.network = "testnet".to_string();
    config.wallet.max_inputs = Some(200);
    config.logging.level = LogLevel::Debug;
    config.save(&path)?;

    let reloaded = Config::load(&path)?;
    assert_eq!(reloaded, config);
    assert_eq!(reloaded.chain_params()?.network, Network::Testnet);
    Ok(())
}

#[test]
fn test_validation_rejects_bad_values() {
    let mut config = Config::default();
    config.wallet.network = "moonnet".to_string();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.wallet.max_inputs = Some(0);
    assert!(config.validate().is_err());

    config.wallet.max_inputs = Some(5000);
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.chain.coinbase_maturity = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_malformed_file_is_an_error() {
    let (_dir, path) = setup_test_config("[wallet\nnetwork = ");
    assert!(Config::load(&path).is_err());

    let missing = TempDir::new().unwrap().path().join("absent.toml");
    assert!(Config::load(&missing).is_err());
}
