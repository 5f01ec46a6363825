//! Config loading, grounded on the teacher's `cli::load_config`: read
//! `RSAGENT_CONFIG` (default `config.toml`) if it exists, else boot on
//! `Config::default()`. Environment variables never appear inside the
//! file itself — secrets are always resolved through `api_key_env`/
//! similar indirections at provider-construction time.

use anyhow::Context;
use rsa_domain::config::Config;

pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("RSAGENT_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .with_context(|| format!("reading {config_path}"))?;
        toml::from_str(&raw).with_context(|| format!("parsing {config_path}"))?
    } else {
        tracing::info!(path = %config_path, "no config file found, using defaults");
        Config::default()
    };

    Ok((config, config_path))
}
