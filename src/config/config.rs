use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Outbound balance API used to derive the spend-rate trend.
#[derive(Debug, Deserialize, Clone)]
pub struct BalanceConfig {
    pub api_base: String,
    pub api_key: String,
    #[serde(default = "default_history_path")]
    pub history_path: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub balance: Option<BalanceConfig>,
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let settings = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("database.path", "telemetry.duckdb")?
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("AGENTPULSE").separator("__"))
            .build()?;

        let mut app_config: AppConfig = settings.try_deserialize()?;

        // Expand environment variables if present like ${MOONSHOT_API_KEY}
        app_config.server.host = expand_env(&app_config.server.host);
        app_config.database.path = expand_env(&app_config.database.path);

        if let Some(ref mut balance) = app_config.balance {
            balance.api_key = expand_env(&balance.api_key);
            balance.history_path = expand_env(&balance.history_path);
        }

        Ok(app_config)
    }
}

fn default_history_path() -> String {
    "balance_history.json".to_string()
}

fn default_poll_interval() -> u64 {
    300
}

fn default_timeout() -> u64 {
    10
}

fn expand_env(val: &str) -> String {
    match val.strip_prefix("${").and_then(|v| v.strip_suffix('}')) {
        Some(var_name) => std::env::var(var_name).unwrap_or_default(),
        None => val.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_braced_variables_only() {
        std::env::set_var("AGENTPULSE_TEST_EXPAND", "secret");
        assert_eq!(expand_env("${AGENTPULSE_TEST_EXPAND}"), "secret");
        assert_eq!(expand_env("plain"), "plain");
        assert_eq!(expand_env("${AGENTPULSE_TEST_MISSING_VAR}"), "");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = AppConfig::load("does-not-exist-agentpulse").unwrap();
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.database.path, "telemetry.duckdb");
    }
}
