use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub business_rules: BusinessRules,
    pub payments: PaymentsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    pub tax_rate: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_minimum_charge")]
    pub minimum_charge_cents: i64,
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_minimum_charge() -> i64 {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentsConfig {
    pub stripe: CardGatewayConfig,
    pub paypal: RedirectGatewayConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CardGatewayConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedirectGatewayConfig {
    pub client_id: String,
    pub client_secret: String,
    pub webhook_id: String,
    pub base_url: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Add in the current environment file
            // Default to 'development' env
            // Note that this file is _optional_
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked in to git
            .add_source(config::File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of CROFT)
            // Eg.. `CROFT__SERVER__PORT=8080` would set the server port
            .add_source(config::Environment::with_prefix("CROFT").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
