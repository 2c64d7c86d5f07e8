//! Configuration - Type-safe, validated config

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::error::{Error, Result};
use crate::core::types::{Exchange, SubscribeRequest, Symbol};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Venue endpoints and credentials
    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub poll: PollConfig,

    /// Process-wide vendor runtime
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Loopback venue
    #[serde(default)]
    pub paper: PaperConfig,

    /// Instruments subscribed at startup
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Tag carried by every outbound event
    pub name: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { name: "ATP".to_string() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Trading server
    pub td_address: String,

    /// Market-data server
    pub md_address: String,

    /// User id (loaded from env if not provided)
    pub user_id: Option<String>,

    /// Password (loaded from env if not provided)
    pub password: Option<String>,

    /// Fund account to log in with (first one if absent)
    pub fund_account_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Timer ticks between two queries
    pub interval_ticks: u32,

    /// Timer period
    pub timer_interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ticks: 2,
            timer_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Station name reported to the venue
    pub station: String,

    /// Vendor log directory
    pub log_dir: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            station: "atp-gateway".to_string(),
            log_dir: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    /// Starting cash of the fund account
    pub cash: Decimal,

    /// Listed instruments
    pub contracts: Vec<PaperContract>,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            cash: Decimal::from(1_000_000),
            contracts: vec![
                PaperContract {
                    symbol: "600000".to_string(),
                    exchange: Exchange::Sse,
                    name: "SPDB".to_string(),
                    last_price: Decimal::new(1050, 2),
                },
                PaperContract {
                    symbol: "000001".to_string(),
                    exchange: Exchange::Szse,
                    name: "PAB".to_string(),
                    last_price: Decimal::new(1120, 2),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperContract {
    pub symbol: String,
    pub exchange: Exchange,
    pub name: String,
    pub last_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    pub symbol: String,
    pub exchange: Exchange,
}

impl SubscriptionConfig {
    pub fn to_request(&self) -> SubscribeRequest {
        SubscribeRequest {
            symbol: Symbol::new(self.symbol.as_str()),
            exchange: self.exchange,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            connection: ConnectionConfig {
                td_address: "paper://td".to_string(),
                md_address: "paper://md".to_string(),
                user_id: None,
                password: None,
                fund_account_id: None,
            },
            poll: PollConfig::default(),
            runtime: RuntimeConfig::default(),
            paper: PaperConfig::default(),
            subscriptions: vec![SubscriptionConfig {
                symbol: "600000".to_string(),
                exchange: Exchange::Sse,
            }],
        }
    }
}

impl Config {
    /// Load from TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll.interval_ticks == 0 {
            return Err(Error::Config("poll.interval_ticks must be at least 1".into()));
        }
        if self.poll.timer_interval_ms == 0 {
            return Err(Error::Config("poll.timer_interval_ms must be positive".into()));
        }
        if self.connection.td_address.trim().is_empty() || self.connection.md_address.trim().is_empty() {
            return Err(Error::Config("connection addresses must not be empty".into()));
        }
        if self.gateway.name.trim().is_empty() {
            return Err(Error::Config("gateway.name must not be empty".into()));
        }
        Ok(())
    }

    /// Fill missing credentials from `ATP_USER_ID` / `ATP_PASSWORD`.
    pub fn with_env_credentials(mut self) -> Self {
        if self.connection.user_id.is_none() {
            self.connection.user_id = std::env::var("ATP_USER_ID").ok();
        }
        if self.connection.password.is_none() {
            self.connection.password = std::env::var("ATP_PASSWORD").ok();
        }
        self
    }

    pub fn subscription_requests(&self) -> Vec<SubscribeRequest> {
        self.subscriptions.iter().map(SubscriptionConfig::to_request).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
            subscriptions = [
                { symbol = "600000", exchange = "SSE" },
                { symbol = "000001", exchange = "SZSE" },
            ]

            [gateway]
            name = "ATP_SIM"

            [connection]
            td_address = "tcp://10.0.0.1:32001"
            md_address = "tcp://10.0.0.1:32002"
            user_id = "u1"

            [poll]
            interval_ticks = 3
            timer_interval_ms = 500

            [paper]
            cash = 50000
            contracts = [{ symbol = "510050", exchange = "SSE", name = "50ETF", last_price = 2.85 }]
            "#,
        )
        .unwrap();

        assert_eq!(config.gateway.name, "ATP_SIM");
        assert_eq!(config.poll.interval_ticks, 3);
        assert_eq!(config.connection.password, None);
        assert_eq!(config.paper.cash, dec!(50000));
        assert_eq!(config.paper.contracts[0].last_price, dec!(2.85));
        assert_eq!(config.runtime.log_dir, PathBuf::from("logs"));

        let requests = config.subscription_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].exchange, Exchange::Szse);
    }

    #[test]
    fn test_defaults_and_validation() {
        let config = Config::default();
        assert_eq!(config.gateway.name, "ATP");
        assert_eq!(config.poll.interval_ticks, 2);
        assert!(config.validate().is_ok());

        assert!(matches!(
            Config::parse("[poll]\ninterval_ticks = 0\ntimer_interval_ms = 1000\n"),
            Err(Error::Config(_))
        ));
        assert!(matches!(Config::parse("[connection]\n"), Err(Error::Config(_))));
    }
}
