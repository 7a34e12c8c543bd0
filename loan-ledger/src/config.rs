//! Configuration for the loan ledger

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Ledger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Log output format
    pub log_format: LogFormat,

    /// Actor configuration
    pub actor: ActorConfig,

    /// Ledger policy points
    pub policy: PolicyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "loan-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_format: LogFormat::Text,
            actor: ActorConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human readable
    Text,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(crate::Error::Config(format!("Unknown log format: {}", other))),
        }
    }
}

/// Actor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    /// Bounded mailbox size (backpressure on callers)
    pub mailbox_capacity: usize,

    /// Broadcast buffer for loan events
    pub event_channel_capacity: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000,
            event_channel_capacity: 256,
        }
    }
}

/// Who may pay towards a loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepaymentAuthorization {
    /// Any caller may pay on the borrower's behalf
    AnyCaller,
    /// Only the recorded borrower may pay
    BorrowerOnly,
}

impl FromStr for RepaymentAuthorization {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any_caller" => Ok(RepaymentAuthorization::AnyCaller),
            "borrower_only" => Ok(RepaymentAuthorization::BorrowerOnly),
            other => Err(crate::Error::Config(format!(
                "Unknown repayment authorization: {}",
                other
            ))),
        }
    }
}

/// What happens to escrowed collateral on full repayment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollateralRelease {
    /// Collateral stays in escrow after repayment
    RetainInEscrow,
    /// Collateral is released to the borrower as part of repayment
    ReturnToBorrower,
}

impl FromStr for CollateralRelease {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "retain_in_escrow" => Ok(CollateralRelease::RetainInEscrow),
            "return_to_borrower" => Ok(CollateralRelease::ReturnToBorrower),
            other => Err(crate::Error::Config(format!(
                "Unknown collateral release policy: {}",
                other
            ))),
        }
    }
}

/// Ledger policy points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Caller check on `partial_repayment` and `repay_loan`
    pub repayment_authorization: RepaymentAuthorization,

    /// Collateral handling in `repay_loan`
    pub collateral_on_repayment: CollateralRelease,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            repayment_authorization: RepaymentAuthorization::AnyCaller,
            collateral_on_repayment: CollateralRelease::RetainInEscrow,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `LOAN_LEDGER_*` overrides from a variable lookup
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> crate::Result<()> {
        if let Some(capacity) = lookup("LOAN_LEDGER_MAILBOX_CAPACITY") {
            self.actor.mailbox_capacity = parse_capacity("LOAN_LEDGER_MAILBOX_CAPACITY", &capacity)?;
        }

        if let Some(capacity) = lookup("LOAN_LEDGER_EVENT_CAPACITY") {
            self.actor.event_channel_capacity = parse_capacity("LOAN_LEDGER_EVENT_CAPACITY", &capacity)?;
        }

        if let Some(auth) = lookup("LOAN_LEDGER_REPAYMENT_AUTH") {
            self.policy.repayment_authorization = auth.parse()?;
        }

        if let Some(release) = lookup("LOAN_LEDGER_COLLATERAL_RELEASE") {
            self.policy.collateral_on_repayment = release.parse()?;
        }

        if let Some(format) = lookup("LOAN_LEDGER_LOG_FORMAT") {
            self.log_format = format.parse()?;
        }

        self.validate()
    }

    /// Check value ranges
    pub fn validate(&self) -> crate::Result<()> {
        if self.actor.mailbox_capacity == 0 {
            return Err(crate::Error::Config("mailbox_capacity must be positive".to_string()));
        }
        if self.actor.event_channel_capacity == 0 {
            return Err(crate::Error::Config(
                "event_channel_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_capacity(key: &str, value: &str) -> crate::Result<usize> {
    value
        .parse()
        .map_err(|e| crate::Error::Config(format!("{}: {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "loan-ledger");
        assert_eq!(config.actor.mailbox_capacity, 1000);
        assert_eq!(
            config.policy.repayment_authorization,
            RepaymentAuthorization::AnyCaller
        );
        assert_eq!(
            config.policy.collateral_on_repayment,
            CollateralRelease::RetainInEscrow
        );
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
log_format = "json"

[policy]
repayment_authorization = "borrower_only"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.policy.repayment_authorization,
            RepaymentAuthorization::BorrowerOnly
        );
        // Untouched sections keep defaults
        assert_eq!(
            config.policy.collateral_on_repayment,
            CollateralRelease::RetainInEscrow
        );
        assert_eq!(config.actor, ActorConfig::default());
    }

    #[test]
    fn test_from_file_rejects_zero_capacity() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[actor]\nmailbox_capacity = 0").unwrap();

        let result = Config::from_file(file.path());
        assert!(matches!(result, Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("LOAN_LEDGER_MAILBOX_CAPACITY", "16"),
            ("LOAN_LEDGER_COLLATERAL_RELEASE", "return_to_borrower"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.actor.mailbox_capacity, 16);
        assert_eq!(
            config.policy.collateral_on_repayment,
            CollateralRelease::ReturnToBorrower
        );
    }

    #[test]
    fn test_env_rejects_unknown_policy() {
        let mut config = Config::default();
        let result = config.apply_env(|key| {
            (key == "LOAN_LEDGER_REPAYMENT_AUTH").then(|| "everyone".to_string())
        });
        assert!(result.is_err());
    }
}
