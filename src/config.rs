// config.rs
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use bigdecimal::BigDecimal;
use num_traits::Zero;
use tracing_subscriber::filter::LevelFilter;

use crate::service::commission::{default_operational_bonuses, is_whole_minor_units, OperationalBonus};
use crate::utils::referral_code::normalize_referral_code;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub app_url: String,
    pub jwt_secret: String,
    /// Token lifetime in minutes.
    pub jwt_maxage: i64,
    pub port: u16,
    pub ledger_backend: LedgerBackend,
    pub db_max_connections: u32,
    pub approval_timeout: Duration,
    pub lock_timeout: Duration,
    pub log_level: LevelFilter,
    pub operational_bonuses: Vec<OperationalBonus>,
    pub admin_name: String,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    pub fn init() -> anyhow::Result<Config> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ledger_backend = match lookup("LEDGER_BACKEND").as_deref().map(str::trim) {
            None | Some("") | Some("postgres") => LedgerBackend::Postgres,
            Some("memory") => LedgerBackend::Memory,
            Some(other) => bail!("LEDGER_BACKEND must be 'postgres' or 'memory', got '{}'", other),
        };

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if ledger_backend == LedgerBackend::Postgres && database_url.is_none() {
            bail!("DATABASE_URL must be set");
        }

        let jwt_secret = lookup("JWT_SECRET_KEY").context("JWT_SECRET_KEY must be set")?;
        let jwt_maxage = parse_or("JWT_MAXAGE", lookup("JWT_MAXAGE"), 60i64)?;
        let port = parse_or("PORT", lookup("PORT"), 8000u16)?;
        let db_max_connections = parse_or("DB_MAX_CONNECTIONS", lookup("DB_MAX_CONNECTIONS"), 20u32)?;
        let approval_timeout_ms = parse_or("APPROVAL_TIMEOUT_MS", lookup("APPROVAL_TIMEOUT_MS"), 5000u64)?;
        let lock_timeout_ms = parse_or("LOCK_TIMEOUT_MS", lookup("LOCK_TIMEOUT_MS"), approval_timeout_ms / 2)?;
        let log_level = parse_or("LOG_LEVEL", lookup("LOG_LEVEL"), LevelFilter::DEBUG)?;

        if approval_timeout_ms == 0 {
            bail!("APPROVAL_TIMEOUT_MS must be greater than zero");
        }

        let operational_bonuses = match lookup("OPERATIONAL_BONUSES") {
            Some(raw) => parse_operational_bonuses(&raw)?,
            None => default_operational_bonuses(),
        };

        Ok(Config {
            database_url,
            app_url: lookup("APP_URL").unwrap_or_else(|| "http://localhost:5173".to_string()),
            jwt_secret,
            jwt_maxage,
            port,
            ledger_backend,
            db_max_connections,
            approval_timeout: Duration::from_millis(approval_timeout_ms),
            lock_timeout: Duration::from_millis(lock_timeout_ms.max(1)),
            log_level,
            operational_bonuses,
            admin_name: lookup("ADMIN_NAME").unwrap_or_else(|| "Administrator".to_string()),
            admin_email: lookup("ADMIN_EMAIL").filter(|v| !v.trim().is_empty()),
            admin_password: lookup("ADMIN_PASSWORD").filter(|v| !v.is_empty()),
        })
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) if value.trim().is_empty() => Ok(default),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{} is invalid ('{}'): {}", key, value, e)),
    }
}

/// Parses `CODE:AMOUNT,CODE:AMOUNT`. An empty string disables operational
/// bonuses.
pub fn parse_operational_bonuses(raw: &str) -> anyhow::Result<Vec<OperationalBonus>> {
    let mut bonuses = Vec::new();

    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (code, amount) = entry
            .split_once(':')
            .with_context(|| format!("operational bonus '{}' must look like CODE:AMOUNT", entry))?;

        let code = normalize_referral_code(code);
        if code.is_empty() {
            bail!("operational bonus '{}' has an empty referral code", entry);
        }

        let amount = BigDecimal::from_str(amount.trim())
            .with_context(|| format!("operational bonus '{}' has an invalid amount", entry))?;
        if amount <= BigDecimal::zero() || !is_whole_minor_units(&amount) {
            bail!(
                "operational bonus '{}' must be positive with at most two decimal places",
                entry
            );
        }

        bonuses.push(OperationalBonus {
            referral_code: code,
            amount,
        });
    }

    Ok(bonuses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/gig"), ("JWT_SECRET_KEY", "s")]).unwrap();

        assert_eq!(config.ledger_backend, LedgerBackend::Postgres);
        assert_eq!(config.port, 8000);
        assert_eq!(config.approval_timeout, Duration::from_millis(5000));
        assert_eq!(config.lock_timeout, Duration::from_millis(2500));
        assert_eq!(config.operational_bonuses, default_operational_bonuses());
    }

    #[test]
    fn postgres_backend_requires_database_url() {
        assert!(config_from(&[("JWT_SECRET_KEY", "s")]).is_err());

        let config = config_from(&[("JWT_SECRET_KEY", "s"), ("LEDGER_BACKEND", "memory")]).unwrap();
        assert_eq!(config.ledger_backend, LedgerBackend::Memory);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let err = config_from(&[
            ("LEDGER_BACKEND", "memory"),
            ("JWT_SECRET_KEY", "s"),
            ("APPROVAL_TIMEOUT_MS", "soon"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("APPROVAL_TIMEOUT_MS"));
    }

    #[test]
    fn operational_bonuses_parse_and_normalize() {
        let bonuses = parse_operational_bonuses(" opsadmin:2500 , FUND:99.50").unwrap();
        assert_eq!(bonuses.len(), 2);
        assert_eq!(bonuses[0].referral_code, "OPSADMIN");
        assert_eq!(bonuses[1].amount, BigDecimal::from_str("99.50").unwrap());
    }

    #[test]
    fn empty_roster_disables_bonuses() {
        assert!(parse_operational_bonuses("").unwrap().is_empty());
        let config = config_from(&[
            ("LEDGER_BACKEND", "memory"),
            ("JWT_SECRET_KEY", "s"),
            ("OPERATIONAL_BONUSES", ""),
        ])
        .unwrap();
        assert!(config.operational_bonuses.is_empty());
    }

    #[test]
    fn malformed_bonuses_are_rejected() {
        assert!(parse_operational_bonuses("OPSADMIN").is_err());
        assert!(parse_operational_bonuses("OPSADMIN:abc").is_err());
        assert!(parse_operational_bonuses("OPSADMIN:-5").is_err());
        assert!(parse_operational_bonuses("OPSADMIN:1.001").is_err());
        assert!(parse_operational_bonuses(":10").is_err());
    }
}
