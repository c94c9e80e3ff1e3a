//! Service configuration from the environment

use anyhow::{bail, Context, Result};
use haulwatch_domain::hos::{HosConfig, RecomputePolicy, RuleBook, RuleSet, US_FEDERAL};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Where the duty-status log and DVIR reports live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    S3,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "s3" => Ok(Self::S3),
            other => bail!("unknown HOS_BACKEND '{}' (expected memory or s3)", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: BackendKind,
    pub bucket: String,
    pub rulesets_path: Option<PathBuf>,
    pub jurisdiction: String,
    pub lock_timeout: Duration,
    pub recompute_policy: RecomputePolicy,
    pub memory_seed: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| {
            lookup(key).unwrap_or_else(|| {
                info!("{} not set, using default: {}", key, default);
                default.to_string()
            })
        };

        let port = var("HOS_PORT", "3000")
            .parse()
            .context("HOS_PORT must be a port number")?;
        let lock_timeout_ms: u64 = var("HOS_LOCK_TIMEOUT_MS", "2000")
            .parse()
            .context("HOS_LOCK_TIMEOUT_MS must be a number of milliseconds")?;
        let recompute_policy = RecomputePolicy::from_str(&var("HOS_RECOMPUTE_POLICY", "retroactive"))?;

        Ok(Self {
            host: var("HOS_HOST", "0.0.0.0"),
            port,
            backend: var("HOS_BACKEND", "memory").parse()?,
            bucket: var("HOS_BUCKET", "haulwatch"),
            rulesets_path: lookup("HOS_RULESETS_PATH").map(PathBuf::from),
            jurisdiction: var("HOS_JURISDICTION", US_FEDERAL),
            lock_timeout: Duration::from_millis(lock_timeout_ms),
            recompute_policy,
            memory_seed: lookup("HOS_MEMORY_SEED").map(PathBuf::from),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn hos_config(&self) -> HosConfig {
        HosConfig {
            lock_timeout: self.lock_timeout,
            recompute_policy: self.recompute_policy,
            ..HosConfig::default()
        }
    }

    /// Active rule set: the built-in book, overlaid with the rule set file
    pub fn rule_set(&self) -> Result<RuleSet> {
        let mut book = RuleBook::builtin();
        if let Some(path) = &self.rulesets_path {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading rule sets from {}", path.display()))?;
            let count = book.merge_json(&json)?;
            info!(path = %path.display(), count, "Loaded rule sets");
        }
        Ok(book.get(&self.jurisdiction)?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.jurisdiction, US_FEDERAL);
        assert_eq!(config.lock_timeout, Duration::from_millis(2000));
        assert_eq!(config.recompute_policy, RecomputePolicy::Retroactive);
        assert_eq!(config.rule_set().unwrap(), RuleSet::us_federal());
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("HOS_PORT", "8080"),
            ("HOS_BACKEND", "S3"),
            ("HOS_LOCK_TIMEOUT_MS", "250"),
            ("HOS_RECOMPUTE_POLICY", "prospective"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.backend, BackendKind::S3);
        assert_eq!(config.hos_config().lock_timeout, Duration::from_millis(250));
        assert_eq!(config.hos_config().recompute_policy, RecomputePolicy::Prospective);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(AppConfig::from_lookup(lookup(&[("HOS_BACKEND", "dynamo")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("HOS_PORT", "http")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("HOS_RECOMPUTE_POLICY", "never")])).is_err());
    }

    #[test]
    fn test_unknown_jurisdiction_fails() {
        let config = AppConfig::from_lookup(lookup(&[("HOS_JURISDICTION", "ca-south")])).unwrap();
        assert!(config.rule_set().is_err());
    }
}
