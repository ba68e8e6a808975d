use std::env;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::packet::JobIds;

fn get_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn get_env_bool(key: &str, default: bool) -> bool {
    match get_env(key) {
        None => default,
        Some(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on"),
    }
}

fn get_env_f64(key: &str, default: f64) -> Result<f64> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => Ok(v
            .parse::<f64>()
            .map_err(|e| anyhow!("{key} invalid float: {e}"))?),
    }
}

fn get_env_u64(key: &str, default: u64) -> Result<u64> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => Ok(v
            .parse::<u64>()
            .map_err(|e| anyhow!("{key} invalid int: {e}"))?),
    }
}

fn get_env_usize(key: &str, default: usize) -> Result<usize> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => Ok(v
            .parse::<usize>()
            .map_err(|e| anyhow!("{key} invalid int: {e}"))?),
    }
}

fn get_env_port(key: &str, default: u16) -> Result<u16> {
    let v = get_env_usize(key, default as usize)?;
    u16::try_from(v).map_err(|_| anyhow!("{key} out of range for a port: {v}"))
}

fn get_env_string(key: &str, default: &str) -> String {
    get_env(key).unwrap_or_else(|| default.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Job identity
    pub user_id: String,
    pub project_id: String,
    pub deploy_id: String,
    pub compile_id: String,

    // Throttle periods
    pub update_interval_ms: u64,
    pub equity_update_interval_secs: u64,
    pub persist_interval_secs: u64,
    pub log_flush_interval_secs: u64,

    // Queue / dispatcher
    pub queue_soft_cap: usize,
    pub idle_wait_ms: u64,

    // Outbound
    pub realtime_max_bytes: usize,
    pub store_async: bool,

    // Storage / dashboard
    pub sqlite_path: String,
    pub dashboard_enabled: bool,
    pub dashboard_host: String,
    pub dashboard_port: u16,

    // Demo host
    pub loop_ms: u64,
    pub starting_cash: f64,
    pub symbols: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_id: "0".to_string(),
            project_id: "0".to_string(),
            deploy_id: "L-local".to_string(),
            compile_id: "C-local".to_string(),
            update_interval_ms: 2_000,
            equity_update_interval_secs: 60,
            persist_interval_secs: 60,
            log_flush_interval_secs: 60,
            queue_soft_cap: 500,
            idle_wait_ms: 10,
            realtime_max_bytes: 32 * 1024,
            store_async: true,
            sqlite_path: "./data/live_results.sqlite".to_string(),
            dashboard_enabled: true,
            dashboard_host: "127.0.0.1".to_string(),
            dashboard_port: 8000,
            loop_ms: 250,
            starting_cash: 100_000.0,
            symbols: vec!["BTCUSD".to_string(), "SPY".to_string()],
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let d = Self::default();
        let symbols = get_env_string("SYMBOLS", &d.symbols.join(","))
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        let s = Self {
            user_id: get_env_string("USER_ID", &d.user_id),
            project_id: get_env_string("PROJECT_ID", &d.project_id),
            deploy_id: get_env("DEPLOY_ID").unwrap_or_else(|| format!("L-{}", Uuid::new_v4().simple())),
            compile_id: get_env("COMPILE_ID").unwrap_or_else(|| format!("C-{}", Uuid::new_v4().simple())),
            update_interval_ms: get_env_u64("UPDATE_INTERVAL_MS", d.update_interval_ms)?,
            equity_update_interval_secs: get_env_u64(
                "EQUITY_UPDATE_INTERVAL_SECS",
                d.equity_update_interval_secs,
            )?,
            persist_interval_secs: get_env_u64("PERSIST_INTERVAL_SECS", d.persist_interval_secs)?,
            log_flush_interval_secs: get_env_u64("LOG_FLUSH_INTERVAL_SECS", d.log_flush_interval_secs)?,
            queue_soft_cap: get_env_usize("QUEUE_SOFT_CAP", d.queue_soft_cap)?,
            idle_wait_ms: get_env_u64("IDLE_WAIT_MS", d.idle_wait_ms)?,
            realtime_max_bytes: get_env_usize("REALTIME_MAX_BYTES", d.realtime_max_bytes)?,
            store_async: get_env_bool("STORE_ASYNC", d.store_async),
            sqlite_path: get_env_string("SQLITE_PATH", &d.sqlite_path),
            dashboard_enabled: get_env_bool("DASHBOARD_ENABLED", d.dashboard_enabled),
            dashboard_host: get_env_string("DASHBOARD_HOST", &d.dashboard_host),
            dashboard_port: get_env_port("DASHBOARD_PORT", d.dashboard_port)?,
            loop_ms: get_env_u64("LOOP_MS", d.loop_ms)?,
            starting_cash: get_env_f64("STARTING_CASH", d.starting_cash)?,
            symbols,
        };

        s.validate()?;
        Ok(s)
    }

    pub fn job(&self) -> JobIds {
        JobIds {
            user_id: self.user_id.clone(),
            project_id: self.project_id.clone(),
            deploy_id: self.deploy_id.clone(),
            compile_id: self.compile_id.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.update_interval_ms < 1 {
            return Err(anyhow!(
                "UPDATE_INTERVAL_MS must be >= 1 (got {})",
                self.update_interval_ms
            ));
        }
        for (key, v) in [
            ("EQUITY_UPDATE_INTERVAL_SECS", self.equity_update_interval_secs),
            ("PERSIST_INTERVAL_SECS", self.persist_interval_secs),
            ("LOG_FLUSH_INTERVAL_SECS", self.log_flush_interval_secs),
        ] {
            if v < 1 {
                return Err(anyhow!("{key} must be >= 1 (got {v})"));
            }
        }
        if self.queue_soft_cap < 1 {
            return Err(anyhow!("QUEUE_SOFT_CAP must be >= 1 (got {})", self.queue_soft_cap));
        }
        if self.idle_wait_ms < 1 {
            return Err(anyhow!("IDLE_WAIT_MS must be >= 1 (got {})", self.idle_wait_ms));
        }
        if self.realtime_max_bytes < 1024 {
            return Err(anyhow!(
                "REALTIME_MAX_BYTES must be >= 1024 (got {})",
                self.realtime_max_bytes
            ));
        }
        if self.loop_ms < 1 {
            return Err(anyhow!("LOOP_MS must be >= 1 (got {})", self.loop_ms));
        }
        if !self.starting_cash.is_finite() || self.starting_cash <= 0.0 {
            return Err(anyhow!("STARTING_CASH must be > 0 (got {})", self.starting_cash));
        }
        if self.deploy_id.contains('/') || self.user_id.contains('/') || self.project_id.contains('/') {
            return Err(anyhow!("USER_ID, PROJECT_ID and DEPLOY_ID must not contain '/'"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let s = Settings::default();
        assert!(s.validate().is_ok());
        assert_eq!(s.queue_soft_cap, 500);
        assert_eq!(s.realtime_max_bytes, 32 * 1024);
    }

    #[test]
    fn port_out_of_range_is_an_error() {
        env::set_var("LIVERESULTS_CONFIG_TEST_PORT", "70000");
        assert!(get_env_port("LIVERESULTS_CONFIG_TEST_PORT", 8000).is_err());
        env::set_var("LIVERESULTS_CONFIG_TEST_PORT", "8080");
        assert_eq!(get_env_port("LIVERESULTS_CONFIG_TEST_PORT", 8000).unwrap(), 8080);
        env::remove_var("LIVERESULTS_CONFIG_TEST_PORT");
        assert_eq!(get_env_port("LIVERESULTS_CONFIG_TEST_PORT", 8000).unwrap(), 8000);
    }

    #[test]
    fn rejects_zero_periods_and_slashes() {
        let s = Settings {
            persist_interval_secs: 0,
            ..Settings::default()
        };
        assert!(s.validate().is_err());

        let s = Settings {
            deploy_id: "a/b".to_string(),
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }
}
