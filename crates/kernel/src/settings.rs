use std::path::PathBuf;

use anyhow::{anyhow, Context};
use chrono::Duration;
use serde::{Deserialize, Serialize};

const DEFAULT_ENV: &str = "local";
const ENV_VAR_NAME: &str = "BIBLIO_ENV";
const CONFIG_DIR_ENV: &str = "BIBLIO_CONFIG_DIR";

/// Deployment environment the application is running in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Staging,
    Production,
}

/// Top-level configuration structure loaded from layered sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    #[serde(default)]
    pub lending: LendingSettings,
}

impl Settings {
    /// Load configuration by layering `.env`, base file, and environment overlay.
    pub fn load() -> anyhow::Result<Self> {
        // Allow missing `.env` files without failing.
        let _ = dotenvy::dotenv();

        let environment = std::env::var(ENV_VAR_NAME).unwrap_or_else(|_| DEFAULT_ENV.to_string());
        let config_dir = match std::env::var(CONFIG_DIR_ENV) {
            Ok(dir) => PathBuf::from(dir),
            // Default to repo root `config` directory.
            Err(_) => std::env::current_dir()
                .context("unable to resolve current directory")?
                .join("config"),
        };

        let base_path = config_dir.join("base.toml");
        let environment_filename = format!("{}.toml", environment);
        let environment_path = config_dir.join(environment_filename);

        let builder = config::Config::builder()
            .add_source(config::File::from(base_path).required(false))
            .add_source(config::File::from(environment_path).required(false))
            .add_source(config::Environment::with_prefix("BIBLIO").separator("_"));

        let cfg = builder
            .build()
            .with_context(|| "failed to build configuration")?;

        let mut settings: Settings = cfg
            .try_deserialize()
            .with_context(|| "failed to deserialize configuration")?;

        // Override environment field with parsed enum variant.
        settings.environment = match environment.as_str() {
            "local" => Environment::Local,
            "staging" => Environment::Staging,
            "production" => Environment::Production,
            other => {
                return Err(anyhow!(
                    "unsupported environment '{}'; expected local/staging/production",
                    other
                ));
            }
        };

        Ok(settings)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "ServerSettings::default_host")]
    pub host: String,
    #[serde(default = "ServerSettings::default_port")]
    pub port: u16,
    #[serde(default = "ServerSettings::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ServerSettings {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        8080
    }

    fn default_request_timeout_ms() -> u64 {
        15000
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            request_timeout_ms: Self::default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Lending policy knobs. The state machine treats all of these as
/// configuration rather than hard-coded constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LendingSettings {
    /// Days a reader has to collect a confirmed reservation.
    #[serde(default = "LendingSettings::default_pickup_window_days")]
    pub pickup_window_days: i64,
    /// Days a reader may keep a collected book.
    #[serde(default = "LendingSettings::default_loan_window_days")]
    pub loan_window_days: i64,
    /// Maximum outstanding reservations per reader.
    #[serde(default = "LendingSettings::default_reservation_limit")]
    pub reservation_limit: u32,
    /// Overdue-linked reservations that get a reader blocked.
    #[serde(default = "LendingSettings::default_overdue_block_threshold")]
    pub overdue_block_threshold: u32,
    /// Seconds between reconciliation sweeps.
    #[serde(default = "LendingSettings::default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Days before a due date at which the one-time return reminder fires.
    #[serde(default = "LendingSettings::default_reminder_lookahead_days")]
    pub reminder_lookahead_days: i64,
}

impl LendingSettings {
    fn default_pickup_window_days() -> i64 {
        5
    }

    fn default_loan_window_days() -> i64 {
        14
    }

    fn default_reservation_limit() -> u32 {
        3
    }

    fn default_overdue_block_threshold() -> u32 {
        2
    }

    fn default_sweep_interval_secs() -> u64 {
        3600
    }

    fn default_reminder_lookahead_days() -> i64 {
        3
    }

    pub fn pickup_window(&self) -> Duration {
        Duration::days(self.pickup_window_days)
    }

    pub fn loan_window(&self) -> Duration {
        Duration::days(self.loan_window_days)
    }

    pub fn reminder_lookahead(&self) -> Duration {
        Duration::days(self.reminder_lookahead_days)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for LendingSettings {
    fn default() -> Self {
        Self {
            pickup_window_days: Self::default_pickup_window_days(),
            loan_window_days: Self::default_loan_window_days(),
            reservation_limit: Self::default_reservation_limit(),
            overdue_block_threshold: Self::default_overdue_block_threshold(),
            sweep_interval_secs: Self::default_sweep_interval_secs(),
            reminder_lookahead_days: Self::default_reminder_lookahead_days(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_environment_is_local() {
        let settings = Settings::default();
        assert_eq!(settings.environment, Environment::Local);
    }

    #[test]
    fn default_lending_policy_matches_library_rules() {
        let lending = LendingSettings::default();
        assert_eq!(lending.pickup_window(), Duration::days(5));
        assert_eq!(lending.loan_window(), Duration::days(14));
        assert_eq!(lending.reservation_limit, 3);
        assert_eq!(lending.overdue_block_threshold, 2);
    }
}
