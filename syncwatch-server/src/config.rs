use std::{env, str::FromStr, time::Duration};

use syncwatch_core::{Config, ResumePolicy};
use thiserror::Error;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;

/// Everything needed to start a server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub core: Config,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{variable} has invalid value \"{value}\": {reason}")]
    InvalidValue {
        variable: &'static str,
        value: String,
        reason: String,
    },
    #[error("The liveness window ({window:?}) must be longer than the heartbeat interval ({heartbeat:?})")]
    WindowTooShort { window: Duration, heartbeat: Duration },
}

impl ServerConfig {
    /// Reads the configuration from `SYNCWATCH_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the configuration through the given variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut core = Config::default();

        let port = parse(&lookup, "SYNCWATCH_SERVER_PORT")?.unwrap_or(DEFAULT_PORT);

        if let Some(ms) = parse::<u64, _>(&lookup, "SYNCWATCH_HEARTBEAT_INTERVAL_MS")? {
            core.heartbeat_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "SYNCWATCH_LIVENESS_WINDOW_MS")? {
            core.liveness_window = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "SYNCWATCH_SWEEP_INTERVAL_MS")? {
            core.sweep_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(retention) = parse(&lookup, "SYNCWATCH_CHAT_RETENTION")? {
            core.chat_retention = retention;
        }
        if let Some(resume) = parse::<bool, _>(&lookup, "SYNCWATCH_RESUME_POSITION")? {
            core.resume_policy = if resume {
                ResumePolicy::Resume
            } else {
                ResumePolicy::Reset
            };
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "SYNCWATCH_IDLE_SESSION_TTL_SECS")? {
            // Zero keeps empty sessions forever
            core.idle_session_ttl = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(admins) = lookup("SYNCWATCH_ADMINS") {
            core.admins = admins
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect();
        }

        if core.liveness_window <= core.heartbeat_interval {
            return Err(ConfigError::WindowTooShort {
                window: core.liveness_window,
                heartbeat: core.heartbeat_interval,
            });
        }

        Ok(Self { port, core })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            core: Config::default(),
        }
    }
}

fn parse<T, F>(lookup: &F, variable: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(variable) else {
        return Ok(None);
    };

    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            variable,
            value,
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod test {
    use std::{collections::HashMap, time::Duration};

    use syncwatch_core::ResumePolicy;

    use super::{ConfigError, ServerConfig, DEFAULT_PORT};

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<_, _> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_without_variables() {
        let config = config(&[]).unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.core.heartbeat_interval, Duration::from_secs(3));
        assert_eq!(config.core.idle_session_ttl, None);
    }

    #[test]
    fn variables_override_defaults() {
        let config = config(&[
            ("SYNCWATCH_SERVER_PORT", "8080"),
            ("SYNCWATCH_LIVENESS_WINDOW_MS", "15000"),
            ("SYNCWATCH_RESUME_POSITION", "true"),
            ("SYNCWATCH_IDLE_SESSION_TTL_SECS", "3600"),
            ("SYNCWATCH_ADMINS", "root, ops ,"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.core.liveness_window, Duration::from_secs(15));
        assert_eq!(config.core.resume_policy, ResumePolicy::Resume);
        assert_eq!(config.core.idle_session_ttl, Some(Duration::from_secs(3600)));
        assert_eq!(config.core.admins, vec!["root", "ops"]);
    }

    #[test]
    fn invalid_values_are_reported() {
        let result = config(&[("SYNCWATCH_SERVER_PORT", "ninety")]);

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                variable: "SYNCWATCH_SERVER_PORT",
                ..
            })
        ));
    }

    #[test]
    fn window_must_outlast_the_heartbeat() {
        let result = config(&[
            ("SYNCWATCH_HEARTBEAT_INTERVAL_MS", "5000"),
            ("SYNCWATCH_LIVENESS_WINDOW_MS", "5000"),
        ]);

        assert!(matches!(result, Err(ConfigError::WindowTooShort { .. })));
    }
}
