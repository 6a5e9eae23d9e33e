use std::env;
use std::str::FromStr;
use std::time::Duration;

use foundation::RetryPolicy;
use tracing::warn;

/// Endpoint and retry settings, read from `PROBE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub connect_attempts: u32,
    pub retry_interval: Duration,
    pub bind_interval: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9080,
            path: "/".to_string(),
            connect_attempts: 10,
            retry_interval: Duration::from_millis(1000),
            bind_interval: Duration::from_millis(1000),
        }
    }
}

impl ProbeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("PROBE_HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PROBE_PORT", defaults.port),
            path: lookup("PROBE_PATH").unwrap_or(defaults.path),
            connect_attempts: parse_var(&lookup, "PROBE_CONNECT_ATTEMPTS", defaults.connect_attempts),
            retry_interval: Duration::from_millis(parse_var(
                &lookup,
                "PROBE_RETRY_MS",
                defaults.retry_interval.as_millis() as u64,
            )),
            bind_interval: Duration::from_millis(parse_var(
                &lookup,
                "PROBE_BIND_INTERVAL_MS",
                defaults.bind_interval.as_millis() as u64,
            )),
        }
    }

    pub fn url(&self) -> String {
        format!(
            "ws://{}:{}/{}",
            self.host,
            self.port,
            self.path.trim_start_matches('/')
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::limited(self.retry_interval, self.connect_attempts)
    }
}

fn parse_var<T: FromStr + Copy>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("ignoring invalid {key}={raw:?}");
            default
        }),
        None => default,
    }
}
