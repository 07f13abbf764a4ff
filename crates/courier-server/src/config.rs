use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use courier_gateway::GatewayConfig;

/// Smallest accepted frame limit. Anything lower cannot carry a registration.
const MIN_FRAME_BYTES: usize = 1024;

/// Listener address plus gateway tunables, read from `COURIER_*` variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub gateway: GatewayConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset variables take their defaults; set-but-invalid ones are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = GatewayConfig::default();

        let host = lookup("COURIER_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse(&lookup, "COURIER_PORT", 8080)?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let outbound_capacity: usize =
            parse(&lookup, "COURIER_OUTBOUND_CAPACITY", defaults.outbound_capacity)?;
        anyhow::ensure!(outbound_capacity > 0, "COURIER_OUTBOUND_CAPACITY must be at least 1");

        let send_timeout_ms: u64 = parse(
            &lookup,
            "COURIER_SEND_TIMEOUT_MS",
            defaults.send_timeout.as_millis() as u64,
        )?;
        let max_frame_size: usize =
            parse(&lookup, "COURIER_MAX_FRAME_BYTES", defaults.max_frame_size)?;
        anyhow::ensure!(
            max_frame_size >= MIN_FRAME_BYTES,
            "COURIER_MAX_FRAME_BYTES must be at least {}",
            MIN_FRAME_BYTES
        );

        Ok(Self {
            addr,
            gateway: GatewayConfig {
                outbound_capacity,
                send_timeout: Duration::from_millis(send_timeout_ms),
                max_frame_size,
            },
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} has invalid value {:?}", key, value)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.gateway.outbound_capacity, 256);
        assert_eq!(config.gateway.send_timeout, Duration::from_secs(5));
        assert_eq!(config.gateway.max_frame_size, 16 * 1024 * 1024);
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("COURIER_HOST", "127.0.0.1"),
            ("COURIER_PORT", "9000"),
            ("COURIER_SEND_TIMEOUT_MS", "250"),
            ("COURIER_MAX_FRAME_BYTES", "4096"),
        ])
        .unwrap();
        assert_eq!(config.addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.gateway.send_timeout, Duration::from_millis(250));
        assert_eq!(config.gateway.max_frame_size, 4096);
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(config(&[("COURIER_PORT", "eighty")]).is_err());
        assert!(config(&[("COURIER_PORT", "70000")]).is_err());
        assert!(config(&[("COURIER_HOST", "not a host")]).is_err());
        assert!(config(&[("COURIER_OUTBOUND_CAPACITY", "0")]).is_err());
        assert!(config(&[("COURIER_MAX_FRAME_BYTES", "0")]).is_err());
        assert!(config(&[("COURIER_MAX_FRAME_BYTES", "1023")]).is_err());
        assert!(config(&[("COURIER_MAX_FRAME_BYTES", "1024")]).is_ok());
    }
}
