use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use crate::game::constants::timing;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// WebTransport port
    pub port: u16,
    /// Metrics HTTP port
    pub metrics_port: u16,
    /// Maximum number of concurrent rooms
    pub max_rooms: usize,
    /// Tick period
    pub tick_interval: Duration,
    /// Wall-clock limit of one generation
    pub match_duration: Duration,
    /// Countdown between both rematch consents and the next generation
    pub rematch_delay: Duration,
    /// Waiting-room expiry, `None` keeps rooms open forever
    pub waiting_room_ttl: Option<Duration>,
    /// Path to TLS certificate file (if not using self-signed)
    pub tls_cert_path: Option<String>,
    /// Path to TLS key file (if not using self-signed)
    pub tls_key_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 4433,
            metrics_port: 9090,
            max_rooms: 1000,
            tick_interval: Duration::from_millis(timing::TICK_DURATION_MS),
            match_duration: timing::MATCH_DURATION,
            rematch_delay: timing::REMATCH_DELAY,
            waiting_room_ttl: Some(timing::WAITING_ROOM_TTL),
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from any key lookup; invalid values fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = parse_var::<IpAddr, _>(&lookup, "BIND_ADDRESS") {
            config.bind_address = addr;
        }
        if let Some(port) = parse_var::<u16, _>(&lookup, "PORT") {
            if port > 0 {
                config.port = port;
            } else {
                tracing::warn!("PORT must be > 0, using default");
            }
        }
        if let Some(port) = parse_var::<u16, _>(&lookup, "METRICS_PORT") {
            config.metrics_port = port;
        }
        if let Some(max_rooms) = parse_var::<usize, _>(&lookup, "MAX_ROOMS") {
            if max_rooms > 0 && max_rooms <= 100_000 {
                config.max_rooms = max_rooms;
            } else {
                tracing::warn!("MAX_ROOMS must be 1-100000, using default");
            }
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "TICK_MS") {
            if ms > 0 {
                config.tick_interval = Duration::from_millis(ms);
            } else {
                tracing::warn!("TICK_MS must be > 0, using default");
            }
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "MATCH_DURATION_SECS") {
            if secs > 0 {
                config.match_duration = Duration::from_secs(secs);
            } else {
                tracing::warn!("MATCH_DURATION_SECS must be > 0, using default");
            }
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "REMATCH_DELAY_SECS") {
            config.rematch_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "WAITING_ROOM_TTL_SECS") {
            config.waiting_room_ttl = (secs > 0).then(|| Duration::from_secs(secs));
        }

        config.tls_cert_path = lookup("TLS_CERT_PATH");
        config.tls_key_path = lookup("TLS_KEY_PATH");

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }
        if self.max_rooms == 0 {
            return Err("max_rooms must be at least 1".to_string());
        }
        if self.tick_interval.is_zero() {
            return Err("tick_interval must be positive".to_string());
        }
        if self.match_duration < self.tick_interval {
            return Err("match_duration must be at least one tick".to_string());
        }
        if self.tls_cert_path.is_some() != self.tls_key_path.is_some() {
            return Err("TLS_CERT_PATH and TLS_KEY_PATH must be set together".to_string());
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 4433);
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.tick_interval, Duration::from_millis(100));
        assert_eq!(config.match_duration, Duration::from_secs(300));
        assert_eq!(config.rematch_delay, Duration::from_secs(5));
        assert_eq!(config.waiting_room_ttl, Some(Duration::from_secs(1800)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("BIND_ADDRESS", "127.0.0.1"),
            ("PORT", "5000"),
            ("TICK_MS", "50"),
            ("MATCH_DURATION_SECS", "60"),
            ("REMATCH_DELAY_SECS", "0"),
        ]);
        assert_eq!(config.bind_address, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.port, 5000);
        assert_eq!(config.tick_interval, Duration::from_millis(50));
        assert_eq!(config.match_duration, Duration::from_secs(60));
        assert_eq!(config.rematch_delay, Duration::ZERO);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[("PORT", "0"), ("TICK_MS", "fast"), ("MAX_ROOMS", "0")]);
        assert_eq!(config.port, 4433);
        assert_eq!(config.tick_interval, Duration::from_millis(100));
        assert_eq!(config.max_rooms, 1000);
    }

    #[test]
    fn test_zero_ttl_disables_expiry() {
        let config = from_pairs(&[("WAITING_ROOM_TTL_SECS", "0")]);
        assert!(config.waiting_room_ttl.is_none());
    }

    #[test]
    fn test_tls_paths_must_pair() {
        let config = from_pairs(&[("TLS_CERT_PATH", "cert.pem")]);
        assert!(config.validate().is_err());
    }
}
