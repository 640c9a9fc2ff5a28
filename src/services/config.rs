use std::time::Duration;

use crate::transport::ConnectOptions;

const DEFAULT_BROKER_URL: &str = "ws://localhost:8080/chat-websocket";
const DEFAULT_MAX_CONNECT_ATTEMPTS: u32 = 5;

pub fn getenv(name: &str) -> String {
    match std::env::var(name) {
        Ok(var) => var,
        _ => "".to_string(),
    }
}

/// Broker destinations this client publishes to and subscribes on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destinations {
    pub room_topic: String,
    pub presence_topic: String,
    pub private_queue: String,
    pub join: String,
    pub send: String,
    pub private_send: String,
    pub leave: String,
}

impl Default for Destinations {
    fn default() -> Self {
        Destinations {
            room_topic: "/topic/messages".into(),
            presence_topic: "/topic/onlineUsers".into(),
            private_queue: "/user/queue/private".into(),
            join: "/app/join".into(),
            send: "/app/sendMessage".into(),
            private_send: "/app/privateMessage".into(),
            leave: "/app/leave".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub broker_url: String,
    pub options: ConnectOptions,
    /// Consecutive failed attempts before giving up.
    pub max_connect_attempts: u32,
    pub destinations: Destinations,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            broker_url: DEFAULT_BROKER_URL.into(),
            options: ConnectOptions::default(),
            max_connect_attempts: DEFAULT_MAX_CONNECT_ATTEMPTS,
            destinations: Destinations::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(getenv)
    }

    /// Builds a config from `lookup`, which returns an empty string for
    /// unset names.
    pub fn from_lookup(lookup: impl Fn(&str) -> String) -> Self {
        let defaults = ClientConfig::default();

        let mut broker_url = lookup("MARAIN_BROKER_URL");
        if broker_url.is_empty() {
            broker_url = defaults.broker_url.clone();
            log::warn!(
                "Could not find MARAIN_BROKER_URL environment variable. Falling back to {broker_url}."
            );
        }

        let millis = |name: &str, fallback: Duration| -> Duration {
            let raw = lookup(name);
            if raw.is_empty() {
                return fallback;
            }
            match raw.trim().parse::<u64>() {
                Ok(ms) => Duration::from_millis(ms),
                Err(e) => {
                    log::warn!("Ignoring {name}={raw:?} ({e}). Falling back to {fallback:?}.");
                    fallback
                }
            }
        };

        let options = ConnectOptions {
            reconnect_delay: millis("MARAIN_RECONNECT_DELAY_MS", defaults.options.reconnect_delay),
            heartbeat_incoming: millis(
                "MARAIN_HEARTBEAT_INCOMING_MS",
                defaults.options.heartbeat_incoming,
            ),
            heartbeat_outgoing: millis(
                "MARAIN_HEARTBEAT_OUTGOING_MS",
                defaults.options.heartbeat_outgoing,
            ),
            connect_timeout: millis("MARAIN_CONNECT_TIMEOUT_MS", defaults.options.connect_timeout),
        };

        let raw_attempts = lookup("MARAIN_MAX_CONNECT_ATTEMPTS");
        let max_connect_attempts = match raw_attempts.trim().parse::<u32>() {
            Ok(n) if n > 0 => n,
            _ if raw_attempts.is_empty() => defaults.max_connect_attempts,
            _ => {
                log::warn!(
                    "Ignoring MARAIN_MAX_CONNECT_ATTEMPTS={raw_attempts:?}. Falling back to {}.",
                    defaults.max_connect_attempts
                );
                defaults.max_connect_attempts
            }
        };

        ClientConfig {
            broker_url,
            options,
            max_connect_attempts,
            destinations: defaults.destinations,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> String {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned().unwrap_or_default()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = ClientConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.options.reconnect_delay, Duration::from_millis(500));
        assert_eq!(config.options.heartbeat_incoming, Duration::from_secs(10));
    }

    #[test]
    fn reads_overrides() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("MARAIN_BROKER_URL", "ws://chat.example:9000/ws"),
            ("MARAIN_RECONNECT_DELAY_MS", "2000"),
            ("MARAIN_HEARTBEAT_OUTGOING_MS", "0"),
            ("MARAIN_MAX_CONNECT_ATTEMPTS", "3"),
        ]));
        assert_eq!(config.broker_url, "ws://chat.example:9000/ws");
        assert_eq!(config.options.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.options.heartbeat_outgoing, Duration::ZERO);
        assert_eq!(config.max_connect_attempts, 3);
    }

    #[test]
    fn garbage_numbers_fall_back() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("MARAIN_RECONNECT_DELAY_MS", "soon"),
            ("MARAIN_MAX_CONNECT_ATTEMPTS", "0"),
        ]));
        assert_eq!(config.options.reconnect_delay, Duration::from_millis(500));
        assert_eq!(config.max_connect_attempts, 5);
    }
}
