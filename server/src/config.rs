use crate::error::ServerError;
use crate::game::GameConfig;
use shared::DEFAULT_TICK_RATE;
use std::time::Duration;

/// Highest tick rate accepted; anything faster is almost certainly a typo.
pub const MAX_TICK_RATE: u32 = 1000;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listener binds to, e.g. `127.0.0.1:8080`.
    pub bind_addr: String,
    /// Only websocket upgrades on this path are accepted.
    pub path: String,
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Snapshots queued per connection before it counts as stalled.
    pub outbound_buffer: usize,
    /// Paddle moves queued for the game loop before new ones are dropped.
    pub input_queue: usize,
    /// Upper bound on a single websocket write.
    pub send_timeout: Duration,
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            path: "/game".to_string(),
            tick_rate: DEFAULT_TICK_RATE,
            outbound_buffer: 16,
            input_queue: 1000,
            send_timeout: Duration::from_millis(250),
            game: GameConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Period between two simulation ticks.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    /// Rejects settings the server cannot run with, including an invalid
    /// game configuration.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.tick_rate == 0 || self.tick_rate > MAX_TICK_RATE {
            return Err(ServerError::InvalidConfig(format!(
                "tick rate must be between 1 and {}, got {}",
                MAX_TICK_RATE, self.tick_rate
            )));
        }
        if !self.path.starts_with('/') {
            return Err(ServerError::InvalidConfig(format!(
                "endpoint path {:?} must start with '/'",
                self.path
            )));
        }
        if self.outbound_buffer == 0 || self.input_queue == 0 {
            return Err(ServerError::InvalidConfig(
                "queue sizes must be non-zero".to_string(),
            ));
        }
        if self.send_timeout.is_zero() {
            return Err(ServerError::InvalidConfig(
                "send timeout must be non-zero".to_string(),
            ));
        }
        self.game.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_rate, 64);
        assert_eq!(config.tick_duration(), Duration::from_micros(15_625));
    }

    #[test]
    fn test_twenty_hz_period() {
        let config = ServerConfig {
            tick_rate: 20,
            ..ServerConfig::default()
        };
        assert_eq!(config.tick_duration(), Duration::from_millis(50));
    }

    #[test]
    fn test_rejects_bad_values() {
        let cases = vec![
            ServerConfig {
                tick_rate: 0,
                ..ServerConfig::default()
            },
            ServerConfig {
                tick_rate: MAX_TICK_RATE + 1,
                ..ServerConfig::default()
            },
            ServerConfig {
                path: "game".to_string(),
                ..ServerConfig::default()
            },
            ServerConfig {
                outbound_buffer: 0,
                ..ServerConfig::default()
            },
            ServerConfig {
                send_timeout: Duration::ZERO,
                ..ServerConfig::default()
            },
        ];

        for config in cases {
            assert!(matches!(
                config.validate(),
                Err(ServerError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_rejects_bad_game_config() {
        let mut config = ServerConfig::default();
        config.game.height = 5.0;
        assert!(config.validate().is_err());
    }
}
