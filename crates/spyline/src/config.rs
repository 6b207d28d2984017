//! Server configuration, with environment overrides.

use std::time::Duration;

use spyline_game::{GameRules, ImpostorDeparture};
use spyline_session::SessionConfig;
use spyline_timer::TimerConfig;
use tracing::warn;

/// Everything needed to run a server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to. Default: `0.0.0.0:3000`.
    pub bind_addr: String,
    pub session: SessionConfig,
    pub timer: TimerConfig,
    pub rules: GameRules,
    /// How often idle lobbies are reclaimed. Default: 60 s.
    pub sweep_interval: Duration,
    /// Seed for role and turn-order draws. `None` seeds from the OS.
    pub rng_seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            session: SessionConfig::default(),
            timer: TimerConfig::default(),
            rules: GameRules::default(),
            sweep_interval: Duration::from_secs(60),
            rng_seed: None,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by the process environment.
    ///
    /// | Variable | Effect |
    /// |---|---|
    /// | `SPYLINE_BIND` | full bind address |
    /// | `PORT` | port on `0.0.0.0`, when `SPYLINE_BIND` is unset |
    /// | `SPYLINE_IDLE_RETENTION_SECS` | idle lobby retention |
    /// | `SPYLINE_TICK_MS` | countdown tick interval |
    /// | `SPYLINE_REROLL_IMPOSTOR` | `true`/`1` to redraw a departed impostor |
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("SPYLINE_BIND") {
            config.bind_addr = addr;
        } else if let Some(port) = parse::<u16>(&lookup, "PORT") {
            config.bind_addr = format!("0.0.0.0:{port}");
        }
        if let Some(secs) = parse::<u64>(&lookup, "SPYLINE_IDLE_RETENTION_SECS") {
            config.session.idle_retention = Duration::from_secs(secs);
        }
        if let Some(ms) = parse::<u64>(&lookup, "SPYLINE_TICK_MS") {
            config.timer.tick_interval = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup("SPYLINE_REROLL_IMPOSTOR") {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => config.rules.impostor_departure = ImpostorDeparture::Reroll,
                "0" | "false" | "no" => config.rules.impostor_departure = ImpostorDeparture::Keep,
                other => warn!(value = other, "SPYLINE_REROLL_IMPOSTOR not a boolean, ignoring"),
            }
        }
        config
    }

    /// Clamp out-of-range values across every section.
    pub fn validated(mut self) -> Self {
        self.timer = self.timer.validated();
        self.rules = self.rules.validated();
        if self.sweep_interval.is_zero() {
            warn!("sweep_interval of 0, clamping to 1s");
            self.sweep_interval = Duration::from_secs(1);
        }
        self
    }
}

fn parse<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "unparseable environment value, ignoring");
            None
        }
    }
}
