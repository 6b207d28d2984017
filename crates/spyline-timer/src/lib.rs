//! Keyed countdown scheduler for Spyline sessions.
//!
//! One countdown per `(session, kind)`, each running as its own Tokio task
//! that decrements once per tick interval and reports through a single
//! mpsc channel. The owner of the receiving end (the gateway loop) applies
//! the signals to session state.
//!
//! # Stale signals
//!
//! Restarting or cancelling a countdown aborts its task, but a signal the
//! task already queued may still be sitting in the channel. Every countdown
//! therefore carries a generation number, and [`TimerScheduler::accept`]
//! rejects signals from anything but the live generation of their key. As
//! long as the owner checks `accept` before acting, at most one countdown
//! per key ever touches session state.
//!
//! # Integration
//!
//! ```ignore
//! let (mut timers, mut timer_rx) = TimerScheduler::new(TimerConfig::default());
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* may call timers.start / cancel */ }
//!         Some(event) = timer_rx.recv() => {
//!             if timers.accept(&event) {
//!                 /* apply Tick / Expired */
//!             }
//!         }
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use spyline_protocol::SessionId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct TimerConfig {
    /// How long one "second" of countdown lasts. Default: 1 s.
    pub tick_interval: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
        }
    }
}

impl TimerConfig {
    /// Shortest accepted tick interval.
    pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

    /// Clamp out-of-range values. Called by [`TimerScheduler::new`].
    pub fn validated(mut self) -> Self {
        if self.tick_interval < Self::MIN_TICK_INTERVAL {
            warn!(
                tick_interval_ms = self.tick_interval.as_secs_f64() * 1000.0,
                "tick_interval below minimum, clamping to 1ms"
            );
            self.tick_interval = Self::MIN_TICK_INTERVAL;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Keys and signals
// ---------------------------------------------------------------------------

/// Which countdown of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    PreGame,
    Turn,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreGame => write!(f, "preGame"),
            Self::Turn => write!(f, "turn"),
        }
    }
}

/// Addresses one countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerKey {
    pub session: SessionId,
    pub kind: TimerKind,
}

impl TimerKey {
    pub fn new(session: SessionId, kind: TimerKind) -> Self {
        Self { session, kind }
    }
}

/// What a countdown reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSignal {
    /// One interval elapsed; `remaining` seconds are left.
    Tick { remaining: u32 },
    /// The countdown reached zero. Sent once, after the final tick.
    Expired,
}

/// A signal tagged with the countdown that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    pub key: TimerKey,
    pub generation: u64,
    pub signal: TimerSignal,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct ActiveTimer {
    generation: u64,
    task: JoinHandle<()>,
}

/// Owns every running countdown.
///
/// Must be used from within a Tokio runtime; [`start`](Self::start) spawns.
pub struct TimerScheduler {
    config: TimerConfig,
    active: HashMap<TimerKey, ActiveTimer>,
    next_generation: u64,
    events: mpsc::UnboundedSender<TimerEvent>,
}

impl TimerScheduler {
    /// Creates a scheduler and the receiver its countdowns report to.
    pub fn new(config: TimerConfig) -> (Self, mpsc::UnboundedReceiver<TimerEvent>) {
        let config = config.validated();
        let (events, rx) = mpsc::unbounded_channel();
        debug!(tick_interval_ms = config.tick_interval.as_millis() as u64, "timer scheduler created");
        let scheduler = Self {
            config,
            active: HashMap::new(),
            next_generation: 0,
            events,
        };
        (scheduler, rx)
    }

    pub fn tick_interval(&self) -> Duration {
        self.config.tick_interval
    }

    /// Starts a countdown of `seconds` for `(session, kind)`.
    ///
    /// Any countdown already running for that key is cancelled first. A
    /// countdown of zero expires immediately without ticking. Returns the
    /// generation of the new countdown.
    pub fn start(&mut self, session: SessionId, kind: TimerKind, seconds: u32) -> u64 {
        let key = TimerKey::new(session, kind);
        self.cancel(session, kind);

        self.next_generation += 1;
        let generation = self.next_generation;
        let period = self.config.tick_interval;
        let events = self.events.clone();

        let task = tokio::spawn(async move {
            let emit = |signal| events.send(TimerEvent { key, generation, signal }).is_ok();

            if seconds == 0 {
                emit(TimerSignal::Expired);
                return;
            }

            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut remaining = seconds;
            loop {
                interval.tick().await;
                remaining -= 1;
                if !emit(TimerSignal::Tick { remaining }) {
                    return;
                }
                if remaining == 0 {
                    emit(TimerSignal::Expired);
                    return;
                }
            }
        });

        debug!(session_id = %session, kind = %kind, seconds, generation, "countdown started");
        self.active.insert(key, ActiveTimer { generation, task });
        generation
    }

    /// Stops the countdown for `(session, kind)`. No-op if none is running.
    pub fn cancel(&mut self, session: SessionId, kind: TimerKind) -> bool {
        let key = TimerKey::new(session, kind);
        match self.active.remove(&key) {
            Some(timer) => {
                timer.task.abort();
                debug!(session_id = %session, kind = %kind, generation = timer.generation, "countdown cancelled");
                true
            }
            None => false,
        }
    }

    /// Stops every countdown of `session`.
    pub fn cancel_all(&mut self, session: SessionId) {
        self.cancel(session, TimerKind::PreGame);
        self.cancel(session, TimerKind::Turn);
    }

    /// Returns `true` if `event` comes from the live countdown of its key.
    ///
    /// An accepted [`TimerSignal::Expired`] retires the countdown, so a
    /// second call with the same event returns `false`.
    pub fn accept(&mut self, event: &TimerEvent) -> bool {
        let live = self
            .active
            .get(&event.key)
            .is_some_and(|t| t.generation == event.generation);
        if !live {
            trace!(
                session_id = %event.key.session,
                kind = %event.key.kind,
                generation = event.generation,
                "discarding stale timer signal"
            );
            return false;
        }
        if event.signal == TimerSignal::Expired {
            self.active.remove(&event.key);
        }
        true
    }

    pub fn is_active(&self, session: SessionId, kind: TimerKind) -> bool {
        self.active.contains_key(&TimerKey::new(session, kind))
    }

    /// Number of running countdowns across all sessions.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        for timer in self.active.values() {
            timer.task.abort();
        }
    }
}

impl fmt::Debug for TimerScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerScheduler")
            .field("config", &self.config)
            .field("active", &self.active.len())
            .field("next_generation", &self.next_generation)
            .finish()
    }
}
