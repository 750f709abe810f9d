//! PINGREQ scheduling.
//!
//! The session is strictly sequential and has no clock of its own, so the
//! keep-alive interval is honoured by pacing: after every publish the session
//! idles for a quarter of the interval and then sends a PINGREQ. That keeps
//! the gap between two control packets well inside the interval the broker
//! enforces (one and a half times the keep-alive).

/// Paces PINGREQ packets against the negotiated keep-alive interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAliveController {
    keep_alive_seconds: u16,
}

impl KeepAliveController {
    /// Create a controller for the keep-alive interval sent in CONNECT.
    pub const fn new(keep_alive_seconds: u16) -> Self {
        Self { keep_alive_seconds }
    }

    /// Whether a PINGREQ should follow each idle delay.
    pub fn is_enabled(&self) -> bool {
        self.keep_alive_seconds != 0
    }

    /// Idle time between a publish and the following PINGREQ.
    pub fn idle_delay_ms(&self) -> u32 {
        u32::from(self.keep_alive_seconds) * 1_000 / 4
    }

    /// The keep-alive interval in seconds.
    pub fn keep_alive_seconds(&self) -> u16 {
        self.keep_alive_seconds
    }
}
