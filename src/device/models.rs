use std::time::Duration;

use serde::{Deserialize, Serialize};

// Re-export wire-level models
pub use crate::protocol::codec::{DiscState, TransportState};
pub use crate::protocol::DEFAULT_PORT;

/// Live status of the driver, assembled on demand.
///
/// `socket_open` and `heartbeat_running` are derived from the actual socket
/// handle and supervisor task rather than stored, so they cannot drift from
/// reality. The two guard flags are the only stored bits of the state
/// machine. Normal transitions never assert `shutting_down` and `waking_up`
/// at the same time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerStatus {
    /// A TCP connection to the unit is established.
    pub socket_open: bool,
    /// The background heartbeat/reconnection loop is active.
    pub heartbeat_running: bool,
    /// The post-power-off guard window is active; only `PWR01` passes.
    pub shutting_down: bool,
    /// A wake sequence is in flight; the heartbeat stays out of the way.
    pub waking_up: bool,
}

impl ControllerStatus {
    /// Connected and supervised: the driver is fully operational.
    pub fn is_ready(&self) -> bool {
        self.socket_open && self.heartbeat_running
    }

    /// Names of the asserted flags, for logging and `Display`.
    pub fn active_flags(&self) -> Vec<&'static str> {
        let mut flags = Vec::new();
        if self.socket_open {
            flags.push("SOCKET_OPEN");
        }
        if self.heartbeat_running {
            flags.push("HEARTBEAT_RUN");
        }
        if self.shutting_down {
            flags.push("SHUTTING_DOWN");
        }
        if self.waking_up {
            flags.push("WAKING_UP");
        }
        flags
    }
}

impl std::fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let flags = self.active_flags();
        if flags.is_empty() {
            f.write_str("NONE")
        } else {
            f.write_str(&flags.join("|"))
        }
    }
}

/// Timing parameters of the driver. The defaults match the unit's observed
/// behavior; tests shrink them to keep the suite fast.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// TCP control port.
    pub port: u16,
    /// Timeout for caller-initiated connection attempts.
    pub connect_timeout: Duration,
    /// Shorter timeout used by the heartbeat and the wake polling loop.
    pub probe_timeout: Duration,
    /// How long to wait for a command acknowledgment.
    pub command_timeout: Duration,
    /// Steady-state heartbeat cadence, also the guard re-check interval.
    pub poll_interval: Duration,
    /// Delay before retrying after a single failed poll.
    pub poll_retry_delay: Duration,
    /// Backoff between reconnection attempts while the unit is offline.
    pub offline_retry_interval: Duration,
    /// Guard window after a confirmed or detected power-off.
    pub shutdown_guard: Duration,
    /// Gap between queries of a sequenced poll so the unit's receive
    /// buffer is not overrun.
    pub query_gap: Duration,
    /// Settle time between a status query and the inverted command in the
    /// toggle helpers.
    pub status_settle: Duration,
    /// Pause between a successful `PWR00` and the socket teardown.
    pub power_off_settle: Duration,
    /// Connection attempts made after a wake broadcast.
    pub wake_attempts: u32,
    /// Spacing of those attempts.
    pub wake_poll_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_millis(1500),
            probe_timeout: Duration::from_secs(1),
            command_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_secs(2),
            poll_retry_delay: Duration::from_secs(1),
            offline_retry_interval: Duration::from_secs(10),
            shutdown_guard: Duration::from_secs(15),
            query_gap: Duration::from_millis(30),
            status_settle: Duration::from_millis(100),
            power_off_settle: Duration::from_millis(500),
            wake_attempts: 7,
            wake_poll_interval: Duration::from_secs(2),
        }
    }
}
