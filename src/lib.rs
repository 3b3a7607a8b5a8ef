//! Network control driver for the Tascam BD-MP4K Blu-ray player.
//!
//! The unit speaks a line-oriented ASCII protocol ("!7" command family)
//! over TCP port 9030. This crate keeps a connection alive across power
//! cycles, remote-control interference and network flakiness, exposes
//! imperative transport/navigation commands, and maintains a continuously
//! updated state snapshot fed by both solicited responses and unsolicited
//! push reports.
//!
//! ```no_run
//! use tascam_bdmp4k::PlayerController;
//!
//! # async fn demo() {
//! let player = PlayerController::create("192.168.1.40", Some("aa:bb:cc:dd:ee:ff")).await;
//! player.play().await;
//! println!("{}", player.transport_state().await);
//! # }
//! ```

pub mod device;
pub mod protocol;

pub use device::{
    ControllerConfig, ControllerStatus, DeviceError, PlayerController, PlayerSnapshot,
    SubscriberId,
};
pub use device::state::format_seconds;
pub use protocol::codec::{DiscState, TransportState};
pub use protocol::DEFAULT_PORT;
