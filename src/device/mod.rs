pub mod controller;
pub mod models;
pub mod state;
pub mod subscribers;

pub use controller::PlayerController;
pub use models::*;
pub use state::PlayerSnapshot;
pub use subscribers::SubscriberId;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Not connected")]
    NotConnected,

    #[error("Command blocked while the unit is shutting down")]
    ShuttingDown,

    #[error("No acknowledgment from the unit")]
    AckTimeout,

    #[error("Unit rejected the command")]
    Rejected,

    #[error("Protocol error: {0}")]
    ProtocolError(#[from] crate::protocol::ProtocolError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
