pub mod codec;
pub mod wol;

/// Default TCP control port of the BD-MP4K.
pub const DEFAULT_PORT: u16 = 9030;

/// Frame delimiter shared by outbound commands and inbound state reports.
pub const FRAME_PREFIX: &str = "!7";

/// Carriage return terminating every outbound frame.
pub const FRAME_TERMINATOR: char = '\r';

/// Response-continuation marker the unit prepends to payload-carrying acks.
pub const ACK_CONTINUATION: &str = "ack+";

/// Synthesized report delivered to subscribers when the control socket opens.
pub const POWER_ON_REPORT: &str = "!7SSTON";

/// Synthesized report delivered to subscribers when the driver tears down.
pub const POWER_OFF_REPORT: &str = "!7SSTOFF";

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid hardware address: {0}")]
    InvalidHardwareAddress(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
