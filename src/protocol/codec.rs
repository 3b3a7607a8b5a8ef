//! Pure codec for the BD-MP4K "!7" line protocol.
//!
//! Outbound frames are `!7<BODY>\r`. Inbound traffic is a concatenation of
//! bare `ack`/`nack`/`error` tokens and `!7<SEGMENT>` state reports, often
//! several per read. Everything here is free of I/O and locking; the
//! controller feeds decoded fields into the snapshot layer.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{FRAME_PREFIX, FRAME_TERMINATOR};

/// Transport state reported by `SST` segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportState {
    Play,
    Pause,
    Stop,
    FastForward,
    FastReverse,
    SlowForward,
    SlowReverse,
    Setup,
    Home,
    MediaCenter,
    RootMenu,
    PoweringOn,
    Off,
    Unknown,
}

impl TransportState {
    /// Resolve a transport code from an `SST` report (BD-MP4K protocol
    /// section 5.3). Unlisted codes return `None` so the caller leaves the
    /// current state untouched.
    pub fn from_wire(code: &str) -> Option<Self> {
        match code {
            "PL" => Some(Self::Play),
            "PP" => Some(Self::Pause),
            "ST" => Some(Self::Stop),
            "DVFF" => Some(Self::FastForward),
            "DVFR" => Some(Self::FastReverse),
            "DVSF" => Some(Self::SlowForward),
            "DVSR" => Some(Self::SlowReverse),
            "DVSU" => Some(Self::Setup),
            "DVHM" => Some(Self::Home),
            "DVMC" => Some(Self::MediaCenter),
            "DVTR" => Some(Self::RootMenu),
            "DVPL" => Some(Self::PoweringOn),
            _ => None,
        }
    }

    /// True while the unit is actively moving through media (play, pause,
    /// scan or slow motion). Position queries are only worth issuing in
    /// these states.
    pub fn is_media_active(&self) -> bool {
        matches!(
            self,
            Self::Play
                | Self::Pause
                | Self::FastForward
                | Self::FastReverse
                | Self::SlowForward
                | Self::SlowReverse
        )
    }
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Play => "Playing",
            Self::Pause => "Paused",
            Self::Stop => "Stopped",
            Self::FastForward => "Fast Forward",
            Self::FastReverse => "Fast Reverse",
            Self::SlowForward => "Slow Forward",
            Self::SlowReverse => "Slow Reverse",
            Self::Setup => "Setup Mode",
            Self::Home => "Home Menu",
            Self::MediaCenter => "Media Centre",
            Self::RootMenu => "Root Menu",
            Self::PoweringOn => "Powering On",
            Self::Off => "Off",
            Self::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// Disc / tray state reported by `MST` segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscState {
    NoMedia,
    Disc,
    TrayOpen,
    TrayClosed,
    TrayError,
    Unknown,
}

impl DiscState {
    /// Resolve the two-character media code carried at offset 3 of an `MST`
    /// segment. Unknown codes map to `Unknown` (unit busy or undefined).
    pub fn from_wire(code: &str) -> Self {
        match code {
            "NC" => Self::NoMedia,
            "CI" => Self::Disc,
            "TO" => Self::TrayOpen,
            "TC" => Self::TrayClosed,
            "TE" => Self::TrayError,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for DiscState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::NoMedia => "No Media",
            Self::Disc => "Disc",
            Self::TrayOpen => "Tray Open",
            Self::TrayClosed => "Tray Closed",
            Self::TrayError => "Tray Error",
            Self::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// One monitored field decoded from a state-report segment.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// `SST` transport report. `None` means the code was unrecognized; the
    /// segment still counts as monitored but changes nothing.
    Transport(Option<TransportState>),
    /// `MST` media report; disc status and tray flag are diffed separately.
    Disc { status: DiscState, tray_open: bool },
    /// `MUT` report; `00` is muted, `01` is unmuted.
    Mute(bool),
    CurrentGroup(String),
    TotalGroups(String),
    CurrentTrack(String),
    TotalTracks(String),
    ElapsedSeconds(u64),
    RemainingSeconds(u64),
}

/// Build a wire frame from a command body: trim, prepend `!7` when the
/// caller didn't, terminate with a carriage return.
pub fn encode_command(body: &str) -> String {
    let body = body.trim();
    if body.starts_with(FRAME_PREFIX) {
        format!("{body}{FRAME_TERMINATOR}")
    } else {
        format!("{FRAME_PREFIX}{body}{FRAME_TERMINATOR}")
    }
}

/// Split an inbound chunk on the `!7` delimiter, dropping empty pieces,
/// bare acknowledgment tokens and anything shorter than two characters.
pub fn split_segments(raw: &str) -> Vec<&str> {
    raw.split(FRAME_PREFIX)
        .filter(|&seg| seg.len() >= 2 && !is_bare_token(seg))
        .collect()
}

fn is_bare_token(seg: &str) -> bool {
    seg.eq_ignore_ascii_case("ack")
        || seg.eq_ignore_ascii_case("nack")
        || seg.eq_ignore_ascii_case("error")
}

/// Decode a single segment into a monitored field.
///
/// Dispatch is by fixed prefix, most specific first where prefixes overlap
/// (`TGNX` before `TN`). Returns `None` for segments the driver does not
/// monitor; those are still forwarded verbatim to subscribers.
pub fn parse_segment(seg: &str) -> Option<Field> {
    // A segment carrying UNKN marks a momentarily undefined value: numeric
    // fields resolve to "0" and time fields to 0 instead of being parsed.
    let transitional = seg.contains("UNKN");

    if let Some(code) = seg.strip_prefix("SST") {
        return Some(Field::Transport(TransportState::from_wire(code.trim())));
    }
    if seg.starts_with("MST") {
        let code = seg.get(3..5).unwrap_or("");
        return Some(Field::Disc {
            status: DiscState::from_wire(code),
            tray_open: code == "TO",
        });
    }
    if seg.starts_with("MUT") {
        return Some(Field::Mute(seg.get(3..5) == Some("00")));
    }
    if seg.starts_with("GN") {
        return Some(Field::CurrentGroup(numeric_value(seg, transitional)));
    }
    if seg.starts_with("TGNX") {
        return Some(Field::TotalGroups(numeric_value(seg, transitional)));
    }
    if seg.starts_with("TN") {
        return Some(Field::CurrentTrack(numeric_value(seg, transitional)));
    }
    if seg.starts_with("TT") {
        return Some(Field::TotalTracks(numeric_value(seg, transitional)));
    }
    if let Some(payload) = seg.strip_prefix("SET") {
        let secs = if transitional { 0 } else { time_to_seconds(payload) };
        return Some(Field::ElapsedSeconds(secs));
    }
    if let Some(payload) = seg.strip_prefix("SRT") {
        let secs = if transitional { 0 } else { time_to_seconds(payload) };
        return Some(Field::RemainingSeconds(secs));
    }
    None
}

/// Extract a group/track number: every ASCII digit in the segment with
/// leading zeros stripped; an empty result maps to "0".
fn numeric_value(seg: &str, transitional: bool) -> String {
    if transitional {
        return "0".to_string();
    }
    let digits: String = seg.chars().filter(char::is_ascii_digit).collect();
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

// Time payloads end in seven digits: HHHMMSS, anchored at the end of the
// segment so stray leading characters don't shift the fields.
static TIME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{3})(\d{2})(\d{2})$").unwrap());

/// Convert a trailing `HHHMMSS` payload to total seconds. No match reads
/// as zero.
pub fn time_to_seconds(payload: &str) -> u64 {
    match TIME_PATTERN.captures(payload) {
        Some(caps) => {
            let hours: u64 = caps[1].parse().unwrap_or(0);
            let minutes: u64 = caps[2].parse().unwrap_or(0);
            let seconds: u64 = caps[3].parse().unwrap_or(0);
            hours * 3600 + minutes * 60 + seconds
        }
        None => 0,
    }
}
