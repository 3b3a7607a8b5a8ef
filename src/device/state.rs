//! Mutable snapshot of everything known about the unit, with built-in
//! change detection so the controller can decide who needs to hear about
//! an update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::codec::{DiscState, Field, TransportState};

/// Result of applying one decoded segment to the snapshot.
///
/// `changed` covers non-time value changes; `time_changed` covers the
/// elapsed/remaining counters. The split drives two independent decisions:
/// the data-changed callback fires on any change, while subscribers are
/// spared the once-per-second time ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentOutcome {
    /// The segment carried a field the driver tracks.
    pub monitored: bool,
    /// A tracked non-time field actually changed value.
    pub changed: bool,
    /// A time field actually changed value.
    pub time_changed: bool,
}

impl SegmentOutcome {
    /// Outcome for a segment the driver does not track.
    pub fn unmonitored() -> Self {
        Self::default()
    }
}

/// Everything the driver knows about the unit at one point in time.
///
/// Owned exclusively by the controller; callers receive clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub transport: TransportState,
    pub disc: DiscState,
    pub tray_open: bool,
    pub muted: bool,
    /// Current disc title (group), leading zeros stripped.
    pub current_group: String,
    pub total_groups: String,
    /// Current chapter (track), leading zeros stripped.
    pub current_track: String,
    pub total_tracks: String,
    pub elapsed_seconds: u64,
    pub remaining_seconds: u64,
    /// Derived: elapsed + remaining, recomputed only while both are
    /// positive, retained otherwise.
    pub total_seconds: u64,
    /// When a field last changed.
    pub last_update: DateTime<Utc>,
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        Self {
            transport: TransportState::Off,
            disc: DiscState::NoMedia,
            tray_open: false,
            muted: false,
            current_group: "0".to_string(),
            total_groups: "0".to_string(),
            current_track: "0".to_string(),
            total_tracks: "0".to_string(),
            elapsed_seconds: 0,
            remaining_seconds: 0,
            total_seconds: 0,
            last_update: Utc::now(),
        }
    }
}

impl PlayerSnapshot {
    /// Apply one decoded field with per-field compare-and-set.
    pub fn apply(&mut self, field: Field) -> SegmentOutcome {
        let mut outcome = SegmentOutcome {
            monitored: true,
            ..Default::default()
        };

        match field {
            Field::Transport(Some(state)) => {
                outcome.changed = self.set_transport(state);
            }
            // Recognized SST segment with an unlisted code: monitored, no-op.
            Field::Transport(None) => {}
            Field::Disc { status, tray_open } => {
                if self.disc != status {
                    self.disc = status;
                    outcome.changed = true;
                }
                if self.tray_open != tray_open {
                    self.tray_open = tray_open;
                    outcome.changed = true;
                }
            }
            Field::Mute(muted) => {
                if self.muted != muted {
                    self.muted = muted;
                    outcome.changed = true;
                }
            }
            Field::CurrentGroup(value) => {
                outcome.changed = set_string(&mut self.current_group, value);
            }
            Field::TotalGroups(value) => {
                outcome.changed = set_string(&mut self.total_groups, value);
            }
            Field::CurrentTrack(value) => {
                outcome.changed = set_string(&mut self.current_track, value);
            }
            Field::TotalTracks(value) => {
                outcome.changed = set_string(&mut self.total_tracks, value);
            }
            Field::ElapsedSeconds(secs) => {
                if self.elapsed_seconds != secs {
                    self.elapsed_seconds = secs;
                    outcome.time_changed = true;
                }
            }
            Field::RemainingSeconds(secs) => {
                if self.remaining_seconds != secs {
                    self.remaining_seconds = secs;
                    outcome.time_changed = true;
                }
            }
        }

        if outcome.changed || outcome.time_changed {
            self.last_update = Utc::now();
        }
        outcome
    }

    /// Force the transport state, reporting whether it changed.
    pub fn set_transport(&mut self, state: TransportState) -> bool {
        if self.transport != state {
            self.transport = state;
            self.last_update = Utc::now();
            true
        } else {
            false
        }
    }

    /// Recompute the derived total after a burst in which time moved. Only
    /// valid while both counters are positive; otherwise the last total is
    /// retained until cleared.
    pub fn recompute_total(&mut self) {
        if self.elapsed_seconds > 0 && self.remaining_seconds > 0 {
            self.total_seconds = self.elapsed_seconds + self.remaining_seconds;
        }
    }

    /// True when stale position data is lingering in a menu/stopped/off
    /// state and must be wiped.
    pub fn needs_metadata_clear(&self) -> bool {
        (!self.transport.is_media_active() || self.transport == TransportState::Off)
            && (self.elapsed_seconds != 0 || self.current_track != "0")
    }

    /// Reset all track, group, time and disc data to defaults. The
    /// transport state is owned by the caller.
    pub fn clear_metadata(&mut self) {
        self.current_group = "0".to_string();
        self.total_groups = "0".to_string();
        self.current_track = "0".to_string();
        self.total_tracks = "0".to_string();
        self.elapsed_seconds = 0;
        self.remaining_seconds = 0;
        self.total_seconds = 0;
        self.disc = DiscState::NoMedia;
        self.tray_open = false;
        self.last_update = Utc::now();
    }

    /// Convenience passthrough for the transport state.
    pub fn is_media_active(&self) -> bool {
        self.transport.is_media_active()
    }
}

fn set_string(slot: &mut String, value: String) -> bool {
    if *slot != value {
        *slot = value;
        true
    } else {
        false
    }
}

/// Render a second count as `HH:MM:SS` for display surfaces.
pub fn format_seconds(total: u64) -> String {
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
