use tascam_bdmp4k::protocol::codec::{parse_segment, split_segments};
use tascam_bdmp4k::{format_seconds, DiscState, PlayerSnapshot, TransportState};

fn apply_burst(snapshot: &mut PlayerSnapshot, raw: &str) -> (bool, bool) {
    let mut state_changed = false;
    let mut time_changed = false;
    for seg in split_segments(raw) {
        if let Some(field) = parse_segment(seg) {
            let outcome = snapshot.apply(field);
            state_changed |= outcome.changed;
            time_changed |= outcome.time_changed;
        }
    }
    if time_changed {
        snapshot.recompute_total();
    }
    if snapshot.needs_metadata_clear() {
        snapshot.clear_metadata();
        state_changed = true;
    }
    (state_changed, time_changed)
}

#[test]
fn burst_updates_all_fields_and_derives_total() {
    let mut snapshot = PlayerSnapshot::default();
    let (state_changed, time_changed) =
        apply_burst(&mut snapshot, "!7SST PL!7MUT01!7SET0000122!7SRT0000238");

    assert_eq!(snapshot.transport, TransportState::Play);
    assert!(!snapshot.muted);
    assert_eq!(snapshot.elapsed_seconds, 82);
    assert_eq!(snapshot.remaining_seconds, 158);
    assert_eq!(snapshot.total_seconds, 240);
    assert!(state_changed);
    assert!(time_changed);
}

#[test]
fn unchanged_values_report_no_change() {
    let mut snapshot = PlayerSnapshot::default();
    apply_burst(&mut snapshot, "!7SST PL!7SET0000122");

    let outcome = snapshot.apply(parse_segment("SET0000122").unwrap());
    assert!(outcome.monitored);
    assert!(!outcome.changed);
    assert!(!outcome.time_changed);

    let outcome = snapshot.apply(parse_segment("SST PL").unwrap());
    assert!(!outcome.changed);
}

#[test]
fn total_is_retained_until_both_counters_are_positive() {
    let mut snapshot = PlayerSnapshot::default();
    apply_burst(&mut snapshot, "!7SST PL!7SET0000100!7SRT0000200");
    assert_eq!(snapshot.total_seconds, 180);

    // Remaining drops to zero: the total keeps its last value.
    apply_burst(&mut snapshot, "!7SET0000130!7SRT0000000");
    assert_eq!(snapshot.total_seconds, 180);
}

#[test]
fn unrecognized_transport_code_leaves_state_unchanged() {
    let mut snapshot = PlayerSnapshot::default();
    apply_burst(&mut snapshot, "!7SST PL");
    apply_burst(&mut snapshot, "!7SSTWEIRD");
    assert_eq!(snapshot.transport, TransportState::Play);
}

#[test]
fn stale_position_is_cleared_outside_active_media() {
    let mut snapshot = PlayerSnapshot::default();
    apply_burst(
        &mut snapshot,
        "!7SST PL!7MSTCI!7GNMX0001!7TN0003!7SET0000122!7SRT0000238",
    );
    assert_eq!(snapshot.current_track, "3");
    assert_eq!(snapshot.disc, DiscState::Disc);

    // The unit drops back to its home menu: position data must not linger.
    let (state_changed, _) = apply_burst(&mut snapshot, "!7SSTDVHM");
    assert!(state_changed);
    assert_eq!(snapshot.transport, TransportState::Home);
    assert_eq!(snapshot.current_track, "0");
    assert_eq!(snapshot.current_group, "0");
    assert_eq!(snapshot.elapsed_seconds, 0);
    assert_eq!(snapshot.total_seconds, 0);
    assert_eq!(snapshot.disc, DiscState::NoMedia);
    assert!(!snapshot.tray_open);
}

#[test]
fn tray_flag_follows_the_media_code() {
    let mut snapshot = PlayerSnapshot::default();
    apply_burst(&mut snapshot, "!7MSTTO");
    assert!(snapshot.tray_open);
    assert_eq!(snapshot.disc, DiscState::TrayOpen);

    apply_burst(&mut snapshot, "!7MSTTC");
    assert!(!snapshot.tray_open);
    assert_eq!(snapshot.disc, DiscState::TrayClosed);
}

#[test]
fn format_seconds_renders_hms() {
    assert_eq!(format_seconds(0), "00:00:00");
    assert_eq!(format_seconds(82), "00:01:22");
    assert_eq!(format_seconds(3 * 3600 + 25 * 60 + 7), "03:25:07");
}
