mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use common::{eager_config, quiet_config, FakePlayer};
use tascam_bdmp4k::{PlayerController, TransportState};

#[tokio::test]
async fn power_off_enters_the_guard_window() {
    common::init_logging();
    let fake = FakePlayer::start_acking().await;
    let player =
        PlayerController::with_config("127.0.0.1", None, quiet_config(fake.addr.port()));
    assert!(player.connect().await);

    assert!(player.power_off().await);

    let status = player.status().await;
    assert!(status.shutting_down);
    assert!(!status.socket_open);
    assert_eq!(player.transport_state().await, TransportState::Off);

    // Everything except the power-on override is refused during the window.
    assert!(!player.play().await);
    assert!(!player.stop().await);
    assert!(!player.send_command("?SST").await);

    player.disconnect().await;
}

#[tokio::test]
async fn power_on_clears_the_guard_and_fails_without_hardware_address() {
    common::init_logging();
    let fake = FakePlayer::start_acking().await;
    let player =
        PlayerController::with_config("127.0.0.1", None, quiet_config(fake.addr.port()));
    assert!(player.connect().await);
    assert!(player.power_off().await);
    assert!(player.status().await.shutting_down);

    // No hardware address known: the attempt aborts straight back to Off,
    // but the guard window it cleared stays cleared.
    assert!(!player.power_on().await);
    let status = player.status().await;
    assert!(!status.shutting_down);
    assert!(!status.waking_up);
    assert_eq!(player.transport_state().await, TransportState::Off);

    player.disconnect().await;
}

#[tokio::test]
async fn power_on_while_connected_degrades_to_a_plain_command() {
    common::init_logging();
    let fake = FakePlayer::start_acking().await;
    let player = PlayerController::with_config(
        "127.0.0.1",
        Some("aa:bb:cc:dd:ee:ff"),
        quiet_config(fake.addr.port()),
    );
    assert!(player.connect().await);

    assert!(player.power_on().await);
    assert!(!player.status().await.waking_up);

    player.disconnect().await;
}

#[tokio::test]
async fn two_silent_polls_read_as_a_manual_shutdown() {
    common::init_logging();
    let fake = FakePlayer::start_acking().await;
    let player =
        PlayerController::with_config("127.0.0.1", None, eager_config(fake.addr.port()));
    assert!(player.connect().await);
    assert!(player.is_connected().await);

    // The unit dies without closing the socket (IR remote, front panel).
    fake.go_silent();
    sleep(Duration::from_secs(3)).await;

    let status = player.status().await;
    assert!(status.shutting_down, "status was {status}");
    assert!(!status.socket_open);
    assert_eq!(player.transport_state().await, TransportState::Off);

    player.disconnect().await;
}

#[tokio::test]
async fn concurrent_teardowns_collapse_to_one_off_event() {
    common::init_logging();
    let fake = FakePlayer::start_acking().await;
    let player =
        PlayerController::with_config("127.0.0.1", None, quiet_config(fake.addr.port()));
    assert!(player.connect().await);

    let off_events = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&off_events);
    player
        .register_subscriber(
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            Some("SSTOFF"),
        )
        .await;

    let callbacks = Arc::new(AtomicUsize::new(0));
    let cb_counter = Arc::clone(&callbacks);
    player
        .set_data_changed_callback(move || {
            cb_counter.fetch_add(1, Ordering::SeqCst);
        })
        .await;

    tokio::join!(player.disconnect(), player.disconnect());
    sleep(Duration::from_millis(200)).await;

    assert_eq!(off_events.load(Ordering::SeqCst), 1);
    assert_eq!(callbacks.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn metadata_is_wiped_on_teardown() {
    common::init_logging();
    let fake = FakePlayer::start(|body| match body {
        "BURST" => "ack+!7SST PL!7MSTCI!7TN0005!7SET0000122!7SRT0000238".to_string(),
        _ => "ack".to_string(),
    })
    .await;

    let player =
        PlayerController::with_config("127.0.0.1", None, quiet_config(fake.addr.port()));
    assert!(player.connect().await);
    assert!(player.send_command("BURST").await);
    sleep(Duration::from_millis(300)).await;
    assert_eq!(player.snapshot().await.current_track, "5");

    player.disconnect().await;

    let snapshot = player.snapshot().await;
    assert_eq!(snapshot.transport, TransportState::Off);
    assert_eq!(snapshot.current_track, "0");
    assert_eq!(snapshot.elapsed_seconds, 0);
    assert_eq!(snapshot.total_seconds, 0);
}
