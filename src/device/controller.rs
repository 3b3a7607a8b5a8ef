//! The driver itself: socket lifecycle, command/response correlation,
//! heartbeat supervision and the power choreography.
//!
//! One `PlayerController` owns one unit. Internally three activities can be
//! live at a time: the heartbeat loop, the listen loop and whichever
//! caller-issued command is currently in flight. Shared state sits behind
//! tokio primitives; commands serialize through a single gate so the one
//! pending-acknowledgment slot can never be clobbered.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::protocol::codec::{self, DiscState, TransportState};
use crate::protocol::{
    wol, ACK_CONTINUATION, FRAME_PREFIX, POWER_OFF_REPORT, POWER_ON_REPORT,
};

use super::models::{ControllerConfig, ControllerStatus};
use super::state::{PlayerSnapshot, SegmentOutcome};
use super::subscribers::{SubscriberId, SubscriberRegistry};
use super::{DeviceError, Result};

const POWER_ON_COMMAND: &str = "PWR01";
const POWER_OFF_COMMAND: &str = "PWR00";

/// Single-slot sink invoked (with no arguments) whenever any state field
/// changes. Last write wins.
type DataCallback = Arc<dyn Fn() + Send + Sync>;

/// Persistent, self-healing TCP driver for one BD-MP4K unit.
pub struct PlayerController {
    host: String,
    mac_address: Option<String>,
    config: ControllerConfig,

    /// Write half of the control socket. Presence of this handle is the
    /// live definition of "socket open".
    writer: Mutex<Option<OwnedWriteHalf>>,
    /// Stop signal for the listen loop of the current connection.
    listen_stop: Mutex<Option<mpsc::Sender<()>>>,
    /// The one awaited command result. The listen loop resolves it from
    /// ack/nack markers in inbound traffic.
    pending: Mutex<Option<oneshot::Sender<bool>>>,
    /// Serializes send+await so overlapping callers queue instead of
    /// overwriting each other's pending slot.
    command_gate: Mutex<()>,
    /// Collapses concurrent connection attempts into one.
    connect_lock: Mutex<()>,
    /// Collapses concurrent cleanup triggers into one effective run.
    cleanup_lock: Mutex<()>,

    /// Power-off guard window is active.
    shutting_down: Arc<AtomicBool>,
    /// Wake sequence is in flight.
    waking_up: Arc<AtomicBool>,

    state: RwLock<PlayerSnapshot>,
    subscribers: Arc<SubscriberRegistry>,
    data_changed: Mutex<Option<DataCallback>>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    /// Delayed tasks owned by this driver (guard resets, subscriber
    /// expiries) so disconnect can cancel them en masse.
    guard_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PlayerController {
    /// Create a driver with default timing parameters. The heartbeat loop
    /// starts lazily with the first connection attempt.
    pub fn new(host: impl Into<String>, mac_address: Option<&str>) -> Arc<Self> {
        Self::with_config(host, mac_address, ControllerConfig::default())
    }

    /// Create a driver with custom timing parameters.
    pub fn with_config(
        host: impl Into<String>,
        mac_address: Option<&str>,
        config: ControllerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            host: host.into(),
            mac_address: mac_address.map(str::to_string),
            config,
            writer: Mutex::new(None),
            listen_stop: Mutex::new(None),
            pending: Mutex::new(None),
            command_gate: Mutex::new(()),
            connect_lock: Mutex::new(()),
            cleanup_lock: Mutex::new(()),
            shutting_down: Arc::new(AtomicBool::new(false)),
            waking_up: Arc::new(AtomicBool::new(false)),
            state: RwLock::new(PlayerSnapshot::default()),
            subscribers: Arc::new(SubscriberRegistry::new()),
            data_changed: Mutex::new(None),
            heartbeat: Mutex::new(None),
            guard_tasks: Mutex::new(Vec::new()),
        })
    }

    /// Async factory: construct and attempt the initial connection before
    /// returning. The driver is usable either way; the heartbeat keeps
    /// retrying if the unit is off.
    pub async fn create(host: impl Into<String>, mac_address: Option<&str>) -> Arc<Self> {
        let controller = Self::new(host, mac_address);
        controller.connect().await;
        controller
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn mac_address(&self) -> Option<&str> {
        self.mac_address.as_deref()
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    // --- Status & snapshots ---

    /// Live status flags. `socket_open` and `heartbeat_running` are
    /// computed from the actual handles.
    pub async fn status(&self) -> ControllerStatus {
        ControllerStatus {
            socket_open: self.writer.lock().await.is_some(),
            heartbeat_running: self.heartbeat_running().await,
            shutting_down: self.shutting_down.load(Ordering::SeqCst),
            waking_up: self.waking_up.load(Ordering::SeqCst),
        }
    }

    /// Connected and not inside the power-off guard window.
    pub async fn is_connected(&self) -> bool {
        self.writer.lock().await.is_some() && !self.shutting_down.load(Ordering::SeqCst)
    }

    /// Clone of the full state snapshot.
    pub async fn snapshot(&self) -> PlayerSnapshot {
        self.state.read().await.clone()
    }

    pub async fn transport_state(&self) -> TransportState {
        self.state.read().await.transport
    }

    pub async fn disc_state(&self) -> DiscState {
        self.state.read().await.disc
    }

    pub async fn tray_open(&self) -> bool {
        self.state.read().await.tray_open
    }

    pub async fn is_muted(&self) -> bool {
        self.state.read().await.muted
    }

    /// True while the unit is playing, paused, scanning or in slow motion.
    pub async fn is_media_active(&self) -> bool {
        self.state.read().await.is_media_active()
    }

    async fn heartbeat_running(&self) -> bool {
        self.heartbeat
            .lock()
            .await
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    // --- Change notification ---

    /// Install the data-changed callback. There is exactly one slot;
    /// installing a new callback replaces the previous one.
    pub async fn set_data_changed_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.data_changed.lock().await = Some(Arc::new(callback));
    }

    pub async fn clear_data_changed_callback(&self) {
        *self.data_changed.lock().await = None;
    }

    async fn fire_data_changed(&self) {
        let callback = self.data_changed.lock().await.clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Register a listener for raw wire events, optionally filtered to
    /// events containing `filter`. Returns a token for `remove_subscriber`.
    pub async fn register_subscriber(
        &self,
        callback: impl Fn(&str) + Send + Sync + 'static,
        filter: Option<&str>,
    ) -> SubscriberId {
        self.subscribers
            .register(Arc::new(callback), filter.map(str::to_string))
            .await
    }

    /// Register a listener that unregisters itself after `ttl`. The expiry
    /// task is tracked and cancelled by `disconnect`.
    pub async fn register_subscriber_for(
        &self,
        callback: impl Fn(&str) + Send + Sync + 'static,
        filter: Option<&str>,
        ttl: Duration,
    ) -> SubscriberId {
        let id = self.register_subscriber(callback, filter).await;
        let registry = Arc::clone(&self.subscribers);
        let handle = tokio::spawn(async move {
            sleep(ttl).await;
            registry.remove(id).await;
        });
        self.track_guard_task(handle).await;
        id
    }

    pub async fn remove_subscriber(&self, id: SubscriberId) -> bool {
        self.subscribers.remove(id).await
    }

    // --- Transport commands ---

    /// Commence playback or resume from pause.
    pub async fn play(&self) -> bool {
        self.send_command("PLY").await
    }

    /// Halt playback and reset the transport position.
    pub async fn stop(&self) -> bool {
        self.send_command("STP").await
    }

    /// Freeze playback at the current timestamp.
    pub async fn pause(&self) -> bool {
        self.send_command("PAS").await
    }

    /// Skip to the next track or chapter.
    pub async fn next_track(&self) -> bool {
        self.send_command("SKPNX").await
    }

    /// Return to the start of the current track or the previous chapter.
    pub async fn previous_track(&self) -> bool {
        self.send_command("SKPPV").await
    }

    /// High-speed forward scan.
    pub async fn fast_forward(&self) -> bool {
        self.send_command("SCNFf").await
    }

    /// High-speed reverse scan.
    pub async fn rewind(&self) -> bool {
        self.send_command("SCNRf").await
    }

    // --- Navigation commands ---

    /// Confirm the current on-screen selection.
    pub async fn enter(&self) -> bool {
        self.send_command("ENT").await
    }

    /// Return to the previous menu level.
    pub async fn back(&self) -> bool {
        self.send_command("RET").await
    }

    pub async fn up(&self) -> bool {
        self.send_command("OSD3").await
    }

    pub async fn down(&self) -> bool {
        self.send_command("OSD4").await
    }

    pub async fn left(&self) -> bool {
        self.send_command("OSD1").await
    }

    pub async fn right(&self) -> bool {
        self.send_command("OSD2").await
    }

    // --- Menu commands ---

    /// Return to the unit's home screen.
    pub async fn home(&self) -> bool {
        self.send_command("HOM").await
    }

    /// Open the system settings menu.
    pub async fn setup(&self) -> bool {
        self.send_command("SMN").await
    }

    /// Disc-specific root menu (DVD/Blu-ray).
    pub async fn top_menu(&self) -> bool {
        self.send_command("TMN").await
    }

    /// The disc's pop-up menu during playback.
    pub async fn popup_menu(&self) -> bool {
        self.send_command("PMN").await
    }

    /// Context-sensitive playback options.
    pub async fn option_menu(&self) -> bool {
        self.send_command("OMN").await
    }

    /// Toggle the on-screen metadata display.
    pub async fn info(&self) -> bool {
        self.send_command("DSP").await
    }

    // --- Audio & utility commands ---

    /// Cycle through available audio tracks.
    pub async fn audio_track(&self) -> bool {
        self.send_command("ADG+").await
    }

    /// Cycle through available subtitle tracks.
    pub async fn subtitle(&self) -> bool {
        self.send_command("SBT1").await
    }

    /// Engage hardware muting (code 00).
    pub async fn mute_on(&self) -> bool {
        self.send_command("MUT00").await
    }

    /// Release hardware muting (code 01).
    pub async fn mute_off(&self) -> bool {
        self.send_command("MUT01").await
    }

    /// Query the unit for its mute state, then send the inverted command.
    pub async fn toggle_mute(&self) -> bool {
        if !self.is_connected().await {
            return false;
        }
        self.send_command("?MUT").await;
        sleep(self.config.status_settle).await;
        let muted = self.state.read().await.muted;
        self.send_command(if muted { "MUT01" } else { "MUT00" }).await
    }

    /// Query the unit for its tray state, then send the inverted command.
    pub async fn toggle_tray(&self) -> bool {
        if !self.is_connected().await {
            return false;
        }
        self.send_command("?MST").await;
        sleep(self.config.status_settle).await;
        let open = self.state.read().await.tray_open;
        self.send_command(if open { "OPCCL" } else { "OPCOP" }).await
    }

    // --- Power & connection ---

    /// Wake the unit.
    ///
    /// When already connected this degrades to a plain `PWR01`. Otherwise a
    /// wake-on-LAN magic packet is broadcast (universal and /24 directed)
    /// and the driver polls for the unit to come up, sending `PWR01` on the
    /// first successful connect. Without a known hardware address the
    /// attempt fails immediately.
    pub async fn power_on(self: &Arc<Self>) -> bool {
        if self.is_connected().await {
            return self.send_command(POWER_ON_COMMAND).await;
        }

        // Muzzle the heartbeat and reflect the attempt in the UI before
        // any network traffic happens.
        self.waking_up.store(true, Ordering::SeqCst);
        self.shutting_down.store(false, Ordering::SeqCst);
        self.state
            .write()
            .await
            .set_transport(TransportState::PoweringOn);
        self.fire_data_changed().await;

        let Some(mac) = self.mac_address.clone() else {
            log::warn!("[{}] Cannot wake: no hardware address known", self.host);
            self.waking_up.store(false, Ordering::SeqCst);
            self.state.write().await.set_transport(TransportState::Off);
            return false;
        };

        if let Err(e) = wol::send_wake(&mac, &self.host).await {
            log::warn!("[{}] Wake broadcast failed: {e}", self.host);
            self.waking_up.store(false, Ordering::SeqCst);
            self.state.write().await.set_transport(TransportState::Off);
            self.fire_data_changed().await;
            return false;
        }

        for attempt in 1..=self.config.wake_attempts {
            sleep(self.config.wake_poll_interval).await;
            if self.connect_with_timeout(self.config.probe_timeout).await {
                log::info!("[{}] Unit reachable after wake attempt {attempt}", self.host);
                let result = self.send_command(POWER_ON_COMMAND).await;
                self.waking_up.store(false, Ordering::SeqCst);
                self.fire_data_changed().await;
                return result;
            }
        }

        log::warn!("[{}] Unit did not come up after wake broadcast", self.host);
        self.waking_up.store(false, Ordering::SeqCst);
        self.state.write().await.set_transport(TransportState::Off);
        self.fire_data_changed().await;
        false
    }

    /// Put the unit into standby. The guard-window choreography runs in
    /// the post-acknowledgment hook of `send_command`.
    pub async fn power_off(&self) -> bool {
        if self.is_connected().await {
            self.send_command(POWER_OFF_COMMAND).await
        } else {
            false
        }
    }

    /// Try to connect with the configured timeout.
    pub async fn connect(self: &Arc<Self>) -> bool {
        self.connect_with_timeout(self.config.connect_timeout).await
    }

    /// Try to connect with an explicit timeout and start the listen loop.
    /// Concurrent callers collapse into one attempt; an existing
    /// connection short-circuits to `true`.
    pub async fn connect_with_timeout(self: &Arc<Self>, connect_timeout: Duration) -> bool {
        let _guard = self.connect_lock.lock().await;

        self.ensure_heartbeat().await;

        if self.is_connected().await {
            return true;
        }

        let attempt = timeout(
            connect_timeout,
            TcpStream::connect((self.host.as_str(), self.config.port)),
        )
        .await;
        let stream = match attempt {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                log::debug!("[{}] Connection failed: {e}", self.host);
                *self.writer.lock().await = None;
                return false;
            }
            Err(_) => {
                log::debug!("[{}] Connection attempt timed out", self.host);
                *self.writer.lock().await = None;
                return false;
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("[{}] set_nodelay failed: {e}", self.host);
        }
        let (read_half, write_half) = stream.into_split();
        *self.writer.lock().await = Some(write_half);

        log::info!("[{}] Connected on port {}", self.host, self.config.port);

        // The socket just opened: the unit is officially network-on.
        // Subscribers get the synthesized report as if it were wire traffic.
        self.subscribers.notify(POWER_ON_REPORT).await;

        let (stop_tx, stop_rx) = mpsc::channel(1);
        *self.listen_stop.lock().await = Some(stop_tx);
        tokio::spawn(Arc::clone(self).listen_loop(read_half, stop_rx));

        self.poll_sequenced().await;
        true
    }

    /// Stop the heartbeat, cancel tracked delayed tasks and tear down the
    /// connection.
    pub async fn disconnect(&self) {
        if let Some(task) = self.heartbeat.lock().await.take() {
            task.abort();
        }
        for task in self.guard_tasks.lock().await.drain(..) {
            task.abort();
        }
        // An explicit disconnect ends any guard window with the tasks that
        // would have cleared it.
        self.shutting_down.store(false, Ordering::SeqCst);
        self.waking_up.store(false, Ordering::SeqCst);
        self.cleanup().await;
        log::info!("[{}] Disconnected", self.host);
    }

    /// Send a raw command body (`!7` prefix optional) and wait for the
    /// unit's acknowledgment. This is also the passthrough for codes the
    /// typed API doesn't cover.
    pub async fn send_command(&self, body: &str) -> bool {
        let _gate = self.command_gate.lock().await;

        match self.dispatch(body).await {
            Ok(()) => {
                if body.contains(POWER_OFF_COMMAND) {
                    self.enter_shutdown_guard().await;
                }
                true
            }
            Err(e) => {
                log::debug!("[{}] Command {body} failed: {e}", self.host);
                false
            }
        }
    }

    // --- Internal engine ---

    async fn dispatch(&self, body: &str) -> Result<()> {
        // During the guard window only the power-on override passes.
        if self.shutting_down.load(Ordering::SeqCst) && !body.contains(POWER_ON_COMMAND) {
            return Err(DeviceError::ShuttingDown);
        }

        let frame = codec::encode_command(body);
        let (tx, rx) = oneshot::channel();
        *self.pending.lock().await = Some(tx);

        if let Err(e) = self.transmit(&frame).await {
            self.pending.lock().await.take();
            return Err(e);
        }
        log::trace!("[{}] Sent {}", self.host, frame.trim_end());

        match timeout(self.config.command_timeout, rx).await {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(DeviceError::Rejected),
            // Sender dropped: the connection was torn down mid-flight.
            Ok(Err(_)) => Err(DeviceError::NotConnected),
            Err(_) => {
                self.pending.lock().await.take();
                Err(DeviceError::AckTimeout)
            }
        }
    }

    async fn transmit(&self, frame: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(DeviceError::NotConnected)?;
        writer.write_all(frame.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Post-acknowledgment hook for `PWR00`: give the unit a graceful
    /// window in which every command except `PWR01` is refused.
    async fn enter_shutdown_guard(&self) {
        log::info!("[{}] Power-off acknowledged, entering shutdown guard", self.host);
        self.shutting_down.store(true, Ordering::SeqCst);
        self.state.write().await.set_transport(TransportState::Off);
        self.fire_data_changed().await;
        sleep(self.config.power_off_settle).await;
        self.cleanup().await;
        self.schedule_guard_reset().await;
    }

    /// Arrange for the guard flag to clear after the configured window.
    async fn schedule_guard_reset(&self) {
        let flag = Arc::clone(&self.shutting_down);
        let delay = self.config.shutdown_guard;
        let host = self.host.clone();
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            flag.store(false, Ordering::SeqCst);
            log::debug!("[{host}] Shutdown guard released");
        });
        self.track_guard_task(handle).await;
    }

    async fn track_guard_task(&self, handle: JoinHandle<()>) {
        let mut tasks = self.guard_tasks.lock().await;
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    // Returns a boxed `Send` future rather than an `async fn` so callers
    // embed a concrete trait object instead of this function's opaque future.
    // That breaks the async-recursion auto-trait inference cycle
    // (heartbeat_loop -> connect_with_timeout -> ensure_heartbeat ->
    // spawn(heartbeat_loop)); behavior is unchanged.
    fn ensure_heartbeat(
        self: &Arc<Self>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let mut slot = self.heartbeat.lock().await;
            let running = slot.as_ref().map(|task| !task.is_finished()).unwrap_or(false);
            if !running {
                let controller = Arc::clone(self);
                *slot = Some(tokio::spawn(controller.heartbeat_loop()));
            }
        })
    }

    /// Supervisory loop: reconnects while offline, polls while online and
    /// turns two consecutive poll failures into a detected power-off.
    async fn heartbeat_loop(self: Arc<Self>) {
        log::debug!("[{}] Heartbeat started", self.host);
        let mut fail_count = 0u32;

        loop {
            // Stay out of the way while a power transition is guarded.
            if self.shutting_down.load(Ordering::SeqCst)
                || self.waking_up.load(Ordering::SeqCst)
            {
                sleep(self.config.poll_interval).await;
                continue;
            }

            if !self.is_connected().await {
                if !self.connect_with_timeout(self.config.probe_timeout).await {
                    let transport = self.state.read().await.transport;
                    if transport != TransportState::Off
                        && !self.waking_up.load(Ordering::SeqCst)
                    {
                        log::info!("[{}] Connection lost, cleaning up", self.host);
                        self.cleanup().await;
                    }
                    log::debug!(
                        "[{}] Unit offline, polling again in {:?}",
                        self.host,
                        self.config.offline_retry_interval
                    );
                    sleep(self.config.offline_retry_interval).await;
                    continue;
                }
            } else if !self.poll_sequenced().await {
                fail_count += 1;
                log::warn!("[{}] Status poll failed (attempt {fail_count}/2)", self.host);

                if fail_count >= 2 {
                    // The unit was switched off via IR or the front panel.
                    log::info!("[{}] Manual shutdown detected", self.host);
                    self.shutting_down.store(true, Ordering::SeqCst);
                    self.cleanup().await;
                    self.schedule_guard_reset().await;
                    fail_count = 0;
                } else {
                    sleep(self.config.poll_retry_delay).await;
                    continue;
                }
            } else {
                fail_count = 0;
            }

            sleep(self.config.poll_interval).await;
        }
    }

    /// One fixed round of status queries. The leading `?SST` doubles as
    /// the liveness probe: without its ack the whole poll fails and the
    /// unit is presumed off. Position queries are skipped while idle.
    async fn poll_sequenced(&self) -> bool {
        if !self.send_command("?SST").await {
            return false;
        }

        let mut queries = vec!["?MUT", "?MST"];
        if self.is_media_active().await {
            queries.extend(["?SET", "?SRT", "?SGN", "?STC", "?STG", "?STT"]);
        }
        for query in queries {
            self.send_command(query).await;
            sleep(self.config.query_gap).await;
        }
        true
    }

    /// Reads solicited and unsolicited traffic until the socket closes or
    /// the stop signal arrives. Every exit path runs cleanup.
    async fn listen_loop(
        self: Arc<Self>,
        mut reader: OwnedReadHalf,
        mut stop_rx: mpsc::Receiver<()>,
    ) {
        let mut buf = vec![0u8; 4096];
        loop {
            tokio::select! {
                _ = stop_rx.recv() => break,
                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        log::debug!("[{}] Peer closed the connection", self.host);
                        break;
                    }
                    Ok(n) => {
                        // ASCII protocol: non-ASCII bytes are dropped, not fatal.
                        let raw: String = buf[..n]
                            .iter()
                            .copied()
                            .filter(u8::is_ascii)
                            .map(char::from)
                            .collect();

                        self.resolve_pending(&raw).await;

                        let cleaned = raw.trim().replace(ACK_CONTINUATION, "");
                        if cleaned.contains(FRAME_PREFIX) {
                            self.handle_report(&cleaned).await;
                        }
                    }
                    Err(e) => {
                        log::warn!("[{}] Listener error: {e}", self.host);
                        break;
                    }
                }
            }
        }
        self.cleanup().await;
    }

    /// Resolve the pending command slot from ack/nack markers anywhere in
    /// the chunk, independent of segment parsing.
    async fn resolve_pending(&self, raw: &str) {
        let lower = raw.to_ascii_lowercase();
        let rejected = lower.contains("nack") || lower.contains("error");
        let acked = lower.contains("ack") && !lower.contains("nack");
        if !acked && !rejected {
            return;
        }
        if let Some(tx) = self.pending.lock().await.take() {
            let _ = tx.send(acked);
        }
    }

    /// Apply one inbound burst of state reports.
    async fn handle_report(&self, raw: &str) {
        log::trace!("[{}] Raw data received: {raw}", self.host);

        let mut state_changed = false;
        let mut time_changed = false;

        for seg in codec::split_segments(raw) {
            let outcome = match codec::parse_segment(seg) {
                Some(field) => self.state.write().await.apply(field),
                None => SegmentOutcome::unmonitored(),
            };
            state_changed |= outcome.changed;
            time_changed |= outcome.time_changed;

            // Forward unmonitored traffic and real changes; suppress the
            // once-per-second time ticks so subscribers aren't flooded.
            if (!outcome.monitored || outcome.changed) && !outcome.time_changed {
                self.subscribers
                    .notify(&format!("{FRAME_PREFIX}{seg}"))
                    .await;
            }
        }

        {
            let mut state = self.state.write().await;
            if time_changed {
                state.recompute_total();
            }
            // Stale position data must not linger in menu/stopped states.
            if state.needs_metadata_clear() {
                state.clear_metadata();
                state_changed = true;
            }
        }

        if state_changed || time_changed {
            self.fire_data_changed().await;
        }
    }

    /// Reset to the idle state: close the socket, wipe metadata, tell
    /// everyone. Safe to trigger from several places at once; the lock
    /// plus the idle check make repeat runs a no-op.
    async fn cleanup(&self) {
        let _guard = self.cleanup_lock.lock().await;

        let already_idle = self.writer.lock().await.is_none()
            && self.state.read().await.transport == TransportState::Off;
        if already_idle {
            return;
        }

        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        if let Some(stop) = self.listen_stop.lock().await.take() {
            let _ = stop.send(()).await;
        }
        // Wake any command still waiting on an acknowledgment.
        self.pending.lock().await.take();

        {
            let mut state = self.state.write().await;
            state.set_transport(TransportState::Off);
            state.clear_metadata();
        }

        self.subscribers.notify(POWER_OFF_REPORT).await;
        self.fire_data_changed().await;
        log::debug!("[{}] Cleanup complete, driver idle", self.host);
    }
}

impl fmt::Display for PlayerController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Best-effort view: a contended lock reads as "closed".
        let socket_open = self
            .writer
            .try_lock()
            .map(|writer| writer.is_some())
            .unwrap_or(false);
        let heartbeat_running = self
            .heartbeat
            .try_lock()
            .map(|task| task.as_ref().map(|t| !t.is_finished()).unwrap_or(false))
            .unwrap_or(false);
        let status = ControllerStatus {
            socket_open,
            heartbeat_running,
            shutting_down: self.shutting_down.load(Ordering::SeqCst),
            waking_up: self.waking_up.load(Ordering::SeqCst),
        };
        write!(f, "PlayerController({}) [{status}]", self.host)
    }
}
