//! Shared fixture: a scripted loopback stand-in for the unit.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use tascam_bdmp4k::ControllerConfig;

type Responder = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Accepts connections on an ephemeral loopback port, reads CR-terminated
/// frames and answers each through the supplied responder. An empty
/// response string means "stay quiet". `go_silent` simulates a unit that
/// died without closing the socket.
pub struct FakePlayer {
    pub addr: SocketAddr,
    silent: Arc<AtomicBool>,
}

impl FakePlayer {
    pub async fn start(responder: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let silent = Arc::new(AtomicBool::new(false));
        let responder: Responder = Arc::new(responder);

        let accept_silent = Arc::clone(&silent);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let responder = Arc::clone(&responder);
                let silent = Arc::clone(&accept_silent);
                tokio::spawn(handle_connection(stream, responder, silent));
            }
        });

        Self { addr, silent }
    }

    /// Ack every frame.
    pub async fn start_acking() -> Self {
        Self::start(|_| "ack".to_string()).await
    }

    /// Stop answering without closing the socket.
    pub fn go_silent(&self) {
        self.silent.store(true, Ordering::SeqCst);
    }
}

async fn handle_connection(mut stream: TcpStream, responder: Responder, silent: Arc<AtomicBool>) {
    let mut buf = [0u8; 1024];
    let mut partial = String::new();
    loop {
        let Ok(n) = stream.read(&mut buf).await else {
            break;
        };
        if n == 0 {
            break;
        }
        partial.push_str(&String::from_utf8_lossy(&buf[..n]));
        while let Some(pos) = partial.find('\r') {
            let frame: String = partial[..pos].to_string();
            partial.drain(..=pos);
            if silent.load(Ordering::SeqCst) {
                continue;
            }
            let body = frame.strip_prefix("!7").unwrap_or(&frame).to_string();
            let reply = responder(&body);
            if !reply.is_empty() && stream.write_all(reply.as_bytes()).await.is_err() {
                return;
            }
        }
    }
}

/// Short timeouts, quiet heartbeat: suitable for command-level tests where
/// the supervisor should stay out of the way.
pub fn quiet_config(port: u16) -> ControllerConfig {
    ControllerConfig {
        port,
        connect_timeout: Duration::from_millis(250),
        probe_timeout: Duration::from_millis(250),
        command_timeout: Duration::from_millis(250),
        poll_interval: Duration::from_secs(60),
        poll_retry_delay: Duration::from_millis(50),
        offline_retry_interval: Duration::from_secs(60),
        shutdown_guard: Duration::from_secs(60),
        query_gap: Duration::from_millis(5),
        status_settle: Duration::from_millis(30),
        power_off_settle: Duration::from_millis(30),
        wake_attempts: 1,
        wake_poll_interval: Duration::from_millis(50),
    }
}

/// Fast heartbeat cadence for supervisor-behavior tests.
pub fn eager_config(port: u16) -> ControllerConfig {
    ControllerConfig {
        poll_interval: Duration::from_millis(150),
        command_timeout: Duration::from_millis(150),
        probe_timeout: Duration::from_millis(150),
        ..quiet_config(port)
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
