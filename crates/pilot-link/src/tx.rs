use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::state::{ControlUpdate, FlightControls};
use crate::LinkConfig;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("could not resolve target address {0}")]
    AddressResolution(String),
    #[error("could not create outbound socket: {0}")]
    SocketCreation(std::io::Error),
    #[error("send failed: {0}")]
    Send(std::io::Error),
}

/// Per-session send counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkStats {
    pub frames_sent: u64,
    pub send_failures: u64,
    pub consecutive_failures: u32,
}

/// Cloneable view of the session, handed to the monitor and display layers
/// so they never need the transmitter itself. Tracks liveness and the
/// resolved target of the current session; a restart to a new address shows
/// up here immediately.
#[derive(Clone, Default)]
pub struct LinkStatus {
    pub(crate) connected: Arc<AtomicBool>,
    pub(crate) target: Arc<Mutex<Option<SocketAddr>>>,
}

impl LinkStatus {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Resolved target of the running session, `None` while stopped.
    pub fn target(&self) -> Option<SocketAddr> {
        *self.target.lock().unwrap()
    }
}

/// Streams the shared control record to the receiver at a fixed rate.
///
/// The outbound socket is owned by the worker task and dropped only after
/// the send loop has exited, so a frame can never go out on a closed socket.
pub struct LinkTransmitter {
    cfg: LinkConfig,
    controls: FlightControls,
    status: LinkStatus,
    stats: Arc<Mutex<LinkStats>>,
    worker: Option<Worker>,
}

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl LinkTransmitter {
    pub fn new(cfg: LinkConfig, controls: FlightControls) -> Self {
        Self {
            cfg,
            controls,
            status: LinkStatus::default(),
            stats: Arc::new(Mutex::new(LinkStats::default())),
            worker: None,
        }
    }

    /// Starts streaming to `addr` on the configured port, stopping any
    /// previous session first. Start problems are logged and reported as
    /// `false`; the transmitter stays stopped and can be retried.
    pub async fn start(&mut self, addr: &str) -> bool {
        match self.try_start(addr).await {
            Ok(()) => true,
            Err(err) => {
                warn!("link: start failed: {}", err);
                false
            }
        }
    }

    async fn try_start(&mut self, addr: &str) -> Result<(), LinkError> {
        self.stop().await;

        let target = lookup_host((addr, self.cfg.port))
            .await
            .ok()
            .and_then(|mut candidates| candidates.next())
            .ok_or_else(|| LinkError::AddressResolution(addr.to_string()))?;

        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(LinkError::SocketCreation)?;
        socket.connect(target).await.map_err(LinkError::SocketCreation)?;

        *self.stats.lock().unwrap() = LinkStats::default();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(send_loop(
            socket,
            self.controls.clone(),
            Duration::from_millis(self.cfg.rate_ms.max(1)),
            self.status.connected.clone(),
            self.stats.clone(),
            shutdown_rx,
        ));
        *self.status.target.lock().unwrap() = Some(target);
        self.status.connected.store(true, Ordering::Relaxed);
        self.worker = Some(Worker { shutdown, handle });
        info!("link: streaming to {} every {} ms", target, self.cfg.rate_ms);
        Ok(())
    }

    /// Stops the send loop and waits until it has actually exited, which
    /// also closes the socket. Safe to call when already stopped.
    pub async fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.shutdown.send(true);
            let _ = worker.handle.await;
            *self.status.target.lock().unwrap() = None;
            info!("link: stopped");
        }
    }

    /// Applies a control update. Usable in any state; a value set while
    /// stopped simply rides out with the first frame of the next session.
    pub fn update(&self, update: ControlUpdate) {
        self.controls.apply(update);
    }

    pub fn controls(&self) -> &FlightControls {
        &self.controls
    }

    /// Liveness only: true while the send loop is up. Says nothing about
    /// whether frames actually reach the receiver.
    pub fn is_connected(&self) -> bool {
        self.worker.is_some() && self.status.is_connected()
    }

    pub fn status(&self) -> LinkStatus {
        self.status.clone()
    }

    pub fn stats(&self) -> LinkStats {
        *self.stats.lock().unwrap()
    }

    /// Resolved target of the running session.
    pub fn target(&self) -> Option<SocketAddr> {
        self.status.target()
    }
}

impl Drop for LinkTransmitter {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.shutdown.send(true);
            worker.handle.abort();
            self.status.connected.store(false, Ordering::Relaxed);
            *self.status.target.lock().unwrap() = None;
        }
    }
}

async fn send_loop(
    socket: UdpSocket,
    controls: FlightControls,
    period: Duration,
    connected: Arc<AtomicBool>,
    stats: Arc<Mutex<LinkStats>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    // a late tick is skipped forward, never bunched up
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let frame = controls.snapshot().encode();
                match socket.send(&frame).await {
                    Ok(n) => {
                        let mut s = stats.lock().unwrap();
                        s.frames_sent += 1;
                        s.consecutive_failures = 0;
                        debug!("link: sent {} bytes", n);
                    }
                    Err(e) => {
                        let err = LinkError::Send(e);
                        let failures = {
                            let mut s = stats.lock().unwrap();
                            s.send_failures += 1;
                            s.consecutive_failures += 1;
                            s.consecutive_failures
                        };
                        if failures == 1 {
                            warn!("link: {}", err);
                        } else {
                            debug!("link: {} (consecutive failures: {})", err, failures);
                        }
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    connected.store(false, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_proto::frame::{ControlState, FRAME_LEN};
    use tokio::time::timeout;

    const RECV_TIMEOUT: Duration = Duration::from_secs(2);

    async fn local_receiver() -> (UdpSocket, u16) {
        let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = sock.local_addr().unwrap().port();
        (sock, port)
    }

    fn test_cfg(port: u16) -> LinkConfig {
        LinkConfig {
            target_addr: "127.0.0.1".into(),
            port,
            rate_ms: 10,
        }
    }

    async fn recv_frame(sock: &UdpSocket) -> Vec<u8> {
        let mut buf = [0u8; 64];
        let (n, _) = timeout(RECV_TIMEOUT, sock.recv_from(&mut buf))
            .await
            .expect("no frame within the receive window")
            .unwrap();
        buf[..n].to_vec()
    }

    #[tokio::test]
    async fn streams_the_current_state_to_the_target() {
        let (receiver, port) = local_receiver().await;
        let controls = FlightControls::new();
        let mut tx = LinkTransmitter::new(test_cfg(port), controls.clone());

        controls.apply(ControlUpdate {
            roll: Some(0.5),
            pitch: Some(-0.3),
            throttle: Some(75),
            armed: Some(true),
            ..Default::default()
        });
        assert!(tx.start("127.0.0.1").await);
        assert!(tx.is_connected());
        assert_eq!(tx.target().unwrap().port(), port);

        let raw = recv_frame(&receiver).await;
        assert_eq!(raw.len(), FRAME_LEN);
        let st = ControlState::decode(&raw).unwrap();
        assert_eq!(
            st,
            ControlState {
                roll: 0.5,
                pitch: -0.3,
                yaw: 0.0,
                throttle: 75,
                armed: true,
            }
        );
        assert_eq!(&raw[16..20], &1i32.to_le_bytes());
        assert_eq!(raw[20], 1);

        tx.stop().await;
        assert!(!tx.is_connected());
        assert!(tx.stats().frames_sent >= 1);
    }

    #[tokio::test]
    async fn unresolvable_target_reports_false() {
        let controls = FlightControls::new();
        let mut tx = LinkTransmitter::new(test_cfg(4444), controls);
        assert!(!tx.start("definitely-not-a-real-host.invalid").await);
        assert!(!tx.is_connected());
        assert!(tx.target().is_none());
    }

    #[tokio::test]
    async fn status_follows_the_session_target_across_restarts() {
        let (_old_rx, old_port) = local_receiver().await;
        let (_new_rx, new_port) = local_receiver().await;
        let controls = FlightControls::new();
        let mut tx = LinkTransmitter::new(test_cfg(old_port), controls);
        let status = tx.status();

        assert!(status.target().is_none());
        assert!(tx.start("127.0.0.1").await);
        assert_eq!(status.target().unwrap().port(), old_port);

        tx.cfg.port = new_port;
        assert!(tx.start("127.0.0.1").await);
        assert_eq!(status.target().unwrap().port(), new_port);

        tx.stop().await;
        assert!(status.target().is_none());
    }

    #[tokio::test]
    async fn restart_never_sends_on_the_old_socket() {
        let (old_rx, old_port) = local_receiver().await;
        let (new_rx, new_port) = local_receiver().await;
        let controls = FlightControls::new();
        let mut tx = LinkTransmitter::new(test_cfg(old_port), controls);

        assert!(tx.start("127.0.0.1").await);
        recv_frame(&old_rx).await;
        tx.stop().await;

        tx.cfg.port = new_port;
        assert!(tx.start("127.0.0.1").await);
        recv_frame(&new_rx).await;

        // drain what was in flight before the stop, then demand silence
        let mut buf = [0u8; 64];
        while timeout(Duration::from_millis(50), old_rx.recv_from(&mut buf))
            .await
            .is_ok()
        {}
        assert!(
            timeout(Duration::from_millis(100), old_rx.recv_from(&mut buf))
                .await
                .is_err(),
            "old socket received a frame after stop"
        );
        tx.stop().await;
    }

    #[tokio::test]
    async fn updates_made_while_stopped_ride_the_next_session() {
        let (receiver, port) = local_receiver().await;
        let controls = FlightControls::new();
        let mut tx = LinkTransmitter::new(test_cfg(port), controls);

        tx.update(ControlUpdate {
            yaw: Some(-0.25),
            throttle: Some(40),
            ..Default::default()
        });
        assert!(!tx.is_connected());

        assert!(tx.start("127.0.0.1").await);
        let st = ControlState::decode(&recv_frame(&receiver).await).unwrap();
        assert_eq!(st.yaw, -0.25);
        assert_eq!(st.throttle, 40);
        tx.stop().await;
    }

    #[tokio::test]
    async fn start_is_an_idempotent_restart() {
        let (receiver, port) = local_receiver().await;
        let controls = FlightControls::new();
        let mut tx = LinkTransmitter::new(test_cfg(port), controls);

        assert!(tx.start("127.0.0.1").await);
        assert!(tx.start("127.0.0.1").await);
        assert!(tx.is_connected());
        recv_frame(&receiver).await;
        tx.stop().await;
        tx.stop().await;
        assert!(!tx.is_connected());
    }
}
