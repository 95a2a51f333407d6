use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::tx::LinkStatus;

/// Answers "does the platform currently give us a path to the receiver",
/// the moral equivalent of asking the OS whether Wi-Fi is up. Each check
/// gets the resolved target of the running session, `None` while the
/// transmitter is stopped, so a retargeted session is checked against its
/// new address on the next tick.
pub trait TransportProbe: Send + 'static {
    fn reachable(&mut self, target: Option<SocketAddr>) -> bool;
}

/// Checks routability by binding a throwaway UDP socket and connecting it to
/// the already-resolved target. No traffic and no name lookups happen here,
/// so a check can never stall the monitor; a missing route or downed
/// interface shows up as a connect error.
pub struct RouteProbe;

impl TransportProbe for RouteProbe {
    fn reachable(&mut self, target: Option<SocketAddr>) -> bool {
        let Some(target) = target else {
            return false;
        };
        let bind_addr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let Ok(socket) = UdpSocket::bind(bind_addr) else {
            return false;
        };
        socket.connect(target).is_ok()
    }
}

/// Probe for setups with no meaningful transport check.
pub struct AlwaysReachable;

impl TransportProbe for AlwaysReachable {
    fn reachable(&mut self, _target: Option<SocketAddr>) -> bool {
        true
    }
}

/// Periodic connection verdict, decoupled from the send loop.
///
/// Every tick the monitor combines the transmitter liveness flag with the
/// transport probe, aimed at the session's current target, and publishes the
/// result on a watch channel, so subscribers wake only on transitions. It
/// shares nothing with the send loop but the status handle and cannot
/// degrade the send cadence. Dropping the monitor ends its task.
pub struct LinkMonitor {
    shutdown: watch::Sender<bool>,
    verdict: watch::Receiver<bool>,
    handle: JoinHandle<()>,
}

impl LinkMonitor {
    pub fn spawn(status: LinkStatus, probe: impl TransportProbe, period: Duration) -> Self {
        let (verdict_tx, verdict) = watch::channel(false);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(monitor_loop(
            status,
            Box::new(probe),
            period,
            verdict_tx,
            shutdown_rx,
        ));
        Self {
            shutdown,
            verdict,
            handle,
        }
    }

    /// Latest verdict.
    pub fn is_connected(&self) -> bool {
        *self.verdict.borrow()
    }

    /// Channel for the display layer; `changed()` wakes on every transition.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.verdict.clone()
    }

    /// Ends the periodic checks and waits for the task to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

async fn monitor_loop(
    status: LinkStatus,
    mut probe: Box<dyn TransportProbe>,
    period: Duration,
    verdict: watch::Sender<bool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let transmitting = status.is_connected();
                let up = transmitting && probe.reachable(status.target());
                debug!("monitor: transmitting={} verdict={}", transmitting, up);
                verdict.send_if_modified(|cur| {
                    if *cur == up {
                        false
                    } else {
                        *cur = up;
                        true
                    }
                });
            }
            _ = shutdown.changed() => break,
        }
    }
}
