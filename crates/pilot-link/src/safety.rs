use tracing::info;

use crate::state::{ControlUpdate, FlightControls};

/// Disarmed, zero throttle, in one atomic update. No reader can catch the
/// record between the two field changes.
fn force_safe(controls: &FlightControls) {
    controls.apply(ControlUpdate {
        armed: Some(false),
        throttle: Some(0),
        ..Default::default()
    });
}

/// The operator session can no longer be trusted (lost foreground, shutting
/// down). Runs synchronously and unconditionally, whether or not the
/// transmitter is currently streaming; the next frame that does go out
/// carries the safe values.
pub fn on_session_suspended(controls: &FlightControls) {
    force_safe(controls);
    info!("safety: session suspended, forced disarm and zero throttle");
}

/// Explicit disarm. Throttle drops in the same update.
pub fn disarm(controls: &FlightControls) {
    force_safe(controls);
    info!("safety: disarmed");
}
