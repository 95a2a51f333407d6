use std::sync::{Arc, Mutex};

use pilot_proto::frame::ControlState;

/// Partial update of the control record. `None` keeps the previous value.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlUpdate {
    pub roll: Option<f32>,
    pub pitch: Option<f32>,
    pub yaw: Option<f32>,
    pub throttle: Option<u8>,
    pub armed: Option<bool>,
}

/// Shared handle to the live control record. Clones are cheap and all point
/// at the same state.
///
/// Every access goes through one whole-record lock, so a snapshot can never
/// mix fields from two different updates.
#[derive(Clone, Default)]
pub struct FlightControls {
    inner: Arc<Mutex<ControlState>>,
}

impl FlightControls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges the update into the record under the lock. Axis values are
    /// clamped to [-1, 1], throttle to 100. Non-finite axis values are
    /// dropped; `clamp` passes NaN through, and NaN must never reach the
    /// wire.
    pub fn apply(&self, update: ControlUpdate) {
        let mut state = self.inner.lock().unwrap();
        if let Some(roll) = update.roll.filter(|v| v.is_finite()) {
            state.roll = roll.clamp(-1.0, 1.0);
        }
        if let Some(pitch) = update.pitch.filter(|v| v.is_finite()) {
            state.pitch = pitch.clamp(-1.0, 1.0);
        }
        if let Some(yaw) = update.yaw.filter(|v| v.is_finite()) {
            state.yaw = yaw.clamp(-1.0, 1.0);
        }
        if let Some(throttle) = update.throttle {
            state.throttle = throttle.min(100);
        }
        if let Some(armed) = update.armed {
            state.armed = armed;
        }
    }

    /// One consistent copy of all five fields.
    pub fn snapshot(&self) -> ControlState {
        *self.inner.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_neutral_and_disarmed() {
        let controls = FlightControls::new();
        assert_eq!(controls.snapshot(), ControlState::default());
    }

    #[test]
    fn partial_update_leaves_other_fields_alone() {
        let controls = FlightControls::new();
        controls.apply(ControlUpdate {
            roll: Some(0.3),
            pitch: Some(-0.6),
            ..Default::default()
        });
        controls.apply(ControlUpdate {
            throttle: Some(70),
            ..Default::default()
        });

        let st = controls.snapshot();
        assert_eq!(st.roll, 0.3);
        assert_eq!(st.pitch, -0.6);
        assert_eq!(st.yaw, 0.0);
        assert_eq!(st.throttle, 70);
        assert!(!st.armed);
    }

    #[test]
    fn values_are_clamped_on_apply() {
        let controls = FlightControls::new();
        controls.apply(ControlUpdate {
            roll: Some(1.7),
            pitch: Some(-3.0),
            throttle: Some(240),
            ..Default::default()
        });

        let st = controls.snapshot();
        assert_eq!(st.roll, 1.0);
        assert_eq!(st.pitch, -1.0);
        assert_eq!(st.throttle, 100);
    }

    #[test]
    fn non_finite_axis_values_never_reach_the_record() {
        let controls = FlightControls::new();
        controls.apply(ControlUpdate {
            roll: Some(0.4),
            ..Default::default()
        });
        controls.apply(ControlUpdate {
            roll: Some(f32::NAN),
            pitch: Some(f32::INFINITY),
            yaw: Some(f32::NEG_INFINITY),
            ..Default::default()
        });

        let st = controls.snapshot();
        assert_eq!(st.roll, 0.4);
        assert_eq!(st.pitch, 0.0);
        assert_eq!(st.yaw, 0.0);
    }

    #[test]
    fn clones_share_the_same_record() {
        let a = FlightControls::new();
        let b = a.clone();
        b.apply(ControlUpdate {
            armed: Some(true),
            ..Default::default()
        });
        assert!(a.snapshot().armed);
    }
}
