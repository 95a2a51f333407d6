use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size of one control frame on the wire.
pub const FRAME_LEN: usize = 21;

/// UDP port the receiver board listens on.
pub const DEFAULT_PORT: u16 = 4444;

/// One full set of operator control values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlState {
    /// Roll command, -1.0 (full left) to 1.0 (full right).
    pub roll: f32,
    /// Pitch command, -1.0 to 1.0, up positive.
    pub pitch: f32,
    /// Yaw command, -1.0 to 1.0.
    pub yaw: f32,
    /// Throttle percent, 0 to 100.
    pub throttle: u8,
    pub armed: bool,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
            throttle: 0,
            armed: false,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("control frame is {0} bytes, expected {expected}", expected = FRAME_LEN)]
    BadLength(usize),
}

impl ControlState {
    /// Packs the state into the fixed little-endian wire frame: roll, pitch,
    /// yaw and throttle as f32, then the armed flag.
    ///
    /// Armed goes out twice, as a 4-byte int at offset 16 and again as the
    /// trailing byte. Deployed receiver firmware reads one or the other
    /// depending on revision, so both stay.
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut frame = [0u8; FRAME_LEN];
        let mut cur = &mut frame[..];
        cur.put_f32_le(self.roll);
        cur.put_f32_le(self.pitch);
        cur.put_f32_le(self.yaw);
        cur.put_f32_le(self.throttle as f32 / 100.0);
        cur.put_i32_le(self.armed as i32);
        cur.put_u8(self.armed as u8);
        frame
    }

    /// Rebuilds a state from one received frame. Throttle comes back as the
    /// nearest percent; the wide armed field at offset 16 is authoritative.
    pub fn decode(raw: &[u8]) -> Result<Self, FrameError> {
        if raw.len() != FRAME_LEN {
            return Err(FrameError::BadLength(raw.len()));
        }
        let mut cur = raw;
        let roll = cur.get_f32_le();
        let pitch = cur.get_f32_le();
        let yaw = cur.get_f32_le();
        let throttle = (cur.get_f32_le() * 100.0).round().clamp(0.0, 100.0) as u8;
        let armed = cur.get_i32_le() != 0;
        Ok(Self {
            roll,
            pitch,
            yaw,
            throttle,
            armed,
        })
    }
}
