use serde::{Deserialize, Serialize};

/// Normalized stick deflection. `x` grows to the right, `y` grows upward,
/// and the point always lies on or inside the unit circle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StickVector {
    pub x: f32,
    pub y: f32,
}

/// Gets every deflection change synchronously, on whatever context fed the
/// input event. Implemented for plain closures.
pub trait StickObserver: Send {
    fn stick_moved(&mut self, v: StickVector);
}

impl<F> StickObserver for F
where
    F: FnMut(StickVector) + Send,
{
    fn stick_moved(&mut self, v: StickVector) {
        self(v)
    }
}

/// Circular input surface turning raw pointer positions into normalized
/// deflections.
///
/// The surface starts unsized and ignores input until [`StickSurface::resize`]
/// gives it a geometry: center at the view midpoint, active radius 80% of the
/// half-extent of the smaller dimension. Positions outside the radius are
/// pulled back onto the circle along their own angle, so the output never
/// reaches into the corners of the underlying view.
pub struct StickSurface {
    center_x: f32,
    center_y: f32,
    radius: f32,
    value: StickVector,
    observer: Option<Box<dyn StickObserver>>,
}

impl StickSurface {
    pub fn new() -> Self {
        Self {
            center_x: 0.0,
            center_y: 0.0,
            radius: 0.0,
            value: StickVector::default(),
            observer: None,
        }
    }

    pub fn from_view_size(width: u32, height: u32) -> Self {
        let mut s = Self::new();
        s.resize(width, height);
        s
    }

    /// Adopts a new view geometry and recenters the knob.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.center_x = width as f32 / 2.0;
        self.center_y = height as f32 / 2.0;
        self.radius = width.min(height) as f32 / 2.0 * 0.8;
        self.value = StickVector::default();
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Last reported deflection.
    pub fn value(&self) -> StickVector {
        self.value
    }

    pub fn set_observer(&mut self, observer: impl StickObserver + 'static) {
        self.observer = Some(Box::new(observer));
    }

    /// Feeds a pointer position. Returns the resulting deflection, or `None`
    /// while the surface is unsized.
    pub fn track(&mut self, px: f32, py: f32) -> Option<StickVector> {
        if self.radius <= 0.0 {
            return None;
        }
        let dx = px - self.center_x;
        let dy = py - self.center_y;
        let (knob_x, knob_y) = if (dx * dx + dy * dy).sqrt() <= self.radius {
            (px, py)
        } else {
            let angle = dy.atan2(dx);
            (
                self.center_x + angle.cos() * self.radius,
                self.center_y + angle.sin() * self.radius,
            )
        };
        let v = StickVector {
            x: (knob_x - self.center_x) / self.radius,
            // screen y grows downward, stick up must read positive
            y: -(knob_y - self.center_y) / self.radius,
        };
        self.value = v;
        self.notify(v);
        Some(v)
    }

    /// Pointer released: the knob snaps back to center.
    pub fn release(&mut self) -> StickVector {
        self.value = StickVector::default();
        self.notify(self.value);
        self.value
    }

    fn notify(&mut self, v: StickVector) {
        if let Some(obs) = self.observer.as_mut() {
            obs.stick_moved(v);
        }
    }
}

impl Default for StickSurface {
    fn default() -> Self {
        Self::new()
    }
}
