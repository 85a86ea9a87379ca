use crate::motor::{LEFT, SpeedSnapshot, WheelGeometry};

/// Per-joint wheel velocity (rad/s) from measured differential speed
#[derive(Debug, Clone)]
pub struct VelocitySampler {
    velocities: Vec<f64>,
}

impl VelocitySampler {
    pub fn new(joints: usize) -> Self {
        Self {
            velocities: vec![f64::NAN; joints],
        }
    }

    pub fn update(&mut self, snapshot: &SpeedSnapshot, geometry: &WheelGeometry) {
        for (i, velocity) in self.velocities.iter_mut().enumerate() {
            *velocity = if i % 2 == LEFT {
                geometry.linear_to_angular(snapshot.left_speed)
            } else {
                geometry.linear_to_angular(snapshot.right_speed)
            };
        }
    }

    pub fn seed(&mut self) {
        for velocity in self.velocities.iter_mut().filter(|v| v.is_nan()) {
            *velocity = 0.0;
        }
    }

    pub fn velocities(&self) -> &[f64] {
        &self.velocities
    }
}
