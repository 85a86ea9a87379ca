// Differential-drive wheel kinematics
//
// The motor controller speaks linear units (m, m/s) while the joint interface
// speaks angular units (rad, rad/s). Conversion is a pure function of the
// wheel diameter.

/// Linear <-> angular conversion for a wheel of known diameter.
///
/// The diameter must be positive; this is checked once when the hardware
/// parameters are parsed, not on every call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelGeometry {
    wheel_diameter: f64, // meters
}

impl WheelGeometry {
    pub fn new(wheel_diameter: f64) -> Self {
        Self { wheel_diameter }
    }

    /// Controller reports travel in metres, joints want radians
    pub fn linear_to_angular(&self, travel: f64) -> f64 {
        travel / self.wheel_diameter * 2.0
    }

    /// Joints command rad/s, controller wants m/s
    pub fn angular_to_linear(&self, angle: f64) -> f64 {
        angle * self.wheel_diameter / 2.0
    }
}

/// Left/right wheel speed pair in m/s
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DifferentialSpeed {
    pub left: f64,
    pub right: f64,
}

impl DifferentialSpeed {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    /// Largest wheel speed magnitude
    pub fn magnitude(&self) -> f64 {
        self.left.abs().max(self.right.abs())
    }
}

/// Scale both wheel speeds down uniformly if either exceeds `max_speed`.
///
/// Sign and left/right ratio are preserved, so the robot keeps the commanded
/// turning curvature while slowing down.
pub fn limit_differential_speed(speed: DifferentialSpeed, max_speed: f64) -> DifferentialSpeed {
    let large_speed = speed.magnitude();

    if large_speed > max_speed {
        let scale = max_speed / large_speed;
        DifferentialSpeed {
            left: speed.left * scale,
            right: speed.right * scale,
        }
    } else {
        speed
    }
}
