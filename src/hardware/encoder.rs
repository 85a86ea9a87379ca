// Per-joint wheel position tracking from cumulative encoder travel.
//
// Reported position is `angle(travel) - offset`. The offset starts at the
// travel seen during calibration, so positions begin at zero, and absorbs
// any reading that jumps too far in one cycle (encoder rollover or a
// corrupted sample).

use tracing::warn;

use crate::motor::{EncoderSnapshot, WheelGeometry};

/// Largest per-cycle change (radians) accepted as real wheel motion
pub const ROLLOVER_THRESHOLD: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct EncoderTracker {
    positions: Vec<f64>,
    offsets: Vec<f64>,
}

impl EncoderTracker {
    /// Tracker for `joints` wheels; every slot starts uninitialized (NaN)
    pub fn new(joints: usize) -> Self {
        Self {
            positions: vec![f64::NAN; joints],
            offsets: vec![f64::NAN; joints],
        }
    }

    /// Bias future readings against the current encoder travel
    pub fn calibrate(&mut self, snapshot: &EncoderSnapshot, geometry: &WheelGeometry) {
        for (i, offset) in self.offsets.iter_mut().enumerate() {
            *offset = geometry.linear_to_angular(snapshot.travel(i % 2));
        }
    }

    /// Fold a new encoder reading into the joint positions.
    ///
    /// Returns how many joints had their reading dropped into the offset.
    pub fn update(&mut self, snapshot: &EncoderSnapshot, geometry: &WheelGeometry) -> usize {
        let mut dropped = 0;

        for i in 0..self.positions.len() {
            let delta = geometry.linear_to_angular(snapshot.travel(i % 2))
                - self.positions[i]
                - self.offsets[i];

            // detect suspiciously large readings, possibly from encoder rollover
            if delta.abs() < ROLLOVER_THRESHOLD {
                self.positions[i] += delta;
            } else {
                self.offsets[i] += delta;
                dropped += 1;
                warn!(
                    "Dropping overflow measurement from encoder on joint {} (delta {:.4} rad)",
                    i, delta
                );
            }
        }

        dropped
    }

    /// Zero any slot that was never initialized
    pub fn seed(&mut self) {
        for value in self.positions.iter_mut().chain(self.offsets.iter_mut()) {
            if value.is_nan() {
                *value = 0.0;
            }
        }
    }

    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    pub fn offsets(&self) -> &[f64] {
        &self.offsets
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
