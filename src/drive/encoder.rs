// Encoder pulse counter with a fixed distance calibration

/// Latest pulse count of one wheel encoder.
///
/// Distance is never stored; it is always `pulses * distance_per_pulse`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Encoder {
    pulses: i64,
    distance_per_pulse: f64,
}

impl Encoder {
    pub fn new(distance_per_pulse: f64) -> Self {
        Self {
            pulses: 0,
            distance_per_pulse,
        }
    }

    /// Record the latest raw count read from the sensor
    pub fn latch(&mut self, pulses: i64) {
        self.pulses = pulses;
    }

    pub fn reset(&mut self) {
        self.pulses = 0;
    }

    pub fn pulses(&self) -> i64 {
        self.pulses
    }

    pub fn distance(&self) -> f64 {
        self.pulses as f64 * self.distance_per_pulse
    }

    pub fn distance_per_pulse(&self) -> f64 {
        self.distance_per_pulse
    }
}

/// Left and right encoders, reset together
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderPair {
    pub left: Encoder,
    pub right: Encoder,
}

impl EncoderPair {
    pub fn new(distance_per_pulse: f64) -> Self {
        Self {
            left: Encoder::new(distance_per_pulse),
            right: Encoder::new(distance_per_pulse),
        }
    }

    pub fn latch(&mut self, left_pulses: i64, right_pulses: i64) {
        self.left.latch(left_pulses);
        self.right.latch(right_pulses);
    }

    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }

    /// Mean distance of both sides
    pub fn distance(&self) -> f64 {
        (self.left.distance() + self.right.distance()) / 2.0
    }
}
