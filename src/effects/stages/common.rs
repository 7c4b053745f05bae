/// Convert decibels to linear amplitude.
#[inline]
pub fn db_to_lin(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels, clamping silence to `floor_db`.
#[inline]
pub fn lin_to_db(lin: f32, floor_db: f32) -> f32 {
    if lin > 0.0 {
        (20.0 * lin.log10()).max(floor_db)
    } else {
        floor_db
    }
}

/// Calculate a one-pole smoothing coefficient from a time constant in milliseconds.
///
/// Returns `exp(-1 / (sample_rate * time_ms * 0.001))`, which is `0.0` (no smoothing)
/// for a zero time constant.
#[inline]
pub fn calculate_coefficient(time_ms: f32, sample_rate: f32) -> f32 {
    if time_ms <= 0.0 {
        return 0.0;
    }
    (-1.0 / (sample_rate * 0.001 * time_ms)).exp()
}

/// One-pole envelope follower with configurable attack and release coefficients.
#[derive(Clone)]
pub struct EnvelopeFollower {
    envelope: f32,
    attack_coeff: f32,
    release_coeff: f32,
}

impl EnvelopeFollower {
    /// Create from pre-computed coefficients.
    pub const fn new(attack_coeff: f32, release_coeff: f32) -> Self {
        Self {
            envelope: 0.0,
            attack_coeff,
            release_coeff,
        }
    }

    /// Create from attack/release times in seconds.
    pub fn from_seconds(attack_s: f32, release_s: f32, sample_rate: f32) -> Self {
        Self::new(
            calculate_coefficient(attack_s * 1000.0, sample_rate),
            calculate_coefficient(release_s * 1000.0, sample_rate),
        )
    }

    pub const fn set_attack_coeff(&mut self, coeff: f32) {
        self.attack_coeff = coeff;
    }

    pub const fn set_release_coeff(&mut self, coeff: f32) {
        self.release_coeff = coeff;
    }

    pub const fn value(&self) -> f32 {
        self.envelope
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let abs_input = input.abs();
        if abs_input > self.envelope {
            self.envelope = self
                .attack_coeff
                .mul_add(self.envelope, (1.0 - self.attack_coeff) * abs_input);
        } else {
            self.envelope = self
                .release_coeff
                .mul_add(self.envelope, (1.0 - self.release_coeff) * abs_input);
        }
        self.envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_time_constant_tracks_input_instantly() {
        let mut env = EnvelopeFollower::from_seconds(0.0, 0.0, 48_000.0);

        assert_eq!(env.process(0.7), 0.7);
        assert_eq!(env.process(0.1), 0.1);
    }

    #[test]
    fn db_conversions_are_inverse() {
        assert!((db_to_lin(-6.0) - 0.501).abs() < 0.001);
        assert!((lin_to_db(db_to_lin(-18.0), -100.0) + 18.0).abs() < 1e-4);
        assert_eq!(lin_to_db(0.0, -100.0), -100.0);
    }
}
