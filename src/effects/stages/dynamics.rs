use crate::effects::stages::Stage;
use crate::effects::{DynamicsSettings, clamp_to, dynamics_range};
use crate::effects::stages::common::{
    EnvelopeFollower, calculate_coefficient, db_to_lin, lin_to_db,
};

const LEVEL_FLOOR_DB: f32 = -200.0;

/// Feed-forward compressor with a soft knee. Used for both the compressor and
/// the limiter slots of the chain; the limiter is just a fast, high-ratio
/// configuration of the same stage.
pub struct DynamicsStage {
    threshold_db: f32,
    ratio: f32,
    attack_s: f32,
    release_s: f32,
    knee_db: f32,
    envelope: EnvelopeFollower,
    reduction_db: f32,
    sample_rate: f32,
}

impl DynamicsStage {
    /// Out-of-range settings are clamped, as `set_parameter` does.
    pub fn new(settings: &DynamicsSettings, sample_rate: f32) -> Self {
        let settings = settings.clamped();
        Self {
            threshold_db: settings.threshold,
            ratio: settings.ratio,
            attack_s: settings.attack,
            release_s: settings.release,
            knee_db: settings.knee,
            envelope: EnvelopeFollower::from_seconds(
                settings.attack,
                settings.release,
                sample_rate,
            ),
            reduction_db: 0.0,
            sample_rate,
        }
    }

    /// Gain reduction applied to the last processed sample, in dB (<= 0).
    pub const fn reduction(&self) -> f32 {
        self.reduction_db
    }

    fn update_attack(&mut self, attack_s: f32) {
        self.attack_s = attack_s;
        self.envelope
            .set_attack_coeff(calculate_coefficient(attack_s * 1000.0, self.sample_rate));
    }

    fn update_release(&mut self, release_s: f32) {
        self.release_s = release_s;
        self.envelope
            .set_release_coeff(calculate_coefficient(release_s * 1000.0, self.sample_rate));
    }

    fn gain_reduction_db(&self, level_db: f32) -> f32 {
        let slope = 1.0 / self.ratio - 1.0;
        let over = level_db - self.threshold_db;

        if self.knee_db > 0.0 && 2.0 * over.abs() <= self.knee_db {
            let x = over + self.knee_db / 2.0;
            slope * x * x / (2.0 * self.knee_db)
        } else if over > 0.0 {
            slope * over
        } else {
            0.0
        }
    }
}

impl Stage for DynamicsStage {
    fn process(&mut self, input: f32) -> f32 {
        let env = self.envelope.process(input);
        let level_db = lin_to_db(env, LEVEL_FLOOR_DB);

        self.reduction_db = self.gain_reduction_db(level_db);

        input * db_to_lin(self.reduction_db)
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Result<(), &'static str> {
        let range = dynamics_range(name).ok_or("Unknown parameter")?;
        if !value.is_finite() {
            return Err("Value must be a finite number");
        }
        let value = clamp_to(&range, value);

        match name {
            "threshold" => self.threshold_db = value,
            "ratio" => self.ratio = value,
            "attack" => self.update_attack(value),
            "release" => self.update_release(value),
            _ => self.knee_db = value,
        }
        Ok(())
    }

    fn get_parameter(&self, name: &str) -> Result<f32, &'static str> {
        match name {
            "threshold" => Ok(self.threshold_db),
            "ratio" => Ok(self.ratio),
            "attack" => Ok(self.attack_s),
            "release" => Ok(self.release_s),
            "knee" => Ok(self.knee_db),
            _ => Err("Unknown parameter"),
        }
    }
}
