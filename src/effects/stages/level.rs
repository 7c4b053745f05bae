use crate::effects::stages::Stage;
use crate::effects::stages::common::db_to_lin;
use crate::effects::{GAIN_RANGE, clamp_to};

/// Amplifier stage. The parameter is expressed in dB; the linear factor is cached.
pub struct LevelStage {
    gain_db: f32,
    gain: f32,
}

impl LevelStage {
    pub fn new(gain_db: f32) -> Self {
        let gain_db = clamp_to(&GAIN_RANGE, gain_db);
        Self {
            gain_db,
            gain: db_to_lin(gain_db),
        }
    }

    pub const fn linear_gain(&self) -> f32 {
        self.gain
    }
}

impl Stage for LevelStage {
    fn process(&mut self, input: f32) -> f32 {
        input * self.gain
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Result<(), &'static str> {
        match name {
            "gain" if value.is_finite() => {
                self.gain_db = clamp_to(&GAIN_RANGE, value);
                self.gain = db_to_lin(self.gain_db);
                Ok(())
            }
            "gain" => Err("Gain must be a finite number"),
            _ => Err("Unknown parameter"),
        }
    }

    fn get_parameter(&self, name: &str) -> Result<f32, &'static str> {
        match name {
            "gain" => Ok(self.gain_db),
            _ => Err("Unknown parameter name"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_stage() {
        let mut stage = LevelStage::new(0.0);
        assert_eq!(stage.process(1.0), 1.0);

        stage.set_parameter("gain", 6.0).unwrap();
        assert!((stage.process(1.0) - 1.995).abs() < 0.001);

        stage.set_parameter("gain", -6.0).unwrap();
        assert!((stage.process(1.0) - 0.501).abs() < 0.001);
        assert_eq!(stage.get_parameter("gain").unwrap(), -6.0);

        stage.set_parameter("gain", 48.0).unwrap();
        assert_eq!(stage.get_parameter("gain").unwrap(), 40.0);
        assert!(stage.set_parameter("gain", f32::INFINITY).is_err());
        assert_eq!(LevelStage::new(-300.0).get_parameter("gain").unwrap(), -100.0);
    }
}
