use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use thiserror::Error;

pub mod chain;
pub mod stages;

pub const DYNAMICS_PARAMETERS: [&str; 5] = ["threshold", "ratio", "attack", "release", "knee"];
pub const AMPLIFIER_PARAMETERS: [&str; 1] = ["gain"];

/// Nominal range of each dynamics parameter. Values outside are clamped.
pub fn dynamics_range(parameter: &str) -> Option<RangeInclusive<f32>> {
    match parameter {
        "threshold" => Some(-100.0..=0.0),
        "ratio" => Some(1.0..=20.0),
        "attack" | "release" => Some(0.0..=1.0),
        "knee" => Some(0.0..=40.0),
        _ => None,
    }
}

pub const GAIN_RANGE: RangeInclusive<f32> = -100.0..=40.0;

pub fn clamp_to(range: &RangeInclusive<f32>, value: f32) -> f32 {
    value.clamp(*range.start(), *range.end())
}

// Writes the shortest decimal that reads back as the same f32, so 0.02 is
// stored as 0.02 rather than its widened f64 expansion.
fn shortest_f32<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
    let shortest = value.to_string().parse::<f64>().unwrap_or(f64::from(*value));
    serializer.serialize_f64(shortest)
}

/// Parameters of a dynamics stage. Times are in seconds, levels in dB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DynamicsSettings {
    #[serde(serialize_with = "shortest_f32")]
    pub threshold: f32,
    #[serde(serialize_with = "shortest_f32")]
    pub ratio: f32,
    #[serde(serialize_with = "shortest_f32")]
    pub attack: f32,
    #[serde(serialize_with = "shortest_f32")]
    pub release: f32,
    #[serde(serialize_with = "shortest_f32")]
    pub knee: f32,
}

impl DynamicsSettings {
    pub const COMPRESSOR: Self = Self {
        threshold: -24.0,
        ratio: 12.0,
        attack: 0.02,
        release: 0.25,
        knee: 30.0,
    };

    pub const LIMITER: Self = Self {
        threshold: -3.0,
        ratio: 20.0,
        attack: 0.001,
        release: 0.05,
        knee: 0.0,
    };

    /// Overlay used while effects are bypassed.
    pub const NEUTRAL: Self = Self {
        threshold: 0.0,
        ratio: 1.0,
        attack: 0.0,
        release: 0.0,
        knee: 0.0,
    };

    pub fn get(&self, parameter: &str) -> Option<f32> {
        match parameter {
            "threshold" => Some(self.threshold),
            "ratio" => Some(self.ratio),
            "attack" => Some(self.attack),
            "release" => Some(self.release),
            "knee" => Some(self.knee),
            _ => None,
        }
    }

    /// Every parameter pulled into its nominal range.
    pub fn clamped(self) -> Self {
        let clamp = |name: &str, value: f32| {
            dynamics_range(name).map_or(value, |range| clamp_to(&range, value))
        };

        Self {
            threshold: clamp("threshold", self.threshold),
            ratio: clamp("ratio", self.ratio),
            attack: clamp("attack", self.attack),
            release: clamp("release", self.release),
            knee: clamp("knee", self.knee),
        }
    }

    fn slot(&mut self, parameter: &str) -> Option<&mut f32> {
        match parameter {
            "threshold" => Some(&mut self.threshold),
            "ratio" => Some(&mut self.ratio),
            "attack" => Some(&mut self.attack),
            "release" => Some(&mut self.release),
            "knee" => Some(&mut self.knee),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmplifierSettings {
    /// Gain in dB.
    #[serde(serialize_with = "shortest_f32")]
    pub gain: f32,
}

impl AmplifierSettings {
    pub const DEFAULT: Self = Self { gain: 0.0 };
    pub const NEUTRAL: Self = Self { gain: 0.0 };

    pub fn clamped(self) -> Self {
        Self {
            gain: clamp_to(&GAIN_RANGE, self.gain),
        }
    }
}

/// Full parameter set for the compressor → limiter → gain chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectSettings {
    pub compressor: DynamicsSettings,
    pub limiter: DynamicsSettings,
    pub amplifier: AmplifierSettings,
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self {
            compressor: DynamicsSettings::COMPRESSOR,
            limiter: DynamicsSettings::LIMITER,
            amplifier: AmplifierSettings::DEFAULT,
        }
    }
}

impl EffectSettings {
    pub const fn neutral() -> Self {
        Self {
            compressor: DynamicsSettings::NEUTRAL,
            limiter: DynamicsSettings::NEUTRAL,
            amplifier: AmplifierSettings::NEUTRAL,
        }
    }

    /// The values the stages actually run with.
    pub fn clamped(self) -> Self {
        Self {
            compressor: self.compressor.clamped(),
            limiter: self.limiter.clamped(),
            amplifier: self.amplifier.clamped(),
        }
    }

    pub fn get_parameter(&self, setting_type: SettingType, parameter: &str) -> Option<f32> {
        match setting_type {
            SettingType::Compressor => self.compressor.get(parameter),
            SettingType::Limiter => self.limiter.get(parameter),
            SettingType::Amplifier => (parameter == "gain").then_some(self.amplifier.gain),
        }
    }

    /// Set a single parameter addressed as `type.parameter`, clamped to its
    /// nominal range.
    pub fn set_parameter(
        &mut self,
        setting_type: SettingType,
        parameter: &str,
        value: f32,
    ) -> Result<(), SettingPathError> {
        if !value.is_finite() {
            return Err(SettingPathError::NonFinite {
                setting_type,
                parameter: parameter.to_string(),
            });
        }

        let (slot, range) = match setting_type {
            SettingType::Compressor => (self.compressor.slot(parameter), dynamics_range(parameter)),
            SettingType::Limiter => (self.limiter.slot(parameter), dynamics_range(parameter)),
            SettingType::Amplifier => (
                (parameter == "gain").then_some(&mut self.amplifier.gain),
                Some(GAIN_RANGE),
            ),
        };

        match (slot, range) {
            (Some(slot), Some(range)) => {
                *slot = clamp_to(&range, value);
                Ok(())
            }
            _ => Err(SettingPathError::UnknownParameter {
                setting_type,
                parameter: parameter.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingType {
    Compressor,
    Limiter,
    Amplifier,
}

impl SettingType {
    pub const fn parameters(self) -> &'static [&'static str] {
        match self {
            SettingType::Compressor | SettingType::Limiter => &DYNAMICS_PARAMETERS,
            SettingType::Amplifier => &AMPLIFIER_PARAMETERS,
        }
    }
}

impl fmt::Display for SettingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingType::Compressor => write!(f, "compressor"),
            SettingType::Limiter => write!(f, "limiter"),
            SettingType::Amplifier => write!(f, "amplifier"),
        }
    }
}

impl FromStr for SettingType {
    type Err = SettingPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compressor" => Ok(SettingType::Compressor),
            "limiter" => Ok(SettingType::Limiter),
            "amplifier" => Ok(SettingType::Amplifier),
            other => Err(SettingPathError::UnknownType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingPathError {
    #[error("unknown setting type '{0}'")]
    UnknownType(String),

    #[error("unknown parameter '{parameter}' for {setting_type}")]
    UnknownParameter {
        setting_type: SettingType,
        parameter: String,
    },

    #[error("value for {setting_type}.{parameter} must be a finite number")]
    NonFinite {
        setting_type: SettingType,
        parameter: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_table() {
        let settings = EffectSettings::default();

        assert_eq!(settings.compressor.threshold, -24.0);
        assert_eq!(settings.compressor.ratio, 12.0);
        assert_eq!(settings.compressor.attack, 0.02);
        assert_eq!(settings.compressor.release, 0.25);
        assert_eq!(settings.compressor.knee, 30.0);

        assert_eq!(settings.limiter.threshold, -3.0);
        assert_eq!(settings.limiter.ratio, 20.0);
        assert_eq!(settings.limiter.attack, 0.001);
        assert_eq!(settings.limiter.release, 0.05);
        assert_eq!(settings.limiter.knee, 0.0);

        assert_eq!(settings.amplifier.gain, 0.0);
    }

    #[test]
    fn set_parameter_addresses_a_single_field() {
        let mut settings = EffectSettings::default();
        settings
            .set_parameter(SettingType::Compressor, "threshold", -18.0)
            .unwrap();

        assert_eq!(settings.compressor.threshold, -18.0);
        assert_eq!(settings.limiter, DynamicsSettings::LIMITER);
        assert_eq!(
            settings.get_parameter(SettingType::Compressor, "threshold"),
            Some(-18.0)
        );
    }

    #[test]
    fn set_parameter_rejects_unknown_paths() {
        let mut settings = EffectSettings::default();

        assert!(matches!(
            settings.set_parameter(SettingType::Amplifier, "ratio", 2.0),
            Err(SettingPathError::UnknownParameter { .. })
        ));
        assert!(matches!(
            settings.set_parameter(SettingType::Limiter, "gain", 2.0),
            Err(SettingPathError::UnknownParameter { .. })
        ));
        assert!(matches!(
            settings.set_parameter(SettingType::Limiter, "knee", f32::NAN),
            Err(SettingPathError::NonFinite { .. })
        ));
        assert_eq!(settings, EffectSettings::default());
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let mut settings = EffectSettings::default();
        settings.set_parameter(SettingType::Compressor, "ratio", 50.0).unwrap();
        settings.set_parameter(SettingType::Limiter, "ratio", 0.0).unwrap();
        settings.set_parameter(SettingType::Compressor, "threshold", 6.0).unwrap();
        settings.set_parameter(SettingType::Amplifier, "gain", -500.0).unwrap();

        assert_eq!(settings.compressor.ratio, 20.0);
        assert_eq!(settings.limiter.ratio, 1.0);
        assert_eq!(settings.compressor.threshold, 0.0);
        assert_eq!(settings.amplifier.gain, -100.0);
    }

    #[test]
    fn clamped_leaves_in_range_settings_alone() {
        assert_eq!(EffectSettings::default().clamped(), EffectSettings::default());
        assert_eq!(EffectSettings::neutral().clamped(), EffectSettings::neutral());

        let mut wild = EffectSettings::default();
        wild.compressor.knee = 90.0;
        wild.limiter.attack = -1.0;
        let clamped = wild.clamped();
        assert_eq!(clamped.compressor.knee, 40.0);
        assert_eq!(clamped.limiter.attack, 0.0);
    }

    #[test]
    fn times_are_written_as_short_decimals() {
        let json = serde_json::to_value(EffectSettings::default()).unwrap();

        assert_eq!(json["compressor"]["attack"], serde_json::json!(0.02));
        assert_eq!(json["limiter"]["attack"], serde_json::json!(0.001));
        assert!(!json.to_string().contains("0.0199"));

        let back: EffectSettings = serde_json::from_value(json).unwrap();
        assert_eq!(back, EffectSettings::default());
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let json = serde_json::to_value(EffectSettings::default()).unwrap();

        assert_eq!(json["compressor"]["threshold"], -24.0);
        assert_eq!(json["limiter"]["ratio"], 20.0);
        assert_eq!(json["amplifier"]["gain"], 0.0);
    }

    #[test]
    fn setting_type_round_trips_through_strings() {
        for ty in [
            SettingType::Compressor,
            SettingType::Limiter,
            SettingType::Amplifier,
        ] {
            assert_eq!(ty.to_string().parse::<SettingType>().unwrap(), ty);
        }
        assert!("reverb".parse::<SettingType>().is_err());
    }
}
