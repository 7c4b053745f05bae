use log::{debug, warn};
use std::fmt;

use crate::audio::peak_meter::{METER_FLOOR_DB, PeakMeterHandle};
use crate::effects::stages::Stage;
use crate::effects::stages::analyser::AnalyserStage;
use crate::effects::stages::dynamics::DynamicsStage;
use crate::effects::stages::level::LevelStage;
use crate::effects::{AmplifierSettings, DynamicsSettings, EffectSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Compressor,
    Limiter,
    Gain,
    Analyser,
}

impl StageKind {
    /// Signal order from source to output.
    pub const ORDER: [StageKind; 4] = [
        StageKind::Compressor,
        StageKind::Limiter,
        StageKind::Gain,
        StageKind::Analyser,
    ];
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Compressor => write!(f, "compressor"),
            StageKind::Limiter => write!(f, "limiter"),
            StageKind::Gain => write!(f, "gain"),
            StageKind::Analyser => write!(f, "analyser"),
        }
    }
}

// EffectChain wires source -> compressor -> limiter -> gain -> analyser -> output.
pub struct EffectChain {
    compressor: DynamicsStage,
    limiter: DynamicsStage,
    gain: LevelStage,
    analyser: AnalyserStage,
    meter: PeakMeterHandle,
    connected: bool,
}

impl EffectChain {
    /// Builds the four stages with `settings` but leaves them unwired.
    pub fn new(settings: &EffectSettings, sample_rate: f32, fft_size: usize) -> Self {
        let (analyser, meter) = AnalyserStage::new(fft_size);

        Self {
            compressor: DynamicsStage::new(&settings.compressor, sample_rate),
            limiter: DynamicsStage::new(&settings.limiter, sample_rate),
            gain: LevelStage::new(settings.amplifier.gain),
            analyser,
            meter,
            connected: false,
        }
    }

    pub fn connect(&mut self) {
        self.connected = true;
        debug!("Effect chain connected");
    }

    pub fn disconnect(&mut self) {
        self.connected = false;
        self.analyser.reset();
        debug!("Effect chain disconnected");
    }

    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn apply(&mut self, settings: &EffectSettings) {
        self.apply_dynamics(StageKind::Compressor, &settings.compressor);
        self.apply_dynamics(StageKind::Limiter, &settings.limiter);
        self.apply_amplifier(&settings.amplifier);
    }

    pub fn apply_neutral(&mut self) {
        self.apply(&EffectSettings::neutral());
    }

    fn apply_dynamics(&mut self, kind: StageKind, settings: &DynamicsSettings) {
        let stage: &mut dyn Stage = match kind {
            StageKind::Limiter => &mut self.limiter,
            _ => &mut self.compressor,
        };

        for (name, value) in [
            ("threshold", settings.threshold),
            ("ratio", settings.ratio),
            ("attack", settings.attack),
            ("release", settings.release),
            ("knee", settings.knee),
        ] {
            if let Err(e) = stage.set_parameter(name, value) {
                warn!("Rejected {kind} {name}={value}: {e}");
            }
        }
    }

    fn apply_amplifier(&mut self, settings: &AmplifierSettings) {
        if let Err(e) = self.gain.set_parameter("gain", settings.gain) {
            warn!("Rejected gain={}: {e}", settings.gain);
        }
    }

    fn stage(&self, kind: StageKind) -> &dyn Stage {
        match kind {
            StageKind::Compressor => &self.compressor,
            StageKind::Limiter => &self.limiter,
            StageKind::Gain => &self.gain,
            StageKind::Analyser => &self.analyser,
        }
    }

    /// Current value of a live stage parameter.
    pub fn parameter(&self, kind: StageKind, name: &str) -> Option<f32> {
        self.stage(kind).get_parameter(name).ok()
    }

    /// Reads back the parameters currently held by the stages.
    pub fn live_settings(&self) -> EffectSettings {
        let dynamics = |kind| DynamicsSettings {
            threshold: self.parameter(kind, "threshold").unwrap_or_default(),
            ratio: self.parameter(kind, "ratio").unwrap_or_default(),
            attack: self.parameter(kind, "attack").unwrap_or_default(),
            release: self.parameter(kind, "release").unwrap_or_default(),
            knee: self.parameter(kind, "knee").unwrap_or_default(),
        };

        EffectSettings {
            compressor: dynamics(StageKind::Compressor),
            limiter: dynamics(StageKind::Limiter),
            amplifier: AmplifierSettings {
                gain: self.parameter(StageKind::Gain, "gain").unwrap_or_default(),
            },
        }
    }

    // process_block runs a block through every stage in order. An unwired chain outputs silence.
    pub fn process_block(&mut self, block: &mut [f32]) {
        if !self.connected {
            block.fill(0.0);
            return;
        }

        self.compressor.process_block(block);
        self.limiter.process_block(block);
        self.gain.process_block(block);
        self.analyser.process_block(block);
    }

    pub fn peak_db(&self) -> f32 {
        if self.connected {
            self.meter.peak_db()
        } else {
            METER_FLOOR_DB
        }
    }

    pub fn meter(&self) -> PeakMeterHandle {
        self.meter.clone()
    }

    pub fn compressor_reduction(&self) -> f32 {
        self.compressor.reduction()
    }

    pub fn limiter_reduction(&self) -> f32 {
        self.limiter.reduction()
    }

    pub fn time_domain_bytes(&self) -> Vec<u8> {
        self.analyser.time_domain_bytes()
    }

    pub fn frequency_bytes(&mut self) -> Vec<u8> {
        self.analyser.frequency_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 48_000.0;

    #[test]
    fn unwired_chain_is_silent() {
        let mut chain = EffectChain::new(&EffectSettings::default(), SAMPLE_RATE, 256);
        let mut block = vec![0.5f32; 128];

        chain.process_block(&mut block);

        assert!(block.iter().all(|&s| s == 0.0));
        assert_eq!(chain.peak_db(), METER_FLOOR_DB);
    }

    #[test]
    fn neutral_chain_is_transparent() {
        let mut chain = EffectChain::new(&EffectSettings::neutral(), SAMPLE_RATE, 256);
        chain.connect();

        let input: Vec<f32> = (0..128).map(|i| (i as f32 / 128.0) - 0.5).collect();
        let mut block = input.clone();
        chain.process_block(&mut block);

        for (a, b) in input.iter().zip(&block) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn apply_then_read_back_is_exact() {
        let mut chain = EffectChain::new(&EffectSettings::default(), SAMPLE_RATE, 256);
        let mut settings = EffectSettings::default();
        settings.compressor.threshold = -18.0;
        settings.limiter.release = 0.07;
        settings.amplifier.gain = 3.5;

        chain.apply(&settings);

        assert_eq!(chain.live_settings(), settings);
        assert_eq!(chain.parameter(StageKind::Compressor, "threshold"), Some(-18.0));
    }

    #[test]
    fn gain_stage_scales_output_and_meter() {
        let mut settings = EffectSettings::neutral();
        settings.amplifier.gain = -6.0;
        let mut chain = EffectChain::new(&settings, SAMPLE_RATE, 256);
        chain.connect();

        let mut block = vec![0.5f32; 256];
        chain.process_block(&mut block);

        assert!((block[255] - 0.2506).abs() < 0.001);
        assert!((chain.peak_db() + 12.02).abs() < 0.05);
    }

    #[test]
    fn out_of_range_values_take_effect_clamped() {
        let mut chain = EffectChain::new(&EffectSettings::default(), SAMPLE_RATE, 256);
        let mut settings = EffectSettings::default();
        settings.compressor.ratio = 50.0;
        settings.amplifier.gain = 90.0;

        chain.apply(&settings);

        assert_eq!(chain.parameter(StageKind::Compressor, "ratio"), Some(20.0));
        assert_eq!(chain.live_settings(), settings.clamped());
    }
}
