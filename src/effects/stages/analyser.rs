use std::f32::consts::PI;
use std::sync::Arc;

use realfft::num_complex::Complex32;
use realfft::{RealFftPlanner, RealToComplex};

use crate::audio::peak_meter::{PeakMeter, PeakMeterHandle};
use crate::effects::stages::Stage;

pub const DEFAULT_FFT_SIZE: usize = 2048;

/// Range mapped onto the 0..=255 byte scale by `frequency_bytes`.
pub const MIN_DECIBELS: f32 = -100.0;
pub const MAX_DECIBELS: f32 = -30.0;

/// Pass-through stage that keeps the last `fft_size` samples for metering and
/// spectrum reads.
pub struct AnalyserStage {
    ring: Vec<f32>,
    pos: usize,
    meter: PeakMeter,
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    frame: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl AnalyserStage {
    /// `fft_size` is rounded up to a power of two, minimum 32.
    pub fn new(fft_size: usize) -> (Self, PeakMeterHandle) {
        let fft_size = fft_size.max(32).next_power_of_two();
        let (meter, handle) = PeakMeter::new();

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let spectrum = fft.make_output_vec();
        let scratch = fft.make_scratch_vec();

        // Blackman window, as used by the browser analyser node
        let window = (0..fft_size)
            .map(|i| {
                let x = i as f32 / fft_size as f32;
                0.08f32.mul_add(
                    (4.0 * PI * x).cos(),
                    0.5f32.mul_add(-(2.0 * PI * x).cos(), 0.42),
                )
            })
            .collect();

        (
            Self {
                ring: vec![0.0; fft_size],
                pos: 0,
                meter,
                fft,
                window,
                frame: vec![0.0; fft_size],
                spectrum,
                scratch,
            },
            handle,
        )
    }

    pub fn fft_size(&self) -> usize {
        self.ring.len()
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.ring.len() / 2
    }

    /// Samples of the analysis window, oldest first.
    pub fn time_domain(&self) -> Vec<f32> {
        let (newer, older) = self.ring.split_at(self.pos);
        older.iter().chain(newer.iter()).copied().collect()
    }

    /// Waveform bytes centred on 128.
    pub fn time_domain_bytes(&self) -> Vec<u8> {
        self.time_domain()
            .into_iter()
            .map(|s| (128.0 * (1.0 + s)).clamp(0.0, 255.0) as u8)
            .collect()
    }

    /// Magnitude spectrum of the analysis window scaled between
    /// `MIN_DECIBELS` and `MAX_DECIBELS`.
    pub fn frequency_bytes(&mut self) -> Vec<u8> {
        let fft_size = self.ring.len();
        let ordered = self.time_domain();
        for ((dst, sample), w) in self.frame.iter_mut().zip(ordered).zip(&self.window) {
            *dst = sample * w;
        }

        if self
            .fft
            .process_with_scratch(&mut self.frame, &mut self.spectrum, &mut self.scratch)
            .is_err()
        {
            return vec![0; self.frequency_bin_count()];
        }

        let range = MAX_DECIBELS - MIN_DECIBELS;
        self.spectrum
            .iter()
            .take(fft_size / 2)
            .map(|bin| {
                let magnitude = bin.norm() / fft_size as f32;
                let db = if magnitude > 0.0 {
                    20.0 * magnitude.log10()
                } else {
                    MIN_DECIBELS
                };
                (255.0 * (db - MIN_DECIBELS) / range).clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    pub fn reset(&mut self) {
        self.ring.fill(0.0);
        self.pos = 0;
        self.meter.reset();
    }
}

impl Stage for AnalyserStage {
    fn process(&mut self, input: f32) -> f32 {
        self.ring[self.pos] = input;
        self.pos = (self.pos + 1) % self.ring.len();
        input
    }

    fn process_block(&mut self, input: &mut [f32]) {
        for &sample in input.iter() {
            self.process(sample);
        }
        self.meter.process(&self.ring);
    }

    fn set_parameter(&mut self, _name: &str, _value: f32) -> Result<(), &'static str> {
        Err("Analyser has no adjustable parameters")
    }

    fn get_parameter(&self, name: &str) -> Result<f32, &'static str> {
        match name {
            "fftSize" => Ok(self.ring.len() as f32),
            _ => Err("Unknown parameter"),
        }
    }
}
