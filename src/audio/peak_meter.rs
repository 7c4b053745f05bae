use arc_swap::ArcSwap;
use std::sync::Arc;

use crate::effects::stages::common::lin_to_db;

/// Level reported when there is nothing to measure.
pub const METER_FLOOR_DB: f32 = -100.0;

const CLIP_THRESHOLD: f32 = 0.95;

/// Publishes the peak of each analysed window so readers on other tasks can
/// sample it without touching the chain.
pub struct PeakMeter {
    info: Arc<ArcSwap<PeakMeterInfo>>,
}

#[derive(Clone)]
pub struct PeakMeterHandle {
    info: Arc<ArcSwap<PeakMeterInfo>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeakMeterInfo {
    pub peak_db: f32,
    pub peak_linear: f32,
    pub is_clipping: bool,
}

impl Default for PeakMeterInfo {
    fn default() -> Self {
        Self {
            peak_db: METER_FLOOR_DB,
            peak_linear: 0.0,
            is_clipping: false,
        }
    }
}

impl PeakMeter {
    pub fn new() -> (Self, PeakMeterHandle) {
        let info = Arc::new(ArcSwap::from_pointee(PeakMeterInfo::default()));

        (
            Self {
                info: Arc::clone(&info),
            },
            PeakMeterHandle { info },
        )
    }

    pub fn process(&mut self, samples: &[f32]) {
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        self.info.store(Arc::new(PeakMeterInfo {
            peak_db: lin_to_db(peak, METER_FLOOR_DB),
            peak_linear: peak,
            is_clipping: peak >= CLIP_THRESHOLD,
        }));
    }

    pub fn reset(&mut self) {
        self.info.store(Arc::new(PeakMeterInfo::default()));
    }
}

impl PeakMeterHandle {
    pub fn get_info(&self) -> PeakMeterInfo {
        self.info.load().as_ref().clone()
    }

    pub fn peak_db(&self) -> f32 {
        self.info.load().peak_db
    }
}
