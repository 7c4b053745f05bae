use log::{debug, error, warn};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

use crate::audio::peak_meter::METER_FLOOR_DB;
use crate::effects::{EffectSettings, SettingType};
use crate::protocol::{Origin, Request, Response, UiEvent};
use crate::runtime::bus::{StoreHandle, TransportError};

/// How a control's displayed value relates to the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueScale {
    Identity,
    /// Displayed in milliseconds, stored in seconds.
    Milliseconds,
}

impl ValueScale {
    pub fn to_stored(self, displayed: f32) -> f32 {
        match self {
            ValueScale::Identity => displayed,
            ValueScale::Milliseconds => displayed / 1000.0,
        }
    }

    pub fn to_displayed(self, stored: f32) -> f32 {
        match self {
            ValueScale::Identity => stored,
            ValueScale::Milliseconds => stored * 1000.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ControlSpec {
    pub id: &'static str,
    pub setting_type: SettingType,
    pub parameter: &'static str,
    pub unit: &'static str,
    pub scale: ValueScale,
}

const fn control(
    id: &'static str,
    setting_type: SettingType,
    parameter: &'static str,
    unit: &'static str,
    scale: ValueScale,
) -> ControlSpec {
    ControlSpec {
        id,
        setting_type,
        parameter,
        unit,
        scale,
    }
}

pub const CONTROLS: [ControlSpec; 7] = [
    control("comp-threshold", SettingType::Compressor, "threshold", " dB", ValueScale::Identity),
    control("comp-ratio", SettingType::Compressor, "ratio", ":1", ValueScale::Identity),
    control("comp-attack", SettingType::Compressor, "attack", " ms", ValueScale::Milliseconds),
    control("comp-release", SettingType::Compressor, "release", " ms", ValueScale::Milliseconds),
    control("comp-knee", SettingType::Compressor, "knee", " dB", ValueScale::Identity),
    control("limiter-threshold", SettingType::Limiter, "threshold", " dB", ValueScale::Identity),
    control("amp-gain", SettingType::Amplifier, "gain", " dB", ValueScale::Identity),
];

/// Lowest level the meter shows; anything at or below reads as silence.
pub const METER_MIN_DB: f32 = -80.0;
pub const METER_MAX_DB: f32 = 0.0;

#[derive(Debug, Clone, PartialEq)]
pub struct MeterDisplay {
    pub fill_percent: f32,
    pub text: String,
}

impl Default for MeterDisplay {
    fn default() -> Self {
        meter_display(METER_FLOOR_DB)
    }
}

pub fn meter_display(db: f32) -> MeterDisplay {
    let fill_percent =
        ((db - METER_MIN_DB) / (METER_MAX_DB - METER_MIN_DB) * 100.0).clamp(0.0, 100.0);
    let text = if db <= METER_MIN_DB || db.is_nan() {
        "-∞ dB".to_string()
    } else {
        format!("{db:.1} dB")
    };

    MeterDisplay { fill_percent, text }
}

#[derive(Debug, Error)]
pub enum UiError {
    #[error("unknown control '{0}'")]
    UnknownControl(String),

    #[error("store rejected the change: {0}")]
    Rejected(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl UiError {
    fn rejected(response: &Response) -> Self {
        UiError::Rejected(
            response
                .message
                .clone()
                .unwrap_or_else(|| "no reason given".to_string()),
        )
    }
}

/// View model of the popup: control values, master toggle and meter.
pub struct ControlSurface {
    store: StoreHandle,
    events: broadcast::Receiver<UiEvent>,
    values: [f32; CONTROLS.len()],
    enabled: bool,
    meter: MeterDisplay,
}

impl ControlSurface {
    /// Subscribe to broadcasts, then fetch the current settings.
    pub async fn open(store: StoreHandle) -> Result<Self, UiError> {
        let events = store.subscribe();
        let mut surface = Self {
            store,
            events,
            values: [0.0; CONTROLS.len()],
            enabled: true,
            meter: MeterDisplay::default(),
        };

        let response = surface
            .store
            .send_request(Origin::Ui, &Request::GetSettings)
            .await?;
        if !response.is_success() {
            return Err(UiError::rejected(&response));
        }
        if let Some(settings) = &response.audio_settings {
            surface.update_controls(settings);
        }
        if let Some(state) = response.extension_state {
            surface.enabled = state.enabled;
        }

        Ok(surface)
    }

    pub fn value(&self, id: &str) -> Option<f32> {
        CONTROLS
            .iter()
            .position(|c| c.id == id)
            .map(|index| self.values[index])
    }

    /// Displayed value with its unit, e.g. `20 ms`.
    pub fn label(&self, id: &str) -> Option<String> {
        let index = CONTROLS.iter().position(|c| c.id == id)?;
        Some(format!("{}{}", self.values[index], CONTROLS[index].unit))
    }

    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    pub const fn meter(&self) -> &MeterDisplay {
        &self.meter
    }

    /// A control moved. Ignored while the master toggle is off.
    pub async fn input(&mut self, id: &str, displayed: f32) -> Result<bool, UiError> {
        if !self.enabled {
            debug!("Ignoring {id} while disabled");
            return Ok(false);
        }

        let index = CONTROLS
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| UiError::UnknownControl(id.to_string()))?;
        let spec = CONTROLS[index];
        self.values[index] = displayed;

        let request = Request::UpdateSetting {
            setting_type: spec.setting_type,
            parameter: spec.parameter.to_string(),
            value: spec.scale.to_stored(displayed),
        };
        let response = self.store.send_request(Origin::Ui, &request).await?;
        if !response.is_success() {
            return Err(UiError::rejected(&response));
        }
        Ok(true)
    }

    /// Flip the master toggle; it springs back if the store does not confirm.
    pub async fn toggle(&mut self, enabled: bool) -> Result<(), UiError> {
        let previous = self.enabled;
        self.enabled = enabled;

        let request = Request::SetEnabledState {
            is_enabled: enabled,
        };
        match self.store.send_request(Origin::Ui, &request).await {
            Ok(response) if response.is_success() => Ok(()),
            Ok(response) => {
                error!("Failed to set extension enabled state");
                self.enabled = previous;
                Err(UiError::rejected(&response))
            }
            Err(e) => {
                error!("Failed to set extension enabled state: {e}");
                self.enabled = previous;
                Err(e.into())
            }
        }
    }

    /// Reset everything to the defaults. Ignored while the master toggle is off.
    pub async fn reset(&mut self) -> Result<bool, UiError> {
        if !self.enabled {
            return Ok(false);
        }

        let response = self
            .store
            .send_request(Origin::Ui, &Request::ResetToDefaults)
            .await?;
        match (&response.audio_settings, response.is_success()) {
            (Some(settings), true) => {
                self.update_controls(settings);
                Ok(true)
            }
            _ => Err(UiError::rejected(&response)),
        }
    }

    pub fn apply_event(&mut self, event: &UiEvent) {
        match event {
            UiEvent::ExtensionStateChanged { new_state } => self.enabled = new_state.enabled,
            UiEvent::DecibelUpdate { value } => self.meter = meter_display(*value),
        }
    }

    /// Drain pending broadcasts. Returns how many were applied.
    pub fn poll_events(&mut self) -> usize {
        let mut applied = 0;
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    self.apply_event(&event);
                    applied += 1;
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("Control surface skipped {skipped} broadcasts");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        applied
    }

    fn update_controls(&mut self, settings: &EffectSettings) {
        for (value, spec) in self.values.iter_mut().zip(CONTROLS.iter()) {
            if let Some(stored) = settings.get_parameter(spec.setting_type, spec.parameter) {
                *value = spec.scale.to_displayed(stored);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attack_and_release_are_shown_in_milliseconds() {
        let attack = CONTROLS.iter().find(|c| c.id == "comp-attack").unwrap();

        assert_eq!(attack.scale.to_stored(20.0), 0.02);
        assert!((attack.scale.to_displayed(0.25) - 250.0).abs() < 1e-4);
    }

    #[test]
    fn every_control_addresses_a_real_parameter() {
        let settings = EffectSettings::default();
        for spec in &CONTROLS {
            assert!(
                settings
                    .get_parameter(spec.setting_type, spec.parameter)
                    .is_some(),
                "{} has no backing parameter",
                spec.id
            );
        }
    }

    #[test]
    fn meter_maps_range_onto_percent() {
        assert_eq!(meter_display(0.0).fill_percent, 100.0);
        assert_eq!(meter_display(-40.0).fill_percent, 50.0);
        assert_eq!(meter_display(6.0).fill_percent, 100.0);
        assert_eq!(meter_display(-12.34).text, "-12.3 dB");
    }

    #[test]
    fn meter_shows_silence_at_the_bottom() {
        let silent = meter_display(-80.0);
        assert_eq!(silent.fill_percent, 0.0);
        assert_eq!(silent.text, "-∞ dB");

        assert_eq!(meter_display(METER_FLOOR_DB), MeterDisplay::default());
        assert_eq!(MeterDisplay::default().text, "-∞ dB");
    }
}
