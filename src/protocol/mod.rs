use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::effects::{EffectSettings, SettingPathError, SettingType};
use crate::store::ExtensionState;

/// Identity of a page context as seen by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub u32);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page-{}", self.0)
    }
}

/// Sender of a request to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Page(PageId),
    Ui,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Page(page) => write!(f, "{page}"),
            Origin::Ui => write!(f, "ui"),
        }
    }
}

/// Requests handled by the store, from either a page or a UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Request {
    GetSettings,
    UpdateSetting {
        setting_type: SettingType,
        parameter: String,
        value: f32,
    },
    ResetToDefaults,
    #[serde(alias = "setExtensionEnabledState")]
    SetEnabledState { is_enabled: bool },
    #[serde(alias = "audioProcessorReady")]
    SessionReady,
    #[serde(alias = "audioProcessorRemoved")]
    SessionRemoved,
    DecibelUpdate { value: f32 },
}

impl Request {
    /// Every accepted `action` value, aliases included.
    pub const ACTIONS: [&'static str; 10] = [
        "getSettings",
        "updateSetting",
        "resetToDefaults",
        "setEnabledState",
        "setExtensionEnabledState",
        "sessionReady",
        "audioProcessorReady",
        "sessionRemoved",
        "audioProcessorRemoved",
        "decibelUpdate",
    ];

    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let action = value
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::InvalidMessage("missing action".to_string()))?;

        if !Self::ACTIONS.contains(&action) {
            return Err(ProtocolError::UnknownAction(action.to_string()));
        }

        serde_json::from_value(value).map_err(|e| ProtocolError::InvalidMessage(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::InvalidMessage(e.to_string()))?;
        Self::from_value(value)
    }

    pub const fn action(&self) -> &'static str {
        match self {
            Request::GetSettings => "getSettings",
            Request::UpdateSetting { .. } => "updateSetting",
            Request::ResetToDefaults => "resetToDefaults",
            Request::SetEnabledState { .. } => "setEnabledState",
            Request::SessionReady => "sessionReady",
            Request::SessionRemoved => "sessionRemoved",
            Request::DecibelUpdate { .. } => "decibelUpdate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Reply to a request or to a page command. Only the fields relevant to the
/// request are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_settings: Option<EffectSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_state: Option<ExtensionState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_state: Option<ExtensionState>,
}

impl Response {
    pub const fn success() -> Self {
        Self {
            status: Status::Success,
            message: None,
            audio_settings: None,
            extension_state: None,
            new_state: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: Some(message.into()),
            ..Self::success()
        }
    }

    pub const fn with_settings(mut self, settings: EffectSettings) -> Self {
        self.audio_settings = Some(settings);
        self
    }

    pub const fn with_extension_state(mut self, state: ExtensionState) -> Self {
        self.extension_state = Some(state);
        self
    }

    pub const fn with_new_state(mut self, state: ExtensionState) -> Self {
        self.new_state = Some(state);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

impl From<&ProtocolError> for Response {
    fn from(e: &ProtocolError) -> Self {
        Self::error(e.to_string())
    }
}

/// Commands pushed from the store to the active page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PageCommand {
    InitializeAudioProcessorState {
        audio_settings: EffectSettings,
        effects_enabled: bool,
    },
    ApplyAudioSettings {
        settings: EffectSettings,
    },
    SetAudioEffectsEnabled {
        enable: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        settings: Option<EffectSettings>,
    },
}

impl PageCommand {
    pub const fn action(&self) -> &'static str {
        match self {
            PageCommand::InitializeAudioProcessorState { .. } => "initializeAudioProcessorState",
            PageCommand::ApplyAudioSettings { .. } => "applyAudioSettings",
            PageCommand::SetAudioEffectsEnabled { .. } => "setAudioEffectsEnabled",
        }
    }
}

/// Broadcasts from the store to every open UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum UiEvent {
    ExtensionStateChanged { new_state: ExtensionState },
    DecibelUpdate { value: f32 },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error(transparent)]
    Setting(#[from] SettingPathError),

    #[error("'{0}' may only be sent by a page")]
    PageOnly(&'static str),

    #[error("no active audio graph")]
    NoActiveGraph,
}
