use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::effects::EffectSettings;
use crate::protocol::{Origin, PageCommand, PageId, ProtocolError, Request, Response, UiEvent};

pub mod storage;

pub use storage::{JsonFileStorage, KeyValueStore, MemoryStorage, StorageError};

pub const SETTINGS_KEY: &str = "audioSettings";
pub const STATE_KEY: &str = "extensionGlobalState";

/// Global master toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionState {
    #[serde(alias = "isExtensionEnabled")]
    pub enabled: bool,
}

impl Default for ExtensionState {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Side effect the owner of the store must carry out after a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Relay { page: PageId, command: PageCommand },
    Broadcast(UiEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub response: Response,
    pub effects: Vec<Effect>,
}

impl Outcome {
    fn reply(response: Response) -> Self {
        Self {
            response,
            effects: Vec::new(),
        }
    }
}

/// Owner of the canonical settings and the master toggle. Tracks which page
/// currently has a live graph and decides what gets relayed to it.
pub struct SettingsStore<S: KeyValueStore> {
    storage: S,
    settings: EffectSettings,
    state: ExtensionState,
    active_page: Option<PageId>,
}

impl<S: KeyValueStore> SettingsStore<S> {
    /// Read both records, filling anything missing from the defaults.
    pub async fn load(storage: S) -> Self {
        let mut store = Self {
            storage,
            settings: EffectSettings::default(),
            state: ExtensionState::default(),
            active_page: None,
        };

        match store.storage.get(SETTINGS_KEY).await {
            Ok(Some(value)) => {
                let (settings, repaired) = merge_with_defaults(value);
                store.settings = settings;
                if repaired {
                    info!("Stored audio settings were incomplete, filled from defaults");
                    store.persist_settings().await;
                }
                debug!("Loaded audio settings: {:?}", store.settings);
            }
            Ok(None) => {
                info!("No audio settings stored, using defaults");
                store.persist_settings().await;
            }
            Err(e) => error!("Failed to read audio settings, using defaults: {e}"),
        }

        match store.storage.get(STATE_KEY).await {
            Ok(Some(value)) => match serde_json::from_value::<ExtensionState>(value) {
                Ok(state) => store.state = state,
                Err(e) => {
                    warn!("Stored extension state is invalid ({e}), resetting");
                    store.persist_state().await;
                }
            },
            Ok(None) => store.persist_state().await,
            Err(e) => error!("Failed to read extension state, using defaults: {e}"),
        }

        info!(
            "Settings store loaded, effects {}",
            if store.state.enabled { "enabled" } else { "disabled" }
        );
        store
    }

    pub const fn settings(&self) -> &EffectSettings {
        &self.settings
    }

    pub const fn extension_state(&self) -> ExtensionState {
        self.state
    }

    pub const fn active_page(&self) -> Option<PageId> {
        self.active_page
    }

    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// First-install hook: both records go back to their defaults.
    pub async fn install(&mut self) {
        info!("Installing default settings");
        self.settings = EffectSettings::default();
        self.state = ExtensionState::default();
        self.persist_settings().await;
        self.persist_state().await;
    }

    /// Decode and handle a raw message. Malformed input becomes an error response.
    pub async fn handle_json(&mut self, origin: Origin, message: Value) -> Outcome {
        match Request::from_value(message) {
            Ok(request) => self.handle(origin, request).await,
            Err(e) => {
                warn!("Rejected message from {origin}: {e}");
                Outcome::reply(Response::from(&e))
            }
        }
    }

    pub async fn handle(&mut self, origin: Origin, request: Request) -> Outcome {
        debug!("Store received {} from {origin}", request.action());

        let page = match origin {
            Origin::Page(page) => Some(page),
            Origin::Ui => None,
        };

        match (request, page) {
            (Request::GetSettings, _) => Outcome::reply(
                Response::success()
                    .with_settings(self.settings)
                    .with_extension_state(self.state),
            ),
            (
                Request::UpdateSetting {
                    setting_type,
                    parameter,
                    value,
                },
                _,
            ) => {
                let mut settings = self.settings;
                if let Err(e) = settings.set_parameter(setting_type, &parameter, value) {
                    let e = ProtocolError::from(e);
                    warn!("Rejected updateSetting: {e}");
                    return Outcome::reply(Response::from(&e));
                }
                self.replace_settings(settings).await
            }
            (Request::ResetToDefaults, _) => {
                self.replace_settings(EffectSettings::default()).await
            }
            (Request::SetEnabledState { is_enabled }, _) => self.set_enabled(is_enabled).await,
            (Request::SessionReady, Some(page)) => self.session_ready(page),
            (Request::SessionRemoved, Some(page)) => {
                self.clear_active(page, "removed its graph");
                Outcome::reply(Response::success())
            }
            (Request::DecibelUpdate { value }, Some(page)) => {
                let mut outcome = Outcome::reply(Response::success());
                if self.active_page == Some(page) {
                    outcome
                        .effects
                        .push(Effect::Broadcast(UiEvent::DecibelUpdate { value }));
                }
                outcome
            }
            (
                request @ (Request::SessionReady
                | Request::SessionRemoved
                | Request::DecibelUpdate { .. }),
                None,
            ) => {
                let e = ProtocolError::PageOnly(request.action());
                warn!("{e}");
                Outcome::reply(Response::from(&e))
            }
        }
    }

    /// The page's context went away.
    pub fn page_closed(&mut self, page: PageId) {
        self.clear_active(page, "closed");
    }

    /// The page started loading a new document; its graph is gone.
    pub fn page_navigating(&mut self, page: PageId) {
        self.clear_active(page, "is navigating");
    }

    fn clear_active(&mut self, page: PageId, why: &str) {
        if self.active_page == Some(page) {
            info!("Active page {page} {why}, clearing relay target");
            self.active_page = None;
        }
    }

    fn session_ready(&mut self, page: PageId) -> Outcome {
        if let Some(previous) = self.active_page.replace(page)
            && previous != page
        {
            info!("Active page moved from {previous} to {page}");
        } else {
            info!("Active page is {page}");
        }

        Outcome {
            response: Response::success(),
            effects: vec![Effect::Relay {
                page,
                command: PageCommand::InitializeAudioProcessorState {
                    audio_settings: self.settings,
                    effects_enabled: self.state.enabled,
                },
            }],
        }
    }

    async fn replace_settings(&mut self, settings: EffectSettings) -> Outcome {
        self.settings = settings;
        self.persist_settings().await;

        let mut outcome = Outcome::reply(Response::success().with_settings(self.settings));
        match self.active_page {
            Some(page) if self.state.enabled => outcome.effects.push(Effect::Relay {
                page,
                command: PageCommand::ApplyAudioSettings {
                    settings: self.settings,
                },
            }),
            Some(_) => debug!("Effects disabled, settings cached only"),
            None => debug!("{}, relay skipped", ProtocolError::NoActiveGraph),
        }
        outcome
    }

    async fn set_enabled(&mut self, enabled: bool) -> Outcome {
        self.state.enabled = enabled;
        self.persist_state().await;
        info!("Effects {}", if enabled { "enabled" } else { "disabled" });

        let mut effects = Vec::with_capacity(2);
        if let Some(page) = self.active_page {
            effects.push(Effect::Relay {
                page,
                command: PageCommand::SetAudioEffectsEnabled {
                    enable: enabled,
                    settings: enabled.then_some(self.settings),
                },
            });
        }
        effects.push(Effect::Broadcast(UiEvent::ExtensionStateChanged {
            new_state: self.state,
        }));

        Outcome {
            response: Response::success().with_new_state(self.state),
            effects,
        }
    }

    // Persistence failures are logged; the in-memory state stays authoritative.
    async fn persist_settings(&self) {
        match serde_json::to_value(self.settings) {
            Ok(value) => {
                if let Err(e) = self.storage.set(SETTINGS_KEY, value).await {
                    error!("Failed to persist audio settings: {e}");
                }
            }
            Err(e) => error!("Failed to serialize audio settings: {e}"),
        }
    }

    async fn persist_state(&self) {
        match serde_json::to_value(self.state) {
            Ok(value) => {
                if let Err(e) = self.storage.set(STATE_KEY, value).await {
                    error!("Failed to persist extension state: {e}");
                }
            }
            Err(e) => error!("Failed to serialize extension state: {e}"),
        }
    }
}

/// Fill absent or mistyped parameters from the default table and clamp the
/// rest to their nominal ranges. The flag is set when anything changed.
pub fn merge_with_defaults(mut value: Value) -> (EffectSettings, bool) {
    let defaults = EffectSettings::default();
    let Ok(default_value) = serde_json::to_value(defaults) else {
        return (defaults, true);
    };

    let repaired = fill_missing(&mut value, &default_value);
    match serde_json::from_value(value) {
        Ok(settings) => {
            let clamped = EffectSettings::clamped(settings);
            (clamped, repaired || clamped != settings)
        }
        Err(e) => {
            warn!("Stored audio settings unreadable ({e}), using defaults");
            (defaults, true)
        }
    }
}

fn fill_missing(value: &mut Value, defaults: &Value) -> bool {
    match (value, defaults) {
        (Value::Object(map), Value::Object(defaults)) => {
            let mut changed = false;
            for (key, default) in defaults {
                match map.get_mut(key) {
                    Some(existing) => changed |= fill_missing(existing, default),
                    None => {
                        map.insert(key.clone(), default.clone());
                        changed = true;
                    }
                }
            }
            changed
        }
        (value, Value::Number(_)) if !value.is_number() => {
            *value = defaults.clone();
            true
        }
        (value, Value::Object(_)) => {
            *value = defaults.clone();
            true
        }
        _ => false,
    }
}
