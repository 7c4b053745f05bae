use log::{debug, info, warn};
use std::fmt;
use thiserror::Error;

use crate::audio::bound::BoundElementSet;
use crate::audio::host::{AudioBackend, ContextState, HostError, ProcessingContext};
use crate::audio::peak_meter::METER_FLOOR_DB;
use crate::effects::EffectSettings;
use crate::effects::chain::EffectChain;
use crate::page::ElementId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Uninitialized,
    Initializing,
    Active,
    Bypassed,
    Disconnected,
}

impl GraphState {
    /// Active or bypassed: a source is bound and the chain is wired.
    pub const fn is_live(self) -> bool {
        matches!(self, GraphState::Active | GraphState::Bypassed)
    }
}

impl fmt::Display for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphState::Uninitialized => write!(f, "uninitialized"),
            GraphState::Initializing => write!(f, "initializing"),
            GraphState::Active => write!(f, "active"),
            GraphState::Bypassed => write!(f, "bypassed"),
            GraphState::Disconnected => write!(f, "disconnected"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AttachError {
    #[error("element {0} was already captured as a source")]
    AlreadyBound(ElementId),

    #[error("cannot initialize a graph that is {0}")]
    InvalidState(GraphState),

    #[error(transparent)]
    Host(#[from] HostError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("graph is {0}")]
    NotLive(GraphState),
}

/// The processing graph bound to one media element: one context, one chain.
pub struct AudioGraphSession<C: ProcessingContext> {
    state: GraphState,
    context: Option<C>,
    chain: Option<EffectChain>,
    element: Option<ElementId>,
    last_applied: EffectSettings,
    fft_size: usize,
}

impl<C: ProcessingContext> AudioGraphSession<C> {
    pub fn new(fft_size: usize) -> Self {
        Self {
            state: GraphState::Uninitialized,
            context: None,
            chain: None,
            element: None,
            last_applied: EffectSettings::default(),
            fft_size,
        }
    }

    pub const fn state(&self) -> GraphState {
        self.state
    }

    pub const fn element(&self) -> Option<ElementId> {
        self.element
    }

    /// Settings restored on the next enable, as clamped by the stages.
    pub const fn last_applied(&self) -> &EffectSettings {
        &self.last_applied
    }

    pub const fn chain(&self) -> Option<&EffectChain> {
        self.chain.as_ref()
    }

    pub fn context_state(&self) -> Option<ContextState> {
        self.context.as_ref().map(ProcessingContext::state)
    }

    /// Bind `element` and wire the chain. On failure nothing stays allocated
    /// and the session remains uninitialized.
    pub async fn init<B>(
        &mut self,
        backend: &B,
        bound: &mut BoundElementSet,
        element: ElementId,
        settings: &EffectSettings,
        enabled: bool,
    ) -> Result<(), AttachError>
    where
        B: AudioBackend<Context = C>,
    {
        if self.state != GraphState::Uninitialized {
            return Err(AttachError::InvalidState(self.state));
        }
        if bound.contains(element) {
            return Err(AttachError::AlreadyBound(element));
        }

        self.state = GraphState::Initializing;

        let context = match bind_source(backend, element).await {
            Ok(context) => context,
            Err(e) => {
                self.state = GraphState::Uninitialized;
                return Err(e.into());
            }
        };

        let mut chain = EffectChain::new(settings, context.sample_rate(), self.fft_size);
        if !enabled {
            chain.apply_neutral();
        }
        chain.connect();

        bound.insert(element);
        self.context = Some(context);
        self.chain = Some(chain);
        self.element = Some(element);
        self.last_applied = settings.clamped();
        self.state = if enabled {
            GraphState::Active
        } else {
            GraphState::Bypassed
        };

        info!("Graph for element {element} is {}", self.state);
        Ok(())
    }

    /// Switch between the cached settings and the neutral overlay. Enabling
    /// with `settings` replaces the cache.
    pub fn set_effects_enabled(
        &mut self,
        enable: bool,
        settings: Option<&EffectSettings>,
    ) -> Result<(), GraphError> {
        let state = self.state;
        let chain = self
            .chain
            .as_mut()
            .filter(|_| state.is_live())
            .ok_or(GraphError::NotLive(state))?;

        if enable {
            let settings = settings.copied().unwrap_or(self.last_applied).clamped();
            chain.apply(&settings);
            self.last_applied = settings;
            self.state = GraphState::Active;
        } else {
            chain.apply_neutral();
            self.state = GraphState::Bypassed;
        }

        debug!("Graph effects {}", self.state);
        Ok(())
    }

    /// Apply while active; only cache while bypassed.
    pub fn update_settings(&mut self, settings: &EffectSettings) -> Result<(), GraphError> {
        match self.state {
            GraphState::Active => {
                if let Some(chain) = self.chain.as_mut() {
                    chain.apply(settings);
                }
            }
            GraphState::Bypassed => {
                debug!("Graph bypassed, caching settings");
            }
            state => return Err(GraphError::NotLive(state)),
        }

        self.last_applied = settings.clamped();
        Ok(())
    }

    /// Instantaneous peak in dB, or the meter floor when nothing is flowing.
    pub fn read_meter(&self) -> f32 {
        match &self.chain {
            Some(chain) if self.state.is_live() => chain.peak_db(),
            _ => METER_FLOOR_DB,
        }
    }

    /// Resume the context if the host left it suspended.
    pub async fn resume_if_suspended(&mut self) -> Result<(), HostError> {
        match self.context.as_mut() {
            Some(context) if context.state() == ContextState::Suspended => {
                context.resume().await?;
                debug!("Processing context resumed");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Pull one block of the bound element's audio through the chain.
    pub fn render(&mut self, block: &mut [f32]) {
        let running = self.context_state() == Some(ContextState::Running);

        match self.chain.as_mut() {
            Some(chain) if running && self.state.is_live() => chain.process_block(block),
            _ => block.fill(0.0),
        }
    }

    pub fn time_domain_bytes(&self) -> Option<Vec<u8>> {
        self.chain.as_ref().map(EffectChain::time_domain_bytes)
    }

    pub fn frequency_bytes(&mut self) -> Option<Vec<u8>> {
        self.chain.as_mut().map(EffectChain::frequency_bytes)
    }

    /// Unwire, release the source and close the context. Terminal.
    pub async fn disconnect(&mut self) {
        if self.state == GraphState::Disconnected {
            return;
        }

        if let Some(mut chain) = self.chain.take() {
            chain.disconnect();
        }
        if let Some(mut context) = self.context.take() {
            context.release_media_source();
            context.close().await;
        }

        if let Some(element) = self.element {
            info!("Graph for element {element} disconnected");
        }
        self.state = GraphState::Disconnected;
    }
}

// bind_source creates a context and captures the element. A context that never
// reached the running state gets one recreate-and-retry.
async fn bind_source<B: AudioBackend>(
    backend: &B,
    element: ElementId,
) -> Result<B::Context, HostError> {
    let mut context = backend.create_context().await?;

    match context.create_media_source(element) {
        Ok(()) => return Ok(context),
        Err(e) if context.state() != ContextState::Running => {
            warn!(
                "Capturing element {element} failed on a {} context, retrying once: {e}",
                context.state()
            );
            context.close().await;
        }
        Err(e) => {
            context.close().await;
            return Err(e);
        }
    }

    let mut context = backend.create_context().await?;
    match context.create_media_source(element) {
        Ok(()) => Ok(context),
        Err(e) => {
            context.close().await;
            Err(e)
        }
    }
}
