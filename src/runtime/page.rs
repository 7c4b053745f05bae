use log::{debug, info, warn};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::audio::host::AudioBackend;
use crate::audio::session::{GraphError, GraphState};
use crate::effects::EffectSettings;
use crate::page::selector::{ElementSelector, Reaction, SessionNotice};
use crate::page::{Document, ElementId, PageEvent};
use crate::protocol::{Origin, PageCommand, PageId, ProtocolError, Request, Response};
use crate::runtime::bus::{StoreHandle, TransportError};
use crate::settings::AppConfig;

/// Inputs of a page loop.
pub enum PageInput {
    Dom(PageEvent),
    /// A store command as received on the wire.
    Command {
        command: Value,
        reply: oneshot::Sender<Response>,
    },
    Reselect,
    /// Pull a block of the bound element's audio through the graph.
    Render {
        block: Vec<f32>,
        reply: oneshot::Sender<Vec<f32>>,
    },
    Snapshot {
        reply: oneshot::Sender<PageSnapshot>,
    },
    Shutdown,
}

/// Observable state of a page, for tests and the simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSnapshot {
    pub bound: Option<ElementId>,
    pub graph: Option<GraphState>,
    pub live_settings: Option<EffectSettings>,
    pub last_applied: Option<EffectSettings>,
    pub effects_enabled: bool,
    pub meter_db: Option<f32>,
    pub ever_bound: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct PageOptions {
    pub fft_size: usize,
    pub reselect_delay: Duration,
    pub meter_interval: Duration,
}

impl From<&AppConfig> for PageOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            fft_size: config.analyser.fft_size,
            reselect_delay: Duration::from_millis(config.reselect_delay_ms),
            meter_interval: Duration::from_millis(config.meter_interval_ms),
        }
    }
}

impl Default for PageOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

#[derive(Clone)]
pub struct PageHandle {
    page: PageId,
    tx: mpsc::UnboundedSender<PageInput>,
}

impl PageHandle {
    pub const fn id(&self) -> PageId {
        self.page
    }

    fn send(&self, input: PageInput) -> Result<(), TransportError> {
        self.tx.send(input).map_err(|_| TransportError::Closed("page"))
    }

    pub fn dom(&self, event: PageEvent) -> Result<(), TransportError> {
        self.send(PageInput::Dom(event))
    }

    pub async fn render(&self, block: Vec<f32>) -> Result<Vec<f32>, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.send(PageInput::Render { block, reply })?;
        rx.await.map_err(|_| TransportError::NoReply("page"))
    }

    pub async fn snapshot(&self) -> Result<PageSnapshot, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.send(PageInput::Snapshot { reply })?;
        rx.await.map_err(|_| TransportError::NoReply("page"))
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(PageInput::Shutdown);
    }
}

/// Per-page context: one selector, one graph at a time, one input queue.
pub struct PageContext<B: AudioBackend, D: Document> {
    page: PageId,
    selector: ElementSelector<B>,
    document: D,
    store: StoreHandle,
    options: PageOptions,
    input_rx: mpsc::UnboundedReceiver<PageInput>,
    self_tx: mpsc::WeakUnboundedSender<PageInput>,
}

impl<B: AudioBackend, D: Document + 'static> PageContext<B, D> {
    /// Register with the store and start the loop. The initial scan is queued
    /// as the first input.
    pub fn spawn(
        page: PageId,
        backend: B,
        document: D,
        store: StoreHandle,
        options: PageOptions,
    ) -> Result<(PageHandle, JoinHandle<()>), TransportError> {
        let (tx, input_rx) = mpsc::unbounded_channel();
        store.connect_page(page, tx.clone())?;

        let context = Self {
            page,
            selector: ElementSelector::new(backend, options.fft_size),
            document,
            store,
            options,
            input_rx,
            self_tx: tx.downgrade(),
        };

        let handle = PageHandle { page, tx };
        handle.dom(PageEvent::Loaded)?;

        Ok((handle, tokio::spawn(context.run())))
    }

    async fn run(mut self) {
        info!("{} started", self.page);

        let mut meter = tokio::time::interval(self.options.meter_interval);
        meter.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                input = self.input_rx.recv() => match input {
                    Some(PageInput::Shutdown) | None => break,
                    Some(input) => self.handle(input).await,
                },
                _ = meter.tick() => self.publish_meter(),
            }
        }

        let reaction = self.selector.release().await;
        self.report(reaction);
        if let Err(e) = self.store.page_closed(self.page) {
            debug!("{} closing after the store: {e}", self.page);
        }
        info!("{} stopped", self.page);
    }

    async fn handle(&mut self, input: PageInput) {
        match input {
            PageInput::Dom(event) => {
                let reaction = self.selector.handle_event(&self.document, event).await;
                self.report(reaction);
            }
            PageInput::Reselect => {
                let reaction = self.selector.reselect(&self.document).await;
                self.report(reaction);
            }
            PageInput::Command { command, reply } => {
                let response = match self.apply_command(command) {
                    Ok(()) => Response::success(),
                    Err(e) => {
                        warn!("{}: {e}", self.page);
                        Response::from(&e)
                    }
                };
                let _ = reply.send(response);
            }
            PageInput::Render { mut block, reply } => {
                match self.selector.live_session_mut() {
                    Some(session) => session.render(&mut block),
                    None => block.fill(0.0),
                }
                let _ = reply.send(block);
            }
            PageInput::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            PageInput::Shutdown => {}
        }
    }

    fn apply_command(&mut self, command: Value) -> Result<(), ProtocolError> {
        let command: PageCommand = serde_json::from_value(command)
            .map_err(|e| ProtocolError::InvalidMessage(e.to_string()))?;
        debug!("{} received {}", self.page, command.action());

        // Keep what the store says for the next graph even if none is live now
        match &command {
            PageCommand::InitializeAudioProcessorState {
                audio_settings,
                effects_enabled,
            } => self.selector.set_seed(Some(*audio_settings), *effects_enabled),
            PageCommand::ApplyAudioSettings { settings } => {
                let enabled = self.selector.seed().1;
                self.selector.set_seed(Some(*settings), enabled);
            }
            PageCommand::SetAudioEffectsEnabled { enable, settings } => {
                self.selector.set_seed(*settings, *enable);
            }
        }

        let session = self
            .selector
            .live_session_mut()
            .ok_or(ProtocolError::NoActiveGraph)?;

        let result = match command {
            PageCommand::InitializeAudioProcessorState {
                audio_settings,
                effects_enabled,
            } => session
                .update_settings(&audio_settings)
                .and_then(|()| session.set_effects_enabled(effects_enabled, None)),
            PageCommand::ApplyAudioSettings { settings } => session.update_settings(&settings),
            PageCommand::SetAudioEffectsEnabled { enable, settings } => {
                session.set_effects_enabled(enable, settings.as_ref())
            }
        };

        result.map_err(|GraphError::NotLive(_)| ProtocolError::NoActiveGraph)
    }

    fn report(&self, reaction: Reaction) {
        for notice in reaction.notices {
            let request = match notice {
                SessionNotice::Ready(element) => {
                    info!("{}: graph ready on {element}", self.page);
                    Request::SessionReady
                }
                SessionNotice::Removed => Request::SessionRemoved,
            };
            if let Err(e) = self.store.notify(Origin::Page(self.page), &request) {
                warn!("{}: could not notify store: {e}", self.page);
            }
        }

        if reaction.schedule_reselect {
            let weak = self.self_tx.clone();
            let delay = self.options.reselect_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Some(tx) = weak.upgrade() {
                    let _ = tx.send(PageInput::Reselect);
                }
            });
        }
    }

    fn publish_meter(&self) {
        let Some(session) = self.selector.session() else {
            return;
        };

        let request = Request::DecibelUpdate {
            value: session.read_meter(),
        };
        if let Err(e) = self.store.notify(Origin::Page(self.page), &request) {
            debug!("{}: meter update dropped: {e}", self.page);
        }
    }

    fn snapshot(&self) -> PageSnapshot {
        let session = self.selector.session();
        let effects_enabled = self.selector.seed().1;

        PageSnapshot {
            bound: self.selector.bound_element(),
            graph: session.map(|s| s.state()),
            live_settings: session.and_then(|s| s.chain()).map(|c| c.live_settings()),
            last_applied: session.map(|s| *s.last_applied()),
            effects_enabled,
            meter_db: session.map(|s| s.read_meter()),
            ever_bound: self.selector.bound().len(),
        }
    }
}
