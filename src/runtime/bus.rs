//! Channels between the three contexts.
//!
//! Every context owns one unbounded input queue. Requests carry a oneshot
//! sender for their reply; UI broadcasts go through a `broadcast` channel so
//! any number of control surfaces can listen.

use log::{debug, warn};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::effects::EffectSettings;
use crate::protocol::{Origin, PageId, Request, Response, UiEvent};
use crate::runtime::page::PageInput;
use crate::store::ExtensionState;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{0} is no longer running")]
    Closed(&'static str),

    #[error("{0} dropped the reply")]
    NoReply(&'static str),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Inputs of the store loop.
pub enum StoreInput {
    Message {
        origin: Origin,
        payload: Value,
        reply: oneshot::Sender<Response>,
    },
    Connect {
        page: PageId,
        commands: mpsc::UnboundedSender<PageInput>,
    },
    PageClosed(PageId),
    PageNavigating(PageId),
    Install {
        reply: oneshot::Sender<()>,
    },
    Inspect {
        reply: oneshot::Sender<StoreSnapshot>,
    },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    pub settings: EffectSettings,
    pub state: ExtensionState,
    pub active_page: Option<PageId>,
}

/// Cloneable sender side of the store loop.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::UnboundedSender<StoreInput>,
    events: broadcast::Sender<UiEvent>,
}

impl StoreHandle {
    pub(crate) const fn new(
        tx: mpsc::UnboundedSender<StoreInput>,
        events: broadcast::Sender<UiEvent>,
    ) -> Self {
        Self { tx, events }
    }

    fn send(&self, input: StoreInput) -> Result<(), TransportError> {
        self.tx
            .send(input)
            .map_err(|_| TransportError::Closed("store"))
    }

    /// Send a raw JSON message and wait for its response.
    pub async fn request(&self, origin: Origin, payload: Value) -> Result<Response, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreInput::Message {
            origin,
            payload,
            reply,
        })?;
        rx.await.map_err(|_| TransportError::NoReply("store"))
    }

    pub async fn send_request(
        &self,
        origin: Origin,
        request: &Request,
    ) -> Result<Response, TransportError> {
        self.request(origin, serde_json::to_value(request)?).await
    }

    /// Fire-and-forget: the response is only logged.
    pub fn notify(&self, origin: Origin, request: &Request) -> Result<(), TransportError> {
        let payload = serde_json::to_value(request)?;
        let action = request.action();
        let (reply, rx) = oneshot::channel();
        self.send(StoreInput::Message {
            origin,
            payload,
            reply,
        })?;

        tokio::spawn(async move {
            match rx.await {
                Ok(response) if response.is_success() => debug!("{action} from {origin} acknowledged"),
                Ok(response) => warn!(
                    "{action} from {origin} failed: {}",
                    response.message.as_deref().unwrap_or("no message")
                ),
                Err(_) => warn!("{action} from {origin} got no reply"),
            }
        });
        Ok(())
    }

    pub fn connect_page(
        &self,
        page: PageId,
        commands: mpsc::UnboundedSender<PageInput>,
    ) -> Result<(), TransportError> {
        self.send(StoreInput::Connect { page, commands })
    }

    pub fn page_closed(&self, page: PageId) -> Result<(), TransportError> {
        self.send(StoreInput::PageClosed(page))
    }

    pub fn page_navigating(&self, page: PageId) -> Result<(), TransportError> {
        self.send(StoreInput::PageNavigating(page))
    }

    pub async fn install(&self) -> Result<(), TransportError> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreInput::Install { reply })?;
        rx.await.map_err(|_| TransportError::NoReply("store"))
    }

    pub async fn inspect(&self) -> Result<StoreSnapshot, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreInput::Inspect { reply })?;
        rx.await.map_err(|_| TransportError::NoReply("store"))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.events.subscribe()
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(StoreInput::Shutdown);
    }
}
