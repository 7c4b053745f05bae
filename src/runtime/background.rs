use log::{debug, error, info, warn};
use std::collections::HashMap;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::protocol::{PageCommand, PageId, UiEvent};
use crate::runtime::bus::{StoreHandle, StoreInput, StoreSnapshot};
use crate::runtime::page::PageInput;
use crate::store::{Effect, KeyValueStore, SettingsStore};

const UI_EVENT_CAPACITY: usize = 64;

/// The long-lived context owning the settings store.
pub struct Background<S: KeyValueStore> {
    store: SettingsStore<S>,
    input_rx: mpsc::UnboundedReceiver<StoreInput>,
    events: broadcast::Sender<UiEvent>,
    pages: HashMap<PageId, mpsc::UnboundedSender<PageInput>>,
}

impl<S: KeyValueStore> Background<S> {
    /// Load the store, then run its loop on a new task.
    pub async fn spawn(storage: S) -> (StoreHandle, JoinHandle<()>) {
        let store = SettingsStore::load(storage).await;
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(UI_EVENT_CAPACITY);

        let handle = StoreHandle::new(input_tx, events.clone());
        let background = Self {
            store,
            input_rx,
            events,
            pages: HashMap::new(),
        };

        (handle, tokio::spawn(background.run()))
    }

    async fn run(mut self) {
        info!("Background context started");

        while let Some(input) = self.input_rx.recv().await {
            match input {
                StoreInput::Message {
                    origin,
                    payload,
                    reply,
                } => {
                    let outcome = self.store.handle_json(origin, payload).await;
                    for effect in outcome.effects {
                        self.execute(effect);
                    }
                    let _ = reply.send(outcome.response);
                }
                StoreInput::Connect { page, commands } => {
                    debug!("{page} connected");
                    self.pages.insert(page, commands);
                }
                StoreInput::PageClosed(page) => {
                    self.store.page_closed(page);
                    self.pages.remove(&page);
                }
                StoreInput::PageNavigating(page) => self.store.page_navigating(page),
                StoreInput::Install { reply } => {
                    self.store.install().await;
                    let _ = reply.send(());
                }
                StoreInput::Inspect { reply } => {
                    let _ = reply.send(StoreSnapshot {
                        settings: *self.store.settings(),
                        state: self.store.extension_state(),
                        active_page: self.store.active_page(),
                    });
                }
                StoreInput::Shutdown => {
                    info!("Background context shutting down");
                    break;
                }
            }
        }

        info!("Background context stopped");
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Relay { page, command } => self.relay(page, command),
            Effect::Broadcast(event) => {
                if self.events.send(event).is_err() {
                    debug!("No UI listening for broadcasts");
                }
            }
        }
    }

    // relay pushes a command to a page without waiting for it. The page's
    // answer is logged from a separate task.
    fn relay(&mut self, page: PageId, command: PageCommand) {
        let Some(commands) = self.pages.get(&page) else {
            warn!("Cannot relay {} to unknown {page}", command.action());
            return;
        };

        let action = command.action();
        let payload = match serde_json::to_value(&command) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode {action}: {e}");
                return;
            }
        };

        let (reply, rx) = oneshot::channel();
        if commands
            .send(PageInput::Command {
                command: payload,
                reply,
            })
            .is_err()
        {
            warn!("{page} is gone, dropping {action}");
            self.pages.remove(&page);
            self.store.page_closed(page);
            return;
        }

        tokio::spawn(async move {
            match rx.await {
                Ok(response) if response.is_success() => debug!("{page} applied {action}"),
                Ok(_) => warn!("{page} could not apply {action}"),
                Err(_) => warn!("{page} dropped {action} without answering"),
            }
        });
    }
}
