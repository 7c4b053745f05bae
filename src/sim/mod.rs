//! In-process stand-ins for the host audio runtime and the page document.
//! Used by the `simulate` command and by the tests.

use std::collections::HashSet;
use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::audio::host::{AudioBackend, ContextState, HostError, ProcessingContext};
use crate::page::{Document, ElementId, MediaElementInfo, MediaKind, ReadyState};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A page document whose media elements are driven by hand.
#[derive(Debug, Clone, Default)]
pub struct SimDocument {
    elements: Arc<Mutex<Vec<MediaElementInfo>>>,
    next_id: Arc<AtomicU64>,
}

impl SimDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attached element at the end of the document.
    pub fn add(&self, kind: MediaKind, ready_state: ReadyState, paused: bool) -> ElementId {
        let id = ElementId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        lock(&self.elements).push(MediaElementInfo {
            id,
            kind,
            ready_state,
            paused,
            attached: true,
        });
        id
    }

    pub fn element(&self, id: ElementId) -> Option<MediaElementInfo> {
        lock(&self.elements).iter().find(|e| e.id == id).cloned()
    }

    fn update(&self, id: ElementId, f: impl FnOnce(&mut MediaElementInfo)) -> bool {
        let mut elements = lock(&self.elements);
        match elements.iter_mut().find(|e| e.id == id) {
            Some(element) => {
                f(element);
                true
            }
            None => false,
        }
    }

    pub fn set_paused(&self, id: ElementId, paused: bool) -> bool {
        self.update(id, |e| e.paused = paused)
    }

    pub fn set_ready_state(&self, id: ElementId, ready_state: ReadyState) -> bool {
        self.update(id, |e| e.ready_state = ready_state)
    }

    /// Keep the element reachable but out of the document tree.
    pub fn detach(&self, id: ElementId) -> bool {
        self.update(id, |e| e.attached = false)
    }

    pub fn remove(&self, id: ElementId) -> bool {
        let mut elements = lock(&self.elements);
        let before = elements.len();
        elements.retain(|e| e.id != id);
        elements.len() != before
    }
}

impl Document for SimDocument {
    fn media_elements(&self) -> Vec<MediaElementInfo> {
        lock(&self.elements).clone()
    }
}

#[derive(Debug)]
struct SimHost {
    sample_rate: f32,
    // Capturing is one-shot per element for the whole host, across contexts
    captured: Mutex<HashSet<ElementId>>,
    failing: Mutex<HashSet<ElementId>>,
    fail_next_capture: AtomicBool,
    start_suspended: AtomicBool,
    fail_context_creation: AtomicBool,
    contexts_created: AtomicUsize,
    open_contexts: AtomicUsize,
}

/// Host audio runtime with switchable failure modes.
#[derive(Debug, Clone)]
pub struct SimBackend {
    host: Arc<SimHost>,
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new(48_000.0)
    }
}

impl SimBackend {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            host: Arc::new(SimHost {
                sample_rate,
                captured: Mutex::new(HashSet::new()),
                failing: Mutex::new(HashSet::new()),
                fail_next_capture: AtomicBool::new(false),
                start_suspended: AtomicBool::new(false),
                fail_context_creation: AtomicBool::new(false),
                contexts_created: AtomicUsize::new(0),
                open_contexts: AtomicUsize::new(0),
            }),
        }
    }

    /// Every capture of `element` fails.
    pub fn fail_element(&self, element: ElementId) {
        lock(&self.host.failing).insert(element);
    }

    /// The next capture fails once, whatever the element.
    pub fn fail_next_capture(&self) {
        self.host.fail_next_capture.store(true, Ordering::Relaxed);
    }

    /// New contexts start suspended, as without a user gesture.
    pub fn start_suspended(&self, suspended: bool) {
        self.host.start_suspended.store(suspended, Ordering::Relaxed);
    }

    pub fn fail_context_creation(&self, fail: bool) {
        self.host.fail_context_creation.store(fail, Ordering::Relaxed);
    }

    pub fn contexts_created(&self) -> usize {
        self.host.contexts_created.load(Ordering::Relaxed)
    }

    pub fn open_contexts(&self) -> usize {
        self.host.open_contexts.load(Ordering::Relaxed)
    }

    pub fn is_captured(&self, element: ElementId) -> bool {
        lock(&self.host.captured).contains(&element)
    }
}

impl AudioBackend for SimBackend {
    type Context = SimContext;

    async fn create_context(&self) -> Result<SimContext, HostError> {
        if self.host.fail_context_creation.load(Ordering::Relaxed) {
            return Err(HostError::ContextCreation("audio device unavailable".to_string()));
        }

        self.host.contexts_created.fetch_add(1, Ordering::Relaxed);
        self.host.open_contexts.fetch_add(1, Ordering::Relaxed);

        let state = if self.host.start_suspended.load(Ordering::Relaxed) {
            ContextState::Suspended
        } else {
            ContextState::Running
        };

        Ok(SimContext {
            host: Arc::clone(&self.host),
            state,
            source: None,
        })
    }
}

#[derive(Debug)]
pub struct SimContext {
    host: Arc<SimHost>,
    state: ContextState,
    source: Option<ElementId>,
}

impl SimContext {
    pub const fn source(&self) -> Option<ElementId> {
        self.source
    }
}

impl ProcessingContext for SimContext {
    fn state(&self) -> ContextState {
        self.state
    }

    fn sample_rate(&self) -> f32 {
        self.host.sample_rate
    }

    fn create_media_source(&mut self, element: ElementId) -> Result<(), HostError> {
        let unavailable = |reason: &str| HostError::SourceUnavailable {
            element,
            reason: reason.to_string(),
        };

        if self.state == ContextState::Closed {
            return Err(unavailable("context is closed"));
        }
        if lock(&self.host.failing).contains(&element) {
            return Err(unavailable("element cannot be captured"));
        }
        if self.host.fail_next_capture.swap(false, Ordering::Relaxed) {
            return Err(unavailable("context not ready"));
        }

        let mut captured = lock(&self.host.captured);
        if !captured.insert(element) {
            return Err(unavailable("element already connected to a source node"));
        }

        self.source = Some(element);
        Ok(())
    }

    fn release_media_source(&mut self) {
        self.source = None;
    }

    async fn resume(&mut self) -> Result<(), HostError> {
        match self.state {
            ContextState::Closed => Err(HostError::Resume("context is closed".to_string())),
            _ => {
                self.state = ContextState::Running;
                Ok(())
            }
        }
    }

    async fn close(&mut self) {
        if self.state != ContextState::Closed {
            self.state = ContextState::Closed;
            self.host.open_contexts.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

/// One block of a sine tone.
pub fn sine_block(frequency: f32, amplitude: f32, sample_rate: f32, offset: usize, len: usize) -> Vec<f32> {
    (offset..offset + len)
        .map(|n| amplitude * (2.0 * PI * frequency * n as f32 / sample_rate).sin())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_tracks_element_state() {
        let doc = SimDocument::new();
        let a = doc.add(MediaKind::Audio, ReadyState::HaveNothing, true);
        let b = doc.add(MediaKind::Video, ReadyState::HaveEnoughData, false);

        assert_ne!(a, b);
        assert!(doc.set_ready_state(a, ReadyState::HaveMetadata));
        assert!(doc.detach(b));
        assert!(!doc.element(b).unwrap().attached);

        assert!(doc.remove(a));
        assert!(!doc.remove(a));
        assert_eq!(doc.media_elements().len(), 1);
    }

    #[tokio::test]
    async fn capture_is_one_shot_across_contexts() {
        let backend = SimBackend::default();
        let mut first = backend.create_context().await.unwrap();
        let mut second = backend.create_context().await.unwrap();

        first.create_media_source(ElementId(7)).unwrap();
        first.release_media_source();
        first.close().await;

        assert!(second.create_media_source(ElementId(7)).is_err());
        assert!(backend.is_captured(ElementId(7)));
        assert_eq!(backend.contexts_created(), 2);
        assert_eq!(backend.open_contexts(), 1);
    }

    #[test]
    fn sine_block_continues_across_offsets() {
        let whole = sine_block(440.0, 0.5, 48_000.0, 0, 64);
        let tail = sine_block(440.0, 0.5, 48_000.0, 32, 32);

        assert_eq!(&whole[32..], tail.as_slice());
    }
}
