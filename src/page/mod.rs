use serde::{Deserialize, Serialize};
use std::fmt;

pub mod selector;

/// Identity of a media element for the lifetime of its page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

/// Mirrors `HTMLMediaElement.readyState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaElementInfo {
    pub id: ElementId,
    pub kind: MediaKind,
    pub ready_state: ReadyState,
    pub paused: bool,
    pub attached: bool,
}

impl MediaElementInfo {
    pub fn has_metadata(&self) -> bool {
        self.ready_state >= ReadyState::HaveMetadata
    }

    pub fn is_playing(&self) -> bool {
        !self.paused
    }
}

/// The page document as seen by the selector.
pub trait Document: Send + Sync {
    /// Every audio and video element known to the page, in document order.
    fn media_elements(&self) -> Vec<MediaElementInfo>;
}

/// A node added to or removed from the document, with the media elements it
/// is or contains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeInfo {
    pub media: Vec<ElementId>,
}

impl NodeInfo {
    pub fn media(id: ElementId) -> Self {
        Self { media: vec![id] }
    }

    pub fn plain() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRecord {
    ChildList {
        added: Vec<NodeInfo>,
        removed: Vec<NodeInfo>,
    },
    /// `target` is set when the mutated node is a media element.
    Attributes {
        target: Option<ElementId>,
        attribute: String,
    },
}

/// Attribute changes that can alter which element should be picked.
pub const PLAYABILITY_ATTRIBUTES: [&str; 4] = ["src", "autoplay", "controls", "paused"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationKind {
    Emptied,
    Error,
    Abort,
}

impl fmt::Display for TerminationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationKind::Emptied => write!(f, "emptied"),
            TerminationKind::Error => write!(f, "error"),
            TerminationKind::Abort => write!(f, "abort"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    Loaded,
    Mutations(Vec<MutationRecord>),
    /// Capture-phase `play` on a media element.
    Play(ElementId),
    Terminated {
        element: ElementId,
        kind: TerminationKind,
    },
}
