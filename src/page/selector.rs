use log::{debug, info, warn};
use std::collections::HashSet;

use crate::audio::bound::BoundElementSet;
use crate::audio::host::AudioBackend;
use crate::audio::session::AudioGraphSession;
use crate::effects::EffectSettings;
use crate::page::{Document, ElementId, MediaElementInfo, MutationRecord, PLAYABILITY_ATTRIBUTES, PageEvent};

/// What the page must tell the store after a selector step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionNotice {
    Ready(ElementId),
    Removed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reaction {
    pub notices: Vec<SessionNotice>,
    /// Run another selection pass after the reselect delay.
    pub schedule_reselect: bool,
}

impl Reaction {
    fn removed(&mut self) {
        if !self.notices.contains(&SessionNotice::Removed) {
            self.notices.push(SessionNotice::Removed);
        }
    }

    fn merge(&mut self, other: Self) {
        for notice in other.notices {
            match notice {
                SessionNotice::Removed => self.removed(),
                ready => self.notices.push(ready),
            }
        }
        self.schedule_reselect |= other.schedule_reselect;
    }
}

/// First element with metadata that is playing, else the first with metadata.
pub fn pick_candidate(elements: &[MediaElementInfo]) -> Option<&MediaElementInfo> {
    elements
        .iter()
        .find(|e| e.has_metadata() && e.is_playing())
        .or_else(|| elements.iter().find(|e| e.has_metadata()))
}

/// Decides which media element owns the page's processing graph.
pub struct ElementSelector<B: AudioBackend> {
    backend: B,
    bound: BoundElementSet,
    refused: HashSet<ElementId>,
    session: Option<AudioGraphSession<B::Context>>,
    seed: EffectSettings,
    enabled: bool,
    fft_size: usize,
}

impl<B: AudioBackend> ElementSelector<B> {
    pub fn new(backend: B, fft_size: usize) -> Self {
        Self {
            backend,
            bound: BoundElementSet::new(),
            refused: HashSet::new(),
            session: None,
            seed: EffectSettings::default(),
            enabled: true,
            fft_size,
        }
    }

    pub const fn backend(&self) -> &B {
        &self.backend
    }

    pub const fn bound(&self) -> &BoundElementSet {
        &self.bound
    }

    /// Settings and enablement handed to the next graph that gets built.
    pub fn set_seed(&mut self, settings: Option<EffectSettings>, enabled: bool) {
        if let Some(settings) = settings {
            self.seed = settings;
        }
        self.enabled = enabled;
    }

    pub const fn seed(&self) -> (&EffectSettings, bool) {
        (&self.seed, self.enabled)
    }

    pub fn session(&self) -> Option<&AudioGraphSession<B::Context>> {
        self.session.as_ref().filter(|s| s.state().is_live())
    }

    pub fn live_session_mut(&mut self) -> Option<&mut AudioGraphSession<B::Context>> {
        self.session.as_mut().filter(|s| s.state().is_live())
    }

    /// Element currently bound by a live graph.
    pub fn bound_element(&self) -> Option<ElementId> {
        self.session().and_then(AudioGraphSession::element)
    }

    pub async fn handle_event<D: Document>(&mut self, doc: &D, event: PageEvent) -> Reaction {
        match event {
            PageEvent::Loaded => self.reselect(doc).await,
            PageEvent::Mutations(records) => self.handle_mutations(doc, records).await,
            PageEvent::Play(element) => {
                if self.bound_element() == Some(element) {
                    if let Some(session) = self.live_session_mut()
                        && let Err(e) = session.resume_if_suspended().await
                    {
                        warn!("Could not resume context for {element}: {e}");
                    }
                    Reaction::default()
                } else {
                    debug!("play on {element}, re-evaluating");
                    self.reselect(doc).await
                }
            }
            PageEvent::Terminated { element, kind } => {
                if self.bound_element() == Some(element) {
                    info!("Bound element {element} fired {kind}");
                    self.terminate().await
                } else {
                    Reaction::default()
                }
            }
        }
    }

    async fn handle_mutations<D: Document>(
        &mut self,
        doc: &D,
        records: Vec<MutationRecord>,
    ) -> Reaction {
        let mut reaction = Reaction::default();
        let mut relevant = false;

        for record in records {
            match record {
                MutationRecord::ChildList { added, removed } => {
                    relevant |= added.iter().any(|node| !node.media.is_empty());

                    for node in removed {
                        if node.media.is_empty() {
                            continue;
                        }
                        relevant = true;
                        if let Some(bound) = self.bound_element()
                            && node.media.contains(&bound)
                        {
                            info!("Bound element {bound} removed from the document");
                            reaction.merge(self.terminate().await);
                        }
                    }
                }
                MutationRecord::Attributes { target, attribute } => {
                    if target.is_some() && PLAYABILITY_ATTRIBUTES.contains(&attribute.as_str()) {
                        relevant = true;
                    }
                }
            }
        }

        if relevant {
            reaction.merge(self.reselect(doc).await);
        }
        reaction
    }

    /// One selection pass over the document.
    pub async fn reselect<D: Document>(&mut self, doc: &D) -> Reaction {
        let elements = doc.media_elements();
        let candidate = pick_candidate(&elements).map(|e| (e.id, e.attached));

        let Some((element, attached)) = candidate else {
            let mut reaction = Reaction::default();
            if self.session().is_some() {
                debug!("No media element left to process");
                self.teardown(&mut reaction).await;
            }
            return reaction;
        };

        if !attached {
            debug!("Candidate {element} is detached, skipping");
            if self.bound_element() == Some(element) {
                return self.terminate().await;
            }
            return Reaction::default();
        }

        if self.bound_element() == Some(element) {
            return Reaction::default();
        }

        let mut reaction = Reaction::default();
        self.teardown(&mut reaction).await;

        if self.bound.contains(element) || self.refused.contains(&element) {
            if self.refused.insert(element) {
                warn!("Element {element} was bound before and cannot be captured again");
                reaction.removed();
            }
            return reaction;
        }

        let mut session = AudioGraphSession::new(self.fft_size);
        match session
            .init(&self.backend, &mut self.bound, element, &self.seed, self.enabled)
            .await
        {
            Ok(()) => {
                self.session = Some(session);
                reaction.notices.push(SessionNotice::Ready(element));
            }
            Err(e) => {
                warn!("Failed to build graph for {element}: {e}");
                self.refused.insert(element);
                reaction.removed();
            }
        }

        reaction
    }

    // terminate tears the bound graph down and asks for a deferred reselect.
    async fn terminate(&mut self) -> Reaction {
        let mut reaction = Reaction::default();
        self.teardown(&mut reaction).await;
        reaction.schedule_reselect = true;
        reaction
    }

    async fn teardown(&mut self, reaction: &mut Reaction) {
        if let Some(mut session) = self.session.take() {
            let was_live = session.state().is_live();
            session.disconnect().await;
            if was_live {
                reaction.removed();
            }
        }
    }

    /// Drop the graph for good, e.g. when the page unloads.
    pub async fn release(&mut self) -> Reaction {
        let mut reaction = Reaction::default();
        self.teardown(&mut reaction).await;
        reaction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{MediaKind, ReadyState};

    fn element(id: u64, ready_state: ReadyState, paused: bool) -> MediaElementInfo {
        MediaElementInfo {
            id: ElementId(id),
            kind: MediaKind::Video,
            ready_state,
            paused,
            attached: true,
        }
    }

    #[test]
    fn prefers_playing_element_with_metadata() {
        let elements = vec![
            element(1, ReadyState::HaveEnoughData, true),
            element(2, ReadyState::HaveNothing, false),
            element(3, ReadyState::HaveMetadata, false),
        ];

        assert_eq!(pick_candidate(&elements).map(|e| e.id), Some(ElementId(3)));
    }

    #[test]
    fn falls_back_to_first_loaded_element() {
        let elements = vec![
            element(1, ReadyState::HaveNothing, false),
            element(2, ReadyState::HaveCurrentData, true),
            element(3, ReadyState::HaveMetadata, true),
        ];

        assert_eq!(pick_candidate(&elements).map(|e| e.id), Some(ElementId(2)));
    }

    #[test]
    fn nothing_loaded_means_no_candidate() {
        let elements = vec![element(1, ReadyState::HaveNothing, false)];

        assert!(pick_candidate(&elements).is_none());
        assert!(pick_candidate(&[]).is_none());
    }

    #[test]
    fn reaction_reports_removal_once() {
        let mut reaction = Reaction::default();
        reaction.removed();
        reaction.merge(Reaction {
            notices: vec![SessionNotice::Removed, SessionNotice::Ready(ElementId(4))],
            schedule_reselect: true,
        });

        assert_eq!(
            reaction.notices,
            vec![SessionNotice::Removed, SessionNotice::Ready(ElementId(4))]
        );
        assert!(reaction.schedule_reselect);
    }
}
