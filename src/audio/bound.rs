use std::collections::HashSet;

use crate::page::ElementId;

/// Elements that have ever been captured as a source on this page. A host
/// runtime lets an element be captured once per page lifetime, so entries are
/// never removed.
#[derive(Debug, Default)]
pub struct BoundElementSet {
    elements: HashSet<ElementId>,
}

impl BoundElementSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, element: ElementId) -> bool {
        self.elements.contains(&element)
    }

    /// Returns false if the element was already recorded.
    pub fn insert(&mut self, element: ElementId) -> bool {
        self.elements.insert(element)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_sticky() {
        let mut bound = BoundElementSet::new();
        assert!(bound.is_empty());

        assert!(bound.insert(ElementId(1)));
        assert!(!bound.insert(ElementId(1)));
        assert!(bound.contains(ElementId(1)));
        assert!(!bound.contains(ElementId(2)));
        assert_eq!(bound.len(), 1);
    }
}
