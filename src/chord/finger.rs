use crate::chord::id::{in_open_interval, Identifier, IdentifierSpace};
use crate::chord::types::NodeDescriptor;

/// One routing entry: `node` is believed to own `[start, interval_end)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FingerEntry {
    pub start: Identifier,
    pub interval_end: Identifier,
    pub node: NodeDescriptor,
}

/// The m-entry finger table of a single node.
///
/// Indices are 1-based as in the Chord paper; entry 1 is the node's successor.
/// Entries are refreshed independently, nothing ties one entry to another.
#[derive(Clone, Debug)]
pub struct FingerTable {
    local: NodeDescriptor,
    entries: Vec<FingerEntry>,
}

impl FingerTable {
    /// Every entry starts out pointing at the local node, the view of a singleton ring.
    pub fn new(space: &IdentifierSpace, local: NodeDescriptor) -> Self {
        let entries = (1..=space.bits() as usize)
            .map(|i| FingerEntry {
                start: space.finger_start(&local.id, i),
                interval_end: space.finger_end(&local.id, i),
                node: local.clone(),
            })
            .collect();
        Self { local, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[FingerEntry] {
        &self.entries
    }

    pub fn entry(&self, i: usize) -> Option<&FingerEntry> {
        i.checked_sub(1).and_then(|idx| self.entries.get(idx))
    }

    pub fn start(&self, i: usize) -> Option<Identifier> {
        self.entry(i).map(|e| e.start)
    }

    pub fn successor(&self) -> &NodeDescriptor {
        &self.entries[0].node
    }

    pub fn set_successor(&mut self, node: NodeDescriptor) {
        self.entries[0].node = node;
    }

    /// Overwrites entry `i`. Returns false for an index outside `1..=m`.
    pub fn set(&mut self, i: usize, node: NodeDescriptor) -> bool {
        match i.checked_sub(1).and_then(|idx| self.entries.get_mut(idx)) {
            Some(entry) => {
                entry.node = node;
                true
            }
            None => false,
        }
    }

    /// The furthest finger strictly inside `(local, id)`.
    ///
    /// Falls back to the successor when no finger qualifies, so a lookup always
    /// has somewhere to go next.
    pub fn closest_preceding_finger(&self, id: &Identifier) -> NodeDescriptor {
        self.entries
            .iter()
            .rev()
            .map(|entry| &entry.node)
            .find(|node| in_open_interval(&node.id, &self.local.id, id))
            .unwrap_or_else(|| self.successor())
            .clone()
    }

    /// Replaces entry `i` with `candidate` if it owns the finger's start more
    /// tightly than the current entry, i.e. it lies in `[start, current)`.
    ///
    /// The paper states the bound as `(local, current)`; requiring `start` as the
    /// lower bound keeps a candidate that precedes the start from stealing the entry.
    pub fn update_if_closer(&mut self, candidate: &NodeDescriptor, i: usize) -> bool {
        let local = self.local.id;
        let entry = match i.checked_sub(1).and_then(|idx| self.entries.get_mut(idx)) {
            Some(entry) => entry,
            None => return false,
        };
        if candidate.id == local || entry.node.id == entry.start {
            return false;
        }
        let closer = candidate.id == entry.start
            || in_open_interval(&candidate.id, &entry.start, &entry.node.id);
        if closer && in_open_interval(&candidate.id, &local, &entry.node.id) {
            entry.node = candidate.clone();
            return true;
        }
        false
    }
}
