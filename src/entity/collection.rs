//! Ordered group of bubbles sharing one grid cell

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::types::{BubbleId, Rarity};
use crate::entity::bubble::BubbleHandle;

/// Bubbles occupying a single cell, in arrival order.
///
/// An empty collection is a valid state; every operation is well defined on it.
#[derive(Debug, Clone, Default)]
pub struct Bubbles {
    members: Vec<Arc<BubbleHandle>>,
}

impl Bubbles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, bubble: Arc<BubbleHandle>) {
        self.members.push(bubble);
    }

    /// Remove by id. Returns whether anything was removed.
    pub fn remove(&mut self, id: BubbleId) -> bool {
        let before = self.members.len();
        self.members.retain(|b| b.id() != id);
        self.members.len() != before
    }

    pub fn contains(&self, id: BubbleId) -> bool {
        self.members.iter().any(|b| b.id() == id)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<BubbleHandle>> {
        self.members.iter()
    }

    pub fn has_rarity(&self, rarity: Rarity) -> bool {
        self.members.iter().any(|b| b.rarity() == rarity)
    }

    /// Like [`has_rarity`](Self::has_rarity), ignoring invisible and finished members
    pub fn has_active_rarity(&self, rarity: Rarity) -> bool {
        self.members
            .iter()
            .any(|b| b.rarity() == rarity && b.is_active())
    }

    pub fn count_by_rarity(&self) -> BTreeMap<Rarity, usize> {
        let mut counts = BTreeMap::new();
        for bubble in &self.members {
            *counts.entry(bubble.rarity()).or_insert(0) += 1;
        }
        counts
    }

    /// Drop every member, handing them back
    pub fn drain(&mut self) -> Vec<Arc<BubbleHandle>> {
        std::mem::take(&mut self.members)
    }
}

impl<'a> IntoIterator for &'a Bubbles {
    type Item = &'a Arc<BubbleHandle>;
    type IntoIter = std::slice::Iter<'a, Arc<BubbleHandle>>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter()
    }
}

impl FromIterator<Arc<BubbleHandle>> for Bubbles {
    fn from_iter<I: IntoIterator<Item = Arc<BubbleHandle>>>(iter: I) -> Self {
        Self {
            members: iter.into_iter().collect(),
        }
    }
}
