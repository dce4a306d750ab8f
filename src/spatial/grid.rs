//! Spatial index: cell key to the bubbles occupying that cell

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::AHashMap;

use crate::core::types::Rarity;
use crate::entity::bubble::BubbleHandle;
use crate::entity::collection::Bubbles;
use crate::spatial::position::Position;

/// Square grid of tracked cells.
///
/// A cell that is tracked but holds nobody is distinct from a cell that is not
/// tracked at all; lookups on untracked cells return `None`.
#[derive(Debug, Default)]
pub struct Grid {
    size: u32,
    cells: AHashMap<String, Bubbles>,
}

impl Grid {
    /// Grid with every cell of a `size` x `size` square tracked and empty
    pub fn new(size: u32) -> Self {
        let side = i32::try_from(size).unwrap_or(i32::MAX);
        let mut cells = AHashMap::with_capacity((size as usize).saturating_mul(size as usize));
        for row in 0..side {
            for column in 0..side {
                cells.insert(Position::new(row, column).to_key(), Bubbles::new());
            }
        }
        Self { size, cells }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.cells.contains_key(&pos.to_key())
    }

    pub fn cell(&self, pos: Position) -> Option<&Bubbles> {
        self.cells.get(&pos.to_key())
    }

    pub fn cell_mut(&mut self, pos: Position) -> Option<&mut Bubbles> {
        self.cells.get_mut(&pos.to_key())
    }

    /// Add a bubble to a tracked cell. Returns false if the cell is untracked.
    pub fn insert(&mut self, pos: Position, bubble: Arc<BubbleHandle>) -> bool {
        match self.cell_mut(pos) {
            Some(cell) => {
                cell.add(bubble);
                true
            }
            None => false,
        }
    }

    /// Total occupancy across all cells
    pub fn occupancy(&self) -> usize {
        self.cells.values().map(Bubbles::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Bubbles)> {
        self.cells.iter()
    }

    pub fn bubbles(&self) -> impl Iterator<Item = &Arc<BubbleHandle>> {
        self.cells.values().flat_map(|cell| cell.iter())
    }

    pub fn count_by_rarity(&self) -> BTreeMap<Rarity, usize> {
        let mut counts = BTreeMap::new();
        for cell in self.cells.values() {
            for (rarity, n) in cell.count_by_rarity() {
                *counts.entry(rarity).or_insert(0) += n;
            }
        }
        counts
    }

    /// Empty every cell, handing back all occupants
    pub fn drain(&mut self) -> Vec<Arc<BubbleHandle>> {
        let mut all = Vec::with_capacity(self.occupancy());
        for cell in self.cells.values_mut() {
            all.extend(cell.drain());
        }
        self.cells.clear();
        all
    }
}
