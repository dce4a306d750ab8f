//! Interaction resolution when a bubble arrives at a cell
//!
//! Rules, in precedence order:
//! 1. Empty cell: the arriving bubble settles in, nothing happens.
//! 2. Dark arrives: a light occupant destroys it. Otherwise every non-dark
//!    occupant is converted: it is terminated and a fresh dark bubble spawns in
//!    its place. The arriving dark settles in.
//! 3. Light arrives: every dark occupant is terminated. The light settles in.
//! 4. Common arrives: a dark occupant destroys it, otherwise it settles in.
//!
//! Invisible and finished occupants never take part.

use std::sync::Arc;

use crate::core::types::Rarity;
use crate::entity::bubble::BubbleHandle;
use crate::entity::collection::Bubbles;
use crate::spatial::position::Position;

/// Creates bubbles on behalf of the resolver
pub trait Spawner {
    fn spawn(&mut self, at: Position, rarity: Rarity) -> Arc<BubbleHandle>;
}

impl<F> Spawner for F
where
    F: FnMut(Position, Rarity) -> Arc<BubbleHandle>,
{
    fn spawn(&mut self, at: Position, rarity: Rarity) -> Arc<BubbleHandle> {
        self(at, rarity)
    }
}

/// Outcome of one arrival
#[derive(Debug, Default)]
pub struct Resolution {
    /// Bubbles the caller must terminate
    pub terminated: Vec<Arc<BubbleHandle>>,
    /// Bubbles spawned into the destination
    pub spawned: Vec<Arc<BubbleHandle>>,
    /// Whether the arriving bubble now occupies the destination
    pub settled: bool,
}

impl Resolution {
    fn settled() -> Self {
        Self {
            settled: true,
            ..Self::default()
        }
    }

    fn rejected(arriving: &Arc<BubbleHandle>) -> Self {
        Self {
            terminated: vec![arriving.clone()],
            ..Self::default()
        }
    }
}

/// Resolve `arriving` entering `destination` at `at`.
///
/// Terminated occupants are removed from `destination` and spawned bubbles are
/// added to it. No bubble state is touched: applying the terminations is the
/// caller's job.
pub fn resolve(
    arriving: &Arc<BubbleHandle>,
    at: Position,
    destination: &mut Bubbles,
    spawner: &mut impl Spawner,
) -> Resolution {
    if destination.is_empty() {
        destination.add(arriving.clone());
        return Resolution::settled();
    }

    match arriving.rarity() {
        Rarity::Dark => {
            if destination.has_active_rarity(Rarity::Light) {
                return Resolution::rejected(arriving);
            }
            let mut resolution = Resolution::settled();
            let victims = take_active(destination, |b| !b.is_dark());
            for victim in victims {
                let convert = spawner.spawn(at, Rarity::Dark);
                destination.add(convert.clone());
                resolution.spawned.push(convert);
                resolution.terminated.push(victim);
            }
            destination.add(arriving.clone());
            resolution
        }
        Rarity::Light => {
            let mut resolution = Resolution::settled();
            resolution.terminated = take_active(destination, |b| b.is_dark());
            destination.add(arriving.clone());
            resolution
        }
        Rarity::Common => {
            if destination.has_active_rarity(Rarity::Dark) {
                return Resolution::rejected(arriving);
            }
            destination.add(arriving.clone());
            Resolution::settled()
        }
    }
}

/// Remove and return the active members matching `pred`
fn take_active(
    destination: &mut Bubbles,
    pred: impl Fn(&BubbleHandle) -> bool,
) -> Vec<Arc<BubbleHandle>> {
    let victims: Vec<_> = destination
        .iter()
        .filter(|b| b.is_active() && pred(b))
        .cloned()
        .collect();
    for victim in &victims {
        destination.remove(victim.id());
    }
    victims
}
