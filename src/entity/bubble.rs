//! Bubble state and the handle shared with the session
//!
//! A bubble is split in two:
//! - [`Bubble`] holds the movement state. Only the bubble's own actor touches it.
//! - [`BubbleHandle`] holds what the session and the interaction resolver may
//!   observe or change concurrently: identity, rarity, invisibility and the
//!   `finished` signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::core::config::SimulationConfig;
use crate::core::types::{BubbleId, Rarity};
use crate::spatial::position::Position;

/// Inbound capacity of a bubble's command channel
const COMMAND_BUFFER: usize = 8;

/// Control message addressed to a bubble.
///
/// Bubbles currently drain and discard these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BubbleCommand {
    Ping,
}

/// Shared, concurrently observable part of a bubble
#[derive(Debug)]
pub struct BubbleHandle {
    id: BubbleId,
    rarity: Rarity,
    invisible: AtomicBool,
    finished: watch::Sender<bool>,
    commands: mpsc::Sender<BubbleCommand>,
}

impl BubbleHandle {
    /// Create a handle and the receiving end of its command channel.
    ///
    /// New bubbles start invisible and unfinished.
    pub fn new(id: BubbleId, rarity: Rarity) -> (Arc<Self>, mpsc::Receiver<BubbleCommand>) {
        let (finished, _) = watch::channel(false);
        let (commands, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = Arc::new(Self {
            id,
            rarity,
            invisible: AtomicBool::new(true),
            finished,
            commands,
        });
        (handle, commands_rx)
    }

    pub fn id(&self) -> BubbleId {
        self.id
    }

    pub fn rarity(&self) -> Rarity {
        self.rarity
    }

    pub fn is_dark(&self) -> bool {
        self.rarity == Rarity::Dark
    }

    pub fn is_light(&self) -> bool {
        self.rarity == Rarity::Light
    }

    pub fn is_invisible(&self) -> bool {
        self.invisible.load(Ordering::Acquire)
    }

    /// End the invisibility grace period
    pub fn reveal(&self) {
        self.invisible.store(false, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        *self.finished.borrow()
    }

    /// Visible and not finished: the only state that takes part in interactions
    pub fn is_active(&self) -> bool {
        !self.is_invisible() && !self.is_finished()
    }

    /// Mark the bubble finished and wake its actor.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn terminate(&self) -> bool {
        self.finished.send_if_modified(|finished| {
            if *finished {
                false
            } else {
                *finished = true;
                true
            }
        })
    }

    /// Receiver that resolves once the bubble is finished
    pub fn finished_signal(&self) -> watch::Receiver<bool> {
        self.finished.subscribe()
    }

    /// Queue a control message for the bubble
    pub fn message(
        &self,
        command: BubbleCommand,
    ) -> Result<(), mpsc::error::TrySendError<BubbleCommand>> {
        self.commands.try_send(command)
    }
}

/// Point-in-time view of a bubble, as emitted by its actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BubbleSnapshot {
    pub id: BubbleId,
    pub pos: Position,
    #[serde(skip)]
    pub previous: Position,
    pub rarity: Rarity,
    pub is_finish: bool,
    pub is_invisible: bool,
}

impl BubbleSnapshot {
    pub fn has_moved(&self) -> bool {
        !self.pos.is_same(&self.previous)
    }
}

/// Movement state of a single bubble
#[derive(Debug)]
pub struct Bubble {
    handle: Arc<BubbleHandle>,
    position: Position,
    previous: Position,
    target: Position,
    speed: u64,
    allow_diagonal: bool,
    grid_size: i32,
    rng: ChaCha8Rng,
}

impl Bubble {
    /// Build a bubble at `start` from its own seed.
    ///
    /// Rarity is forced when given, otherwise drawn from the population pool.
    /// Speed and diagonal permission follow the rarity's tuning.
    pub fn new(
        config: &SimulationConfig,
        seed: u64,
        start: Position,
        rarity: Option<Rarity>,
    ) -> (Self, mpsc::Receiver<BubbleCommand>) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let rarity = rarity.unwrap_or_else(|| draw_rarity(config, &mut rng));

        let tuning = config.bubbles.get(rarity);
        let speeds = tuning.speed_range();
        let speed = if speeds.is_empty() {
            tuning.min_speed
        } else {
            rng.gen_range(speeds)
        };

        let (handle, commands) = BubbleHandle::new(BubbleId::new(), rarity);
        let bubble = Self {
            handle,
            position: start,
            previous: start,
            target: start,
            speed,
            allow_diagonal: tuning.diagonal,
            grid_size: i32::try_from(config.grid.size).unwrap_or(i32::MAX),
            rng,
        };
        (bubble, commands)
    }

    pub fn handle(&self) -> &Arc<BubbleHandle> {
        &self.handle
    }

    pub fn id(&self) -> BubbleId {
        self.handle.id()
    }

    pub fn rarity(&self) -> Rarity {
        self.handle.rarity()
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn previous_position(&self) -> Position {
        self.previous
    }

    pub fn target(&self) -> Position {
        self.target
    }

    /// Tick period in milliseconds; lower is faster
    pub fn speed(&self) -> u64 {
        self.speed
    }

    pub fn allows_diagonal(&self) -> bool {
        self.allow_diagonal
    }

    /// Advance one grid step, re-rolling the target once it has been reached
    pub fn step(&mut self) {
        if self.position.is_same(&self.target) {
            self.retarget();
        }
        self.previous = self.position;
        self.position.move_toward(self.target, self.allow_diagonal);
    }

    /// Pick a new target uniformly within grid bounds
    pub fn retarget(&mut self) {
        let size = self.grid_size.max(1);
        self.target = Position::new(self.rng.gen_range(0..size), self.rng.gen_range(0..size));
    }

    /// Capture the current state. `closing` marks the final snapshot.
    pub fn snapshot(&self, closing: bool) -> BubbleSnapshot {
        BubbleSnapshot {
            id: self.id(),
            pos: self.position,
            previous: self.previous,
            rarity: self.rarity(),
            is_finish: closing,
            is_invisible: self.handle.is_invisible(),
        }
    }
}

fn draw_rarity(config: &SimulationConfig, rng: &mut ChaCha8Rng) -> Rarity {
    let pool = config.pool_range();
    if pool.is_empty() {
        return Rarity::Common;
    }
    config.rarity_for_draw(rng.gen_range(pool))
}
