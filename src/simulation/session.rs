//! Session: one simulation bound to one viewer
//!
//! The session owns the grid and the session RNG behind a single lock. Every
//! bubble gets two tasks: its actor loop and a listener that applies the
//! bubble's moves to the grid. Snapshots reach the transport through one
//! bounded queue drained by one forwarder task.
//!
//! Cancellation is cooperative. Each bubble observes its own `finished`
//! signal; every task also observes the session's `disconnected` signal.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::core::config::SimulationConfig;
use crate::core::error::{Result, SessionError};
use crate::core::types::Rarity;
use crate::entity::actor::{BubbleActor, BubbleMessage};
use crate::entity::bubble::{Bubble, BubbleHandle, BubbleSnapshot};
use crate::simulation::activity::Activity;
use crate::simulation::interaction;
use crate::simulation::snapshot::{Envelope, SessionInfo};
use crate::simulation::transport::Transport;
use crate::spatial::grid::Grid;
use crate::spatial::position::Position;

/// Buffer between a bubble and its listener. One slot keeps a bubble at most
/// one snapshot ahead of the grid.
const BUBBLE_OUTBOUND: usize = 1;

/// Payloads waiting for the transport
const FORWARD_QUEUE: usize = 256;

pub struct Session {
    shared: Arc<Shared>,
}

struct Shared {
    config: Arc<SimulationConfig>,
    seed: u64,
    state: Mutex<State>,
    total_bubbles: AtomicUsize,
    dropped: Arc<AtomicU64>,
    started: AtomicBool,
    disconnected: watch::Sender<bool>,
    transport: Arc<dyn Transport>,
    outbound: mpsc::Sender<Vec<u8>>,
    forward_rx: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    activity: Arc<Activity>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Everything guarded by the session lock
struct State {
    grid: Option<Grid>,
    rng: ChaCha8Rng,
}

impl Session {
    /// New session seeded from the configuration, or randomly if it has no seed
    pub fn new(
        config: Arc<SimulationConfig>,
        transport: impl Transport,
        activity: Arc<Activity>,
    ) -> Self {
        let seed = config.grid.seed.unwrap_or_else(rand::random);
        Self::with_seed(config, seed, transport, activity)
    }

    pub fn with_seed(
        config: Arc<SimulationConfig>,
        seed: u64,
        transport: impl Transport,
        activity: Arc<Activity>,
    ) -> Self {
        let (outbound, forward_rx) = mpsc::channel(FORWARD_QUEUE);
        let (disconnected, _) = watch::channel(false);
        let shared = Shared {
            config,
            seed,
            state: Mutex::new(State {
                grid: None,
                rng: ChaCha8Rng::seed_from_u64(seed),
            }),
            total_bubbles: AtomicUsize::new(0),
            dropped: Arc::new(AtomicU64::new(0)),
            started: AtomicBool::new(false),
            disconnected,
            transport: Arc::new(transport),
            outbound,
            forward_rx: Mutex::new(Some(forward_rx)),
            activity,
            tasks: Mutex::new(Vec::new()),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn seed(&self) -> u64 {
        self.shared.seed
    }

    pub fn info(&self) -> SessionInfo {
        self.shared.info()
    }

    /// Live bubbles, as tracked from spawns and closing snapshots
    pub fn total_bubbles(&self) -> usize {
        self.shared.total_bubbles.load(Ordering::SeqCst)
    }

    /// Snapshots the transport failed to deliver
    pub fn dropped_snapshots(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn is_disconnected(&self) -> bool {
        *self.shared.disconnected.borrow()
    }

    /// Grid occupancy per rarity. Empty once shut down.
    pub fn population(&self) -> BTreeMap<Rarity, usize> {
        self.inspect(Grid::count_by_rarity).unwrap_or_default()
    }

    /// Run `f` against the grid under the session lock.
    /// `None` before start and after shutdown.
    pub fn inspect<R>(&self, f: impl FnOnce(&Grid) -> R) -> Option<R> {
        self.shared.lock_state().grid.as_ref().map(f)
    }

    /// Send the handshake, then populate the grid and wake every bubble.
    pub async fn start(&self) -> Result<()> {
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return Err(SessionError::AlreadyStarted);
        }
        let forward_rx = self.shared.lock_forward_rx().take();
        if let Some(forward_rx) = forward_rx {
            let forwarder = tokio::spawn(forward(
                self.shared.transport.clone(),
                forward_rx,
                self.shared.disconnected.subscribe(),
                self.shared.dropped.clone(),
            ));
            self.shared.track([forwarder]);
        }

        let handshake = Envelope::handshake(self.shared.info()).encode()?;
        self.shared.transport.send(handshake).await?;

        let config = &self.shared.config;
        let mut state = self.shared.lock_state();
        if self.is_disconnected() {
            return Ok(());
        }
        let mut grid = Grid::new(config.grid.size);
        let side = i32::try_from(config.grid.size).unwrap_or(i32::MAX);
        for row in 0..side {
            for column in 0..side {
                if state.rng.gen::<f64>() < config.bubble.proba {
                    let pos = Position::new(row, column);
                    let bubble = self.shared.spawn_bubble(&mut state.rng, pos, None);
                    grid.insert(pos, bubble);
                }
            }
        }
        let population = grid.occupancy();
        state.grid = Some(grid);

        tracing::info!(
            seed = self.shared.seed,
            grid_size = config.grid.size,
            population,
            "session started"
        );
        Ok(())
    }

    /// Spawn a bubble into a tracked cell of a running session.
    ///
    /// Returns `None` when the session is not running or the cell is untracked.
    pub fn spawn_bubble(&self, at: Position, rarity: Option<Rarity>) -> Option<Arc<BubbleHandle>> {
        let mut state = self.shared.lock_state();
        let State { grid, rng } = &mut *state;
        let grid = grid.as_mut()?;
        if !grid.contains(at) {
            return None;
        }
        let bubble = self.shared.spawn_bubble(rng, at, rarity);
        grid.insert(at, bubble.clone());
        Some(bubble)
    }

    /// Terminate every bubble, release the grid and disconnect all listeners.
    ///
    /// Idempotent. No grid mutation happens after this returns.
    pub fn shutdown(&self) {
        let terminated = {
            let mut state = self.shared.lock_state();
            let drained = state.grid.take().map(|mut grid| grid.drain());
            let terminated = drained.map_or(0, |bubbles| {
                bubbles.iter().filter(|bubble| bubble.terminate()).count()
            });
            self.shared.disconnected.send_replace(true);
            terminated
        };
        self.shared.total_bubbles.store(0, Ordering::SeqCst);
        if terminated > 0 {
            tracing::info!(seed = self.shared.seed, terminated, "session shut down");
        }
    }

    /// Wait for every task this session spawned. Only returns after [`shutdown`](Self::shutdown).
    pub async fn join(&self) {
        loop {
            let handles = std::mem::take(&mut *self.shared.lock_tasks());
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "session task failed");
                }
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_forward_rx(&self) -> MutexGuard<'_, Option<mpsc::Receiver<Vec<u8>>>> {
        self.forward_rx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            seed: self.seed.to_string(),
            grid_size: self.config.grid.size,
            total_bubbles: self.total_bubbles.load(Ordering::SeqCst),
        }
    }

    fn track(&self, handles: impl IntoIterator<Item = JoinHandle<()>>) {
        let mut tasks = self.lock_tasks();
        tasks.retain(|task| !task.is_finished());
        tasks.extend(handles);
    }

    /// Build a bubble, wire its channels and start its actor and listener.
    ///
    /// Takes the session RNG explicitly: callers already hold the session lock.
    fn spawn_bubble(
        self: &Arc<Self>,
        rng: &mut ChaCha8Rng,
        at: Position,
        rarity: Option<Rarity>,
    ) -> Arc<BubbleHandle> {
        let (bubble, commands) = Bubble::new(&self.config, rng.gen(), at, rarity);
        let (tx, rx) = mpsc::channel(BUBBLE_OUTBOUND);
        let actor = BubbleActor::new(bubble, commands, tx, self.disconnected.subscribe());
        let handle = actor.handle().clone();

        self.total_bubbles.fetch_add(1, Ordering::SeqCst);
        let listener = tokio::spawn(Arc::clone(self).listen(rx));
        let runner = tokio::spawn(actor.wake_up());
        self.track([listener, runner]);

        tracing::debug!(bubble = %handle.id(), rarity = %handle.rarity(), pos = %at, "bubble spawned");
        handle
    }

    async fn listen(self: Arc<Self>, mut rx: mpsc::Receiver<BubbleMessage>) {
        let mut disconnected = self.disconnected.subscribe();
        loop {
            let message = tokio::select! {
                message = rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
                _ = disconnected.wait_for(|closed| *closed) => break,
            };
            self.on_bubble_message(message).await;
        }
    }

    async fn on_bubble_message(self: &Arc<Self>, message: BubbleMessage) {
        let BubbleMessage { snapshot, handle } = message;
        if snapshot.is_finish {
            let _ = self
                .total_bubbles
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)));
        }
        self.apply_move(&snapshot, &handle);
        self.forward_snapshot(snapshot).await;
        self.activity.touch();
    }

    /// Move a bubble between cells and resolve its arrival, atomically.
    fn apply_move(self: &Arc<Self>, snapshot: &BubbleSnapshot, handle: &Arc<BubbleHandle>) {
        if snapshot.is_finish || !snapshot.has_moved() {
            return;
        }

        let mut state = self.lock_state();
        let State { grid, rng } = &mut *state;
        let Some(grid) = grid.as_mut() else {
            return;
        };

        if let Some(cell) = grid.cell_mut(snapshot.previous) {
            cell.remove(handle.id());
        }
        // Terminated while this move was in flight
        if handle.is_finished() {
            return;
        }
        let Some(cell) = grid.cell_mut(snapshot.pos) else {
            return;
        };

        let mut spawner = |at: Position, rarity: Rarity| self.spawn_bubble(rng, at, Some(rarity));
        let resolution = interaction::resolve(handle, snapshot.pos, cell, &mut spawner);

        for victim in &resolution.terminated {
            if victim.terminate() {
                tracing::debug!(
                    bubble = %victim.id(),
                    rarity = %victim.rarity(),
                    by = %handle.id(),
                    pos = %snapshot.pos,
                    "bubble terminated"
                );
            }
        }
        if !resolution.spawned.is_empty() {
            tracing::debug!(pos = %snapshot.pos, converted = resolution.spawned.len(), "dark conversion");
        }
    }

    async fn forward_snapshot(&self, snapshot: BubbleSnapshot) {
        let payload = match Envelope::bubble(snapshot, self.info()).encode() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode snapshot");
                return;
            }
        };
        let mut disconnected = self.disconnected.subscribe();
        tokio::select! {
            sent = self.outbound.send(payload) => {
                if sent.is_err() {
                    tracing::trace!("forwarder gone, snapshot discarded");
                }
            }
            _ = disconnected.wait_for(|closed| *closed) => {}
        }
    }
}

/// Drain queued payloads into the transport. Failures are counted, never retried.
async fn forward(
    transport: Arc<dyn Transport>,
    mut rx: mpsc::Receiver<Vec<u8>>,
    mut disconnected: watch::Receiver<bool>,
    dropped: Arc<AtomicU64>,
) {
    loop {
        let payload = tokio::select! {
            payload = rx.recv() => match payload {
                Some(payload) => payload,
                None => break,
            },
            _ = disconnected.wait_for(|closed| *closed) => break,
        };
        let sent = tokio::select! {
            sent = transport.send(payload) => sent,
            _ = disconnected.wait_for(|closed| *closed) => break,
        };
        if let Err(e) = sent {
            dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(error = %e, "snapshot delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::transport::ChannelTransport;
    use std::time::Duration;
    use tokio::time::timeout;

    fn config(size: u32, proba: f64) -> Arc<SimulationConfig> {
        let mut config = SimulationConfig::default();
        config.grid.size = size;
        config.bubble.proba = proba;
        for rarity in [Rarity::Common, Rarity::Light, Rarity::Dark] {
            let tuning = config.bubbles.get_mut(rarity);
            tuning.min_speed = 2;
            tuning.max_speed = 6;
        }
        Arc::new(config)
    }

    #[tokio::test]
    async fn test_start_sends_handshake_first() {
        let (transport, mut rx) = ChannelTransport::new();
        let session = Session::with_seed(config(4, 0.5), 99, transport, Arc::new(Activity::new()));
        session.start().await.unwrap();

        let first: serde_json::Value = serde_json::from_slice(&rx.recv().await.unwrap()).unwrap();
        assert!(first["bubble"].is_null());
        assert_eq!(first["info"]["seed"], "99");
        assert_eq!(first["info"]["grid_size"], 4);

        session.shutdown();
        timeout(Duration::from_secs(2), session.join()).await.unwrap();
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let (transport, _rx) = ChannelTransport::new();
        let session = Session::with_seed(config(2, 0.0), 1, transport, Arc::new(Activity::new()));
        session.start().await.unwrap();
        assert!(matches!(session.start().await, Err(SessionError::AlreadyStarted)));
        session.shutdown();
        session.join().await;
    }

    #[tokio::test]
    async fn test_handshake_failure_aborts_start() {
        let (transport, rx) = ChannelTransport::new();
        drop(rx);
        let session = Session::with_seed(config(3, 1.0), 1, transport, Arc::new(Activity::new()));
        assert!(matches!(session.start().await, Err(SessionError::Transport(_))));
        assert_eq!(session.total_bubbles(), 0);
        assert!(session.inspect(|g| g.occupancy()).is_none());
        session.shutdown();
        session.join().await;
    }

    #[tokio::test]
    async fn test_full_probability_fills_every_cell() {
        let (transport, _rx) = ChannelTransport::new();
        let session = Session::with_seed(config(3, 1.0), 5, transport, Arc::new(Activity::new()));
        session.start().await.unwrap();
        assert_eq!(session.total_bubbles(), 9);
        session.shutdown();
        timeout(Duration::from_secs(2), session.join()).await.unwrap();
    }

    #[tokio::test]
    async fn test_same_seed_same_initial_population() {
        let populate = |seed| async move {
            let mut slow = (*config(6, 0.4)).clone();
            for rarity in [Rarity::Common, Rarity::Light, Rarity::Dark] {
                let tuning = slow.bubbles.get_mut(rarity);
                tuning.min_speed = 60_000;
                tuning.max_speed = 60_001;
            }
            let (transport, _rx) = ChannelTransport::new();
            let session =
                Session::with_seed(Arc::new(slow), seed, transport, Arc::new(Activity::new()));
            session.start().await.unwrap();
            let layout = session
                .inspect(|grid| {
                    let mut cells: Vec<_> = grid
                        .iter()
                        .filter(|(_, cell)| !cell.is_empty())
                        .map(|(key, cell)| (key.clone(), cell.iter().next().map(|b| b.rarity())))
                        .collect();
                    cells.sort();
                    cells
                })
                .unwrap();
            session.shutdown();
            session.join().await;
            layout
        };
        assert_eq!(populate(77).await, populate(77).await);
    }

    #[tokio::test]
    async fn test_spawn_bubble_rejects_untracked_cell() {
        let (transport, _rx) = ChannelTransport::new();
        let session = Session::with_seed(config(2, 0.0), 1, transport, Arc::new(Activity::new()));
        assert!(session.spawn_bubble(Position::new(0, 0), None).is_none());
        session.start().await.unwrap();
        assert!(session.spawn_bubble(Position::new(5, 5), None).is_none());
        let bubble = session.spawn_bubble(Position::new(1, 1), Some(Rarity::Light)).unwrap();
        assert_eq!(bubble.rarity(), Rarity::Light);
        assert_eq!(session.total_bubbles(), 1);
        session.shutdown();
        timeout(Duration::from_secs(2), session.join()).await.unwrap();
        assert!(bubble.is_finished());
    }
}
