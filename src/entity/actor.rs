//! Per-bubble actor loop
//!
//! Each bubble runs as its own task: emit a snapshot, sleep for its speed,
//! step toward its target, repeat until finished. Every await is raced against
//! a cancellation signal so a bubble can never outlive its session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::entity::bubble::{Bubble, BubbleCommand, BubbleHandle, BubbleSnapshot};

/// Outbound message from a bubble to its session listener
#[derive(Debug, Clone)]
pub struct BubbleMessage {
    pub snapshot: BubbleSnapshot,
    pub handle: Arc<BubbleHandle>,
}

pub struct BubbleActor {
    bubble: Bubble,
    commands: mpsc::Receiver<BubbleCommand>,
    outbound: mpsc::Sender<BubbleMessage>,
    session_closed: watch::Receiver<bool>,
}

impl BubbleActor {
    pub fn new(
        bubble: Bubble,
        commands: mpsc::Receiver<BubbleCommand>,
        outbound: mpsc::Sender<BubbleMessage>,
        session_closed: watch::Receiver<bool>,
    ) -> Self {
        Self {
            bubble,
            commands,
            outbound,
            session_closed,
        }
    }

    pub fn handle(&self) -> &Arc<BubbleHandle> {
        self.bubble.handle()
    }

    /// Run the bubble until it is finished, then emit its closing snapshot.
    pub async fn wake_up(self) {
        let Self {
            mut bubble,
            commands,
            outbound,
            mut session_closed,
        } = self;
        let handle = bubble.handle().clone();

        tokio::join!(
            drain_commands(commands, handle.finished_signal()),
            run_ticks(&mut bubble, &outbound, session_closed.clone())
        );

        let closing = bubble.snapshot(true);
        if !emit(&outbound, &handle, closing, &mut session_closed).await {
            tracing::trace!(bubble = %handle.id(), "closing snapshot not delivered");
        }
        tracing::debug!(bubble = %handle.id(), rarity = %handle.rarity(), "bubble finished");
    }
}

async fn run_ticks(
    bubble: &mut Bubble,
    outbound: &mpsc::Sender<BubbleMessage>,
    mut session_closed: watch::Receiver<bool>,
) {
    let handle = bubble.handle().clone();
    let mut finished = handle.finished_signal();

    while !handle.is_finished() {
        if !emit(outbound, &handle, bubble.snapshot(false), &mut session_closed).await {
            // Nobody is listening any more
            handle.terminate();
            break;
        }

        let period = Duration::from_millis(bubble.speed());
        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = finished.wait_for(|done| *done) => break,
        }

        bubble.step();
        handle.reveal();
    }
}

/// Inbound sink. Commands are accepted and dropped until the bubble finishes.
async fn drain_commands(
    mut commands: mpsc::Receiver<BubbleCommand>,
    mut finished: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => tracing::trace!(?command, "bubble command ignored"),
                None => break,
            },
            _ = finished.wait_for(|done| *done) => break,
        }
    }
    commands.close();
}

/// Send a snapshot, giving up if the session closes first.
async fn emit(
    outbound: &mpsc::Sender<BubbleMessage>,
    handle: &Arc<BubbleHandle>,
    snapshot: BubbleSnapshot,
    session_closed: &mut watch::Receiver<bool>,
) -> bool {
    let message = BubbleMessage {
        snapshot,
        handle: handle.clone(),
    };
    tokio::select! {
        sent = outbound.send(message) => sent.is_ok(),
        _ = session_closed.wait_for(|closed| *closed) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SimulationConfig;
    use crate::core::types::Rarity;
    use crate::entity::bubble::BubbleCommand;
    use crate::spatial::position::Position;
    use tokio::time::timeout;

    fn fast_config() -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.grid.size = 8;
        for rarity in [Rarity::Common, Rarity::Light, Rarity::Dark] {
            let tuning = config.bubbles.get_mut(rarity);
            tuning.min_speed = 1;
            tuning.max_speed = 3;
        }
        config
    }

    fn spawn_actor(
        seed: u64,
    ) -> (
        Arc<BubbleHandle>,
        mpsc::Receiver<BubbleMessage>,
        watch::Sender<bool>,
        tokio::task::JoinHandle<()>,
    ) {
        let (bubble, commands) = Bubble::new(&fast_config(), seed, Position::new(4, 4), None);
        let (tx, rx) = mpsc::channel(1);
        let (closed_tx, closed_rx) = watch::channel(false);
        let actor = BubbleActor::new(bubble, commands, tx, closed_rx);
        let handle = actor.handle().clone();
        let task = tokio::spawn(actor.wake_up());
        (handle, rx, closed_tx, task)
    }

    #[tokio::test]
    async fn test_first_snapshot_is_invisible_then_visible() {
        let (handle, mut rx, _closed, task) = spawn_actor(1);

        let first = rx.recv().await.unwrap();
        assert!(first.snapshot.is_invisible);
        assert!(!first.snapshot.has_moved());

        let second = rx.recv().await.unwrap();
        assert!(!second.snapshot.is_invisible);
        assert!(!handle.is_invisible());

        handle.terminate();
        while rx.recv().await.is_some() {}
        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_terminate_emits_exactly_one_closing_snapshot() {
        let (handle, mut rx, _closed, task) = spawn_actor(2);
        for _ in 0..3 {
            let msg = rx.recv().await.unwrap();
            assert!(!msg.snapshot.is_finish);
        }
        handle.terminate();

        let mut closing = 0;
        while let Some(msg) = timeout(Duration::from_secs(1), rx.recv()).await.unwrap() {
            if msg.snapshot.is_finish {
                closing += 1;
            } else {
                assert_eq!(closing, 0, "snapshot after closing snapshot");
            }
        }
        assert_eq!(closing, 1);
        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_snapshots_move_one_step() {
        let (handle, mut rx, _closed, task) = spawn_actor(3);
        let mut last = rx.recv().await.unwrap().snapshot.pos;
        for _ in 0..20 {
            let snap = rx.recv().await.unwrap().snapshot;
            assert_eq!(snap.previous, last);
            assert!((snap.pos.row - last.row).abs() <= 1);
            assert!((snap.pos.column - last.column).abs() <= 1);
            last = snap.pos;
        }
        handle.terminate();
        while rx.recv().await.is_some() {}
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_stalled_listener_does_not_leak_actor() {
        let (handle, rx, closed, task) = spawn_actor(4);
        // Never read: the actor blocks on its second send until the session closes
        tokio::time::sleep(Duration::from_millis(20)).await;
        closed.send_replace(true);
        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert!(handle.is_finished());
        drop(rx);
    }

    #[tokio::test]
    async fn test_commands_closed_after_finish() {
        let (handle, mut rx, _closed, task) = spawn_actor(5);
        handle.message(BubbleCommand::Ping).unwrap();
        rx.recv().await.unwrap();
        handle.terminate();
        while rx.recv().await.is_some() {}
        task.await.unwrap();
        assert!(handle.message(BubbleCommand::Ping).is_err());
    }
}
