//! Fixed-rate simulation loop.

use crate::broadcast::{BroadcastReport, Broadcaster};
use crate::game::World;
use crate::input::GameCommand;
use log::{debug, info};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Log tick statistics this often.
const STATS_INTERVAL: u64 = 64;

/// Owns the `World` and is the only place it is mutated.
///
/// Paddle moves arrive on the command queue and ticks come from a timer;
/// both are handled by the same task, one at a time, so a tick never
/// overlaps another tick or an input.
pub struct GameLoop {
    world: World,
    commands: mpsc::Receiver<GameCommand>,
    broadcaster: Arc<Broadcaster>,
    tick_duration: Duration,
}

impl GameLoop {
    /// Wires the world to its command queue and broadcaster. Nothing ticks
    /// until `run` is awaited.
    pub fn new(
        world: World,
        commands: mpsc::Receiver<GameCommand>,
        broadcaster: Arc<Broadcaster>,
        tick_duration: Duration,
    ) -> Self {
        Self {
            world,
            commands,
            broadcaster,
            tick_duration,
        }
    }

    /// Read access to the world, mainly for tests and final reporting.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Runs until `shutdown` resolves, then hands the world back.
    ///
    /// Ticks are scheduled from a fixed origin, so a slow tick delays only
    /// itself; overdue ticks are skipped rather than run back to back.
    pub async fn run<F>(mut self, shutdown: F) -> World
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut ticker = interval(self.tick_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Skip the first tick since it fires immediately
        ticker.tick().await;

        info!(
            "Game loop started at {:.1}Hz",
            1.0 / self.tick_duration.as_secs_f64()
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Game loop stopping after {} ticks", self.world.tick());
                    break;
                }
                Some(cmd) = self.commands.recv() => {
                    self.apply(cmd);
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        self.world
    }

    fn apply(&mut self, cmd: GameCommand) {
        match cmd {
            GameCommand::MovePaddle { role, delta } => {
                self.world.apply_paddle_move(role, delta);
            }
        }
    }

    /// Steps physics once and publishes the resulting snapshot.
    pub async fn tick(&mut self) -> BroadcastReport {
        self.world.step();
        let snapshot = self.world.snapshot();
        let report = self.broadcaster.publish(&snapshot).await;

        if self.world.tick() % STATS_INTERVAL == 0 {
            debug!(
                "Tick {}: {} connections, ball at ({:.1}, {:.1})",
                self.world.tick(),
                report.delivered,
                snapshot.ball.x,
                snapshot.ball.y
            );
        }

        report
    }
}
