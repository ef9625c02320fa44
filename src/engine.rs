use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::debug;

use crate::clock::ClockSource;
use crate::timing::Tick;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCommand {
    /// Re-evaluate deadlines after new scheduling.
    Wake,
    Shutdown,
}

pub type SharedTick = Arc<Mutex<dyn Tick + Send>>;

pub struct DriverHandle {
    pub command_tx: Sender<DriverCommand>,
    join: Option<JoinHandle<()>>,
}

impl DriverHandle {
    pub fn wake(&self) {
        let _ = self.command_tx.send(DriverCommand::Wake);
    }

    pub fn shutdown(mut self) {
        let _ = self.command_tx.send(DriverCommand::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        let _ = self.command_tx.send(DriverCommand::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Spawns the wall-clock driver servicing every registered component:
/// it sleeps until the earliest pending deadline, then polls each
/// target with the shared clock. Offline rendering skips the driver
/// entirely and polls with a manual clock instead.
pub fn spawn_driver(targets: Vec<SharedTick>, clock: Arc<dyn ClockSource>) -> DriverHandle {
    let (command_tx, command_rx) = crossbeam::channel::unbounded();
    let join = std::thread::spawn(move || driver_thread(targets, clock, command_rx));
    DriverHandle {
        command_tx,
        join: Some(join),
    }
}

fn driver_thread(
    targets: Vec<SharedTick>,
    clock: Arc<dyn ClockSource>,
    command_rx: Receiver<DriverCommand>,
) {
    debug!(targets = targets.len(), "driver running");
    loop {
        let deadline = targets
            .iter()
            .filter_map(|target| target.lock().next_deadline())
            .fold(f64::INFINITY, f64::min);

        let command = if deadline.is_finite() {
            let wait = (deadline - clock.now()).max(0.0);
            command_rx.recv_timeout(Duration::from_secs_f64(wait))
        } else {
            command_rx
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected)
        };

        match command {
            Ok(DriverCommand::Wake) => {}
            Ok(DriverCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                let now = clock.now();
                for target in &targets {
                    target.lock().poll(now);
                }
            }
        }
    }
    debug!("driver stopped");
}
