// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tick timers for the download machine.
//!
//! The machine never sleeps. It asks a [`TickScheduler`] for a recurring
//! timer when a download starts and drops or cancels the returned
//! [`TickTimer`] when the download ends. Whatever the timer does when it
//! fires (send a command, record a call) is the scheduler's business.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::manager::DownloadCommand;
use crate::locks::{resilient_read, resilient_write};

/// Handle to one recurring tick timer.
pub trait TickTimer: Send {
    /// Stop the timer. No tick fires after this returns.
    fn cancel(&mut self);
}

/// Creates recurring tick timers.
pub trait TickScheduler: Send {
    /// Start ticking `resource_id` every `every`, first tick one period from now.
    fn schedule(&mut self, resource_id: &str, every: Duration) -> Box<dyn TickTimer>;
}

/// Scheduler that turns ticks into [`DownloadCommand::Tick`] messages on
/// the manager's command channel.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    command_tx: mpsc::Sender<DownloadCommand>,
}

impl TokioScheduler {
    pub fn new(command_tx: mpsc::Sender<DownloadCommand>) -> Self {
        Self { command_tx }
    }
}

impl TickScheduler for TokioScheduler {
    fn schedule(&mut self, resource_id: &str, every: Duration) -> Box<dyn TickTimer> {
        let tx = self.command_tx.clone();
        let resource_id = resource_id.to_string();
        let task = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + every, every);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                let cmd = DownloadCommand::Tick {
                    resource_id: resource_id.clone(),
                };
                if tx.send(cmd).await.is_err() {
                    // Worker gone
                    break;
                }
            }
        });
        Box::new(TokioTimer { task })
    }
}

/// Timer backed by a spawned tokio task. Aborted on cancel or drop.
#[derive(Debug)]
pub struct TokioTimer {
    task: JoinHandle<()>,
}

impl TickTimer for TokioTimer {
    fn cancel(&mut self) {
        self.task.abort();
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Debug, Default)]
struct Ledger {
    next_key: u64,
    /// timer key -> resource id, for timers not yet cancelled
    active: HashMap<u64, String>,
    /// every schedule() call, in order
    scheduled: Vec<String>,
}

/// Scheduler that never fires on its own.
///
/// Ticks are delivered by calling the machine's `tick` directly, which makes
/// the progression deterministic. Clones share the same ledger, so a test
/// can keep one clone to inspect which timers are alive.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    ledger: Arc<RwLock<Ledger>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live timers for `resource_id`.
    pub fn active_for(&self, resource_id: &str) -> usize {
        resilient_read(&self.ledger)
            .active
            .values()
            .filter(|id| id.as_str() == resource_id)
            .count()
    }

    /// Number of live timers overall.
    pub fn active_count(&self) -> usize {
        resilient_read(&self.ledger).active.len()
    }

    /// Resource ids passed to `schedule`, in call order.
    pub fn scheduled(&self) -> Vec<String> {
        resilient_read(&self.ledger).scheduled.clone()
    }
}

impl TickScheduler for ManualScheduler {
    fn schedule(&mut self, resource_id: &str, _every: Duration) -> Box<dyn TickTimer> {
        let mut ledger = resilient_write(&self.ledger);
        let key = ledger.next_key;
        ledger.next_key += 1;
        ledger.active.insert(key, resource_id.to_string());
        ledger.scheduled.push(resource_id.to_string());
        Box::new(ManualTimer {
            key,
            ledger: Arc::clone(&self.ledger),
        })
    }
}

struct ManualTimer {
    key: u64,
    ledger: Arc<RwLock<Ledger>>,
}

impl TickTimer for ManualTimer {
    fn cancel(&mut self) {
        resilient_write(&self.ledger).active.remove(&self.key);
    }
}

impl Drop for ManualTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
