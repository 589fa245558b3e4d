// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Download manager: drives a [`DownloadMachine`] with real timers.
//!
//! The machine lives inside a single tokio worker task. Callers and tick
//! timers talk to it through one command channel, so every transition is
//! applied in arrival order and never concurrently with another. After each
//! change the worker publishes a [`SessionSnapshot`] on a watch channel.
//!
//! Tick timers hold senders of the command channel, so the channel alone
//! never closes while a download runs. The worker also watches a oneshot
//! owned by the manager and stops as soon as the manager is dropped.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, oneshot, watch};

use super::machine::{DownloadMachine, TickOutcome, TickSettings, Transition};
use super::scheduler::TokioScheduler;
use super::store::ProgressStore;
use super::types::{DownloadStatus, ResourceItem, StatusCounts};
use crate::catalog::{CatalogProvider, SeedCatalog};
use crate::error::Rejection;
use crate::types::Language;

/// Capacity of the worker's command channel.
const COMMAND_BUFFER: usize = 100;

/// Commands that can be sent to the download worker.
#[derive(Debug)]
pub enum DownloadCommand {
    /// Start downloading a resource
    Start {
        resource_id: String,
        reply: oneshot::Sender<Result<Transition, Rejection>>,
    },
    /// Cancel a running download
    Cancel {
        resource_id: String,
        reply: oneshot::Sender<Option<Transition>>,
    },
    /// Reset a downloaded resource to idle
    Remove {
        resource_id: String,
        reply: oneshot::Sender<Option<Transition>>,
    },
    /// One progress step, sent by tick timers
    Tick { resource_id: String },
    /// Reload for a language / identity pair
    SwitchSession {
        language: Language,
        identity: Option<String>,
        reply: oneshot::Sender<()>,
    },
    /// Prepend discovered resources
    AddDiscovered {
        items: Vec<ResourceItem>,
        reply: oneshot::Sender<usize>,
    },
    /// Shutdown the worker
    Shutdown,
}

/// What the worker last published.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub language: Language,
    pub identity: Option<String>,
    pub resources: Vec<ResourceItem>,
}

impl SessionSnapshot {
    fn of(machine: &DownloadMachine) -> Self {
        Self {
            language: machine.language(),
            identity: machine.identity().map(str::to_string),
            resources: machine.resources().to_vec(),
        }
    }

    pub fn resource(&self, resource_id: &str) -> Option<&ResourceItem> {
        self.resources.iter().find(|r| r.id == resource_id)
    }

    pub fn counts(&self) -> StatusCounts {
        StatusCounts::tally(&self.resources)
    }
}

/// Handle to one started download, allowing status checks.
#[derive(Debug, Clone)]
pub struct DownloadHandle {
    pub resource_id: String,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
}

impl DownloadHandle {
    /// Current state of the resource, `None` if it left the list.
    pub fn progress(&self) -> Option<ResourceItem> {
        self.snapshot_rx.borrow().resource(&self.resource_id).cloned()
    }

    /// Check if the download has finished.
    pub fn is_complete(&self) -> bool {
        self.progress().is_some_and(|r| r.status.is_terminal())
    }

    /// Wait until the resource stops downloading.
    ///
    /// Resolves with `Downloaded` on completion, `Idle` after a cancel or a
    /// session switch, and `None` if the worker stopped or the resource
    /// disappeared.
    pub async fn wait(&mut self) -> Option<ResourceItem> {
        loop {
            let current = self.progress();
            match &current {
                Some(item) if item.status == DownloadStatus::Downloading => {}
                _ => return current,
            }
            if self.snapshot_rx.changed().await.is_err() {
                // Worker gone
                return self.progress().filter(|r| r.status != DownloadStatus::Downloading);
            }
        }
    }

    /// Wait for the next published change, returning the resource state.
    pub async fn next_update(&mut self) -> Option<ResourceItem> {
        self.snapshot_rx.changed().await.ok()?;
        self.progress()
    }
}

/// Manager for simulated resource downloads.
///
/// Handles starting, cancelling and removing downloads and session
/// switches. Must be created inside a tokio runtime.
pub struct DownloadManager {
    command_tx: mpsc::Sender<DownloadCommand>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    /// Dropped with the manager, which stops the worker.
    _owner: oneshot::Sender<()>,
}

impl DownloadManager {
    /// Create a manager over the built-in catalog and start its worker.
    ///
    /// The session starts signed out in English; call
    /// [`switch_session`](Self::switch_session) to load a user's progress.
    pub fn new(store: ProgressStore, settings: TickSettings) -> Self {
        Self::with_catalog(Arc::new(SeedCatalog), store, settings)
    }

    pub fn with_catalog(
        catalog: Arc<dyn CatalogProvider>,
        store: ProgressStore,
        settings: TickSettings,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let scheduler = TokioScheduler::new(command_tx.clone());
        let machine = DownloadMachine::new(catalog, store, Box::new(scheduler), settings);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::of(&machine));
        let (owner, owner_gone) = oneshot::channel();

        tokio::spawn(Self::worker_loop(machine, command_rx, snapshot_tx, owner_gone));

        Self {
            command_tx,
            snapshot_rx,
            _owner: owner,
        }
    }

    /// Start downloading `resource_id`.
    ///
    /// Returns a handle that can be used to track progress.
    pub async fn start(&self, resource_id: impl Into<String>) -> Result<DownloadHandle, Rejection> {
        let resource_id = resource_id.into();
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(DownloadCommand::Start {
                resource_id: resource_id.clone(),
                reply,
            })
            .await
            .map_err(|_| Rejection::WorkerStopped)?;
        rx.await.map_err(|_| Rejection::WorkerStopped)??;

        Ok(DownloadHandle {
            resource_id,
            snapshot_rx: self.snapshot_rx.clone(),
        })
    }

    /// Cancel a running download. `None` if there was nothing to cancel.
    pub async fn cancel(&self, resource_id: impl Into<String>) -> Option<Transition> {
        let (reply, rx) = oneshot::channel();
        let cmd = DownloadCommand::Cancel {
            resource_id: resource_id.into(),
            reply,
        };
        self.command_tx.send(cmd).await.ok()?;
        rx.await.ok().flatten()
    }

    /// Reset a downloaded resource. `None` if it was not downloaded.
    pub async fn remove(&self, resource_id: impl Into<String>) -> Option<Transition> {
        let (reply, rx) = oneshot::channel();
        let cmd = DownloadCommand::Remove {
            resource_id: resource_id.into(),
            reply,
        };
        self.command_tx.send(cmd).await.ok()?;
        rx.await.ok().flatten()
    }

    /// Reload the resource list for `language` and `identity`.
    pub async fn switch_session(&self, language: Language, identity: Option<String>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(DownloadCommand::SwitchSession {
                language,
                identity,
                reply,
            })
            .await
            .map_err(|_| anyhow!("download worker is not running"))?;
        rx.await.map_err(|_| anyhow!("download worker stopped during session switch"))
    }

    /// Switch language, keeping the current identity.
    pub async fn set_language(&self, language: Language) -> Result<()> {
        let identity = self.snapshot().identity;
        self.switch_session(language, identity).await
    }

    /// Drop the identity and show the plain catalog.
    pub async fn sign_out(&self) -> Result<()> {
        let language = self.snapshot().language;
        self.switch_session(language, None).await
    }

    /// Prepend discovered resources; returns how many were new.
    pub async fn add_discovered(&self, items: Vec<ResourceItem>) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(DownloadCommand::AddDiscovered { items, reply })
            .await
            .map_err(|_| anyhow!("download worker is not running"))?;
        rx.await.map_err(|_| anyhow!("download worker stopped while adding resources"))
    }

    /// Latest published state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver that observes every published state.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Current state of one resource.
    pub fn get_progress(&self, resource_id: &str) -> Option<ResourceItem> {
        self.snapshot_rx.borrow().resource(resource_id).cloned()
    }

    /// Shutdown the download manager. Running downloads are dropped unpersisted.
    pub async fn shutdown(&self) -> Result<()> {
        self.command_tx.send(DownloadCommand::Shutdown).await?;
        Ok(())
    }

    /// Background worker loop that owns the machine.
    async fn worker_loop(
        mut machine: DownloadMachine,
        mut command_rx: mpsc::Receiver<DownloadCommand>,
        snapshot_tx: watch::Sender<SessionSnapshot>,
        mut owner_gone: oneshot::Receiver<()>,
    ) {
        // Publish before replying, so a caller that awaited the reply reads
        // the new state from its snapshot.
        let publish = |machine: &DownloadMachine| {
            snapshot_tx.send_replace(SessionSnapshot::of(machine));
        };

        loop {
            let cmd = tokio::select! {
                cmd = command_rx.recv() => match cmd {
                    Some(cmd) => cmd,
                    None => break,
                },
                _ = &mut owner_gone => {
                    tracing::debug!("Download manager dropped");
                    break;
                }
            };

            match cmd {
                DownloadCommand::Start { resource_id, reply } => {
                    let result = machine.start(&resource_id);
                    if result.is_ok() {
                        publish(&machine);
                    }
                    let _ = reply.send(result);
                }
                DownloadCommand::Cancel { resource_id, reply } => {
                    let result = machine.cancel(&resource_id);
                    if result.is_some() {
                        publish(&machine);
                    }
                    let _ = reply.send(result);
                }
                DownloadCommand::Remove { resource_id, reply } => {
                    let result = machine.remove(&resource_id);
                    if result.is_some() {
                        publish(&machine);
                    }
                    let _ = reply.send(result);
                }
                DownloadCommand::Tick { resource_id } => {
                    if !matches!(machine.tick(&resource_id), TickOutcome::Ignored) {
                        publish(&machine);
                    }
                }
                DownloadCommand::SwitchSession {
                    language,
                    identity,
                    reply,
                } => {
                    machine.switch_session(language, identity);
                    publish(&machine);
                    let _ = reply.send(());
                }
                DownloadCommand::AddDiscovered { items, reply } => {
                    let added = machine.add_discovered(items);
                    if added > 0 {
                        publish(&machine);
                    }
                    let _ = reply.send(added);
                }
                DownloadCommand::Shutdown => {
                    if machine.active_timers() > 0 {
                        tracing::info!(
                            "Shutting down with {} download(s) in progress",
                            machine.active_timers()
                        );
                    }
                    break;
                }
            }
        }
        tracing::debug!("Download worker stopped");
        // Dropping the machine aborts any remaining tick timers.
    }
}
