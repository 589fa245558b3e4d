// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Download state machine.
//!
//! Owns the resource list of one session (a language plus an optional user
//! identity) and the registry of tick timers, one per downloading resource.
//!
//! ```text
//!            start              tick (progress >= 100)
//!   idle ────────────▶ downloading ─────────────────▶ downloaded
//!    ▲                      │                              │
//!    └──────── cancel ──────┘                              │
//!    └──────────────────────── remove ─────────────────────┘
//! ```
//!
//! Every method runs to completion before the next one starts; the only
//! interleaving is between ticks, and a tick that finds its resource no
//! longer downloading does nothing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::scheduler::{TickScheduler, TickTimer};
use super::store::ProgressStore;
use super::types::{DownloadStatus, ProgressPatch, ResourceItem, StatusCounts, COMPLETE};
use crate::catalog::{rehydrate, CatalogProvider};
use crate::error::Rejection;
use crate::types::Language;

/// Default time between progress ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Default progress added per tick.
pub const DEFAULT_TICK_INCREMENT: u8 = 10;

/// Tick cadence and step size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSettings {
    pub interval: Duration,
    pub increment: u8,
}

impl Default for TickSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_TICK_INTERVAL,
            increment: DEFAULT_TICK_INCREMENT,
        }
    }
}

impl TickSettings {
    /// Bring the settings into the range a download can finish with.
    ///
    /// A zero increment becomes 1 and anything above 100 becomes 100. A zero
    /// interval falls back to the default, since a timer cannot fire every
    /// zero milliseconds.
    pub fn sanitized(self) -> Self {
        let increment = self.increment.clamp(1, COMPLETE);
        let interval = if self.interval.is_zero() {
            DEFAULT_TICK_INTERVAL
        } else {
            self.interval
        };
        let sanitized = Self { interval, increment };
        if sanitized != self {
            tracing::warn!(
                "Adjusted tick settings {:?}/{} to {:?}/{}",
                self.interval,
                self.increment,
                sanitized.interval,
                sanitized.increment
            );
        }
        sanitized
    }
}

/// What happened to the durable copy of a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteThrough {
    /// Written to the progress store
    Persisted,
    /// No user identity, nothing to key the record by
    NoIdentity,
    /// Transition is in-memory only (start)
    NotRequired,
    /// Store write failed; in-memory state still applies
    Failed { reason: String },
}

/// An accepted state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub resource_id: String,
    pub status: DownloadStatus,
    pub progress: u8,
    pub write: WriteThrough,
}

/// Result of one progress tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Progress advanced, still downloading
    Progressed { progress: u8 },
    /// Download finished
    Completed(Transition),
    /// Resource was not downloading; nothing changed
    Ignored,
}

/// Per-session download lifecycle.
pub struct DownloadMachine {
    catalog: Arc<dyn CatalogProvider>,
    store: ProgressStore,
    scheduler: Box<dyn TickScheduler>,
    settings: TickSettings,
    language: Language,
    identity: Option<String>,
    resources: Vec<ResourceItem>,
    timers: HashMap<String, Box<dyn TickTimer>>,
}

impl DownloadMachine {
    /// Create a machine showing the seed catalog in English, signed out.
    pub fn new(
        catalog: Arc<dyn CatalogProvider>,
        store: ProgressStore,
        scheduler: Box<dyn TickScheduler>,
        settings: TickSettings,
    ) -> Self {
        let language = Language::default();
        let resources = catalog.resources(language);
        Self {
            catalog,
            store,
            scheduler,
            settings: settings.sanitized(),
            language,
            identity: None,
            resources,
            timers: HashMap::new(),
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn settings(&self) -> TickSettings {
        self.settings
    }

    pub fn resources(&self) -> &[ResourceItem] {
        &self.resources
    }

    pub fn resource(&self, resource_id: &str) -> Option<&ResourceItem> {
        self.resources.iter().find(|r| r.id == resource_id)
    }

    /// Number of live tick timers.
    pub fn active_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn is_ticking(&self, resource_id: &str) -> bool {
        self.timers.contains_key(resource_id)
    }

    pub fn counts(&self) -> StatusCounts {
        StatusCounts::tally(&self.resources)
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Rebuild the resource list for `language` and `identity`.
    ///
    /// Every running download is dropped: timers stop and the list is
    /// rebuilt from the catalog, overlaid with the identity's stored
    /// progress. Blank identities count as signed out.
    pub fn switch_session(&mut self, language: Language, identity: Option<String>) {
        self.stop_all_timers();
        self.language = language;
        self.identity = identity
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        let base = self.catalog.resources(language);
        self.resources = match &self.identity {
            Some(user) => rehydrate(base, &self.store.get(user)),
            None => base,
        };

        tracing::info!(
            language = %self.language,
            user = self.identity.as_deref().unwrap_or("-"),
            downloaded = self.counts().downloaded,
            "Loaded resource session"
        );
    }

    /// Switch language, keeping the identity.
    pub fn set_language(&mut self, language: Language) {
        let identity = self.identity.clone();
        self.switch_session(language, identity);
    }

    pub fn sign_in(&mut self, user_id: impl Into<String>) {
        self.switch_session(self.language, Some(user_id.into()));
    }

    /// Back to the plain seed catalog with no progress.
    pub fn sign_out(&mut self) {
        self.switch_session(self.language, None);
    }

    /// Put newly discovered resources in front of the list.
    ///
    /// Items whose id is already listed are skipped. Stored progress of the
    /// active identity is applied to the rest. Returns how many were added.
    pub fn add_discovered(&mut self, items: Vec<ResourceItem>) -> usize {
        let mut fresh: Vec<ResourceItem> = Vec::new();
        for mut item in items {
            if self.resource(&item.id).is_some() || fresh.iter().any(|f| f.id == item.id) {
                continue;
            }
            item.status = DownloadStatus::Idle;
            item.progress = 0;
            fresh.push(item);
        }
        if let Some(user) = &self.identity {
            fresh = rehydrate(fresh, &self.store.get(user));
        }

        let added = fresh.len();
        fresh.append(&mut self.resources);
        self.resources = fresh;
        added
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Begin downloading `resource_id`.
    ///
    /// Requires an identity and an idle resource. On success the resource
    /// is downloading at 0 and exactly one tick timer runs for it.
    pub fn start(&mut self, resource_id: &str) -> Result<Transition, Rejection> {
        if self.identity.is_none() {
            tracing::debug!(resource = resource_id, "Start rejected: no identity");
            return Err(Rejection::AuthenticationRequired);
        }
        if self.timers.contains_key(resource_id) {
            return Err(Rejection::AlreadyDownloading(resource_id.to_string()));
        }

        let item = self
            .resources
            .iter_mut()
            .find(|r| r.id == resource_id)
            .ok_or_else(|| Rejection::UnknownResource(resource_id.to_string()))?;
        match item.status {
            DownloadStatus::Downloading => {
                return Err(Rejection::AlreadyDownloading(resource_id.to_string()))
            }
            DownloadStatus::Downloaded => {
                return Err(Rejection::AlreadyDownloaded(resource_id.to_string()))
            }
            DownloadStatus::Idle => {}
        }

        item.status = DownloadStatus::Downloading;
        item.progress = 0;

        let timer = self.scheduler.schedule(resource_id, self.settings.interval);
        self.timers.insert(resource_id.to_string(), timer);

        tracing::info!(resource = resource_id, "Download started");
        Ok(Transition {
            resource_id: resource_id.to_string(),
            status: DownloadStatus::Downloading,
            progress: 0,
            write: WriteThrough::NotRequired,
        })
    }

    /// Advance a running download by one step.
    ///
    /// Completion clamps progress to 100, retires the timer and writes the
    /// result through. A tick for a resource that is not downloading (it
    /// raced with cancel, remove or a session switch) changes nothing and
    /// retires any timer still registered for it.
    pub fn tick(&mut self, resource_id: &str) -> TickOutcome {
        let increment = self.settings.increment;
        let next = match self.resources.iter_mut().find(|r| r.id == resource_id) {
            Some(item) if item.status == DownloadStatus::Downloading => {
                let next = item.progress.saturating_add(increment);
                if next < COMPLETE {
                    item.progress = next;
                    tracing::debug!(resource = resource_id, progress = next, "Download progress");
                    return TickOutcome::Progressed { progress: next };
                }
                item.status = DownloadStatus::Downloaded;
                item.progress = COMPLETE;
                next
            }
            _ => {
                self.stop_timer(resource_id);
                return TickOutcome::Ignored;
            }
        };

        self.stop_timer(resource_id);
        let write = self.write_through(resource_id, ProgressPatch::downloaded());
        tracing::info!(resource = resource_id, overshoot = next - COMPLETE, "Download complete");
        TickOutcome::Completed(Transition {
            resource_id: resource_id.to_string(),
            status: DownloadStatus::Downloaded,
            progress: COMPLETE,
            write,
        })
    }

    /// Abort a running download. Does nothing unless `resource_id` is downloading.
    pub fn cancel(&mut self, resource_id: &str) -> Option<Transition> {
        let item = self
            .resources
            .iter_mut()
            .find(|r| r.id == resource_id && r.status == DownloadStatus::Downloading)?;
        item.reset();
        self.stop_timer(resource_id);

        let write = self.write_through(resource_id, ProgressPatch::idle());
        tracing::info!(resource = resource_id, "Download cancelled");
        Some(Transition {
            resource_id: resource_id.to_string(),
            status: DownloadStatus::Idle,
            progress: 0,
            write,
        })
    }

    /// Drop a downloaded resource back to idle. Does nothing unless it is downloaded.
    ///
    /// The stored record is reset, not deleted, so the resource can be
    /// downloaded again.
    pub fn remove(&mut self, resource_id: &str) -> Option<Transition> {
        let item = self
            .resources
            .iter_mut()
            .find(|r| r.id == resource_id && r.status == DownloadStatus::Downloaded)?;
        item.reset();

        let write = self.write_through(resource_id, ProgressPatch::idle());
        tracing::info!(resource = resource_id, "Offline copy removed");
        Some(Transition {
            resource_id: resource_id.to_string(),
            status: DownloadStatus::Idle,
            progress: 0,
            write,
        })
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn write_through(&self, resource_id: &str, patch: ProgressPatch) -> WriteThrough {
        let Some(user) = self.identity.as_deref() else {
            return WriteThrough::NoIdentity;
        };
        match self.store.put(user, resource_id, patch) {
            Ok(_) => WriteThrough::Persisted,
            Err(e) => {
                tracing::warn!(
                    user,
                    resource = resource_id,
                    "Failed to persist download progress: {:#}",
                    e
                );
                WriteThrough::Failed {
                    reason: format!("{:#}", e),
                }
            }
        }
    }

    fn stop_timer(&mut self, resource_id: &str) {
        if let Some(mut timer) = self.timers.remove(resource_id) {
            timer.cancel();
        }
    }

    fn stop_all_timers(&mut self) {
        for (_, mut timer) in self.timers.drain() {
            timer.cancel();
        }
    }
}

impl std::fmt::Debug for DownloadMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadMachine")
            .field("language", &self.language)
            .field("identity", &self.identity)
            .field("resources", &self.resources.len())
            .field("active_timers", &self.timers.len())
            .finish()
    }
}
