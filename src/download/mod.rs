// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Simulated offline downloads for grameen
//!
//! This module tracks which catalog resources a user has saved for offline
//! use:
//! - A per-resource state machine (idle -> downloading -> downloaded)
//! - Progress driven by recurring ticks, one timer per running download
//! - Write-through persistence of terminal states, namespaced per user
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │ DownloadManager │────▶│ Worker (tokio)  │
//! │                 │     │ DownloadMachine │
//! └────────┬────────┘     └────────┬────────┘
//!          │ watch                 │
//!          ▼                       ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ SessionSnapshot │     │ ProgressStore   │
//! │ (latest state)  │     │ (persistent)    │
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use grameen::download::{DownloadManager, ProgressStore, TickSettings};
//! use grameen::types::Language;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let manager = DownloadManager::new(ProgressStore::open("/tmp/grameen"), TickSettings::default());
//! manager.switch_session(Language::English, Some("asha".to_string())).await?;
//!
//! let mut handle = manager.start("1").await?;
//! let finished = handle.wait().await;
//! println!("{:?}", finished.map(|r| r.status));
//! # Ok(())
//! # }
//! ```

pub mod machine;
pub mod manager;
pub mod scheduler;
pub mod store;
pub mod types;

// Re-export commonly used items
pub use machine::{
    DownloadMachine, TickOutcome, TickSettings, Transition, WriteThrough, DEFAULT_TICK_INCREMENT,
    DEFAULT_TICK_INTERVAL,
};
pub use manager::{DownloadCommand, DownloadHandle, DownloadManager, SessionSnapshot};
pub use scheduler::{ManualScheduler, TickScheduler, TickTimer, TokioScheduler};
pub use store::{FileMedium, MemoryMedium, ProgressStore, StorageMedium, PROGRESS_KEY};
pub use types::{
    DownloadStatus, ProgressPatch, ResourceItem, ResourceProgress, StatusCounts, COMPLETE,
};
