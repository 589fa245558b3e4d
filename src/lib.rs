// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! grameen - Community services catalog with offline downloads
//!
//! Browse welfare, health, finance, farming and education resources in five
//! languages and keep the ones you need available offline.
//!
//! # Core Modules
//!
//! - [`download`] - Download state machine, tick timers and the progress store
//! - [`catalog`] - Seed resources, progress rehydration and discovery parsing
//! - [`config`] - Portal configuration with environment overrides
//! - [`types`] - Languages and resource categories
//! - [`error`] - Rejections and consistent error formatting utilities

pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod locks;
pub mod types;

// Re-export commonly used types
pub use types::{Language, ResourceCategory};

// Re-export download types
pub use download::{
    DownloadHandle, DownloadMachine, DownloadManager, DownloadStatus, ProgressPatch, ProgressStore,
    ResourceItem, ResourceProgress, SessionSnapshot, TickSettings, Transition,
};

// Re-export catalog types
pub use catalog::{
    parse_listing, rehydrate, CatalogFilter, CatalogProvider, DiscoveryOutcome, SeedCatalog,
};

// Re-export configuration
pub use config::PortalConfig;

// Re-export error utilities
pub use error::{explain_rejection, format_error, format_simple_error, ErrorBuilder, Rejection};
