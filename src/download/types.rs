// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Download types for offline resource tracking.

use serde::{Deserialize, Serialize};

use crate::types::ResourceCategory;

/// Progress value of a finished download.
pub const COMPLETE: u8 = 100;

/// Status of a resource download.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Not downloaded (initial state and reset target)
    #[default]
    Idle,
    /// Progress ticks are running
    Downloading,
    /// Available offline
    Downloaded,
}

impl DownloadStatus {
    /// Returns true if the download finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadStatus::Downloaded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Idle => "idle",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Downloaded => "downloaded",
        }
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A catalog entry together with its download state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceItem {
    /// Stable identifier, shared by every language variant
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: ResourceCategory,
    /// Icon name used by the presentation layer
    pub icon: String,
    /// Whether the resource can be used without a connection
    pub offline_available: bool,
    /// External page for resources found online
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(rename = "downloadStatus")]
    pub status: DownloadStatus,
    /// Percentage in [0, 100]
    pub progress: u8,
}

impl ResourceItem {
    /// Create an idle resource.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        category: ResourceCategory,
        icon: impl Into<String>,
        offline_available: bool,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            category,
            icon: icon.into(),
            offline_available,
            link: None,
            status: DownloadStatus::Idle,
            progress: 0,
        }
    }

    /// Attach an external link.
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Check the status/progress invariant.
    ///
    /// Idle items sit at 0, downloaded items at 100, and downloading items
    /// anywhere below 100.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            DownloadStatus::Idle => self.progress == 0,
            DownloadStatus::Downloading => self.progress < COMPLETE,
            DownloadStatus::Downloaded => self.progress == COMPLETE,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.status = DownloadStatus::Idle;
        self.progress = 0;
    }
}

/// Persisted download state of one resource for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceProgress {
    pub resource_id: String,
    #[serde(rename = "downloadStatus", default)]
    pub status: DownloadStatus,
    #[serde(default)]
    pub progress: u8,
}

impl ResourceProgress {
    pub fn new(resource_id: impl Into<String>, status: DownloadStatus, progress: u8) -> Self {
        Self {
            resource_id: resource_id.into(),
            status,
            progress,
        }
    }

    /// Merge a partial update into this record.
    pub fn apply(&mut self, patch: &ProgressPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(progress) = patch.progress {
            self.progress = progress.min(COMPLETE);
        }
    }

    /// Return the record with the status/progress invariant restored.
    ///
    /// A `downloading` record cannot have a live tick timer behind it once
    /// it has been read back from storage, so it falls back to idle.
    pub fn normalized(&self) -> Self {
        let (status, progress) = match self.status {
            DownloadStatus::Downloaded => (DownloadStatus::Downloaded, COMPLETE),
            DownloadStatus::Idle | DownloadStatus::Downloading => (DownloadStatus::Idle, 0),
        };
        Self {
            resource_id: self.resource_id.clone(),
            status,
            progress,
        }
    }
}

/// Partial update for a [`ResourceProgress`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressPatch {
    pub status: Option<DownloadStatus>,
    pub progress: Option<u8>,
}

impl ProgressPatch {
    /// Patch setting both fields.
    pub fn new(status: DownloadStatus, progress: u8) -> Self {
        Self {
            status: Some(status),
            progress: Some(progress),
        }
    }

    /// `{downloaded, 100}`
    pub fn downloaded() -> Self {
        Self::new(DownloadStatus::Downloaded, COMPLETE)
    }

    /// `{idle, 0}`
    pub fn idle() -> Self {
        Self::new(DownloadStatus::Idle, 0)
    }
}

/// Count of resources per download status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub idle: usize,
    pub downloading: usize,
    pub downloaded: usize,
}

impl StatusCounts {
    pub fn tally<'a>(items: impl IntoIterator<Item = &'a ResourceItem>) -> Self {
        let mut counts = Self::default();
        for item in items {
            match item.status {
                DownloadStatus::Idle => counts.idle += 1,
                DownloadStatus::Downloading => counts.downloading += 1,
                DownloadStatus::Downloaded => counts.downloaded += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.idle + self.downloading + self.downloaded
    }
}
