// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Resource catalog.
//!
//! The catalog supplies the base (idle) resource list for a language. The
//! download machine overlays persisted progress on top of it with
//! [`rehydrate`], and the presentation layer narrows the result with
//! [`CatalogFilter`].

pub mod discovery;
pub mod seed;

use std::collections::HashMap;

use crate::download::{DownloadStatus, ResourceItem, ResourceProgress};
use crate::types::{Language, ResourceCategory};

pub use discovery::{parse_listing, DiscoveryOutcome};
pub use seed::seed_resources;

/// Source of the base resource list for a language.
///
/// Implementations must return items in their initial state (idle, 0).
pub trait CatalogProvider: Send + Sync {
    fn resources(&self, language: Language) -> Vec<ResourceItem>;
}

/// Provider backed by the built-in seed list.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeedCatalog;

impl CatalogProvider for SeedCatalog {
    fn resources(&self, language: Language) -> Vec<ResourceItem> {
        seed_resources(language)
    }
}

/// Overlay stored progress onto a base catalog.
///
/// Items with a record take its (normalized) status and progress; all other
/// fields, and items without a record, are left untouched.
pub fn rehydrate(
    base: Vec<ResourceItem>,
    records: &HashMap<String, ResourceProgress>,
) -> Vec<ResourceItem> {
    base.into_iter()
        .map(|mut item| {
            if let Some(record) = records.get(&item.id) {
                let record = record.normalized();
                item.status = record.status;
                item.progress = record.progress;
            }
            item
        })
        .collect()
}

/// Narrowing applied to a resource list before display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    /// Case-insensitive substring matched against title and description
    pub search: Option<String>,
    pub category: Option<ResourceCategory>,
    /// Keep only downloaded resources
    pub downloaded_only: bool,
}

impl CatalogFilter {
    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn category(mut self, category: ResourceCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn downloaded_only(mut self, yes: bool) -> Self {
        self.downloaded_only = yes;
        self
    }

    pub fn matches(&self, item: &ResourceItem) -> bool {
        if self.downloaded_only && item.status != DownloadStatus::Downloaded {
            return false;
        }
        if let Some(category) = self.category {
            if item.category != category {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                item.title.to_lowercase().contains(&needle)
                    || item.description.to_lowercase().contains(&needle)
            }
            _ => true,
        }
    }

    /// Matching items, in their original order.
    pub fn apply<'a>(&self, items: &'a [ResourceItem]) -> Vec<&'a ResourceItem> {
        items.iter().filter(|item| self.matches(item)).collect()
    }
}
