// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Validation of externally discovered resources.
//!
//! An external search service answers with a plain-text listing of blocks
//! separated by `---`:
//!
//! ```text
//! ---
//! Title: PM-KISAN
//! Description: Income support for small farmers.
//! Category: Agriculture
//! Link: https://pmkisan.gov.in
//! ---
//! ```
//!
//! Nothing from that text reaches the download machine until it has been
//! turned into a [`DiscoveryOutcome`].

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;

use crate::download::ResourceItem;
use crate::types::ResourceCategory;

/// Blocks with fewer non-blank characters than this are separator noise.
const MIN_BLOCK_LEN: usize = 10;

/// Icon assigned to every discovered resource.
pub const DISCOVERED_ICON: &str = "Globe";

static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Title:\s*(.+)").expect("valid regex"));
static DESCRIPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Description:\s*(.+)").expect("valid regex"));
static CATEGORY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Category:\s*(.+)").expect("valid regex"));
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Link:\s*(.+)").expect("valid regex"));

/// Result of validating a discovery listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// At least one well-formed resource
    Found(Vec<ResourceItem>),
    /// Nothing usable, with the reason
    Failed { reason: String },
}

impl DiscoveryOutcome {
    pub fn items(&self) -> &[ResourceItem] {
        match self {
            DiscoveryOutcome::Found(items) => items,
            DiscoveryOutcome::Failed { .. } => &[],
        }
    }
}

fn capture(re: &Regex, block: &str) -> Option<String> {
    re.captures(block)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse a discovery listing, stamping ids with the current time.
pub fn parse_listing(text: &str) -> DiscoveryOutcome {
    parse_listing_at(text, Utc::now().timestamp_millis())
}

/// Parse a discovery listing with ids of the form `web-<stamp>-<index>`.
pub fn parse_listing_at(text: &str, stamp: i64) -> DiscoveryOutcome {
    if text.trim().is_empty() {
        return DiscoveryOutcome::Failed {
            reason: "empty response from discovery service".to_string(),
        };
    }

    let items: Vec<ResourceItem> = text
        .split("---")
        .filter(|block| block.trim().len() > MIN_BLOCK_LEN)
        .enumerate()
        .filter_map(|(index, block)| {
            let title = capture(&TITLE_RE, block)?;
            let description = capture(&DESCRIPTION_RE, block)?;
            let category = capture(&CATEGORY_RE, block)
                .map(|c| ResourceCategory::from_loose(&c))
                .unwrap_or(ResourceCategory::Government);

            let item = ResourceItem::new(
                format!("web-{}-{}", stamp, index),
                title,
                description,
                category,
                DISCOVERED_ICON,
                false,
            );
            Some(match capture(&LINK_RE, block) {
                Some(link) if !link.eq_ignore_ascii_case("NA") => item.with_link(link),
                _ => item,
            })
        })
        .collect();

    if items.is_empty() {
        tracing::warn!("Discovery listing contained no complete entries");
        DiscoveryOutcome::Failed {
            reason: "no entry had both a title and a description".to_string(),
        }
    } else {
        tracing::info!("Discovered {} resources", items.len());
        DiscoveryOutcome::Found(items)
    }
}
