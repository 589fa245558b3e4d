// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Canonical types used across grameen.
//!
//! This module provides unified type definitions to avoid duplication.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Catalog language.
///
/// Every language variant of the catalog uses the same resource ids, so
/// progress recorded under one language carries over to the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "hi")]
    Hindi,
    #[serde(rename = "te")]
    Telugu,
    #[serde(rename = "ta")]
    Tamil,
    #[serde(rename = "ml")]
    Malayalam,
}

impl Language {
    /// All supported languages, in menu order.
    pub const ALL: [Language; 5] = [
        Language::English,
        Language::Hindi,
        Language::Telugu,
        Language::Tamil,
        Language::Malayalam,
    ];

    /// Two-letter language code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Hindi => "hi",
            Self::Telugu => "te",
            Self::Tamil => "ta",
            Self::Malayalam => "ml",
        }
    }

    /// Name of the language in its own script.
    pub fn native_name(&self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Hindi => "हिन्दी",
            Self::Telugu => "తెలుగు",
            Self::Tamil => "தமிழ்",
            Self::Malayalam => "മലയാളം",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Self::English),
            "hi" | "hindi" => Ok(Self::Hindi),
            "te" | "telugu" => Ok(Self::Telugu),
            "ta" | "tamil" => Ok(Self::Tamil),
            "ml" | "malayalam" => Ok(Self::Malayalam),
            other => Err(format!(
                "unknown language '{}' (expected one of: en, hi, te, ta, ml)",
                other
            )),
        }
    }
}

/// Category of a catalog resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceCategory {
    Education,
    Healthcare,
    Finance,
    Agriculture,
    Government,
}

impl ResourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Education => "Education",
            Self::Healthcare => "Healthcare",
            Self::Finance => "Finance",
            Self::Agriculture => "Agriculture",
            Self::Government => "Government",
        }
    }

    /// Loose match used for free-form category text from external listings.
    ///
    /// Anything that does not mention one of the other categories is
    /// treated as a government service.
    pub fn from_loose(text: &str) -> Self {
        if text.contains("Agri") {
            Self::Agriculture
        } else if text.contains("Fin") {
            Self::Finance
        } else if text.contains("Health") {
            Self::Healthcare
        } else if text.contains("Edu") {
            Self::Education
        } else {
            Self::Government
        }
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "education" => Ok(Self::Education),
            "healthcare" | "health" => Ok(Self::Healthcare),
            "finance" => Ok(Self::Finance),
            "agriculture" => Ok(Self::Agriculture),
            "government" => Ok(Self::Government),
            other => Err(format!("unknown category '{}'", other)),
        }
    }
}
