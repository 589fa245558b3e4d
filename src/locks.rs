// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Lock helpers that recover from poisoning.
//!
//! A panic while a guard is held poisons the lock. These helpers log the
//! event and hand out the guard anyway.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Acquire a read lock, recovering from poisoning if necessary.
pub fn resilient_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        tracing::error!(
            target: "grameen::locks",
            event = "LOCK_POISONED_READ",
            "RwLock was poisoned during read acquisition, recovering data"
        );
        poisoned.into_inner()
    })
}

/// Acquire a write lock, recovering from poisoning if necessary.
pub fn resilient_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        tracing::error!(
            target: "grameen::locks",
            event = "LOCK_POISONED_WRITE",
            "RwLock was poisoned during write acquisition, recovering data"
        );
        poisoned.into_inner()
    })
}
