// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Explicit registry of active shippers for process-wide error broadcasting.
//!
//! Registration and unregistration are explicit methods on an object the
//! caller owns, rather than an implicit module-level list, so lifecycle is
//! visible and testable. The panic hook is the process-level analog of a
//! browser uncaught-error handler fed from such a registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{json, Map, Value};

use crate::event::LogLevel;
use crate::shipper::Shipper;

/// Identifies one registration, for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationId(u64);

#[derive(Default)]
pub struct ShipperRegistry {
    shippers: Mutex<Vec<(u64, Shipper)>>,
    next_id: AtomicU64,
}

impl ShipperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, shipper: Shipper) -> RegistrationId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, shipper));
        RegistrationId(id)
    }

    /// Remove a shipper; returns false when the id was already gone.
    pub fn unregister(&self, id: RegistrationId) -> bool {
        let mut shippers = self.lock();
        let before = shippers.len();
        shippers.retain(|(entry_id, _)| *entry_id != id.0);
        shippers.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Fan a fatal event out to every registered shipper.
    pub fn broadcast_fatal(&self, message: &str, fields: Option<Map<String, Value>>) {
        for (_, shipper) in self.lock().iter() {
            shipper.log(LogLevel::Fatal, message, fields.clone());
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Shipper)>> {
        self.shippers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Install a panic hook that broadcasts every panic to the registry before
/// delegating to the previously installed hook.
pub fn install_panic_hook(registry: Arc<ShipperRegistry>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let message = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic with non-string payload".to_string());

        let mut fields = Map::new();
        if let Some(location) = info.location() {
            fields.insert("location".to_string(), json!(location.to_string()));
        }
        registry.broadcast_fatal(&message, Some(fields));

        previous(info);
    }));
}
