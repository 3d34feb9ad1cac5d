// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Catalog change notifications for caches that live in this crate

use crate::lock;
use crate::types::Oid;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationEvent {
    /// Some tablespace row changed
    Tablespace,
    /// A user mapping changed; `None` means every mapping
    UserMapping(Option<Oid>),
}

pub type Subscriber = Arc<dyn Fn(&InvalidationEvent) + Send + Sync>;

/// Synchronous fan-out of catalog invalidations
#[derive(Clone, Default)]
pub struct InvalidationBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl InvalidationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: Subscriber) {
        lock(&self.subscribers).push(subscriber);
    }

    /// Deliver `event` to every subscriber before returning
    pub fn publish(&self, event: &InvalidationEvent) {
        let subscribers = lock(&self.subscribers).clone();
        for subscriber in &subscribers {
            subscriber(event);
        }
    }
}

impl std::fmt::Debug for InvalidationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationBus")
            .field("subscribers", &lock(&self.subscribers).len())
            .finish()
    }
}
