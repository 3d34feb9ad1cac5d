// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Resource owners: a stack of cleanup scopes
//!
//! The session pushes one owner per transaction nesting level. Subsystems
//! that hold resources (open remote handles) register a release callback
//! once; when a scope ends, every callback runs for each release phase with
//! the owner being released.

use crate::lock;
use diagnostics::log_debug;
use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceOwnerId(u64);

impl fmt::Display for ResourceOwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleasePhase {
    BeforeLocks,
    Locks,
    AfterLocks,
}

impl ReleasePhase {
    pub const ALL: [ReleasePhase; 3] = [
        ReleasePhase::BeforeLocks,
        ReleasePhase::Locks,
        ReleasePhase::AfterLocks,
    ];
}

/// What a release callback is told about the scope being released
#[derive(Debug, Clone, Copy)]
pub struct ReleaseContext {
    pub phase: ReleasePhase,
    pub owner: ResourceOwnerId,
    pub is_commit: bool,
    pub is_top_level: bool,
}

pub type ReleaseCallback = Arc<dyn Fn(&ReleaseContext) + Send + Sync>;

struct Scope {
    id: ResourceOwnerId,
    name: String,
}

#[derive(Default)]
struct OwnerState {
    stack: Vec<Scope>,
    next_id: u64,
    callbacks: Vec<ReleaseCallback>,
}

/// Per-session resource owner stack
#[derive(Clone, Default)]
pub struct ResourceOwners {
    state: Arc<Mutex<OwnerState>>,
}

impl ResourceOwners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new scope; it becomes the current owner
    pub fn push(&self, name: &str) -> ResourceOwnerId {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let id = ResourceOwnerId(state.next_id);
        state.stack.push(Scope {
            id,
            name: name.to_string(),
        });
        id
    }

    #[must_use]
    pub fn current(&self) -> Option<ResourceOwnerId> {
        lock(&self.state).stack.last().map(|scope| scope.id)
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        lock(&self.state).stack.len()
    }

    pub fn register_release_callback(&self, callback: ReleaseCallback) {
        lock(&self.state).callbacks.push(callback);
    }

    #[must_use]
    pub fn callback_count(&self) -> usize {
        lock(&self.state).callbacks.len()
    }

    /// Run every release callback for `owner`, phase by phase, then close the
    /// scope (and any scope still open above it).
    pub fn release(&self, owner: ResourceOwnerId, is_commit: bool, is_top_level: bool) {
        // Callbacks run without the lock held so they may query the stack.
        let (callbacks, name) = {
            let state = lock(&self.state);
            let name = state
                .stack
                .iter()
                .find(|scope| scope.id == owner)
                .map(|scope| scope.name.clone())
                .unwrap_or_default();
            (state.callbacks.clone(), name)
        };

        log_debug!("Releasing resource owner {owner} ({name}), commit={is_commit}",
                   owner: owner.to_string(), name: name, is_commit: is_commit);

        for phase in ReleasePhase::ALL {
            let ctx = ReleaseContext {
                phase,
                owner,
                is_commit,
                is_top_level,
            };
            for callback in &callbacks {
                callback(&ctx);
            }
        }

        let mut state = lock(&self.state);
        if let Some(pos) = state.stack.iter().position(|scope| scope.id == owner) {
            state.stack.truncate(pos);
        }
    }
}

impl fmt::Debug for ResourceOwners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("ResourceOwners")
            .field("depth", &state.stack.len())
            .field("callbacks", &state.callbacks.len())
            .finish()
    }
}
