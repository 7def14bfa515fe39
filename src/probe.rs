//! Host-side lifecycle probe.
//!
//! Collects pristine component snapshots reported at `init-start` and tracks
//! which components still owe a data-loaded notice after the application
//! loaded.

use crate::embed::Snapshot;
use crate::signal::PageSignal;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Which pristine state to keep when `init-start` fires more than once for
/// the same component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotPolicy {
    /// The most recent pristine state wins
    #[default]
    KeepLast,
    /// The first captured state is never replaced
    KeepFirst,
}

/// Pristine markup keyed by component identity, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    policy: SnapshotPolicy,
    order: Vec<String>,
    by_id: HashMap<String, String>,
}

impl SnapshotStore {
    pub fn new(policy: SnapshotPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    /// Store a snapshot. Returns `false` if the policy kept an earlier one.
    pub fn insert(&mut self, id: &str, markup: &str) -> bool {
        match self.by_id.get_mut(id) {
            Some(existing) => match self.policy {
                SnapshotPolicy::KeepLast => {
                    *existing = markup.to_string();
                    true
                }
                SnapshotPolicy::KeepFirst => false,
            },
            None => {
                self.order.push(id.to_string());
                self.by_id.insert(id.to_string(), markup.to_string());
                true
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.by_id.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Hand the snapshots over to the embedder.
    pub fn into_snapshots(mut self) -> Vec<Snapshot> {
        self.order
            .into_iter()
            .filter_map(|id| self.by_id.remove(&id).map(|markup| Snapshot { id, markup }))
            .collect()
    }
}

/// What a signal meant for the render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeEvent {
    Nothing,
    /// The page has no framework; nothing will ever settle
    FrameworkAbsent,
    /// The application loaded; data notices are still outstanding
    AppLoaded,
    /// Every component reported its data as settled
    Settled,
}

/// Tracks page lifecycle signals for one render.
#[derive(Debug)]
pub struct LifecycleProbe {
    store: SnapshotStore,
    app_loaded: bool,
    settled: bool,
    pending: HashSet<String>,
    failed: Vec<String>,
}

impl LifecycleProbe {
    pub fn new(policy: SnapshotPolicy) -> Self {
        Self {
            store: SnapshotStore::new(policy),
            app_loaded: false,
            settled: false,
            pending: HashSet::new(),
            failed: Vec::new(),
        }
    }

    pub fn handle(&mut self, signal: &PageSignal) -> ProbeEvent {
        match signal {
            PageSignal::NoFramework if !self.app_loaded => ProbeEvent::FrameworkAbsent,
            PageSignal::InitStart { id, markup } => {
                if !self.store.insert(id, markup) {
                    debug!("Kept earlier snapshot for component {}", id);
                }
                ProbeEvent::Nothing
            }
            PageSignal::AppLoaded { ids } => {
                if self.app_loaded {
                    return ProbeEvent::Nothing;
                }
                self.app_loaded = true;
                self.pending = ids.iter().cloned().collect();
                debug!("Application loaded with {} component(s)", self.pending.len());
                self.settle_if_done()
            }
            PageSignal::DataLoaded { id, ok, error } => {
                if !self.pending.remove(id) {
                    return ProbeEvent::Nothing;
                }
                if !ok {
                    warn!(
                        "Component {} failed to load data ({}); treating it as settled",
                        id,
                        error.as_deref().unwrap_or("unknown error")
                    );
                    self.failed.push(id.clone());
                }
                self.settle_if_done()
            }
            _ => ProbeEvent::Nothing,
        }
    }

    fn settle_if_done(&mut self) -> ProbeEvent {
        if self.pending.is_empty() && !self.settled {
            self.settled = true;
            ProbeEvent::Settled
        } else if self.settled {
            ProbeEvent::Nothing
        } else {
            ProbeEvent::AppLoaded
        }
    }

    pub fn is_app_loaded(&self) -> bool {
        self.app_loaded
    }

    /// Components whose data notice rejected.
    pub fn failed_components(&self) -> &[String] {
        &self.failed
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn into_store(self) -> SnapshotStore {
        self.store
    }
}
