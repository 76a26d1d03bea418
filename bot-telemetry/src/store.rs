//! View model store: the single shared mutable structure of the console.
//!
//! Snapshots are addressed by [`ScopeKey`]. Switching scope never evicts
//! another scope's snapshot, so tab switches render cached data immediately.
//!
//! Scheduler-driven results are applied through [`Ticket`]s. Every source has
//! one active (scope, epoch); rescoping or stopping a source bumps the epoch,
//! and any ticket issued before that is discarded on arrival.

use crate::error::FetchError;
use crate::source::{FetchResult, Outcome, Payload};
use crate::types::ScopeKey;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};

/// Identifier of a polled source (usually the widget that owns it).
pub type SourceId = String;

/// Display state of one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotStatus {
    /// No fetch has completed yet.
    #[default]
    Loading,
    /// Last fetch succeeded with data.
    Ready,
    /// Last fetch succeeded with zero records.
    Empty,
    /// Last fetch failed; the snapshot is the last known good one (or the safe
    /// default if nothing ever succeeded).
    Stale,
}

/// One addressable snapshot plus its freshness metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub payload: Payload,
    pub status: SlotStatus,
    pub last_error: Option<FetchError>,
    /// Time of the last success or empty result.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Slot {
    fn loading(key: &ScopeKey) -> Self {
        Self {
            payload: Payload::empty(key.kind),
            status: SlotStatus::Loading,
            last_error: None,
            updated_at: None,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.status == SlotStatus::Stale
    }
}

/// Proof that a response belongs to the scope a source was fetching for when
/// the request started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub source: SourceId,
    pub key: ScopeKey,
    epoch: u64,
}

/// What happened to an applied result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Snapshot replaced (success or empty).
    Replaced,
    /// Error recorded, previous snapshot kept.
    Retained,
    /// Ticket no longer current; nothing changed.
    Discarded,
}

#[derive(Debug, Clone)]
struct ActiveScope {
    key: ScopeKey,
    epoch: u64,
}

#[derive(Debug, Default)]
struct StoreInner {
    slots: HashMap<ScopeKey, Slot>,
    active: HashMap<SourceId, ActiveScope>,
    next_epoch: u64,
    revision: u64,
}

/// Latest normalized snapshot per (kind, scope).
#[derive(Debug, Default)]
pub struct ViewStore {
    inner: RwLock<StoreInner>,
}

impl ViewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest snapshot for `key`; unseen keys read as `Loading` with the
    /// kind's safe default payload.
    pub fn get(&self, key: &ScopeKey) -> Slot {
        self.inner
            .read()
            .slots
            .get(key)
            .cloned()
            .unwrap_or_else(|| Slot::loading(key))
    }

    /// Snapshot the given source is currently scoped to.
    pub fn get_active(&self, source: &str) -> Option<Slot> {
        let key = self.inner.read().active.get(source)?.key.clone();
        Some(self.get(&key))
    }

    /// Incremented on every change, for cheap "anything new?" checks.
    pub fn revision(&self) -> u64 {
        self.inner.read().revision
    }

    /// Apply a result to `key` unconditionally.
    pub fn apply(&self, key: &ScopeKey, result: FetchResult) -> ApplyOutcome {
        let mut inner = self.inner.write();
        apply_locked(&mut inner, key, result)
    }

    /// Point `source` at `key`, invalidating every ticket issued for it so far.
    pub fn activate(&self, source: &str, key: ScopeKey) -> Ticket {
        let mut inner = self.inner.write();
        inner.next_epoch += 1;
        let epoch = inner.next_epoch;

        debug!(source, key = %key, epoch, "activating scope");
        inner.active.insert(
            source.to_string(),
            ActiveScope {
                key: key.clone(),
                epoch,
            },
        );

        Ticket {
            source: source.to_string(),
            key,
            epoch,
        }
    }

    /// Current ticket for `source`, if it is active.
    pub fn ticket(&self, source: &str) -> Option<Ticket> {
        let inner = self.inner.read();
        inner.active.get(source).map(|active| Ticket {
            source: source.to_string(),
            key: active.key.clone(),
            epoch: active.epoch,
        })
    }

    /// Stop accepting results for `source`. Cached snapshots are kept.
    pub fn deactivate(&self, source: &str) {
        if self.inner.write().active.remove(source).is_some() {
            info!(source, "source deactivated");
        }
    }

    /// Apply a result only if `ticket` still matches the source's active scope.
    pub fn apply_ticketed(&self, ticket: &Ticket, result: FetchResult) -> ApplyOutcome {
        let mut inner = self.inner.write();

        let current = inner
            .active
            .get(&ticket.source)
            .is_some_and(|active| active.epoch == ticket.epoch && active.key == ticket.key);

        if !current {
            debug!(
                source = %ticket.source,
                key = %ticket.key,
                "discarding response for superseded scope"
            );
            return ApplyOutcome::Discarded;
        }

        apply_locked(&mut inner, &ticket.key, result)
    }
}

fn apply_locked(inner: &mut StoreInner, key: &ScopeKey, result: FetchResult) -> ApplyOutcome {
    let FetchResult { outcome, payload } = result;

    let outcome = match outcome {
        Outcome::Success | Outcome::Empty => {
            let status = if matches!(outcome, Outcome::Success) {
                SlotStatus::Ready
            } else {
                SlotStatus::Empty
            };
            inner.slots.insert(
                key.clone(),
                Slot {
                    payload,
                    status,
                    last_error: None,
                    updated_at: Some(Utc::now()),
                },
            );
            ApplyOutcome::Replaced
        }
        Outcome::Error(error) => {
            let slot = inner
                .slots
                .entry(key.clone())
                .or_insert_with(|| Slot::loading(key));
            slot.status = SlotStatus::Stale;
            slot.last_error = Some(error);
            ApplyOutcome::Retained
        }
    };

    inner.revision += 1;
    outcome
}
