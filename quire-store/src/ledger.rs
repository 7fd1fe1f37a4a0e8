//! Per-key ledger of optimistic mutations.
//!
//! Mutations on one key are kept FIFO by submission sequence. The ledger
//! decides, field by field, what a commit, a rollback or a freshly fetched
//! server value does to the visible entity, so that the last committed user
//! intent wins per field and a rollback never clobbers a later mutation.

use quire_model::{FieldOp, MergeStrategy, Patch};
use quire_types::{EntityKey, MutationId};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};

/// Lifecycle of a [`PendingMutation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    InFlight,
    Committed,
    RolledBack,
}

/// An optimistic mutation awaiting its network result.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation {
    pub id: MutationId,
    pub target_key: EntityKey,
    /// Submission order (store-wide, monotonic).
    pub seq: u64,
    pub optimistic_patch: Patch,
    /// Restores every field of `optimistic_patch`. Rewritten when an earlier
    /// mutation on the same field rolls back or the server rebases the entry.
    pub inverse_patch: Patch,
    pub status: MutationStatus,
}

/// The latest committed write of one field.
#[derive(Debug, Clone)]
struct CommittedField {
    seq: u64,
    tick: u64,
    op: FieldOp,
}

#[derive(Debug, Default)]
pub(crate) struct KeyLedger {
    pending: VecDeque<PendingMutation>,
    committed: HashMap<String, CommittedField>,
}

impl KeyLedger {
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingMutation> {
        self.pending.iter()
    }

    pub fn push(&mut self, mutation: PendingMutation) {
        self.pending.push_back(mutation);
    }

    fn take(&mut self, id: MutationId) -> Option<PendingMutation> {
        let idx = self.pending.iter().position(|m| m.id == id)?;
        self.pending.remove(idx)
    }

    /// The earliest pending mutation submitted after `seq` that writes `field`.
    fn next_writer(&mut self, seq: u64, field: &str) -> Option<&mut PendingMutation> {
        self.pending
            .iter_mut()
            .find(|m| m.seq > seq && m.optimistic_patch.contains(field))
    }

    fn committed_after(&self, seq: u64, field: &str) -> bool {
        self.committed.get(field).is_some_and(|c| c.seq > seq)
    }

    /// Removes a mutation as committed at `tick`.
    ///
    /// With a canonical `server` value and a cached `visible` value, also
    /// returns the value to store: `server` merged over `visible`, except for
    /// fields a later mutation owns. Those keep their local value, and a later
    /// pending writer restores to the server value if it fails.
    pub fn commit(
        &mut self,
        id: MutationId,
        tick: u64,
        visible: Option<&Value>,
        server: Option<&Value>,
        strategy: MergeStrategy,
    ) -> Option<(PendingMutation, Option<Value>)> {
        let mut mutation = self.take(id)?;
        mutation.status = MutationStatus::Committed;
        let server_obj = server.and_then(Value::as_object);

        for (field, op) in mutation.optimistic_patch.iter() {
            if self.committed_after(mutation.seq, field) {
                continue;
            }
            let op = match server_obj {
                Some(obj) if obj.contains_key(field) => FieldOp::restoring(obj, field),
                _ => op.clone(),
            };
            self.committed.insert(
                field.to_string(),
                CommittedField {
                    seq: mutation.seq,
                    tick,
                    op,
                },
            );
        }

        let merged = match (visible, server, server_obj) {
            (Some(visible), Some(server), Some(obj)) => {
                let seq = mutation.seq;
                let mut owned: Vec<String> = Vec::new();
                for field in obj.keys().chain(visible.as_object().into_iter().flat_map(Map::keys)) {
                    if owned.contains(field) {
                        continue;
                    }
                    if self.committed_after(seq, field) {
                        owned.push(field.clone());
                    } else if let Some(next) = self.next_writer(seq, field) {
                        next.inverse_patch
                            .insert(field.clone(), FieldOp::restoring(obj, field));
                        owned.push(field.clone());
                    }
                }
                Some(strategy.merge(visible, server, |f| owned.iter().any(|o| o == f)))
            }
            _ => None,
        };

        Some((mutation, merged))
    }

    /// Removes a mutation as rolled back. Returns it together with the
    /// restore ops that should be applied to the visible value now.
    pub fn rollback(&mut self, id: MutationId) -> Option<(PendingMutation, Patch)> {
        let mut mutation = self.take(id)?;
        mutation.status = MutationStatus::RolledBack;

        let mut restore = Patch::new();
        for (field, op) in mutation.inverse_patch.iter() {
            // A later commit owns the field.
            if self.committed_after(mutation.seq, field) {
                continue;
            }
            match self.next_writer(mutation.seq, field) {
                Some(next) => next.inverse_patch.insert(field, op.clone()),
                None => restore.insert(field, op.clone()),
            }
        }
        Some((mutation, restore))
    }

    /// Rebuilds the visible value from a server value fetched when the
    /// store-wide tick was `watermark`.
    ///
    /// Fields committed after the request was issued keep their committed
    /// value; pending patches are re-applied in submission order with their
    /// inverses recomputed against the new base.
    pub fn rebase(&mut self, server: Value, watermark: u64) -> Value {
        let mut base = server;
        if let Some(obj) = base.as_object_mut() {
            for (field, committed) in &self.committed {
                if committed.tick > watermark {
                    committed.op.apply_to(obj, field);
                }
            }
        }

        let committed = &self.committed;
        for mutation in self.pending.iter_mut() {
            let Some(obj) = base.as_object_mut() else {
                break;
            };
            let seq = mutation.seq;
            for (field, op) in mutation.optimistic_patch.iter() {
                if committed.get(field).is_some_and(|c| c.seq > seq) {
                    continue;
                }
                mutation
                    .inverse_patch
                    .insert(field, FieldOp::restoring(obj, field));
                op.apply_to(obj, field);
            }
        }
        base
    }
}
