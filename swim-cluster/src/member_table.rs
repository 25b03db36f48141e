use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::cluster_event::{EventDispatcher, EventKind, MembershipEvent};
use crate::member::{MemberDelta, MemberStatus, PeerRecord, Tombstone};

/// The single owner of membership state. Every mutation goes through
/// [`MemberTable::propose`] under one lock; readers get an immutable snapshot
/// that is swapped after each applied change.
#[derive(Debug)]
pub struct MemberTable {
    self_name: String,
    state: Mutex<TableState>,
    snapshot: ArcSwap<Vec<PeerRecord>>,
    tombstones: ArcSwap<Vec<Tombstone>>,
    events: EventDispatcher,
}

#[derive(Debug, Default)]
struct TableState {
    members: BTreeMap<String, PeerRecord>,
    tombstones: BTreeMap<String, Tombstone>,
}

#[derive(Debug)]
struct Change {
    kind: Option<EventKind>,
    record: PeerRecord,
    delta: MemberDelta,
}

#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct ReapOutcome {
    pub reaped: Vec<String>,
    pub expired: Vec<String>,
}

impl ReapOutcome {
    pub fn is_empty(&self) -> bool {
        self.reaped.is_empty() && self.expired.is_empty()
    }
}

impl MemberTable {
    pub(crate) fn new(self_name: impl Into<String>, events: EventDispatcher) -> Self {
        Self {
            self_name: self_name.into(),
            state: Mutex::new(TableState::default()),
            snapshot: ArcSwap::from_pointee(Vec::new()),
            tombstones: ArcSwap::from_pointee(Vec::new()),
            events,
        }
    }

    pub fn self_name(&self) -> &str {
        &self.self_name
    }

    /// Inserts the local record, Alive at incarnation zero.
    pub(crate) async fn bootstrap(&self, addr: SocketAddr) -> MemberDelta {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let record = PeerRecord {
            name: self.self_name.clone(),
            addr,
            status: MemberStatus::Alive,
            incarnation: 0,
            status_changed_at: now,
            suspect_confirmations: BTreeSet::new(),
        };
        let change = Change {
            kind: Some(EventKind::Join),
            delta: record.delta(&self.self_name),
            record: record.clone(),
        };
        state.members.insert(self.self_name.clone(), record);
        self.commit(&state, change, now).await
    }

    /// Returns whether the delta changed the table.
    pub async fn propose(&self, delta: MemberDelta) -> bool {
        self.arbitrate(delta).await.is_some()
    }

    /// Applies the delta if it wins against the current record and returns
    /// what should be disseminated in its place.
    pub(crate) async fn arbitrate(&self, delta: MemberDelta) -> Option<MemberDelta> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let change = if delta.name == self.self_name {
            state.refute(&self.self_name, &delta)
        } else {
            state.apply(delta, now)
        }?;
        Some(self.commit(&state, change, now).await)
    }

    /// Applies an Alive record backed by an ack. An ack proves the peer
    /// alive, so it also clears a suspicion held at the acked incarnation,
    /// which a gossiped Alive record at that incarnation cannot do.
    pub(crate) async fn acknowledge(&self, delta: MemberDelta) -> Option<MemberDelta> {
        if delta.name == self.self_name || delta.status != MemberStatus::Alive {
            return None;
        }
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let change = state.acknowledge(delta, now)?;
        Some(self.commit(&state, change, now).await)
    }

    /// Bumps the local incarnation above `incarnation` and stays Alive.
    pub(crate) async fn refute_above(&self, incarnation: u64) -> Option<MemberDelta> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let record = state.members.get_mut(&self.self_name)?;
        if record.status != MemberStatus::Alive || record.incarnation > incarnation {
            return None;
        }
        record.incarnation = incarnation + 1;
        let change = Change {
            kind: Some(EventKind::Update),
            delta: record.delta(&self.self_name),
            record: record.clone(),
        };
        Some(self.commit(&state, change, now).await)
    }

    /// Marks the local record Left with a fresh incarnation so that it beats
    /// every record other nodes hold about us.
    pub(crate) async fn leave(&self) -> Option<MemberDelta> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let record = state.members.get_mut(&self.self_name)?;
        if record.status == MemberStatus::Left {
            return None;
        }
        record.incarnation += 1;
        record.status = MemberStatus::Left;
        record.status_changed_at = now;
        let change = Change {
            kind: Some(EventKind::Leave),
            delta: record.delta(&self.self_name),
            record: record.clone(),
        };
        Some(self.commit(&state, change, now).await)
    }

    /// Evicts Dead and Left records older than `reap_timeout`, leaving a
    /// tombstone behind, and forgets tombstones that expired.
    pub(crate) async fn reap(
        &self,
        reap_timeout: Duration,
        tombstone_timeout: Duration,
    ) -> ReapOutcome {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let mut outcome = ReapOutcome::default();
        let expired: Vec<String> = state
            .tombstones
            .values()
            .filter(|t| t.is_expired(now))
            .map(|t| t.name.clone())
            .collect();
        for name in expired {
            state.tombstones.remove(&name);
            outcome.expired.push(name);
        }
        let reapable: Vec<String> = state
            .members
            .values()
            .filter(|r| r.name != self.self_name)
            .filter(|r| r.status.is_down())
            .filter(|r| now.duration_since(r.status_changed_at) > reap_timeout)
            .map(|r| r.name.clone())
            .collect();
        for name in reapable {
            if let Some(record) = state.members.remove(&name) {
                let tombstone = Tombstone {
                    name: name.clone(),
                    incarnation: record.incarnation,
                    expires_at: now + tombstone_timeout,
                };
                state.tombstones.insert(name.clone(), tombstone);
                outcome.reaped.push(name);
            }
        }
        if !outcome.is_empty() {
            self.publish(&state);
        }
        outcome
    }

    pub fn snapshot(&self) -> Arc<Vec<PeerRecord>> {
        self.snapshot.load_full()
    }

    pub fn get(&self, name: &str) -> Option<PeerRecord> {
        self.snapshot
            .load()
            .iter()
            .find(|r| r.name == name)
            .cloned()
    }

    pub fn local(&self) -> Option<PeerRecord> {
        self.get(&self.self_name)
    }

    pub fn tombstones(&self) -> Arc<Vec<Tombstone>> {
        self.tombstones.load_full()
    }

    /// The tombstone still guarding `name`, expired ones are skipped even
    /// before the reaper drops them.
    pub fn tombstone(&self, name: &str) -> Option<Tombstone> {
        let now = Instant::now();
        self.tombstones
            .load()
            .iter()
            .find(|t| t.name == name && !t.is_expired(now))
            .cloned()
    }

    /// Alive and Suspect records, the local one included.
    pub fn live_count(&self) -> usize {
        self.snapshot
            .load()
            .iter()
            .filter(|r| !r.status.is_down())
            .count()
    }

    /// Everything we know in wire form, used for full state exchange.
    pub(crate) fn states(&self) -> Vec<MemberDelta> {
        self.snapshot
            .load()
            .iter()
            .map(|r| r.delta(&self.self_name))
            .collect()
    }

    async fn commit(&self, state: &TableState, change: Change, now: Instant) -> MemberDelta {
        self.publish(state);
        if let Some(kind) = change.kind {
            match kind {
                EventKind::Join | EventKind::Leave | EventKind::Fail => {
                    info!("{} {} {}", self.self_name, kind, change.record);
                }
                EventKind::Update => {
                    debug!("{} {} {}", self.self_name, kind, change.record);
                }
            }
            let event = MembershipEvent {
                kind,
                peer: change.record,
                observed_at: now,
            };
            self.events.dispatch(event).await;
        }
        change.delta
    }

    fn publish(&self, state: &TableState) {
        self.snapshot
            .store(Arc::new(state.members.values().cloned().collect()));
        self.tombstones
            .store(Arc::new(state.tombstones.values().cloned().collect()));
    }
}

impl TableState {
    fn apply(&mut self, delta: MemberDelta, now: Instant) -> Option<Change> {
        let Some(record) = self.members.get_mut(&delta.name) else {
            return self.admit(delta, now);
        };
        if delta.incarnation < record.incarnation {
            return None;
        }
        if delta.incarnation == record.incarnation {
            if delta.status.precedence() < record.status.precedence() {
                return None;
            }
            if delta.status == record.status {
                // another node backs the same suspicion
                return if delta.status == MemberStatus::Suspect
                    && record.suspect_confirmations.insert(delta.from.clone())
                {
                    Some(Change {
                        kind: None,
                        record: record.clone(),
                        delta,
                    })
                } else {
                    None
                };
            }
        }
        let previous = record.status;
        let status_changed = previous != delta.status;
        record.incarnation = delta.incarnation;
        record.addr = delta.addr;
        record.suspect_confirmations.clear();
        if delta.status == MemberStatus::Suspect {
            record.suspect_confirmations.insert(delta.from.clone());
        }
        if status_changed {
            record.status = delta.status;
            record.status_changed_at = now;
        }
        let kind = match (previous, delta.status) {
            (MemberStatus::Dead | MemberStatus::Left, MemberStatus::Alive) => EventKind::Join,
            (_, MemberStatus::Dead) if status_changed => EventKind::Fail,
            (_, MemberStatus::Left) if status_changed => EventKind::Leave,
            _ => EventKind::Update,
        };
        Some(Change {
            kind: Some(kind),
            record: record.clone(),
            delta,
        })
    }

    fn acknowledge(&mut self, delta: MemberDelta, now: Instant) -> Option<Change> {
        let suspected = self.members.get(&delta.name).is_some_and(|record| {
            record.status == MemberStatus::Suspect && record.incarnation == delta.incarnation
        });
        if !suspected {
            return self.apply(delta, now);
        }
        let record = self.members.get_mut(&delta.name)?;
        record.status = MemberStatus::Alive;
        record.status_changed_at = now;
        record.addr = delta.addr;
        record.suspect_confirmations.clear();
        Some(Change {
            kind: Some(EventKind::Update),
            record: record.clone(),
            delta,
        })
    }

    fn admit(&mut self, delta: MemberDelta, now: Instant) -> Option<Change> {
        if delta.status != MemberStatus::Alive {
            return None;
        }
        if let Some(tombstone) = self.tombstones.get(&delta.name) {
            // an expired tombstone no longer guards the name, reaped or not
            if !tombstone.is_expired(now) && delta.incarnation <= tombstone.incarnation {
                return None;
            }
            self.tombstones.remove(&delta.name);
        }
        let record = PeerRecord {
            name: delta.name.clone(),
            addr: delta.addr,
            status: MemberStatus::Alive,
            incarnation: delta.incarnation,
            status_changed_at: now,
            suspect_confirmations: BTreeSet::new(),
        };
        self.members.insert(delta.name.clone(), record.clone());
        Some(Change {
            kind: Some(EventKind::Join),
            record,
            delta,
        })
    }

    /// Anything other nodes claim about us at or above our incarnation,
    /// except our own Alive record, is answered with a higher incarnation.
    fn refute(&mut self, self_name: &str, delta: &MemberDelta) -> Option<Change> {
        let record = self.members.get_mut(self_name)?;
        if record.status == MemberStatus::Left || delta.incarnation < record.incarnation {
            return None;
        }
        if delta.status == MemberStatus::Alive && delta.incarnation == record.incarnation {
            return None;
        }
        record.incarnation = delta.incarnation + 1;
        Some(Change {
            kind: Some(EventKind::Update),
            delta: record.delta(self_name),
            record: record.clone(),
        })
    }
}
