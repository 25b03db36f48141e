use parking_lot::Mutex;

use crate::member::MemberDelta;

/// Number of times a delta is handed out before it is dropped,
/// `retransmit_mult * ceil(log10(n + 1))`.
pub fn retransmit_limit(retransmit_mult: usize, cluster_size: usize) -> usize {
    let scale = ((cluster_size + 1) as f64).log10().ceil() as usize;
    (retransmit_mult * scale).max(1)
}

/// Recency buffer of applied deltas waiting to be gossiped. A newer delta for
/// the same peer replaces the older one; fresh and rarely sent deltas go out
/// first.
#[derive(Debug)]
pub(crate) struct BroadcastQueue {
    capacity: usize,
    retransmit_mult: usize,
    state: Mutex<QueueState>,
}

#[derive(Debug, Default)]
struct QueueState {
    items: Vec<Broadcast>,
    next_id: u64,
}

#[derive(Debug)]
struct Broadcast {
    id: u64,
    transmits: usize,
    delta: MemberDelta,
}

impl BroadcastQueue {
    pub(crate) fn new(capacity: usize, retransmit_mult: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            retransmit_mult,
            state: Mutex::new(QueueState::default()),
        }
    }

    pub(crate) fn push(&self, delta: MemberDelta) {
        let mut state = self.state.lock();
        state.items.retain(|b| b.delta.name != delta.name);
        let id = state.next_id;
        state.next_id += 1;
        state.items.push(Broadcast {
            id,
            transmits: 0,
            delta,
        });
        while state.items.len() > self.capacity {
            let victim = state
                .items
                .iter()
                .enumerate()
                .max_by_key(|(_, b)| (b.transmits, std::cmp::Reverse(b.id)))
                .map(|(index, _)| index);
            match victim {
                Some(index) => {
                    state.items.swap_remove(index);
                }
                None => break,
            }
        }
    }

    /// Hands out at most `max` deltas and counts the transmission.
    pub(crate) fn take(&self, max: usize, cluster_size: usize) -> Vec<MemberDelta> {
        let limit = retransmit_limit(self.retransmit_mult, cluster_size);
        let mut state = self.state.lock();
        state
            .items
            .sort_by_key(|b| (b.transmits, std::cmp::Reverse(b.id)));
        let mut taken = Vec::with_capacity(max.min(state.items.len()));
        for broadcast in state.items.iter_mut().take(max) {
            broadcast.transmits += 1;
            taken.push(broadcast.delta.clone());
        }
        state.items.retain(|b| b.transmits < limit);
        taken
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }
}
