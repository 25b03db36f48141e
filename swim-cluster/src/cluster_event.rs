use std::fmt::{Display, Formatter};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::trace;

use crate::member::PeerRecord;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum EventKind {
    Join,
    Leave,
    Fail,
    Update,
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            EventKind::Join => "member-join",
            EventKind::Leave => "member-leave",
            EventKind::Fail => "member-failed",
            EventKind::Update => "member-update",
        };
        write!(f, "{}", kind)
    }
}

/// A transition applied to the local member table. `peer` is the record as
/// it looked right after the transition.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MembershipEvent {
    pub kind: EventKind,
    pub peer: PeerRecord,
    pub observed_at: Instant,
}

impl Display for MembershipEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.peer)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct EventDispatcher {
    tx: mpsc::Sender<MembershipEvent>,
}

impl EventDispatcher {
    pub(crate) fn new(buffer: usize) -> (Self, MembershipEvents) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, MembershipEvents { rx })
    }

    /// Waits for room in the queue, a dropped consumer discards the event.
    pub(crate) async fn dispatch(&self, event: MembershipEvent) {
        if let Err(error) = self.tx.send(event).await {
            trace!("event consumer gone, drop {}", error.0);
        }
    }
}

/// Ordered membership events of one node, in the order the table applied them.
#[derive(Debug)]
pub struct MembershipEvents {
    rx: mpsc::Receiver<MembershipEvent>,
}

impl MembershipEvents {
    pub async fn recv(&mut self) -> Option<MembershipEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<MembershipEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for MembershipEvents {
    type Item = MembershipEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::net::SocketAddr;

    use futures::StreamExt;
    use tokio::time::Instant;

    use crate::cluster_event::{EventDispatcher, EventKind, MembershipEvent};
    use crate::member::{MemberStatus, PeerRecord};

    fn event(kind: EventKind, name: &str) -> MembershipEvent {
        MembershipEvent {
            kind,
            peer: PeerRecord {
                name: name.to_string(),
                addr: SocketAddr::from(([10, 0, 0, 1], 7946)),
                status: MemberStatus::Alive,
                incarnation: 0,
                status_changed_at: Instant::now(),
                suspect_confirmations: BTreeSet::new(),
            },
            observed_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn events_keep_production_order() {
        let (dispatcher, mut events) = EventDispatcher::new(8);
        dispatcher.dispatch(event(EventKind::Join, "a")).await;
        dispatcher.dispatch(event(EventKind::Update, "a")).await;
        dispatcher.dispatch(event(EventKind::Fail, "a")).await;
        drop(dispatcher);
        let kinds: Vec<_> = (&mut events).map(|e| e.kind).collect().await;
        assert_eq!(kinds, vec![EventKind::Join, EventKind::Update, EventKind::Fail]);
    }

    #[tokio::test]
    async fn full_queue_waits_for_the_consumer() {
        let (dispatcher, mut events) = EventDispatcher::new(1);
        let producer = tokio::spawn(async move {
            for name in ["a", "b", "c"] {
                dispatcher.dispatch(event(EventKind::Join, name)).await;
            }
        });
        let mut names = Vec::new();
        while let Some(event) = events.recv().await {
            names.push(event.peer.name);
        }
        producer.await.unwrap();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn dispatch_after_consumer_dropped_does_not_block() {
        let (dispatcher, events) = EventDispatcher::new(1);
        drop(events);
        dispatcher.dispatch(event(EventKind::Join, "a")).await;
        dispatcher.dispatch(event(EventKind::Join, "b")).await;
    }
}
