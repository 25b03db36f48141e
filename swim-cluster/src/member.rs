use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::net::SocketAddr;

use bincode::{Decode, Encode};
use tokio::time::Instant;

pub const MAX_NAME_LEN: usize = 128;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Encode, Decode)]
pub enum MemberStatus {
    Alive,
    Suspect,
    Dead,
    Left,
}

impl MemberStatus {
    /// Which status wins when two records carry the same incarnation.
    pub(crate) fn precedence(&self) -> u8 {
        match self {
            MemberStatus::Alive => 0,
            MemberStatus::Suspect => 1,
            MemberStatus::Dead => 2,
            MemberStatus::Left => 3,
        }
    }

    pub fn is_down(&self) -> bool {
        matches!(self, MemberStatus::Dead | MemberStatus::Left)
    }
}

impl Display for MemberStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            MemberStatus::Alive => "alive",
            MemberStatus::Suspect => "suspect",
            MemberStatus::Dead => "dead",
            MemberStatus::Left => "left",
        };
        write!(f, "{}", status)
    }
}

/// What this node currently believes about one peer.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PeerRecord {
    pub name: String,
    pub addr: SocketAddr,
    pub status: MemberStatus,
    /// Only the peer itself ever increases it, other nodes just carry it along.
    pub incarnation: u64,
    pub status_changed_at: Instant,
    /// Names of the nodes that reported the current suspicion, empty unless
    /// the status is [`MemberStatus::Suspect`].
    pub suspect_confirmations: BTreeSet<String>,
}

impl PeerRecord {
    pub fn is_alive(&self) -> bool {
        self.status == MemberStatus::Alive
    }

    pub(crate) fn delta(&self, from: &str) -> MemberDelta {
        MemberDelta {
            name: self.name.clone(),
            addr: self.addr,
            status: self.status,
            incarnation: self.incarnation,
            from: from.to_string(),
        }
    }
}

impl Display for PeerRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{} {} #{}",
            self.name, self.addr, self.status, self.incarnation
        )
    }
}

/// A proposed state of one peer as it travels between nodes. `from` names the
/// node that produced it and counts as a confirmation for suspicions.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Encode, Decode)]
pub struct MemberDelta {
    pub name: String,
    pub addr: SocketAddr,
    pub status: MemberStatus,
    pub incarnation: u64,
    pub from: String,
}

impl MemberDelta {
    pub fn new(
        name: impl Into<String>,
        addr: SocketAddr,
        status: MemberStatus,
        incarnation: u64,
        from: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            addr,
            status,
            incarnation,
            from: from.into(),
        }
    }

    pub fn is_well_formed(&self) -> bool {
        is_valid_name(&self.name) && is_valid_name(&self.from)
    }
}

impl Display for MemberDelta {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{} {} #{} from {}",
            self.name, self.addr, self.status, self.incarnation, self.from
        )
    }
}

/// Remembers an evicted peer so that stale gossip cannot bring it back.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Tombstone {
    pub name: String,
    pub incarnation: u64,
    pub expires_at: Instant,
}

impl Tombstone {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}
