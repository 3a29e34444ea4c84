//! Per-room admission state and its transitions.
//!
//! Everything here is pure data manipulation; locking, persistence and
//! event delivery live in `admission`.

use serde::{Deserialize, Serialize};

/// Admission record for one room. Serialized as-is into the snapshot file.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub host_identity: Option<String>,
    /// Promotion order decides host succession.
    #[serde(default)]
    pub co_hosts: Vec<String>,
    /// Arrival order, no duplicates.
    #[serde(default)]
    pub waiting: Vec<String>,
    /// Everyone ever admitted, host included.
    #[serde(default)]
    pub approved: Vec<String>,
    #[serde(default)]
    pub rejected: Vec<String>,
    /// Set when the room entry is being torn down; a task that grabbed the
    /// handle before removal must re-fetch instead of mutating a ghost.
    #[serde(skip)]
    pub deleted: bool,
}

pub enum JoinOutcome {
    /// First arrival; the caller now owns the room.
    JoinedHost,
    /// Already admitted earlier, reconnecting.
    Rejoined { is_host: bool },
    Rejected,
    Waiting { newly_added: bool },
}

pub enum Succession {
    Promoted(String),
    Deleted,
}

impl Room {
    pub fn is_host(&self, who: &str) -> bool {
        self.host_identity.as_deref() == Some(who)
    }

    pub fn is_approved(&self, who: &str) -> bool {
        self.approved.iter().any(|p| p == who)
    }

    pub fn is_rejected(&self, who: &str) -> bool {
        self.rejected.iter().any(|p| p == who)
    }

    pub fn is_waiting(&self, who: &str) -> bool {
        self.waiting.iter().any(|p| p == who)
    }

    /// Host plus co-hosts: the audience for waiting-list changes.
    pub fn moderators(&self) -> Vec<String> {
        let mut out: Vec<String> = self.host_identity.iter().cloned().collect();
        out.extend(self.co_hosts.iter().cloned());
        out
    }

    pub fn request_join(&mut self, who: &str) -> JoinOutcome {
        if self.host_identity.is_none() {
            self.host_identity = Some(who.to_owned());
            if !self.is_approved(who) {
                self.approved.push(who.to_owned());
            }
            return JoinOutcome::JoinedHost;
        }
        if self.is_host(who) || self.is_approved(who) {
            return JoinOutcome::Rejoined { is_host: self.is_host(who) };
        }
        if self.is_rejected(who) {
            return JoinOutcome::Rejected;
        }
        if self.is_waiting(who) {
            // retry before any decision was made; already queued
            return JoinOutcome::Waiting { newly_added: false };
        }
        self.waiting.push(who.to_owned());
        JoinOutcome::Waiting { newly_added: true }
    }

    /// Move `who` from waiting to approved. Returns false (no-op) when the
    /// identity is not waiting, so duplicate admits are harmless.
    pub fn admit(&mut self, who: &str) -> bool {
        let Some(pos) = self.waiting.iter().position(|p| p == who) else {
            return false;
        };
        self.waiting.remove(pos);
        if !self.is_approved(who) {
            self.approved.push(who.to_owned());
        }
        true
    }

    /// Move `who` from waiting to rejected. Rejection is terminal: there is
    /// no operation that takes an identity back out of `rejected`.
    pub fn reject(&mut self, who: &str) -> bool {
        let Some(pos) = self.waiting.iter().position(|p| p == who) else {
            return false;
        };
        self.waiting.remove(pos);
        if !self.is_rejected(who) {
            self.rejected.push(who.to_owned());
        }
        true
    }

    pub fn promote(&mut self, who: &str) -> bool {
        if self.is_host(who) || !self.is_approved(who) || self.co_hosts.iter().any(|p| p == who) {
            return false;
        }
        self.co_hosts.push(who.to_owned());
        true
    }

    pub fn demote(&mut self, who: &str) -> bool {
        let Some(pos) = self.co_hosts.iter().position(|p| p == who) else {
            return false;
        };
        self.co_hosts.remove(pos);
        true
    }

    /// Host leaves: first co-host (by promotion order) takes over, or the
    /// room dies with nobody left to run it.
    pub fn host_departed(&mut self) -> Succession {
        if self.co_hosts.is_empty() {
            return Succession::Deleted;
        }
        let next = self.co_hosts.remove(0);
        if !self.is_approved(&next) {
            self.approved.push(next.clone());
        }
        self.host_identity = Some(next.clone());
        Succession::Promoted(next)
    }
}
