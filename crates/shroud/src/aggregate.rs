//! root-side reply aggregation
//!
//! with N nodes the protocol tolerates f = ⌊(N-1)/3⌋ faulty members and
//! needs T = N - f ciphertexts. once more than N - T replies are refusals the
//! run can no longer succeed and is decided early.

use tracing::debug;

use crate::codec::Ciphertext;
use crate::group::Group;
use crate::message::ReencryptReply;

/// f = ⌊(N-1)/3⌋
pub fn fault_tolerance(roster_size: usize) -> usize {
    roster_size.saturating_sub(1) / 3
}

/// T = N - f
pub fn threshold(roster_size: usize) -> usize {
    roster_size - fault_tolerance(roster_size)
}

/// decision reached by the aggregator
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome<G: Group> {
    /// T ciphertexts collected; entry i holds node i's reencryption
    Quorum(Vec<Option<Ciphertext<G>>>),
    /// more refusals than the roster can absorb
    InsufficientReplies { failures: usize, tolerated: usize },
}

pub struct Aggregator<G: Group> {
    roster_size: usize,
    threshold: usize,
    failures: usize,
    replies: Vec<ReencryptReply<G>>,
    seen: Vec<bool>,
    decided: bool,
}

impl<G: Group> Aggregator<G> {
    pub fn new(roster_size: usize) -> Self {
        Self {
            roster_size,
            threshold: threshold(roster_size),
            failures: 0,
            replies: Vec::with_capacity(roster_size),
            seen: vec![false; roster_size],
            decided: false,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    /// ciphertext-carrying replies collected so far
    pub fn collected(&self) -> usize {
        self.replies.len()
    }

    pub fn is_decided(&self) -> bool {
        self.decided
    }

    /// fold in one reply received from roster member `from`; returns the
    /// decision the first time one is reached.
    ///
    /// a reply counts only for the node that sent it: replies claiming
    /// another node's index are dropped.
    pub fn add(&mut self, from: usize, reply: ReencryptReply<G>) -> Option<Outcome<G>> {
        if self.decided {
            return None;
        }

        if reply.index as usize != from {
            debug!(from, claimed = reply.index, "reply for another node's index dropped");
            return None;
        }
        match self.seen.get_mut(from) {
            Some(seen) if !*seen => *seen = true,
            Some(_) => {
                debug!(from, "duplicate reply ignored");
                return None;
            }
            None => {
                debug!(from, roster = self.roster_size, "reply index out of range");
                return None;
            }
        }

        if reply.is_refusal() {
            self.failures += 1;
            let tolerated = self.roster_size - self.threshold;
            debug!(from, failures = self.failures, tolerated, "refusal");
            if self.failures > tolerated {
                self.decided = true;
                return Some(Outcome::InsufficientReplies {
                    failures: self.failures,
                    tolerated,
                });
            }
            return None;
        }

        self.replies.push(reply);
        if self.replies.len() < self.threshold {
            return None;
        }

        self.decided = true;
        let mut reencryptions = vec![None; self.roster_size];
        for reply in self.replies.drain(..) {
            reencryptions[reply.index as usize] = reply.ciphertext;
        }
        Some(Outcome::Quorum(reencryptions))
    }
}
