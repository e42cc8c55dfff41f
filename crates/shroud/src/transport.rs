//! tree overlay and the transport capability the protocol sends through

use tracing::warn;

use crate::group::Group;
use crate::message::Message;
use crate::{Error, Result};

/// this node's position in the communication tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topology {
    /// own roster index (also the share index)
    pub index: usize,
    /// None at the root
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// N
    pub roster_size: usize,
}

impl Topology {
    /// flat tree: `root` has every other roster member as a direct child
    pub fn star(root: usize, index: usize, roster_size: usize) -> Self {
        if index == root {
            Self {
                index,
                parent: None,
                children: (0..roster_size).filter(|&i| i != root).collect(),
                roster_size,
            }
        } else {
            Self {
                index,
                parent: Some(root),
                children: Vec::new(),
                roster_size,
            }
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// message delivery between roster members
///
/// `send_to` only enqueues; delivery happens asynchronously and in any order.
pub trait Transport<G: Group>: Send + Sync {
    fn topology(&self) -> &Topology;

    fn send_to(&self, node: usize, message: Message<G>) -> Result<()>;

    fn send_to_parent(&self, message: Message<G>) -> Result<()> {
        match self.topology().parent {
            Some(parent) => self.send_to(parent, message),
            None => Err(Error::Transport("root has no parent".into())),
        }
    }

    /// send to every roster member except this node, returning the failed sends
    fn broadcast(&self, message: Message<G>) -> Vec<(usize, Error)> {
        let own = self.topology().index;
        let mut failed = Vec::new();
        for node in (0..self.topology().roster_size).filter(|&i| i != own) {
            if let Err(e) = self.send_to(node, message.clone()) {
                warn!(node, error = %e, "send failed");
                failed.push((node, e));
            }
        }
        failed
    }
}
