//! in-process roster for tests and simulations
//!
//! every node gets an unbounded mailbox. messages pass through the wire codec
//! on the way so the in-memory path exercises the same bytes a socket would.
//! nodes can be paused (messages to and from them vanish) or disconnected
//! (sends to them fail).
//!
//! transports only hold a weak reference to the roster, so dropping every
//! [`LocalNetwork`] handle closes all mailboxes and ends the `serve` loops.

use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::group::Group;
use crate::message::{self, Message};
use crate::protocol::Reencrypt;
use crate::transport::{Topology, Transport};
use crate::{Error, Result};

/// (sender index, encoded message)
pub type Envelope = (usize, Vec<u8>);
pub type Mailbox = mpsc::UnboundedReceiver<Envelope>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Link {
    Up,
    Paused,
    Disconnected,
}

struct Inner {
    mailboxes: Vec<mpsc::UnboundedSender<Envelope>>,
    links: RwLock<Vec<Link>>,
}

impl Inner {
    fn link(&self, node: usize) -> Option<Link> {
        self.links.read().get(node).copied()
    }
}

/// shared handle to an in-memory roster
pub struct LocalNetwork<G: Group> {
    inner: Arc<Inner>,
    _group: PhantomData<G>,
}

impl<G: Group> Clone for LocalNetwork<G> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _group: PhantomData,
        }
    }
}

impl<G: Group> LocalNetwork<G> {
    /// roster of `roster_size` nodes; mailbox i belongs to node i
    pub fn new(roster_size: usize) -> (Self, Vec<Mailbox>) {
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..roster_size).map(|_| mpsc::unbounded_channel()).unzip();
        let network = Self {
            inner: Arc::new(Inner {
                mailboxes: senders,
                links: RwLock::new(vec![Link::Up; roster_size]),
            }),
            _group: PhantomData,
        };
        (network, receivers)
    }

    pub fn roster_size(&self) -> usize {
        self.inner.mailboxes.len()
    }

    /// node `index`'s view of a star rooted at `root`
    pub fn transport(&self, root: usize, index: usize) -> LocalTransport<G> {
        LocalTransport {
            network: Arc::downgrade(&self.inner),
            _group: PhantomData,
            topology: Topology::star(root, index, self.roster_size()),
        }
    }

    /// crash a node: everything it sends or receives is dropped
    pub fn pause(&self, node: usize) {
        self.set_link(node, Link::Paused);
    }

    /// make sends to a node fail
    pub fn disconnect(&self, node: usize) {
        self.set_link(node, Link::Disconnected);
    }

    pub fn resume(&self, node: usize) {
        self.set_link(node, Link::Up);
    }

    fn set_link(&self, node: usize, link: Link) {
        if let Some(slot) = self.inner.links.write().get_mut(node) {
            debug!(node, ?link, "link changed");
            *slot = link;
        }
    }
}

/// one node's handle onto a [`LocalNetwork`]
pub struct LocalTransport<G: Group> {
    network: Weak<Inner>,
    _group: PhantomData<G>,
    topology: Topology,
}

impl<G: Group> Transport<G> for LocalTransport<G> {
    fn topology(&self) -> &Topology {
        &self.topology
    }

    fn send_to(&self, to: usize, message: Message<G>) -> Result<()> {
        let network = self
            .network
            .upgrade()
            .ok_or_else(|| Error::Transport("network shut down".into()))?;
        let from = self.topology.index;

        let target = network
            .mailboxes
            .get(to)
            .ok_or_else(|| Error::Transport(format!("node {to} not in roster")))?;

        match (network.link(from), network.link(to)) {
            (_, Some(Link::Disconnected)) => {
                return Err(Error::Transport(format!("node {to} disconnected")));
            }
            (Some(Link::Paused), _) | (_, Some(Link::Paused)) => {
                debug!(from, to, "dropped by paused link");
                return Ok(());
            }
            _ => {}
        }

        let bytes = message::encode(&message)?;
        target
            .send((from, bytes))
            .map_err(|_| Error::Transport(format!("mailbox of node {to} closed")))
    }
}

/// feed a node's mailbox into its protocol instance until every
/// [`LocalNetwork`] handle is dropped
pub async fn serve<G, T>(protocol: Arc<Reencrypt<G, T>>, mut mailbox: Mailbox)
where
    G: Group,
    T: Transport<G>,
{
    while let Some((from, bytes)) = mailbox.recv().await {
        match message::decode::<G>(&bytes) {
            Ok(message) => {
                if let Err(e) = protocol.dispatch(from, message) {
                    debug!(index = protocol.index(), from, error = %e, "dispatch failed");
                }
            }
            Err(e) => warn!(index = protocol.index(), from, error = %e, "undecodable message"),
        }
    }
}
