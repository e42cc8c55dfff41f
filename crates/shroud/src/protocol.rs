//! reencryption protocol coordinator
//!
//! the root verifies and encodes its own share, arms the timeout and
//! broadcasts the request. every other node verifies, fetches its share,
//! reencrypts it to the requester's ephemeral key and replies to its parent.
//! the root aggregates replies until T ciphertexts arrive, too many nodes
//! refuse, or the deadline passes. the result is a single bool delivered on
//! the receiver returned from [`Reencrypt::new`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::aggregate::{self, Aggregator, Outcome};
use crate::codec::{self, Ciphertext};
use crate::config::ProtocolConfig;
use crate::group::Group;
use crate::latch::Latch;
use crate::message::{Message, ReencryptReply, ReencryptRequest};
use crate::share::{Share, ShareSource};
use crate::timeout::TimeoutGuard;
use crate::transport::Transport;
use crate::{Error, Result};

/// decides whether a request may receive this node's share
pub trait Verifier<G: Group>: Send + Sync {
    fn verify(&self, request: &ReencryptRequest<G>) -> bool;
}

impl<G, F> Verifier<G> for F
where
    G: Group,
    F: Fn(&ReencryptRequest<G>) -> bool + Send + Sync,
{
    fn verify(&self, request: &ReencryptRequest<G>) -> bool {
        self(request)
    }
}

/// why a run finished
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// threshold of ciphertexts collected
    Quorum,
    /// more refusals than tolerated
    InsufficientReplies,
    /// deadline passed before a decision
    Timeout,
    /// root failed before or while broadcasting
    Aborted,
}

impl Termination {
    pub fn is_success(&self) -> bool {
        matches!(self, Termination::Quorum)
    }
}

/// state the timer task shares with the coordinator
struct Completion<G: Group> {
    latch: Latch,
    termination: Mutex<Option<Termination>>,
    reencryptions: Mutex<Option<Vec<Option<Ciphertext<G>>>>>,
}

impl<G: Group> Completion<G> {
    fn finish(
        &self,
        termination: Termination,
        reencryptions: Option<Vec<Option<Ciphertext<G>>>>,
    ) -> bool {
        if !self.latch.claim() {
            debug!(?termination, "already finished");
            return false;
        }
        // results are in place before the receiver wakes
        if let Some(entries) = reencryptions {
            *self.reencryptions.lock() = Some(entries);
        }
        *self.termination.lock() = Some(termination);
        self.latch.deliver(termination.is_success());
        true
    }
}

/// one protocol run on one node
pub struct Reencrypt<G: Group, T: Transport<G>> {
    transport: T,
    config: ProtocolConfig,
    share: Option<Share>,
    share_source: Option<Box<dyn ShareSource>>,
    verifier: Option<Box<dyn Verifier<G>>>,
    aggregator: Mutex<Aggregator<G>>,
    replied: AtomicBool,
    completion: Arc<Completion<G>>,
    timeout: TimeoutGuard,
}

impl<G: Group, T: Transport<G>> Reencrypt<G, T> {
    pub fn new(transport: T, config: ProtocolConfig) -> (Self, oneshot::Receiver<bool>) {
        let (latch, done) = Latch::new();
        let roster_size = transport.topology().roster_size;
        let protocol = Self {
            transport,
            config,
            share: None,
            share_source: None,
            verifier: None,
            aggregator: Mutex::new(Aggregator::new(roster_size)),
            replied: AtomicBool::new(false),
            completion: Arc::new(Completion {
                latch,
                termination: Mutex::new(None),
                reencryptions: Mutex::new(None),
            }),
            timeout: TimeoutGuard::new(),
        };
        (protocol, done)
    }

    /// fixed local share, used when no share source is set
    pub fn with_share(mut self, share: Share) -> Self {
        self.share = Some(share);
        self
    }

    /// look the share up per request instead
    pub fn with_share_source(mut self, source: impl ShareSource + 'static) -> Self {
        self.share_source = Some(Box::new(source));
        self
    }

    pub fn with_verifier(mut self, verifier: impl Verifier<G> + 'static) -> Self {
        self.verifier = Some(Box::new(verifier));
        self
    }

    pub fn index(&self) -> usize {
        self.transport.topology().index
    }

    pub fn roster_size(&self) -> usize {
        self.transport.topology().roster_size
    }

    pub fn threshold(&self) -> usize {
        aggregate::threshold(self.roster_size())
    }

    pub fn fault_tolerance(&self) -> usize {
        aggregate::fault_tolerance(self.roster_size())
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// sparse by share index; only populated after a successful run
    pub fn reencryptions(&self) -> Option<Vec<Option<Ciphertext<G>>>> {
        self.completion.reencryptions.lock().clone()
    }

    pub fn termination(&self) -> Option<Termination> {
        *self.completion.termination.lock()
    }

    pub fn is_finished(&self) -> bool {
        self.completion.latch.is_fired()
    }

    /// start a run at the root.
    ///
    /// local failures abort the run before anything is sent. more failed
    /// sends than f aborts with [`Error::BroadcastFailure`]. both also signal
    /// false on the completion receiver.
    pub fn start(
        &self,
        ephemeral_public_key: G::Point,
        verification_data: Option<Vec<u8>>,
    ) -> Result<()> {
        if !self.transport.topology().is_root() {
            return Err(Error::NotRoot);
        }
        // one run per instance
        if self.replied.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyStarted);
        }

        let request = ReencryptRequest {
            ephemeral_public_key,
            verification_data,
        };
        info!(
            index = self.index(),
            roster = self.roster_size(),
            threshold = self.threshold(),
            "starting reencryption"
        );

        let own = match self.local_reply(&request) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "root cannot contribute, aborting");
                self.finish(Termination::Aborted, None);
                return Err(e);
            }
        };
        // decided only when the root alone meets the threshold
        let early = self.aggregator.lock().add(self.index(), own);

        let completion = self.completion.clone();
        let deadline = self.config.timeout;
        if let Err(e) = self.timeout.arm(deadline, move || {
            warn!(error = %Error::Timeout, ?deadline, "deadline passed");
            completion.finish(Termination::Timeout, None);
        }) {
            self.finish(Termination::Aborted, None);
            return Err(e);
        }

        let failed = self.transport.broadcast(Message::Request(request));
        let tolerated = self.fault_tolerance();
        if failed.len() > tolerated {
            let err = Error::BroadcastFailure {
                failed: failed.len(),
                tolerated,
            };
            warn!(error = %err, "aborting");
            self.finish(Termination::Aborted, None);
            return Err(err);
        }

        if let Some(outcome) = early {
            self.conclude(outcome);
        }
        Ok(())
    }

    /// route an incoming message
    pub fn dispatch(&self, from: usize, message: Message<G>) -> Result<()> {
        match message {
            Message::Request(request) => self.handle_request(from, request),
            Message::Reply(reply) => {
                self.handle_reply(from, reply);
                Ok(())
            }
        }
    }

    /// non-root side: answer the request exactly once
    pub fn handle_request(&self, from: usize, request: ReencryptRequest<G>) -> Result<()> {
        if self.replied.swap(true, Ordering::AcqRel) {
            debug!(from, "already answered this run");
            return Ok(());
        }

        let reply = match self.local_reply(&request) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(index = self.index(), error = %e, "sending refusal");
                ReencryptReply::refusal(self.index() as u32)
            }
        };

        self.transport
            .send_to_parent(Message::Reply(reply))
            .map_err(|e| {
                warn!(index = self.index(), error = %e, "reply not sent");
                e
            })
    }

    /// root side: fold one reply into the aggregate.
    ///
    /// `from` is the transport-level sender; a reply only counts for it.
    pub fn handle_reply(&self, from: usize, reply: ReencryptReply<G>) {
        if !self.transport.topology().is_root() {
            warn!(from, error = %Error::NotRoot, "dropping reply");
            return;
        }
        if self.is_finished() {
            debug!(from, index = reply.index, "reply after completion");
            return;
        }

        let outcome = self.aggregator.lock().add(from, reply);
        if let Some(outcome) = outcome {
            self.conclude(outcome);
        }
    }

    fn conclude(&self, outcome: Outcome<G>) {
        match outcome {
            Outcome::Quorum(reencryptions) => {
                let collected = reencryptions.iter().filter(|e| e.is_some()).count();
                info!(collected, threshold = self.threshold(), "reencryption quorum reached");
                self.finish(Termination::Quorum, Some(reencryptions));
            }
            Outcome::InsufficientReplies { failures, tolerated } => {
                warn!(error = %Error::InsufficientReplies { failures, tolerated }, "giving up");
                self.finish(Termination::InsufficientReplies, None);
            }
        }
    }

    fn finish(
        &self,
        termination: Termination,
        reencryptions: Option<Vec<Option<Ciphertext<G>>>>,
    ) -> bool {
        let won = self.completion.finish(termination, reencryptions);
        self.timeout.cancel();
        won
    }

    /// verify, fetch and encode this node's contribution
    fn local_reply(&self, request: &ReencryptRequest<G>) -> Result<ReencryptReply<G>> {
        if let Some(verifier) = &self.verifier {
            if !verifier.verify(request) {
                return Err(Error::VerificationRefused);
            }
        }

        let share = self.local_share(request.verification_data.as_deref())?;
        if share.index as usize != self.index() {
            return Err(Error::ShareIndexMismatch {
                share: share.index,
                node: self.index(),
            });
        }
        let ciphertext = codec::encode_share::<G, _>(
            &request.ephemeral_public_key,
            &share,
            &mut rand::thread_rng(),
        )
        .map_err(|e| Error::Encoding(e.to_string()))?;

        debug!(index = self.index(), chunks = ciphertext.chunks.len(), "share reencrypted");
        Ok(ReencryptReply {
            index: self.index() as u32,
            ciphertext: Some(ciphertext),
        })
    }

    fn local_share(&self, verification_data: Option<&[u8]>) -> Result<Share> {
        if let Some(source) = &self.share_source {
            return source.get_share(verification_data);
        }
        self.share
            .clone()
            .ok_or_else(|| Error::ShareUnavailable("no share configured".into()))
    }
}

#[cfg(all(test, feature = "ristretto255"))]
mod tests {
    use super::*;
    use crate::group::keypair;
    use crate::group::ristretto::Ristretto255;
    use crate::transport::Topology;

    type G = Ristretto255;

    /// records what would have been sent
    struct Recorder {
        topology: Topology,
        sent: Mutex<Vec<(usize, Message<G>)>>,
        unreachable: Vec<usize>,
    }

    impl Recorder {
        fn new(root: usize, index: usize, n: usize) -> Self {
            Self {
                topology: Topology::star(root, index, n),
                sent: Mutex::new(Vec::new()),
                unreachable: Vec::new(),
            }
        }
    }

    impl Transport<G> for Recorder {
        fn topology(&self) -> &Topology {
            &self.topology
        }

        fn send_to(&self, node: usize, message: Message<G>) -> Result<()> {
            if self.unreachable.contains(&node) {
                return Err(Error::Transport(format!("node {node} unreachable")));
            }
            self.sent.lock().push((node, message));
            Ok(())
        }
    }

    fn instance(transport: Recorder) -> (Reencrypt<G, Recorder>, oneshot::Receiver<bool>) {
        Reencrypt::new(transport, ProtocolConfig::default())
    }

    fn share(index: u32) -> Share {
        Share::new(index, vec![index as u8 + 1; 32])
    }

    fn encrypted_reply(index: u32, xc: &<G as Group>::Point) -> ReencryptReply<G> {
        let ct = codec::encode_share::<G, _>(xc, &share(index), &mut rand::thread_rng()).unwrap();
        ReencryptReply {
            index,
            ciphertext: Some(ct),
        }
    }

    #[tokio::test]
    async fn test_root_broadcasts_to_everyone_else() {
        let (_, xc) = keypair::<G, _>(&mut rand::thread_rng());
        let (root, _done) = instance(Recorder::new(0, 0, 4));
        let root = root.with_share(share(0));

        root.start(xc, Some(b"proof".to_vec())).unwrap();

        let sent = root.transport.sent.lock();
        let targets: Vec<usize> = sent.iter().map(|(n, _)| *n).collect();
        assert_eq!(targets, vec![1, 2, 3]);
        assert!(sent.iter().all(|(_, m)| matches!(m, Message::Request(_))));
        assert!(!root.is_finished());
    }

    #[tokio::test]
    async fn test_root_quorum() {
        let (xc_secret, xc) = keypair::<G, _>(&mut rand::thread_rng());
        let (root, done) = instance(Recorder::new(0, 0, 4));
        let root = root.with_share(share(0));
        assert_eq!(root.threshold(), 3);

        root.start(xc, None).unwrap();
        root.handle_reply(2, encrypted_reply(2, &xc));
        assert!(root.reencryptions().is_none());
        root.handle_reply(3, encrypted_reply(3, &xc));

        assert!(done.await.unwrap());
        assert_eq!(root.termination(), Some(Termination::Quorum));

        let entries = root.reencryptions().unwrap();
        assert!(entries[1].is_none());
        let decoded = codec::decode_reencryptions(&xc_secret, &entries).unwrap();
        assert_eq!(decoded.len(), 3);
        for (index, bytes) in decoded {
            assert_eq!(bytes, share(index as u32).as_bytes());
        }
    }

    #[tokio::test]
    async fn test_root_verification_refused() {
        let (_, xc) = keypair::<G, _>(&mut rand::thread_rng());
        let (root, done) = instance(Recorder::new(0, 0, 4));
        let root = root
            .with_share(share(0))
            .with_verifier(|_: &ReencryptRequest<G>| false);

        assert!(matches!(root.start(xc, None), Err(Error::VerificationRefused)));
        assert!(root.transport.sent.lock().is_empty());
        assert!(!done.await.unwrap());
        assert_eq!(root.termination(), Some(Termination::Aborted));
    }

    #[tokio::test]
    async fn test_root_without_share() {
        let (_, xc) = keypair::<G, _>(&mut rand::thread_rng());
        let (root, done) = instance(Recorder::new(0, 0, 4));
        assert!(matches!(root.start(xc, None), Err(Error::ShareUnavailable(_))));
        assert!(!done.await.unwrap());
    }

    #[tokio::test]
    async fn test_broadcast_failure_beyond_tolerance() {
        let (_, xc) = keypair::<G, _>(&mut rand::thread_rng());
        let mut transport = Recorder::new(0, 0, 4);
        transport.unreachable = vec![1, 3];
        let (root, done) = instance(transport);
        let root = root.with_share(share(0));

        let result = root.start(xc, None);
        assert!(matches!(
            result,
            Err(Error::BroadcastFailure {
                failed: 2,
                tolerated: 1
            })
        ));
        assert!(!done.await.unwrap());
    }

    #[tokio::test]
    async fn test_one_failed_send_is_tolerated() {
        let (_, xc) = keypair::<G, _>(&mut rand::thread_rng());
        let mut transport = Recorder::new(0, 0, 4);
        transport.unreachable = vec![2];
        let (root, _done) = instance(transport);
        let root = root.with_share(share(0));

        root.start(xc, None).unwrap();
        assert!(!root.is_finished());
    }

    #[tokio::test]
    async fn test_single_node_finishes_on_start() {
        let (xc_secret, xc) = keypair::<G, _>(&mut rand::thread_rng());
        let (root, done) = instance(Recorder::new(0, 0, 1));
        let root = root.with_share(share(0));

        root.start(xc, None).unwrap();
        assert!(done.await.unwrap());

        let entries = root.reencryptions().unwrap();
        let decoded = codec::decode_reencryptions(&xc_secret, &entries).unwrap();
        assert_eq!(decoded, vec![(0, share(0).as_bytes().to_vec())]);
    }

    #[tokio::test]
    async fn test_responder_replies_once() {
        let (xc_secret, xc) = keypair::<G, _>(&mut rand::thread_rng());
        let (node, _done) = instance(Recorder::new(0, 2, 4));
        let node = node.with_share(share(2));
        let request = ReencryptRequest {
            ephemeral_public_key: xc,
            verification_data: None,
        };

        node.handle_request(0, request.clone()).unwrap();
        node.handle_request(0, request).unwrap();

        let sent = node.transport.sent.lock();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            (0, Message::Reply(reply)) => {
                assert_eq!(reply.index, 2);
                let ct = reply.ciphertext.as_ref().unwrap();
                assert_eq!(codec::decode(&xc_secret, ct).unwrap(), share(2).as_bytes());
            }
            other => panic!("unexpected send {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_responder_refusal_is_empty_reply() {
        let (_, xc) = keypair::<G, _>(&mut rand::thread_rng());
        let (node, _done) = instance(Recorder::new(0, 1, 4));
        let node = node
            .with_share(share(1))
            .with_verifier(|req: &ReencryptRequest<G>| req.verification_data.is_some());

        node.handle_request(
            0,
            ReencryptRequest {
                ephemeral_public_key: xc,
                verification_data: None,
            },
        )
        .unwrap();

        let sent = node.transport.sent.lock();
        match &sent[0] {
            (0, Message::Reply(reply)) => {
                assert_eq!(reply.index, 1);
                assert!(reply.is_refusal());
            }
            other => panic!("unexpected send {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reply_at_leaf_ignored() {
        let (_, xc) = keypair::<G, _>(&mut rand::thread_rng());
        let (node, _done) = instance(Recorder::new(0, 1, 4));
        node.handle_reply(2, encrypted_reply(2, &xc));
        assert!(!node.is_finished());
        assert!(matches!(node.start(xc, None), Err(Error::NotRoot)));
    }

    #[tokio::test]
    async fn test_node_cannot_answer_for_others() {
        let (_, xc) = keypair::<G, _>(&mut rand::thread_rng());
        let (root, done) = instance(Recorder::new(0, 0, 4));
        let root = root.with_share(share(0));
        root.start(xc, None).unwrap();

        // node 1 refuses twice, the second time posing as node 2
        root.handle_reply(1, ReencryptReply::refusal(1));
        root.handle_reply(1, ReencryptReply::refusal(2));
        assert!(!root.is_finished());

        // and cannot take node 3's slot with a ciphertext either
        root.handle_reply(1, encrypted_reply(3, &xc));
        assert!(!root.is_finished());

        root.handle_reply(2, encrypted_reply(2, &xc));
        root.handle_reply(3, encrypted_reply(3, &xc));
        assert!(done.await.unwrap());
        assert_eq!(root.termination(), Some(Termination::Quorum));

        let entries = root.reencryptions().unwrap();
        assert!(entries[1].is_none());
        assert!(entries[2].is_some() && entries[3].is_some());
    }

    #[tokio::test]
    async fn test_second_start_rejected() {
        let (_, xc) = keypair::<G, _>(&mut rand::thread_rng());
        let (root, _done) = instance(Recorder::new(0, 0, 4));
        let root = root.with_share(share(0));

        root.start(xc, None).unwrap();
        assert!(matches!(root.start(xc, None), Err(Error::AlreadyStarted)));
        assert_eq!(root.transport.sent.lock().len(), 3);
        assert!(!root.is_finished());
    }

    #[tokio::test]
    async fn test_share_for_another_node_refused() {
        let (_, xc) = keypair::<G, _>(&mut rand::thread_rng());
        let (node, _done) = instance(Recorder::new(0, 1, 4));
        let node = node.with_share(share(3));

        node.handle_request(
            0,
            ReencryptRequest {
                ephemeral_public_key: xc,
                verification_data: None,
            },
        )
        .unwrap();

        let sent = node.transport.sent.lock();
        match &sent[0] {
            (0, Message::Reply(reply)) => {
                assert_eq!(reply.index, 1);
                assert!(reply.is_refusal());
            }
            other => panic!("unexpected send {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_root_share_mismatch_aborts() {
        let (_, xc) = keypair::<G, _>(&mut rand::thread_rng());
        let (root, done) = instance(Recorder::new(0, 0, 4));
        let root = root.with_share(share(2));

        assert!(matches!(
            root.start(xc, None),
            Err(Error::ShareIndexMismatch { share: 2, node: 0 })
        ));
        assert!(!done.await.unwrap());
    }
}
