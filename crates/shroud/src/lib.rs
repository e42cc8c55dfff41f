//! # shroud
//!
//! threshold reencryption of secret shares to an ephemeral public key.
//!
//! a secret is shared across a roster of N nodes. a requester who wants it
//! generates an ephemeral keypair `(xc, Xc)` and asks the roster, through a
//! root node, to hand over their shares encrypted to `Xc`. each node checks
//! the request, reencrypts its share and replies. the root succeeds once it
//! holds T = N - ⌊(N-1)/3⌋ ciphertexts, so up to a third of the roster can
//! refuse, crash or lie about being available.
//!
//! ## flow
//!
//! ```text
//!            Request{Xc, proof}
//!   root ─────────────────────────▶ node 1..N-1
//!    │                                  │ verify
//!    │ verify, encode own share         │ fetch share
//!    │ arm timeout                      │ encode to Xc
//!    ◀──────────────────────────────────┘
//!            Reply{index, ciphertext?}
//!
//!   T ciphertexts      → true
//!   > N-T refusals     → false (immediately)
//!   deadline           → false
//! ```
//!
//! ## encoding
//!
//! shares are chunked and ElGamal-encrypted point by point, see [`codec`].
//! key reconstruction from the collected shares is left to the requester.
//!
//! ## curve backends
//!
//! - `ristretto255` (default)
//! - `secp256k1`
//!
//! ## usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use shroud::{local, LocalNetwork, ProtocolConfig, Reencrypt, Ristretto255, Share};
//!
//! let (network, mailboxes) = LocalNetwork::<Ristretto255>::new(4);
//! // one Reencrypt per node, each driven by local::serve
//! let (root, done) = Reencrypt::new(network.transport(0, 0), ProtocolConfig::default());
//! let root = Arc::new(root.with_share(share));
//! root.start(xc_pub, Some(proof))?;
//! assert!(done.await?);
//! let shares = shroud::codec::decode_reencryptions(&xc, &root.reencryptions().unwrap())?;
//! ```

pub mod aggregate;
pub mod codec;
pub mod config;
mod error;
pub mod group;
pub mod latch;
pub mod local;
pub mod message;
pub mod protocol;
pub mod share;
pub mod timeout;
pub mod transport;

pub use aggregate::{fault_tolerance, threshold};
pub use codec::Ciphertext;
pub use config::ProtocolConfig;
pub use error::{Error, Result};
pub use group::{keypair, Group};
pub use local::LocalNetwork;
pub use message::{Message, ReencryptReply, ReencryptRequest};
pub use protocol::{Reencrypt, Termination, Verifier};
pub use share::{MemoryShareStore, Share, ShareSource};
pub use transport::{Topology, Transport};

#[cfg(feature = "ristretto255")]
pub use group::ristretto::Ristretto255;

#[cfg(feature = "secp256k1")]
pub use group::secp256k1::Secp256k1;
