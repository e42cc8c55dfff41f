//! protocol messages and their wire format
//!
//! points travel as compressed bytes inside a serde envelope; the first byte
//! of every frame is the wire version.

use serde::{Deserialize, Serialize};

use crate::codec::Ciphertext;
use crate::group::Group;
use crate::{Error, Result};

/// current wire format version
pub const WIRE_VERSION: u8 = 1;

/// request sent from the root to every other roster member
#[derive(Clone, Debug, PartialEq)]
pub struct ReencryptRequest<G: Group> {
    /// ephemeral public key Xc shares are reencrypted to
    pub ephemeral_public_key: G::Point,
    /// opaque proof the verifier checks before a share is released
    pub verification_data: Option<Vec<u8>>,
}

/// a node's answer; no ciphertext means the node refused or failed
#[derive(Clone, Debug, PartialEq)]
pub struct ReencryptReply<G: Group> {
    pub index: u32,
    pub ciphertext: Option<Ciphertext<G>>,
}

impl<G: Group> ReencryptReply<G> {
    pub fn refusal(index: u32) -> Self {
        Self {
            index,
            ciphertext: None,
        }
    }

    pub fn is_refusal(&self) -> bool {
        self.ciphertext.is_none()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Message<G: Group> {
    Request(ReencryptRequest<G>),
    Reply(ReencryptReply<G>),
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    version: u8,
    body: WireBody,
}

#[derive(Serialize, Deserialize)]
enum WireBody {
    Request {
        ephemeral_public_key: Vec<u8>,
        verification_data: Option<Vec<u8>>,
    },
    Reply {
        index: u32,
        ciphertext: Option<WireCiphertext>,
    },
}

#[derive(Serialize, Deserialize)]
struct WireCiphertext {
    commitment: Vec<u8>,
    chunks: Vec<Vec<u8>>,
}

fn point_from_wire<G: Group>(bytes: &[u8]) -> Result<G::Point> {
    G::point_from_bytes(bytes).ok_or(Error::InvalidPoint)
}

impl WireCiphertext {
    fn from_ciphertext<G: Group>(ct: &Ciphertext<G>) -> Self {
        Self {
            commitment: G::point_to_bytes(&ct.commitment),
            chunks: ct.chunks.iter().map(G::point_to_bytes).collect(),
        }
    }

    fn into_ciphertext<G: Group>(self) -> Result<Ciphertext<G>> {
        let commitment = point_from_wire::<G>(&self.commitment)?;
        let chunks = self
            .chunks
            .iter()
            .map(|c| point_from_wire::<G>(c))
            .collect::<Result<Vec<_>>>()?;
        Ok(Ciphertext { commitment, chunks })
    }
}

/// serialize a message for the wire
pub fn encode<G: Group>(message: &Message<G>) -> Result<Vec<u8>> {
    let body = match message {
        Message::Request(req) => WireBody::Request {
            ephemeral_public_key: G::point_to_bytes(&req.ephemeral_public_key),
            verification_data: req.verification_data.clone(),
        },
        Message::Reply(reply) => WireBody::Reply {
            index: reply.index,
            ciphertext: reply
                .ciphertext
                .as_ref()
                .map(WireCiphertext::from_ciphertext),
        },
    };

    let wire = WireMessage {
        version: WIRE_VERSION,
        body,
    };
    Ok(bincode::serialize(&wire)?)
}

/// parse a message received from the wire
pub fn decode<G: Group>(bytes: &[u8]) -> Result<Message<G>> {
    // version is checked before the body so future layouts fail cleanly
    match bytes.first() {
        Some(&WIRE_VERSION) => {}
        Some(&v) => return Err(Error::UnsupportedVersion(v)),
        None => return Err(Error::Serialization("empty frame".into())),
    }

    let wire: WireMessage = bincode::deserialize(bytes)?;
    match wire.body {
        WireBody::Request {
            ephemeral_public_key,
            verification_data,
        } => Ok(Message::Request(ReencryptRequest {
            ephemeral_public_key: point_from_wire::<G>(&ephemeral_public_key)?,
            verification_data,
        })),
        WireBody::Reply { index, ciphertext } => Ok(Message::Reply(ReencryptReply {
            index,
            ciphertext: ciphertext.map(|ct| ct.into_ciphertext::<G>()).transpose()?,
        })),
    }
}
