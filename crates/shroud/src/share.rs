//! secret shares and where nodes get them from
//!
//! a share never leaves its node in the clear. the codec is the only
//! consumer of its bytes; everything else sees the index.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::debug;
use zeroize::Zeroizing;

use crate::{Error, Result};

/// one node's share of the secretly-shared value
#[derive(Clone)]
pub struct Share {
    /// share index; must equal the holding node's roster index
    pub index: u32,
    value: Zeroizing<Vec<u8>>,
}

impl Share {
    pub fn new(index: u32, value: Vec<u8>) -> Self {
        Self {
            index,
            value: Zeroizing::new(value),
        }
    }

    /// canonical serialization consumed by the codec
    pub fn as_bytes(&self) -> &[u8] {
        &self.value
    }
}

impl fmt::Debug for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Share")
            .field("index", &self.index)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// local share retrieval capability
///
/// implementations decide from the request's verification data which share
/// (if any) to hand out.
pub trait ShareSource: Send + Sync {
    fn get_share(&self, verification_data: Option<&[u8]>) -> Result<Share>;
}

/// commitment a writer publishes for one node's share: sha256(value || blinding)
pub fn share_commitment(value: &[u8], blinding: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(value);
    hasher.update(blinding);
    hasher.finalize().into()
}

/// lookup key for a piece of verification data
pub fn storage_key(verification_data: &[u8]) -> String {
    hex::encode(Sha256::digest(verification_data))
}

/// in-memory share storage keyed by verification data
///
/// shares are only accepted when they open the writer's commitment.
#[derive(Default)]
pub struct MemoryShareStore {
    shares: RwLock<HashMap<String, Share>>,
}

impl MemoryShareStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// store a share after checking it against its commitment
    pub fn register(
        &self,
        verification_data: &[u8],
        share: Share,
        blinding: &[u8],
        commitment: &[u8; 32],
    ) -> Result<()> {
        if &share_commitment(share.as_bytes(), blinding) != commitment {
            return Err(Error::CommitmentMismatch);
        }
        let key = storage_key(verification_data);
        debug!(index = share.index, key = %key, "registered share");
        self.shares.write().insert(key, share);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.shares.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.read().is_empty()
    }
}

impl ShareSource for MemoryShareStore {
    fn get_share(&self, verification_data: Option<&[u8]>) -> Result<Share> {
        let data = verification_data
            .ok_or_else(|| Error::ShareUnavailable("no verification data".into()))?;
        let key = storage_key(data);
        self.shares
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::ShareUnavailable(format!("no share stored under {key}")))
    }
}
