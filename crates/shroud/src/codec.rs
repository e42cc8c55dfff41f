//! Share reencryption codec
//!
//! A share is serialized, cut into chunks of at most `G::EMBED_LEN` bytes and
//! each chunk is embedded into a point `kp`. With a fresh scalar `k` and the
//! requester's ephemeral key `Xc`:
//!
//! ```text
//! K  = k·B
//! S  = k·Xc
//! Ci = S + kp_i
//! ```
//!
//! The requester holding `xc` recovers `S = xc·K` and `kp_i = Ci - S`.

use rand_core::{CryptoRng, RngCore};

use crate::group::Group;
use crate::share::Share;
use crate::Result;

/// Chunked ElGamal ciphertext of one share
#[derive(Clone, Debug, PartialEq)]
pub struct Ciphertext<G: Group> {
    /// commitment K, shared by every chunk
    pub commitment: G::Point,
    /// C_1..C_m in order
    pub chunks: Vec<G::Point>,
}

/// Number of points needed to carry `len` bytes
pub fn chunk_count<G: Group>(len: usize) -> usize {
    len.div_ceil(G::EMBED_LEN)
}

/// Encrypt `data` to the ephemeral public key `xc`.
///
/// `k` is drawn from `rng` on every call and never leaves this function.
pub fn encode<G: Group, R: RngCore + CryptoRng>(
    xc: &G::Point,
    data: &[u8],
    rng: &mut R,
) -> Result<Ciphertext<G>> {
    let k = G::random_scalar(rng);
    let commitment = G::mul(&G::base(), &k);
    let shared = G::mul(xc, &k);

    let chunks = data
        .chunks(G::EMBED_LEN)
        .map(|chunk| {
            let kp = G::embed(chunk, rng)?;
            Ok(G::add(&shared, &kp))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Ciphertext { commitment, chunks })
}

/// Reencrypt a local share to `xc`
pub fn encode_share<G: Group, R: RngCore + CryptoRng>(
    xc: &G::Point,
    share: &Share,
    rng: &mut R,
) -> Result<Ciphertext<G>> {
    encode(xc, share.as_bytes(), rng)
}

/// Requester side: recover the plaintext bytes with the ephemeral private key
pub fn decode<G: Group>(xc_secret: &G::Scalar, ciphertext: &Ciphertext<G>) -> Result<Vec<u8>> {
    let shared = G::mul(&ciphertext.commitment, xc_secret);

    let mut data = Vec::with_capacity(ciphertext.chunks.len() * G::EMBED_LEN);
    for chunk in &ciphertext.chunks {
        let kp = G::sub(chunk, &shared);
        data.extend_from_slice(&G::extract(&kp)?);
    }
    Ok(data)
}

/// Requester side: decode every populated entry of a finished run.
///
/// Returns `(share index, share bytes)` in index order.
pub fn decode_reencryptions<G: Group>(
    xc_secret: &G::Scalar,
    reencryptions: &[Option<Ciphertext<G>>],
) -> Result<Vec<(usize, Vec<u8>)>> {
    reencryptions
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| entry.as_ref().map(|ct| (index, ct)))
        .map(|(index, ct)| -> Result<(usize, Vec<u8>)> { Ok((index, decode(xc_secret, ct)?)) })
        .collect()
}
