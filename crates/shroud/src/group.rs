//! Group abstraction for shroud
//!
//! The reencryption protocol only needs a prime-order group with a
//! reversible way to carry raw bytes inside a group element. Backends:
//! - ristretto255 (default)
//! - secp256k1

use core::fmt::Debug;

use rand_core::{CryptoRng, RngCore};

use crate::{Error, Result};

/// How many random fills `embed` tries before giving up
/// (a constant fraction of fills decode to a valid point)
pub const EMBED_ATTEMPTS: usize = 256;

/// Prime-order group backend
pub trait Group: Clone + Debug + Default + PartialEq + Send + Sync + 'static {
    type Scalar: Clone + Debug + Send + Sync + 'static;
    type Point: Clone + Debug + PartialEq + Send + Sync + 'static;

    /// Size of a compressed point in bytes
    const POINT_LEN: usize;

    /// Maximum number of data bytes one point can carry (E)
    const EMBED_LEN: usize;

    /// The base point
    fn base() -> Self::Point;

    /// The identity element
    fn identity() -> Self::Point;

    /// Sample a uniformly random scalar
    fn random_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> Self::Scalar;

    /// Scalar multiplication
    fn mul(point: &Self::Point, scalar: &Self::Scalar) -> Self::Point;

    /// Point addition
    fn add(a: &Self::Point, b: &Self::Point) -> Self::Point;

    /// Point subtraction
    fn sub(a: &Self::Point, b: &Self::Point) -> Self::Point;

    /// Compress to canonical bytes
    fn point_to_bytes(point: &Self::Point) -> Vec<u8>;

    /// Decompress from canonical bytes
    fn point_from_bytes(bytes: &[u8]) -> Option<Self::Point>;

    /// Embed up to `EMBED_LEN` bytes into a point.
    ///
    /// The bytes are recoverable with [`Group::extract`] from the point alone.
    fn embed<R: RngCore + CryptoRng>(data: &[u8], rng: &mut R) -> Result<Self::Point>;

    /// Recover the bytes carried by an embedded point
    fn extract(point: &Self::Point) -> Result<Vec<u8>>;
}

/// Generate a keypair `(x, x·B)`
pub fn keypair<G: Group, R: RngCore + CryptoRng>(rng: &mut R) -> (G::Scalar, G::Point) {
    let secret = G::random_scalar(rng);
    let public = G::mul(&G::base(), &secret);
    (secret, public)
}

// ============================================================================
// Ristretto255
// ============================================================================

#[cfg(feature = "ristretto255")]
pub mod ristretto {
    use super::*;
    use curve25519_dalek::{
        constants::RISTRETTO_BASEPOINT_POINT,
        ristretto::{CompressedRistretto, RistrettoPoint},
        scalar::Scalar,
        traits::Identity,
    };

    /// Ristretto255 backend
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Ristretto255;

    impl Group for Ristretto255 {
        type Scalar = Scalar;
        type Point = RistrettoPoint;

        const POINT_LEN: usize = 32;

        // byte 0 holds the length, bytes 30..32 stay random so that
        // a full chunk still has room to search for a valid encoding
        const EMBED_LEN: usize = 29;

        fn base() -> Self::Point {
            RISTRETTO_BASEPOINT_POINT
        }

        fn identity() -> Self::Point {
            RistrettoPoint::identity()
        }

        fn random_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> Self::Scalar {
            Scalar::random(rng)
        }

        fn mul(point: &Self::Point, scalar: &Self::Scalar) -> Self::Point {
            point * scalar
        }

        fn add(a: &Self::Point, b: &Self::Point) -> Self::Point {
            a + b
        }

        fn sub(a: &Self::Point, b: &Self::Point) -> Self::Point {
            a - b
        }

        fn point_to_bytes(point: &Self::Point) -> Vec<u8> {
            point.compress().to_bytes().to_vec()
        }

        fn point_from_bytes(bytes: &[u8]) -> Option<Self::Point> {
            CompressedRistretto::from_slice(bytes).ok()?.decompress()
        }

        fn embed<R: RngCore + CryptoRng>(data: &[u8], rng: &mut R) -> Result<Self::Point> {
            if data.len() > Self::EMBED_LEN {
                return Err(Error::DataTooLong {
                    len: data.len(),
                    max: Self::EMBED_LEN,
                });
            }

            let mut buf = [0u8; 32];
            for _ in 0..EMBED_ATTEMPTS {
                rng.fill_bytes(&mut buf);
                // low bit of byte 0 must be clear (non-negative field element)
                buf[0] = (data.len() as u8) << 1;
                buf[1..1 + data.len()].copy_from_slice(data);
                buf[31] &= 0x7f;

                // ristretto encodings are canonical, so a point that decodes
                // here compresses back to exactly these bytes
                if let Some(point) = CompressedRistretto(buf).decompress() {
                    return Ok(point);
                }
            }
            Err(Error::EmbeddingFailed)
        }

        fn extract(point: &Self::Point) -> Result<Vec<u8>> {
            let bytes = point.compress().to_bytes();
            let len = (bytes[0] >> 1) as usize;
            if len > Self::EMBED_LEN {
                return Err(Error::InvalidPoint);
            }
            Ok(bytes[1..1 + len].to_vec())
        }
    }
}

// ============================================================================
// secp256k1
// ============================================================================

#[cfg(feature = "secp256k1")]
pub mod secp256k1 {
    use super::*;
    use k256::{
        elliptic_curve::{
            sec1::{FromEncodedPoint, ToEncodedPoint},
            Field,
        },
        AffinePoint, EncodedPoint, ProjectivePoint, Scalar,
    };

    /// secp256k1 backend
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Secp256k1;

    impl Group for Secp256k1 {
        type Scalar = Scalar;
        type Point = ProjectivePoint;

        // sec1 compressed: parity tag + 32-byte x coordinate
        const POINT_LEN: usize = 33;

        // x = len || data || one random byte
        const EMBED_LEN: usize = 30;

        fn base() -> Self::Point {
            ProjectivePoint::GENERATOR
        }

        fn identity() -> Self::Point {
            ProjectivePoint::IDENTITY
        }

        fn random_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> Self::Scalar {
            <Scalar as Field>::random(rng)
        }

        fn mul(point: &Self::Point, scalar: &Self::Scalar) -> Self::Point {
            *point * *scalar
        }

        fn add(a: &Self::Point, b: &Self::Point) -> Self::Point {
            *a + *b
        }

        fn sub(a: &Self::Point, b: &Self::Point) -> Self::Point {
            *a - *b
        }

        fn point_to_bytes(point: &Self::Point) -> Vec<u8> {
            point.to_affine().to_encoded_point(true).as_bytes().to_vec()
        }

        fn point_from_bytes(bytes: &[u8]) -> Option<Self::Point> {
            let encoded = EncodedPoint::from_bytes(bytes).ok()?;
            let affine: Option<AffinePoint> = AffinePoint::from_encoded_point(&encoded).into();
            affine.map(ProjectivePoint::from)
        }

        fn embed<R: RngCore + CryptoRng>(data: &[u8], rng: &mut R) -> Result<Self::Point> {
            if data.len() > Self::EMBED_LEN {
                return Err(Error::DataTooLong {
                    len: data.len(),
                    max: Self::EMBED_LEN,
                });
            }

            let mut buf = [0u8; 33];
            for _ in 0..EMBED_ATTEMPTS {
                rng.fill_bytes(&mut buf);
                buf[0] = 0x02 | (buf[0] & 0x01);
                buf[1] = data.len() as u8;
                buf[2..2 + data.len()].copy_from_slice(data);

                if let Some(point) = Self::point_from_bytes(&buf) {
                    return Ok(point);
                }
            }
            Err(Error::EmbeddingFailed)
        }

        fn extract(point: &Self::Point) -> Result<Vec<u8>> {
            let encoded = point.to_affine().to_encoded_point(true);
            let bytes = encoded.as_bytes();
            if bytes.len() != Self::POINT_LEN {
                return Err(Error::InvalidPoint);
            }
            let len = bytes[1] as usize;
            if len > Self::EMBED_LEN {
                return Err(Error::InvalidPoint);
            }
            Ok(bytes[2..2 + len].to_vec())
        }
    }
}
