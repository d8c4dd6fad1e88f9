//! P-256 elliptic curve Diffie-Hellman used by LE Secure Connections
//! ([Vol 3] Part H, Section 2.3.5.6).

use elliptic_curve::ecdh::diffie_hellman;
use elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey as P256PublicKey, SecretKey};
use rand_core::OsRng;
use zeroize::Zeroize;

/// A local P-256 key pair generated for one Secure Connections pairing
/// attempt. Dropped (and its secret scalar zeroized) once the pairing
/// finishes, successfully or not.
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generates a new, random key pair.
    #[must_use]
    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut OsRng);
        let public = PublicKey::from_secret(&secret);
        Self { secret, public }
    }

    /// Returns the public key to send to the peer.
    #[inline]
    #[must_use]
    pub const fn public(&self) -> PublicKey {
        self.public
    }

    /// Computes the Diffie-Hellman shared secret with the peer's public key,
    /// returned as the big-endian `DHKey` input to [`crate::f5`].
    ///
    /// Returns `None` if `peer` is not a valid point on the curve (the
    /// pairing must then fail with `DHKeyCheckFailed`).
    #[must_use]
    pub fn dh_key(&self, peer: &PublicKey) -> Option<[u8; 32]> {
        let peer_point = peer.to_p256()?;
        let shared = diffie_hellman(self.secret.to_nonzero_scalar(), peer_point.as_affine());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(shared.raw_secret_bytes().as_slice());
        Some(bytes)
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        // `SecretKey` already zeroizes on drop; this guards future refactors
        // that add raw scalar fields here.
        self.public.0.zeroize();
    }
}

/// A P-256 public key in the raw `(x, y)` wire format used by
/// `HCI_LE_Read_Local_P-256_Public_Key_Complete` and the SMP
/// `Pairing_Public_Key` PDU: 32-byte X followed by 32-byte Y, both
/// little-endian on the wire ([Vol 3] Part H, Section 2.3.5.6).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PublicKey([u8; 64]);

impl PublicKey {
    fn from_secret(secret: &SecretKey) -> Self {
        let p = secret.public_key().to_encoded_point(false);
        let mut raw = [0u8; 64];
        raw[..32].copy_from_slice(p.x().expect("uncompressed point has x"));
        raw[32..].copy_from_slice(p.y().expect("uncompressed point has y"));
        Self(raw)
    }

    /// Creates a public key from the raw wire-order `(x, y)` bytes.
    #[inline]
    #[must_use]
    pub const fn from_raw(xy: [u8; 64]) -> Self {
        Self(xy)
    }

    /// Returns the raw wire-order `(x, y)` bytes.
    #[inline]
    #[must_use]
    pub const fn as_raw(&self) -> &[u8; 64] {
        &self.0
    }

    fn to_p256(self) -> Option<P256PublicKey> {
        let mut sec1 = [0u8; 65];
        sec1[0] = 0x04;
        sec1[1..].copy_from_slice(&self.0);
        P256PublicKey::from_sec1_bytes(&sec1).ok()
    }

    /// Returns whether this point lies on the P-256 curve. A peer offering
    /// an invalid public key must be rejected before any DH computation is
    /// attempted ([Vol 3] Part H, Section 2.3.5.6.1, invalid curve attack).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.to_p256().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dh_key_is_symmetric_between_two_local_pairs() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let shared_a = a.dh_key(&b.public()).expect("valid peer key");
        let shared_b = b.dh_key(&a.public()).expect("valid peer key");
        assert_eq!(shared_a, shared_b);
    }

    #[test]
    fn rejects_point_not_on_curve() {
        let bogus = PublicKey::from_raw([0xFF; 64]);
        assert!(!bogus.is_valid());
        let a = KeyPair::generate();
        assert!(a.dh_key(&bogus).is_none());
    }
}
