//! SMP key-derivation functions ([Vol 3] Part H, Section 2.2).
//!
//! All functions take and return big-endian byte arrays, matching the
//! convention used by the Core Specification's own definitions, and all
//! delegate to [`crate::cmac::aes_cmac`] for the underlying AES-CMAC
//! primitive.

use crate::cmac::aes_cmac;
use crate::{Addr, IoCap};

/// `f4(U, V, X, Z)` ([Vol 3] Part H, Section 2.2.6): confirm value function
/// used by both the legacy OOB path and Secure Connections numeric
/// comparison/passkey entry.
#[must_use]
pub fn f4(u: &[u8; 32], v: &[u8; 32], x: &[u8; 16], z: u8) -> [u8; 16] {
    let mut msg = Vec::with_capacity(32 + 32 + 1);
    msg.extend_from_slice(u);
    msg.extend_from_slice(v);
    msg.push(z);
    aes_cmac(x, &msg)
}

/// `f5(W, N1, N2, A1, A2)` ([Vol 3] Part H, Section 2.2.7): derives the
/// Secure Connections `MacKey` and `LTK` from the DH shared secret.
#[must_use]
pub fn f5(
    w: &[u8; 32],
    n1: &[u8; 16],
    n2: &[u8; 16],
    a1: Addr,
    a2: Addr,
) -> (/* MacKey */ [u8; 16], /* LTK */ [u8; 16]) {
    const SALT: [u8; 16] = [
        0x6C, 0x88, 0x83, 0x9B, 0x9F, 0xC9, 0x25, 0x16, 0x0F, 0x39, 0x9C, 0x4F, 0xCE, 0xB8, 0xC1,
        0x1F,
    ];
    const KEY_ID: [u8; 4] = *b"btle";
    let t = aes_cmac(&SALT, w);

    let counter_msg = |counter: u8| {
        let mut msg = Vec::with_capacity(1 + 4 + 16 + 16 + 7 + 7 + 2);
        msg.push(counter);
        msg.extend_from_slice(&KEY_ID);
        msg.extend_from_slice(n1);
        msg.extend_from_slice(n2);
        msg.extend_from_slice(&a1.0);
        msg.extend_from_slice(&a2.0);
        msg.extend_from_slice(&256u16.to_be_bytes());
        msg
    };
    let mac_key = aes_cmac(&t, &counter_msg(0));
    let ltk = aes_cmac(&t, &counter_msg(1));
    (mac_key, ltk)
}

/// `f6(W, N1, N2, R, IOcap, A1, A2)` ([Vol 3] Part H, Section 2.2.8): check
/// value function used to confirm both sides computed the same `MacKey`
/// and exchanged unmodified values during Phase 2 Secure Connections.
#[must_use]
pub fn f6(
    w: &[u8; 16],
    n1: &[u8; 16],
    n2: &[u8; 16],
    r: &[u8; 16],
    io_cap: IoCap,
    a1: Addr,
    a2: Addr,
) -> [u8; 16] {
    let mut msg = Vec::with_capacity(16 + 16 + 16 + 3 + 7 + 7);
    msg.extend_from_slice(n1);
    msg.extend_from_slice(n2);
    msg.extend_from_slice(r);
    msg.extend_from_slice(&io_cap.0);
    msg.extend_from_slice(&a1.0);
    msg.extend_from_slice(&a2.0);
    aes_cmac(w, &msg)
}

/// `g2(U, V, X, Y)` ([Vol 3] Part H, Section 2.2.9): generates the 6-digit
/// value displayed to the user during numeric comparison.
#[must_use]
pub fn g2(u: &[u8; 32], v: &[u8; 32], x: &[u8; 16], y: &[u8; 16]) -> u32 {
    let mut msg = Vec::with_capacity(32 + 32 + 16);
    msg.extend_from_slice(u);
    msg.extend_from_slice(v);
    msg.extend_from_slice(y);
    let mac = aes_cmac(x, &msg);
    let last4 = u32::from_be_bytes(mac[12..16].try_into().expect("4 bytes"));
    last4 % 1_000_000
}

/// `h6(W, keyID)` ([Vol 3] Part H, Section 2.2.10): used to convert between
/// BR/EDR link keys and LE LTKs under cross-transport key derivation.
#[must_use]
pub fn h6(w: &[u8; 16], key_id: [u8; 4]) -> [u8; 16] {
    aes_cmac(w, &key_id)
}

/// `h7(SALT, W)` ([Vol 3] Part H, Section 2.2.11): alternative
/// cross-transport key derivation function used when the generating side
/// doesn't support `h6`.
#[must_use]
pub fn h7(salt: &[u8; 16], w: &[u8; 16]) -> [u8; 16] {
    aes_cmac(salt, w)
}

/// `c1(k, r, preq, pres, iat, ia, rat, ra)` ([Vol 3] Part H, Section 2.2.3):
/// legacy pairing confirm value function.
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn c1(
    k: &[u8; 16],
    r: &[u8; 16],
    preq: &[u8; 7],
    pres: &[u8; 7],
    ia: Addr6,
    ra: Addr6,
) -> [u8; 16] {
    // p1 = pres || preq || rat || iat ([Vol 3] Part H, Section 2.2.3).
    let mut p1 = [0u8; 16];
    p1[0..7].copy_from_slice(pres);
    p1[7..14].copy_from_slice(preq);
    p1[14] = ra.is_random as u8;
    p1[15] = ia.is_random as u8;

    // p2 = padding(4 zero octets) || ia || ra.
    let mut p2 = [0u8; 16];
    p2[4..10].copy_from_slice(&ia.addr);
    p2[10..16].copy_from_slice(&ra.addr);

    let mut xored = xor16(r, &p1);
    xored = aes_ecb_encrypt(k, &xored);
    let xored = xor16(&xored, &p2);
    aes_ecb_encrypt(k, &xored)
}

/// `s1(k, r1, r2)` ([Vol 3] Part H, Section 2.2.4): legacy pairing
/// short-term key generation function.
#[must_use]
pub fn s1(k: &[u8; 16], r1: &[u8; 16], r2: &[u8; 16]) -> [u8; 16] {
    let mut r = [0u8; 16];
    r[0..8].copy_from_slice(&r2[0..8]);
    r[8..16].copy_from_slice(&r1[0..8]);
    aes_ecb_encrypt(k, &r)
}

/// A 6-octet `BD_ADDR` plus its random/public flag, as used by [`c1`].
/// Distinct from [`Addr`] (which carries a leading type byte) because legacy
/// pairing treats the type bit separately in `p1`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Addr6 {
    pub addr: [u8; 6],
    pub is_random: bool,
}

fn xor16(a: &[u8; 16], b: &[u8; 16]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for i in 0..16 {
        out[i] = a[i] ^ b[i];
    }
    out
}

fn aes_ecb_encrypt(key: &[u8; 16], block: &[u8; 16]) -> [u8; 16] {
    use aes::cipher::{BlockEncrypt, KeyInit};
    let cipher = aes::Aes128::new_from_slice(key).expect("key is 16 bytes");
    let mut b = aes::cipher::generic_array::GenericArray::clone_from_slice(block);
    cipher.encrypt_block(&mut b);
    b.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f5_produces_distinct_mac_key_and_ltk() {
        let w = [0x11; 32];
        let n1 = [0x22; 16];
        let n2 = [0x33; 16];
        let a1 = Addr([0u8; 7]);
        let a2 = Addr([1u8; 7]);
        let (mac_key, ltk) = f5(&w, &n1, &n2, a1, a2);
        assert_ne!(mac_key, ltk);
    }

    #[test]
    fn g2_is_bounded_to_six_digits() {
        let u = [0xAA; 32];
        let v = [0xBB; 32];
        let x = [0xCC; 16];
        let y = [0xDD; 16];
        assert!(g2(&u, &v, &x, &y) < 1_000_000);
    }

    #[test]
    fn c1_is_sensitive_to_address_bytes() {
        let k = [0u8; 16];
        let r = [1u8; 16];
        let preq = [2u8; 7];
        let pres = [3u8; 7];
        let ia = Addr6 { addr: [4u8; 6], is_random: false };
        let ra = Addr6 { addr: [5u8; 6], is_random: false };
        let c_a = c1(&k, &r, &preq, &pres, ia, ra);
        let ra2 = Addr6 { addr: [6u8; 6], is_random: false };
        let c_b = c1(&k, &r, &preq, &pres, ia, ra2);
        assert_ne!(c_a, c_b);
    }

    #[test]
    fn s1_combines_both_random_values() {
        let k = [7u8; 16];
        let r1 = [8u8; 16];
        let r2 = [9u8; 16];
        let s = s1(&k, &r1, &r2);
        let s_same = s1(&k, &r1, &r2);
        assert_eq!(s, s_same);
    }
}
