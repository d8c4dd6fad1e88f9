//! Bluetooth LE cryptographic toolbox ([Vol 3] Part H, Section 2.2).

#![forbid(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(non_ascii_idents)]
#![warn(single_use_lifetimes)]
#![warn(unused_crate_dependencies)]
#![warn(unused_extern_crates)]
#![warn(unused_import_braces)]
#![warn(unused_lifetimes)]
#![warn(unused_qualifications)]
#![warn(variant_size_differences)]
#![warn(clippy::cargo)]
#![warn(clippy::nursery)]
#![warn(clippy::pedantic)]
#![allow(clippy::enum_glob_use)]
#![allow(clippy::inline_always)]
#![allow(clippy::module_name_repetitions)]
// #![warn(clippy::restriction)]
#![warn(clippy::assertions_on_result_states)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::decimal_literal_representation)]
#![warn(clippy::default_union_representation)]
#![warn(clippy::deref_by_slicing)]
#![warn(clippy::empty_drop)]
#![warn(clippy::empty_structs_with_brackets)]
#![warn(clippy::exhaustive_enums)]
#![warn(clippy::exit)]
#![warn(clippy::fn_to_numeric_cast_any)]
#![warn(clippy::format_push_string)]
#![warn(clippy::get_unwrap)]
#![warn(clippy::if_then_some_else_none)]
#![warn(clippy::lossy_float_literal)]
#![warn(clippy::missing_enforced_import_renames)]
#![warn(clippy::mixed_read_write_in_expression)]
#![warn(clippy::mod_module_files)]
#![warn(clippy::mutex_atomic)]
#![warn(clippy::pattern_type_mismatch)]
#![warn(clippy::print_stdout)]
#![warn(clippy::rc_buffer)]
#![warn(clippy::rc_mutex)]
#![warn(clippy::rest_pat_in_fully_bound_structs)]
#![warn(clippy::str_to_string)]
#![warn(clippy::string_add)]
#![warn(clippy::string_to_string)]
#![warn(clippy::suspicious_xor_used_as_pow)]
#![warn(clippy::todo)]
#![warn(clippy::try_err)]
#![warn(clippy::undocumented_unsafe_blocks)]
#![warn(clippy::unnecessary_safety_comment)]
#![warn(clippy::unnecessary_safety_doc)]
#![warn(clippy::unnecessary_self_imports)]
#![warn(clippy::unneeded_field_pattern)]
#![warn(clippy::unseparated_literal_suffix)]

pub use crate::{p256::*, smp::*};

mod cmac;
mod p256;
mod smp;

/// 128-bit symmetric key material. Zeroized on drop; [`Debug`] never prints
/// the contents.
#[derive(Clone, Eq, PartialEq, zeroize::Zeroize, zeroize::ZeroizeOnDrop)]
#[repr(transparent)]
pub struct Key128([u8; 16]);

impl Key128 {
    /// Wraps raw key bytes.
    #[inline]
    #[must_use]
    pub const fn new(v: [u8; 16]) -> Self {
        Self(v)
    }

    /// Returns the raw key bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl std::fmt::Debug for Key128 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Key128(..)")
    }
}

/// Long-Term Key, used to encrypt an LE link after pairing
/// ([Vol 3] Part H, Section 2.4.4).
pub type Ltk = Key128;
/// Identity Resolving Key, used to resolve private addresses
/// ([Vol 3] Part H, Section 2.4.6).
pub type Irk = Key128;
/// Connection Signature Resolving Key, used for unauthenticated data signing
/// ([Vol 3] Part H, Section 2.4.7).
pub type Csrk = Key128;

/// 56-bit device address in big-endian byte order used by [`f5`] and
/// [`f6`] functions ([Vol 3] Part H, Section 2.2.7 and 2.2.8).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(transparent)]
pub struct Addr([u8; 7]);

impl Addr {
    /// Creates a device address from a little-endian encoded byte array.
    #[inline]
    #[must_use]
    pub fn from_le_bytes(is_random: bool, mut v: [u8; 6]) -> Self {
        v.reverse();
        let mut addr = Self::default();
        addr.0[0] = u8::from(is_random);
        addr.0[1..].copy_from_slice(&v);
        addr
    }
}

/// Computes the GATT database hash ([Vol 3] Part G, Section 7.3): AES-CMAC
/// over the concatenated attribute records, keyed with all zeros.
#[inline]
#[must_use]
pub fn database_hash(msg: &[u8]) -> [u8; 16] {
    cmac::aes_cmac(&[0; 16], msg)
}

/// Concatenated `AuthReq`, OOB data flag and, and IO capability parameters used
/// by [`f6`] function ([Vol 3] Part H, Section 2.2.8).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[must_use]
#[repr(transparent)]
pub struct IoCap([u8; 3]);

impl IoCap {
    /// Creates new `IoCap` parameter.
    #[inline(always)]
    pub fn new(auth_req: u8, oob: bool, io_cap: u8) -> Self {
        Self([auth_req, u8::from(oob), io_cap])
    }
}
