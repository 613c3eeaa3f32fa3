/// Huddle Crypto Library
///
/// Room access control: a room is guarded by the SHA-256 digest of its
/// password. Every joiner who knows the password computes the same digest,
/// so digest equality is the whole check.
///
/// There is no salt and no per-user secret. A leaked digest table can be
/// attacked offline; rooms are a lightweight grouping, not an account system.
pub mod password;

pub use password::{DIGEST_HEX_LEN, digests_match, hash_password};
