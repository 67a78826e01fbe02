//! Static-key trust model: signing-key resolution and detached OpenPGP
//! signature verification using sequoia-openpgp.

pub mod signing_key;
pub mod verify;

pub use signing_key::{BUILTIN_SIGNING_KEY, FIRST_PARTY_OWNER, SignatureChecker};
pub use verify::parse_keyring;
