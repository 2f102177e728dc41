//! HomeHub Vault - Cryptographic Core
//!
//! Master-key generation and wrapping, slow key derivation for human
//! secrets, and the streaming file cipher.

pub mod kdf;
pub mod keys;
pub mod stream;
pub mod wrap;

pub use kdf::*;
pub use keys::*;
pub use stream::*;
pub use wrap::*;
