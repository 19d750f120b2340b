//! Authentication primitives for the hub.
//!
//! Legacy device credentials (Basic), bearer-token resolution (static
//! service token + signed session tokens), and password hashing.

pub mod basic;
pub mod claims;
pub mod password;
pub mod token;

pub use basic::{DecodeError, DeviceCredential, decode_basic_header};
pub use claims::SessionClaims;
pub use token::{Principal, TokenAuthority, TokenError};
