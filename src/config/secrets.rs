//! Secret handling utilities.
//!
//! Re-exports the secrecy types used for session cookies.

pub use secrecy::{ExposeSecret, SecretString};
