//! # appgate-auth
//!
//! Authenticating as an app installation:
//! - Signed app assertions (RS256 JWT, at most ten minutes) from the app's private key
//! - Assertion-for-token exchange with the platform token endpoint
//! - A per-installation token cache with single-flight refresh
//! - An installation-scoped REST client built on the cache

pub mod clock;
pub mod identity;
pub mod minter;
pub mod exchange;
pub mod token_cache;
pub mod client;
pub mod error;

pub use clock::*;
pub use identity::*;
pub use minter::*;
pub use exchange::*;
pub use token_cache::*;
pub use client::*;
pub use error::{AuthError, KeyError, PlatformError, Result};
