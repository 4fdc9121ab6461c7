//! Feedimg - tiered image acquisition for feed-style clients.
//!
//! Images are served from a cost-bounded memory cache, then a content-addressed
//! disk cache, then the network. Concurrent requests for the same URL share a
//! single download, and every load can be cancelled.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing use cases.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing caches, transport and configuration.
pub mod infrastructure;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "feedimg";

/// Qualifier used to locate platform directories.
pub const APP_QUALIFIER: &str = "com";

/// Organization used to locate platform directories.
pub const APP_ORGANIZATION: &str = "feedimg";
