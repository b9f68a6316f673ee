//! # hfstore testkit
//!
//! Test utilities for hfstore.
//!
//! This crate provides:
//! - Store fixtures (in-memory and directory-backed)
//! - A reference model that applies commits serially
//! - Property-based generators using proptest
//! - Fault-injecting backends for crash recovery tests
//! - Concurrent merge stress testing
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hfstore_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_store() {
//!     with_temp_store(|store| {
//!         let mut session = store.session();
//!         // ... stage and commit
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod model;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::model::*;
    pub use crate::stress::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use model::*;
pub use stress::*;
