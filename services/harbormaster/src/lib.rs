//! # Harbormaster
//!
//! Administrative API for a managed container-image registry: controls which
//! external accounts may pull and push images across a fleet of
//! repositories, and issues the opaque bearer tokens that gate the API
//! itself.
//!
//! ## Features
//!
//! - Per-repository policy documents with a canonical text form
//! - Fleet-wide grant/revoke fan-out backed by a granted-accounts ledger
//! - Token lifecycle (create, validate, delete) over a key-value store
//! - Pluggable backends via the [`RegistryFleet`] trait and the `kvstore`
//!   crate
//! - Builder pattern for configuration
//!
//! ## Example
//!
//! ```no_run
//! use harbormaster::{Fleet, HarbormasterBuilder, MemoryFleet};
//! use kvstore::MemoryDriver;
//!
//! # fn example() {
//! let store = MemoryDriver::with_tables(&["tokens", "accounts"]);
//! let app = HarbormasterBuilder::new()
//!     .store(store.into())
//!     .fleet(Fleet::new(MemoryFleet::new()))
//!     .build();
//!
//! // Use the service with axum or any tower-compatible server
//! # }
//! ```

mod access;
mod api;
mod error;
mod policy;
mod registry;
mod token;

pub use access::AccountAccessManager;
pub use api::{Harbormaster, HarbormasterBuilder};
pub use error::{HarbormasterError, HarbormasterResult};
pub use policy::{PolicyDocument, PolicyError, POLICY_ACTIONS};
pub use registry::{
    Fleet, FleetError, InvalidRepositoryName, MemoryFleet, RegistryFleet, RepositoryName,
    RepositoryPage,
};
pub use token::TokenManager;
