//! Content-addressed compute-or-load caching for preprocessing stages.
//!
//! Expensive per-dataset work (vocabulary construction, graph extraction,
//! embedding matrices) is deterministic in its configuration, so repeated
//! runs should load previous results instead of recomputing. A stage opts in
//! by implementing [`Cacheable`]: it declares which attributes it persists
//! (each with a [`StorageKind`]) and which attribute values fingerprint its
//! configuration. The fingerprint string doubles as the storage namespace,
//! so an upstream stage's identity can be folded into a downstream stage's
//! uniquers for transitive invalidation.
//!
//! # Guarantees
//!
//! After [`ensure`] returns, every declared attribute is bound and
//! consistent with either a prior [`store`] or a fresh `process()` — never
//! partially populated. Contract violations ([`CacheError::MissingAttribute`],
//! [`CacheError::UnknownStorageKind`]) surface immediately; there is no
//! partial-cache fallback.
//!
//! # Concurrency
//!
//! The only mutable resource is the blob store. Concurrent `ensure` calls
//! for the same identity may both compute and both store; that race is
//! tolerated as last-writer-wins and no distributed locking is provided.

pub mod error;
pub mod kind;
pub mod serializer;
pub mod stage;
pub mod store;

pub use error::{CacheError, CacheResult};
pub use kind::{AttrPayload, StorageKind};
pub use stage::{ensure, exists, identity, load, store, Cacheable, CachedAttr, Provenance};
pub use store::{BlobStore, FsBlobStore};
