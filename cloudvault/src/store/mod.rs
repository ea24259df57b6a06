//! External storage boundaries.
//!
//! The durable object store is the authoritative copy of every object; the
//! metadata store receives descriptive bookkeeping. Both are consumed
//! through dyn-compatible traits so gateways can be wired against real
//! clients, in-memory fakes or test doubles interchangeably.

mod durable;
mod metadata;
mod types;

pub use durable::{BoxFuture, ByteStream, DurableStore, MemoryStore};
pub use metadata::{MemoryMetadataStore, MetadataStore, ObjectMetadata};
pub use types::StoreError;
