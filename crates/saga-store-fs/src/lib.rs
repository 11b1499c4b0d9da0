//! File-backed [`SagaStore`](saga_engine::SagaStore) for the saga engine.
//!
//! Every saga is one pretty-printed JSON document named after its id, so the
//! store directory can be inspected with ordinary tools or with
//! `saga-inspect`.

mod error;
mod store;

pub use error::FsStoreError;
pub use store::FsSagaStore;
