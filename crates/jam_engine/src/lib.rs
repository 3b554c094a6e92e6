//! # Jam Engine
//!
//! Async runtime around the Jam store.
//!
//! This crate provides:
//! - [`AppStore`]: shared snapshot handle, views region and event bus
//! - [`MutationSerializer`]: the single consumer that applies every write
//! - [`ViewLoader`]: runs view queries and caches their identifiers
//! - [`SyncEngine`]: drains committed change sets through a [`SyncTransport`]
//! - [`Session`]: ties the above together for one store
//!
//! ## Example
//!
//! ```rust,ignore
//! use jam_engine::{EngineConfig, MockTransport, Session};
//!
//! let session = Session::start(EngineConfig::default());
//! session.serializer().start_transaction("edit").await?;
//! session.serializer().commit_transaction("edit").await?;
//! session.serializer().commit().await?;
//!
//! let sync = session.sync_engine(MockTransport::new());
//! sync.sync_with_retry().await?;
//! session.shutdown().await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod events;
mod serializer;
mod session;
mod store;
mod sync;
mod transport;
mod view;

pub use config::{EngineConfig, RetryConfig};
pub use error::{EngineError, EngineResult};
pub use events::{RequestId, StoreEvent, WriteIntent};
pub use serializer::{Ack, MutationSerializer, SerializerHandle, SerializerTask};
pub use session::Session;
pub use store::AppStore;
pub use sync::{SyncEngine, SyncReport};
pub use transport::{AtomicFn, AtomicTransport, MockTransport, SyncTransport};
pub use view::{
    query_fn, FetchError, FetchResult, Meta, Props, QueryFn, View, ViewLoader, ViewOutcome,
    ViewRequest, ViewResult, ViewStatus,
};
