pub mod adapter;
pub mod backend;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod drivers;
pub mod error;
pub mod registry;
pub mod result;
pub mod schema;
pub mod session;
pub mod storage;

#[cfg(test)]
mod testing;

pub use backend::{BackendRequest, BackendResponse, BackendService};
pub use config::ClientConfig;
pub use connection::{ConnectionDescriptor, Engine, ServerParams};
pub use drivers::LocalBackend;
pub use error::{ConnectionError, Result};
pub use registry::ConnectionRegistry;
pub use result::{render_value, QueryOutcome, QueryResult};
pub use schema::{query_for_selection, ExplorerState, NodeKind, SchemaNode};
pub use session::Session;
pub use storage::{MemoryPreferencesStore, PreferencesStore, SqlitePreferencesStore};
