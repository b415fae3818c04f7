//! Connection and query layer for a multi-engine database client.
//!
//! Saved connections live in a [`db::ConnectionRegistry`]; a [`db::Session`]
//! connects through a [`db::BackendService`], browses the schema tree and runs
//! queries, normalizing every answer into a [`db::QueryResult`].

pub mod db;
