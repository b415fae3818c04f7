//! The active-connection flow: connect, explore, query, disconnect.
//!
//! Backend calls cannot be cancelled. Every change of active connection bumps
//! a [`Generation`], and responses are only applied when the ticket they were
//! issued under still matches the active connection.

use std::sync::Arc;
use std::time::Duration;

use super::adapter::adapter_for;
use super::backend::{call_with_timeout, BackendRequest, BackendService};
use super::config::ClientConfig;
use super::connection::{ConnectionDescriptor, Engine};
use super::dispatcher::QueryDispatcher;
use super::error::{ConnectionError, Result};
use super::registry::ConnectionRegistry;
use super::result::QueryResult;
use super::schema::{ExplorerState, SchemaExplorer, SchemaNode};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    fn next(self) -> Self {
        Generation(self.0.wrapping_add(1))
    }
}

#[derive(Debug, Clone)]
pub struct ActiveConnection {
    pub descriptor: ConnectionDescriptor,
    pub connection_id: String,
    pub generation: Generation,
}

impl ActiveConnection {
    pub fn engine(&self) -> Engine {
        self.descriptor.engine()
    }
}

/// A schema listing issued against one activation
pub struct SchemaTicket {
    generation: Generation,
    connection_id: String,
    descriptor: ConnectionDescriptor,
    backend: Arc<dyn BackendService>,
    timeout: Duration,
}

impl SchemaTicket {
    pub async fn run(&self) -> Result<Vec<SchemaNode>> {
        SchemaExplorer::load_tree(
            self.backend.as_ref(),
            &self.connection_id,
            &self.descriptor,
            self.timeout,
        )
        .await
    }
}

/// A query issued against one activation
pub struct QueryTicket {
    generation: Generation,
    connection_id: String,
    engine: Engine,
    raw_query: String,
    dispatcher: QueryDispatcher,
}

impl QueryTicket {
    pub async fn run(&self) -> QueryResult {
        self.dispatcher
            .execute(&self.connection_id, self.engine, &self.raw_query)
            .await
    }
}

pub struct Session {
    backend: Arc<dyn BackendService>,
    config: ClientConfig,
    registry: ConnectionRegistry,
    dispatcher: QueryDispatcher,
    explorer: SchemaExplorer,
    active: Option<ActiveConnection>,
    generation: Generation,
    last_result: Option<QueryResult>,
}

impl Session {
    pub fn new(backend: Arc<dyn BackendService>, registry: ConnectionRegistry, config: ClientConfig) -> Self {
        let dispatcher = QueryDispatcher::new(backend.clone(), config.request_timeout);
        Self {
            backend,
            config,
            registry,
            dispatcher,
            explorer: SchemaExplorer::new(),
            active: None,
            generation: Generation::default(),
            last_result: None,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn active(&self) -> Option<&ActiveConnection> {
        self.active.as_ref()
    }

    pub fn explorer(&self) -> &ExplorerState {
        self.explorer.state()
    }

    pub fn last_result(&self) -> Option<&QueryResult> {
        self.last_result.as_ref()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Connect, record the connection and make it the active one.
    ///
    /// Invalid descriptors are rejected before any backend call; a refused
    /// connect surfaces as [`ConnectionError::BackendFailure`] with the
    /// backend's message.
    pub async fn connect(&mut self, descriptor: ConnectionDescriptor) -> Result<&ActiveConnection> {
        let engine = descriptor.engine();
        let request = adapter_for(engine).build_connect_request(&descriptor)?;

        let response = call_with_timeout(self.backend.as_ref(), request, self.config.connect_timeout)
            .await?
            .into_connected()?;
        if !response.success {
            tracing::warn!(engine = engine.tag(), "connect refused: {}", response.message);
            return Err(ConnectionError::BackendFailure(response.message));
        }
        let connection_id = response
            .connection_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                ConnectionError::BackendFailure("backend accepted the connection without an id".into())
            })?;
        tracing::info!(engine = engine.tag(), %connection_id, "{}", response.message);

        // Release the handle being replaced
        if self
            .active
            .as_ref()
            .is_some_and(|active| active.connection_id != connection_id)
        {
            self.disconnect().await;
        }

        let mut descriptor = descriptor;
        let previous_id = descriptor.connection_id.replace(connection_id.clone());
        let stored = self
            .registry
            .upsert_reconnected(previous_id.as_deref(), descriptor)
            .clone();
        Ok(self.activate(stored, connection_id))
    }

    fn activate(&mut self, descriptor: ConnectionDescriptor, connection_id: String) -> &ActiveConnection {
        self.generation = self.generation.next();
        self.explorer.reset();
        self.last_result = None;
        self.active.insert(ActiveConnection {
            descriptor,
            connection_id,
            generation: self.generation,
        })
    }

    fn deactivate(&mut self) -> Option<ActiveConnection> {
        self.generation = self.generation.next();
        self.explorer.reset();
        self.last_result = None;
        self.active.take()
    }

    /// Drop the active connection and release it on the backend, best effort
    pub async fn disconnect(&mut self) {
        let Some(active) = self.deactivate() else {
            return;
        };
        let request = BackendRequest::Disconnect {
            connection_id: active.connection_id.clone(),
        };
        match call_with_timeout(self.backend.as_ref(), request, self.config.request_timeout).await {
            Ok(_) => tracing::info!(connection_id = %active.connection_id, "disconnected"),
            Err(e) => tracing::warn!(connection_id = %active.connection_id, "disconnect failed: {}", e),
        }
    }

    /// Forget a saved connection; clears it if it is the active one
    pub fn remove_connection(&mut self, connection_id: &str) {
        self.registry.remove(connection_id);
        if self
            .active
            .as_ref()
            .is_some_and(|active| active.connection_id == connection_id)
        {
            self.deactivate();
        }
    }

    fn is_current(&self, generation: Generation, connection_id: &str) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.generation == generation && active.connection_id == connection_id)
    }

    /// Enter `Loading` and hand out the listing to run; `None` without an active connection
    pub fn begin_schema_refresh(&mut self) -> Option<SchemaTicket> {
        let active = self.active.as_ref()?;
        let ticket = SchemaTicket {
            generation: active.generation,
            connection_id: active.connection_id.clone(),
            descriptor: active.descriptor.clone(),
            backend: self.backend.clone(),
            timeout: self.config.request_timeout,
        };
        self.explorer.begin_loading();
        Some(ticket)
    }

    /// Apply a finished listing; returns false when it arrived too late
    pub fn apply_schema(&mut self, ticket: &SchemaTicket, result: Result<Vec<SchemaNode>>) -> bool {
        if !self.is_current(ticket.generation, &ticket.connection_id) {
            tracing::warn!(connection_id = %ticket.connection_id, "discarding stale schema listing");
            return false;
        }
        if let Err(e) = &result {
            tracing::warn!(connection_id = %ticket.connection_id, "schema listing failed: {}", e);
        }
        self.explorer.finish(result);
        true
    }

    pub async fn refresh_schema(&mut self) -> &ExplorerState {
        if let Some(ticket) = self.begin_schema_refresh() {
            let result = ticket.run().await;
            self.apply_schema(&ticket, result);
        }
        self.explorer.state()
    }

    pub fn begin_query(&self, raw_query: &str) -> Option<QueryTicket> {
        let active = self.active.as_ref()?;
        Some(QueryTicket {
            generation: active.generation,
            connection_id: active.connection_id.clone(),
            engine: active.engine(),
            raw_query: raw_query.to_string(),
            dispatcher: self.dispatcher.clone(),
        })
    }

    /// Apply a finished query; returns false when it arrived too late
    pub fn apply_query(&mut self, ticket: &QueryTicket, result: QueryResult) -> bool {
        if !self.is_current(ticket.generation, &ticket.connection_id) {
            tracing::warn!(connection_id = %ticket.connection_id, "discarding stale query result");
            return false;
        }
        self.last_result = Some(result);
        true
    }

    /// Run a query against the active connection; `None` when there is none
    pub async fn execute(&mut self, raw_query: &str) -> Option<&QueryResult> {
        let ticket = self.begin_query(raw_query)?;
        let result = ticket.run().await;
        self.apply_query(&ticket, result);
        self.last_result.as_ref()
    }
}
