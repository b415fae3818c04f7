//! Database driver implementations behind [`LocalBackend`].
//! Each driver is conditionally compiled based on features

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "mongodb")]
pub mod mongo;

#[cfg(feature = "sqlite-driver")]
pub mod sqlite;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::backend::{BackendRequest, BackendResponse, BackendService, ConnectRequest, ConnectResponse};
use super::connection::Engine;
use super::error::{ConnectionError, Result};

pub fn generate_connection_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// In-process Backend Execution Service over the compiled drivers.
///
/// Connection ids are generated here; each id remembers its engine so that
/// listing calls reach the right driver.
pub struct LocalBackend {
    connect_timeout: Duration,
    engines: Mutex<HashMap<String, Engine>>,
    #[cfg(feature = "sqlite-driver")]
    sqlite: sqlite::SqliteDriver,
    #[cfg(feature = "postgres")]
    postgres: postgres::PostgresDriver,
    #[cfg(feature = "mongodb")]
    mongo: mongo::MongoDriver,
}

impl LocalBackend {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            engines: Mutex::new(HashMap::new()),
            #[cfg(feature = "sqlite-driver")]
            sqlite: sqlite::SqliteDriver::new(),
            #[cfg(feature = "postgres")]
            postgres: postgres::PostgresDriver::new(),
            #[cfg(feature = "mongodb")]
            mongo: mongo::MongoDriver::new(),
        }
    }

    fn engine_of(&self, connection_id: &str) -> Result<Engine> {
        self.engines
            .lock()
            .map_err(|e| ConnectionError::BackendFailure(e.to_string()))?
            .get(connection_id)
            .copied()
            .ok_or_else(|| ConnectionError::UnknownConnection(connection_id.to_string()))
    }

    fn register(&self, connection_id: &str, engine: Engine) -> Result<()> {
        self.engines
            .lock()
            .map_err(|e| ConnectionError::BackendFailure(e.to_string()))?
            .insert(connection_id.to_string(), engine);
        Ok(())
    }

    fn forget(&self, connection_id: &str) -> Result<Option<Engine>> {
        Ok(self
            .engines
            .lock()
            .map_err(|e| ConnectionError::BackendFailure(e.to_string()))?
            .remove(connection_id))
    }

    async fn connect(&self, request: ConnectRequest) -> ConnectResponse {
        let engine = request.engine();
        let connection_id = generate_connection_id();
        let outcome = self.open(&connection_id, request).await;

        match outcome.and_then(|()| self.register(&connection_id, engine)) {
            Ok(()) => ConnectResponse::connected(
                connection_id,
                format!("{} connection established", engine.name()),
            ),
            Err(e) => ConnectResponse::refused(format!(
                "Failed to connect to {}: {}",
                engine.name(),
                e
            )),
        }
    }

    #[allow(unused_variables)]
    async fn open(&self, connection_id: &str, request: ConnectRequest) -> Result<()> {
        match request {
            #[cfg(feature = "sqlite-driver")]
            ConnectRequest::File { path } => self.sqlite.connect(connection_id, path).await,

            #[cfg(feature = "postgres")]
            ConnectRequest::Server {
                engine: Engine::ClientServerRelational,
                target,
            } => self.postgres.connect(connection_id, &target, self.connect_timeout).await,

            #[cfg(feature = "mongodb")]
            ConnectRequest::Server {
                engine: Engine::Document,
                target,
            } => self.mongo.connect(connection_id, &target, self.connect_timeout).await,

            // Fallback for when feature not compiled
            #[allow(unreachable_patterns)]
            other => Err(ConnectionError::DriverNotAvailable(other.engine().feature_name())),
        }
    }

    #[allow(unused_variables)]
    async fn route(&self, engine: Engine, request: BackendRequest) -> Result<BackendResponse> {
        match (engine, request) {
            #[cfg(feature = "sqlite-driver")]
            (Engine::FileRelational, BackendRequest::ExecuteQuery { connection_id, query, .. }) => {
                let result = self.sqlite.execute(&connection_id, query.to_text()).await;
                Ok(BackendResponse::Query(result.to_wire()))
            }
            #[cfg(feature = "sqlite-driver")]
            (Engine::FileRelational, BackendRequest::GetTables { connection_id }) => {
                Ok(BackendResponse::Names(self.sqlite.tables(&connection_id).await?))
            }

            #[cfg(feature = "postgres")]
            (Engine::ClientServerRelational, BackendRequest::ExecuteQuery { connection_id, query, .. }) => {
                let result = self.postgres.execute(&connection_id, &query.to_text()).await;
                Ok(BackendResponse::Query(result.to_wire()))
            }
            #[cfg(feature = "postgres")]
            (Engine::ClientServerRelational, BackendRequest::ListDatabases { connection_id }) => {
                Ok(BackendResponse::Names(self.postgres.databases(&connection_id).await?))
            }
            #[cfg(feature = "postgres")]
            (Engine::ClientServerRelational, BackendRequest::ListTables { connection_id, schema }) => {
                Ok(BackendResponse::Names(
                    self.postgres.tables(&connection_id, schema.as_deref()).await?,
                ))
            }
            #[cfg(feature = "postgres")]
            (Engine::ClientServerRelational, BackendRequest::GetTables { connection_id }) => {
                Ok(BackendResponse::Names(self.postgres.tables(&connection_id, None).await?))
            }

            #[cfg(feature = "mongodb")]
            (Engine::Document, BackendRequest::ExecuteQuery { connection_id, query, .. }) => {
                let result = self.mongo.execute(&connection_id, query).await;
                Ok(BackendResponse::Query(result.to_wire()))
            }
            #[cfg(feature = "mongodb")]
            (Engine::Document, BackendRequest::ListDatabases { connection_id }) => {
                Ok(BackendResponse::Names(self.mongo.databases(&connection_id).await?))
            }
            #[cfg(feature = "mongodb")]
            (Engine::Document, BackendRequest::ListCollections { connection_id, database }) => {
                Ok(BackendResponse::Names(
                    self.mongo.collections(&connection_id, &database).await?,
                ))
            }

            (engine, request) => Err(ConnectionError::BackendFailure(format!(
                "{} does not support {}",
                engine.name(),
                request.operation()
            ))),
        }
    }

    async fn disconnect(&self, connection_id: &str) -> Result<()> {
        match self.forget(connection_id)? {
            #[cfg(feature = "sqlite-driver")]
            Some(Engine::FileRelational) => self.sqlite.close(connection_id),
            #[cfg(feature = "postgres")]
            Some(Engine::ClientServerRelational) => self.postgres.close(connection_id),
            #[cfg(feature = "mongodb")]
            Some(Engine::Document) => self.mongo.close(connection_id),
            #[allow(unreachable_patterns)]
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl BackendService for LocalBackend {
    async fn call(&self, request: BackendRequest) -> Result<BackendResponse> {
        match request {
            BackendRequest::Connect(connect) => {
                Ok(BackendResponse::Connected(self.connect(connect).await))
            }
            BackendRequest::Disconnect { connection_id } => {
                self.disconnect(&connection_id).await?;
                Ok(BackendResponse::Done)
            }
            other => {
                let engine = match other.connection_id() {
                    Some(id) => self.engine_of(id)?,
                    None => {
                        return Err(ConnectionError::BackendFailure(format!(
                            "{} requires a connection id",
                            other.operation()
                        )))
                    }
                };
                tracing::debug!(engine = engine.tag(), operation = other.operation(), "routing request");
                self.route(engine, other).await
            }
        }
    }
}
