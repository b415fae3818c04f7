//! Per-engine translation from descriptors and raw query text into backend requests.
//! Adapters never touch the network.

use super::backend::{BackendRequest, ConnectRequest, DocumentQuery, QueryPayload, ServerTarget};
use super::connection::{ConnectionDescriptor, Engine, EngineParams, ServerParams};
use super::error::{ConnectionError, Result};

/// Schema listed for client/server relational connections
pub const DEFAULT_SCHEMA: &str = "public";

pub trait EngineAdapter: Send + Sync {
    fn engine(&self) -> Engine;

    /// Validate the descriptor and build the connect request for it
    fn build_connect_request(&self, descriptor: &ConnectionDescriptor) -> Result<BackendRequest>;

    /// Turn editor text into an `execute_query` request
    fn build_query_request(&self, connection_id: &str, raw_query: &str) -> Result<BackendRequest>;

    /// First-stage requests for building the schema tree
    fn build_list_structure_requests(
        &self,
        connection_id: &str,
        descriptor: &ConnectionDescriptor,
    ) -> Vec<BackendRequest>;
}

pub struct FileRelationalAdapter;

pub struct DocumentAdapter;

pub struct ClientServerAdapter;

static FILE_RELATIONAL: FileRelationalAdapter = FileRelationalAdapter;
static DOCUMENT: DocumentAdapter = DocumentAdapter;
static CLIENT_SERVER: ClientServerAdapter = ClientServerAdapter;

/// Factory - picks the adapter for an engine
pub fn adapter_for(engine: Engine) -> &'static dyn EngineAdapter {
    match engine {
        Engine::FileRelational => &FILE_RELATIONAL,
        Engine::Document => &DOCUMENT,
        Engine::ClientServerRelational => &CLIENT_SERVER,
    }
}

impl EngineAdapter for FileRelationalAdapter {
    fn engine(&self) -> Engine {
        Engine::FileRelational
    }

    fn build_connect_request(&self, descriptor: &ConnectionDescriptor) -> Result<BackendRequest> {
        match &descriptor.params {
            EngineParams::FileRelational { path } if !path.trim().is_empty() => {
                Ok(BackendRequest::Connect(ConnectRequest::File { path: path.clone() }))
            }
            EngineParams::FileRelational { .. } => Err(ConnectionError::InvalidConfiguration(
                "SQLite connections require a database file path".into(),
            )),
            _ => Err(engine_mismatch(self.engine(), descriptor)),
        }
    }

    fn build_query_request(&self, connection_id: &str, raw_query: &str) -> Result<BackendRequest> {
        Ok(sql_request(connection_id, raw_query, self.engine()))
    }

    fn build_list_structure_requests(
        &self,
        connection_id: &str,
        _descriptor: &ConnectionDescriptor,
    ) -> Vec<BackendRequest> {
        vec![BackendRequest::GetTables {
            connection_id: connection_id.to_string(),
        }]
    }
}

impl DocumentAdapter {
    /// Second-stage listing: the collections of one database
    pub fn collections_request(&self, connection_id: &str, database: &str) -> BackendRequest {
        BackendRequest::ListCollections {
            connection_id: connection_id.to_string(),
            database: database.to_string(),
        }
    }
}

impl EngineAdapter for DocumentAdapter {
    fn engine(&self) -> Engine {
        Engine::Document
    }

    fn build_connect_request(&self, descriptor: &ConnectionDescriptor) -> Result<BackendRequest> {
        match &descriptor.params {
            EngineParams::Document(params) => server_connect(self.engine(), params),
            _ => Err(engine_mismatch(self.engine(), descriptor)),
        }
    }

    fn build_query_request(&self, connection_id: &str, raw_query: &str) -> Result<BackendRequest> {
        let query = DocumentQuery::parse(raw_query)?;
        Ok(BackendRequest::ExecuteQuery {
            connection_id: connection_id.to_string(),
            query: QueryPayload::Document(query),
            engine: self.engine(),
        })
    }

    fn build_list_structure_requests(
        &self,
        connection_id: &str,
        _descriptor: &ConnectionDescriptor,
    ) -> Vec<BackendRequest> {
        vec![BackendRequest::ListDatabases {
            connection_id: connection_id.to_string(),
        }]
    }
}

impl EngineAdapter for ClientServerAdapter {
    fn engine(&self) -> Engine {
        Engine::ClientServerRelational
    }

    fn build_connect_request(&self, descriptor: &ConnectionDescriptor) -> Result<BackendRequest> {
        match &descriptor.params {
            EngineParams::ClientServerRelational(params) => server_connect(self.engine(), params),
            _ => Err(engine_mismatch(self.engine(), descriptor)),
        }
    }

    fn build_query_request(&self, connection_id: &str, raw_query: &str) -> Result<BackendRequest> {
        Ok(sql_request(connection_id, raw_query, self.engine()))
    }

    /// Database names are informational; tables are only listed when the
    /// connection is scoped to a database.
    fn build_list_structure_requests(
        &self,
        connection_id: &str,
        descriptor: &ConnectionDescriptor,
    ) -> Vec<BackendRequest> {
        let mut requests = vec![BackendRequest::ListDatabases {
            connection_id: connection_id.to_string(),
        }];
        if descriptor.database().is_some() {
            requests.push(BackendRequest::ListTables {
                connection_id: connection_id.to_string(),
                schema: Some(DEFAULT_SCHEMA.to_string()),
            });
        }
        requests
    }
}

fn sql_request(connection_id: &str, raw_query: &str, engine: Engine) -> BackendRequest {
    BackendRequest::ExecuteQuery {
        connection_id: connection_id.to_string(),
        query: QueryPayload::Sql(raw_query.to_string()),
        engine,
    }
}

/// A non-blank connection string wins over the discrete fields
fn server_connect(engine: Engine, params: &ServerParams) -> Result<BackendRequest> {
    let target = if let Some(uri) = params.connection_string() {
        ServerTarget::ConnectionString(uri.to_string())
    } else if let Some(host) = params.host() {
        ServerTarget::Params {
            host: host.to_string(),
            port: params.port,
            username: params.username.clone(),
            password: params.password.clone(),
            database: params.database().map(str::to_string),
        }
    } else {
        return Err(ConnectionError::InvalidConfiguration(format!(
            "{} connections require a connection string or a host",
            engine.name()
        )));
    };
    Ok(BackendRequest::Connect(ConnectRequest::Server { engine, target }))
}

fn engine_mismatch(expected: Engine, descriptor: &ConnectionDescriptor) -> ConnectionError {
    ConnectionError::InvalidConfiguration(format!(
        "{} adapter cannot connect a {} descriptor",
        expected.name(),
        descriptor.engine().name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_connect_requires_path() {
        let adapter = adapter_for(Engine::FileRelational);
        for path in ["", "   "] {
            let err = adapter
                .build_connect_request(&ConnectionDescriptor::file(path))
                .unwrap_err();
            assert!(matches!(err, ConnectionError::InvalidConfiguration(_)));
        }

        let request = adapter
            .build_connect_request(&ConnectionDescriptor::file("/data/app.db"))
            .unwrap();
        assert_eq!(
            request,
            BackendRequest::Connect(ConnectRequest::File {
                path: "/data/app.db".into()
            })
        );
    }

    #[test]
    fn test_server_connect_requires_host_or_uri() {
        for engine in [Engine::Document, Engine::ClientServerRelational] {
            let adapter = adapter_for(engine);
            let empty = match engine {
                Engine::Document => ConnectionDescriptor::document(ServerParams::default()),
                _ => ConnectionDescriptor::client_server(ServerParams::default()),
            };
            assert!(matches!(
                adapter.build_connect_request(&empty),
                Err(ConnectionError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn test_connection_string_takes_priority() {
        let mut params = ServerParams::endpoint("ignored-host", 1111).with_database("ignored");
        params.connection_string = Some("mongodb://real-host:27017".into());
        let request = adapter_for(Engine::Document)
            .build_connect_request(&ConnectionDescriptor::document(params))
            .unwrap();
        assert_eq!(
            request,
            BackendRequest::Connect(ConnectRequest::Server {
                engine: Engine::Document,
                target: ServerTarget::ConnectionString("mongodb://real-host:27017".into()),
            })
        );
    }

    #[test]
    fn test_connection_string_does_not_need_discrete_fields() {
        let descriptor = ConnectionDescriptor::client_server(ServerParams::from_connection_string(
            "postgres://localhost/app",
        ));
        assert!(adapter_for(Engine::ClientServerRelational)
            .build_connect_request(&descriptor)
            .is_ok());
    }

    #[test]
    fn test_discrete_params_are_forwarded() {
        let params = ServerParams::endpoint("localhost", 5432)
            .with_database("app")
            .with_credentials("app_user", "secret");
        let request = adapter_for(Engine::ClientServerRelational)
            .build_connect_request(&ConnectionDescriptor::client_server(params))
            .unwrap();
        assert_eq!(
            request,
            BackendRequest::Connect(ConnectRequest::Server {
                engine: Engine::ClientServerRelational,
                target: ServerTarget::Params {
                    host: "localhost".into(),
                    port: Some(5432),
                    username: Some("app_user".into()),
                    password: Some("secret".into()),
                    database: Some("app".into()),
                },
            })
        );
    }

    #[test]
    fn test_engine_mismatch_is_rejected() {
        let err = adapter_for(Engine::Document)
            .build_connect_request(&ConnectionDescriptor::file("/data/app.db"))
            .unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_sql_passes_through_unchanged() {
        let sql = "select *\n  from \"orders\" where id = 1; -- trailing";
        for engine in [Engine::FileRelational, Engine::ClientServerRelational] {
            let request = adapter_for(engine).build_query_request("c1", sql).unwrap();
            assert_eq!(
                request,
                BackendRequest::ExecuteQuery {
                    connection_id: "c1".into(),
                    query: QueryPayload::Sql(sql.into()),
                    engine,
                }
            );
        }
    }

    #[test]
    fn test_document_query_must_be_structured() {
        let adapter = adapter_for(Engine::Document);
        assert!(matches!(
            adapter.build_query_request("c1", "SELECT * FROM users"),
            Err(ConnectionError::MalformedQuery(_))
        ));

        let request = adapter
            .build_query_request(
                "c1",
                r#"{"db": "shop", "collection": "users", "operation": "find", "filter": {"x": 1}}"#,
            )
            .unwrap();
        match request {
            BackendRequest::ExecuteQuery {
                query: QueryPayload::Document(query),
                engine,
                ..
            } => {
                assert_eq!(engine, Engine::Document);
                assert_eq!(query.collection, "users");
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_list_structure_requests() {
        let file = ConnectionDescriptor::file("/data/app.db");
        assert_eq!(
            adapter_for(Engine::FileRelational).build_list_structure_requests("c1", &file),
            vec![BackendRequest::GetTables {
                connection_id: "c1".into()
            }]
        );

        let scoped = ConnectionDescriptor::client_server(
            ServerParams::endpoint("localhost", 5432).with_database("app"),
        );
        let requests =
            adapter_for(Engine::ClientServerRelational).build_list_structure_requests("c1", &scoped);
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[1],
            BackendRequest::ListTables {
                connection_id: "c1".into(),
                schema: Some("public".into()),
            }
        );

        let unscoped =
            ConnectionDescriptor::client_server(ServerParams::endpoint("localhost", 5432));
        assert_eq!(
            adapter_for(Engine::ClientServerRelational)
                .build_list_structure_requests("c1", &unscoped)
                .len(),
            1
        );
    }
}
