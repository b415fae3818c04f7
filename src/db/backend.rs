//! Request/response contract with the Backend Execution Service.
//!
//! Every interaction is a single [`BackendRequest`] keyed by operation name,
//! answered by one [`BackendResponse`] or an error. Adapters build requests,
//! the dispatcher and explorer send them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use super::connection::Engine;
use super::error::{ConnectionError, Result};

/// Keys every document query must carry
pub const DOCUMENT_QUERY_KEYS: [&str; 4] = ["db", "collection", "operation", "filter"];

/// Structured query understood by the document engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentQuery {
    pub db: String,
    pub collection: String,
    pub operation: String,
    /// Passed through opaquely
    pub filter: Value,
    /// Operation-specific extras such as `document`, `update` or `limit`
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DocumentQuery {
    /// `find` with an empty filter
    pub fn find(db: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            collection: collection.into(),
            operation: "find".to_string(),
            filter: Value::Object(Map::new()),
            extra: Map::new(),
        }
    }

    /// Parse raw editor text into a document query
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw).map_err(|e| {
            ConnectionError::MalformedQuery(format!("query is not valid JSON: {}", e))
        })?;
        let Value::Object(mut object) = value else {
            return Err(ConnectionError::MalformedQuery(
                "query must be a JSON object".into(),
            ));
        };

        let missing: Vec<&str> = DOCUMENT_QUERY_KEYS
            .iter()
            .copied()
            .filter(|key| !object.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            return Err(ConnectionError::MalformedQuery(format!(
                "query is missing required field(s): {}",
                missing.join(", ")
            )));
        }

        let db = take_string(&mut object, "db")?;
        let collection = take_string(&mut object, "collection")?;
        let operation = take_string(&mut object, "operation")?;
        let filter = object.remove("filter").unwrap_or(Value::Null);

        Ok(Self {
            db,
            collection,
            operation,
            filter,
            extra: object,
        })
    }

    /// Pretty JSON, as placed in the query editor
    pub fn to_query_text(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

fn take_string(object: &mut Map<String, Value>, key: &str) -> Result<String> {
    match object.remove(key) {
        Some(Value::String(s)) => Ok(s),
        _ => Err(ConnectionError::MalformedQuery(format!(
            "field '{}' must be a string",
            key
        ))),
    }
}

/// Query in the shape a given engine expects
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPayload {
    /// Opaque SQL text
    Sql(String),
    Document(DocumentQuery),
}

impl QueryPayload {
    /// Text form sent over the wire
    pub fn to_text(&self) -> String {
        match self {
            QueryPayload::Sql(sql) => sql.clone(),
            QueryPayload::Document(query) => query.to_query_text(),
        }
    }
}

/// Where a networked engine should connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerTarget {
    ConnectionString(String),
    Params {
        host: String,
        port: Option<u16>,
        username: Option<String>,
        password: Option<String>,
        database: Option<String>,
    },
}

/// Engine-specific connect configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectRequest {
    File { path: String },
    Server { engine: Engine, target: ServerTarget },
}

impl ConnectRequest {
    pub fn engine(&self) -> Engine {
        match self {
            ConnectRequest::File { .. } => Engine::FileRelational,
            ConnectRequest::Server { engine, .. } => *engine,
        }
    }
}

/// Answer to a connect request; a refused connect is still a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub success: bool,
    #[serde(default)]
    pub connection_id: Option<String>,
    pub message: String,
}

impl ConnectResponse {
    pub fn connected(connection_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            connection_id: Some(connection_id.into()),
            message: message.into(),
        }
    }

    pub fn refused(message: impl Into<String>) -> Self {
        Self {
            success: false,
            connection_id: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendRequest {
    Connect(ConnectRequest),
    ExecuteQuery {
        connection_id: String,
        query: QueryPayload,
        engine: Engine,
    },
    /// Flat table listing of a file database
    GetTables { connection_id: String },
    ListDatabases { connection_id: String },
    ListCollections { connection_id: String, database: String },
    ListTables { connection_id: String, schema: Option<String> },
    Disconnect { connection_id: String },
}

impl BackendRequest {
    pub fn operation(&self) -> &'static str {
        match self {
            BackendRequest::Connect(_) => "connect",
            BackendRequest::ExecuteQuery { .. } => "execute_query",
            BackendRequest::GetTables { .. } => "get_tables",
            BackendRequest::ListDatabases { .. } => "list_databases",
            BackendRequest::ListCollections { .. } => "list_collections",
            BackendRequest::ListTables { .. } => "list_tables",
            BackendRequest::Disconnect { .. } => "disconnect",
        }
    }

    pub fn connection_id(&self) -> Option<&str> {
        match self {
            BackendRequest::Connect(_) => None,
            BackendRequest::ExecuteQuery { connection_id, .. }
            | BackendRequest::GetTables { connection_id }
            | BackendRequest::ListDatabases { connection_id }
            | BackendRequest::ListCollections { connection_id, .. }
            | BackendRequest::ListTables { connection_id, .. }
            | BackendRequest::Disconnect { connection_id } => Some(connection_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendResponse {
    Connected(ConnectResponse),
    /// Raw query result; normalized by the dispatcher
    Query(Value),
    Names(Vec<String>),
    Done,
}

impl BackendResponse {
    pub fn into_connected(self) -> Result<ConnectResponse> {
        match self {
            BackendResponse::Connected(response) => Ok(response),
            other => Err(unexpected("connect", &other)),
        }
    }

    pub fn into_query(self) -> Result<Value> {
        match self {
            BackendResponse::Query(value) => Ok(value),
            other => Err(unexpected("execute_query", &other)),
        }
    }

    pub fn into_names(self, operation: &str) -> Result<Vec<String>> {
        match self {
            BackendResponse::Names(names) => Ok(names),
            other => Err(unexpected(operation, &other)),
        }
    }
}

fn unexpected(operation: &str, response: &BackendResponse) -> ConnectionError {
    let kind = match response {
        BackendResponse::Connected(_) => "connect response",
        BackendResponse::Query(_) => "query result",
        BackendResponse::Names(_) => "name list",
        BackendResponse::Done => "acknowledgement",
    };
    ConnectionError::BackendFailure(format!("unexpected {} for {}", kind, operation))
}

/// The service that actually talks to database engines
#[async_trait]
pub trait BackendService: Send + Sync {
    async fn call(&self, request: BackendRequest) -> Result<BackendResponse>;
}

/// Send a request, failing with [`ConnectionError::Timeout`] once `timeout` elapses.
/// The request itself is not cancelled on the backend.
pub async fn call_with_timeout(
    backend: &dyn BackendService,
    request: BackendRequest,
    timeout: Duration,
) -> Result<BackendResponse> {
    let operation = request.operation();
    tracing::debug!(operation, connection_id = ?request.connection_id(), "backend call");
    tokio::time::timeout(timeout, backend.call(request))
        .await
        .map_err(|_| ConnectionError::Timeout(timeout))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_document_query() {
        let query = DocumentQuery::parse(
            r#"{"db": "shop", "collection": "users", "operation": "find", "filter": {"age": {"$gt": 30}}, "limit": 5}"#,
        )
        .unwrap();
        assert_eq!(query.db, "shop");
        assert_eq!(query.collection, "users");
        assert_eq!(query.operation, "find");
        assert_eq!(query.filter, json!({"age": {"$gt": 30}}));
        assert_eq!(query.option("limit"), Some(&json!(5)));
    }

    #[test]
    fn test_parse_rejects_missing_keys() {
        for raw in [
            r#"{"collection": "users", "operation": "find", "filter": {}}"#,
            r#"{"db": "shop", "operation": "find", "filter": {}}"#,
            r#"{"db": "shop", "collection": "users", "filter": {}}"#,
            r#"{"db": "shop", "collection": "users", "operation": "find"}"#,
        ] {
            assert!(matches!(
                DocumentQuery::parse(raw),
                Err(ConnectionError::MalformedQuery(_))
            ));
        }
    }

    #[test]
    fn test_parse_rejects_non_objects() {
        for raw in ["SELECT 1", "[1, 2]", "\"find\"", "", "{"] {
            assert!(matches!(
                DocumentQuery::parse(raw),
                Err(ConnectionError::MalformedQuery(_))
            ));
        }
    }

    #[test]
    fn test_missing_keys_are_named() {
        let err = DocumentQuery::parse(r#"{"db": "shop"}"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Malformed query: query is missing required field(s): collection, operation, filter"
        );
    }

    #[test]
    fn test_find_query_text() {
        let text = DocumentQuery::find("shop", "users").to_query_text();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({"db": "shop", "collection": "users", "operation": "find", "filter": {}})
        );
    }

    #[test]
    fn test_response_conversions() {
        let names = BackendResponse::Names(vec!["a".into()]);
        assert_eq!(names.into_names("get_tables").unwrap(), vec!["a".to_string()]);

        let err = BackendResponse::Done.into_names("get_tables").unwrap_err();
        assert!(matches!(err, ConnectionError::BackendFailure(_)));
    }

    #[test]
    fn test_operation_names() {
        let request = BackendRequest::ListCollections {
            connection_id: "c1".into(),
            database: "shop".into(),
        };
        assert_eq!(request.operation(), "list_collections");
        assert_eq!(request.connection_id(), Some("c1"));
        assert_eq!(
            BackendRequest::Connect(ConnectRequest::File { path: "a.db".into() }).connection_id(),
            None
        );
    }
}
