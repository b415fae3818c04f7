use std::sync::Arc;
use std::time::Duration;

use super::adapter::adapter_for;
use super::backend::{call_with_timeout, BackendService};
use super::connection::Engine;
use super::result::QueryResult;

/// Routes a query to the right adapter and backend call, and always answers
/// with a [`QueryResult`]. Holds no per-connection state.
#[derive(Clone)]
pub struct QueryDispatcher {
    backend: Arc<dyn BackendService>,
    timeout: Duration,
}

impl QueryDispatcher {
    pub fn new(backend: Arc<dyn BackendService>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub async fn execute(&self, connection_id: &str, engine: Engine, raw_query: &str) -> QueryResult {
        let request = match adapter_for(engine).build_query_request(connection_id, raw_query) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(engine = engine.tag(), "query rejected before dispatch: {}", e);
                return QueryResult::failed(e.to_string());
            }
        };

        let response = call_with_timeout(self.backend.as_ref(), request, self.timeout)
            .await
            .and_then(|response| response.into_query());

        match response {
            Ok(value) => {
                let result = QueryResult::from_wire(value);
                if let Some(error) = &result.error {
                    tracing::debug!(connection_id, "query returned an error: {}", error);
                }
                result
            }
            Err(e) => {
                tracing::warn!(connection_id, engine = engine.tag(), "query failed: {}", e);
                QueryResult::failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::backend::{BackendRequest, BackendResponse, QueryPayload};
    use crate::db::error::ConnectionError;
    use crate::db::result::QueryOutcome;
    use crate::db::testing::ScriptedBackend;
    use serde_json::json;

    fn dispatcher(backend: &Arc<ScriptedBackend>) -> QueryDispatcher {
        QueryDispatcher::new(backend.clone(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_malformed_document_query_never_reaches_backend() {
        let backend = Arc::new(ScriptedBackend::new());
        let result = dispatcher(&backend)
            .execute("c1", Engine::Document, "{\"db\": \"shop\"}")
            .await;
        assert!(result.error.unwrap().starts_with("Malformed query"));
        assert!(result.columns.is_empty());
        assert!(result.rows.is_empty());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sql_is_forwarded_with_engine_tag() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.respond(
            "execute_query",
            Ok(BackendResponse::Query(json!({
                "columns": ["id"],
                "rows": [{"id": 1}],
                "success": true
            }))),
        );

        let result = dispatcher(&backend)
            .execute("c1", Engine::ClientServerRelational, "SELECT id FROM t")
            .await;
        assert_eq!(result.outcome(), QueryOutcome::Rows(1));
        assert_eq!(
            backend.calls(),
            vec![BackendRequest::ExecuteQuery {
                connection_id: "c1".into(),
                query: QueryPayload::Sql("SELECT id FROM t".into()),
                engine: Engine::ClientServerRelational,
            }]
        );
    }

    #[tokio::test]
    async fn test_backend_failure_becomes_data() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.respond(
            "execute_query",
            Err(ConnectionError::BackendFailure("socket closed".into())),
        );

        let result = dispatcher(&backend)
            .execute("c1", Engine::FileRelational, "SELECT 1")
            .await;
        assert_eq!(
            result.outcome(),
            QueryOutcome::Failed("Backend failure: socket closed")
        );
    }

    #[tokio::test]
    async fn test_wrong_response_kind_becomes_failure() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.respond("execute_query", Ok(BackendResponse::Done));

        let result = dispatcher(&backend)
            .execute("c1", Engine::FileRelational, "SELECT 1")
            .await;
        assert!(!result.is_success());
    }

    #[tokio::test]
    async fn test_backend_error_and_affected_rows_are_preserved() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.respond(
            "execute_query",
            Ok(BackendResponse::Query(json!({
                "columns": [],
                "rows": [],
                "affected_rows": 2,
                "error": "deadlock detected",
                "success": false
            }))),
        );

        let result = dispatcher(&backend)
            .execute("c1", Engine::ClientServerRelational, "UPDATE t SET x = 1")
            .await;
        assert_eq!(result.affected_rows, Some(2));
        assert_eq!(result.outcome(), QueryOutcome::Failed("deadlock detected"));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let backend = Arc::new(ScriptedBackend::new().with_delay(Duration::from_millis(200)));
        backend.respond("execute_query", Ok(BackendResponse::Query(json!({}))));

        let dispatcher = QueryDispatcher::new(backend.clone(), Duration::from_millis(20));
        let result = dispatcher.execute("c1", Engine::FileRelational, "SELECT 1").await;
        assert!(result.error.unwrap().starts_with("Request timed out"));
    }
}
