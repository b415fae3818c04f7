//! MongoDB driver implementation

use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::{options::ClientOptions, Client, Collection};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::db::backend::{DocumentQuery, QueryPayload, ServerTarget};
use crate::db::error::{ConnectionError, Result};
use crate::db::result::QueryResult;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 27017;

pub struct MongoDriver {
    clients: Mutex<HashMap<String, Client>>,
}

impl MongoDriver {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub async fn connect(&self, connection_id: &str, target: &ServerTarget, timeout: Duration) -> Result<()> {
        let uri = build_uri(target)?;

        let mut options = ClientOptions::parse(&uri)
            .await
            .map_err(|e| ConnectionError::InvalidConfiguration(e.to_string()))?;
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);

        let client = Client::with_options(options)
            .map_err(|e| ConnectionError::BackendFailure(e.to_string()))?;

        // The driver connects lazily; ping so bad hosts fail here
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| ConnectionError::BackendFailure(format!("ping failed: {}", e)))?;

        self.clients
            .lock()
            .map_err(|e| ConnectionError::BackendFailure(e.to_string()))?
            .insert(connection_id.to_string(), client);
        Ok(())
    }

    fn client(&self, connection_id: &str) -> Result<Client> {
        self.clients
            .lock()
            .map_err(|e| ConnectionError::BackendFailure(e.to_string()))?
            .get(connection_id)
            .cloned()
            .ok_or_else(|| ConnectionError::UnknownConnection(connection_id.to_string()))
    }

    /// Failures come back inside the result
    pub async fn execute(&self, connection_id: &str, payload: QueryPayload) -> QueryResult {
        match self.try_execute(connection_id, payload).await {
            Ok(result) => result,
            Err(e) => QueryResult::failed(e.to_string()),
        }
    }

    async fn try_execute(&self, connection_id: &str, payload: QueryPayload) -> Result<QueryResult> {
        let client = self.client(connection_id)?;
        let query = match payload {
            QueryPayload::Document(query) => query,
            QueryPayload::Sql(text) => DocumentQuery::parse(&text)?,
        };
        run_operation(&client, &query).await
    }

    pub async fn databases(&self, connection_id: &str) -> Result<Vec<String>> {
        self.client(connection_id)?
            .list_database_names()
            .await
            .map_err(|e| ConnectionError::BackendFailure(e.to_string()))
    }

    pub async fn collections(&self, connection_id: &str, database: &str) -> Result<Vec<String>> {
        let mut names = self
            .client(connection_id)?
            .database(database)
            .list_collection_names()
            .await
            .map_err(|e| ConnectionError::BackendFailure(e.to_string()))?;
        names.sort();
        Ok(names)
    }

    pub fn close(&self, connection_id: &str) -> Result<()> {
        self.clients
            .lock()
            .map_err(|e| ConnectionError::BackendFailure(e.to_string()))?
            .remove(connection_id);
        Ok(())
    }
}

/// `mongodb://[user[:pass]@]host:port[/db]` from discrete params
fn build_uri(target: &ServerTarget) -> Result<String> {
    let (host, port, username, password, database) = match target {
        ServerTarget::ConnectionString(uri) => return Ok(uri.clone()),
        ServerTarget::Params {
            host,
            port,
            username,
            password,
            database,
        } => (host, port, username, password, database),
    };

    let host = if host.trim().is_empty() { DEFAULT_HOST } else { host.as_str() };
    let mut uri = url::Url::parse(&format!("mongodb://{}:{}", host, port.unwrap_or(DEFAULT_PORT)))
        .map_err(|e| ConnectionError::InvalidConfiguration(format!("invalid host: {}", e)))?;

    // Url percent-encodes userinfo for us
    if let Some(username) = username {
        uri.set_username(username)
            .map_err(|_| ConnectionError::InvalidConfiguration("invalid username".into()))?;
        if let Some(password) = password {
            uri.set_password(Some(password))
                .map_err(|_| ConnectionError::InvalidConfiguration("invalid password".into()))?;
        }
    }
    if let Some(database) = database {
        uri.set_path(database);
    }
    Ok(uri.to_string())
}

async fn run_operation(client: &Client, query: &DocumentQuery) -> Result<QueryResult> {
    let collection: Collection<Document> = client.database(&query.db).collection(&query.collection);
    let filter = to_document(&query.filter, "filter")?;

    let result = match query.operation.as_str() {
        "find" => {
            let mut find = collection.find(filter);
            if let Some(limit) = query.option("limit").and_then(Value::as_i64) {
                find = find.limit(limit);
            }
            let documents: Vec<Document> = find
                .await
                .map_err(failure("find"))?
                .try_collect()
                .await
                .map_err(failure("find"))?;
            documents_to_result(documents)
        }
        "insertOne" => {
            let document = to_document(required(query, "document")?, "document")?;
            let inserted = collection
                .insert_one(document)
                .await
                .map_err(failure("insertOne"))?;
            let mut row = Map::new();
            row.insert("insertedId".into(), inserted.inserted_id.into_relaxed_extjson());
            QueryResult {
                affected_rows: Some(1),
                ..QueryResult::with_rows(vec!["insertedId".into()], vec![row])
            }
        }
        "insertMany" => {
            let documents = match required(query, "documents")? {
                Value::Array(items) => items
                    .iter()
                    .map(|item| to_document(item, "documents"))
                    .collect::<Result<Vec<_>>>()?,
                _ => return Err(malformed("field 'documents' must be an array")),
            };
            let inserted = collection
                .insert_many(documents)
                .await
                .map_err(failure("insertMany"))?;
            QueryResult::affected(inserted.inserted_ids.len() as u64)
        }
        "updateMany" => {
            let update = to_document(required(query, "update")?, "update")?;
            let updated = collection
                .update_many(filter, update)
                .await
                .map_err(failure("updateMany"))?;
            QueryResult::affected(updated.modified_count)
        }
        "deleteMany" => {
            let deleted = collection
                .delete_many(filter)
                .await
                .map_err(failure("deleteMany"))?;
            QueryResult::affected(deleted.deleted_count)
        }
        "countDocuments" => {
            let count = collection
                .count_documents(filter)
                .await
                .map_err(failure("countDocuments"))?;
            let mut row = Map::new();
            row.insert("count".into(), Value::from(count));
            QueryResult::with_rows(vec!["count".into()], vec![row])
        }
        other => return Err(malformed(&format!("unsupported operation: {}", other))),
    };
    Ok(result)
}

/// Columns are document keys in first-seen order
fn documents_to_result(documents: Vec<Document>) -> QueryResult {
    let mut columns: Vec<String> = Vec::new();
    let mut rows = Vec::with_capacity(documents.len());

    for document in documents {
        for key in document.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
        if let Value::Object(row) = Bson::Document(document).into_relaxed_extjson() {
            rows.push(row);
        }
    }
    QueryResult::with_rows(columns, rows)
}

/// Extended JSON in, BSON document out; null counts as an empty document
fn to_document(value: &Value, field: &str) -> Result<Document> {
    if value.is_null() {
        return Ok(Document::new());
    }
    match Bson::try_from(value.clone()) {
        Ok(Bson::Document(document)) => Ok(document),
        Ok(_) => Err(malformed(&format!("field '{}' must be an object", field))),
        Err(e) => Err(malformed(&format!("field '{}' is not valid extended JSON: {}", field, e))),
    }
}

fn required<'a>(query: &'a DocumentQuery, key: &str) -> Result<&'a Value> {
    query
        .option(key)
        .ok_or_else(|| malformed(&format!("{} requires a '{}' field", query.operation, key)))
}

fn malformed(message: &str) -> ConnectionError {
    ConnectionError::MalformedQuery(message.to_string())
}

fn failure(operation: &'static str) -> impl Fn(mongodb::error::Error) -> ConnectionError {
    move |e| ConnectionError::BackendFailure(format!("{} failed: {}", operation, e))
}
