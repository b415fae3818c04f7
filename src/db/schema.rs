//! Schema exploration: one recursive tree shape for every engine, plus the
//! rule that turns a selected node into a ready-to-run query.

use serde::Serialize;
use std::time::Duration;

use super::adapter::{adapter_for, DocumentAdapter, DEFAULT_SCHEMA};
use super::backend::{call_with_timeout, BackendService, DocumentQuery};
use super::connection::{ConnectionDescriptor, Engine};
use super::error::Result;

/// Row cap applied to generated table queries
pub const TABLE_PREVIEW_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Database,
    Schema,
    Collection,
    Table,
}

impl NodeKind {
    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeKind::Collection | NodeKind::Table)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaNode {
    pub name: String,
    pub kind: NodeKind,
    pub children: Vec<SchemaNode>,
}

impl SchemaNode {
    pub fn table(name: impl Into<String>) -> Self {
        Self::leaf(name, NodeKind::Table)
    }

    pub fn collection(name: impl Into<String>) -> Self {
        Self::leaf(name, NodeKind::Collection)
    }

    pub fn database(name: impl Into<String>, children: Vec<SchemaNode>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Database,
            children,
        }
    }

    pub fn schema(name: impl Into<String>, tables: Vec<SchemaNode>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Schema,
            children: tables,
        }
    }

    fn leaf(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.kind.is_leaf()
    }
}

/// Query produced by selecting a tree node
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionQuery {
    Sql(String),
    Document(DocumentQuery),
}

impl SelectionQuery {
    /// Text to place in the query editor
    pub fn to_query_text(&self) -> String {
        match self {
            SelectionQuery::Sql(sql) => sql.clone(),
            SelectionQuery::Document(query) => query.to_query_text(),
        }
    }
}

/// Query for a selected node. Database and schema nodes only expand or
/// collapse, and collections need their parent database.
pub fn query_for_selection(node: &SchemaNode, parent_database: Option<&str>) -> Option<SelectionQuery> {
    match node.kind {
        NodeKind::Table => Some(SelectionQuery::Sql(format!(
            "SELECT * FROM {} LIMIT {};",
            quote_identifier(&node.name),
            TABLE_PREVIEW_LIMIT
        ))),
        NodeKind::Collection => parent_database
            .map(|db| SelectionQuery::Document(DocumentQuery::find(db, node.name.clone()))),
        NodeKind::Database | NodeKind::Schema => None,
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Explorer state for the active connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExplorerState {
    #[default]
    Empty,
    Loading,
    Populated(Vec<SchemaNode>),
    Failed(String),
}

#[derive(Debug, Default)]
pub struct SchemaExplorer {
    state: ExplorerState,
}

impl SchemaExplorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ExplorerState {
        &self.state
    }

    pub fn tree(&self) -> Option<&[SchemaNode]> {
        match &self.state {
            ExplorerState::Populated(nodes) => Some(nodes),
            _ => None,
        }
    }

    /// Connection changed or went away
    pub fn reset(&mut self) {
        self.state = ExplorerState::Empty;
    }

    /// Allowed from any state; a refresh discards the previous tree
    pub fn begin_loading(&mut self) {
        self.state = ExplorerState::Loading;
    }

    pub fn finish(&mut self, result: Result<Vec<SchemaNode>>) {
        self.state = match result {
            Ok(nodes) => ExplorerState::Populated(nodes),
            Err(e) => ExplorerState::Failed(e.to_string()),
        };
    }

    /// Ask the backend for the structure behind `connection_id` and build the tree.
    /// Stops at the first failed call.
    pub async fn load_tree(
        backend: &dyn BackendService,
        connection_id: &str,
        descriptor: &ConnectionDescriptor,
        timeout: Duration,
    ) -> Result<Vec<SchemaNode>> {
        let engine = descriptor.engine();
        let requests = adapter_for(engine).build_list_structure_requests(connection_id, descriptor);

        let mut listings = Vec::with_capacity(requests.len());
        for request in requests {
            let operation = request.operation();
            let names = call_with_timeout(backend, request, timeout)
                .await?
                .into_names(operation)?;
            listings.push((operation, names));
        }

        match engine {
            Engine::FileRelational => Ok(take_listing(&mut listings, "get_tables")
                .into_iter()
                .map(SchemaNode::table)
                .collect()),
            Engine::Document => {
                let databases = take_listing(&mut listings, "list_databases");
                let mut nodes = Vec::with_capacity(databases.len());
                for database in databases {
                    let request = DocumentAdapter.collections_request(connection_id, &database);
                    let collections = call_with_timeout(backend, request, timeout)
                        .await?
                        .into_names("list_collections")?;
                    nodes.push(SchemaNode::database(
                        database,
                        collections.into_iter().map(SchemaNode::collection).collect(),
                    ));
                }
                Ok(nodes)
            }
            Engine::ClientServerRelational => {
                let databases = take_listing(&mut listings, "list_databases");
                tracing::debug!(connection_id, count = databases.len(), "databases visible on server");
                let Some(database) = descriptor.database() else {
                    return Ok(Vec::new());
                };
                let tables = take_listing(&mut listings, "list_tables");
                Ok(vec![SchemaNode::database(
                    database,
                    vec![SchemaNode::schema(
                        DEFAULT_SCHEMA,
                        tables.into_iter().map(SchemaNode::table).collect(),
                    )],
                )])
            }
        }
    }
}

fn take_listing(listings: &mut Vec<(&'static str, Vec<String>)>, operation: &str) -> Vec<String> {
    listings
        .iter()
        .position(|(op, _)| *op == operation)
        .map(|idx| listings.remove(idx).1)
        .unwrap_or_default()
}
