use serde::{Deserialize, Serialize};

/// Supported database engine families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Engine {
    /// Embedded relational file store (SQLite)
    #[serde(rename = "sqlite")]
    FileRelational,
    /// Document store (MongoDB)
    #[serde(rename = "mongodb")]
    Document,
    /// Client/server relational store (PostgreSQL)
    #[serde(rename = "postgres")]
    ClientServerRelational,
}

impl Engine {
    pub fn name(&self) -> &'static str {
        match self {
            Engine::FileRelational => "SQLite",
            Engine::Document => "MongoDB",
            Engine::ClientServerRelational => "PostgreSQL",
        }
    }

    /// Tag sent with `execute_query` so the backend can route the query
    pub fn tag(&self) -> &'static str {
        match self {
            Engine::FileRelational => "sqlite",
            Engine::Document => "mongodb",
            Engine::ClientServerRelational => "postgres",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Some(Engine::FileRelational),
            "mongodb" | "mongo" => Some(Engine::Document),
            "postgres" | "postgresql" | "pg" => Some(Engine::ClientServerRelational),
            _ => None,
        }
    }

    pub fn default_port(&self) -> Option<u16> {
        match self {
            Engine::FileRelational => None,
            Engine::Document => Some(27017),
            Engine::ClientServerRelational => Some(5432),
        }
    }

    /// Cargo feature that compiles the local driver for this engine
    pub fn feature_name(&self) -> &'static str {
        match self {
            Engine::FileRelational => "sqlite-driver",
            Engine::Document => "mongodb",
            Engine::ClientServerRelational => "postgres",
        }
    }

    pub fn is_available(&self) -> bool {
        match self {
            Engine::FileRelational => cfg!(feature = "sqlite-driver"),
            Engine::Document => cfg!(feature = "mongodb"),
            Engine::ClientServerRelational => cfg!(feature = "postgres"),
        }
    }

    pub fn all() -> &'static [Engine] {
        &[
            Engine::FileRelational,
            Engine::Document,
            Engine::ClientServerRelational,
        ]
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Network parameters shared by the document and client/server engines.
///
/// Either `connection_string` or the discrete fields describe the target.
/// When both are present the connection string wins at connect time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
}

impl ServerParams {
    pub fn endpoint(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: Some(host.into()),
            port: Some(port),
            ..Default::default()
        }
    }

    pub fn from_connection_string(uri: impl Into<String>) -> Self {
        Self {
            connection_string: Some(uri.into()),
            ..Default::default()
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// The connection string, if one is set and non-blank
    pub fn connection_string(&self) -> Option<&str> {
        non_blank(self.connection_string.as_deref())
    }

    pub fn host(&self) -> Option<&str> {
        non_blank(self.host.as_deref())
    }

    pub fn database(&self) -> Option<&str> {
        non_blank(self.database.as_deref())
    }
}

/// Engine tag plus the parameters only that engine understands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "engine")]
pub enum EngineParams {
    #[serde(rename = "sqlite")]
    FileRelational { path: String },
    #[serde(rename = "mongodb")]
    Document(ServerParams),
    #[serde(rename = "postgres")]
    ClientServerRelational(ServerParams),
}

/// How to reach one database, independent of engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Assigned by the backend on a successful connect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    #[serde(flatten)]
    pub params: EngineParams,
}

/// The fields that identify the same logical database across reconnects
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Path(String),
    ConnectionString(Engine, String),
    Endpoint {
        engine: Engine,
        host: Option<String>,
        port: Option<u16>,
        database: Option<String>,
    },
}

impl ConnectionDescriptor {
    pub fn new(params: EngineParams) -> Self {
        Self {
            name: None,
            connection_id: None,
            params,
        }
    }

    pub fn file(path: impl Into<String>) -> Self {
        Self::new(EngineParams::FileRelational { path: path.into() })
    }

    pub fn document(params: ServerParams) -> Self {
        Self::new(EngineParams::Document(params))
    }

    pub fn client_server(params: ServerParams) -> Self {
        Self::new(EngineParams::ClientServerRelational(params))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_connection_id(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = Some(connection_id.into());
        self
    }

    pub fn engine(&self) -> Engine {
        match self.params {
            EngineParams::FileRelational { .. } => Engine::FileRelational,
            EngineParams::Document(_) => Engine::Document,
            EngineParams::ClientServerRelational(_) => Engine::ClientServerRelational,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match &self.params {
            EngineParams::FileRelational { path } => Some(path.as_str()),
            _ => None,
        }
    }

    pub fn server_params(&self) -> Option<&ServerParams> {
        match &self.params {
            EngineParams::FileRelational { .. } => None,
            EngineParams::Document(params) | EngineParams::ClientServerRelational(params) => {
                Some(params)
            }
        }
    }

    /// Database the connection is scoped to, if any
    pub fn database(&self) -> Option<&str> {
        self.server_params().and_then(ServerParams::database)
    }

    pub fn identity_key(&self) -> IdentityKey {
        let engine = self.engine();
        match &self.params {
            EngineParams::FileRelational { path } => IdentityKey::Path(path.clone()),
            EngineParams::Document(params) | EngineParams::ClientServerRelational(params) => {
                match params.connection_string() {
                    Some(uri) => IdentityKey::ConnectionString(engine, uri.to_string()),
                    None => IdentityKey::Endpoint {
                        engine,
                        host: params.host.clone(),
                        port: params.port,
                        database: params.database.clone(),
                    },
                }
            }
        }
    }

    /// Whether both descriptors point at the same logical database
    pub fn same_target(&self, other: &ConnectionDescriptor) -> bool {
        self.identity_key() == other.identity_key()
    }

    /// Label for lists: the user's name, or something derived from the target
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }
        match &self.params {
            EngineParams::FileRelational { path } => path.clone(),
            EngineParams::Document(params) | EngineParams::ClientServerRelational(params) => {
                if let Some(uri) = params.connection_string() {
                    return redact_uri(uri);
                }
                let host = params.host().unwrap_or("localhost");
                let mut label = match params.port.or(self.engine().default_port()) {
                    Some(port) => format!("{}:{}", host, port),
                    None => host.to_string(),
                };
                if let Some(db) = params.database() {
                    label.push('/');
                    label.push_str(db);
                }
                label
            }
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Strip the password from a URI before showing it
fn redact_uri(uri: &str) -> String {
    match url::Url::parse(uri) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("****"));
            parsed.to_string()
        }
        _ => uri.to_string(),
    }
}
