use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::{Args, Parser, Subcommand};

use zentable::db::{
    query_for_selection, render_value, ClientConfig, ConnectionDescriptor, ConnectionRegistry,
    Engine, ExplorerState, LocalBackend, NodeKind, QueryOutcome, QueryResult, SchemaNode,
    ServerParams, Session, SqlitePreferencesStore,
};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List saved connections, most recent first
    List,

    /// Remove a saved connection
    Forget {
        /// Connection id as shown by `list`
        connection_id: String,
    },

    /// Connect and run one query
    Query {
        #[clap(flatten)]
        target: ConnectArgs,

        /// SQL text, or a JSON document query for MongoDB
        query: String,
    },

    /// Connect and print the schema tree
    Tree {
        #[clap(flatten)]
        target: ConnectArgs,

        /// Print the query each table or collection opens with
        #[clap(long)]
        show_queries: bool,
    },
}

#[derive(Args, Debug)]
struct ConnectArgs {
    /// Engine: sqlite, mongodb or postgres
    #[clap(short, long)]
    engine: String,

    /// Database file (sqlite)
    #[clap(long)]
    path: Option<String>,

    #[clap(long)]
    host: Option<String>,

    #[clap(long)]
    port: Option<u16>,

    #[clap(short, long)]
    username: Option<String>,

    #[clap(long)]
    password: Option<String>,

    #[clap(short, long)]
    database: Option<String>,

    /// Connection string; takes precedence over host and port
    #[clap(long)]
    url: Option<String>,
}

impl ConnectArgs {
    fn descriptor(&self) -> Result<ConnectionDescriptor> {
        let engine = Engine::from_tag(&self.engine).ok_or_else(|| {
            let known: Vec<_> = Engine::all().iter().map(Engine::tag).collect();
            anyhow!("unknown engine '{}', expected one of: {}", self.engine, known.join(", "))
        })?;

        if engine == Engine::FileRelational {
            return Ok(ConnectionDescriptor::file(self.path.clone().unwrap_or_default()));
        }
        let params = ServerParams {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            connection_string: self.url.clone(),
        };
        Ok(match engine {
            Engine::Document => ConnectionDescriptor::document(params),
            _ => ConnectionDescriptor::client_server(params),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env();
    let store = SqlitePreferencesStore::open_default(&config)?;
    let registry = ConnectionRegistry::restore(Box::new(store));
    let backend = Arc::new(LocalBackend::new(config.connect_timeout));
    let mut session = Session::new(backend, registry, config);

    match cli.command {
        Commands::List => {
            for descriptor in session.registry().list() {
                println!(
                    "{:<38} {:<8} {}",
                    descriptor.connection_id.as_deref().unwrap_or("-"),
                    descriptor.engine().tag(),
                    descriptor.display_name()
                );
            }
        }
        Commands::Forget { connection_id } => {
            if session.registry().get(&connection_id).is_none() {
                bail!("no saved connection with id {}", connection_id);
            }
            session.remove_connection(&connection_id);
        }
        Commands::Query { target, query } => {
            session.connect(target.descriptor()?).await?;
            if let Some(result) = session.execute(&query).await {
                print_result(result);
            }
            session.disconnect().await;
        }
        Commands::Tree { target, show_queries } => {
            session.connect(target.descriptor()?).await?;
            let state = session.refresh_schema().await.clone();
            session.disconnect().await;
            match state {
                ExplorerState::Populated(tree) if tree.is_empty() => println!("(no schema objects)"),
                ExplorerState::Populated(tree) => {
                    for node in &tree {
                        print_node(node, 0, None, show_queries);
                    }
                }
                ExplorerState::Failed(message) => bail!("schema listing failed: {}", message),
                ExplorerState::Empty | ExplorerState::Loading => {}
            }
        }
    }
    Ok(())
}

fn print_node(node: &SchemaNode, depth: usize, parent_database: Option<&str>, show_queries: bool) {
    let indent = "  ".repeat(depth);
    match query_for_selection(node, parent_database).filter(|_| show_queries) {
        Some(query) => println!("{}{}  -> {}", indent, node.name, query.to_query_text().replace('\n', " ")),
        None => println!("{}{}", indent, node.name),
    }
    let database = match node.kind {
        NodeKind::Database => Some(node.name.as_str()),
        _ => parent_database,
    };
    for child in &node.children {
        print_node(child, depth + 1, database, show_queries);
    }
}

fn print_result(result: &QueryResult) {
    match result.outcome() {
        QueryOutcome::Failed(message) => eprintln!("error: {}", message),
        QueryOutcome::Empty { affected_rows: Some(n) } => println!("{} row(s) affected", n),
        QueryOutcome::Empty { affected_rows: None } => println!("(no rows)"),
        QueryOutcome::Rows(count) => {
            let mut lines = vec![result.columns.clone()];
            lines.extend(result.rows.iter().map(|row| {
                result
                    .columns
                    .iter()
                    .map(|column| row.get(column).map(render_value).unwrap_or_default())
                    .collect()
            }));

            let widths: Vec<usize> = (0..result.columns.len())
                .map(|idx| lines.iter().map(|line| line[idx].chars().count()).max().unwrap_or(0))
                .collect();
            for line in &lines {
                let cells: Vec<String> = line
                    .iter()
                    .zip(&widths)
                    .map(|(cell, width)| format!("{:<width$}", cell, width = width))
                    .collect();
                println!("{}", cells.join(" | ").trim_end());
            }
            println!("({} row(s))", count);
        }
    }
}
