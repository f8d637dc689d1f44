//! tdq - query a Teradata system through DataFusion

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use datafusion::prelude::SessionContext;
use teradata_connector::{
    create_client, execute_statement, register_catalog, ConnectionConfig, JdbcClient,
    SchemaTableName, TeradataClient,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "tdq")]
#[command(about = "Browse and query a Teradata system through DataFusion")]
#[command(version)]
struct Cli {
    /// Path to the catalog properties file
    #[arg(short, long, env = "TDQ_CATALOG")]
    catalog: PathBuf,

    /// Name the catalog is registered under in SQL
    #[arg(long, default_value = "teradata")]
    catalog_name: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List schemas (Teradata databases)
    Schemas,

    /// List tables and views
    Tables {
        /// Only list tables of this schema
        #[arg(short, long)]
        schema: Option<String>,
    },

    /// Show the columns of a table as the engine sees them
    Describe { schema: String, table: String },

    /// Run a SQL query through DataFusion, e.g. `SELECT * FROM teradata.sales.orders`
    Sql { query: String },

    /// Send a statement straight to Teradata
    Exec { statement: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ConnectionConfig::from_file(&cli.catalog)
        .with_context(|| format!("failed to load catalog {:?}", cli.catalog))?;
    info!("Loaded catalog '{}' from {:?}", cli.catalog_name, cli.catalog);
    let client = create_client(cli.catalog_name.clone(), config)?;

    match cli.command {
        Commands::Schemas => list_schemas(&client).await?,
        Commands::Tables { schema } => list_tables(&client, schema.as_deref()).await?,
        Commands::Describe { schema, table } => describe(&client, &schema, &table).await?,
        Commands::Sql { query } => run_sql(client, &cli.catalog_name, &query).await?,
        Commands::Exec { statement } => {
            let count = execute_statement(&client, &statement).await?;
            println!("{} row(s) affected", count);
        }
    }

    Ok(())
}

async fn list_schemas(client: &TeradataClient) -> Result<()> {
    for schema in client.schema_names().await? {
        println!("{}", schema);
    }
    Ok(())
}

async fn list_tables(client: &TeradataClient, schema: Option<&str>) -> Result<()> {
    for name in client.table_names(schema).await? {
        println!("{}", name);
    }
    Ok(())
}

async fn describe(client: &TeradataClient, schema: &str, table: &str) -> Result<()> {
    let requested = SchemaTableName::new(schema.to_lowercase(), table.to_lowercase());
    let handle = client
        .table_handle(&requested)
        .await?
        .with_context(|| format!("table {} not found", requested))?;
    let columns = client.columns(&handle).await?;

    println!(
        "{}.{}",
        handle.schema_name.as_deref().unwrap_or_default(),
        handle.table_name
    );
    let width = columns
        .iter()
        .map(|c| c.engine_name().len())
        .max()
        .unwrap_or(0);
    for column in &columns {
        println!(
            "  {:width$}  {}",
            column.engine_name(),
            column.engine_type,
            width = width
        );
    }
    Ok(())
}

async fn run_sql(client: TeradataClient, catalog_name: &str, query: &str) -> Result<()> {
    let ctx = SessionContext::new();
    let client: Arc<dyn JdbcClient> = Arc::new(client);
    register_catalog(&ctx, catalog_name, client).await?;

    let df = ctx.sql(query).await?;
    df.show().await?;
    Ok(())
}
