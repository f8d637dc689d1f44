//! DataFusion catalog and schema providers over a [`JdbcClient`].

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use datafusion::catalog::{CatalogProvider, SchemaProvider};
use datafusion::datasource::TableProvider;
use datafusion::error::Result as DFResult;
use datafusion::prelude::SessionContext;
use tracing::{debug, info};

use crate::error::Result;
use crate::handle::SchemaTableName;
use crate::jdbc::JdbcClient;
use crate::scan::JdbcTable;

/// Catalog exposing every schema of the remote database.
///
/// DataFusion lists schemas and tables synchronously, so the names are
/// captured once at construction. Table lookups always go back to the
/// database.
pub struct JdbcCatalog {
    client: Arc<dyn JdbcClient>,
    schemas: BTreeMap<String, Arc<JdbcSchema>>,
}

impl fmt::Debug for JdbcCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JdbcCatalog")
            .field("connector_id", &self.client.connector_id())
            .field("schemas", &self.schemas.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl JdbcCatalog {
    pub async fn try_new(client: Arc<dyn JdbcClient>) -> Result<Self> {
        let mut tables: BTreeMap<String, Vec<String>> = client
            .schema_names()
            .await?
            .into_iter()
            .map(|schema| (schema, Vec::new()))
            .collect();

        for name in client.table_names(None).await? {
            tables
                .entry(name.schema_name)
                .or_default()
                .push(name.table_name);
        }

        let schemas = tables
            .into_iter()
            .map(|(schema, mut table_names)| {
                table_names.sort();
                table_names.dedup();
                let provider = Arc::new(JdbcSchema {
                    client: Arc::clone(&client),
                    schema_name: schema.clone(),
                    table_names,
                });
                (schema, provider)
            })
            .collect::<BTreeMap<_, _>>();

        info!(
            "[{}] Catalog snapshot: {} schemas",
            client.connector_id(),
            schemas.len()
        );

        Ok(Self { client, schemas })
    }

    pub fn client(&self) -> &Arc<dyn JdbcClient> {
        &self.client
    }
}

impl CatalogProvider for JdbcCatalog {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema_names(&self) -> Vec<String> {
        self.schemas.keys().cloned().collect()
    }

    fn schema(&self, name: &str) -> Option<Arc<dyn SchemaProvider>> {
        self.schemas
            .get(name)
            .map(|schema| Arc::clone(schema) as Arc<dyn SchemaProvider>)
    }
}

/// One remote schema (a Teradata database).
pub struct JdbcSchema {
    client: Arc<dyn JdbcClient>,
    schema_name: String,
    table_names: Vec<String>,
}

impl fmt::Debug for JdbcSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JdbcSchema")
            .field("schema_name", &self.schema_name)
            .field("tables", &self.table_names.len())
            .finish()
    }
}

#[async_trait]
impl SchemaProvider for JdbcSchema {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn table_names(&self) -> Vec<String> {
        self.table_names.clone()
    }

    async fn table(&self, name: &str) -> DFResult<Option<Arc<dyn TableProvider>>> {
        let requested = SchemaTableName::new(&self.schema_name, name);
        let Some(handle) = self.client.table_handle(&requested).await? else {
            debug!("Table {} not found", requested);
            return Ok(None);
        };
        let columns = self.client.columns(&handle).await?;
        Ok(Some(Arc::new(JdbcTable::new(
            Arc::clone(&self.client),
            handle,
            columns,
        ))))
    }

    fn table_exist(&self, name: &str) -> bool {
        self.table_names.iter().any(|t| t == name)
    }
}

/// Snapshot the remote catalog and register it with `ctx` under `name`.
pub async fn register_catalog(
    ctx: &SessionContext,
    name: &str,
    client: Arc<dyn JdbcClient>,
) -> Result<Arc<JdbcCatalog>> {
    let catalog = Arc::new(JdbcCatalog::try_new(client).await?);
    ctx.register_catalog(name, Arc::clone(&catalog) as Arc<dyn CatalogProvider>);
    info!(
        "Registered catalog '{}' for connector '{}'",
        name,
        catalog.client.connector_id()
    );
    Ok(catalog)
}
