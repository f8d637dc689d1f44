//! DataFusion table provider and scan plan backed by a [`JdbcClient`].
//!
//! `JdbcTable` answers planning questions from resolved column handles.
//! `JdbcScanExec` is the lazy leaf plan: nothing reaches the database until
//! its stream is polled, and then one connection serves the whole split.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use arrow::array::{RecordBatch, RecordBatchOptions};
use arrow::datatypes::{Schema, SchemaRef};
use async_trait::async_trait;
use datafusion::catalog::Session;
use datafusion::datasource::TableProvider;
use datafusion::error::{DataFusionError, Result as DFResult};
use datafusion::execution::TaskContext;
use datafusion::logical_expr::{TableProviderFilterPushDown, TableType};
use datafusion::physical_expr::EquivalenceProperties;
use datafusion::physical_plan::execution_plan::{Boundedness, EmissionType};
use datafusion::physical_plan::stream::RecordBatchStreamAdapter;
use datafusion::physical_plan::{
    DisplayAs, DisplayFormatType, ExecutionPlan, Partitioning, PlanProperties,
    SendableRecordBatchStream,
};
use datafusion::prelude::Expr;
use futures::{StreamExt, TryStreamExt};
use tracing::debug;

use crate::client::Connection;
use crate::error::ConnectorError;
use crate::filter::FilterCondition;
use crate::handle::{JdbcColumnHandle, JdbcSplit, JdbcTableHandle};
use crate::jdbc::{close_quietly, JdbcClient};

/// A resolved remote table exposed to DataFusion.
pub struct JdbcTable {
    client: Arc<dyn JdbcClient>,
    handle: JdbcTableHandle,
    columns: Vec<JdbcColumnHandle>,
    schema: SchemaRef,
}

impl fmt::Debug for JdbcTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JdbcTable")
            .field("handle", &self.handle)
            .field("columns", &self.columns.len())
            .finish()
    }
}

impl JdbcTable {
    pub fn new(
        client: Arc<dyn JdbcClient>,
        handle: JdbcTableHandle,
        columns: Vec<JdbcColumnHandle>,
    ) -> Self {
        let schema = Arc::new(Schema::new(
            columns.iter().map(JdbcColumnHandle::arrow_field).collect::<Vec<_>>(),
        ));
        Self {
            client,
            handle,
            columns,
            schema,
        }
    }

    pub fn handle(&self) -> &JdbcTableHandle {
        &self.handle
    }

    pub fn columns(&self) -> &[JdbcColumnHandle] {
        &self.columns
    }

    /// Translate an engine filter into a condition on the remote column name.
    /// Filters the remote side could narrow too far stay in the engine.
    fn pushdown_condition(&self, expr: &Expr) -> Option<FilterCondition> {
        let condition =
            FilterCondition::from_expr(expr).filter(FilterCondition::is_remote_superset)?;
        self.columns
            .iter()
            .find(|c| c.engine_name() == condition.column)
            .map(|c| condition.with_column(&c.column_name))
    }
}

#[async_trait]
impl TableProvider for JdbcTable {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    fn table_type(&self) -> TableType {
        TableType::Base
    }

    fn supports_filters_pushdown(
        &self,
        filters: &[&Expr],
    ) -> DFResult<Vec<TableProviderFilterPushDown>> {
        Ok(filters
            .iter()
            .map(|f| match self.pushdown_condition(f) {
                Some(_) => TableProviderFilterPushDown::Inexact,
                None => TableProviderFilterPushDown::Unsupported,
            })
            .collect())
    }

    async fn scan(
        &self,
        _state: &dyn Session,
        projection: Option<&Vec<usize>>,
        filters: &[Expr],
        _limit: Option<usize>,
    ) -> DFResult<Arc<dyn ExecutionPlan>> {
        let (columns, schema) = match projection {
            Some(indices) => {
                let columns = indices
                    .iter()
                    .map(|&i| self.columns[i].clone())
                    .collect::<Vec<_>>();
                let schema = Arc::new(self.schema.project(indices)?);
                (columns, schema)
            }
            None => (self.columns.clone(), Arc::clone(&self.schema)),
        };

        let conditions = filters
            .iter()
            .filter_map(|f| self.pushdown_condition(f))
            .collect();

        let split = JdbcSplit::new(self.handle.clone(), conditions);
        debug!("Planning scan of split {}", split);

        Ok(Arc::new(JdbcScanExec::new(
            Arc::clone(&self.client),
            split,
            columns,
            schema,
        )))
    }
}

/// Leaf plan reading one split with a single output partition.
#[derive(Debug)]
pub struct JdbcScanExec {
    client: Arc<dyn JdbcClient>,
    split: JdbcSplit,
    columns: Vec<JdbcColumnHandle>,
    schema: SchemaRef,
    properties: PlanProperties,
}

impl JdbcScanExec {
    pub fn new(
        client: Arc<dyn JdbcClient>,
        split: JdbcSplit,
        columns: Vec<JdbcColumnHandle>,
        schema: SchemaRef,
    ) -> Self {
        let properties = PlanProperties::new(
            EquivalenceProperties::new(Arc::clone(&schema)),
            Partitioning::UnknownPartitioning(1),
            EmissionType::Final,
            Boundedness::Bounded,
        );
        Self {
            client,
            split,
            columns,
            schema,
            properties,
        }
    }

    pub fn split(&self) -> &JdbcSplit {
        &self.split
    }
}

impl ExecutionPlan for JdbcScanExec {
    fn name(&self) -> &str {
        "JdbcScanExec"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn properties(&self) -> &PlanProperties {
        &self.properties
    }

    fn children(&self) -> Vec<&Arc<dyn ExecutionPlan>> {
        vec![]
    }

    fn with_new_children(
        self: Arc<Self>,
        children: Vec<Arc<dyn ExecutionPlan>>,
    ) -> DFResult<Arc<dyn ExecutionPlan>> {
        if children.is_empty() {
            Ok(self)
        } else {
            Err(DataFusionError::Internal(
                "JdbcScanExec is a leaf node and cannot have children".to_string(),
            ))
        }
    }

    fn execute(
        &self,
        partition: usize,
        _context: Arc<TaskContext>,
    ) -> DFResult<SendableRecordBatchStream> {
        if partition != 0 {
            return Err(DataFusionError::Internal(format!(
                "JdbcScanExec only supports partition 0, got {}",
                partition
            )));
        }

        let client = Arc::clone(&self.client);
        let split = self.split.clone();
        let columns = self.columns.clone();
        let schema = Arc::clone(&self.schema);

        let stream = futures::stream::once(async move {
            fetch_split(client, split, columns, schema).await
        })
        .map_ok(|batches| futures::stream::iter(batches.into_iter().map(Ok::<_, DataFusionError>)))
        .try_flatten()
        .boxed();

        Ok(Box::pin(RecordBatchStreamAdapter::new(
            Arc::clone(&self.schema),
            stream,
        )))
    }
}

impl DisplayAs for JdbcScanExec {
    fn fmt_as(&self, _t: DisplayFormatType, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "JdbcScanExec: connector={}, split={}, columns={}",
            self.client.connector_id(),
            self.split,
            self.columns.len()
        )
    }
}

async fn fetch_split(
    client: Arc<dyn JdbcClient>,
    split: JdbcSplit,
    columns: Vec<JdbcColumnHandle>,
    schema: SchemaRef,
) -> DFResult<Vec<RecordBatch>> {
    let mut conn = client.open_connection().await?;
    let result = read_split(client.as_ref(), conn.as_mut(), &split, &columns, &schema).await;
    close_quietly(conn, client.connector_id()).await;
    result
}

async fn read_split(
    client: &dyn JdbcClient,
    conn: &mut dyn Connection,
    split: &JdbcSplit,
    columns: &[JdbcColumnHandle],
    schema: &SchemaRef,
) -> DFResult<Vec<RecordBatch>> {
    let statement = client.build_sql(conn, split, columns).await?;
    let batches = conn
        .query(&statement.sql, Arc::clone(schema))
        .await
        .map_err(ConnectorError::Execution)?;

    batches
        .into_iter()
        .map(|batch| relabel(batch, schema))
        .collect()
}

/// Re-attach the engine-side schema to a batch the driver produced.
fn relabel(batch: RecordBatch, schema: &SchemaRef) -> DFResult<RecordBatch> {
    let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
    Ok(RecordBatch::try_new_with_options(
        Arc::clone(schema),
        batch.columns().to_vec(),
        &options,
    )?)
}
