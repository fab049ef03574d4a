use crate::error::EtlResult;
use crate::model::{AnalyticRow, AnalyticTable, SourceQuery, SourceRow};

/// Read side: the operational store the snapshot is extracted from.
#[async_trait::async_trait]
pub trait OperationalStore: Send + Sync {
    /// Verify the store is reachable without reading any data.
    async fn ping(&self) -> EtlResult<()>;
    /// Open the single read-only session used for one refresh.
    async fn open(&self) -> EtlResult<Box<dyn SourceSession>>;
}

/// One read-only connection to the operational store.
#[async_trait::async_trait]
pub trait SourceSession: Send {
    /// Whether an (optional) operational relation exists.
    async fn relation_exists(&mut self, relation: &str) -> EtlResult<bool>;
    /// Run one extraction query. Columns follow the layout documented on [`SourceQuery`].
    async fn fetch(&mut self, query: SourceQuery) -> EtlResult<Vec<SourceRow>>;
    /// Release the connection.
    async fn close(self: Box<Self>) -> EtlResult<()>;
}

/// Write side: the analytic store that receives the star schema.
#[async_trait::async_trait]
pub trait AnalyticStore: Send + Sync {
    /// Start the single unit of work that wraps a clear or a refresh.
    async fn begin(&self) -> EtlResult<Box<dyn UnitOfWork>>;
}

/// An open transaction against the analytic store.
///
/// Nothing written through a unit of work is visible to readers until
/// [`UnitOfWork::commit`] succeeds. Dropping it without committing discards
/// every write.
#[async_trait::async_trait]
pub trait UnitOfWork: Send {
    /// Unconditionally delete every row of `table`, returning the number removed.
    async fn delete_all(&mut self, table: AnalyticTable) -> EtlResult<u64>;
    async fn insert(&mut self, row: AnalyticRow) -> EtlResult<()>;
    async fn commit(self: Box<Self>) -> EtlResult<()>;
    async fn rollback(self: Box<Self>) -> EtlResult<()>;
}
