pub mod clear;
pub mod dimensions;
pub mod facts;
pub mod refresh;
pub mod refresh_log;

pub use clear::*;
pub use dimensions::*;
pub use facts::*;
pub use refresh::*;
pub use refresh_log::*;

use crate::error::EtlResult;
use crate::model::{AnalyticRow, SourceQuery, SourceRow};
use crate::store::{SourceSession, UnitOfWork};

/// Extract `query`, map every row and insert it, returning the row count.
pub(crate) async fn copy_rows<F>(
    source: &mut dyn SourceSession,
    target: &mut dyn UnitOfWork,
    query: SourceQuery,
    map: F,
) -> EtlResult<usize>
where
    F: Fn(&SourceRow) -> EtlResult<AnalyticRow> + Send,
{
    let rows = source.fetch(query).await?;
    for row in &rows {
        target.insert(map(row)?).await?;
    }
    Ok(rows.len())
}
