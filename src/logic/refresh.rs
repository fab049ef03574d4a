use log::warn;
use std::sync::Arc;

use crate::error::{EtlError, EtlResult};
use crate::logic::{clear_tables, dimensions, facts, RefreshLog};
use crate::model::{AnalyticTable, LOAD_ORDER};
use crate::store::{AnalyticStore, OperationalStore, SourceSession, UnitOfWork};

/// A failed refresh or clear, together with everything logged up to the failure.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct RefreshFailure {
    pub log: RefreshLog,
    #[source]
    pub error: EtlError,
}

/// Rebuilds the analytic star schema from the operational store.
///
/// A refresh runs clear and every load stage inside one analytic unit of
/// work: readers of the analytic store see either the previous snapshot or
/// the complete new one, never anything in between. Concurrent refreshes
/// against the same analytic store are not coordinated.
pub struct RefreshPipeline<O, A> {
    operational: Arc<O>,
    analytic: Arc<A>,
}

impl<O, A> RefreshPipeline<O, A>
where
    O: OperationalStore,
    A: AnalyticStore,
{
    pub fn new(operational: Arc<O>, analytic: Arc<A>) -> Self {
        Self {
            operational,
            analytic,
        }
    }

    pub fn operational(&self) -> &Arc<O> {
        &self.operational
    }

    pub fn analytic(&self) -> &Arc<A> {
        &self.analytic
    }

    /// Run a full refresh and return its log.
    pub async fn run_refresh(&self) -> Result<RefreshLog, RefreshFailure> {
        let mut log = RefreshLog::new();
        match self.refresh(&mut log).await {
            Ok(()) => Ok(log),
            Err(error) => Err(RefreshFailure { log, error }),
        }
    }

    /// Empty every analytic table without reloading, as one unit of work.
    pub async fn clear_analytic_store(&self) -> Result<RefreshLog, RefreshFailure> {
        let mut log = RefreshLog::new();
        match self.clear(&mut log).await {
            Ok(()) => Ok(log),
            Err(error) => Err(RefreshFailure { log, error }),
        }
    }

    /// Replace the analytic snapshot, appending progress lines to `log`.
    ///
    /// On failure every write of this run is rolled back, a failure line is
    /// appended, and the triggering error is returned. The closing line is
    /// appended on every path.
    pub async fn refresh(&self, log: &mut RefreshLog) -> EtlResult<()> {
        log.info("ETL process started.");
        let result = self.refresh_in_unit_of_work(log).await;
        log.info("ETL process finished.");
        result
    }

    pub async fn clear(&self, log: &mut RefreshLog) -> EtlResult<()> {
        let mut unit = self.analytic.begin().await?;
        match clear_tables(unit.as_mut(), log).await {
            Ok(()) => unit.commit().await,
            Err(err) => {
                discard(unit).await;
                Err(err)
            }
        }
    }

    async fn refresh_in_unit_of_work(&self, log: &mut RefreshLog) -> EtlResult<()> {
        let (mut source, mut unit) = match self.open_stores().await {
            Ok(opened) => opened,
            Err(err) => {
                log.error(format!("ETL failed: {}", err));
                return Err(err);
            }
        };

        let outcome = match run_stages(source.as_mut(), unit.as_mut(), log).await {
            Ok(()) => match unit.commit().await {
                Ok(()) => {
                    log.info("ETL transaction committed.");
                    Ok(())
                }
                Err(err) => Err(err),
            },
            Err(err) => {
                discard(unit).await;
                Err(err)
            }
        };

        if let Err(err) = source.close().await {
            warn!("Closing the operational session failed: {}", err);
        }
        if let Err(err) = &outcome {
            log.error(format!("ETL failed: {}", err));
        }
        outcome
    }

    async fn open_stores(&self) -> EtlResult<(Box<dyn SourceSession>, Box<dyn UnitOfWork>)> {
        self.operational.ping().await?;
        let source = self.operational.open().await?;
        let unit = self.analytic.begin().await?;
        Ok((source, unit))
    }
}

/// Roll back; a rollback error is logged, never reported over the triggering one.
async fn discard(unit: Box<dyn UnitOfWork>) {
    if let Err(err) = unit.rollback().await {
        warn!("Rollback failed: {}", err);
    }
}

/// Clear, then load every table parents-first.
pub async fn run_stages(
    source: &mut dyn SourceSession,
    target: &mut dyn UnitOfWork,
    log: &mut RefreshLog,
) -> EtlResult<()> {
    clear_tables(target, log).await?;
    for table in LOAD_ORDER {
        load_table(table, source, target, log)
            .await
            .map_err(|err| err.in_stage(table.name()))?;
    }
    Ok(())
}

async fn load_table(
    table: AnalyticTable,
    source: &mut dyn SourceSession,
    target: &mut dyn UnitOfWork,
    log: &mut RefreshLog,
) -> EtlResult<()> {
    match table {
        AnalyticTable::DimTerm => dimensions::load_dim_term(source, target, log).await,
        AnalyticTable::DimStudent => dimensions::load_dim_student(source, target, log).await,
        AnalyticTable::DimTeacher => dimensions::load_dim_teacher(source, target, log).await,
        AnalyticTable::DimDepartment => dimensions::load_dim_department(source, target, log).await,
        AnalyticTable::DimDepartmentTeacher => {
            dimensions::load_department_teacher_bridge(source, target, log).await
        }
        AnalyticTable::DimCourse => dimensions::load_dim_course(source, target, log).await,
        AnalyticTable::FactPrerequisite => facts::load_fact_prerequisite(source, target, log).await,
        AnalyticTable::FactClass => facts::load_fact_class(source, target, log).await,
        AnalyticTable::FactEnrollment => facts::load_fact_enrollment(source, target, log).await,
        AnalyticTable::FactTeacherPerformance => {
            facts::load_fact_teacher_performance(source, target, log).await
        }
        AnalyticTable::FactDepartmentSummary => {
            facts::load_fact_department_summary(source, target, log).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnalyticRow, DimTerm, OperationalSnapshot, Term};
    use crate::store::{InMemoryAnalyticStore, InMemoryOperationalStore};
    use uuid::Uuid;

    fn pipeline(
        snapshot: OperationalSnapshot,
    ) -> RefreshPipeline<InMemoryOperationalStore, InMemoryAnalyticStore> {
        RefreshPipeline::new(
            Arc::new(InMemoryOperationalStore::new(snapshot)),
            Arc::new(InMemoryAnalyticStore::new()),
        )
    }

    #[tokio::test]
    async fn empty_source_produces_an_empty_committed_snapshot() {
        let pipeline = pipeline(OperationalSnapshot {
            prerequisites: Some(Vec::new()),
            ..Default::default()
        });

        let log = pipeline.run_refresh().await.unwrap();

        assert_eq!(pipeline.analytic().snapshot().total_rows(), 0);
        assert_eq!(log.lines()[0], "ETL process started.");
        assert!(log.contains("All OLAP tables cleared."));
        assert!(log.contains("FACTDEPARTMENTSUMMARY loaded successfully."));
        let committed = log.position("ETL transaction committed.").unwrap();
        assert_eq!(committed, log.lines().len() - 2);
        assert_eq!(log.last(), Some("ETL process finished."));
    }

    #[tokio::test]
    async fn unreachable_source_logs_failure_and_finish() {
        let pipeline = pipeline(OperationalSnapshot::default());
        pipeline.operational().set_unreachable(true);

        let failure = pipeline.run_refresh().await.unwrap_err();

        assert!(matches!(failure.error, EtlError::Connect { store: "operational", .. }));
        assert_eq!(
            failure.log.lines(),
            [
                "ETL process started.",
                "ETL failed: cannot open the operational store: connection refused",
                "ETL process finished.",
            ]
        );
    }

    #[tokio::test]
    async fn a_failing_stage_is_named_and_rolled_back() {
        let term = Term {
            id: Uuid::new_v4(),
            year: "2025".to_string(),
            term_number: 1,
        };
        let pipeline = pipeline(OperationalSnapshot {
            terms: vec![term.clone()],
            prerequisites: Some(Vec::new()),
            ..Default::default()
        });
        pipeline.analytic().fail_inserts_into(AnalyticTable::DimTerm);

        let failure = pipeline.run_refresh().await.unwrap_err();

        assert_eq!(failure.error.stage(), Some("DIMTERM"));
        assert!(!failure.log.contains("ETL transaction committed."));
        assert!(failure
            .log
            .lines()
            .iter()
            .any(|line| line.starts_with("ETL failed: DIMTERM failed:")));
        assert_eq!(failure.log.last(), Some("ETL process finished."));
        assert_eq!(pipeline.analytic().snapshot().total_rows(), 0);
    }

    #[tokio::test]
    async fn clear_empties_the_store_without_reloading() {
        let pipeline = pipeline(OperationalSnapshot::default());
        pipeline
            .analytic()
            .preload([AnalyticRow::DimTerm(DimTerm {
                id: Uuid::new_v4(),
                year: None,
                term_number: None,
            })])
            .unwrap();

        let log = pipeline.clear_analytic_store().await.unwrap();

        assert_eq!(pipeline.analytic().snapshot().total_rows(), 0);
        assert_eq!(log.last(), Some("All OLAP tables cleared."));
        assert!(!log.contains("ETL process started."));
    }
}
