use log::debug;

use crate::error::{EtlError, EtlResult};
use crate::logic::RefreshLog;
use crate::model::CLEAR_ORDER;
use crate::store::UnitOfWork;

/// Delete every analytic row, children before parents.
///
/// Stops at the first table that cannot be cleared; the caller's unit of work
/// is expected to discard the tables already emptied.
pub async fn clear_tables(target: &mut dyn UnitOfWork, log: &mut RefreshLog) -> EtlResult<()> {
    for table in CLEAR_ORDER {
        log.info(format!("Clearing table {}...", table));
        match target.delete_all(table).await {
            Ok(removed) => debug!("Removed {} rows from {}", removed, table),
            Err(err) => {
                log.error(format!("Error clearing {}: {}", table, err));
                return Err(EtlError::ClearTable {
                    table: table.name(),
                    message: err.to_string(),
                });
            }
        }
    }

    log.info("All OLAP tables cleared.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnalyticRow, AnalyticTable, DimTeacher, DimTerm};
    use crate::store::{AnalyticStore, InMemoryAnalyticStore};
    use uuid::Uuid;

    fn seeded_store() -> InMemoryAnalyticStore {
        let store = InMemoryAnalyticStore::new();
        store
            .preload([
                AnalyticRow::DimTerm(DimTerm {
                    id: Uuid::new_v4(),
                    year: Some("2025".to_string()),
                    term_number: Some(2),
                }),
                AnalyticRow::DimTeacher(DimTeacher {
                    id: Uuid::new_v4(),
                    first_name: Some("Alan".to_string()),
                    last_name: Some("Turing".to_string()),
                    phone: None,
                    email: None,
                }),
            ])
            .unwrap();
        store
    }

    #[tokio::test]
    async fn clears_every_table_in_reverse_dependency_order() {
        let store = seeded_store();
        let mut log = RefreshLog::new();
        let mut uow = store.begin().await.unwrap();

        clear_tables(uow.as_mut(), &mut log).await.unwrap();
        uow.commit().await.unwrap();

        assert_eq!(store.snapshot().total_rows(), 0);
        assert_eq!(log.lines().len(), CLEAR_ORDER.len() + 1);
        assert_eq!(log.lines()[0], "Clearing table FACTDEPARTMENTSUMMARY...");
        assert_eq!(log.lines()[10], "Clearing table DIMTERM...");
        assert_eq!(log.last(), Some("All OLAP tables cleared."));
    }

    #[tokio::test]
    async fn stops_at_the_first_failing_table() {
        let store = seeded_store();
        store.fail_deletes_from(AnalyticTable::DimCourse);
        let mut log = RefreshLog::new();
        let mut uow = store.begin().await.unwrap();

        let err = clear_tables(uow.as_mut(), &mut log).await.unwrap_err();

        assert!(matches!(err, EtlError::ClearTable { table: "DIMCOURSE", .. }));
        assert!(log.last().unwrap().starts_with("Error clearing DIMCOURSE:"));
        assert!(!log.contains("Clearing table DIMDEPARTMENT..."));
        assert!(!log.contains("All OLAP tables cleared."));
    }
}
