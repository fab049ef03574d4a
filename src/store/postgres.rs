use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use log::{debug, warn};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Postgres, Row, Transaction, TypeInfo, ValueRef};
use uuid::Uuid;

use crate::error::{EtlError, EtlResult};
use crate::model::{AnalyticRow, AnalyticTable, SourceQuery, SourceRow, SourceValue};
use crate::store::traits::{AnalyticStore, OperationalStore, SourceSession, UnitOfWork};

async fn connect_pool(
    store: &'static str,
    database_url: &str,
    max_connections: u32,
) -> EtlResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| EtlError::connect(store, e))
}

/// The operational store, read through one snapshot transaction per refresh.
#[derive(Debug, Clone)]
pub struct PgOperationalStore {
    pool: PgPool,
    schema: String,
}

impl PgOperationalStore {
    /// `schema` must already be validated as a plain identifier.
    pub async fn connect(database_url: &str, max_connections: u32, schema: String) -> EtlResult<Self> {
        let pool = connect_pool("operational", database_url, max_connections).await?;
        Ok(Self { pool, schema })
    }

}

#[async_trait::async_trait]
impl OperationalStore for PgOperationalStore {
    async fn ping(&self) -> EtlResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| EtlError::connect("operational", e))?;
        Ok(())
    }

    async fn open(&self) -> EtlResult<Box<dyn SourceSession>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EtlError::connect("operational", e))?;

        // every extraction of one refresh reads the same snapshot
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        Ok(Box::new(PgSourceSession {
            tx,
            schema: self.schema.clone(),
        }))
    }
}

pub struct PgSourceSession {
    tx: Transaction<'static, Postgres>,
    schema: String,
}

#[async_trait::async_trait]
impl SourceSession for PgSourceSession {
    async fn relation_exists(&mut self, relation: &str) -> EtlResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = $1 AND table_name = $2",
        )
        .bind(&self.schema)
        .bind(relation)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(count > 0)
    }

    async fn fetch(&mut self, query: SourceQuery) -> EtlResult<Vec<SourceRow>> {
        let sql = source_sql(query, &self.schema);
        debug!("Extracting {:?}", query);

        let rows = sqlx::query(&sql).fetch_all(&mut *self.tx).await?;
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn close(self: Box<Self>) -> EtlResult<()> {
        // read-only, nothing to keep
        self.tx.rollback().await?;
        Ok(())
    }
}

/// How a source column type is read before coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Uuid,
    Bytes,
    Text,
    Char,
    Date,
    Time,
    Timestamp,
    TimestampTz,
}

impl ColumnKind {
    fn from_type_name(name: &str) -> Option<Self> {
        let kind = match name {
            "BOOL" => ColumnKind::Bool,
            "INT2" => ColumnKind::Int2,
            "INT4" => ColumnKind::Int4,
            "INT8" => ColumnKind::Int8,
            "FLOAT4" => ColumnKind::Float4,
            "FLOAT8" => ColumnKind::Float8,
            "NUMERIC" => ColumnKind::Numeric,
            "UUID" => ColumnKind::Uuid,
            "BYTEA" => ColumnKind::Bytes,
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => ColumnKind::Text,
            "\"CHAR\"" => ColumnKind::Char,
            "DATE" => ColumnKind::Date,
            "TIME" => ColumnKind::Time,
            "TIMESTAMP" => ColumnKind::Timestamp,
            "TIMESTAMPTZ" => ColumnKind::TimestampTz,
            _ => return None,
        };
        Some(kind)
    }

    /// Read column `index` of `row`. Temporal and `"char"` values surface as text.
    fn read(self, row: &PgRow, index: usize) -> Result<SourceValue, sqlx::Error> {
        let value = match self {
            ColumnKind::Bool => SourceValue::Bool(row.try_get(index)?),
            ColumnKind::Int2 => SourceValue::Int(i64::from(row.try_get::<i16, _>(index)?)),
            ColumnKind::Int4 => SourceValue::Int(i64::from(row.try_get::<i32, _>(index)?)),
            ColumnKind::Int8 => SourceValue::Int(row.try_get(index)?),
            ColumnKind::Float4 => SourceValue::Float(f64::from(row.try_get::<f32, _>(index)?)),
            ColumnKind::Float8 => SourceValue::Float(row.try_get(index)?),
            ColumnKind::Numeric => SourceValue::Decimal(row.try_get::<Decimal, _>(index)?),
            ColumnKind::Uuid => SourceValue::Uuid(row.try_get::<Uuid, _>(index)?),
            ColumnKind::Bytes => SourceValue::Bytes(row.try_get(index)?),
            ColumnKind::Text => SourceValue::Text(row.try_get(index)?),
            ColumnKind::Char => {
                let byte = row.try_get::<i8, _>(index)?;
                SourceValue::Text(char::from(byte as u8).to_string())
            }
            ColumnKind::Date => SourceValue::Text(row.try_get::<NaiveDate, _>(index)?.to_string()),
            ColumnKind::Time => SourceValue::Text(row.try_get::<NaiveTime, _>(index)?.to_string()),
            ColumnKind::Timestamp => {
                SourceValue::Text(row.try_get::<NaiveDateTime, _>(index)?.to_string())
            }
            ColumnKind::TimestampTz => {
                SourceValue::Text(row.try_get::<DateTime<Utc>, _>(index)?.to_rfc3339())
            }
        };
        Ok(value)
    }
}

/// Keep a decoded column, or store null when the driver could not decode it.
fn recover_column(column: &str, decoded: Result<SourceValue, sqlx::Error>) -> SourceValue {
    match decoded {
        Ok(value) => value,
        Err(err) => {
            warn!("Column {} could not be decoded, storing null: {}", column, err);
            SourceValue::Null
        }
    }
}

/// Capture every column of a row in its most general representation.
fn decode_row(row: &PgRow) -> SourceRow {
    let values = row
        .columns()
        .iter()
        .enumerate()
        .map(|(index, column)| {
            let type_name = column.type_info().name();
            match ColumnKind::from_type_name(type_name) {
                Some(kind) => {
                    let decoded = match row.try_get_raw(index) {
                        Ok(raw) if raw.is_null() => Ok(SourceValue::Null),
                        Ok(_) => kind.read(row, index),
                        Err(err) => Err(err),
                    };
                    recover_column(column.name(), decoded)
                }
                None => {
                    warn!(
                        "Column {} has unsupported type {}, reading it as null",
                        column.name(),
                        type_name
                    );
                    SourceValue::Null
                }
            }
        })
        .collect();
    SourceRow::new(values)
}

/// Extraction SQL for `query` against the operational tables in `schema`.
pub fn source_sql(query: SourceQuery, schema: &str) -> String {
    let s = schema;
    match query {
        SourceQuery::Terms => format!(r#"SELECT "Id", "Year", "TermNumber" FROM "{s}"."Terms""#),
        SourceQuery::Students => format!(
            r#"SELECT "Id", "FirstName", "LastName", "GradeLevel", "Phone", "Email" FROM "{s}"."Students""#
        ),
        SourceQuery::Teachers => format!(
            r#"SELECT "Id", "FirstName", "LastName", "Phone", "Email" FROM "{s}"."Teachers""#
        ),
        SourceQuery::Departments => format!(
            r#"SELECT "Id", "Name", "Location", "HeadId" FROM "{s}"."Departments""#
        ),
        SourceQuery::DepartmentTeachers => format!(
            r#"SELECT d."Id" AS "DepartmentId", t."Id" AS "TeacherId"
               FROM "{s}"."Departments" d
               JOIN "{s}"."DepartmentTeacher" dt ON d."Id" = dt."DepartmentsId"
               JOIN "{s}"."Teachers" t ON dt."TeachersId" = t."Id""#
        ),
        SourceQuery::Courses => format!(
            r#"SELECT "Id", "Code", "Title", "Credits", "DepartmentId" FROM "{s}"."Courses""#
        ),
        SourceQuery::Prerequisites => format!(
            r#"SELECT "IsPrerequisiteForId" AS "CourseId", "PrerequisitesId" AS "PrerequisiteId"
               FROM "{s}"."CourseCourse""#
        ),
        SourceQuery::Classes => format!(
            r#"SELECT "Id", "Location", "Day", "Period", "StartDate", "EndDate", "CourseId", "TeacherId", "TermId"
               FROM "{s}"."Classes""#
        ),
        SourceQuery::Enrollments => format!(
            r#"SELECT e."StudentId", e."ClassId", e."Grade", c."Credits", e."AttendanceRate",
                      e."WorkHabits", e."Final", cl."TermId"
               FROM "{s}"."Enrollments" e
               JOIN "{s}"."Classes" cl ON e."ClassId" = cl."Id"
               JOIN "{s}"."Courses" c ON cl."CourseId" = c."Id""#
        ),
        SourceQuery::TeacherPerformance => format!(
            r#"SELECT c."Id" AS "ClassId", c."TeacherId", c."TermId",
                      AVG(e."Grade") AS "AvgGrade",
                      COUNT(e."StudentId") AS "StudentCount"
               FROM "{s}"."Classes" c
               LEFT JOIN "{s}"."Enrollments" e ON c."Id" = e."ClassId"
               GROUP BY c."Id", c."TeacherId", c."TermId""#
        ),
        SourceQuery::DepartmentSummary => format!(
            r#"SELECT d."Id" AS "DepartmentId", cl."TermId",
                      AVG(e."Grade") AS "AvgGrade",
                      COUNT(DISTINCT e."StudentId") AS "StudentCount"
               FROM "{s}"."Enrollments" e
               JOIN "{s}"."Classes" cl ON e."ClassId" = cl."Id"
               JOIN "{s}"."Courses" co ON cl."CourseId" = co."Id"
               JOIN "{s}"."Departments" d ON co."DepartmentId" = d."Id"
               GROUP BY d."Id", cl."TermId""#
        ),
    }
}

/// The analytic store. Each unit of work is one Postgres transaction.
#[derive(Debug, Clone)]
pub struct PgAnalyticStore {
    pool: PgPool,
}

impl PgAnalyticStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> EtlResult<Self> {
        let pool = connect_pool("analytic", database_url, max_connections).await?;
        Ok(Self { pool })
    }

    /// Create the star schema tables if they do not exist yet.
    pub async fn migrate(&self) -> EtlResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(sqlx::Error::from)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AnalyticStore for PgAnalyticStore {
    async fn begin(&self) -> EtlResult<Box<dyn UnitOfWork>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EtlError::connect("analytic", e))?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait::async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn delete_all(&mut self, table: AnalyticTable) -> EtlResult<u64> {
        let sql = format!("DELETE FROM {}", table.name());
        let result = sqlx::query(&sql).execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn insert(&mut self, row: AnalyticRow) -> EtlResult<()> {
        let sql = insert_sql(row.table());
        let query = sqlx::query(sql);
        let query = match row {
            AnalyticRow::DimTerm(r) => query.bind(r.id).bind(r.year).bind(r.term_number),
            AnalyticRow::DimStudent(r) => query
                .bind(r.id)
                .bind(r.first_name)
                .bind(r.last_name)
                .bind(r.phone)
                .bind(r.email)
                .bind(r.grade_level),
            AnalyticRow::DimTeacher(r) => query
                .bind(r.id)
                .bind(r.first_name)
                .bind(r.last_name)
                .bind(r.phone)
                .bind(r.email),
            AnalyticRow::DimDepartment(r) => query
                .bind(r.id)
                .bind(r.name)
                .bind(r.location)
                .bind(r.teacher_id),
            AnalyticRow::DimDepartmentTeacher(r) => query.bind(r.department_id).bind(r.teacher_id),
            AnalyticRow::DimCourse(r) => query
                .bind(r.id)
                .bind(r.code)
                .bind(r.title)
                .bind(r.credits)
                .bind(r.department_id),
            AnalyticRow::FactPrerequisite(r) => query.bind(r.prerequisite_id).bind(r.course_id),
            AnalyticRow::FactClass(r) => query
                .bind(r.id)
                .bind(r.location)
                .bind(r.day)
                .bind(r.period)
                .bind(r.start_date)
                .bind(r.end_date)
                .bind(r.course_id)
                .bind(r.teacher_id)
                .bind(r.term_id),
            AnalyticRow::FactEnrollment(r) => query
                .bind(r.student_id)
                .bind(r.class_id)
                .bind(r.grade)
                .bind(r.credits)
                .bind(r.attendance_rate)
                .bind(r.work_habits)
                .bind(r.is_final)
                .bind(r.term_id),
            AnalyticRow::FactTeacherPerformance(r) => query
                .bind(r.avg_grade)
                .bind(r.student_count)
                .bind(r.teacher_id)
                .bind(r.class_id)
                .bind(r.term_id),
            AnalyticRow::FactDepartmentSummary(r) => query
                .bind(r.avg_grade)
                .bind(r.student_count)
                .bind(r.department_id)
                .bind(r.term_id),
        };
        query.execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> EtlResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> EtlResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

pub fn insert_sql(table: AnalyticTable) -> &'static str {
    match table {
        AnalyticTable::DimTerm => "INSERT INTO DIMTERM (ID, YEAR, TERMNUMBER) VALUES ($1, $2, $3)",
        AnalyticTable::DimStudent => {
            "INSERT INTO DIMSTUDENT (ID, FIRSTNAME, LASTNAME, PHONE, EMAIL, GRADELEVEL) VALUES ($1, $2, $3, $4, $5, $6)"
        }
        AnalyticTable::DimTeacher => {
            "INSERT INTO DIMTEACHER (ID, FIRSTNAME, LASTNAME, PHONE, EMAIL) VALUES ($1, $2, $3, $4, $5)"
        }
        AnalyticTable::DimDepartment => {
            "INSERT INTO DIMDEPARTMENT (ID, NAME, LOCATION, TEACHERID) VALUES ($1, $2, $3, $4)"
        }
        AnalyticTable::DimDepartmentTeacher => {
            "INSERT INTO DIMDEPARTMENTTEACHER (DEPARTMENTID, TEACHERID) VALUES ($1, $2)"
        }
        AnalyticTable::DimCourse => {
            "INSERT INTO DIMCOURSE (ID, CODE, TITLE, CREDITS, DEPARTMENTID) VALUES ($1, $2, $3, $4, $5)"
        }
        AnalyticTable::FactPrerequisite => {
            "INSERT INTO FACTPREREQUISITE (PREREQUISITEID, COURSEID) VALUES ($1, $2)"
        }
        AnalyticTable::FactClass => {
            "INSERT INTO FACTCLASS (ID, LOCATION, DAY, PERIOD, STARTDATE, ENDDATE, COURSEID, TEACHERID, DIMTERMID) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        }
        AnalyticTable::FactEnrollment => {
            "INSERT INTO FACTENROLLMENT (STUDENTID, CLASSID, GRADE, CREDITS, ATTENDANCERATE, WORKHABITS, FINAL, DIMTERMID) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        }
        AnalyticTable::FactTeacherPerformance => {
            "INSERT INTO FACTTEACHERPERFORMANCE (AVGGRADE, STUDENTCOUNT, DIMTEACHERID, FACTCLASSID, DIMTERMID) \
             VALUES ($1, $2, $3, $4, $5)"
        }
        AnalyticTable::FactDepartmentSummary => {
            "INSERT INTO FACTDEPARTMENTSUMMARY (AVGGRADE, STUDENTCOUNT, DIMDEPARTMENTID, DIMTERMID) \
             VALUES ($1, $2, $3, $4)"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column_list(sql: &str) -> usize {
        let open = sql.find('(').unwrap();
        let close = sql[open..].find(')').unwrap() + open;
        sql[open + 1..close].split(',').count()
    }

    #[test]
    fn insert_statements_bind_every_column() {
        for table in AnalyticTable::ALL {
            let sql = insert_sql(table);
            let placeholders = sql.matches('$').count();

            assert!(sql.contains(&format!("INTO {} ", table.name())), "{}", sql);
            assert_eq!(column_list(sql), placeholders, "{}", sql);
        }
    }

    #[test]
    fn source_queries_are_scoped_to_the_operational_schema() {
        let queries = [
            SourceQuery::Terms,
            SourceQuery::Students,
            SourceQuery::Teachers,
            SourceQuery::Departments,
            SourceQuery::DepartmentTeachers,
            SourceQuery::Courses,
            SourceQuery::Prerequisites,
            SourceQuery::Classes,
            SourceQuery::Enrollments,
            SourceQuery::TeacherPerformance,
            SourceQuery::DepartmentSummary,
        ];
        for query in queries {
            let sql = source_sql(query, "HIGHSCHOOL_OLTP");
            assert!(sql.contains(r#"FROM "HIGHSCHOOL_OLTP"."#), "{}", sql);

            let select_list = &sql["SELECT".len()..sql.find("FROM").unwrap()];
            assert_eq!(
                select_list.split(',').count(),
                query.column_count(),
                "{:?}",
                query
            );
        }
    }

    #[test]
    fn aggregate_queries_keep_their_join_roots() {
        let performance = source_sql(SourceQuery::TeacherPerformance, "s");
        assert!(performance.contains(r#"FROM "s"."Classes" c"#));
        assert!(performance.contains("LEFT JOIN"));

        let summary = source_sql(SourceQuery::DepartmentSummary, "s");
        assert!(summary.contains(r#"FROM "s"."Enrollments" e"#));
        assert!(summary.contains(r#"COUNT(DISTINCT e."StudentId")"#));
        assert!(!summary.contains("LEFT JOIN"));
    }

    #[test]
    fn column_types_map_to_a_read_strategy() {
        assert_eq!(ColumnKind::from_type_name("NUMERIC"), Some(ColumnKind::Numeric));
        assert_eq!(ColumnKind::from_type_name("BPCHAR"), Some(ColumnKind::Text));
        assert_eq!(ColumnKind::from_type_name("\"CHAR\""), Some(ColumnKind::Char));
        assert_eq!(ColumnKind::from_type_name("DATE"), Some(ColumnKind::Date));
        assert_eq!(
            ColumnKind::from_type_name("TIMESTAMPTZ"),
            Some(ColumnKind::TimestampTz)
        );
        assert_eq!(ColumnKind::from_type_name("JSONB"), None);
    }

    #[test]
    fn undecodable_column_is_stored_as_null() {
        let decoded = Err(sqlx::Error::ColumnDecode {
            index: "3".to_string(),
            source: "Decimal does not support NaN values".into(),
        });
        assert_eq!(recover_column("Credits", decoded), SourceValue::Null);
    }

    #[test]
    fn decoded_column_is_kept() {
        let decoded = Ok(SourceValue::Int(4));
        assert_eq!(recover_column("Credits", decoded), SourceValue::Int(4));
    }
}
