//! In-process stores.
//!
//! The operational side evaluates every [`SourceQuery`] over plain entity
//! vectors, surfacing values in a configurable representation. The analytic
//! side behaves like a transactional database with enforced keys: writes are
//! staged in a private copy and swapped in on commit.

use itertools::Itertools;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{EtlError, EtlResult};
use crate::model::{
    AnalyticRow, AnalyticTable, Id, OperationalSnapshot, SourceQuery, SourceRow, SourceValue,
    PREREQUISITE_RELATION,
};
use crate::store::traits::{AnalyticStore, OperationalStore, SourceSession, UnitOfWork};

/// How values of the in-memory operational store are surfaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceEncoding {
    /// Identifiers as 16 raw bytes instead of typed UUIDs.
    pub raw_identifiers: bool,
    /// Integer columns as decimal text.
    pub textual_integers: bool,
    /// Averages as floating-point instead of fixed-point.
    pub float_averages: bool,
    /// Course credits as a value no integer coercion accepts.
    pub unreadable_credits: bool,
}

impl SourceEncoding {
    fn id(&self, id: Id) -> SourceValue {
        if self.raw_identifiers {
            SourceValue::Bytes(id.as_bytes().to_vec())
        } else {
            SourceValue::Uuid(id)
        }
    }

    fn opt_id(&self, id: Option<Id>) -> SourceValue {
        id.map_or(SourceValue::Null, |id| self.id(id))
    }

    fn int(&self, value: i64) -> SourceValue {
        if self.textual_integers {
            SourceValue::Text(value.to_string())
        } else {
            SourceValue::Int(value)
        }
    }

    fn credits(&self, value: i32) -> SourceValue {
        if self.unreadable_credits {
            SourceValue::Text("NaN".to_string())
        } else {
            self.int(i64::from(value))
        }
    }

    fn text(&self, value: &str) -> SourceValue {
        SourceValue::Text(value.to_string())
    }

    fn average(&self, grades: &[i32]) -> SourceValue {
        if grades.is_empty() {
            return SourceValue::Null;
        }
        let sum: i64 = grades.iter().map(|g| i64::from(*g)).sum();
        if self.float_averages {
            SourceValue::Float(sum as f64 / grades.len() as f64)
        } else {
            SourceValue::Decimal(Decimal::from(sum) / Decimal::from(grades.len() as u64))
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryOperationalStore {
    snapshot: RwLock<OperationalSnapshot>,
    encoding: SourceEncoding,
    unreachable: AtomicBool,
}

impl InMemoryOperationalStore {
    pub fn new(snapshot: OperationalSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
            encoding: SourceEncoding::default(),
            unreachable: AtomicBool::new(false),
        }
    }

    pub fn with_encoding(mut self, encoding: SourceEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Apply an edit, as the operational CRUD layer would.
    pub fn update(&self, edit: impl FnOnce(&mut OperationalSnapshot)) {
        edit(&mut *self.snapshot.write());
    }

    pub fn snapshot(&self) -> OperationalSnapshot {
        self.snapshot.read().clone()
    }

    /// Make every subsequent connection attempt fail.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> EtlResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(EtlError::connect("operational", "connection refused"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl OperationalStore for InMemoryOperationalStore {
    async fn ping(&self) -> EtlResult<()> {
        self.check_reachable()
    }

    async fn open(&self) -> EtlResult<Box<dyn SourceSession>> {
        self.check_reachable()?;
        Ok(Box::new(InMemorySourceSession {
            snapshot: self.snapshot(),
            encoding: self.encoding,
        }))
    }
}

/// A session reads the snapshot taken when it was opened.
pub struct InMemorySourceSession {
    snapshot: OperationalSnapshot,
    encoding: SourceEncoding,
}

#[async_trait::async_trait]
impl SourceSession for InMemorySourceSession {
    async fn relation_exists(&mut self, relation: &str) -> EtlResult<bool> {
        Ok(relation != PREREQUISITE_RELATION || self.snapshot.prerequisites.is_some())
    }

    async fn fetch(&mut self, query: SourceQuery) -> EtlResult<Vec<SourceRow>> {
        evaluate(&self.snapshot, query, &self.encoding)
    }

    async fn close(self: Box<Self>) -> EtlResult<()> {
        Ok(())
    }
}

fn evaluate(
    snapshot: &OperationalSnapshot,
    query: SourceQuery,
    enc: &SourceEncoding,
) -> EtlResult<Vec<SourceRow>> {
    let rows = match query {
        SourceQuery::Terms => snapshot
            .terms
            .iter()
            .map(|t| vec![enc.id(t.id), enc.text(&t.year), enc.int(i64::from(t.term_number))])
            .collect_vec(),
        SourceQuery::Students => snapshot
            .students
            .iter()
            .map(|s| {
                vec![
                    enc.id(s.id),
                    enc.text(&s.first_name),
                    enc.text(&s.last_name),
                    enc.int(i64::from(s.grade_level)),
                    enc.text(&s.phone),
                    enc.text(&s.email),
                ]
            })
            .collect_vec(),
        SourceQuery::Teachers => snapshot
            .teachers
            .iter()
            .map(|t| {
                vec![
                    enc.id(t.id),
                    enc.text(&t.first_name),
                    enc.text(&t.last_name),
                    enc.text(&t.phone),
                    enc.text(&t.email),
                ]
            })
            .collect_vec(),
        SourceQuery::Departments => snapshot
            .departments
            .iter()
            .map(|d| {
                vec![
                    enc.id(d.id),
                    enc.text(&d.name),
                    enc.text(&d.location),
                    enc.opt_id(d.head_id),
                ]
            })
            .collect_vec(),
        SourceQuery::DepartmentTeachers => snapshot
            .department_teachers
            .iter()
            .filter(|m| {
                snapshot.departments.iter().any(|d| d.id == m.department_id)
                    && snapshot.teachers.iter().any(|t| t.id == m.teacher_id)
            })
            .map(|m| vec![enc.id(m.department_id), enc.id(m.teacher_id)])
            .collect_vec(),
        SourceQuery::Courses => snapshot
            .courses
            .iter()
            .map(|c| {
                vec![
                    enc.id(c.id),
                    enc.text(&c.code),
                    enc.text(&c.title),
                    enc.credits(c.credits),
                    enc.id(c.department_id),
                ]
            })
            .collect_vec(),
        SourceQuery::Prerequisites => match &snapshot.prerequisites {
            Some(edges) => edges
                .iter()
                .map(|p| vec![enc.id(p.course_id), enc.id(p.prerequisite_id)])
                .collect_vec(),
            None => {
                return Err(EtlError::Integrity(format!(
                    "relation {} does not exist",
                    PREREQUISITE_RELATION
                )))
            }
        },
        SourceQuery::Classes => snapshot
            .classes
            .iter()
            .map(|c| {
                vec![
                    enc.id(c.id),
                    enc.text(&c.location),
                    enc.int(i64::from(c.day)),
                    enc.int(i64::from(c.period)),
                    enc.text(&c.start_date),
                    enc.text(&c.end_date),
                    enc.id(c.course_id),
                    enc.id(c.teacher_id),
                    enc.id(c.term_id),
                ]
            })
            .collect_vec(),
        SourceQuery::Enrollments => {
            let classes: HashMap<Id, _> = snapshot.classes.iter().map(|c| (c.id, c)).collect();
            let courses: HashMap<Id, _> = snapshot.courses.iter().map(|c| (c.id, c)).collect();
            snapshot
                .enrollments
                .iter()
                .filter_map(|e| {
                    let class = classes.get(&e.class_id)?;
                    let course = courses.get(&class.course_id)?;
                    Some(vec![
                        enc.id(e.student_id),
                        enc.id(e.class_id),
                        enc.int(i64::from(e.grade)),
                        enc.credits(course.credits),
                        enc.int(i64::from(e.attendance_rate)),
                        enc.text(&e.work_habits.to_string()),
                        SourceValue::Bool(e.is_final),
                        enc.id(class.term_id),
                    ])
                })
                .collect_vec()
        }
        SourceQuery::TeacherPerformance => {
            let grades_by_class = snapshot
                .enrollments
                .iter()
                .map(|e| (e.class_id, e.grade))
                .into_group_map();
            snapshot
                .classes
                .iter()
                .map(|c| {
                    let grades = grades_by_class.get(&c.id).map(Vec::as_slice).unwrap_or(&[]);
                    vec![
                        enc.id(c.id),
                        enc.id(c.teacher_id),
                        enc.id(c.term_id),
                        enc.average(grades),
                        SourceValue::Int(grades.len() as i64),
                    ]
                })
                .collect_vec()
        }
        SourceQuery::DepartmentSummary => {
            let classes: HashMap<Id, _> = snapshot.classes.iter().map(|c| (c.id, c)).collect();
            let courses: HashMap<Id, _> = snapshot.courses.iter().map(|c| (c.id, c)).collect();
            let groups = snapshot
                .enrollments
                .iter()
                .filter_map(|e| {
                    let class = classes.get(&e.class_id)?;
                    let course = courses.get(&class.course_id)?;
                    snapshot
                        .departments
                        .iter()
                        .find(|d| d.id == course.department_id)
                        .map(|d| ((d.id, class.term_id), e))
                })
                .into_group_map();
            groups
                .into_iter()
                .sorted_by_key(|(key, _)| *key)
                .map(|((department_id, term_id), enrollments)| {
                    let grades = enrollments.iter().map(|e| e.grade).collect_vec();
                    let students = enrollments.iter().map(|e| e.student_id).unique().count();
                    vec![
                        enc.id(department_id),
                        enc.id(term_id),
                        enc.average(&grades),
                        SourceValue::Int(students as i64),
                    ]
                })
                .collect_vec()
        }
    };
    Ok(rows.into_iter().map(SourceRow::new).collect())
}

/// Committed content of an in-memory analytic store, per table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalyticTables {
    tables: BTreeMap<AnalyticTable, Vec<AnalyticRow>>,
}

impl AnalyticTables {
    pub fn rows(&self, table: AnalyticTable) -> &[AnalyticRow] {
        self.tables.get(&table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, table: AnalyticTable) -> usize {
        self.rows(table).len()
    }

    pub fn total_rows(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    fn contains_id(&self, table: AnalyticTable, id: Id) -> bool {
        self.rows(table).iter().any(|row| row.id() == Some(id))
    }

    fn insert_checked(&mut self, row: AnalyticRow) -> EtlResult<()> {
        let table = row.table();
        if let Some(key) = row.primary_key() {
            if self
                .rows(table)
                .iter()
                .any(|existing| existing.primary_key().as_ref() == Some(&key))
            {
                return Err(EtlError::Integrity(format!(
                    "duplicate key {:?} in {}",
                    key, table
                )));
            }
        }
        for (parent, id) in row.references() {
            if !self.contains_id(parent, id) {
                return Err(EtlError::Integrity(format!(
                    "{} row references {} {} which does not exist",
                    table, parent, id
                )));
            }
        }
        self.tables.entry(table).or_default().push(row);
        Ok(())
    }

    fn delete_all_checked(&mut self, table: AnalyticTable) -> EtlResult<u64> {
        if let Some(child) = table.dependents().find(|child| self.count(*child) > 0) {
            return Err(EtlError::Integrity(format!(
                "{} is still referenced by rows in {}",
                table, child
            )));
        }
        Ok(self.tables.remove(&table).map_or(0, |rows| rows.len() as u64))
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Faults {
    insert_into: Option<AnalyticTable>,
    delete_from: Option<AnalyticTable>,
    unreachable: bool,
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryAnalyticStore {
    committed: Arc<RwLock<AnalyticTables>>,
    faults: Arc<RwLock<Faults>>,
}

impl InMemoryAnalyticStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> AnalyticTables {
        self.committed.read().clone()
    }

    pub fn rows(&self, table: AnalyticTable) -> Vec<AnalyticRow> {
        self.committed.read().rows(table).to_vec()
    }

    pub fn count(&self, table: AnalyticTable) -> usize {
        self.committed.read().count(table)
    }

    /// Write rows directly, with the same key checks as a unit of work.
    pub fn preload(&self, rows: impl IntoIterator<Item = AnalyticRow>) -> EtlResult<()> {
        let mut staged = self.snapshot();
        for row in rows {
            staged.insert_checked(row)?;
        }
        *self.committed.write() = staged;
        Ok(())
    }

    /// Make every insert into `table` fail until [`Self::clear_faults`].
    pub fn fail_inserts_into(&self, table: AnalyticTable) {
        self.faults.write().insert_into = Some(table);
    }

    /// Make every delete from `table` fail until [`Self::clear_faults`].
    pub fn fail_deletes_from(&self, table: AnalyticTable) {
        self.faults.write().delete_from = Some(table);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.faults.write().unreachable = unreachable;
    }

    pub fn clear_faults(&self) {
        *self.faults.write() = Faults::default();
    }
}

#[async_trait::async_trait]
impl AnalyticStore for InMemoryAnalyticStore {
    async fn begin(&self) -> EtlResult<Box<dyn UnitOfWork>> {
        if self.faults.read().unreachable {
            return Err(EtlError::connect("analytic", "connection refused"));
        }
        Ok(Box::new(InMemoryUnitOfWork {
            staged: self.snapshot(),
            target: Arc::clone(&self.committed),
            faults: Arc::clone(&self.faults),
        }))
    }
}

pub struct InMemoryUnitOfWork {
    staged: AnalyticTables,
    target: Arc<RwLock<AnalyticTables>>,
    faults: Arc<RwLock<Faults>>,
}

#[async_trait::async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn delete_all(&mut self, table: AnalyticTable) -> EtlResult<u64> {
        if self.faults.read().delete_from == Some(table) {
            return Err(EtlError::Integrity(format!("{} is locked", table)));
        }
        self.staged.delete_all_checked(table)
    }

    async fn insert(&mut self, row: AnalyticRow) -> EtlResult<()> {
        if self.faults.read().insert_into == Some(row.table()) {
            return Err(EtlError::Integrity(format!(
                "insert into {} rejected",
                row.table()
            )));
        }
        self.staged.insert_checked(row)
    }

    async fn commit(self: Box<Self>) -> EtlResult<()> {
        let this = *self;
        *this.target.write() = this.staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> EtlResult<()> {
        Ok(())
    }
}
