//! The analytic star schema: tables, their foreign-key graph, and row types.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::model::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalyticTable {
    DimTerm,
    DimStudent,
    DimTeacher,
    DimDepartment,
    DimDepartmentTeacher,
    DimCourse,
    FactPrerequisite,
    FactClass,
    FactEnrollment,
    FactTeacherPerformance,
    FactDepartmentSummary,
}

impl AnalyticTable {
    pub const ALL: [AnalyticTable; 11] = [
        AnalyticTable::DimTerm,
        AnalyticTable::DimStudent,
        AnalyticTable::DimTeacher,
        AnalyticTable::DimDepartment,
        AnalyticTable::DimDepartmentTeacher,
        AnalyticTable::DimCourse,
        AnalyticTable::FactPrerequisite,
        AnalyticTable::FactClass,
        AnalyticTable::FactEnrollment,
        AnalyticTable::FactTeacherPerformance,
        AnalyticTable::FactDepartmentSummary,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AnalyticTable::DimTerm => "DIMTERM",
            AnalyticTable::DimStudent => "DIMSTUDENT",
            AnalyticTable::DimTeacher => "DIMTEACHER",
            AnalyticTable::DimDepartment => "DIMDEPARTMENT",
            AnalyticTable::DimDepartmentTeacher => "DIMDEPARTMENTTEACHER",
            AnalyticTable::DimCourse => "DIMCOURSE",
            AnalyticTable::FactPrerequisite => "FACTPREREQUISITE",
            AnalyticTable::FactClass => "FACTCLASS",
            AnalyticTable::FactEnrollment => "FACTENROLLMENT",
            AnalyticTable::FactTeacherPerformance => "FACTTEACHERPERFORMANCE",
            AnalyticTable::FactDepartmentSummary => "FACTDEPARTMENTSUMMARY",
        }
    }

    /// Tables referenced by this table's foreign keys.
    pub fn depends_on(self) -> &'static [AnalyticTable] {
        use AnalyticTable::*;
        match self {
            DimTerm | DimStudent | DimTeacher => &[],
            DimDepartment => &[DimTeacher],
            DimDepartmentTeacher => &[DimDepartment, DimTeacher],
            DimCourse => &[DimDepartment],
            FactPrerequisite => &[DimCourse],
            FactClass => &[DimCourse, DimTeacher, DimTerm],
            FactEnrollment => &[DimStudent, FactClass, DimTerm],
            FactTeacherPerformance => &[DimTeacher, FactClass, DimTerm],
            FactDepartmentSummary => &[DimDepartment, DimTerm],
        }
    }

    /// Tables whose foreign keys reference this table.
    pub fn dependents(self) -> impl Iterator<Item = AnalyticTable> {
        AnalyticTable::ALL
            .into_iter()
            .filter(move |table| table.depends_on().contains(&self))
    }
}

impl fmt::Display for AnalyticTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parents before children.
pub const LOAD_ORDER: [AnalyticTable; 11] = [
    AnalyticTable::DimTerm,
    AnalyticTable::DimStudent,
    AnalyticTable::DimTeacher,
    AnalyticTable::DimDepartment,
    AnalyticTable::DimDepartmentTeacher,
    AnalyticTable::DimCourse,
    AnalyticTable::FactPrerequisite,
    AnalyticTable::FactClass,
    AnalyticTable::FactEnrollment,
    AnalyticTable::FactTeacherPerformance,
    AnalyticTable::FactDepartmentSummary,
];

/// Children before parents.
pub const CLEAR_ORDER: [AnalyticTable; 11] = [
    AnalyticTable::FactDepartmentSummary,
    AnalyticTable::FactTeacherPerformance,
    AnalyticTable::FactEnrollment,
    AnalyticTable::FactClass,
    AnalyticTable::FactPrerequisite,
    AnalyticTable::DimDepartmentTeacher,
    AnalyticTable::DimCourse,
    AnalyticTable::DimDepartment,
    AnalyticTable::DimTeacher,
    AnalyticTable::DimStudent,
    AnalyticTable::DimTerm,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    /// Every table appears after the tables it references.
    Load,
    /// Every table appears before the tables it references.
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("{0} appears more than once")]
    Duplicate(AnalyticTable),
    #[error("{0} is missing")]
    Missing(AnalyticTable),
    #[error("{table} is ordered on the wrong side of {related}")]
    Violated {
        table: AnalyticTable,
        related: AnalyticTable,
    },
}

/// Check that `order` covers every table once and respects the foreign-key graph.
pub fn validate_order(order: &[AnalyticTable], direction: OrderDirection) -> Result<(), OrderError> {
    let position = |table: AnalyticTable| order.iter().position(|t| *t == table);

    for (index, table) in order.iter().enumerate() {
        if order[..index].contains(table) {
            return Err(OrderError::Duplicate(*table));
        }
    }
    for table in AnalyticTable::ALL {
        let Some(at) = position(table) else {
            return Err(OrderError::Missing(table));
        };
        for parent in table.depends_on() {
            let Some(parent_at) = position(*parent) else {
                return Err(OrderError::Missing(*parent));
            };
            let ok = match direction {
                OrderDirection::Load => parent_at < at,
                OrderDirection::Clear => parent_at > at,
            };
            if !ok {
                return Err(OrderError::Violated {
                    table,
                    related: *parent,
                });
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimTerm {
    pub id: Id,
    pub year: Option<String>,
    pub term_number: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimStudent {
    pub id: Id,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub grade_level: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimTeacher {
    pub id: Id,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimDepartment {
    pub id: Id,
    pub name: Option<String>,
    pub location: Option<String>,
    /// Department head.
    pub teacher_id: Option<Id>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimDepartmentTeacher {
    pub department_id: Id,
    pub teacher_id: Id,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimCourse {
    pub id: Id,
    pub code: Option<String>,
    pub title: Option<String>,
    pub credits: Option<i32>,
    pub department_id: Option<Id>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactPrerequisite {
    pub prerequisite_id: Id,
    pub course_id: Id,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactClass {
    pub id: Id,
    pub location: Option<String>,
    pub day: Option<i32>,
    pub period: Option<i32>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub course_id: Id,
    pub teacher_id: Id,
    pub term_id: Id,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactEnrollment {
    pub student_id: Id,
    pub class_id: Id,
    pub grade: Option<i32>,
    pub credits: Option<i32>,
    pub attendance_rate: Option<i32>,
    pub work_habits: Option<String>,
    /// 1 when the grade is final, 0 otherwise.
    pub is_final: Option<i16>,
    pub term_id: Option<Id>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactTeacherPerformance {
    pub avg_grade: Option<i32>,
    pub student_count: Option<i32>,
    pub teacher_id: Option<Id>,
    pub class_id: Id,
    pub term_id: Option<Id>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactDepartmentSummary {
    pub avg_grade: Option<i32>,
    pub student_count: Option<i32>,
    pub department_id: Id,
    pub term_id: Id,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", content = "row", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalyticRow {
    DimTerm(DimTerm),
    DimStudent(DimStudent),
    DimTeacher(DimTeacher),
    DimDepartment(DimDepartment),
    DimDepartmentTeacher(DimDepartmentTeacher),
    DimCourse(DimCourse),
    FactPrerequisite(FactPrerequisite),
    FactClass(FactClass),
    FactEnrollment(FactEnrollment),
    FactTeacherPerformance(FactTeacherPerformance),
    FactDepartmentSummary(FactDepartmentSummary),
}

impl AnalyticRow {
    pub fn table(&self) -> AnalyticTable {
        match self {
            AnalyticRow::DimTerm(_) => AnalyticTable::DimTerm,
            AnalyticRow::DimStudent(_) => AnalyticTable::DimStudent,
            AnalyticRow::DimTeacher(_) => AnalyticTable::DimTeacher,
            AnalyticRow::DimDepartment(_) => AnalyticTable::DimDepartment,
            AnalyticRow::DimDepartmentTeacher(_) => AnalyticTable::DimDepartmentTeacher,
            AnalyticRow::DimCourse(_) => AnalyticTable::DimCourse,
            AnalyticRow::FactPrerequisite(_) => AnalyticTable::FactPrerequisite,
            AnalyticRow::FactClass(_) => AnalyticTable::FactClass,
            AnalyticRow::FactEnrollment(_) => AnalyticTable::FactEnrollment,
            AnalyticRow::FactTeacherPerformance(_) => AnalyticTable::FactTeacherPerformance,
            AnalyticRow::FactDepartmentSummary(_) => AnalyticTable::FactDepartmentSummary,
        }
    }

    /// The `ID` column of tables that other tables reference.
    pub fn id(&self) -> Option<Id> {
        match self {
            AnalyticRow::DimTerm(r) => Some(r.id),
            AnalyticRow::DimStudent(r) => Some(r.id),
            AnalyticRow::DimTeacher(r) => Some(r.id),
            AnalyticRow::DimDepartment(r) => Some(r.id),
            AnalyticRow::DimCourse(r) => Some(r.id),
            AnalyticRow::FactClass(r) => Some(r.id),
            _ => None,
        }
    }

    /// Primary key columns, in declaration order. `None` for keyless tables.
    pub fn primary_key(&self) -> Option<Vec<Uuid>> {
        match self {
            AnalyticRow::DimDepartmentTeacher(r) => Some(vec![r.department_id, r.teacher_id]),
            AnalyticRow::FactPrerequisite(r) => Some(vec![r.prerequisite_id, r.course_id]),
            AnalyticRow::FactEnrollment(r) => Some(vec![r.student_id, r.class_id]),
            AnalyticRow::FactDepartmentSummary(r) => Some(vec![r.department_id, r.term_id]),
            AnalyticRow::FactTeacherPerformance(_) => None,
            other => other.id().map(|id| vec![id]),
        }
    }

    /// Non-null foreign keys as `(referenced table, referenced id)`.
    pub fn references(&self) -> Vec<(AnalyticTable, Id)> {
        use AnalyticTable as T;
        let refs: Vec<(AnalyticTable, Option<Id>)> = match self {
            AnalyticRow::DimTerm(_) | AnalyticRow::DimStudent(_) | AnalyticRow::DimTeacher(_) => {
                vec![]
            }
            AnalyticRow::DimDepartment(r) => vec![(T::DimTeacher, r.teacher_id)],
            AnalyticRow::DimDepartmentTeacher(r) => vec![
                (T::DimDepartment, Some(r.department_id)),
                (T::DimTeacher, Some(r.teacher_id)),
            ],
            AnalyticRow::DimCourse(r) => vec![(T::DimDepartment, r.department_id)],
            AnalyticRow::FactPrerequisite(r) => vec![
                (T::DimCourse, Some(r.prerequisite_id)),
                (T::DimCourse, Some(r.course_id)),
            ],
            AnalyticRow::FactClass(r) => vec![
                (T::DimCourse, Some(r.course_id)),
                (T::DimTeacher, Some(r.teacher_id)),
                (T::DimTerm, Some(r.term_id)),
            ],
            AnalyticRow::FactEnrollment(r) => vec![
                (T::DimStudent, Some(r.student_id)),
                (T::FactClass, Some(r.class_id)),
                (T::DimTerm, r.term_id),
            ],
            AnalyticRow::FactTeacherPerformance(r) => vec![
                (T::DimTeacher, r.teacher_id),
                (T::FactClass, Some(r.class_id)),
                (T::DimTerm, r.term_id),
            ],
            AnalyticRow::FactDepartmentSummary(r) => vec![
                (T::DimDepartment, Some(r.department_id)),
                (T::DimTerm, Some(r.term_id)),
            ],
        };
        refs.into_iter()
            .filter_map(|(table, id)| id.map(|id| (table, id)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    const STAR_SCHEMA: &str =
        include_str!("../../migrations/20251201000000_analytic_star_schema.sql");

    /// Table name to the tables its `REFERENCES` clauses point at.
    fn ddl_references(ddl: &str) -> BTreeMap<&str, BTreeSet<&str>> {
        ddl.split("CREATE TABLE IF NOT EXISTS ")
            .skip(1)
            .map(|body| {
                let mut tokens = body.split_whitespace();
                let table = tokens.next().unwrap_or_default();
                let mut targets = BTreeSet::new();
                while let Some(token) = tokens.next() {
                    if token == "REFERENCES" {
                        targets.extend(tokens.next());
                    }
                }
                (table, targets)
            })
            .collect()
    }

    #[test]
    fn dependency_graph_matches_the_migration_foreign_keys() {
        let references = ddl_references(STAR_SCHEMA);
        assert_eq!(references.len(), AnalyticTable::ALL.len());

        for table in AnalyticTable::ALL {
            let declared: BTreeSet<&str> =
                table.depends_on().iter().map(|parent| parent.name()).collect();
            assert_eq!(
                references.get(table.name()),
                Some(&declared),
                "foreign keys of {}",
                table
            );
        }
    }

    #[test]
    fn load_order_puts_parents_first() {
        assert_eq!(validate_order(&LOAD_ORDER, OrderDirection::Load), Ok(()));
    }

    #[test]
    fn clear_order_puts_children_first() {
        assert_eq!(validate_order(&CLEAR_ORDER, OrderDirection::Clear), Ok(()));
    }

    #[test]
    fn orders_are_not_interchangeable() {
        assert!(validate_order(&LOAD_ORDER, OrderDirection::Clear).is_err());
        assert!(validate_order(&CLEAR_ORDER, OrderDirection::Load).is_err());
    }

    #[test]
    fn validate_order_reports_the_first_violation() {
        let mut order = LOAD_ORDER;
        order.swap(0, 7); // FACTCLASS before DIMTERM
        assert!(matches!(
            validate_order(&order, OrderDirection::Load),
            Err(OrderError::Violated { .. })
        ));

        assert_eq!(
            validate_order(&LOAD_ORDER[..10], OrderDirection::Load),
            Err(OrderError::Missing(AnalyticTable::FactDepartmentSummary))
        );

        let mut duplicated = LOAD_ORDER;
        duplicated[10] = AnalyticTable::DimTerm;
        assert_eq!(
            validate_order(&duplicated, OrderDirection::Load),
            Err(OrderError::Duplicate(AnalyticTable::DimTerm))
        );
    }

    #[test]
    fn row_references_follow_the_table_graph() {
        let row = AnalyticRow::FactEnrollment(FactEnrollment {
            student_id: Uuid::new_v4(),
            class_id: Uuid::new_v4(),
            grade: Some(90),
            credits: Some(4),
            attendance_rate: Some(98),
            work_habits: Some("E".to_string()),
            is_final: Some(1),
            term_id: None,
        });

        for (table, _) in row.references() {
            assert!(row.table().depends_on().contains(&table));
        }
        // the null term is not a reference
        assert_eq!(row.references().len(), 2);
    }

    #[test]
    fn dependents_invert_depends_on() {
        let dependents: Vec<_> = AnalyticTable::FactClass.dependents().collect();
        assert_eq!(
            dependents,
            vec![
                AnalyticTable::FactEnrollment,
                AnalyticTable::FactTeacherPerformance
            ]
        );
        assert_eq!(AnalyticTable::FactDepartmentSummary.dependents().count(), 0);
    }
}
