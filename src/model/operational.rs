//! Operational (source-of-truth) entities and the extraction queries run against them.

use serde::{Deserialize, Serialize};

use crate::model::Id;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: Id,
    pub first_name: String,
    pub last_name: String,
    pub grade_level: i32,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Teacher {
    pub id: Id,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub id: Id,
    pub year: String,
    pub term_number: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: Id,
    pub name: String,
    pub location: String,
    pub head_id: Option<Id>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentTeacher {
    pub department_id: Id,
    pub teacher_id: Id,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: Id,
    pub code: String,
    pub title: String,
    pub credits: i32,
    pub department_id: Id,
}

/// `prerequisite_id` must be passed before `course_id` can be taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prerequisite {
    pub course_id: Id,
    pub prerequisite_id: Id,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    pub id: Id,
    pub location: String,
    pub day: i32,
    pub period: i32,
    /// `YYYY-MM-DD`
    pub start_date: String,
    pub end_date: String,
    pub course_id: Id,
    pub teacher_id: Id,
    pub term_id: Id,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub student_id: Id,
    pub class_id: Id,
    pub grade: i32,
    pub attendance_rate: i32,
    pub work_habits: char,
    pub is_final: bool,
}

/// Full content of an operational store.
///
/// `prerequisites` is `None` when the optional prerequisite relation does not
/// exist at all, which is different from it existing but being empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationalSnapshot {
    pub terms: Vec<Term>,
    pub students: Vec<Student>,
    pub teachers: Vec<Teacher>,
    pub departments: Vec<Department>,
    pub department_teachers: Vec<DepartmentTeacher>,
    pub courses: Vec<Course>,
    pub prerequisites: Option<Vec<Prerequisite>>,
    pub classes: Vec<Class>,
    pub enrollments: Vec<Enrollment>,
}

/// Name of the optional operational relation holding prerequisite edges.
pub const PREREQUISITE_RELATION: &str = "CourseCourse";

/// The extraction queries run against the operational store.
///
/// Each variant documents its column layout; rows returned by any
/// [`crate::store::SourceSession`] must follow it exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceQuery {
    /// Id, Year, TermNumber
    Terms,
    /// Id, FirstName, LastName, GradeLevel, Phone, Email
    Students,
    /// Id, FirstName, LastName, Phone, Email
    Teachers,
    /// Id, Name, Location, HeadId
    Departments,
    /// DepartmentId, TeacherId (inner join of Departments, DepartmentTeacher, Teachers)
    DepartmentTeachers,
    /// Id, Code, Title, Credits, DepartmentId
    Courses,
    /// CourseId, PrerequisiteId
    Prerequisites,
    /// Id, Location, Day, Period, StartDate, EndDate, CourseId, TeacherId, TermId
    Classes,
    /// StudentId, ClassId, Grade, Credits, AttendanceRate, WorkHabits, Final, TermId
    Enrollments,
    /// ClassId, TeacherId, TermId, AvgGrade, StudentCount, grouped per class
    /// from a left join of Classes to Enrollments
    TeacherPerformance,
    /// DepartmentId, TermId, AvgGrade, distinct StudentCount, grouped per
    /// (department, term) from Enrollments joined through Classes and Courses
    DepartmentSummary,
}

impl SourceQuery {
    pub fn column_count(self) -> usize {
        match self {
            SourceQuery::Terms => 3,
            SourceQuery::Students => 6,
            SourceQuery::Teachers => 5,
            SourceQuery::Departments => 4,
            SourceQuery::DepartmentTeachers => 2,
            SourceQuery::Courses => 5,
            SourceQuery::Prerequisites => 2,
            SourceQuery::Classes => 9,
            SourceQuery::Enrollments => 8,
            SourceQuery::TeacherPerformance => 5,
            SourceQuery::DepartmentSummary => 4,
        }
    }
}
