#![allow(dead_code)]

use school_etl::model::{
    generate_id, Class, Course, Department, DepartmentTeacher, Enrollment, Id,
    OperationalSnapshot, Prerequisite, Student, Teacher, Term,
};
use school_etl::store::{InMemoryAnalyticStore, InMemoryOperationalStore, SourceEncoding};
use school_etl::RefreshPipeline;
use std::sync::Arc;

pub type MemoryPipeline = RefreshPipeline<InMemoryOperationalStore, InMemoryAnalyticStore>;

/// A small school with two terms, three departments and three classes.
///
/// Algebra (autumn) has three students graded 70, 80 and 90. Calculus
/// (spring) has one. Programming (autumn) has nobody enrolled, and History
/// offers no courses at all.
pub struct School {
    pub snapshot: OperationalSnapshot,
    pub autumn: Id,
    pub spring: Id,
    pub math: Id,
    pub computing: Id,
    pub history: Id,
    pub alan: Id,
    pub grace: Id,
    pub edsger: Id,
    pub algebra: Id,
    pub calculus: Id,
    pub programming: Id,
    pub algebra_class: Id,
    pub calculus_class: Id,
    pub programming_class: Id,
    pub students: Vec<Id>,
}

fn term(year: &str, number: i32) -> Term {
    Term {
        id: generate_id(),
        year: year.to_string(),
        term_number: number,
    }
}

fn teacher(first: &str, last: &str) -> Teacher {
    Teacher {
        id: generate_id(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        phone: "555-0100".to_string(),
        email: format!("{}@school.test", first.to_lowercase()),
    }
}

fn student(first: &str, last: &str, grade_level: i32) -> Student {
    Student {
        id: generate_id(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        grade_level,
        phone: "555-0200".to_string(),
        email: format!("{}@students.test", first.to_lowercase()),
    }
}

fn department(name: &str, head_id: Option<Id>) -> Department {
    Department {
        id: generate_id(),
        name: name.to_string(),
        location: format!("{} wing", name),
        head_id,
    }
}

fn course(code: &str, title: &str, credits: i32, department_id: Id) -> Course {
    Course {
        id: generate_id(),
        code: code.to_string(),
        title: title.to_string(),
        credits,
        department_id,
    }
}

fn class(course_id: Id, teacher_id: Id, term_id: Id, room: &str) -> Class {
    Class {
        id: generate_id(),
        location: room.to_string(),
        day: 2,
        period: 3,
        start_date: "2025-09-01".to_string(),
        end_date: "2026-01-31".to_string(),
        course_id,
        teacher_id,
        term_id,
    }
}

pub fn enrollment(student_id: Id, class_id: Id, grade: i32, is_final: bool) -> Enrollment {
    Enrollment {
        student_id,
        class_id,
        grade,
        attendance_rate: 95,
        work_habits: 'S',
        is_final,
    }
}

impl School {
    pub fn new() -> Self {
        let autumn = term("2025", 1);
        let spring = term("2026", 2);

        let alan = teacher("Alan", "Turing");
        let grace = teacher("Grace", "Hopper");
        let edsger = teacher("Edsger", "Dijkstra");

        let ada = student("Ada", "Lovelace", 10);
        let barbara = student("Barbara", "Liskov", 11);
        let claude = student("Claude", "Shannon", 12);

        let math = department("Mathematics", Some(alan.id));
        let computing = department("Computing", Some(grace.id));
        let history = department("History", None);

        let algebra = course("MAT101", "Algebra", 4, math.id);
        let calculus = course("MAT201", "Calculus", 5, math.id);
        let programming = course("CS101", "Programming", 3, computing.id);

        let algebra_class = class(algebra.id, alan.id, autumn.id, "Room 101");
        let calculus_class = class(calculus.id, edsger.id, spring.id, "Room 102");
        let programming_class = class(programming.id, grace.id, autumn.id, "Lab 1");

        let enrollments = vec![
            enrollment(ada.id, algebra_class.id, 70, true),
            enrollment(barbara.id, algebra_class.id, 80, false),
            enrollment(claude.id, algebra_class.id, 90, true),
            enrollment(ada.id, calculus_class.id, 85, false),
        ];

        let snapshot = OperationalSnapshot {
            terms: vec![autumn.clone(), spring.clone()],
            students: vec![ada.clone(), barbara.clone(), claude.clone()],
            teachers: vec![alan.clone(), grace.clone(), edsger.clone()],
            departments: vec![math.clone(), computing.clone(), history.clone()],
            department_teachers: vec![
                DepartmentTeacher {
                    department_id: math.id,
                    teacher_id: alan.id,
                },
                DepartmentTeacher {
                    department_id: math.id,
                    teacher_id: edsger.id,
                },
                DepartmentTeacher {
                    department_id: computing.id,
                    teacher_id: grace.id,
                },
                DepartmentTeacher {
                    department_id: computing.id,
                    teacher_id: alan.id,
                },
            ],
            courses: vec![algebra.clone(), calculus.clone(), programming.clone()],
            prerequisites: Some(vec![Prerequisite {
                course_id: calculus.id,
                prerequisite_id: algebra.id,
            }]),
            classes: vec![
                algebra_class.clone(),
                calculus_class.clone(),
                programming_class.clone(),
            ],
            enrollments,
        };

        Self {
            snapshot,
            autumn: autumn.id,
            spring: spring.id,
            math: math.id,
            computing: computing.id,
            history: history.id,
            alan: alan.id,
            grace: grace.id,
            edsger: edsger.id,
            algebra: algebra.id,
            calculus: calculus.id,
            programming: programming.id,
            algebra_class: algebra_class.id,
            calculus_class: calculus_class.id,
            programming_class: programming_class.id,
            students: vec![ada.id, barbara.id, claude.id],
        }
    }

    pub fn pipeline(&self) -> MemoryPipeline {
        self.pipeline_with(SourceEncoding::default())
    }

    pub fn pipeline_with(&self, encoding: SourceEncoding) -> MemoryPipeline {
        let operational =
            InMemoryOperationalStore::new(self.snapshot.clone()).with_encoding(encoding);
        RefreshPipeline::new(Arc::new(operational), Arc::new(InMemoryAnalyticStore::new()))
    }
}
