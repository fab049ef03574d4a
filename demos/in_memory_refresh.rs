// Runs a full refresh against the in-memory stores and prints the refresh log
// and the resulting aggregate facts.

use school_etl::model::{
    generate_id, AnalyticRow, AnalyticTable, Class, Course, Department, Enrollment,
    OperationalSnapshot, Student, Teacher, Term,
};
use school_etl::store::{InMemoryAnalyticStore, InMemoryOperationalStore};
use school_etl::RefreshPipeline;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let term = Term {
        id: generate_id(),
        year: "2025".to_string(),
        term_number: 1,
    };
    let teacher = Teacher {
        id: generate_id(),
        first_name: "Alan".to_string(),
        last_name: "Turing".to_string(),
        phone: "555-0100".to_string(),
        email: "alan@school.test".to_string(),
    };
    let department = Department {
        id: generate_id(),
        name: "Mathematics".to_string(),
        location: "North wing".to_string(),
        head_id: Some(teacher.id),
    };
    let course = Course {
        id: generate_id(),
        code: "MAT101".to_string(),
        title: "Algebra".to_string(),
        credits: 4,
        department_id: department.id,
    };
    let class = Class {
        id: generate_id(),
        location: "Room 101".to_string(),
        day: 1,
        period: 1,
        start_date: "2025-09-01".to_string(),
        end_date: "2026-01-31".to_string(),
        course_id: course.id,
        teacher_id: teacher.id,
        term_id: term.id,
    };
    let students: Vec<Student> = ["Ada", "Barbara", "Claude"]
        .iter()
        .enumerate()
        .map(|(i, name)| Student {
            id: generate_id(),
            first_name: name.to_string(),
            last_name: "Student".to_string(),
            grade_level: 10 + i as i32,
            phone: "555-0200".to_string(),
            email: format!("{}@students.test", name.to_lowercase()),
        })
        .collect();
    let enrollments = students
        .iter()
        .zip([70, 80, 90])
        .map(|(student, grade)| Enrollment {
            student_id: student.id,
            class_id: class.id,
            grade,
            attendance_rate: 95,
            work_habits: 'S',
            is_final: true,
        })
        .collect();

    let snapshot = OperationalSnapshot {
        terms: vec![term],
        students,
        teachers: vec![teacher],
        departments: vec![department],
        department_teachers: vec![],
        courses: vec![course],
        prerequisites: None,
        classes: vec![class],
        enrollments,
    };

    let pipeline = RefreshPipeline::new(
        Arc::new(InMemoryOperationalStore::new(snapshot)),
        Arc::new(InMemoryAnalyticStore::new()),
    );

    let log = pipeline.run_refresh().await?;
    for line in log.lines() {
        println!("{}", line);
    }

    println!();
    for table in [
        AnalyticTable::FactTeacherPerformance,
        AnalyticTable::FactDepartmentSummary,
    ] {
        for row in pipeline.analytic().rows(table) {
            match row {
                AnalyticRow::FactTeacherPerformance(fact) => println!(
                    "class {}: average {:?} over {:?} students",
                    fact.class_id, fact.avg_grade, fact.student_count
                ),
                AnalyticRow::FactDepartmentSummary(fact) => println!(
                    "department {} term {}: average {:?} over {:?} students",
                    fact.department_id, fact.term_id, fact.avg_grade, fact.student_count
                ),
                _ => {}
            }
        }
    }

    Ok(())
}
