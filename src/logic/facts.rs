//! Fact loaders, including the two derived aggregate facts.
//!
//! The aggregates are computed by the extraction query itself; the loaders
//! only coerce the aggregate columns and copy them across.

use log::info;

use crate::error::EtlResult;
use crate::logic::{copy_rows, RefreshLog};
use crate::model::{
    AnalyticRow, FactClass, FactDepartmentSummary, FactEnrollment, FactPrerequisite,
    FactTeacherPerformance, SourceQuery, PREREQUISITE_RELATION,
};
use crate::store::{SourceSession, UnitOfWork};

/// Copy prerequisite edges. Prerequisite tracking is optional in the
/// operational schema, so a missing relation skips this stage instead of
/// failing it.
pub async fn load_fact_prerequisite(
    source: &mut dyn SourceSession,
    target: &mut dyn UnitOfWork,
    log: &mut RefreshLog,
) -> EtlResult<()> {
    log.info("Loading FACTPREREQUISITE...");

    if !source.relation_exists(PREREQUISITE_RELATION).await? {
        log.skip(format!(
            "ETL skipped FACTPREREQUISITE: OLTP table {} does not exist.",
            PREREQUISITE_RELATION
        ));
        return Ok(());
    }

    let count = copy_rows(source, target, SourceQuery::Prerequisites, |row| {
        Ok(AnalyticRow::FactPrerequisite(FactPrerequisite {
            course_id: row.id(0, "CourseCourse.IsPrerequisiteForId")?,
            prerequisite_id: row.id(1, "CourseCourse.PrerequisitesId")?,
        }))
    })
    .await?;
    info!("FACTPREREQUISITE: {} rows", count);
    log.info("FACTPREREQUISITE loaded successfully.");
    Ok(())
}

pub async fn load_fact_class(
    source: &mut dyn SourceSession,
    target: &mut dyn UnitOfWork,
    log: &mut RefreshLog,
) -> EtlResult<()> {
    log.info("Loading FACTCLASS...");
    let count = copy_rows(source, target, SourceQuery::Classes, |row| {
        Ok(AnalyticRow::FactClass(FactClass {
            id: row.id(0, "Classes.Id")?,
            location: row.opt_text(1),
            day: row.opt_i32(2, "Classes.Day"),
            period: row.opt_i32(3, "Classes.Period"),
            start_date: row.opt_text(4),
            end_date: row.opt_text(5),
            course_id: row.id(6, "Classes.CourseId")?,
            teacher_id: row.id(7, "Classes.TeacherId")?,
            term_id: row.id(8, "Classes.TermId")?,
        }))
    })
    .await?;
    info!("FACTCLASS: {} rows", count);
    log.info("FACTCLASS loaded successfully.");
    Ok(())
}

/// One row per enrollment, enriched with the course's credits and the class's term.
pub async fn load_fact_enrollment(
    source: &mut dyn SourceSession,
    target: &mut dyn UnitOfWork,
    log: &mut RefreshLog,
) -> EtlResult<()> {
    log.info("Loading FACTENROLLMENT...");
    let count = copy_rows(source, target, SourceQuery::Enrollments, |row| {
        Ok(AnalyticRow::FactEnrollment(FactEnrollment {
            student_id: row.id(0, "Enrollments.StudentId")?,
            class_id: row.id(1, "Enrollments.ClassId")?,
            grade: row.opt_i32(2, "Enrollments.Grade"),
            credits: row.opt_i32(3, "Courses.Credits"),
            attendance_rate: row.opt_i32(4, "Enrollments.AttendanceRate"),
            work_habits: row.opt_text(5),
            is_final: row.flag(6, "Enrollments.Final"),
            term_id: row.opt_id(7, "Classes.TermId"),
        }))
    })
    .await?;
    info!("FACTENROLLMENT: {} rows", count);
    log.info("FACTENROLLMENT loaded successfully.");
    Ok(())
}

/// Average grade and enrolled-student count per class. Classes without
/// enrollments still produce a row, with no average and a zero count.
pub async fn load_fact_teacher_performance(
    source: &mut dyn SourceSession,
    target: &mut dyn UnitOfWork,
    log: &mut RefreshLog,
) -> EtlResult<()> {
    log.info("Loading FACTTEACHERPERFORMANCE...");
    let count = copy_rows(source, target, SourceQuery::TeacherPerformance, |row| {
        Ok(AnalyticRow::FactTeacherPerformance(FactTeacherPerformance {
            class_id: row.id(0, "Classes.Id")?,
            teacher_id: row.opt_id(1, "Classes.TeacherId"),
            term_id: row.opt_id(2, "Classes.TermId"),
            avg_grade: row.average(3, "AvgGrade"),
            student_count: row.opt_i32(4, "StudentCount"),
        }))
    })
    .await?;
    info!("FACTTEACHERPERFORMANCE: {} rows", count);
    log.info("FACTTEACHERPERFORMANCE loaded successfully.");
    Ok(())
}

/// Average grade and distinct-student count per (department, term). Only
/// groups with at least one enrollment appear.
pub async fn load_fact_department_summary(
    source: &mut dyn SourceSession,
    target: &mut dyn UnitOfWork,
    log: &mut RefreshLog,
) -> EtlResult<()> {
    log.info("Loading FACTDEPARTMENTSUMMARY...");
    let count = copy_rows(source, target, SourceQuery::DepartmentSummary, |row| {
        Ok(AnalyticRow::FactDepartmentSummary(FactDepartmentSummary {
            department_id: row.id(0, "Departments.Id")?,
            term_id: row.id(1, "Classes.TermId")?,
            avg_grade: row.average(2, "AvgGrade"),
            student_count: row.opt_i32(3, "StudentCount"),
        }))
    })
    .await?;
    info!("FACTDEPARTMENTSUMMARY: {} rows", count);
    log.info("FACTDEPARTMENTSUMMARY loaded successfully.");
    Ok(())
}
