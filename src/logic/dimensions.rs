//! Dimension and bridge loaders: one analytic row per operational row, keyed by
//! the operational identifier.

use log::info;

use crate::error::EtlResult;
use crate::logic::{copy_rows, RefreshLog};
use crate::model::{
    AnalyticRow, DimCourse, DimDepartment, DimDepartmentTeacher, DimStudent, DimTeacher, DimTerm,
    SourceQuery,
};
use crate::store::{SourceSession, UnitOfWork};

pub async fn load_dim_term(
    source: &mut dyn SourceSession,
    target: &mut dyn UnitOfWork,
    log: &mut RefreshLog,
) -> EtlResult<()> {
    log.info("Loading DimTerm...");
    let count = copy_rows(source, target, SourceQuery::Terms, |row| {
        Ok(AnalyticRow::DimTerm(DimTerm {
            id: row.id(0, "Terms.Id")?,
            year: row.opt_text(1),
            term_number: row.opt_i32(2, "Terms.TermNumber"),
        }))
    })
    .await?;
    info!("DIMTERM: {} rows", count);
    log.info("DimTerm loaded successfully.");
    Ok(())
}

pub async fn load_dim_student(
    source: &mut dyn SourceSession,
    target: &mut dyn UnitOfWork,
    log: &mut RefreshLog,
) -> EtlResult<()> {
    log.info("Loading DimStudent...");
    let count = copy_rows(source, target, SourceQuery::Students, |row| {
        Ok(AnalyticRow::DimStudent(DimStudent {
            id: row.id(0, "Students.Id")?,
            first_name: row.opt_text(1),
            last_name: row.opt_text(2),
            grade_level: row.opt_i32(3, "Students.GradeLevel"),
            phone: row.opt_text(4),
            email: row.opt_text(5),
        }))
    })
    .await?;
    info!("DIMSTUDENT: {} rows", count);
    log.info("DimStudent loaded successfully.");
    Ok(())
}

pub async fn load_dim_teacher(
    source: &mut dyn SourceSession,
    target: &mut dyn UnitOfWork,
    log: &mut RefreshLog,
) -> EtlResult<()> {
    log.info("Loading DimTeacher...");
    let count = copy_rows(source, target, SourceQuery::Teachers, |row| {
        Ok(AnalyticRow::DimTeacher(DimTeacher {
            id: row.id(0, "Teachers.Id")?,
            first_name: row.opt_text(1),
            last_name: row.opt_text(2),
            phone: row.opt_text(3),
            email: row.opt_text(4),
        }))
    })
    .await?;
    info!("DIMTEACHER: {} rows", count);
    log.info("DimTeacher loaded successfully.");
    Ok(())
}

pub async fn load_dim_department(
    source: &mut dyn SourceSession,
    target: &mut dyn UnitOfWork,
    log: &mut RefreshLog,
) -> EtlResult<()> {
    log.info("Loading DimDepartment...");
    let count = copy_rows(source, target, SourceQuery::Departments, |row| {
        Ok(AnalyticRow::DimDepartment(DimDepartment {
            id: row.id(0, "Departments.Id")?,
            name: row.opt_text(1),
            location: row.opt_text(2),
            teacher_id: row.opt_id(3, "Departments.HeadId"),
        }))
    })
    .await?;
    info!("DIMDEPARTMENT: {} rows", count);
    log.info("DimDepartment loaded successfully.");
    Ok(())
}

/// Copy the department/teacher membership. The operational join table is
/// already a set, so no deduplication happens here.
pub async fn load_department_teacher_bridge(
    source: &mut dyn SourceSession,
    target: &mut dyn UnitOfWork,
    log: &mut RefreshLog,
) -> EtlResult<()> {
    log.info("Loading DimDepartmentTeacher bridge...");
    let count = copy_rows(source, target, SourceQuery::DepartmentTeachers, |row| {
        Ok(AnalyticRow::DimDepartmentTeacher(DimDepartmentTeacher {
            department_id: row.id(0, "DepartmentTeacher.DepartmentsId")?,
            teacher_id: row.id(1, "DepartmentTeacher.TeachersId")?,
        }))
    })
    .await?;
    info!("DIMDEPARTMENTTEACHER: {} rows", count);
    log.info("DimDepartmentTeacher bridge loaded successfully.");
    Ok(())
}

pub async fn load_dim_course(
    source: &mut dyn SourceSession,
    target: &mut dyn UnitOfWork,
    log: &mut RefreshLog,
) -> EtlResult<()> {
    log.info("Loading DimCourse...");
    let count = copy_rows(source, target, SourceQuery::Courses, |row| {
        Ok(AnalyticRow::DimCourse(DimCourse {
            id: row.id(0, "Courses.Id")?,
            code: row.opt_text(1),
            title: row.opt_text(2),
            credits: row.opt_i32(3, "Courses.Credits"),
            department_id: row.opt_id(4, "Courses.DepartmentId"),
        }))
    })
    .await?;
    info!("DIMCOURSE: {} rows", count);
    log.info("DimCourse loaded successfully.");
    Ok(())
}
