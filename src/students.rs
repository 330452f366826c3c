use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;
use serde_json::Value;

use crate::auth::Identity;
use crate::models::Student;
use crate::validate::validate_student;
use crate::{proceeds, AppState, Error, Payload};

#[derive(Debug, Clone, Serialize)]
pub struct Deleted {
    success: bool,
}

// ids that are not integers cannot exist, so they are simply not found
fn student_id(raw: &str) -> Result<i64, Error> {
    raw.parse().map_err(|_| Error::student_not_found())
}

fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, Error> {
    body.map(|Json(value)| value)
        .map_err(|rejection| Error::InvalidPayload {
            message: rejection.to_string(),
        })
}

pub async fn list_students(Extension(state): Extension<Arc<AppState>>) -> Payload<Vec<Student>> {
    proceeds(state.students.list().await?)
}

pub async fn read_student(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Payload<Student> {
    proceeds(state.students.get(student_id(&id)?).await?)
}

pub async fn create_student(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Student>), Error> {
    let fields = validate_student(&json_body(body)?)?;
    let student = state.students.create(&fields).await?;
    log::info!("{} created student {}", identity.username, student.id);
    Ok((StatusCode::CREATED, Json(student)))
}

pub async fn update_student(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Payload<Student> {
    let fields = validate_student(&json_body(body)?)?;
    let student = state.students.update(student_id(&id)?, &fields).await?;
    log::info!("{} updated student {}", identity.username, student.id);
    proceeds(student)
}

pub async fn delete_student(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Payload<Deleted> {
    let id = student_id(&id)?;
    state.students.delete(id).await?;
    log::info!("{} deleted student {}", identity.username, id);
    proceeds(Deleted { success: true })
}
