use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    CreateAvailabilityRequest, CreateDoctorRequest, DoctorError, UpdateAvailabilityRequest,
    UpdateDoctorRequest,
};
use crate::services::{AvailabilityService, DoctorService};

fn map_doctor_error(e: DoctorError) -> AppError {
    match e {
        DoctorError::NotFound => AppError::NotFound("Doctor not found".to_string()),
        DoctorError::AvailabilityNotFound => {
            AppError::NotFound("Availability window not found".to_string())
        }
        DoctorError::Validation(msg) => AppError::BadRequest(msg),
        DoctorError::WindowConflict => {
            AppError::Conflict("An availability window already exists for this day".to_string())
        }
        DoctorError::Database(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn list_doctors(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = DoctorService::new(&state);
    let doctors = service
        .list_doctors(auth.token())
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!({ "doctors": doctors })))
}

#[axum::debug_handler]
pub async fn get_doctor(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = DoctorService::new(&state);
    let doctor = service
        .get_doctor(doctor_id, auth.token())
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn create_doctor(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only administrators can create doctors".to_string(),
        ));
    }

    let service = DoctorService::new(&state);
    let doctor = service
        .create_doctor(request, auth.token())
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!({
        "doctor": doctor,
        "message": "Doctor created successfully"
    })))
}

#[axum::debug_handler]
pub async fn update_doctor(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    let is_self = user.id == doctor_id.to_string();
    if !is_self && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Not authorized to update this doctor".to_string(),
        ));
    }

    let service = DoctorService::new(&state);
    let doctor = service
        .update_doctor(doctor_id, request, auth.token())
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn delete_doctor(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only administrators can delete doctors".to_string(),
        ));
    }

    let service = DoctorService::new(&state);
    service
        .delete_doctor(doctor_id, auth.token())
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!({ "message": "Doctor deleted" })))
}

// ==============================================================================
// AVAILABILITY WINDOW HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_availability(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);
    let windows = service
        .list_for_doctor(doctor_id, auth.token())
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!({ "availability": windows })))
}

#[axum::debug_handler]
pub async fn create_availability(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    let is_self = user.id == doctor_id.to_string();
    if !is_self && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Not authorized to manage this doctor's availability".to_string(),
        ));
    }

    let service = AvailabilityService::new(&state);
    let window = service
        .create_window(doctor_id, request, auth.token())
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!({
        "availability": window,
        "message": "Availability window created"
    })))
}

#[axum::debug_handler]
pub async fn update_availability(
    State(state): State<Arc<AppConfig>>,
    Path(availability_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);

    let current = service
        .get_window(availability_id, auth.token())
        .await
        .map_err(map_doctor_error)?;

    let is_owner = user.id == current.doctor_id.to_string();
    if !is_owner && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Not authorized to manage this doctor's availability".to_string(),
        ));
    }

    let window = service
        .update_window(availability_id, request, auth.token())
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!(window)))
}

#[axum::debug_handler]
pub async fn delete_availability(
    State(state): State<Arc<AppConfig>>,
    Path(availability_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);

    let current = service
        .get_window(availability_id, auth.token())
        .await
        .map_err(map_doctor_error)?;

    let is_owner = user.id == current.doctor_id.to_string();
    if !is_owner && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Not authorized to manage this doctor's availability".to_string(),
        ));
    }

    service
        .delete_window(availability_id, auth.token())
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!({ "message": "Availability window deleted" })))
}
