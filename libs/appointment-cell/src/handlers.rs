use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::{DateTime, NaiveDate, Utc};
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    Appointment, AppointmentSearchQuery, AppointmentStatus, BookAppointmentRequest,
    SchedulingError,
};
use crate::services::{AppointmentRecordsService, SchedulingService};

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct AvailabilityCheckQuery {
    pub doctor_id: Uuid,
    pub datetime: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct AppointmentQueryParams {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

fn map_scheduling_error(e: SchedulingError) -> AppError {
    match e {
        SchedulingError::SlotUnavailable => {
            AppError::Conflict("The selected time slot is not available".to_string())
        }
        SchedulingError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        SchedulingError::InvalidStatusTransition(status) => {
            AppError::BadRequest(format!("Appointment cannot change status from {}", status))
        }
        SchedulingError::Validation(msg) => AppError::BadRequest(msg),
        SchedulingError::Database(msg) => AppError::Database(msg),
    }
}

fn authorize_participant(user: &User, appointment: &Appointment) -> Result<(), AppError> {
    let is_patient = user.id == appointment.patient_id.to_string();
    let is_doctor = user.id == appointment.doctor_id.to_string();

    if !is_patient && !is_doctor && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Not authorized to access this appointment".to_string(),
        ));
    }
    Ok(())
}

// ==============================================================================
// BOOKING AND AVAILABILITY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    // Patients book for themselves; staff may book on their behalf.
    let is_own_booking = user.id == request.patient_id.to_string();
    if !is_own_booking && !user.is_admin() && !user.is_doctor() {
        return Err(AppError::Forbidden(
            "Not authorized to book an appointment for this patient".to_string(),
        ));
    }

    let service = SchedulingService::new(&state);
    let appointment = service
        .book_appointment(request, auth.token())
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "appointment": appointment,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn check_availability(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<AvailabilityCheckQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = SchedulingService::new(&state);
    let available = service
        .is_slot_available(query.doctor_id, query.datetime, auth.token())
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "doctor_id": query.doctor_id,
        "datetime": query.datetime,
        "available": available
    })))
}

#[axum::debug_handler]
pub async fn list_available_slots(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<SlotsQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = SchedulingService::new(&state);
    let slots = service
        .available_slots(doctor_id, query.date, auth.token())
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "date": query.date,
        "slots": slots
    })))
}

// ==============================================================================
// RECORD HANDLERS
// ==============================================================================

/// The caller's own appointments: a patient sees what they booked, a
/// doctor sees their calendar.
#[axum::debug_handler]
pub async fn get_my_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let user_id = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Caller identity is not a valid id".to_string()))?;

    let query = if user.is_doctor() {
        AppointmentSearchQuery {
            patient_id: None,
            doctor_id: Some(user_id),
            status: None,
            from_date: None,
            to_date: None,
            limit: None,
            offset: None,
        }
    } else if user.is_patient() {
        AppointmentSearchQuery {
            patient_id: Some(user_id),
            doctor_id: None,
            status: None,
            from_date: None,
            to_date: None,
            limit: None,
            offset: None,
        }
    } else {
        return Err(AppError::Forbidden(
            "Only patients and doctors have their own appointment list".to_string(),
        ));
    };

    let service = AppointmentRecordsService::new(&state);
    let appointments = service
        .search_appointments(query, auth.token())
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({ "appointments": appointments })))
}

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<AppointmentQueryParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only administrators can search all appointments".to_string(),
        ));
    }

    let query = AppointmentSearchQuery {
        patient_id: params.patient_id,
        doctor_id: params.doctor_id,
        status: params.status,
        from_date: params.from_date,
        to_date: params.to_date,
        limit: params.limit,
        offset: params.offset,
    };

    let service = AppointmentRecordsService::new(&state);
    let appointments = service
        .search_appointments(query, auth.token())
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({ "appointments": appointments })))
}

#[axum::debug_handler]
pub async fn list_all_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only administrators can list all appointments".to_string(),
        ));
    }

    let service = AppointmentRecordsService::new(&state);
    let appointments = service
        .list_with_names(auth.token())
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({ "appointments": appointments })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentRecordsService::new(&state);
    let appointment = service
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(map_scheduling_error)?;

    authorize_participant(&user, &appointment)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentRecordsService::new(&state);

    let appointment = service
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(map_scheduling_error)?;
    authorize_participant(&user, &appointment)?;

    let cancelled = service
        .cancel_appointment(appointment_id, request.reason, auth.token())
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "appointment": cancelled,
        "message": "Appointment cancelled"
    })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentRecordsService::new(&state);

    let appointment = service
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(map_scheduling_error)?;

    let is_doctor = user.id == appointment.doctor_id.to_string();
    if !is_doctor && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only the doctor involved can complete an appointment".to_string(),
        ));
    }

    let completed = service
        .complete_appointment(appointment_id, auth.token())
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "appointment": completed,
        "message": "Appointment completed"
    })))
}
