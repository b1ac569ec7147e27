use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::PostgrestClient;

use crate::models::{
    Appointment, AppointmentSearchQuery, AppointmentStatus, AppointmentSummary, SchedulingError,
};

/// Read and lifecycle operations over appointment records. Status
/// transitions live here, outside the scheduling core; cancelling frees
/// the slot because the core ignores cancelled rows.
pub struct AppointmentRecordsService {
    store: Arc<PostgrestClient>,
}

impl AppointmentRecordsService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(PostgrestClient::new(config)),
        }
    }

    pub fn with_store(store: Arc<PostgrestClient>) -> Self {
        Self { store }
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        debug!("Fetching appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| SchedulingError::Database(e.to_string()))?;

        let row = result.into_iter().next().ok_or(SchedulingError::NotFound)?;

        serde_json::from_value(row)
            .map_err(|e| SchedulingError::Database(format!("Failed to parse appointment: {}", e)))
    }

    pub async fn search_appointments(
        &self,
        query: AppointmentSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let mut filters = Vec::new();

        if let Some(patient_id) = query.patient_id {
            filters.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(doctor_id) = query.doctor_id {
            filters.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(status) = query.status {
            filters.push(format!("status=eq.{}", status));
        }
        if let Some(from_date) = query.from_date {
            let encoded = urlencoding::encode(&from_date.to_rfc3339()).into_owned();
            filters.push(format!("appointment_datetime=gte.{}", encoded));
        }
        if let Some(to_date) = query.to_date {
            let encoded = urlencoding::encode(&to_date.to_rfc3339()).into_owned();
            filters.push(format!("appointment_datetime=lte.{}", encoded));
        }

        let mut path = format!(
            "/rest/v1/appointments?{}&order=appointment_datetime.asc",
            filters.join("&")
        );
        if let Some(limit) = query.limit {
            path.push_str(&format!("&limit={}", limit));
        }
        if let Some(offset) = query.offset {
            path.push_str(&format!("&offset={}", offset));
        }

        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| SchedulingError::Database(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| SchedulingError::Database(format!("Failed to parse appointments: {}", e)))
    }

    /// Admin listing: every appointment joined with the names of the
    /// people involved.
    pub async fn list_with_names(
        &self,
        auth_token: &str,
    ) -> Result<Vec<AppointmentSummary>, SchedulingError> {
        let path = "/rest/v1/appointments?select=*,patient:patients(full_name),doctor:doctors(full_name)&order=appointment_datetime.desc";

        let result: Vec<JoinedAppointmentRow> = self
            .store
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| SchedulingError::Database(e.to_string()))?;

        Ok(result.into_iter().map(JoinedAppointmentRow::into_summary).collect())
    }

    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        reason: Option<String>,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let current = self.get_appointment(appointment_id, auth_token).await?;
        validate_transition(current.status, AppointmentStatus::Cancelled)?;

        let notes = match (current.notes, reason) {
            (Some(existing), Some(reason)) => Some(format!("{}\nCancelled: {}", existing, reason)),
            (None, Some(reason)) => Some(format!("Cancelled: {}", reason)),
            (notes, None) => notes,
        };

        let updated = self
            .update_record(
                appointment_id,
                json!({
                    "status": AppointmentStatus::Cancelled.to_string(),
                    "notes": notes,
                    "updated_at": Utc::now().to_rfc3339(),
                }),
                auth_token,
            )
            .await?;

        info!("Appointment {} cancelled", appointment_id);
        Ok(updated)
    }

    pub async fn complete_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let current = self.get_appointment(appointment_id, auth_token).await?;
        validate_transition(current.status, AppointmentStatus::Completed)?;

        let updated = self
            .update_record(
                appointment_id,
                json!({
                    "status": AppointmentStatus::Completed.to_string(),
                    "updated_at": Utc::now().to_rfc3339(),
                }),
                auth_token,
            )
            .await?;

        info!("Appointment {} completed", appointment_id);
        Ok(updated)
    }

    async fn update_record(
        &self,
        appointment_id: Uuid,
        update_data: Value,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .store
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(update_data),
                Some(headers),
            )
            .await
            .map_err(|e| SchedulingError::Database(e.to_string()))?;

        let row = result.into_iter().next().ok_or(SchedulingError::NotFound)?;

        serde_json::from_value(row)
            .map_err(|e| SchedulingError::Database(format!("Failed to parse appointment: {}", e)))
    }
}

/// Scheduled appointments may complete or cancel; completed and
/// cancelled ones are terminal.
fn validate_transition(
    from: AppointmentStatus,
    to: AppointmentStatus,
) -> Result<(), SchedulingError> {
    match (from, to) {
        (AppointmentStatus::Scheduled, AppointmentStatus::Completed)
        | (AppointmentStatus::Scheduled, AppointmentStatus::Cancelled) => Ok(()),
        _ => Err(SchedulingError::InvalidStatusTransition(from)),
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddedName {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct JoinedAppointmentRow {
    id: Uuid,
    patient_id: Uuid,
    doctor_id: Uuid,
    appointment_datetime: chrono::DateTime<Utc>,
    status: AppointmentStatus,
    notes: Option<String>,
    patient: Option<EmbeddedName>,
    doctor: Option<EmbeddedName>,
}

impl JoinedAppointmentRow {
    fn into_summary(self) -> AppointmentSummary {
        AppointmentSummary {
            id: self.id,
            patient_id: self.patient_id,
            patient_name: self
                .patient
                .map(|p| p.full_name)
                .unwrap_or_else(|| "Unknown".to_string()),
            doctor_id: self.doctor_id,
            doctor_name: self
                .doctor
                .map(|d| d.full_name)
                .unwrap_or_else(|| "Unknown".to_string()),
            appointment_datetime: self.appointment_datetime,
            status: self.status,
            notes: self.notes,
        }
    }
}
