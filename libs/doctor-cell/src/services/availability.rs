use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::PostgrestClient;

use crate::models::{
    AvailabilityWindow, CreateAvailabilityRequest, DoctorError, UpdateAvailabilityRequest,
};

/// CRUD over a doctor's recurring weekly availability windows.
///
/// At most one window may exist per (doctor, day of week); a second
/// create for the same day is rejected, which keeps the scheduler's
/// first-match lookup deterministic.
pub struct AvailabilityService {
    store: Arc<PostgrestClient>,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(PostgrestClient::new(config)),
        }
    }

    pub fn with_store(store: Arc<PostgrestClient>) -> Self {
        Self { store }
    }

    pub async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityWindow>, DoctorError> {
        debug!("Fetching availability windows for doctor {}", doctor_id);

        let path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&order=day_of_week.asc,start_time.asc",
            doctor_id
        );
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| DoctorError::Database(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<AvailabilityWindow>, _>>()
            .map_err(|e| DoctorError::Database(format!("Failed to parse availability: {}", e)))
    }

    pub async fn create_window(
        &self,
        doctor_id: Uuid,
        request: CreateAvailabilityRequest,
        auth_token: &str,
    ) -> Result<AvailabilityWindow, DoctorError> {
        debug!(
            "Creating availability window for doctor {} on day {}",
            doctor_id, request.day_of_week
        );

        validate_day_of_week(request.day_of_week)?;
        validate_time_range(request.start_time, request.end_time)?;

        // One window per (doctor, day).
        let existing_path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&day_of_week=eq.{}",
            doctor_id, request.day_of_week
        );
        let existing: Vec<Value> = self
            .store
            .request(Method::GET, &existing_path, Some(auth_token), None)
            .await
            .map_err(|e| DoctorError::Database(e.to_string()))?;

        if !existing.is_empty() {
            return Err(DoctorError::WindowConflict);
        }

        let now = Utc::now();
        let window_data = json!({
            "doctor_id": doctor_id,
            "day_of_week": request.day_of_week,
            "start_time": request.start_time.format("%H:%M:%S").to_string(),
            "end_time": request.end_time.format("%H:%M:%S").to_string(),
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339(),
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .store
            .request_with_headers(
                Method::POST,
                "/rest/v1/doctor_availability",
                Some(auth_token),
                Some(window_data),
                Some(headers),
            )
            .await
            .map_err(|e| DoctorError::Database(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| DoctorError::Database("Failed to create availability".to_string()))?;

        serde_json::from_value(row)
            .map_err(|e| DoctorError::Database(format!("Failed to parse availability: {}", e)))
    }

    pub async fn update_window(
        &self,
        availability_id: Uuid,
        request: UpdateAvailabilityRequest,
        auth_token: &str,
    ) -> Result<AvailabilityWindow, DoctorError> {
        debug!("Updating availability window {}", availability_id);

        let current = self.get_window(availability_id, auth_token).await?;

        let start = request.start_time.unwrap_or(current.start_time);
        let end = request.end_time.unwrap_or(current.end_time);
        validate_time_range(start, end)?;

        let mut update_data = serde_json::Map::new();
        if let Some(start_time) = request.start_time {
            update_data.insert(
                "start_time".to_string(),
                json!(start_time.format("%H:%M:%S").to_string()),
            );
        }
        if let Some(end_time) = request.end_time {
            update_data.insert(
                "end_time".to_string(),
                json!(end_time.format("%H:%M:%S").to_string()),
            );
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/doctor_availability?id=eq.{}", availability_id);
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
                Some(Value::Object(update_data)),
                Some(headers),
            )
            .await
            .map_err(|e| DoctorError::Database(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or(DoctorError::AvailabilityNotFound)?;

        serde_json::from_value(row)
            .map_err(|e| DoctorError::Database(format!("Failed to parse availability: {}", e)))
    }

    pub async fn delete_window(
        &self,
        availability_id: Uuid,
        auth_token: &str,
    ) -> Result<(), DoctorError> {
        debug!("Deleting availability window {}", availability_id);

        let path = format!("/rest/v1/doctor_availability?id=eq.{}", availability_id);
        let _: Vec<Value> = self
            .store
            .request(Method::DELETE, &path, Some(auth_token), None)
            .await
            .map_err(|e| DoctorError::Database(e.to_string()))?;

        Ok(())
    }

    pub async fn get_window(
        &self,
        availability_id: Uuid,
        auth_token: &str,
    ) -> Result<AvailabilityWindow, DoctorError> {
        let path = format!("/rest/v1/doctor_availability?id=eq.{}", availability_id);
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| DoctorError::Database(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or(DoctorError::AvailabilityNotFound)?;

        serde_json::from_value(row)
            .map_err(|e| DoctorError::Database(format!("Failed to parse availability: {}", e)))
    }
}

fn validate_day_of_week(day_of_week: i16) -> Result<(), DoctorError> {
    if !(1..=7).contains(&day_of_week) {
        return Err(DoctorError::Validation(
            "Day of week must be between 1 (Monday) and 7 (Sunday)".to_string(),
        ));
    }
    Ok(())
}

fn validate_time_range(
    start: chrono::NaiveTime,
    end: chrono::NaiveTime,
) -> Result<(), DoctorError> {
    if start >= end {
        return Err(DoctorError::Validation(
            "Start time must be before end time".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::NaiveTime;

    #[test]
    fn day_of_week_bounds() {
        assert!(validate_day_of_week(1).is_ok());
        assert!(validate_day_of_week(7).is_ok());
        assert_matches!(validate_day_of_week(0), Err(DoctorError::Validation(_)));
        assert_matches!(validate_day_of_week(8), Err(DoctorError::Validation(_)));
    }

    #[test]
    fn time_range_must_be_forward() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let five = NaiveTime::from_hms_opt(17, 0, 0).unwrap();

        assert!(validate_time_range(nine, five).is_ok());
        assert_matches!(
            validate_time_range(five, nine),
            Err(DoctorError::Validation(_))
        );
        assert_matches!(
            validate_time_range(nine, nine),
            Err(DoctorError::Validation(_))
        );
    }
}
