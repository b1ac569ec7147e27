use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::PostgrestClient;

use crate::models::{CreateDoctorRequest, Doctor, DoctorError, UpdateDoctorRequest};

/// Thin CRUD over the doctor directory. No invariants beyond existence.
pub struct DoctorService {
    store: Arc<PostgrestClient>,
}

impl DoctorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(PostgrestClient::new(config)),
        }
    }

    pub fn with_store(store: Arc<PostgrestClient>) -> Self {
        Self { store }
    }

    pub async fn list_doctors(&self, auth_token: &str) -> Result<Vec<Doctor>, DoctorError> {
        let result: Vec<Value> = self
            .store
            .request(
                Method::GET,
                "/rest/v1/doctors?order=full_name.asc",
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| DoctorError::Database(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Doctor>, _>>()
            .map_err(|e| DoctorError::Database(format!("Failed to parse doctors: {}", e)))
    }

    pub async fn get_doctor(&self, doctor_id: Uuid, auth_token: &str) -> Result<Doctor, DoctorError> {
        debug!("Fetching doctor: {}", doctor_id);

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| DoctorError::Database(e.to_string()))?;

        let row = result.into_iter().next().ok_or(DoctorError::NotFound)?;

        serde_json::from_value(row)
            .map_err(|e| DoctorError::Database(format!("Failed to parse doctor: {}", e)))
    }

    pub async fn create_doctor(
        &self,
        request: CreateDoctorRequest,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        debug!("Creating doctor record for {}", request.email);

        if request.full_name.trim().is_empty() {
            return Err(DoctorError::Validation("Name must not be empty".to_string()));
        }
        if request.license_number.trim().is_empty() {
            return Err(DoctorError::Validation(
                "License number must not be empty".to_string(),
            ));
        }

        let now = chrono::Utc::now();
        let doctor_data = json!({
            "full_name": request.full_name,
            "email": request.email,
            "specialty": request.specialty,
            "license_number": request.license_number,
            "clinic": request.clinic,
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
                "/rest/v1/doctors",
                Some(auth_token),
                Some(doctor_data),
                Some(headers),
            )
            .await
            .map_err(|e| DoctorError::Database(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| DoctorError::Database("Failed to create doctor".to_string()))?;

        serde_json::from_value(row)
            .map_err(|e| DoctorError::Database(format!("Failed to parse created doctor: {}", e)))
    }

    pub async fn update_doctor(
        &self,
        doctor_id: Uuid,
        request: UpdateDoctorRequest,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        debug!("Updating doctor: {}", doctor_id);

        let mut update_data = serde_json::Map::new();
        if let Some(full_name) = request.full_name {
            update_data.insert("full_name".to_string(), json!(full_name));
        }
        if let Some(email) = request.email {
            update_data.insert("email".to_string(), json!(email));
        }
        if let Some(specialty) = request.specialty {
            update_data.insert("specialty".to_string(), json!(specialty));
        }
        if let Some(license_number) = request.license_number {
            update_data.insert("license_number".to_string(), json!(license_number));
        }
        if let Some(clinic) = request.clinic {
            update_data.insert("clinic".to_string(), json!(clinic));
        }
        update_data.insert(
            "updated_at".to_string(),
            json!(chrono::Utc::now().to_rfc3339()),
        );

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
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

        let row = result.into_iter().next().ok_or(DoctorError::NotFound)?;

        serde_json::from_value(row)
            .map_err(|e| DoctorError::Database(format!("Failed to parse updated doctor: {}", e)))
    }

    pub async fn delete_doctor(&self, doctor_id: Uuid, auth_token: &str) -> Result<(), DoctorError> {
        debug!("Deleting doctor: {}", doctor_id);

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let _: Vec<Value> = self
            .store
            .request(Method::DELETE, &path, Some(auth_token), None)
            .await
            .map_err(|e| DoctorError::Database(e.to_string()))?;

        Ok(())
    }
}
