use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::PostgrestClient;

use crate::models::{Patient, PatientError, UpdatePatientRequest};

pub struct PatientService {
    store: Arc<PostgrestClient>,
}

impl PatientService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(PostgrestClient::new(config)),
        }
    }

    pub fn with_store(store: Arc<PostgrestClient>) -> Self {
        Self { store }
    }

    pub async fn list_patients(&self, auth_token: &str) -> Result<Vec<Patient>, PatientError> {
        let result: Vec<Value> = self
            .store
            .request(
                Method::GET,
                "/rest/v1/patients?order=full_name.asc",
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| PatientError::Database(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Patient>, _>>()
            .map_err(|e| PatientError::Database(format!("Failed to parse patients: {}", e)))
    }

    pub async fn get_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        debug!("Fetching patient: {}", patient_id);

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PatientError::Database(e.to_string()))?;

        let row = result.into_iter().next().ok_or(PatientError::NotFound)?;

        serde_json::from_value(row)
            .map_err(|e| PatientError::Database(format!("Failed to parse patient: {}", e)))
    }

    pub async fn update_patient(
        &self,
        patient_id: Uuid,
        request: UpdatePatientRequest,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        debug!("Updating patient: {}", patient_id);

        let mut update_data = serde_json::Map::new();
        if let Some(full_name) = request.full_name {
            update_data.insert("full_name".to_string(), json!(full_name));
        }
        if let Some(phone) = request.phone {
            update_data.insert("phone".to_string(), json!(phone));
        }
        if let Some(address) = request.address {
            update_data.insert("address".to_string(), json!(address));
        }
        if let Some(medical_history) = request.medical_history {
            update_data.insert("medical_history".to_string(), json!(medical_history));
        }
        if let Some(insurance_details) = request.insurance_details {
            update_data.insert("insurance_details".to_string(), json!(insurance_details));
        }
        if let Some(emergency_contact) = request.emergency_contact {
            update_data.insert("emergency_contact".to_string(), json!(emergency_contact));
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
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
            .map_err(|e| PatientError::Database(e.to_string()))?;

        let row = result.into_iter().next().ok_or(PatientError::NotFound)?;

        serde_json::from_value(row)
            .map_err(|e| PatientError::Database(format!("Failed to parse patient: {}", e)))
    }

    pub async fn delete_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<(), PatientError> {
        debug!("Deleting patient: {}", patient_id);

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let _: Vec<Value> = self
            .store
            .request(Method::DELETE, &path, Some(auth_token), None)
            .await
            .map_err(|e| PatientError::Database(e.to_string()))?;

        Ok(())
    }
}
