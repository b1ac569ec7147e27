// Availability window CRUD rules against a mocked PostgREST store.

use assert_matches::assert_matches;
use chrono::{NaiveTime, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doctor_cell::models::{CreateAvailabilityRequest, DoctorError, UpdateAvailabilityRequest};
use doctor_cell::services::AvailabilityService;
use shared_utils::test_utils::test_config;

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn window_row(doctor_id: Uuid, day_of_week: i16) -> serde_json::Value {
    json!({
        "id": Uuid::new_v4(),
        "doctor_id": doctor_id,
        "day_of_week": day_of_week,
        "start_time": "09:00:00",
        "end_time": "17:00:00",
        "created_at": Utc::now().to_rfc3339(),
        "updated_at": Utc::now().to_rfc3339(),
    })
}

fn service_for(server: &MockServer) -> AvailabilityService {
    AvailabilityService::new(&test_config(&server.uri()))
}

#[tokio::test]
async fn rejects_day_of_week_outside_monday_to_sunday() {
    let server = MockServer::start().await;
    let service = service_for(&server);

    for bad_day in [0, 8, -1] {
        let result = service
            .create_window(
                Uuid::new_v4(),
                CreateAvailabilityRequest {
                    day_of_week: bad_day,
                    start_time: t(9, 0),
                    end_time: t(17, 0),
                },
                "token",
            )
            .await;

        assert_matches!(result, Err(DoctorError::Validation(_)));
    }
}

#[tokio::test]
async fn rejects_inverted_or_empty_time_range() {
    let server = MockServer::start().await;
    let service = service_for(&server);

    let inverted = service
        .create_window(
            Uuid::new_v4(),
            CreateAvailabilityRequest {
                day_of_week: 1,
                start_time: t(17, 0),
                end_time: t(9, 0),
            },
            "token",
        )
        .await;
    assert_matches!(inverted, Err(DoctorError::Validation(_)));

    let empty = service
        .create_window(
            Uuid::new_v4(),
            CreateAvailabilityRequest {
                day_of_week: 1,
                start_time: t(9, 0),
                end_time: t(9, 0),
            },
            "token",
        )
        .await;
    assert_matches!(empty, Err(DoctorError::Validation(_)));
}

#[tokio::test]
async fn rejects_second_window_for_same_day() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("day_of_week", "eq.3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            window_row(doctor_id, 3)
        ])))
        .mount(&server)
        .await;

    let service = service_for(&server);
    let result = service
        .create_window(
            doctor_id,
            CreateAvailabilityRequest {
                day_of_week: 3,
                start_time: t(8, 0),
                end_time: t(12, 0),
            },
            "token",
        )
        .await;

    assert_matches!(result, Err(DoctorError::WindowConflict));
}

#[tokio::test]
async fn creates_window_on_a_free_day() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            window_row(doctor_id, 5)
        ])))
        .mount(&server)
        .await;

    let service = service_for(&server);
    let window = service
        .create_window(
            doctor_id,
            CreateAvailabilityRequest {
                day_of_week: 5,
                start_time: t(9, 0),
                end_time: t(17, 0),
            },
            "token",
        )
        .await
        .unwrap();

    assert_eq!(window.doctor_id, doctor_id);
    assert_eq!(window.day_of_week, 5);
}

#[tokio::test]
async fn update_validates_merged_time_range() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let window = window_row(doctor_id, 2);
    let window_id: Uuid = serde_json::from_value(window["id"].clone()).unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .and(query_param("id", format!("eq.{}", window_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([window])))
        .mount(&server)
        .await;

    let service = service_for(&server);

    // Window is 09:00-17:00; moving the start past the unchanged end
    // must fail before any write happens.
    let result = service
        .update_window(
            window_id,
            UpdateAvailabilityRequest {
                start_time: Some(t(18, 0)),
                end_time: None,
            },
            "token",
        )
        .await;

    assert_matches!(result, Err(DoctorError::Validation(_)));
}
