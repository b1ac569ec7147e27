// Scheduling core behavior against a mocked PostgREST store.

use assert_matches::assert_matches;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{BookAppointmentRequest, SchedulingError};
use appointment_cell::services::SchedulingService;
use shared_utils::test_utils::test_config;

// 2025-06-02 is a Monday.
const MONDAY: &str = "2025-06-02";

fn monday() -> NaiveDate {
    MONDAY.parse().unwrap()
}

fn monday_at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, hour, minute, 0).unwrap()
}

fn availability_row(doctor_id: Uuid, day_of_week: i16, start: &str, end: &str) -> serde_json::Value {
    json!({
        "id": Uuid::new_v4(),
        "doctor_id": doctor_id,
        "day_of_week": day_of_week,
        "start_time": start,
        "end_time": end,
        "created_at": Utc::now().to_rfc3339(),
        "updated_at": Utc::now().to_rfc3339(),
    })
}

fn appointment_row(doctor_id: Uuid, when: DateTime<Utc>, status: &str) -> serde_json::Value {
    json!({
        "id": Uuid::new_v4(),
        "patient_id": Uuid::new_v4(),
        "doctor_id": doctor_id,
        "appointment_datetime": when.to_rfc3339(),
        "status": status,
        "notes": null,
        "created_at": Utc::now().to_rfc3339(),
        "updated_at": Utc::now().to_rfc3339(),
    })
}

async fn mount_weekday_window(server: &MockServer, doctor_id: Uuid, day_of_week: i16) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("day_of_week", format!("eq.{}", day_of_week)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            availability_row(doctor_id, day_of_week, "09:00:00", "17:00:00")
        ])))
        .mount(server)
        .await;
}

async fn mount_no_windows(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

async fn mount_no_appointments(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

fn service_for(server: &MockServer) -> SchedulingService {
    SchedulingService::new(&test_config(&server.uri()))
}

#[tokio::test]
async fn doctor_without_schedule_is_never_available() {
    let server = MockServer::start().await;
    mount_no_windows(&server).await;
    mount_no_appointments(&server).await;

    let service = service_for(&server);
    let doctor_id = Uuid::new_v4();

    let available = service
        .is_slot_available(doctor_id, monday_at(10, 0), "token")
        .await
        .unwrap();
    assert!(!available);

    let slots = service
        .available_slots(doctor_id, monday(), "token")
        .await
        .unwrap();
    assert!(slots.is_empty());
}

#[tokio::test]
async fn window_start_is_bookable_and_edges_are_not() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    mount_weekday_window(&server, doctor_id, 1).await;
    mount_no_appointments(&server).await;

    let service = service_for(&server);

    assert!(service
        .is_slot_available(doctor_id, monday_at(9, 0), "token")
        .await
        .unwrap());
    assert!(!service
        .is_slot_available(doctor_id, monday_at(8, 59), "token")
        .await
        .unwrap());
    // End of window is exclusive.
    assert!(!service
        .is_slot_available(doctor_id, monday_at(17, 0), "token")
        .await
        .unwrap());
}

#[tokio::test]
async fn open_day_yields_sixteen_ascending_slots() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    mount_weekday_window(&server, doctor_id, 1).await;
    mount_no_appointments(&server).await;

    let service = service_for(&server);
    let slots = service
        .available_slots(doctor_id, monday(), "token")
        .await
        .unwrap();

    assert_eq!(slots.len(), 16);
    assert_eq!(slots[0], monday_at(9, 0));
    assert_eq!(slots[1], monday_at(9, 30));
    assert_eq!(slots[15], monday_at(16, 30));
    assert!(slots.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test]
async fn scheduled_appointment_blocks_its_slot() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    mount_weekday_window(&server, doctor_id, 1).await;

    // The store only ever returns non-cancelled rows thanks to the
    // status=neq.cancelled filter the service sends.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "neq.cancelled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(doctor_id, monday_at(10, 0), "scheduled")
        ])))
        .mount(&server)
        .await;

    let service = service_for(&server);

    let slots = service
        .available_slots(doctor_id, monday(), "token")
        .await
        .unwrap();
    assert_eq!(slots.len(), 15);
    assert!(!slots.contains(&monday_at(10, 0)));
    assert!(slots.contains(&monday_at(9, 30)));
    assert!(slots.contains(&monday_at(10, 30)));

    let available = service
        .is_slot_available(doctor_id, monday_at(10, 0), "token")
        .await
        .unwrap();
    assert!(!available);
}

#[tokio::test]
async fn cancelled_appointment_frees_its_slot() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    mount_weekday_window(&server, doctor_id, 1).await;

    // A slot blocked only by a cancelled row: the filtered query comes
    // back empty.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "neq.cancelled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let service = service_for(&server);

    let available = service
        .is_slot_available(doctor_id, monday_at(10, 0), "token")
        .await
        .unwrap();
    assert!(available);

    let slots = service
        .available_slots(doctor_id, monday(), "token")
        .await
        .unwrap();
    assert_eq!(slots.len(), 16);
    assert!(slots.contains(&monday_at(10, 0)));
}

#[tokio::test]
async fn booking_commits_then_blocks_the_slot() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let when = monday_at(9, 30);

    mount_weekday_window(&server, doctor_id, 1).await;

    // Empty before the booking commits, occupied afterwards.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("appointment_datetime", format!("eq.{}", when.to_rfc3339())))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("appointment_datetime", format!("eq.{}", when.to_rfc3339())))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(doctor_id, when, "scheduled")
        ])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            appointment_row(doctor_id, when, "scheduled")
        ])))
        .mount(&server)
        .await;

    let service = service_for(&server);

    let booked = service
        .book_appointment(
            BookAppointmentRequest {
                patient_id,
                doctor_id,
                appointment_datetime: when,
                notes: Some("first visit".to_string()),
            },
            "token",
        )
        .await
        .unwrap();
    assert_eq!(booked.doctor_id, doctor_id);
    assert_eq!(booked.appointment_datetime, when);

    // The identical instant now reads as taken.
    let available = service
        .is_slot_available(doctor_id, when, "token")
        .await
        .unwrap();
    assert!(!available);

    // And a second booking for it is rejected.
    let second = service
        .book_appointment(
            BookAppointmentRequest {
                patient_id: Uuid::new_v4(),
                doctor_id,
                appointment_datetime: when,
                notes: None,
            },
            "token",
        )
        .await;
    assert_matches!(second, Err(SchedulingError::SlotUnavailable));
}

#[tokio::test]
async fn concurrent_bookings_cannot_both_commit() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let when = monday_at(11, 0);

    mount_weekday_window(&server, doctor_id, 1).await;
    // Both callers pass the read-side check.
    mount_no_appointments(&server).await;

    // The store's uniqueness constraint lets exactly one insert through.
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            appointment_row(doctor_id, when, "scheduled")
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint \"appointments_doctor_slot_key\""
        })))
        .mount(&server)
        .await;

    let service = service_for(&server);

    let request = |patient_id: Uuid| BookAppointmentRequest {
        patient_id,
        doctor_id,
        appointment_datetime: when,
        notes: None,
    };

    let (first, second) = tokio::join!(
        service.book_appointment(request(Uuid::new_v4()), "token"),
        service.book_appointment(request(Uuid::new_v4()), "token"),
    );

    let outcomes = [first, second];
    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1, "exactly one concurrent booking may commit");
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(SchedulingError::SlotUnavailable))));
}

#[tokio::test]
async fn booking_outside_any_window_is_rejected() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    mount_no_windows(&server).await;
    mount_no_appointments(&server).await;

    let service = service_for(&server);

    let result = service
        .book_appointment(
            BookAppointmentRequest {
                patient_id: Uuid::new_v4(),
                doctor_id,
                appointment_datetime: monday_at(10, 0),
                notes: None,
            },
            "token",
        )
        .await;

    assert_matches!(result, Err(SchedulingError::SlotUnavailable));
}

#[tokio::test]
async fn booking_inside_window_but_off_day_checks_that_weekday() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    // Window exists on Monday only; Tuesday has none.
    mount_weekday_window(&server, doctor_id, 1).await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .and(query_param("day_of_week", "eq.2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    mount_no_appointments(&server).await;

    let service = service_for(&server);
    let tuesday_ten = Utc.with_ymd_and_hms(2025, 6, 3, 10, 0, 0).unwrap();

    let available = service
        .is_slot_available(doctor_id, tuesday_ten, "token")
        .await
        .unwrap();
    assert!(!available);
}
