use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use doctor_cell::models::AvailabilityWindow;
use shared_config::AppConfig;
use shared_database::{PostgrestClient, StoreError};

use crate::models::{
    Appointment, AppointmentStatus, BookAppointmentRequest, SchedulingError, SLOT_MINUTES,
};

/// Weekly schedules store days as 1 = Monday … 7 = Sunday. Every
/// availability lookup goes through this single mapping.
pub fn schedule_day_of_week(date: NaiveDate) -> i16 {
    date.weekday().number_from_monday() as i16
}

/// Start is inclusive, end is exclusive.
fn window_admits(window: &AvailabilityWindow, time: NaiveTime) -> bool {
    time >= window.start_time && time < window.end_time
}

/// Partition `[start, end)` on `date` into slot start times anchored at
/// `start`. A trailing remainder shorter than a full slot is dropped;
/// an inverted range yields nothing.
fn partition_slots(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> Vec<DateTime<Utc>> {
    let window_minutes = (end - start).num_minutes();
    let slot_count = window_minutes / SLOT_MINUTES;
    if slot_count <= 0 {
        return Vec::new();
    }

    let anchor = date.and_time(start).and_utc();
    (0..slot_count)
        .map(|i| anchor + Duration::minutes(i * SLOT_MINUTES))
        .collect()
}

/// The scheduling core: decides bookability from a doctor's recurring
/// weekly availability and the set of non-cancelled appointments, and
/// commits new bookings. Stateless; every call reads fresh from the
/// store.
pub struct SchedulingService {
    store: Arc<PostgrestClient>,
}

impl SchedulingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(PostgrestClient::new(config)),
        }
    }

    pub fn with_store(store: Arc<PostgrestClient>) -> Self {
        Self { store }
    }

    /// Whether `when` is inside the doctor's availability window for
    /// that weekday and not already taken by a non-cancelled
    /// appointment. A doctor with no window that day is simply not
    /// available; no error is raised.
    pub async fn is_slot_available(
        &self,
        doctor_id: Uuid,
        when: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<bool, SchedulingError> {
        let when = canonical_instant(when);
        let day_of_week = schedule_day_of_week(when.date_naive());

        let window = match self.find_window(doctor_id, day_of_week, auth_token).await? {
            Some(window) => window,
            None => {
                debug!("Doctor {} has no availability on day {}", doctor_id, day_of_week);
                return Ok(false);
            }
        };

        if !window_admits(&window, when.time()) {
            return Ok(false);
        }

        let conflict = self.find_conflict(doctor_id, when, auth_token).await?;
        Ok(conflict.is_none())
    }

    /// Book a Scheduled appointment at `appointment_datetime`, or
    /// reject with `SlotUnavailable`. The store enforces uniqueness on
    /// (doctor, instant) over non-cancelled rows, so a conflicting
    /// insert that slipped past the read-side check is also reported as
    /// an unavailable slot rather than a fault.
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let when = canonical_instant(request.appointment_datetime);

        info!(
            "Booking appointment for patient {} with doctor {} at {}",
            request.patient_id, request.doctor_id, when
        );

        if !self
            .is_slot_available(request.doctor_id, when, auth_token)
            .await?
        {
            return Err(SchedulingError::SlotUnavailable);
        }

        let now = Utc::now();
        let appointment_data = json!({
            "patient_id": request.patient_id,
            "doctor_id": request.doctor_id,
            "appointment_datetime": when.to_rfc3339(),
            "status": AppointmentStatus::Scheduled.to_string(),
            "notes": request.notes,
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
                "/rest/v1/appointments",
                Some(auth_token),
                Some(appointment_data),
                Some(headers),
            )
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => {
                    warn!(
                        "Concurrent booking lost the race for doctor {} at {}",
                        request.doctor_id, when
                    );
                    SchedulingError::SlotUnavailable
                }
                other => SchedulingError::Database(other.to_string()),
            })?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| SchedulingError::Database("Failed to create appointment".to_string()))?;

        let appointment: Appointment = serde_json::from_value(row).map_err(|e| {
            SchedulingError::Database(format!("Failed to parse created appointment: {}", e))
        })?;

        info!("Appointment {} booked", appointment.id);
        Ok(appointment)
    }

    /// All open slot start times for the doctor on `date`, ascending.
    /// The result is a snapshot: a plain list that stays valid to
    /// re-read but reflects bookings only as of this call.
    pub async fn available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<DateTime<Utc>>, SchedulingError> {
        let day_of_week = schedule_day_of_week(date);

        let window = match self.find_window(doctor_id, day_of_week, auth_token).await? {
            Some(window) => window,
            None => {
                debug!("Doctor {} has no availability on {}", doctor_id, date);
                return Ok(Vec::new());
            }
        };

        let booked: HashSet<DateTime<Utc>> = self
            .appointments_on(doctor_id, date, auth_token)
            .await?
            .into_iter()
            .map(|appointment| appointment.appointment_datetime)
            .collect();

        let slots: Vec<DateTime<Utc>> =
            partition_slots(date, window.start_time, window.end_time)
                .into_iter()
                .filter(|slot| !booked.contains(slot))
                .collect();

        debug!(
            "Doctor {} has {} open slots on {}",
            doctor_id,
            slots.len(),
            date
        );
        Ok(slots)
    }

    /// First availability window for (doctor, weekday). Ordering makes
    /// the first-match policy deterministic should duplicate rows ever
    /// exist.
    async fn find_window(
        &self,
        doctor_id: Uuid,
        day_of_week: i16,
        auth_token: &str,
    ) -> Result<Option<AvailabilityWindow>, SchedulingError> {
        let path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&day_of_week=eq.{}&order=start_time.asc&limit=1",
            doctor_id, day_of_week
        );

        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| SchedulingError::Database(e.to_string()))?;

        result
            .into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| SchedulingError::Database(format!("Failed to parse availability: {}", e)))
    }

    /// Non-cancelled appointment at exactly (doctor, instant), if any.
    async fn find_conflict(
        &self,
        doctor_id: Uuid,
        when: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Option<Appointment>, SchedulingError> {
        let timestamp = urlencoding::encode(&when.to_rfc3339()).into_owned();
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&appointment_datetime=eq.{}&status=neq.cancelled&limit=1",
            doctor_id, timestamp
        );

        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| SchedulingError::Database(e.to_string()))?;

        result
            .into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| SchedulingError::Database(format!("Failed to parse appointment: {}", e)))
    }

    /// Non-cancelled appointments for the doctor over the whole of
    /// `date`.
    async fn appointments_on(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let day_start = date.and_time(NaiveTime::MIN).and_utc();
        let day_end = day_start + Duration::days(1);

        let from = urlencoding::encode(&day_start.to_rfc3339()).into_owned();
        let to = urlencoding::encode(&day_end.to_rfc3339()).into_owned();
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&appointment_datetime=gte.{}&appointment_datetime=lt.{}&status=neq.cancelled&order=appointment_datetime.asc",
            doctor_id, from, to
        );

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
}

/// Bookings live on whole seconds; sub-second noise would defeat the
/// exact-equality conflict rule.
fn canonical_instant(when: DateTime<Utc>) -> DateTime<Utc> {
    when.with_nanosecond(0).unwrap_or(when)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn window(day_of_week: i16, start: NaiveTime, end: NaiveTime) -> AvailabilityWindow {
        AvailabilityWindow {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            day_of_week,
            start_time: start,
            end_time: end,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn weekday_mapping_is_monday_based() {
        // 2025-06-02 is a Monday, 2025-06-08 a Sunday.
        assert_eq!(schedule_day_of_week(NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()), 1);
        assert_eq!(schedule_day_of_week(NaiveDate::from_ymd_opt(2025, 6, 4).unwrap()), 3);
        assert_eq!(schedule_day_of_week(NaiveDate::from_ymd_opt(2025, 6, 7).unwrap()), 6);
        assert_eq!(schedule_day_of_week(NaiveDate::from_ymd_opt(2025, 6, 8).unwrap()), 7);
    }

    #[test]
    fn window_start_is_inclusive_end_exclusive() {
        let w = window(1, t(9, 0), t(17, 0));

        assert!(window_admits(&w, t(9, 0)));
        assert!(window_admits(&w, t(16, 59)));
        assert!(!window_admits(&w, t(8, 59)));
        assert!(!window_admits(&w, t(17, 0)));
    }

    #[test]
    fn full_day_window_partitions_into_sixteen_slots() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let slots = partition_slots(date, t(9, 0), t(17, 0));

        assert_eq!(slots.len(), 16);
        assert_eq!(slots[0], date.and_time(t(9, 0)).and_utc());
        assert_eq!(slots[15], date.and_time(t(16, 30)).and_utc());
        assert!(slots.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn trailing_partial_slot_is_dropped() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();

        assert_eq!(partition_slots(date, t(9, 0), t(10, 15)).len(), 2);
        assert_eq!(partition_slots(date, t(9, 0), t(9, 29)).len(), 0);
        assert_eq!(partition_slots(date, t(9, 0), t(9, 30)).len(), 1);
    }

    #[test]
    fn inverted_window_yields_no_slots() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        assert!(partition_slots(date, t(17, 0), t(9, 0)).is_empty());
    }

    #[test]
    fn canonical_instant_strips_subseconds() {
        let noisy = Utc::now();
        let clean = canonical_instant(noisy);
        assert_eq!(clean.nanosecond(), 0);
    }
}
