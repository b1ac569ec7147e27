pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{Appointment, AppointmentStatus, BookAppointmentRequest, SchedulingError};
pub use services::{AppointmentRecordsService, SchedulingService};
