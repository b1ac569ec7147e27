pub mod records;
pub mod scheduling;

pub use records::AppointmentRecordsService;
pub use scheduling::SchedulingService;
