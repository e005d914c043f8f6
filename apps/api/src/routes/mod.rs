pub mod jobs;
pub mod uploads;
