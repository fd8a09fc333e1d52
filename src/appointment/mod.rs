pub mod appointment_dto;
pub mod appointment_models;
pub mod appointment_repository;
pub mod appointment_service;
pub mod appointment_snapshot;

pub use appointment_dto::{require_remarks, AppointmentSummary, CreateAppointmentRequest, HomeSummary};
pub use appointment_models::{
    slot_key, Actor, Appointment, AppointmentStatus, AppointmentType, ParseEnumError, LATE_RESPONSE_REMARK,
};
pub use appointment_repository::{AppointmentRepository, PgAppointmentRepository};
pub use appointment_service::AppointmentService;
pub use appointment_snapshot::{apply_appointment_snapshot, DerivedLists};
