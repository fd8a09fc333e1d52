pub mod appointment;
pub mod auth;
pub mod db;
pub mod error;
pub mod memory;
pub mod notification;
pub mod reaper;
pub mod schedule;
pub mod state;
pub mod user;
