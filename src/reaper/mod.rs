pub mod reaper_service;

pub use reaper_service::{start_reaper_service, ReapReport, ReaperService};
