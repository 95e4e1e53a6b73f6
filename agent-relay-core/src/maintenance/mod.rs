//! Host-scheduled periodic maintenance

pub mod service;

pub use service::{MaintenanceCallback, MaintenanceService, Sweepable};
