//! Monitoring loop: schedules runs per workspace, keeps rolling run
//! statistics and raises alerts through the notifier.

mod observer;
mod runner;
mod window;

pub use observer::RunObserver;
pub use runner::{MonitorStatus, MonitoringLoop};
pub use window::{RollingWindow, RunSample, WindowSummary};
