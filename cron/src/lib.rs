pub mod jobs;
pub mod scheduler;

pub use jobs::{
    AutoDropSweepResult, BidWindowSweepResult, CronJobs, HealthSweepResult, ReminderSweepResult,
};
