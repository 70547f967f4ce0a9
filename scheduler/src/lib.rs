pub mod candidate;
pub mod generator;

pub use generator::{GenerationResult, ScheduleGenerator};
