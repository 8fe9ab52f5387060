pub mod scheduler;

pub use scheduler::{AccrualScheduler, SchedulerHandle, SweepReport};
