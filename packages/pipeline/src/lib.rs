pub mod config;
pub mod error;
pub mod job;
pub mod routes;
pub mod scheduler;

pub use config::SchedulerConfig;
pub use error::{PipelineError, Result};
pub use job::{HarvestJob, ScheduledHarvest};
pub use routes::router;
pub use scheduler::{
    Clock, RunRecord, RunTrigger, Scheduler, SchedulerStats, SchedulerStatus, SystemClock,
};
