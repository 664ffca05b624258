//! Job state for KB-Harvest
//!
//! - `JobStatus`: lifecycle of a crawl job (scheduled, running, completed, stopped, error)
//! - `CrawlJob`: the persisted job record, mutated before and after each run
//! - `parse_interval`: Go-style duration strings used for crawl scheduling

mod interval;
mod job;
mod job_status;

pub use interval::parse_interval;
pub use job::{CrawlJob, MAX_JOB_ERRORS};
pub use job_status::JobStatus;
