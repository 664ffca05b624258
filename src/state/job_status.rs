use std::fmt;

/// Lifecycle status of a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    /// Created or rescheduled, waiting for its next run
    Scheduled,

    /// A run is in flight; further run requests for this job are skipped
    Running,

    /// The last run dispatched every page (individual pages may still have failed)
    Completed,

    /// The last run was cancelled or hit its run timeout
    Stopped,

    /// The last run hit a fatal failure before or while dispatching
    Error,
}

impl JobStatus {
    /// Returns true if a run is currently active for the job
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Converts the status to its database representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }

    /// Parses a status from its database representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(Self::Scheduled),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "stopped" => Some(Self::Stopped),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Every status, in lifecycle order
    pub fn all() -> [Self; 5] {
        [
            Self::Scheduled,
            Self::Running,
            Self::Completed,
            Self::Stopped,
            Self::Error,
        ]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Scheduled => "Scheduled",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Stopped => "Stopped",
            Self::Error => "Error",
        };
        write!(f, "{}", label)
    }
}
