use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a headless session as reported by the job platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteJobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Terminated,
}

impl RemoteJobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RemoteJobStatus::Succeeded | RemoteJobStatus::Failed | RemoteJobStatus::Terminated)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RemoteJobStatus::Succeeded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteJobStatus::Pending => "Pending",
            RemoteJobStatus::Running => "Running",
            RemoteJobStatus::Succeeded => "Succeeded",
            RemoteJobStatus::Failed => "Failed",
            RemoteJobStatus::Terminated => "Terminated",
        }
    }
}

impl fmt::Display for RemoteJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RemoteJobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" | "queued" | "scheduled" => Ok(RemoteJobStatus::Pending),
            "running" => Ok(RemoteJobStatus::Running),
            "succeeded" | "completed" => Ok(RemoteJobStatus::Succeeded),
            "failed" | "error" => Ok(RemoteJobStatus::Failed),
            "terminated" | "terminating" => Ok(RemoteJobStatus::Terminated),
            _ => Err(format!("Invalid remote job status: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_status_strings() {
        assert_eq!("Succeeded".parse::<RemoteJobStatus>().unwrap(), RemoteJobStatus::Succeeded);
        assert_eq!("Completed".parse::<RemoteJobStatus>().unwrap(), RemoteJobStatus::Succeeded);
        assert_eq!("Terminated".parse::<RemoteJobStatus>().unwrap(), RemoteJobStatus::Terminated);
        assert!("".parse::<RemoteJobStatus>().is_err());
        assert!(!RemoteJobStatus::Running.is_terminal());
        assert!(RemoteJobStatus::Failed.is_terminal());
    }
}
