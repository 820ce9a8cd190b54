use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::parse_server_date;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub jobs_index: i64,
    pub title: String,
    pub level: Option<String>,
    pub location: Option<String>,
    pub qualification: Option<String>,
    pub responsibilities: Option<String>,
    pub preferences: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl Job {
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.end_date.as_deref().and_then(parse_server_date)
    }

    /// `None` when the deadline is missing or unreadable; such postings are
    /// neither recruiting nor closed.
    pub fn is_recruiting(&self, now: DateTime<Utc>) -> Option<bool> {
        self.deadline().map(|end| end > now)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JobFilter {
    #[default]
    All,
    Recruiting,
    Closed,
}

impl JobFilter {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "all" => Some(JobFilter::All),
            "recruiting" | "open" => Some(JobFilter::Recruiting),
            "closed" => Some(JobFilter::Closed),
            _ => None,
        }
    }

    pub fn apply(&self, jobs: Vec<Job>, now: DateTime<Utc>) -> Vec<Job> {
        match self {
            JobFilter::All => jobs,
            JobFilter::Recruiting => jobs
                .into_iter()
                .filter(|j| j.is_recruiting(now) == Some(true))
                .collect(),
            JobFilter::Closed => jobs
                .into_iter()
                .filter(|j| j.is_recruiting(now) == Some(false))
                .collect(),
        }
    }
}

impl std::fmt::Display for JobFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobFilter::All => write!(f, "All"),
            JobFilter::Recruiting => write!(f, "Recruiting"),
            JobFilter::Closed => write!(f, "Closed"),
        }
    }
}
