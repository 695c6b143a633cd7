//! Core domain model and fetch lifecycle types for the job board client.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "jobboard-core";

/// Currency shown when a listing carries both salary bounds but no currency code.
pub const DEFAULT_CURRENCY: &str = "USD";

/// One listing as returned by `GET /jobs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    pub company_name: String,
    #[serde(default)]
    pub company_logo: Option<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub salary_min: Option<f64>,
    #[serde(default)]
    pub salary_max: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
}

const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse a timestamp string: RFC 3339, or a zone-less SQL-style timestamp taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognized timestamp `{raw}`")))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalaryRange {
    pub min: f64,
    pub max: f64,
    pub currency: String,
}

impl SalaryRange {
    pub fn display(&self) -> String {
        format!(
            "{} {} - {}",
            self.currency,
            format_amount(self.min),
            format_amount(self.max)
        )
    }
}

impl JobSummary {
    /// The salary range is only meaningful when both bounds are present.
    pub fn salary_range(&self) -> Option<SalaryRange> {
        match (self.salary_min, self.salary_max) {
            (Some(min), Some(max)) => Some(SalaryRange {
                min,
                max,
                currency: self
                    .currency
                    .clone()
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            }),
            _ => None,
        }
    }

    pub fn posted_on(&self) -> String {
        self.created_at.format("%b %-d, %Y").to_string()
    }
}

/// Public landing page counters from `GET /auth/stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatsSnapshot {
    pub active_jobs: u64,
    pub job_seekers: u64,
    pub companies: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyActivity {
    pub date: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyActivity {
    pub month: String,
    pub count: u64,
}

/// Admin dashboard payload from `GET /admin/analytics`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    pub total_users: u64,
    pub total_employers: u64,
    pub total_jobs: u64,
    pub total_applications: u64,
    pub pending_approvals: u64,
    pub daily_activity: Vec<DailyActivity>,
    pub monthly_activity: Vec<MonthlyActivity>,
}

impl AnalyticsSnapshot {
    /// Headline totals in dashboard card order: users, employers, jobs, applications.
    pub fn totals(&self) -> [u64; 4] {
        [
            self.total_users,
            self.total_employers,
            self.total_jobs,
            self.total_applications,
        ]
    }

    pub fn daily_series(&self) -> (Vec<String>, Vec<u64>) {
        self.daily_activity
            .iter()
            .map(|p| (p.date.clone(), p.count))
            .unzip()
    }

    pub fn monthly_series(&self) -> (Vec<String>, Vec<u64>) {
        self.monthly_activity
            .iter()
            .map(|p| (p.month.clone(), p.count))
            .unzip()
    }
}

const FALLBACK_DAILY: [(&str, u64); 7] = [
    ("Mon", 120),
    ("Tue", 145),
    ("Wed", 132),
    ("Thu", 168),
    ("Fri", 154),
    ("Sat", 98),
    ("Sun", 87),
];

const FALLBACK_MONTHLY: [(&str, u64); 6] = [
    ("Jan", 2340),
    ("Feb", 2780),
    ("Mar", 3120),
    ("Apr", 2950),
    ("May", 3480),
    ("Jun", 3890),
];

/// Fixed snapshot the dashboard shows when the analytics request fails.
pub fn fallback_analytics() -> AnalyticsSnapshot {
    AnalyticsSnapshot {
        total_users: 45_623,
        total_employers: 2_456,
        total_jobs: 8_934,
        total_applications: 12_456,
        pending_approvals: 23,
        daily_activity: FALLBACK_DAILY
            .iter()
            .map(|(date, count)| DailyActivity {
                date: (*date).to_string(),
                count: *count,
            })
            .collect(),
        monthly_activity: FALLBACK_MONTHLY
            .iter()
            .map(|(month, count)| MonthlyActivity {
                month: (*month).to_string(),
                count: *count,
            })
            .collect(),
    }
}

/// Why a fetch ended in the `error` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    Status,
    Shape,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedFetch<T> {
    pub kind: FailureKind,
    pub message: String,
    /// Value the renderer shows in place of the missing payload.
    pub fallback: T,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("a fetch is already in flight")]
    AlreadyLoading,
    #[error("cannot settle a fetch from state `{0}`")]
    NotLoading(&'static str),
    #[error("`{0}` is not a settled state")]
    NotSettled(&'static str),
}

/// Lifecycle of one screen request: idle -> loading -> success | error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "payload", rename_all = "snake_case")]
pub enum FetchState<T> {
    Idle,
    Loading,
    Success(T),
    Error(FailedFetch<T>),
}

impl<T> Default for FetchState<T> {
    fn default() -> Self {
        Self::Idle
    }
}

impl<T> FetchState<T> {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Success(_) => "success",
            Self::Error(_) => "error",
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Error(_))
    }

    pub fn begin(&mut self) -> Result<(), TransitionError> {
        if self.is_loading() {
            return Err(TransitionError::AlreadyLoading);
        }
        *self = Self::Loading;
        Ok(())
    }

    /// Move a loading fetch into its settled state.
    pub fn settle(&mut self, next: FetchState<T>) -> Result<(), TransitionError> {
        if !self.is_loading() {
            return Err(TransitionError::NotLoading(self.tag()));
        }
        if !next.is_settled() {
            return Err(TransitionError::NotSettled(next.tag()));
        }
        *self = next;
        Ok(())
    }

    /// Displayable value: the payload on success, the fallback on error.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Error(failed) => Some(&failed.fallback),
            Self::Idle | Self::Loading => None,
        }
    }

    pub fn failure(&self) -> Option<&FailedFetch<T>> {
        match self {
            Self::Error(failed) => Some(failed),
            _ => None,
        }
    }
}

/// `1234567` -> `"1,234,567"`.
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 && amount >= 0.0 && amount <= u64::MAX as f64 {
        format_count(amount as u64)
    } else {
        format!("{amount:.2}")
    }
}
