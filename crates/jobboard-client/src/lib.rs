//! Request construction, transports and response reconciliation for the job board API.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use jobboard_core::{
    fallback_analytics, AnalyticsSnapshot, FailedFetch, FailureKind, FetchState, JobSummary,
    StatsSnapshot, TransitionError,
};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info_span, warn, Instrument};

pub const CRATE_NAME: &str = "jobboard-client";

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_USER_AGENT: &str = "jobboard-client/0.1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid API base url `{value}`: {reason}")]
    InvalidBaseUrl { value: String, reason: String },
    #[error("invalid value for {var}: `{value}`")]
    InvalidVar { var: &'static str, value: String },
}

/// Everything the requester needs to reach the API. Built once, then passed around.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: Url,
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub auth_token: Option<String>,
}

impl ApiConfig {
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let parsed = Url::parse(base_url.trim()).map_err(|err| ConfigError::InvalidBaseUrl {
            value: base_url.to_string(),
            reason: err.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(ConfigError::InvalidBaseUrl {
                value: base_url.to_string(),
                reason: "url cannot carry a path".to_string(),
            });
        }
        Ok(Self {
            base_url: parsed,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            auth_token: None,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let base = std::env::var("JOBBOARD_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let mut config = Self::new(&base)?;
        if let Ok(raw) = std::env::var("JOBBOARD_HTTP_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidVar {
                var: "JOBBOARD_HTTP_TIMEOUT_SECS",
                value: raw.clone(),
            })?;
            config.timeout = Duration::from_secs(secs.max(1));
        }
        if let Ok(agent) = std::env::var("JOBBOARD_USER_AGENT") {
            config.user_agent = Some(agent);
        }
        config.auth_token = std::env::var("JOBBOARD_API_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());
        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Resolve `path` beneath the base url, keeping any base path prefix such as `/api`.
    pub fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        url.set_query(None);
        url
    }

    pub fn endpoint_with_query(&self, path: &str, params: &[(&'static str, String)]) -> Url {
        let mut url = self.endpoint(path);
        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        }
        url
    }
}

/// The three read-only calls the screens make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Jobs,
    Stats,
    Analytics,
}

impl Operation {
    pub fn path(self) -> &'static str {
        match self {
            Self::Jobs => "/jobs",
            Self::Stats => "/auth/stats",
            Self::Analytics => "/admin/analytics",
        }
    }

    pub fn failure_message(self) -> &'static str {
        match self {
            Self::Jobs => "Failed to load job listings",
            Self::Stats => "Failed to load platform statistics",
            Self::Analytics => "Failed to load analytics data",
        }
    }

    fn fixture_file(self) -> &'static str {
        match self {
            Self::Jobs => "jobs.json",
            Self::Stats => "auth_stats.json",
            Self::Analytics => "admin_analytics.json",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Jobs => "fetch_jobs",
            Self::Stats => "fetch_stats",
            Self::Analytics => "fetch_analytics",
        };
        f.write_str(name)
    }
}

pub type QueryParams = Vec<(&'static str, String)>;

/// Inputs for one `/jobs` page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobQuery {
    pub search: String,
    pub location: String,
    pub page: u32,
    pub limit: u32,
}

impl JobQuery {
    pub fn new(search: impl Into<String>, location: impl Into<String>, page: u32, limit: u32) -> Self {
        Self {
            search: search.into(),
            location: location.into(),
            page,
            limit,
        }
    }

    /// `page` and `limit` always; `search` and `location` only when non-empty. No trimming.
    pub fn params(&self) -> QueryParams {
        let mut params = vec![
            ("page", self.page.to_string()),
            ("limit", self.limit.to_string()),
        ];
        if !self.search.is_empty() {
            params.push(("search", self.search.clone()));
        }
        if !self.location.is_empty() {
            params.push(("location", self.location.clone()));
        }
        params
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub url: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Transport {
        url: String,
        message: String,
        timed_out: bool,
    },
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("unexpected response body from {url}: {source}")]
    Shape {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transport { .. } => FailureKind::Transport,
            Self::HttpStatus { .. } => FailureKind::Status,
            Self::Shape { .. } => FailureKind::Shape,
        }
    }

    pub fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        Self::Transport {
            url: url.to_string(),
            message: err.to_string(),
            timed_out: err.is_timeout(),
        }
    }
}

#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Issue a GET. Non-2xx statuses are returned as responses, not errors.
    async fn get(&self, path: &str, params: &[(&'static str, String)]) -> Result<ApiResponse, FetchError>;
}

#[derive(Debug)]
pub struct HttpApiClient {
    client: reqwest::Client,
    config: ApiConfig,
}

impl HttpApiClient {
    pub fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        if let Some(token) = &config.auth_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .context("building authorization header")?;
            value.set_sensitive(true);
            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, value);
            builder = builder.default_headers(headers);
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    async fn send(&self, url: Url) -> Result<ApiResponse, FetchError> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| FetchError::from_reqwest(url.as_str(), &err))?;
        let status = resp.status();
        let final_url = resp.url().to_string();
        let body = resp
            .bytes()
            .await
            .map_err(|err| FetchError::from_reqwest(&final_url, &err))?
            .to_vec();
        Ok(ApiResponse {
            status,
            url: final_url,
            body,
        })
    }
}

#[async_trait]
impl ApiTransport for HttpApiClient {
    async fn get(&self, path: &str, params: &[(&'static str, String)]) -> Result<ApiResponse, FetchError> {
        let url = self.config.endpoint_with_query(path, params);
        let span = info_span!("api_get", path, url = %url);
        self.send(url).instrument(span).await
    }
}

/// Canned reply for one path of a [`FixtureTransport`].
#[derive(Debug, Clone)]
pub enum FixtureResponse {
    Body { status: u16, body: String },
    TransportFailure { message: String, timed_out: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub path: String,
    pub params: Vec<(String, String)>,
}

/// Offline transport serving canned bodies per path and recording every request.
#[derive(Debug, Default)]
pub struct FixtureTransport {
    routes: HashMap<String, FixtureResponse>,
    delay: Option<Duration>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FixtureTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `jobs.json`, `auth_stats.json` and `admin_analytics.json` from `dir`; absent files 404.
    pub fn from_dir(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        let mut transport = Self::new();
        for op in [Operation::Jobs, Operation::Stats, Operation::Analytics] {
            let path = dir.join(op.fixture_file());
            if !path.exists() {
                continue;
            }
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<serde_json::Value>(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            transport = transport.with_body(op.path(), 200, text);
        }
        Ok(transport)
    }

    pub fn with_json(self, path: &str, status: u16, body: serde_json::Value) -> Self {
        self.with_body(path, status, body.to_string())
    }

    pub fn with_body(mut self, path: &str, status: u16, body: impl Into<String>) -> Self {
        self.routes.insert(
            path.to_string(),
            FixtureResponse::Body {
                status,
                body: body.into(),
            },
        );
        self
    }

    pub fn with_transport_failure(mut self, path: &str, message: impl Into<String>) -> Self {
        self.routes.insert(
            path.to_string(),
            FixtureResponse::TransportFailure {
                message: message.into(),
                timed_out: false,
            },
        );
        self
    }

    pub fn with_timeout_failure(mut self, path: &str) -> Self {
        self.routes.insert(
            path.to_string(),
            FixtureResponse::TransportFailure {
                message: "operation timed out".to_string(),
                timed_out: true,
            },
        );
        self
    }

    /// Delay every reply, for exercising in-flight behavior.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl ApiTransport for FixtureTransport {
    async fn get(&self, path: &str, params: &[(&'static str, String)]) -> Result<ApiResponse, FetchError> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RecordedRequest {
                path: path.to_string(),
                params: params
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), v.clone()))
                    .collect(),
            });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let url = format!("fixture://{path}");
        match self.routes.get(path) {
            Some(FixtureResponse::Body { status, body }) => Ok(ApiResponse {
                status: StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                url,
                body: body.clone().into_bytes(),
            }),
            Some(FixtureResponse::TransportFailure { message, timed_out }) => {
                Err(FetchError::Transport {
                    url,
                    message: message.clone(),
                    timed_out: *timed_out,
                })
            }
            None => Ok(ApiResponse {
                status: StatusCode::NOT_FOUND,
                url,
                body: br#"{"message":"not found"}"#.to_vec(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct JobsEnvelope {
    #[serde(default)]
    jobs: Option<Vec<JobSummary>>,
}

fn decode<T: DeserializeOwned>(resp: &ApiResponse) -> Result<T, FetchError> {
    if !resp.status.is_success() {
        return Err(FetchError::HttpStatus {
            status: resp.status.as_u16(),
            url: resp.url.clone(),
        });
    }
    serde_json::from_slice(&resp.body).map_err(|source| FetchError::Shape {
        url: resp.url.clone(),
        source,
    })
}

/// `{ jobs: [...] }` -> listings in response order; an absent or null `jobs` field is an empty page.
pub fn reconcile_jobs(resp: &ApiResponse) -> Result<Vec<JobSummary>, FetchError> {
    decode::<JobsEnvelope>(resp).map(|envelope| envelope.jobs.unwrap_or_default())
}

pub fn reconcile_stats(resp: &ApiResponse) -> Result<StatsSnapshot, FetchError> {
    decode(resp)
}

pub fn reconcile_analytics(resp: &ApiResponse) -> Result<AnalyticsSnapshot, FetchError> {
    decode(resp)
}

#[derive(Debug, Clone, PartialEq)]
pub enum FallbackStrategy<T> {
    Empty,
    RetainPrior,
    Fixed(T),
}

/// What an operation shows, and whether the user hears about it, when it fails.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackPolicy<T> {
    pub strategy: FallbackStrategy<T>,
    pub notify: bool,
}

impl<T: Clone + Default> FallbackPolicy<T> {
    pub fn silent(strategy: FallbackStrategy<T>) -> Self {
        Self {
            strategy,
            notify: false,
        }
    }

    pub fn notifying(strategy: FallbackStrategy<T>) -> Self {
        Self {
            strategy,
            notify: true,
        }
    }

    pub fn fallback(&self, prior: Option<&T>) -> T {
        match &self.strategy {
            FallbackStrategy::Empty => T::default(),
            FallbackStrategy::RetainPrior => prior.cloned().unwrap_or_default(),
            FallbackStrategy::Fixed(value) => value.clone(),
        }
    }

    pub fn resolve(&self, result: Result<T, FetchError>, prior: Option<&T>) -> FetchState<T> {
        match result {
            Ok(value) => FetchState::Success(value),
            Err(err) => FetchState::Error(FailedFetch {
                kind: err.kind(),
                message: err.to_string(),
                fallback: self.fallback(prior),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequesterPolicies {
    pub jobs: FallbackPolicy<Vec<JobSummary>>,
    pub stats: FallbackPolicy<StatsSnapshot>,
    pub analytics: FallbackPolicy<AnalyticsSnapshot>,
}

impl Default for RequesterPolicies {
    fn default() -> Self {
        Self {
            jobs: FallbackPolicy::silent(FallbackStrategy::Empty),
            stats: FallbackPolicy::silent(FallbackStrategy::RetainPrior),
            analytics: FallbackPolicy::notifying(FallbackStrategy::Fixed(fallback_analytics())),
        }
    }
}

/// User-visible failure event (rendered as a toast).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub operation: Operation,
    pub kind: FailureKind,
    pub message: String,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: &Notice) {
        warn!(operation = %notice.operation, kind = ?notice.kind, "{}", notice.message);
    }
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: &Notice) {
        self.notices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notice.clone());
    }
}

/// Resolved outcome of one fetch, not yet applied to any screen state.
///
/// The notice is only delivered by [`StatsRequester::commit`], so a result that is
/// dropped (for example after its activation was cancelled) never reaches the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Settled<T> {
    pub state: FetchState<T>,
    pub notice: Option<Notice>,
}

/// Shared entry point for every screen's API calls.
#[derive(Clone)]
pub struct StatsRequester {
    transport: Arc<dyn ApiTransport>,
    policies: Arc<RequesterPolicies>,
    notifier: Arc<dyn Notifier>,
}

impl StatsRequester {
    pub fn new(transport: Arc<dyn ApiTransport>) -> Self {
        Self {
            transport,
            policies: Arc::new(RequesterPolicies::default()),
            notifier: Arc::new(TracingNotifier),
        }
    }

    pub fn with_policies(mut self, policies: RequesterPolicies) -> Self {
        self.policies = Arc::new(policies);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub async fn request_jobs(&self, query: &JobQuery) -> Result<Vec<JobSummary>, FetchError> {
        let resp = self
            .transport
            .get(Operation::Jobs.path(), &query.params())
            .await?;
        reconcile_jobs(&resp)
    }

    pub async fn request_stats(&self) -> Result<StatsSnapshot, FetchError> {
        let resp = self.transport.get(Operation::Stats.path(), &[]).await?;
        reconcile_stats(&resp)
    }

    pub async fn request_analytics(&self) -> Result<AnalyticsSnapshot, FetchError> {
        let resp = self.transport.get(Operation::Analytics.path(), &[]).await?;
        reconcile_analytics(&resp)
    }

    pub async fn fetch_jobs(
        &self,
        query: &JobQuery,
        prior: Option<&Vec<JobSummary>>,
    ) -> Settled<Vec<JobSummary>> {
        let result = self.request_jobs(query).await;
        self.settle(Operation::Jobs, &self.policies.jobs, result, prior)
    }

    pub async fn fetch_stats(&self, prior: Option<&StatsSnapshot>) -> Settled<StatsSnapshot> {
        let result = self.request_stats().await;
        self.settle(Operation::Stats, &self.policies.stats, result, prior)
    }

    pub async fn fetch_analytics(
        &self,
        prior: Option<&AnalyticsSnapshot>,
    ) -> Settled<AnalyticsSnapshot> {
        let result = self.request_analytics().await;
        self.settle(Operation::Analytics, &self.policies.analytics, result, prior)
    }

    /// Apply a settled fetch to `target`, then deliver its notice if it carries one.
    pub fn commit<T>(
        &self,
        target: &mut FetchState<T>,
        settled: Settled<T>,
    ) -> Result<(), TransitionError> {
        target.settle(settled.state)?;
        if let Some(notice) = &settled.notice {
            self.notifier.notify(notice);
        }
        Ok(())
    }

    fn settle<T: Clone + Default>(
        &self,
        operation: Operation,
        policy: &FallbackPolicy<T>,
        result: Result<T, FetchError>,
        prior: Option<&T>,
    ) -> Settled<T> {
        let notice = match &result {
            Err(err) => {
                warn!(%operation, kind = ?err.kind(), error = %err, "fetch failed; using fallback");
                policy.notify.then(|| Notice {
                    operation,
                    kind: err.kind(),
                    message: operation.failure_message().to_string(),
                })
            }
            Ok(_) => None,
        };
        Settled {
            state: policy.resolve(result, prior),
            notice,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use axum::extract::Query;
    use axum::http::HeaderMap as AxumHeaders;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use tokio::net::TcpListener;

    fn job_json(id: i64, title: &str) -> serde_json::Value {
        json!({
            "id": id,
            "title": title,
            "description": "Build things",
            "location": "Remote",
            "company_name": "Acme",
            "created_at": "2026-02-24T12:00:00Z",
            "salary_min": 90000,
            "salary_max": 120000,
            "currency": "USD"
        })
    }

    fn param_names(params: &QueryParams) -> Vec<&'static str> {
        params.iter().map(|(k, _)| *k).collect()
    }

    async fn spawn_api(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve");
        });
        format!("http://{addr}/api")
    }

    #[test]
    fn query_builder_omits_empty_fields_only() {
        let q = JobQuery::new("engineer", "", 1, 6);
        assert_eq!(
            q.params(),
            vec![
                ("page", "1".to_string()),
                ("limit", "6".to_string()),
                ("search", "engineer".to_string())
            ]
        );

        let q = JobQuery::new("", "Remote", 3, 20);
        assert_eq!(param_names(&q.params()), vec!["page", "limit", "location"]);
        assert_eq!(q.params()[0].1, "3");
        assert_eq!(q.params()[1].1, "20");

        let q = JobQuery::new("", "", 1, 6);
        assert_eq!(param_names(&q.params()), vec!["page", "limit"]);

        let q = JobQuery::new("  ", " ", 1, 6);
        let params = q.params();
        assert_eq!(param_names(&params), vec!["page", "limit", "search", "location"]);
        assert_eq!(params[2].1, "  ");
        assert_eq!(params[3].1, " ");
    }

    #[test]
    fn endpoint_keeps_base_path_and_encodes_query() {
        let config = ApiConfig::new("https://api.example.com/api/").expect("config");
        assert_eq!(
            config.endpoint("/auth/stats").as_str(),
            "https://api.example.com/api/auth/stats"
        );

        let url = config.endpoint_with_query("/jobs", &JobQuery::new("engineer", "", 1, 6).params());
        assert_eq!(url.query(), Some("page=1&limit=6&search=engineer"));

        let url = config.endpoint_with_query("/jobs", &JobQuery::new("", "Remote", 1, 6).params());
        assert_eq!(url.query(), Some("page=1&limit=6&location=Remote"));

        let url = config.endpoint_with_query("/jobs", &JobQuery::new("C++ & Rust", "", 1, 6).params());
        assert_eq!(url.query(), Some("page=1&limit=6&search=C%2B%2B+%26+Rust"));
    }

    #[test]
    fn config_rejects_unparsable_base_url() {
        assert!(matches!(
            ApiConfig::new("not a url"),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            ApiConfig::new("mailto:ops@example.com"),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
    }

    fn response(status: u16, body: &str) -> ApiResponse {
        ApiResponse {
            status: StatusCode::from_u16(status).expect("status"),
            url: "fixture:///jobs".into(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn reconcile_jobs_preserves_count_and_order() {
        let body = json!({ "jobs": [job_json(3, "c"), job_json(1, "a"), job_json(2, "b")] });
        let jobs = reconcile_jobs(&response(200, &body.to_string())).expect("jobs");
        assert_eq!(jobs.iter().map(|j| j.id).collect::<Vec<_>>(), vec![3, 1, 2]);
        assert!(jobs.iter().all(|j| j.salary_range().is_some()));
    }

    #[test]
    fn reconcile_jobs_defaults_missing_field_to_empty() {
        let jobs = reconcile_jobs(&response(200, r#"{"total":0}"#)).expect("jobs");
        assert!(jobs.is_empty());
    }

    #[test]
    fn reconcile_jobs_treats_null_field_as_empty() {
        let jobs = reconcile_jobs(&response(200, r#"{"jobs":null,"total":0}"#)).expect("jobs");
        assert!(jobs.is_empty());
    }

    #[test]
    fn reconcile_analytics_rejects_wrong_shape_success_bodies() {
        for body in [r#"{"success":false,"message":"Unauthorized"}"#, "[]", r#"{"totalUsers":3}"#] {
            let err = reconcile_analytics(&response(200, body)).unwrap_err();
            assert_eq!(err.kind(), FailureKind::Shape, "body {body}");
        }
    }

    #[test]
    fn reconcile_classifies_status_and_shape_failures() {
        let err = reconcile_jobs(&response(503, "{}")).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Status);
        assert!(matches!(err, FetchError::HttpStatus { status: 503, .. }));

        let err = reconcile_jobs(&response(200, "<html>oops</html>")).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Shape);

        let err = reconcile_stats(&response(200, r#"{"activeJobs":-1}"#)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Shape);
    }

    #[test]
    fn default_policies_differ_per_operation() {
        let policies = RequesterPolicies::default();
        assert_eq!(policies.jobs, FallbackPolicy::silent(FallbackStrategy::Empty));
        assert_eq!(policies.stats, FallbackPolicy::silent(FallbackStrategy::RetainPrior));
        assert!(policies.analytics.notify);

        let prior = StatsSnapshot {
            active_jobs: 4,
            job_seekers: 5,
            companies: 6,
        };
        assert_eq!(policies.stats.fallback(Some(&prior)), prior);
        assert_eq!(policies.stats.fallback(None), StatsSnapshot::default());
        assert_eq!(policies.analytics.fallback(None), fallback_analytics());
    }

    #[tokio::test]
    async fn failed_analytics_uses_fixed_fallback_and_notifies_once() {
        let transport = FixtureTransport::new().with_transport_failure("/admin/analytics", "dns error");
        let notifier = Arc::new(RecordingNotifier::new());
        let requester = StatsRequester::new(Arc::new(transport)).with_notifier(notifier.clone());

        let settled = requester.fetch_analytics(None).await;
        assert!(notifier.notices().is_empty());

        let mut state = FetchState::Loading;
        requester.commit(&mut state, settled).expect("commit");
        let failure = state.failure().expect("error state");
        assert_eq!(failure.kind, FailureKind::Transport);
        assert_eq!(failure.fallback, fallback_analytics());

        let notices = notifier.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].operation, Operation::Analytics);
        assert_eq!(notices[0].message, "Failed to load analytics data");
    }

    #[tokio::test]
    async fn wrong_shape_analytics_body_falls_back_and_notifies_once() {
        let transport = FixtureTransport::new().with_json(
            "/admin/analytics",
            200,
            json!({ "success": false, "message": "Unauthorized" }),
        );
        let notifier = Arc::new(RecordingNotifier::new());
        let requester = StatsRequester::new(Arc::new(transport)).with_notifier(notifier.clone());

        let mut state = FetchState::Loading;
        let settled = requester.fetch_analytics(None).await;
        requester.commit(&mut state, settled).expect("commit");

        assert_eq!(state.tag(), "error");
        let failure = state.failure().expect("error state");
        assert_eq!(failure.kind, FailureKind::Shape);
        assert_eq!(state.value(), Some(&fallback_analytics()));
        assert_eq!(notifier.notices().len(), 1);
    }

    #[tokio::test]
    async fn commit_on_a_non_loading_state_delivers_no_notice() {
        let transport = FixtureTransport::new().with_transport_failure("/admin/analytics", "reset");
        let notifier = Arc::new(RecordingNotifier::new());
        let requester = StatsRequester::new(Arc::new(transport)).with_notifier(notifier.clone());

        let settled = requester.fetch_analytics(None).await;
        assert!(settled.notice.is_some());

        let mut state: FetchState<AnalyticsSnapshot> = FetchState::Idle;
        let err = requester.commit(&mut state, settled).unwrap_err();
        assert_eq!(err, TransitionError::NotLoading("idle"));
        assert_eq!(state.tag(), "idle");
        assert!(notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn failed_stats_retain_prior_silently() {
        let transport = FixtureTransport::new().with_timeout_failure("/auth/stats");
        let notifier = Arc::new(RecordingNotifier::new());
        let requester = StatsRequester::new(Arc::new(transport)).with_notifier(notifier.clone());

        let first = requester.fetch_stats(None).await;
        assert!(first.notice.is_none());
        assert_eq!(first.state.value(), Some(&StatsSnapshot::default()));

        let prior = StatsSnapshot {
            active_jobs: 10,
            job_seekers: 20,
            companies: 30,
        };
        let second = requester.fetch_stats(Some(&prior)).await;
        assert!(second.notice.is_none());
        let mut state = FetchState::Loading;
        requester.commit(&mut state, second).expect("commit");
        assert_eq!(state.value(), Some(&prior));
        assert!(notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn failed_jobs_yield_empty_settled_state() {
        let transport = Arc::new(FixtureTransport::new().with_json("/jobs", 500, json!({ "error": "boom" })));
        let notifier = Arc::new(RecordingNotifier::new());
        let requester = StatsRequester::new(transport.clone()).with_notifier(notifier.clone());

        let state = requester
            .fetch_jobs(&JobQuery::new("", "Remote", 1, 6), None)
            .await
            .state;
        assert!(!state.is_loading());
        assert_eq!(state.value(), Some(&Vec::new()));
        assert_eq!(state.failure().map(|f| f.kind), Some(FailureKind::Status));
        assert!(notifier.notices().is_empty());

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/jobs");
        assert!(requests[0].params.iter().all(|(k, _)| k != "search"));
    }

    #[tokio::test]
    async fn http_client_round_trips_encoded_query() {
        async fn jobs(Query(q): Query<BTreeMap<String, String>>) -> Json<serde_json::Value> {
            let title = format!(
                "{}|{}|{}",
                q.get("search").cloned().unwrap_or_default(),
                q.get("page").cloned().unwrap_or_default(),
                q.contains_key("location")
            );
            Json(json!({ "jobs": [job_json(1, &title)] }))
        }

        let base = spawn_api(Router::new().route("/api/jobs", get(jobs))).await;
        let client = HttpApiClient::new(ApiConfig::new(&base).expect("config")).expect("client");
        let requester = StatsRequester::new(Arc::new(client));

        let jobs = requester
            .request_jobs(&JobQuery::new("C++ & Rust #1", "", 2, 6))
            .await
            .expect("jobs");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].title, "C++ & Rust #1|2|false");
    }

    #[tokio::test]
    async fn http_client_surfaces_status_and_attaches_bearer_token() {
        async fn analytics(headers: AxumHeaders) -> (axum::http::StatusCode, String) {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            (axum::http::StatusCode::INTERNAL_SERVER_ERROR, auth)
        }

        let base = spawn_api(Router::new().route("/api/admin/analytics", get(analytics))).await;
        let config = ApiConfig::new(&base).expect("config").with_auth_token("s3cret");
        let client = HttpApiClient::new(config).expect("client");
        assert_eq!(client.config().auth_token.as_deref(), Some("s3cret"));

        let resp = client.get(Operation::Analytics.path(), &[]).await.expect("response");
        assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(String::from_utf8_lossy(&resp.body), "Bearer s3cret");

        let err = reconcile_analytics(&resp).unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus { status: 500, .. }));
    }

    #[tokio::test]
    async fn http_client_timeout_is_a_transport_failure() {
        async fn slow() -> Json<serde_json::Value> {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Json(json!({ "activeJobs": 1 }))
        }

        let base = spawn_api(Router::new().route("/api/auth/stats", get(slow))).await;
        let config = ApiConfig::new(&base)
            .expect("config")
            .with_timeout(Duration::from_millis(100));
        let requester = StatsRequester::new(Arc::new(HttpApiClient::new(config).expect("client")));

        let err = requester.request_stats().await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Transport);
        assert!(matches!(err, FetchError::Transport { timed_out: true, .. }));
    }

    #[tokio::test]
    async fn http_client_connection_refused_is_a_transport_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let config = ApiConfig::new(&format!("http://{addr}/api")).expect("config");
        let requester = StatsRequester::new(Arc::new(HttpApiClient::new(config).expect("client")));
        let state = requester.fetch_stats(None).await.state;
        assert_eq!(state.failure().map(|f| f.kind), Some(FailureKind::Transport));
        assert_eq!(state.value(), Some(&StatsSnapshot::default()));
    }
}
