//! Landing and dashboard screen controllers: activation, teardown and per-screen fetch state.

use std::future::Future;
use std::sync::Arc;

use jobboard_client::{ApiConfig, ConfigError, JobQuery, StatsRequester};
use jobboard_core::{AnalyticsSnapshot, FetchState, JobSummary, StatsSnapshot, TransitionError};
use reqwest::Url;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobboard-screens";

pub const DEFAULT_LANDING_PAGE: u32 = 1;
pub const DEFAULT_LANDING_PAGE_SIZE: u32 = 6;

const JOBS_ROUTE: &str = "http://localhost/jobs";

#[derive(Debug, Clone)]
pub struct ScreenConfig {
    pub api: ApiConfig,
    pub landing_page: u32,
    pub landing_page_size: u32,
}

impl ScreenConfig {
    pub fn new(api: ApiConfig) -> Self {
        Self {
            api,
            landing_page: DEFAULT_LANDING_PAGE,
            landing_page_size: DEFAULT_LANDING_PAGE_SIZE,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new(ApiConfig::from_env()?);
        if let Ok(raw) = std::env::var("JOBBOARD_LANDING_PAGE_SIZE") {
            config.landing_page_size = raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidVar {
                    var: "JOBBOARD_LANDING_PAGE_SIZE",
                    value: raw.clone(),
                })?;
        }
        Ok(config)
    }
}

#[derive(Debug, Error)]
pub enum ScreenError {
    #[error("screen is already active (activation {0})")]
    AlreadyActive(Uuid),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("building search route: {0}")]
    Route(String),
}

/// Text currently typed into the search box.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchForm {
    pub search: String,
    pub location: String,
}

impl SearchForm {
    pub fn new(search: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            search: search.into(),
            location: location.into(),
        }
    }
}

/// Client-side route for a submitted search, with both values form-encoded.
pub fn search_route(search: &str, location: &str) -> Result<String, ScreenError> {
    let url = Url::parse_with_params(JOBS_ROUTE, &[("search", search), ("location", location)])
        .map_err(|err| ScreenError::Route(err.to_string()))?;
    Ok(match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    })
}

/// One mount of a screen. Dropping it cancels every request still in flight.
struct Activation {
    id: Uuid,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
}

impl Activation {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
            tasks: JoinSet::new(),
        }
    }

    /// Run `fut` and hand its output to `apply`, unless the activation is torn down first.
    fn spawn_update<S, R, F, U>(&mut self, label: &'static str, state: Arc<RwLock<S>>, fut: F, apply: U)
    where
        S: Send + Sync + 'static,
        R: Send + 'static,
        F: Future<Output = R> + Send + 'static,
        U: FnOnce(&mut S, R) -> Result<(), TransitionError> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let activation_id = self.id;
        let span = info_span!("screen_fetch", %activation_id, label);

        self.tasks.spawn(
            async move {
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    out = fut => Some(out),
                };
                let Some(out) = outcome else {
                    debug!("screen deactivated before response; dropping request");
                    return;
                };

                let mut guard = state.write().await;
                if cancel.is_cancelled() {
                    debug!("screen deactivated while response was pending; dropping it");
                    return;
                }
                if let Err(err) = apply(&mut *guard, out) {
                    warn!(error = %err, "discarding response for unexpected state");
                }
            }
            .instrument(span),
        );
    }

    async fn join(&mut self) {
        while let Some(res) = self.tasks.join_next().await {
            if let Err(err) = res {
                if !err.is_cancelled() {
                    warn!(activation_id = %self.id, error = %err, "screen fetch task failed");
                }
            }
        }
    }
}

impl Drop for Activation {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LandingState {
    pub jobs: FetchState<Vec<JobSummary>>,
    pub stats: FetchState<StatsSnapshot>,
}

impl LandingState {
    pub fn is_loading(&self) -> bool {
        self.jobs.is_loading() || self.stats.is_loading()
    }

    pub fn jobs(&self) -> &[JobSummary] {
        self.jobs.value().map(Vec::as_slice).unwrap_or_default()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.value().copied().unwrap_or_default()
    }

    fn abandon_in_flight(&mut self) {
        if self.jobs.is_loading() {
            self.jobs = FetchState::Idle;
        }
        if self.stats.is_loading() {
            self.stats = FetchState::Idle;
        }
    }
}

/// Public landing page: featured jobs plus platform counters, fetched concurrently.
pub struct LandingScreen {
    requester: StatsRequester,
    page: u32,
    page_size: u32,
    form: SearchForm,
    state: Arc<RwLock<LandingState>>,
    activation: Option<Activation>,
}

impl LandingScreen {
    pub fn new(requester: StatsRequester, config: &ScreenConfig) -> Self {
        Self {
            requester,
            page: config.landing_page,
            page_size: config.landing_page_size,
            form: SearchForm::default(),
            state: Arc::new(RwLock::new(LandingState::default())),
            activation: None,
        }
    }

    pub fn with_form(mut self, form: SearchForm) -> Self {
        self.form = form;
        self
    }

    pub fn form(&self) -> &SearchForm {
        &self.form
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.form.search = search.into();
    }

    pub fn set_location(&mut self, location: impl Into<String>) {
        self.form.location = location.into();
    }

    pub fn query(&self) -> JobQuery {
        JobQuery::new(
            self.form.search.clone(),
            self.form.location.clone(),
            self.page,
            self.page_size,
        )
    }

    pub fn activation_id(&self) -> Option<Uuid> {
        self.activation.as_ref().map(|a| a.id)
    }

    /// Mount: fire `fetch_jobs` and `fetch_stats` once each.
    pub async fn activate(&mut self) -> Result<Uuid, ScreenError> {
        if let Some(active) = &self.activation {
            return Err(ScreenError::AlreadyActive(active.id));
        }

        let (prior_jobs, prior_stats) = {
            let mut state = self.state.write().await;
            let prior_jobs = state.jobs.value().cloned();
            let prior_stats = state.stats.value().copied();
            state.jobs.begin()?;
            state.stats.begin()?;
            (prior_jobs, prior_stats)
        };

        let mut activation = Activation::new();
        let id = activation.id;
        info!(activation_id = %id, "activating landing screen");

        let requester = self.requester.clone();
        let committer = self.requester.clone();
        let query = self.query();
        activation.spawn_update(
            "fetch_jobs",
            self.state.clone(),
            async move { requester.fetch_jobs(&query, prior_jobs.as_ref()).await },
            move |state: &mut LandingState, next| committer.commit(&mut state.jobs, next),
        );

        let requester = self.requester.clone();
        let committer = self.requester.clone();
        activation.spawn_update(
            "fetch_stats",
            self.state.clone(),
            async move { requester.fetch_stats(prior_stats.as_ref()).await },
            move |state: &mut LandingState, next| committer.commit(&mut state.stats, next),
        );

        self.activation = Some(activation);
        Ok(id)
    }

    /// Wait until every request of the current activation has settled.
    pub async fn settled(&mut self) {
        if let Some(activation) = self.activation.as_mut() {
            activation.join().await;
        }
    }

    /// Teardown: pending responses are dropped and never touch state.
    pub async fn deactivate(&mut self) {
        if let Some(activation) = self.activation.take() {
            info!(activation_id = %activation.id, "deactivating landing screen");
            drop(activation);
            self.state.write().await.abandon_in_flight();
        }
    }

    pub async fn snapshot(&self) -> LandingState {
        self.state.read().await.clone()
    }

    /// Route to navigate to when the search form is submitted.
    pub fn handle_search(&self) -> Result<String, ScreenError> {
        search_route(&self.form.search, &self.form.location)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardState {
    pub analytics: FetchState<AnalyticsSnapshot>,
}

impl DashboardState {
    pub fn is_loading(&self) -> bool {
        self.analytics.is_loading()
    }

    pub fn analytics(&self) -> Option<&AnalyticsSnapshot> {
        self.analytics.value()
    }
}

/// Admin analytics dashboard.
pub struct DashboardScreen {
    requester: StatsRequester,
    state: Arc<RwLock<DashboardState>>,
    activation: Option<Activation>,
}

impl DashboardScreen {
    pub fn new(requester: StatsRequester) -> Self {
        Self {
            requester,
            state: Arc::new(RwLock::new(DashboardState::default())),
            activation: None,
        }
    }

    pub fn activation_id(&self) -> Option<Uuid> {
        self.activation.as_ref().map(|a| a.id)
    }

    pub async fn activate(&mut self) -> Result<Uuid, ScreenError> {
        if let Some(active) = &self.activation {
            return Err(ScreenError::AlreadyActive(active.id));
        }

        let prior = {
            let mut state = self.state.write().await;
            let prior = state.analytics.value().cloned();
            state.analytics.begin()?;
            prior
        };

        let mut activation = Activation::new();
        let id = activation.id;
        info!(activation_id = %id, "activating dashboard screen");

        let requester = self.requester.clone();
        let committer = self.requester.clone();
        activation.spawn_update(
            "fetch_analytics",
            self.state.clone(),
            async move { requester.fetch_analytics(prior.as_ref()).await },
            move |state: &mut DashboardState, next| committer.commit(&mut state.analytics, next),
        );

        self.activation = Some(activation);
        Ok(id)
    }

    pub async fn settled(&mut self) {
        if let Some(activation) = self.activation.as_mut() {
            activation.join().await;
        }
    }

    pub async fn deactivate(&mut self) {
        if let Some(activation) = self.activation.take() {
            info!(activation_id = %activation.id, "deactivating dashboard screen");
            drop(activation);
            let mut state = self.state.write().await;
            if state.analytics.is_loading() {
                state.analytics = FetchState::Idle;
            }
        }
    }

    pub async fn snapshot(&self) -> DashboardState {
        self.state.read().await.clone()
    }
}
