//! Axum + Askama renderer for the landing page and the admin dashboard.

use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use jobboard_client::{HttpApiClient, JobQuery, Notice, RecordingNotifier, StatsRequester};
use jobboard_core::{format_count, FetchState, JobSummary};
use jobboard_screens::{
    search_route, DashboardScreen, DashboardState, LandingScreen, LandingState, ScreenConfig,
    SearchForm,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::info;

pub const CRATE_NAME: &str = "jobboard-web";

#[derive(Clone)]
pub struct AppState {
    pub requester: StatsRequester,
    pub screens: ScreenConfig,
}

impl AppState {
    pub fn new(requester: StatsRequester, screens: ScreenConfig) -> Self {
        Self { requester, screens }
    }
}

#[derive(Debug, Deserialize, Default)]
struct SearchParams {
    #[serde(default)]
    search: String,
    #[serde(default)]
    location: String,
}

impl From<SearchParams> for SearchForm {
    fn from(params: SearchParams) -> Self {
        SearchForm::new(params.search, params.location)
    }
}

#[derive(Debug, Clone)]
struct JobCard {
    id: i64,
    title: String,
    company_name: String,
    location: String,
    description: String,
    logo: String,
    salary: String,
    posted_on: String,
}

impl From<&JobSummary> for JobCard {
    fn from(job: &JobSummary) -> Self {
        Self {
            id: job.id,
            title: job.title.clone(),
            company_name: job.company_name.clone(),
            location: job.location.clone(),
            description: job.description.clone(),
            logo: job.company_logo.clone().unwrap_or_default(),
            salary: job.salary_range().map(|r| r.display()).unwrap_or_default(),
            posted_on: job.posted_on(),
        }
    }
}

#[derive(Debug, Clone)]
struct StatCard {
    label: &'static str,
    value: String,
}

#[derive(Debug, Clone)]
struct ActivityRow {
    label: String,
    count: String,
}

#[derive(Template)]
#[template(path = "landing.html")]
struct LandingTemplate {
    search: String,
    location: String,
    stats_loading: bool,
    stats: Vec<StatCard>,
    jobs_loading: bool,
    jobs: Vec<JobCard>,
}

#[derive(Template)]
#[template(path = "jobs.html")]
struct JobsTemplate {
    search: String,
    location: String,
    loading: bool,
    jobs: Vec<JobCard>,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    toasts: Vec<String>,
    loading: bool,
    totals: Vec<StatCard>,
    pending_approvals: String,
    daily: Vec<ActivityRow>,
    monthly: Vec<ActivityRow>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(landing_handler))
        .route("/search", get(search_handler))
        .route("/jobs", get(jobs_handler))
        .route("/admin", get(dashboard_handler))
        .route("/admin/analytics/chart", get(analytics_chart_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "serving job board");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let port: u16 = std::env::var("JOBBOARD_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let screens = ScreenConfig::from_env()?;
    let client = HttpApiClient::new(screens.api.clone())?;
    info!(api = %client.config().base_url, "using job board API");
    let requester = StatsRequester::new(Arc::new(client));
    serve(AppState::new(requester, screens), port).await
}

/// Landing page for a given state. `loading` fields render as skeletons.
pub fn render_landing(state: &LandingState, form: &SearchForm) -> Result<String, askama::Error> {
    let stats = state.stats();
    LandingTemplate {
        search: form.search.clone(),
        location: form.location.clone(),
        stats_loading: state.stats.is_loading(),
        stats: vec![
            StatCard {
                label: "Active Jobs",
                value: format_count(stats.active_jobs),
            },
            StatCard {
                label: "Job Seekers",
                value: format_count(stats.job_seekers),
            },
            StatCard {
                label: "Companies",
                value: format_count(stats.companies),
            },
        ],
        jobs_loading: state.jobs.is_loading(),
        jobs: state.jobs().iter().map(JobCard::from).collect(),
    }
    .render()
}

pub fn render_job_list(
    jobs: &FetchState<Vec<JobSummary>>,
    form: &SearchForm,
) -> Result<String, askama::Error> {
    JobsTemplate {
        search: form.search.clone(),
        location: form.location.clone(),
        loading: jobs.is_loading(),
        jobs: jobs
            .value()
            .map(|jobs| jobs.iter().map(JobCard::from).collect())
            .unwrap_or_default(),
    }
    .render()
}

pub fn render_dashboard(state: &DashboardState, notices: &[Notice]) -> Result<String, askama::Error> {
    let analytics = state.analytics().cloned().unwrap_or_default();
    let labels = ["Total Users", "Total Employers", "Total Jobs", "Total Applications"];
    DashboardTemplate {
        toasts: notices.iter().map(|n| n.message.clone()).collect(),
        loading: state.is_loading(),
        totals: labels
            .into_iter()
            .zip(analytics.totals())
            .map(|(label, value)| StatCard {
                label,
                value: format_count(value),
            })
            .collect(),
        pending_approvals: format_count(analytics.pending_approvals),
        daily: analytics
            .daily_activity
            .iter()
            .map(|p| ActivityRow {
                label: p.date.clone(),
                count: format_count(p.count),
            })
            .collect(),
        monthly: analytics
            .monthly_activity
            .iter()
            .map(|p| ActivityRow {
                label: p.month.clone(),
                count: format_count(p.count),
            })
            .collect(),
    }
    .render()
}

async fn landing_handler(State(state): State<Arc<AppState>>) -> Response {
    let mut screen = LandingScreen::new(state.requester.clone(), &state.screens);
    if let Err(err) = screen.activate().await {
        return server_error(err.into());
    }
    screen.settled().await;
    let snapshot = screen.snapshot().await;
    render_html(render_landing(&snapshot, screen.form()))
}

async fn search_handler(Query(params): Query<SearchParams>) -> Response {
    let form = SearchForm::from(params);
    match search_route(&form.search, &form.location) {
        Ok(route) => Redirect::to(&route).into_response(),
        Err(err) => server_error(err.into()),
    }
}

async fn jobs_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Response {
    let form = SearchForm::from(params);
    let query = JobQuery::new(
        form.search.clone(),
        form.location.clone(),
        state.screens.landing_page,
        state.screens.landing_page_size,
    );
    let mut jobs: FetchState<Vec<JobSummary>> = FetchState::Idle;
    if let Err(err) = jobs.begin() {
        return server_error(err.into());
    }
    let settled = state.requester.fetch_jobs(&query, None).await;
    if let Err(err) = state.requester.commit(&mut jobs, settled) {
        return server_error(err.into());
    }
    render_html(render_job_list(&jobs, &form))
}

async fn load_dashboard(state: &AppState) -> anyhow::Result<(DashboardState, Vec<Notice>)> {
    let notifier = Arc::new(RecordingNotifier::new());
    let requester = state.requester.clone().with_notifier(notifier.clone());
    let mut screen = DashboardScreen::new(requester);
    screen.activate().await?;
    screen.settled().await;
    Ok((screen.snapshot().await, notifier.notices()))
}

async fn dashboard_handler(State(state): State<Arc<AppState>>) -> Response {
    match load_dashboard(&state).await {
        Ok((snapshot, notices)) => render_html(render_dashboard(&snapshot, &notices)),
        Err(err) => server_error(err),
    }
}

async fn analytics_chart_handler(State(state): State<Arc<AppState>>) -> Response {
    match load_dashboard(&state).await {
        Ok((snapshot, _notices)) => {
            let analytics = snapshot.analytics().cloned().unwrap_or_default();
            let (daily_x, daily_y) = analytics.daily_series();
            let (monthly_x, monthly_y) = analytics.monthly_series();
            Json(serde_json::json!({
                "data": [
                    {
                        "type": "bar",
                        "name": "Daily activity",
                        "x": daily_x,
                        "y": daily_y,
                        "marker": {"color": "#0ea5e9"}
                    },
                    {
                        "type": "scatter",
                        "mode": "lines+markers",
                        "name": "Monthly activity",
                        "x": monthly_x,
                        "y": monthly_y,
                        "xaxis": "x2",
                        "yaxis": "y2"
                    }
                ],
                "layout": {
                    "title": "Platform Activity",
                    "grid": {"rows": 2, "columns": 1, "pattern": "independent"},
                    "paper_bgcolor": "#ffffff",
                    "plot_bgcolor": "#f8fafc"
                },
                "state": snapshot.analytics.tag()
            }))
            .into_response()
        }
        Err(err) => server_error(err),
    }
}

fn render_html(rendered: Result<String, askama::Error>) -> Response {
    match rendered {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Server error: {}", err)),
    )
        .into_response()
}
