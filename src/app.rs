use axum::{
    Form, Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use handlebars::Handlebars;
use polars::prelude::PolarsError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::config::DashboardConfig;
use crate::downloader::{self, ExportFormat};
use crate::graph::ChartOptions;
use crate::llm::TextGenerator;
use crate::loader::{EXPECTED_SHEETS, LoadError, ORIGINAL_SHEET, Workbook};
use crate::session::{SESSION_COOKIE, SessionStore};
use crate::summary::{self, SummaryError};
use crate::view::{self, View, ViewData, ViewPanel};

const DASHBOARD_TEMPLATE: &str = "dashboard";
const MISSING_FECHA_WARNING: &str = "La hoja seleccionada no tiene una columna 'Fecha'.";

pub struct AppState {
    config: DashboardConfig,
    chart_options: ChartOptions,
    generator: Option<Arc<dyn TextGenerator>>,
    sessions: SessionStore,
    templates: Handlebars<'static>,
}

impl AppState {
    pub fn new(
        config: DashboardConfig,
        generator: Option<Arc<dyn TextGenerator>>,
    ) -> Result<Self, handlebars::TemplateError> {
        let mut templates = Handlebars::new();
        templates.register_template_string(
            DASHBOARD_TEMPLATE,
            include_str!("./templates/dashboard.hbs"),
        )?;
        Ok(AppState {
            chart_options: config.chart_options(),
            sessions: SessionStore::new(config.session_ttl()),
            config,
            generator,
            templates,
        })
    }
}

/// Typed error for HTTP handlers, rendered as `{"error": "..."}`
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    UnprocessableEntity(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::UnprocessableEntity(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            Self::Internal(msg) => {
                log::error!("internal server error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<handlebars::RenderError> for ApiError {
    fn from(err: handlebars::RenderError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<crate::graph::ChartError> for ApiError {
    fn from(err: crate::graph::ChartError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<PolarsError> for ApiError {
    fn from(err: PolarsError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<downloader::ExportError> for ApiError {
    fn from(err: downloader::ExportError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Sheet and view selection carried by links and forms
#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    hoja: Option<String>,
    vista: Option<String>,
}

impl PageQuery {
    /// Selected sheet, falling back to the first expected sheet
    fn sheet(&self) -> &'static str {
        self.hoja
            .as_deref()
            .and_then(|h| EXPECTED_SHEETS.into_iter().find(|s| *s == h))
            .unwrap_or(ORIGINAL_SHEET)
    }

    fn view(&self) -> View {
        self.vista
            .as_deref()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct ExportQuery {
    hoja: Option<String>,
    format: Option<String>,
}

#[derive(Serialize)]
struct SheetOption {
    name: &'static str,
    selected: bool,
}

#[derive(Serialize)]
struct ViewOption {
    slug: &'static str,
    label: &'static str,
    selected: bool,
}

/// Text or error returned by an AI request
#[derive(Serialize)]
struct AiPanel {
    text: Option<String>,
    error: Option<String>,
}

impl From<Result<String, SummaryError>> for AiPanel {
    fn from(result: Result<String, SummaryError>) -> Self {
        match result {
            Ok(text) => AiPanel {
                text: Some(text),
                error: None,
            },
            Err(e) => {
                log::warn!("AI request failed: {}", e);
                AiPanel {
                    text: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[derive(Serialize, Default)]
struct DashboardPage {
    title: &'static str,
    has_workbook: bool,
    file_name: Option<String>,
    sheet: &'static str,
    view: &'static str,
    sheets: Vec<SheetOption>,
    views: Vec<ViewOption>,
    warning: Option<String>,
    upload_error: Option<String>,
    panel: Option<ViewPanel>,
    conclusion: Option<AiPanel>,
    comparison: Option<AiPanel>,
}

/// AI output to splice into the page
#[derive(Default)]
struct AiOutput {
    conclusion: Option<AiPanel>,
    comparison: Option<AiPanel>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes();
    let static_dir = ServeDir::new(&state.config.static_dir);

    Router::new()
        .route("/", get(serve_dashboard))
        .route("/upload", post(upload_workbook))
        .route("/conclusion", post(request_conclusion))
        .route("/comparacion", post(request_comparison))
        .route("/api/views/:view", get(get_view_data))
        .route("/export/:view", get(export_view))
        .route("/health", get(health))
        .nest_service("/static", static_dir)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

pub async fn run(config: DashboardConfig) -> Result<(), Box<dyn std::error::Error>> {
    let generator = config.text_generator()?;
    let addr = config.bind_addr();
    let state = Arc::new(AppState::new(config, generator)?);
    let app = router(state);

    let listener = TcpListener::bind(&addr).await?;
    log::info!("listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Resolve the caller's session, starting a new one when the cookie is
/// missing or stale
fn session(state: &AppState, jar: CookieJar) -> (CookieJar, String) {
    if let Some(id) = jar.get(SESSION_COOKIE).map(|c| c.value().to_owned()) {
        if state.sessions.touch(&id) {
            return (jar, id);
        }
    }
    let id = state.sessions.create();
    log::debug!("started session {}", id);
    let cookie = Cookie::build((SESSION_COOKIE, id.clone()))
        .path("/")
        .http_only(true);
    (jar.add(cookie), id)
}

/// Top-to-bottom render of the dashboard for one interaction
fn render_page(
    state: &AppState,
    session_id: &str,
    query: &PageQuery,
    ai: AiOutput,
    upload_error: Option<String>,
) -> Result<Html<String>, ApiError> {
    let sheet = query.sheet();
    let view = query.view();

    let mut page = DashboardPage {
        title: "Estadísticas de Sensores",
        sheet,
        view: view.slug(),
        sheets: EXPECTED_SHEETS
            .into_iter()
            .map(|name| SheetOption {
                name,
                selected: name == sheet,
            })
            .collect(),
        views: View::ALL
            .into_iter()
            .map(|v| ViewOption {
                slug: v.slug(),
                label: v.label(),
                selected: v == view,
            })
            .collect(),
        upload_error,
        conclusion: ai.conclusion,
        comparison: ai.comparison,
        ..DashboardPage::default()
    };

    if let Some(workbook) = state.sessions.workbook(session_id) {
        page.has_workbook = true;
        page.file_name = Some(workbook.file_name.clone());

        if let Some(load) = state.sessions.sheet(session_id, sheet) {
            match load.as_ref() {
                Ok(table) => {
                    log::debug!("rendering {} of sheet '{}' ({} rows)", view, sheet, table.len());
                    let panel = view::compute(table, view)
                        .map_err(|e| e.to_string())
                        .and_then(|data| {
                            view::render(&data, &state.chart_options).map_err(|e| e.to_string())
                        });
                    match panel {
                        Ok(panel) => page.panel = Some(panel),
                        Err(e) => {
                            log::error!("rendering {} failed: {}", view, e);
                            page.warning = Some(format!("No se pudo dibujar la vista: {}", e));
                        }
                    }
                }
                Err(LoadError::MissingTimestampColumn { .. }) => {
                    page.warning = Some(MISSING_FECHA_WARNING.to_string());
                }
                Err(e) => {
                    page.warning = Some(format!("No se pudo leer la hoja '{}': {}", sheet, e));
                }
            }
        }
    }

    Ok(Html(state.templates.render(DASHBOARD_TEMPLATE, &page)?))
}

async fn serve_dashboard(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<PageQuery>,
) -> Result<(CookieJar, Html<String>), ApiError> {
    let (jar, id) = session(&state, jar);
    let html = render_page(&state, &id, &query, AiOutput::default(), None)?;
    Ok((jar, html))
}

async fn upload_workbook(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Result<(CookieJar, Response), ApiError> {
    let (jar, id) = session(&state, jar);
    let mut query = PageQuery::default();
    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut error = None;

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                let name = field.name().unwrap_or_default().to_string();
                match name.as_str() {
                    "archivo" => {
                        let file_name = field
                            .file_name()
                            .filter(|n| !n.is_empty())
                            .unwrap_or("archivo.xlsx")
                            .to_string();
                        match field.bytes().await {
                            Ok(bytes) if !bytes.is_empty() => {
                                upload = Some((file_name, bytes.to_vec()))
                            }
                            Ok(_) => {}
                            Err(e) => error = Some(format!("Error al recibir el archivo: {}", e)),
                        }
                    }
                    "hoja" => query.hoja = field.text().await.ok(),
                    _ => {}
                }
            }
            Ok(None) => break,
            Err(e) => {
                error = Some(format!("Error al recibir el archivo: {}", e));
                break;
            }
        }
    }

    if error.is_none() {
        match upload {
            Some((file_name, bytes)) => {
                let workbook = Workbook::from_bytes(file_name, bytes);
                match workbook.sheet_names() {
                    Ok(sheets) => {
                        log::info!(
                            "session {} uploaded {} ({} bytes, sheets: {})",
                            id,
                            workbook.file_name,
                            workbook.size(),
                            sheets.join(", ")
                        );
                        state.sessions.set_workbook(&id, workbook);
                        let target = format!("/?hoja={}", query.sheet());
                        return Ok((jar, Redirect::to(&target).into_response()));
                    }
                    Err(e) => {
                        error = Some(format!("El archivo no es un Excel válido: {}", e));
                    }
                }
            }
            None => error = Some("No se recibió ningún archivo.".to_string()),
        }
    }

    let html = render_page(&state, &id, &query, AiOutput::default(), error)?;
    Ok((jar, (StatusCode::BAD_REQUEST, html).into_response()))
}

async fn request_conclusion(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(query): Form<PageQuery>,
) -> Result<(CookieJar, Html<String>), ApiError> {
    let (jar, id) = session(&state, jar);

    let conclusion = match state.sessions.sheet(&id, query.sheet()) {
        Some(load) => match load.as_ref() {
            Ok(table) => Some(
                summary::sheet_conclusion(state.generator.as_deref(), table)
                    .await
                    .into(),
            ),
            // The page shows the load problem as a warning instead
            Err(_) => None,
        },
        None => None,
    };

    let ai = AiOutput {
        conclusion,
        comparison: None,
    };
    let html = render_page(&state, &id, &query, ai, None)?;
    Ok((jar, html))
}

async fn request_comparison(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(query): Form<PageQuery>,
) -> Result<(CookieJar, Html<String>), ApiError> {
    let (jar, id) = session(&state, jar);

    let comparison = match state.sessions.workbook(&id) {
        Some(workbook) => Some(
            summary::sheet_comparison(state.generator.as_deref(), &workbook)
                .await
                .into(),
        ),
        None => None,
    };

    let ai = AiOutput {
        conclusion: None,
        comparison,
    };
    let html = render_page(&state, &id, &query, ai, None)?;
    Ok((jar, html))
}

/// Aggregate of `view` over the session's current sheet, or the reason
/// there is none
fn compute_view(
    state: &AppState,
    session_id: &str,
    view: &str,
    hoja: Option<String>,
) -> Result<(View, &'static str, ViewData), ApiError> {
    let view: View = view.parse().map_err(ApiError::BadRequest)?;
    let query = PageQuery { hoja, vista: None };
    let sheet = query.sheet();
    let load = state
        .sessions
        .sheet(session_id, sheet)
        .ok_or_else(|| ApiError::NotFound("no workbook uploaded".to_string()))?;
    let table = match load.as_ref() {
        Ok(table) => table,
        Err(LoadError::MissingTimestampColumn { .. }) => {
            return Err(ApiError::UnprocessableEntity(MISSING_FECHA_WARNING.to_string()));
        }
        Err(e) => return Err(ApiError::UnprocessableEntity(e.to_string())),
    };
    Ok((view, sheet, view::compute(table, view)?))
}

async fn get_view_data(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(view): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<(CookieJar, Json<ViewData>), ApiError> {
    let (jar, id) = session(&state, jar);
    let (_, _, data) = compute_view(&state, &id, &view, query.hoja)?;
    Ok((jar, Json(data)))
}

async fn export_view(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(view): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<(CookieJar, Response), ApiError> {
    let (jar, id) = session(&state, jar);
    let format: ExportFormat = query
        .format
        .as_deref()
        .unwrap_or("csv")
        .parse()
        .map_err(ApiError::BadRequest)?;
    let (view, sheet, data) = compute_view(&state, &id, &view, query.hoja)?;

    let body = downloader::export(&data, view, format)?;
    let disposition = format!(
        "attachment; filename=\"{}_{}.{}\"",
        sheet,
        view.slug(),
        format.extension()
    );
    let response = (
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response();
    Ok((jar, response))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "sessions": state.sessions.len(),
        "ai_enabled": state.generator.is_some(),
    }))
}
