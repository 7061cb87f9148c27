// Dotação Form - Web Server
// One form session per browser tab, served over a JSON API with Axum

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use dotacao_form::{
    format_date, init_tracing, parse_date, startup_report, AppConfig, AppContext, DotacaoError, Feedback, Field,
    FlowState, Selection, Session,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

/// Sessions untouched for this long are dropped when a new one opens
const SESSION_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

struct SessionSlot {
    session: Arc<Mutex<Session>>,
    last_seen: Instant,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    ctx: Arc<AppContext>,
    sessions: Arc<RwLock<HashMap<String, SessionSlot>>>,
    idle_ttl: Duration,
}

impl AppState {
    fn new(ctx: AppContext) -> Self {
        Self::with_idle_ttl(ctx, SESSION_IDLE_TTL)
    }

    fn with_idle_ttl(ctx: AppContext, idle_ttl: Duration) -> Self {
        Self {
            ctx: Arc::new(ctx),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_ttl,
        }
    }

    /// Look up a session and mark it as used
    async fn session(&self, id: &str) -> Option<Arc<Mutex<Session>>> {
        let mut sessions = self.sessions.write().await;
        let slot = sessions.get_mut(id)?;
        slot.last_seen = Instant::now();
        Some(slot.session.clone())
    }

    /// Register a new session, dropping the idle ones first
    async fn open(&self, id: &str, session: Session) {
        let mut sessions = self.sessions.write().await;

        let before = sessions.len();
        sessions.retain(|_, slot| slot.last_seen.elapsed() < self.idle_ttl);
        if sessions.len() < before {
            tracing::debug!(evicted = before - sessions.len(), "idle sessions dropped");
        }

        sessions.insert(
            id.to_string(),
            SessionSlot {
                session: Arc::new(Mutex::new(session)),
                last_seen: Instant::now(),
            },
        );
    }

    async fn close(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(Self {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }
}

fn api_error(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message),
        }),
    )
        .into_response()
}

fn session_not_found(id: &str) -> Response {
    api_error(StatusCode::NOT_FOUND, format!("Sessão não encontrada: {}", id))
}

/// Everything the page needs to redraw the form
#[derive(Debug, Serialize)]
struct SessionView {
    id: String,
    state: FlowState,
    selection: Selection,
    units: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    budget_lines: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sequential_codes: Option<Vec<i64>>,
    amount: String,
    date: Option<String>,
    feedback: Option<Feedback>,
}

impl SessionView {
    fn of(id: &str, session: &Session) -> Self {
        let state = session.state();
        Self {
            id: id.to_string(),
            state,
            selection: session.selection().clone(),
            units: session.unit_options(),
            budget_lines: (state != FlowState::NoUnit).then(|| session.budget_line_options()),
            sequential_codes: (state == FlowState::BudgetLineChosen)
                .then(|| session.sequential_code_options()),
            amount: session.amount_text().to_string(),
            date: session.date().map(format_date),
            feedback: session.feedback().cloned(),
        }
    }
}

#[derive(Deserialize)]
struct SelectRequest {
    field: Field,
    #[serde(default)]
    value: String,
}

#[derive(Deserialize)]
struct SubmitRequest {
    #[serde(default)]
    amount: String,
    #[serde(default)]
    date: String,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    ApiResponse::ok(state.ctx.spreadsheet_title().to_string())
}

/// POST /api/sessions - Open a fresh form
async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    let id = Uuid::new_v4().to_string();
    let session = state.ctx.new_session();
    let view = SessionView::of(&id, &session);

    state.open(&id, session).await;
    tracing::debug!(session = %id, "session opened");

    ApiResponse::ok(view)
}

/// DELETE /api/sessions/:id - Drop a form when its tab goes away
async fn close_session(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    if state.close(&id).await {
        tracing::debug!(session = %id, "session closed");
        ApiResponse::ok(id)
    } else {
        session_not_found(&id)
    }
}

/// GET /api/sessions/:id - Current form state
async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let Some(session) = state.session(&id).await else {
        return session_not_found(&id);
    };

    let session = session.lock().await;
    ApiResponse::ok(SessionView::of(&id, &session))
}

/// POST /api/sessions/:id/select - Pick a unit, budget line or code
async fn select_option(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SelectRequest>,
) -> impl IntoResponse {
    let Some(session) = state.session(&id).await else {
        return session_not_found(&id);
    };

    let mut session = session.lock().await;
    match session.select(req.field, &req.value) {
        Ok(()) => ApiResponse::ok(SessionView::of(&id, &session)),
        Err(e) => api_error(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

/// POST /api/sessions/:id/submit - Validate and append to the ledger
async fn submit_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SubmitRequest>,
) -> impl IntoResponse {
    let Some(session) = state.session(&id).await else {
        return session_not_found(&id);
    };

    let date = match req.date.trim() {
        "" => None,
        text => match parse_date(text) {
            Ok(date) => Some(date),
            Err(e) => return api_error(StatusCode::BAD_REQUEST, e.to_string()),
        },
    };

    // Held across the append: one submission per session at a time
    let mut session = session.lock().await;
    session.set_amount_text(&req.amount);
    session.set_date(date);

    let feedback = session.submit(state.ctx.ledger.as_ref()).await;
    if let Feedback::Success(message) = &feedback {
        tracing::info!(session = %id, "{}", message);
    }

    ApiResponse::ok(SessionView::of(&id, &session))
}

/// GET / - Serve index.html
async fn serve_index() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

fn router(state: AppState) -> Router {
    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session).delete(close_session))
        .route("/sessions/:id/select", post(select_option))
        .route("/sessions/:id/submit", post(submit_form))
        .with_state(state);

    // Build main router
    Router::new()
        .route("/", get(serve_index))
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

fn exit_with(err: &DotacaoError, config_path: &std::path::Path, config: &AppConfig) -> ! {
    for line in startup_report(err, config_path, config) {
        eprintln!("{}", line);
    }
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("dotacao_form=info");

    println!("🌐 Dotação Form - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config_path = AppConfig::default_path();
    let config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => exit_with(&e, &config_path, &AppConfig::default()),
    };
    let addr = config.bind_address.clone();

    let report_config = config.clone();
    let ctx = match AppContext::connect(config).await {
        Ok(ctx) => ctx,
        Err(e) => exit_with(&e, &config_path, &report_config),
    };
    println!("✓ Conectado à planilha: {}", ctx.spreadsheet_title());

    let app = router(AppState::new(ctx));

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/health", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use dotacao_form::{CellValue, MemoryBackend, ReferenceRow, ReferenceTable};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn state() -> (AppState, Arc<MemoryBackend>) {
        let config = AppConfig::default();
        let backend = Arc::new(
            MemoryBackend::new().with_spreadsheet(&config.ledger.spreadsheet_id, "Controle SMO"),
        );
        let table = Arc::new(ReferenceTable::from_rows(vec![
            ReferenceRow::new("SEDUC", "12.361.0001", 1),
            ReferenceRow::new("SEDUC", "12.361.0001", 3),
            ReferenceRow::new("SESAU", "10.301.0002", 2),
        ]));
        let ctx = AppContext::with_backend(config, table, backend.clone())
            .await
            .unwrap();
        (AppState::new(ctx), backend)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(b) => request.body(Body::from(b.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn open(app: &Router) -> String {
        let (status, body) = call(app, "POST", "/api/sessions", None).await;
        assert_eq!(status, StatusCode::OK);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _) = state().await;
        let app = router(state);

        let (status, body) = call(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], "Controle SMO");
    }

    #[tokio::test]
    async fn test_new_session_shows_units_only() {
        let (state, _) = state().await;
        let app = router(state);

        let (_, body) = call(&app, "POST", "/api/sessions", None).await;
        let view = &body["data"];
        assert_eq!(view["state"], "no_unit");
        assert_eq!(view["units"], json!(["SEDUC", "SESAU"]));
        assert!(view.get("budget_lines").is_none());
        assert!(view["date"].is_string());
    }

    #[tokio::test]
    async fn test_full_submission() {
        let (state, backend) = state().await;
        let app = router(state);
        let id = open(&app).await;
        let base = format!("/api/sessions/{}", id);

        let (_, body) = call(
            &app,
            "POST",
            &format!("{}/select", base),
            Some(json!({"field": "unit", "value": "SEDUC"})),
        )
        .await;
        assert_eq!(body["data"]["state"], "unit_chosen");
        assert_eq!(body["data"]["budget_lines"], json!(["12.361.0001"]));

        call(
            &app,
            "POST",
            &format!("{}/select", base),
            Some(json!({"field": "budget_line", "value": "12.361.0001"})),
        )
        .await;
        let (_, body) = call(
            &app,
            "POST",
            &format!("{}/select", base),
            Some(json!({"field": "sequential_code", "value": "3"})),
        )
        .await;
        assert_eq!(body["data"]["sequential_codes"], json!([1, 3]));
        assert_eq!(body["data"]["selection"]["sequential_code"], 3);

        let (status, body) = call(
            &app,
            "POST",
            &format!("{}/submit", base),
            Some(json!({"amount": "1.234,56", "date": "20/05/2024"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["feedback"]["kind"], "success");

        let rows = backend.rows(&AppConfig::default().ledger.spreadsheet_id, "Registros");
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[1],
            vec![
                CellValue::from("20/05/2024"),
                CellValue::from("SEDUC"),
                CellValue::from("12.361.0001"),
                CellValue::Integer(3),
                CellValue::from("R$ 1.234,56"),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_amount_is_warning() {
        let (state, backend) = state().await;
        let app = router(state);
        let id = open(&app).await;
        let base = format!("/api/sessions/{}", id);

        for (field, value) in [("unit", "SESAU"), ("budget_line", "10.301.0002"), ("sequential_code", "2")] {
            call(
                &app,
                "POST",
                &format!("{}/select", base),
                Some(json!({"field": field, "value": value})),
            )
            .await;
        }

        let (_, body) = call(
            &app,
            "POST",
            &format!("{}/submit", base),
            Some(json!({"amount": "", "date": "20/05/2024"})),
        )
        .await;
        assert_eq!(body["data"]["feedback"]["kind"], "warning");
        assert_eq!(body["data"]["feedback"]["message"], "Por favor, preencha o valor.");
        assert_eq!(
            backend.rows(&AppConfig::default().ledger.spreadsheet_id, "Registros").len(),
            1
        );
    }

    #[tokio::test]
    async fn test_unknown_option_is_bad_request() {
        let (state, _) = state().await;
        let app = router(state);
        let id = open(&app).await;

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/sessions/{}/select", id),
            Some(json!({"field": "unit", "value": "SEFAZ"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("SEFAZ"));
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let (state, _) = state().await;
        let app = router(state);

        let (status, _) = call(&app, "GET", "/api/sessions/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_closed_session_is_gone() {
        let (state, _) = state().await;
        let app = router(state.clone());
        let id = open(&app).await;

        let (status, _) = call(&app, "DELETE", &format!("/api/sessions/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.sessions.read().await.is_empty());

        let (status, _) = call(&app, "GET", &format!("/api/sessions/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, "DELETE", &format!("/api/sessions/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted_on_open() {
        let config = AppConfig::default();
        let backend = Arc::new(
            MemoryBackend::new().with_spreadsheet(&config.ledger.spreadsheet_id, "Controle SMO"),
        );
        let table = Arc::new(ReferenceTable::from_rows(vec![ReferenceRow::new("SEDUC", "A", 1)]));
        let ctx = AppContext::with_backend(config, table, backend).await.unwrap();
        let state = AppState::with_idle_ttl(ctx, Duration::ZERO);
        let app = router(state.clone());

        let first = open(&app).await;
        let second = open(&app).await;

        let sessions = state.sessions.read().await;
        assert_eq!(sessions.len(), 1);
        assert!(sessions.contains_key(&second));
        assert!(!sessions.contains_key(&first));
    }

    #[tokio::test]
    async fn test_active_sessions_survive_new_opens() {
        let (state, _) = state().await;
        let app = router(state.clone());

        let ids = [open(&app).await, open(&app).await, open(&app).await];

        for id in &ids {
            let (status, _) = call(&app, "GET", &format!("/api/sessions/{}", id), None).await;
            assert_eq!(status, StatusCode::OK);
        }
        assert_eq!(state.sessions.read().await.len(), 3);
    }

    #[tokio::test]
    async fn test_sessions_do_not_share_picks() {
        let (state, _) = state().await;
        let app = router(state);
        let first = open(&app).await;
        let second = open(&app).await;

        call(
            &app,
            "POST",
            &format!("/api/sessions/{}/select", first),
            Some(json!({"field": "unit", "value": "SEDUC"})),
        )
        .await;

        let (_, body) = call(&app, "GET", &format!("/api/sessions/{}", second), None).await;
        assert_eq!(body["data"]["state"], "no_unit");
        assert!(body["data"]["selection"]["unit"].is_null());
    }
}
