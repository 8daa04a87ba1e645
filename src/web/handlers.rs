//! HTTP handlers for the relay API.

use super::AppState;
use crate::error::UsageError;
use crate::relay::{RelayController, WriteOutcome};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info};

/// Failure reported to HTTP clients.
#[derive(Debug)]
pub enum ApiError {
    /// Bad relay identifier: 404
    Usage(UsageError),
    /// Anything else: 500
    Internal(String),
}

impl From<UsageError> for ApiError {
    fn from(e: UsageError) -> Self {
        ApiError::Usage(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Usage(e) => {
                info!("Rejected request: {}", e);
                StatusCode::NOT_FOUND
            }
            ApiError::Internal(e) => {
                error!("Request failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "msg": "error" }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn success() -> Json<serde_json::Value> {
    Json(json!({ "msg": "success" }))
}

fn parse_relay(raw: &str) -> Result<usize, UsageError> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| UsageError::NotAnInteger(raw.to_string()))
}

/// Run a controller call on the blocking pool.
async fn run_blocking<T, F>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&RelayController) -> T + Send + 'static,
    T: Send + 'static,
{
    let controller = state.controller.clone();
    tokio::task::spawn_blocking(move || f(&controller))
        .await
        .map_err(|e| ApiError::Internal(format!("controller task failed: {}", e)))
}

fn written(outcome: WriteOutcome) -> ApiResult<Json<serde_json::Value>> {
    match outcome {
        WriteOutcome::Released => Err(ApiError::Internal("controller is shutting down".into())),
        _ => Ok(success()),
    }
}

/// `"1"` when the relay is on, `"0"` when off.
pub async fn relay_status(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ApiResult<&'static str> {
    let relay = parse_relay(&raw)?;
    let on = run_blocking(&state, move |c| c.status(relay)).await??;
    debug!(relay, on, "Relay status");
    Ok(if on { "1" } else { "0" })
}

pub async fn relay_on(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let relay = parse_relay(&raw)?;
    written(run_blocking(&state, move |c| c.on(relay)).await??)
}

pub async fn relay_off(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let relay = parse_relay(&raw)?;
    written(run_blocking(&state, move |c| c.off(relay)).await??)
}

pub async fn relay_toggle(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let relay = parse_relay(&raw)?;
    written(run_blocking(&state, move |c| c.toggle(relay)).await??)
}

/// Off, wait the configured reboot delay, on.
pub async fn relay_reboot(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let relay = parse_relay(&raw)?;
    let delay = state.reboot_delay;
    written(run_blocking(&state, move |c| c.reboot(relay, delay)).await??)
}

/// Turn every active channel on.
pub async fn all_on(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let report = run_blocking(&state, |c| c.all_on(&c.active_ports())).await?;
    if report.interrupted {
        return Err(ApiError::Internal("bulk operation interrupted".into()));
    }
    Ok(success())
}

/// Turn every active channel off.
pub async fn all_off(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let report = run_blocking(&state, |c| c.all_off(&c.active_ports())).await?;
    if report.interrupted {
        return Err(ApiError::Internal("bulk operation interrupted".into()));
    }
    Ok(success())
}

#[derive(Debug, Serialize)]
struct ChannelView {
    channel: usize,
    name: String,
    pin: Option<u32>,
    active: bool,
    on: bool,
}

/// Every channel with its cached state, plus the backend in use.
pub async fn list_channels(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let channels = run_blocking(&state, |c| c.channels()).await?;
    let views: Vec<ChannelView> = channels
        .into_iter()
        .map(|c| ChannelView {
            channel: c.number,
            name: c.name,
            pin: c.port,
            active: c.active,
            on: c.state.is_on(),
        })
        .collect();

    Ok(Json(json!({
        "name": &*state.name,
        "backend": state.controller.backend_kind(),
        "channels": views,
    })))
}

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "pi-relay",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.controller.backend_kind(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Custom dashboard from the static directory, or the built-in one.
pub async fn index(State(state): State<AppState>) -> Result<Html<String>, StatusCode> {
    let Some(path) = &state.index_file else {
        return Ok(Html(render_default_index(&state.name)));
    };

    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Html(content)),
        Err(e) => {
            error!("Failed to read {}: {}", path.display(), e);
            Err(StatusCode::NOT_FOUND)
        }
    }
}

fn render_default_index(name: &str) -> String {
    DEFAULT_INDEX_HTML.replace("{{name}}", &escape_html(name))
}

/// Escape text for use inside HTML element content.
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Built-in dashboard. Channels are loaded from `/api/channels`.
const DEFAULT_INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{{name}}</title>
    <style>
        * { margin: 0; padding: 0; box-sizing: border-box; }

        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: #1f2430;
            color: #e6e6e6;
            min-height: 100vh;
            padding: 20px;
        }

        .container { max-width: 960px; margin: 0 auto; }

        .header { text-align: center; margin-bottom: 30px; }
        .header h1 { font-size: 2.2rem; margin-bottom: 8px; }
        .header p { opacity: 0.7; }

        .toolbar { display: flex; gap: 10px; justify-content: center; margin-bottom: 25px; }

        .grid {
            display: grid;
            grid-template-columns: repeat(auto-fill, minmax(200px, 1fr));
            gap: 15px;
        }

        .card {
            background: #2a3040;
            border-radius: 10px;
            padding: 18px;
            border-left: 6px solid #555;
        }
        .card.on { border-left-color: #3ecf6e; }
        .card.inactive { opacity: 0.4; }
        .card h3 { font-size: 1.1rem; margin-bottom: 12px; }

        button {
            background: #3b4256;
            color: #fff;
            border: none;
            border-radius: 6px;
            padding: 8px 12px;
            cursor: pointer;
        }
        button:hover { background: #4d5670; }
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>{{name}}</h1>
            <p id="backend">Loading...</p>
        </div>
        <div class="toolbar">
            <button onclick="bulk('all_on')">All on</button>
            <button onclick="bulk('all_off')">All off</button>
        </div>
        <div class="grid" id="channels"></div>
    </div>

    <script>
        async function refresh() {
            const res = await fetch('/api/channels');
            if (!res.ok) return;
            const data = await res.json();
            document.getElementById('backend').textContent = 'Backend: ' + data.backend;
            const grid = document.getElementById('channels');
            grid.replaceChildren();
            for (const ch of data.channels) {
                const card = document.createElement('div');
                card.className = 'card' + (ch.on ? ' on' : '') + (ch.active ? '' : ' inactive');
                const title = document.createElement('h3');
                title.textContent = `${ch.channel}. ${ch.name}`;
                card.appendChild(title);
                for (const action of ['on', 'off', 'toggle']) {
                    const btn = document.createElement('button');
                    btn.textContent = action;
                    btn.disabled = !ch.active;
                    btn.onclick = () => act(action, ch.channel);
                    card.appendChild(btn);
                    card.appendChild(document.createTextNode(' '));
                }
                grid.appendChild(card);
            }
        }

        async function act(action, channel) {
            await fetch(`/${action}/${channel}`);
            refresh();
        }

        async function bulk(action) {
            await fetch(`/${action}/`);
            refresh();
        }

        refresh();
        setInterval(refresh, 5000);
    </script>
</body>
</html>
"#;
