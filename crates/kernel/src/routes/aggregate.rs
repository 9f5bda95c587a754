//! Aggregate API routes.
//!
//! Read-only endpoints: other methods on these paths get 405.

use axum::Router;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, Uri, header};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use serde_json::Value;
use tracing::debug;

use crate::aggregate::{OutputFormat, RequestContext, ViewSummary};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Template used for HTML output when a view declares none.
const DEFAULT_TEMPLATE: &str = "<!DOCTYPE html>\n<html>\n<body>\n<pre>{{ __tera_context }}</pre>\n</body>\n</html>\n";

/// Create the aggregate router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/aggregates", get(list_aggregates))
        .route("/api/aggregate/{view_id}", get(execute_aggregate))
        .route(
            "/api/aggregate/{view_id}/{*args}",
            get(execute_aggregate_with_args),
        )
}

// -------------------------------------------------------------------------
// Handlers
// -------------------------------------------------------------------------

async fn list_aggregates(State(state): State<AppState>) -> Json<Vec<ViewSummary>> {
    Json(state.registry().list())
}

async fn execute_aggregate(
    State(state): State<AppState>,
    Path(view_id): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    uri: Uri,
) -> AppResult<Response> {
    run(&state, &view_id, &[], query, &headers, &uri)
}

async fn execute_aggregate_with_args(
    State(state): State<AppState>,
    Path((view_id, args)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    uri: Uri,
) -> AppResult<Response> {
    let segments: Vec<&str> = args.split('/').filter(|s| !s.is_empty()).collect();
    run(&state, &view_id, &segments, query, &headers, &uri)
}

fn run(
    state: &AppState,
    view_id: &str,
    segments: &[&str],
    query: Option<String>,
    headers: &HeaderMap,
    uri: &Uri,
) -> AppResult<Response> {
    let view = state.registry().get(view_id).ok_or(AppError::NotFound)?;

    let query: Vec<(String, String)> = query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default();

    let mut request = RequestContext::new(format!("{}{}", state.site_url(), uri.path()))
        .with_path_args(segments.iter().copied(), &view.settings().path_args);
    request.query = query;
    request.format = negotiate_format(&request, headers)?;

    debug!(view_id = %view_id, format = ?request.format, "executing aggregate");
    let body = view.list(&request)?;

    match request.format {
        OutputFormat::Json => Ok(Json(body).into_response()),
        OutputFormat::Html => {
            let template = view.settings().template.as_deref().unwrap_or(DEFAULT_TEMPLATE);
            Ok(Html(render_html(template, body)?).into_response())
        }
    }
}

// -------------------------------------------------------------------------
// Helpers
// -------------------------------------------------------------------------

/// `?format=` wins over the Accept header; JSON is the fallback.
fn negotiate_format(request: &RequestContext, headers: &HeaderMap) -> AppResult<OutputFormat> {
    if let Some(raw) = request.query_param("format") {
        return OutputFormat::from_param(raw)
            .ok_or_else(|| AppError::BadRequest(format!("unsupported format '{raw}'")));
    }
    let accepts_html = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"));
    Ok(if accepts_html {
        OutputFormat::Html
    } else {
        OutputFormat::Json
    })
}

/// Render a response body through a Tera template.
///
/// Object bodies become the template context; anything else is exposed as
/// `data`.
fn render_html(template: &str, body: Value) -> anyhow::Result<String> {
    let context = match body {
        Value::Object(_) => tera::Context::from_value(body)?,
        other => {
            let mut context = tera::Context::new();
            context.insert("data", &other);
            context
        }
    };
    Ok(tera::Tera::one_off(template, &context, true)?)
}
