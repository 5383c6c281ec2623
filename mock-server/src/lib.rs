//! In-memory FHIR search server for exercising the query client.
//!
//! Serves seeded `Patient` and `Observation` resources as paginated
//! `searchset` bundles. Next links are relative to the FHIR base
//! (`/Patient?...`), which is what the client has to merge onto `/fhir`.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use axum::{
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use url::form_urlencoded;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: usize = 2;

/// Behaviour switches for one server instance.
#[derive(Clone, Debug, Default)]
pub struct MockConfig {
    /// Static bearer token accepted on search routes.
    pub bearer_token: Option<String>,
    /// Username and password accepted by `/auth/login`.
    pub credentials: Option<(String, String)>,
    /// Size of a generated narrative attached to every returned resource.
    pub narrative_bytes: Option<usize>,
}

impl MockConfig {
    fn requires_auth(&self) -> bool {
        self.bearer_token.is_some() || self.credentials.is_some()
    }
}

pub struct AppState {
    config: MockConfig,
    resources: HashMap<String, Vec<Value>>,
    issued_tokens: RwLock<HashSet<String>>,
}

pub type Shared = Arc<AppState>;

pub fn app() -> Router {
    app_with(MockConfig::default())
}

pub fn app_with(config: MockConfig) -> Router {
    let state: Shared = Arc::new(AppState {
        config,
        resources: seed(),
        issued_tokens: RwLock::new(HashSet::new()),
    });
    Router::new()
        .route("/fhir/{resource_type}", get(search_get))
        .route("/fhir/{resource_type}/_search", post(search_post))
        .route("/auth/login", get(login))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with(listener, MockConfig::default()).await
}

pub async fn run_with(listener: TcpListener, config: MockConfig) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(config)).await
}

/// Five patients and three observations.
pub fn seed() -> HashMap<String, Vec<Value>> {
    let families = ["Smith", "Jones", "Smith", "Brown", "Garcia"];
    let patients: Vec<Value> = families
        .iter()
        .enumerate()
        .map(|(i, family)| {
            json!({
                "resourceType": "Patient",
                "id": format!("p{}", i + 1),
                "gender": if i % 2 == 0 { "female" } else { "male" },
                "family": family,
            })
        })
        .collect();
    let observations: Vec<Value> = (1..=3)
        .map(|i| {
            json!({
                "resourceType": "Observation",
                "id": format!("o{i}"),
                "status": "final",
                "subject": format!("Patient/p{i}"),
            })
        })
        .collect();

    HashMap::from([
        ("Patient".to_string(), patients),
        ("Observation".to_string(), observations),
    ])
}

async fn search_get(
    State(state): State<Shared>,
    Path(resource_type): Path<String>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    if let Err(status) = authorize(&state, &headers).await {
        return outcome(status, "security", "missing or invalid bearer token");
    }
    let params = parse_params(query.as_deref().unwrap_or_default());
    search(&state, &resource_type, &params)
}

async fn search_post(
    State(state): State<Shared>,
    Path(resource_type): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if let Err(status) = authorize(&state, &headers).await {
        return outcome(status, "security", "missing or invalid bearer token");
    }
    let query: Option<String> = match serde_json::from_str(&body) {
        Ok(query) => query,
        Err(e) => return outcome(StatusCode::BAD_REQUEST, "invalid", &e.to_string()),
    };
    let params = parse_params(query.as_deref().unwrap_or_default());
    search(&state, &resource_type, &params)
}

async fn login(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let Some((username, password)) = &state.config.credentials else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let expected = format!("{username}:{password}");
    let supplied = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|v| STANDARD.decode(v).ok())
        .and_then(|raw| String::from_utf8(raw).ok());
    if supplied.as_deref() != Some(expected.as_str()) {
        tracing::debug!("rejected login");
        return (StatusCode::UNAUTHORIZED, "invalid credentials").into_response();
    }

    let token = Uuid::new_v4().to_string();
    state.issued_tokens.write().await.insert(token.clone());
    tracing::info!("issued login token");
    (StatusCode::OK, token).into_response()
}

async fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), StatusCode> {
    if !state.config.requires_auth() {
        return Ok(());
    }
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;
    if state.config.bearer_token.as_deref() == Some(token) {
        return Ok(());
    }
    if state.issued_tokens.read().await.contains(token) {
        return Ok(());
    }
    Err(StatusCode::UNAUTHORIZED)
}

pub fn parse_params(query: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .into_owned()
        .collect()
}

fn search(state: &AppState, resource_type: &str, params: &[(String, String)]) -> Response {
    let Some(resources) = state.resources.get(resource_type) else {
        return outcome(
            StatusCode::NOT_FOUND,
            "not-supported",
            &format!("unknown resource type: {resource_type}"),
        );
    };
    match search_page(resource_type, resources, params) {
        Ok(mut bundle) => {
            if let Some(size) = state.config.narrative_bytes {
                attach_narrative(&mut bundle, size);
            }
            let headers = [(header::CONTENT_TYPE, "application/fhir+json")];
            (headers, Json(bundle)).into_response()
        }
        Err(message) => outcome(StatusCode::BAD_REQUEST, "invalid", &message),
    }
}

fn attach_narrative(bundle: &mut Value, size: usize) {
    let div = format!(
        "<div xmlns=\"http://www.w3.org/1999/xhtml\">{}</div>",
        "x".repeat(size)
    );
    let Some(entries) = bundle["entry"].as_array_mut() else {
        return;
    };
    for entry in entries {
        entry["resource"]["text"] = json!({"status": "generated", "div": div});
    }
}

/// Filter `resources` by the non-underscore params and cut out the requested
/// page. `_count` sets the page size and `page` is 1-based.
pub fn search_page(
    resource_type: &str,
    resources: &[Value],
    params: &[(String, String)],
) -> Result<Value, String> {
    let mut count = DEFAULT_PAGE_SIZE;
    let mut page = 1usize;
    let mut filters = Vec::new();
    for (key, value) in params {
        match key.as_str() {
            "_count" => {
                count = value
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| format!("invalid _count: {value}"))?;
            }
            "page" => {
                page = value
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| format!("invalid page: {value}"))?;
            }
            k if k.starts_with('_') => {}
            _ => filters.push((key.as_str(), value.as_str())),
        }
    }

    let matched: Vec<&Value> = resources
        .iter()
        .filter(|r| {
            filters
                .iter()
                .all(|(k, v)| r.get(*k).and_then(Value::as_str) == Some(*v))
        })
        .collect();

    let start = (page - 1).saturating_mul(count);
    let entry: Vec<Value> = matched
        .iter()
        .skip(start)
        .take(count)
        .map(|r| {
            let id = r["id"].as_str().unwrap_or_default();
            json!({"fullUrl": format!("{resource_type}/{id}"), "resource": r})
        })
        .collect();

    let self_url = page_link(resource_type, &filters, count, page);
    let mut link = vec![json!({"relation": "self", "url": self_url})];
    if start + count < matched.len() {
        let next_url = page_link(resource_type, &filters, count, page + 1);
        link.push(json!({"relation": "next", "url": next_url}));
    }

    Ok(json!({
        "resourceType": "Bundle",
        "type": "searchset",
        "total": matched.len(),
        "link": link,
        "entry": entry,
    }))
}

fn page_link(resource_type: &str, filters: &[(&str, &str)], count: usize, page: usize) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in filters {
        serializer.append_pair(key, value);
    }
    serializer.append_pair("_count", &count.to_string());
    serializer.append_pair("page", &page.to_string());
    format!("/{resource_type}?{}", serializer.finish())
}

fn outcome(status: StatusCode, code: &str, diagnostics: &str) -> Response {
    let body = json!({
        "resourceType": "OperationOutcome",
        "issue": [{"severity": "error", "code": code, "diagnostics": diagnostics}],
    });
    (status, Json(body)).into_response()
}
