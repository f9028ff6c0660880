#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{Value, json};

use promptbox::prompts::PromptRecord;

/// Bind an ephemeral port, build the router knowing its own base URL, and
/// serve it in the background.
pub async fn serve(make: impl FnOnce(String) -> Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let router = make(base.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    base
}

/// A base URL nothing is listening on.
pub async fn dead_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    base
}

pub fn record(title: &str, content: &str) -> PromptRecord {
    PromptRecord::new(title, content, "", Utc::now())
}

// --- Fake GitHub gist API ---

pub const GIST_TOKEN: &str = "ghp_test";

#[derive(Default)]
pub struct FakeGithub {
    pub gists: HashMap<String, HashMap<String, String>>,
    pub requests: Vec<(String, String)>,
    pub auth_headers: Vec<String>,
    next_id: u32,
}

pub type GithubState = Arc<Mutex<FakeGithub>>;

fn record_request(state: &GithubState, method: &str, path: String, headers: &HeaderMap) {
    let mut fake = state.lock().unwrap();
    fake.requests.push((method.to_string(), path));
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    fake.auth_headers.push(auth);
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("authorization").and_then(|v| v.to_str().ok())
        == Some(format!("token {GIST_TOKEN}").as_str())
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "Bad credentials" })),
    )
        .into_response()
}

fn gist_body(id: &str, files: &HashMap<String, String>) -> Value {
    let files: serde_json::Map<String, Value> = files
        .iter()
        .map(|(name, content)| {
            (
                name.clone(),
                json!({ "filename": name, "content": content, "truncated": false }),
            )
        })
        .collect();
    json!({
        "id": id,
        "html_url": format!("https://gist.github.com/{id}"),
        "updated_at": "2024-05-01T10:00:00Z",
        "files": files,
    })
}

fn files_from(body: &Value) -> HashMap<String, String> {
    body["files"]
        .as_object()
        .map(|files| {
            files
                .iter()
                .filter_map(|(name, file)| {
                    file["content"].as_str().map(|c| (name.clone(), c.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

async fn create_gist(
    State(state): State<GithubState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    record_request(&state, "POST", "/gists".into(), &headers);
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut fake = state.lock().unwrap();
    fake.next_id += 1;
    let id = format!("gist-{}", fake.next_id);
    let files = files_from(&body);
    let response = gist_body(&id, &files);
    fake.gists.insert(id, files);
    (StatusCode::CREATED, Json(response)).into_response()
}

async fn update_gist(
    State(state): State<GithubState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    record_request(&state, "PATCH", format!("/gists/{id}"), &headers);
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut fake = state.lock().unwrap();
    let Some(files) = fake.gists.get_mut(&id) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "message": "Not Found" }))).into_response();
    };
    files.extend(files_from(&body));
    let response = gist_body(&id, files);
    Json(response).into_response()
}

async fn get_gist(
    State(state): State<GithubState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    record_request(&state, "GET", format!("/gists/{id}"), &headers);
    if !authorized(&headers) {
        return unauthorized();
    }
    let fake = state.lock().unwrap();
    match fake.gists.get(&id) {
        Some(files) => Json(gist_body(&id, files)).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "message": "Not Found" }))).into_response(),
    }
}

async fn get_user(State(state): State<GithubState>, headers: HeaderMap) -> Response {
    record_request(&state, "GET", "/user".into(), &headers);
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({ "login": "octocat" })).into_response()
}

pub fn github_router(state: GithubState) -> Router {
    Router::new()
        .route("/gists", post(create_gist))
        .route("/gists/{id}", get(get_gist).patch(update_gist))
        .route("/user", get(get_user))
        .with_state(state)
}

// --- Fake sync server ---

pub const API_KEY: &str = "k1";

#[derive(Default)]
pub struct FakeSyncServer {
    /// Every accepted upload per user, oldest first: (version, prompts).
    pub uploads: HashMap<String, Vec<(i64, Value)>>,
    pub healthy: bool,
}

pub type SyncServerState = Arc<Mutex<FakeSyncServer>>;

fn bearer_ok(headers: &HeaderMap) -> bool {
    headers.get("authorization").and_then(|v| v.to_str().ok())
        == Some(format!("Bearer {API_KEY}").as_str())
}

fn token_required() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "token required" }))).into_response()
}

async fn post_sync(
    State(state): State<SyncServerState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !bearer_ok(&headers) {
        return token_required();
    }
    let Some(prompts) = body["prompts"].as_array().cloned() else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "prompts must be an array" })))
            .into_response();
    };
    let user = body["userId"].as_str().unwrap_or_default().to_string();
    let mut server = state.lock().unwrap();
    let log = server.uploads.entry(user).or_default();
    let version = log.last().map(|(v, _)| v + 1).unwrap_or(1);
    let count = prompts.len();
    log.push((version, Value::Array(prompts)));
    Json(json!({
        "success": true,
        "version": version,
        "message": format!("synced {count} prompts"),
    }))
    .into_response()
}

async fn get_prompts(
    State(state): State<SyncServerState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !bearer_ok(&headers) {
        return token_required();
    }
    let server = state.lock().unwrap();
    match server.uploads.get(&user_id).and_then(|log| log.last()) {
        Some((version, prompts)) => Json(json!({
            "prompts": prompts,
            "version": version,
            "updated_at": "2024-05-01T10:00:00Z",
        }))
        .into_response(),
        None => Json(json!({ "prompts": [], "version": 0, "updated_at": null })).into_response(),
    }
}

async fn health(State(state): State<SyncServerState>) -> Response {
    if state.lock().unwrap().healthy {
        Json(json!({ "status": "ok" })).into_response()
    } else {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    }
}

async fn sync_history(State(state): State<SyncServerState>, headers: HeaderMap) -> Response {
    if !bearer_ok(&headers) {
        return token_required();
    }
    let server = state.lock().unwrap();
    let mut rows: Vec<Value> = server
        .uploads
        .values()
        .flatten()
        .map(|(version, _)| json!({ "version": version, "updated_at": "2024-05-01T10:00:00Z" }))
        .collect();
    rows.reverse();
    Json(Value::Array(rows)).into_response()
}

pub fn sync_server_router(state: SyncServerState) -> Router {
    Router::new()
        .route("/api/sync", post(post_sync))
        .route("/api/prompts/{user_id}", get(get_prompts))
        .route("/api/health", get(health))
        .route("/api/sync/history", get(sync_history))
        .with_state(state)
}
