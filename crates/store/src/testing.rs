//! Test doubles for the [`Transport`] seam.
//!
//! [`StaticTransport`] serves canned responses by exact URL and counts
//! hits, for exercising read-only protocol walks. [`InMemoryGitHub`]
//! emulates enough of the contents + git object endpoints to exercise
//! the full [`crate::ContentClient`] protocol, including the
//! `too_large` rejections and sha enforcement.
//!
//! Both implement `Transport` for `&Self` so a test can keep the fake
//! and inspect it after handing a reference to the client.

use std::collections::BTreeMap;
use std::sync::Mutex;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};

use crate::transport::{Method, Request, Response, Transport, TransportError};

// ─── StaticTransport ──────────────────────────────────────────────────────────

/// Serves fixed responses keyed by exact URL; unknown URLs get a 404.
#[derive(Default)]
pub struct StaticTransport {
    routes: BTreeMap<String, (u16, Vec<u8>)>,
    hits: Mutex<BTreeMap<String, u64>>,
}

impl StaticTransport {
    pub fn new() -> StaticTransport {
        StaticTransport::default()
    }

    pub fn route(mut self, url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        self.routes.insert(url.into(), (status, body.into()));
        self
    }

    pub fn route_json(self, url: impl Into<String>, status: u16, body: &Value) -> Self {
        self.route(url, status, body.to_string().into_bytes())
    }

    /// How many times a URL was requested.
    pub fn hits(&self, url: &str) -> u64 {
        self.hits
            .lock()
            .map(|h| h.get(url).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Total requests across all URLs.
    pub fn total_requests(&self) -> u64 {
        self.hits
            .lock()
            .map(|h| h.values().sum())
            .unwrap_or(0)
    }
}

impl Transport for &StaticTransport {
    fn send(&self, request: &Request) -> Result<Response, TransportError> {
        if let Ok(mut hits) = self.hits.lock() {
            *hits.entry(request.url.clone()).or_insert(0) += 1;
        }
        match self.routes.get(&request.url) {
            Some((status, body)) => Ok(Response {
                status: *status,
                body: body.clone(),
            }),
            None => Ok(Response {
                status: 404,
                body: br#"{"message":"Not Found"}"#.to_vec(),
            }),
        }
    }
}

// ─── InMemoryGitHub ───────────────────────────────────────────────────────────

struct FileState {
    content: Vec<u8>,
    sha: String,
}

#[derive(Default)]
struct RepoState {
    files: BTreeMap<String, FileState>,
    blobs: BTreeMap<String, Vec<u8>>,
    /// tree sha -> (path, blob sha) single-entry replacement
    pending_trees: BTreeMap<String, (String, String)>,
    /// commit sha -> tree sha
    pending_commits: BTreeMap<String, String>,
    tip: String,
    counter: u64,
    messages: Vec<String>,
    hits: BTreeMap<String, u64>,
}

/// In-memory emulation of the remote content store.
pub struct InMemoryGitHub {
    state: Mutex<RepoState>,
    /// Documents larger than this are rejected as `too_large` by the
    /// direct contents endpoints (both directions).
    size_limit: Option<usize>,
    /// When set, every sha-carrying write conflicts; exercises the
    /// bounded-retry failure path.
    reject_sha_writes: bool,
    branch_present: bool,
}

impl InMemoryGitHub {
    pub fn new() -> InMemoryGitHub {
        let state = RepoState {
            tip: "commit-0".to_string(),
            ..RepoState::default()
        };
        InMemoryGitHub {
            state: Mutex::new(state),
            size_limit: None,
            reject_sha_writes: false,
            branch_present: true,
        }
    }

    pub fn with_size_limit(mut self, limit: usize) -> Self {
        self.size_limit = Some(limit);
        self
    }

    pub fn rejecting_sha_writes(mut self) -> Self {
        self.reject_sha_writes = true;
        self
    }

    pub fn without_branch(mut self) -> Self {
        self.branch_present = false;
        self
    }

    /// Pre-populate a document.
    pub fn seed(&self, path: &str, content: &[u8]) {
        let mut state = self.lock();
        state.counter += 1;
        let sha = format!("sha-{}", state.counter);
        state.files.insert(
            path.to_string(),
            FileState {
                content: content.to_vec(),
                sha,
            },
        );
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(path).map(|f| f.content.clone())
    }

    pub fn sha(&self, path: &str) -> Option<String> {
        self.lock().files.get(path).map(|f| f.sha.clone())
    }

    pub fn tip(&self) -> String {
        self.lock().tip.clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.lock().messages.clone()
    }

    /// Requests whose URL contains the fragment.
    pub fn request_count(&self, fragment: &str) -> u64 {
        self.lock()
            .hits
            .iter()
            .filter(|(url, _)| url.contains(fragment))
            .map(|(_, count)| count)
            .sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RepoState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn over_limit(&self, len: usize) -> bool {
        self.size_limit.is_some_and(|limit| len > limit)
    }

    fn handle(&self, request: &Request) -> Response {
        let mut state = self.lock();
        *state.hits.entry(request.url.clone()).or_insert(0) += 1;

        // Everything after /repos/{owner}/{repo}/ routes the request.
        let (base, route) = match split_repo_url(&request.url) {
            Some(parts) => parts,
            None => return error(404, "unrecognized url"),
        };

        match (request.method, route) {
            (Method::Get, r) if r.starts_with("contents/") => {
                let path = &r["contents/".len()..];
                match state.files.get(path) {
                    None => error(404, "Not Found"),
                    Some(file) if self.over_limit(file.content.len()) => too_large(),
                    Some(file) => ok(json!({
                        "content": BASE64.encode(&file.content),
                        "sha": file.sha,
                    })),
                }
            }

            (Method::Put, r) if r.starts_with("contents/") => {
                let path = r["contents/".len()..].to_string();
                let payload: Value = match serde_json::from_slice(
                    request.body.as_deref().unwrap_or(&[]),
                ) {
                    Ok(v) => v,
                    Err(_) => return error(400, "bad payload"),
                };
                let content = match payload["content"]
                    .as_str()
                    .and_then(|c| BASE64.decode(c).ok())
                {
                    Some(c) => c,
                    None => return error(400, "bad content"),
                };
                if self.over_limit(content.len()) {
                    return too_large();
                }

                let supplied_sha = payload["sha"].as_str();
                if let Some(existing) = state.files.get(&path) {
                    match supplied_sha {
                        None => {
                            return error(
                                422,
                                "Invalid request.\n\n\"sha\" wasn't supplied.",
                            )
                        }
                        Some(sha) if sha != existing.sha || self.reject_sha_writes => {
                            return error(409, "is at a different sha than supplied")
                        }
                        Some(_) => {}
                    }
                } else if self.reject_sha_writes && supplied_sha.is_some() {
                    return error(409, "is at a different sha than supplied");
                }

                state.counter += 1;
                let content_sha = format!("sha-{}", state.counter);
                let commit_sha = format!("commit-{}", state.counter);
                state.files.insert(
                    path,
                    FileState {
                        content,
                        sha: content_sha.clone(),
                    },
                );
                state.tip = commit_sha.clone();
                if let Some(message) = payload["message"].as_str() {
                    state.messages.push(message.to_string());
                }
                ok(json!({
                    "content": { "sha": content_sha },
                    "commit": { "sha": commit_sha },
                }))
            }

            (Method::Get, r) if r.starts_with("git/trees/") => {
                let entries: Vec<Value> = state
                    .files
                    .iter()
                    .map(|(path, file)| {
                        json!({
                            "path": path,
                            "mode": "100644",
                            "type": "blob",
                            "sha": file.sha,
                            "url": format!("{}/git/blobs/{}", base, file.sha),
                        })
                    })
                    .collect();
                ok(json!({
                    "sha": format!("tree-of-{}", state.tip),
                    "tree": entries,
                }))
            }

            (Method::Get, r) if r.starts_with("git/blobs/") => {
                let sha = &r["git/blobs/".len()..];
                let content = state
                    .files
                    .values()
                    .find(|f| f.sha == sha)
                    .map(|f| f.content.clone())
                    .or_else(|| state.blobs.get(sha).cloned());
                match content {
                    Some(content) => ok(json!({
                        "sha": sha,
                        "content": BASE64.encode(&content),
                    })),
                    None => error(404, "Not Found"),
                }
            }

            (Method::Post, "git/blobs") => {
                let payload: Value =
                    match serde_json::from_slice(request.body.as_deref().unwrap_or(&[])) {
                        Ok(v) => v,
                        Err(_) => return error(400, "bad payload"),
                    };
                let content = match payload["content"]
                    .as_str()
                    .and_then(|c| BASE64.decode(c).ok())
                {
                    Some(c) => c,
                    None => return error(400, "bad content"),
                };
                state.counter += 1;
                let sha = format!("blob-{}", state.counter);
                state.blobs.insert(sha.clone(), content);
                created(json!({ "sha": sha }))
            }

            (Method::Post, "git/trees") => {
                let payload: Value =
                    match serde_json::from_slice(request.body.as_deref().unwrap_or(&[])) {
                        Ok(v) => v,
                        Err(_) => return error(400, "bad payload"),
                    };
                let entry = &payload["tree"][0];
                let (path, sha) = match (entry["path"].as_str(), entry["sha"].as_str()) {
                    (Some(path), Some(sha)) => (path.to_string(), sha.to_string()),
                    _ => return error(400, "bad tree entry"),
                };
                state.counter += 1;
                let tree_sha = format!("tree-{}", state.counter);
                state.pending_trees.insert(tree_sha.clone(), (path, sha));
                created(json!({ "sha": tree_sha }))
            }

            (Method::Post, "git/commits") => {
                let payload: Value =
                    match serde_json::from_slice(request.body.as_deref().unwrap_or(&[])) {
                        Ok(v) => v,
                        Err(_) => return error(400, "bad payload"),
                    };
                let tree_sha = match payload["tree"].as_str() {
                    Some(sha) => sha.to_string(),
                    None => return error(400, "bad tree sha"),
                };
                state.counter += 1;
                let commit_sha = format!("commit-{}", state.counter);
                state.pending_commits.insert(commit_sha.clone(), tree_sha);
                if let Some(message) = payload["message"].as_str() {
                    state.messages.push(message.to_string());
                }
                created(json!({ "sha": commit_sha }))
            }

            (Method::Patch, r) if r.starts_with("git/refs/heads/") => {
                let payload: Value =
                    match serde_json::from_slice(request.body.as_deref().unwrap_or(&[])) {
                        Ok(v) => v,
                        Err(_) => return error(400, "bad payload"),
                    };
                let commit_sha = match payload["sha"].as_str() {
                    Some(sha) => sha.to_string(),
                    None => return error(400, "bad sha"),
                };
                let replacement = state
                    .pending_commits
                    .get(&commit_sha)
                    .and_then(|tree| state.pending_trees.get(tree))
                    .cloned();
                let (path, blob_sha) = match replacement {
                    Some(r) => r,
                    None => return error(422, "unknown commit"),
                };
                let content = match state.blobs.get(&blob_sha) {
                    Some(c) => c.clone(),
                    None => return error(422, "unknown blob"),
                };
                state.files.insert(
                    path,
                    FileState {
                        content,
                        sha: blob_sha,
                    },
                );
                state.tip = commit_sha.clone();
                ok(json!({ "object": { "sha": commit_sha } }))
            }

            (Method::Get, r) if r.starts_with("git/refs/heads/") => {
                if self.branch_present {
                    ok(json!({ "object": { "sha": state.tip } }))
                } else {
                    error(404, "Not Found")
                }
            }

            _ => error(404, "unrecognized route"),
        }
    }
}

impl Default for InMemoryGitHub {
    fn default() -> Self {
        InMemoryGitHub::new()
    }
}

impl Transport for &InMemoryGitHub {
    fn send(&self, request: &Request) -> Result<Response, TransportError> {
        Ok(self.handle(request))
    }
}

// ─── Response helpers ─────────────────────────────────────────────────────────

fn ok(body: Value) -> Response {
    Response {
        status: 200,
        body: body.to_string().into_bytes(),
    }
}

fn created(body: Value) -> Response {
    Response {
        status: 201,
        body: body.to_string().into_bytes(),
    }
}

fn error(status: u16, message: &str) -> Response {
    Response {
        status,
        body: json!({ "message": message }).to_string().into_bytes(),
    }
}

fn too_large() -> Response {
    Response {
        status: 403,
        body: json!({ "errors": [{ "code": "too_large" }] })
            .to_string()
            .into_bytes(),
    }
}

/// Split an API URL into (repo base url, route after the repo).
fn split_repo_url(url: &str) -> Option<(String, &str)> {
    let repos = url.find("/repos/")?;
    let after = &url[repos + "/repos/".len()..];
    let mut segments = after.splitn(3, '/');
    let owner = segments.next()?;
    let repo = segments.next()?;
    let route = segments.next()?;
    let route = route.split('?').next().unwrap_or(route);
    let base_len = repos + "/repos/".len() + owner.len() + 1 + repo.len();
    Some((url[..base_len].to_string(), route))
}
