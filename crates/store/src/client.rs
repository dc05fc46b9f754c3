//! Versioned document client over a GitHub-style contents API.
//!
//! `read`/`write` operate on one path under optimistic concurrency:
//! every successful write replaces the document's opaque sha token.
//! Both directions fall back transparently to the raw git object
//! endpoints when the direct contents endpoint rejects the document
//! as too large; the ref move at the end of the large-write sequence
//! is the visible commit point.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::json;

use crate::error::StoreError;
use crate::transport::{Method, Request, Response, Transport};

/// Root of the live API. Overridable for tests pointed at a fake.
pub const DEFAULT_API_ROOT: &str = "https://api.github.com";

/// Which repository and branch the documents live in.
#[derive(Debug, Clone)]
pub struct RepoLocation {
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

/// Commit author identity attached to writes.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Committer {
    pub name: String,
    pub email: String,
}

// ─── Wire shapes ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ContentResponse {
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
}

#[derive(Deserialize)]
struct WriteResponse {
    content: ObjectSha,
    commit: ObjectSha,
}

#[derive(Deserialize)]
struct ObjectSha {
    sha: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    sha: String,
    tree: Vec<TreeEntry>,
}

#[derive(Deserialize)]
struct TreeEntry {
    path: String,
    url: String,
}

#[derive(Deserialize)]
struct BlobResponse {
    sha: String,
    content: String,
}

#[derive(Deserialize)]
struct RefResponse {
    object: ObjectSha,
}

/// Result of one direct write attempt.
enum WriteAttempt {
    Done {
        content_sha: String,
        commit_sha: String,
    },
    /// 403 with the `too_large` error code.
    TooLarge,
    /// Version token missing or stale (422 naming the sha, or 409).
    Conflict,
}

// ─── Client ───────────────────────────────────────────────────────────────────

/// Read/write client for one repository.
pub struct ContentClient<T: Transport> {
    transport: T,
    api_root: String,
    location: RepoLocation,
    token: String,
    committer: Option<Committer>,
}

impl<T: Transport> ContentClient<T> {
    pub fn new(transport: T, location: RepoLocation, token: impl Into<String>) -> Self {
        ContentClient {
            transport,
            api_root: DEFAULT_API_ROOT.to_string(),
            location,
            token: token.into(),
            committer: None,
        }
    }

    /// Attach a committer identity to every write.
    pub fn with_committer(mut self, committer: Committer) -> Self {
        self.committer = Some(committer);
        self
    }

    /// Point the client at a different API root (tests, enterprise).
    pub fn with_api_root(mut self, api_root: impl Into<String>) -> Self {
        self.api_root = api_root.into();
        self
    }

    fn base_url(&self) -> String {
        format!(
            "{}/repos/{}/{}",
            self.api_root, self.location.owner, self.location.repo
        )
    }

    fn send(&self, request: Request) -> Result<Response, StoreError> {
        let request = request.header("Authorization", format!("Bearer {}", self.token));
        Ok(self.transport.send(&request)?)
    }

    fn get(&self, url: &str) -> Result<Response, StoreError> {
        self.send(Request::get(url))
    }

    // ─── Read ─────────────────────────────────────────────────────────────────

    /// Read a document, returning `(bytes, sha token)`.
    ///
    /// Falls back to the tree walk when the contents endpoint rejects
    /// the document as too large.
    pub fn read(&self, path: &str) -> Result<(Vec<u8>, String), StoreError> {
        let url = format!("{}/contents/{}", self.base_url(), path);
        let response = self.get(&url)?;

        match response.status {
            200 => {
                let data: ContentResponse = decode(&response)?;
                match data.content.as_deref().filter(|c| !c.trim().is_empty()) {
                    Some(content) => Ok((decode_base64(content)?, data.sha)),
                    None => match data.download_url {
                        Some(download_url) => {
                            let body = self.get(&download_url)?;
                            if !body.is_success() {
                                return Err(unknown(&body));
                            }
                            Ok((body.body, data.sha))
                        }
                        None => Err(StoreError::Decode(
                            "content response had neither content nor download_url".to_string(),
                        )),
                    },
                }
            }
            404 => Err(StoreError::NotFound {
                path: path.to_string(),
            }),
            403 if is_too_large(&response) => self.read_large(path),
            _ => Err(unknown(&response)),
        }
    }

    /// Tree-walk read path for documents over the direct size limit.
    fn read_large(&self, path: &str) -> Result<(Vec<u8>, String), StoreError> {
        let tree = self.branch_tree()?;
        let entry = tree
            .tree
            .iter()
            .find(|e| e.path == path)
            .ok_or_else(|| StoreError::NotFound {
                path: path.to_string(),
            })?;

        let response = self.get(&entry.url)?;
        if !response.is_success() {
            return Err(unknown(&response));
        }
        let blob: BlobResponse = decode(&response)?;
        Ok((decode_base64(&blob.content)?, blob.sha))
    }

    // ─── Write ────────────────────────────────────────────────────────────────

    /// Write a document, returning `(content sha, commit sha)`.
    ///
    /// `sha` is the last-known version token; pass `None` when the
    /// document is not known to exist. A token conflict triggers
    /// exactly one retry with a freshly read token; a second conflict
    /// is fatal.
    pub fn write(
        &self,
        path: &str,
        content: &[u8],
        sha: Option<&str>,
        message: &str,
    ) -> Result<(String, String), StoreError> {
        match self.write_direct(path, content, sha, message)? {
            WriteAttempt::Done {
                content_sha,
                commit_sha,
            } => Ok((content_sha, commit_sha)),
            WriteAttempt::TooLarge => self.write_large(path, content, message),
            WriteAttempt::Conflict => {
                let (_, current_sha) = self.read(path)?;
                match self.write_direct(path, content, Some(&current_sha), message)? {
                    WriteAttempt::Done {
                        content_sha,
                        commit_sha,
                    } => Ok((content_sha, commit_sha)),
                    WriteAttempt::TooLarge => self.write_large(path, content, message),
                    WriteAttempt::Conflict => Err(StoreError::VersionConflict {
                        path: path.to_string(),
                    }),
                }
            }
        }
    }

    /// One direct contents-endpoint write.
    fn write_direct(
        &self,
        path: &str,
        content: &[u8],
        sha: Option<&str>,
        message: &str,
    ) -> Result<WriteAttempt, StoreError> {
        let url = format!("{}/contents/{}", self.base_url(), path);
        let mut payload = json!({
            "path": path,
            "content": BASE64.encode(content),
            "message": message,
        });
        if let Some(sha) = sha {
            payload["sha"] = json!(sha);
        }
        if let Some(committer) = &self.committer {
            payload["committer"] = json!(committer);
        }

        let response = self.send(Request::with_json(Method::Put, url, &payload))?;
        match response.status {
            200 | 201 => {
                let data: WriteResponse = decode(&response)?;
                Ok(WriteAttempt::Done {
                    content_sha: data.content.sha,
                    commit_sha: data.commit.sha,
                })
            }
            403 if is_too_large(&response) => Ok(WriteAttempt::TooLarge),
            422 if response.body_text().contains("sha") => Ok(WriteAttempt::Conflict),
            409 => Ok(WriteAttempt::Conflict),
            _ => Err(unknown(&response)),
        }
    }

    /// Large-object write: blob, tree against the branch's base tree,
    /// commit parenting the branch tip, then the ref move that makes
    /// the new document visible.
    fn write_large(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
    ) -> Result<(String, String), StoreError> {
        let blob_url = format!("{}/git/blobs", self.base_url());
        let payload = json!({
            "encoding": "base64",
            "content": BASE64.encode(content),
        });
        let response = self.send(Request::with_json(Method::Post, blob_url, &payload))?;
        if !response.is_success() {
            return Err(unknown(&response));
        }
        let blob: ObjectSha = decode(&response)?;

        let base_tree = self.branch_tree()?.sha;
        let parent_commit = self.branch_tip()?;

        let tree_url = format!("{}/git/trees", self.base_url());
        let payload = json!({
            "base_tree": base_tree,
            "tree": [{
                "mode": "100644",
                "path": path,
                "type": "blob",
                "sha": blob.sha,
            }],
        });
        let response = self.send(Request::with_json(Method::Post, tree_url, &payload))?;
        if !response.is_success() {
            return Err(unknown(&response));
        }
        let tree: ObjectSha = decode(&response)?;

        let commit_url = format!("{}/git/commits", self.base_url());
        let mut payload = json!({
            "message": message,
            "parents": [parent_commit],
            "tree": tree.sha,
        });
        if let Some(committer) = &self.committer {
            payload["committer"] = json!(committer);
        }
        let response = self.send(Request::with_json(Method::Post, commit_url, &payload))?;
        if !response.is_success() {
            return Err(unknown(&response));
        }
        let commit: ObjectSha = decode(&response)?;

        let ref_url = format!(
            "{}/git/refs/heads/{}",
            self.base_url(),
            self.location.branch
        );
        let payload = json!({ "sha": commit.sha });
        let response = self.send(Request::with_json(Method::Patch, ref_url, &payload))?;
        if !response.is_success() {
            return Err(unknown(&response));
        }

        Ok((blob.sha, commit.sha))
    }

    // ─── Branch metadata ──────────────────────────────────────────────────────

    /// Whether the configured branch exists at all.
    pub fn branch_exists(&self) -> Result<bool, StoreError> {
        let url = format!(
            "{}/git/refs/heads/{}",
            self.base_url(),
            self.location.branch
        );
        Ok(self.get(&url)?.status == 200)
    }

    /// The full recursive tree at the branch head.
    fn branch_tree(&self) -> Result<TreeResponse, StoreError> {
        let url = format!(
            "{}/git/trees/{}?recursive=1",
            self.base_url(),
            self.location.branch
        );
        let response = self.get(&url)?;
        if !response.is_success() {
            return Err(unknown(&response));
        }
        decode(&response)
    }

    /// The commit sha the branch currently points at.
    fn branch_tip(&self) -> Result<String, StoreError> {
        let url = format!(
            "{}/git/refs/heads/{}",
            self.base_url(),
            self.location.branch
        );
        let response = self.get(&url)?;
        if !response.is_success() {
            return Err(unknown(&response));
        }
        let reference: RefResponse = decode(&response)?;
        Ok(reference.object.sha)
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn unknown(response: &Response) -> StoreError {
    StoreError::UnknownServer {
        status: response.status,
        body: response.body_text(),
    }
}

fn decode<'a, D: Deserialize<'a>>(response: &'a Response) -> Result<D, StoreError> {
    serde_json::from_slice(&response.body).map_err(|e| StoreError::Decode(e.to_string()))
}

/// The API wraps base64 payloads at 60 columns; strip whitespace
/// before decoding.
fn decode_base64(content: &str) -> Result<Vec<u8>, StoreError> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64
        .decode(compact.as_bytes())
        .map_err(|e| StoreError::Decode(format!("invalid base64 content: {}", e)))
}

/// True for a 403 whose body carries the `too_large` error code.
fn is_too_large(response: &Response) -> bool {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        errors: Vec<ErrorEntry>,
    }
    #[derive(Deserialize)]
    struct ErrorEntry {
        #[serde(default)]
        code: String,
    }

    response
        .json::<ErrorBody>()
        .map(|body| body.errors.iter().any(|e| e.code == "too_large"))
        .unwrap_or(false)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_decoding_tolerates_line_wrapping() {
        let wrapped = "aGVs\nbG8g\nd29y\nbGQ=\n";
        assert_eq!(decode_base64(wrapped).unwrap(), b"hello world");
    }

    #[test]
    fn too_large_detection_requires_the_code() {
        let too_large = Response {
            status: 403,
            body: br#"{"errors":[{"code":"too_large"}]}"#.to_vec(),
        };
        assert!(is_too_large(&too_large));

        let plain_forbidden = Response {
            status: 403,
            body: br#"{"message":"rate limited"}"#.to_vec(),
        };
        assert!(!is_too_large(&plain_forbidden));
    }
}
