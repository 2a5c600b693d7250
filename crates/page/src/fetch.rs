//! Where visualisation data and metadata tables come from.
//!
//! The engine only sees the [`DataSource`] trait. Responses are raw JSON; the
//! caller normalises envelopes into rows.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use formats::HttpMethod;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::debug;

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub path: String,
    pub method: HttpMethod,
    pub params: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: HttpMethod::Get,
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug)]
pub enum FetchError {
    Http(reqwest::Error),
    Status { path: String, status: u16 },
    Decode { path: String, message: String },
    NotFound(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Http(e) => write!(f, "request failed: {e}"),
            FetchError::Status { path, status } => write!(f, "{path} answered {status}"),
            FetchError::Decode { path, message } => write!(f, "{path} is not JSON: {message}"),
            FetchError::NotFound(path) => write!(f, "{path} not found"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Http(e)
    }
}

/// Methods return boxed futures for dyn-compatibility.
pub trait DataSource: Send + Sync {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<Value, FetchError>>;
}

/// JSON over HTTP. Relative paths are joined onto `base_url`.
pub struct HttpDataSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDataSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl DataSource for HttpDataSource {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<Value, FetchError>> {
        Box::pin(async move {
            let url = self.url_for(&request.path);
            let builder = match request.method {
                HttpMethod::Get => self.client.get(&url).query(&request.params),
                HttpMethod::Post => {
                    let body: Map<String, Value> = request
                        .params
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                        .collect();
                    self.client.post(&url).json(&body)
                }
            };
            let response = builder.send().await?;
            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(FetchError::NotFound(request.path));
            }
            if !status.is_success() {
                return Err(FetchError::Status {
                    path: request.path,
                    status: status.as_u16(),
                });
            }
            let bytes = response.bytes().await?;
            serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode {
                path: request.path,
                message: e.to_string(),
            })
        })
    }
}

/// Canned responses keyed by path. Every request is recorded.
#[derive(Default)]
pub struct StaticDataSource {
    responses: Mutex<BTreeMap<String, Value>>,
    failures: Mutex<BTreeMap<String, u16>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl StaticDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, path: &str, body: Value) -> Self {
        self.respond(path, body);
        self
    }

    /// Replaces the response for `path` and clears any configured failure.
    pub fn respond(&self, path: &str, body: Value) {
        self.failures.lock().remove(path);
        self.responses.lock().insert(path.to_string(), body);
    }

    pub fn fail(&self, path: &str, status: u16) {
        self.failures.lock().insert(path.to_string(), status);
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_for(&self, path: &str) -> Vec<FetchRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }
}

impl DataSource for StaticDataSource {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<Value, FetchError>> {
        self.requests.lock().push(request.clone());
        let result = if let Some(status) = self.failures.lock().get(&request.path) {
            Err(FetchError::Status {
                path: request.path,
                status: *status,
            })
        } else {
            match self.responses.lock().get(&request.path) {
                Some(body) => Ok(body.clone()),
                None => Err(FetchError::NotFound(request.path)),
            }
        };
        Box::pin(async move { result })
    }
}

/// Serves `<root>/<path>` or `<root>/<path>.json` from disk; query params are ignored.
pub struct FileDataSource {
    root: PathBuf,
}

impl FileDataSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn candidates(&self, path: &str) -> Vec<PathBuf> {
        let relative = path.split('?').next().unwrap_or(path).trim_start_matches('/');
        let direct = self.root.join(relative);
        let with_ext = self.root.join(format!("{relative}.json"));
        vec![direct, with_ext]
    }
}

impl DataSource for FileDataSource {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<Value, FetchError>> {
        Box::pin(async move {
            for candidate in self.candidates(&request.path) {
                if !tokio::fs::metadata(&candidate).await.is_ok_and(|m| m.is_file()) {
                    continue;
                }
                debug!(path = %candidate.display(), params = request.params.len(), "serving from disk");
                let payload = tokio::fs::read(&candidate)
                    .await
                    .map_err(|_| FetchError::NotFound(request.path.clone()))?;
                return serde_json::from_slice(&payload).map_err(|e| FetchError::Decode {
                    path: request.path.clone(),
                    message: e.to_string(),
                });
            }
            Err(FetchError::NotFound(request.path))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn url_join_handles_slashes_and_absolute_paths() {
        let source = HttpDataSource::new("https://api.example.org/v1/");
        assert_eq!(source.url_for("/trips"), "https://api.example.org/v1/trips");
        assert_eq!(source.url_for("http://other/x"), "http://other/x");
    }

    #[tokio::test]
    async fn static_source_records_and_fails_on_demand() {
        let source = StaticDataSource::new().with_response("/a", json!([1]));
        assert_eq!(source.fetch(FetchRequest::get("/a")).await.unwrap(), json!([1]));
        source.fail("/a", 503);
        assert!(matches!(
            source.fetch(FetchRequest::get("/a")).await,
            Err(FetchError::Status { status: 503, .. })
        ));
        assert!(matches!(
            source.fetch(FetchRequest::get("/b").with_param("x", "1")).await,
            Err(FetchError::NotFound(_))
        ));
        assert_eq!(source.requests().len(), 3);
        assert_eq!(source.requests_for("/b")[0].params, vec![("x".to_string(), "1".to_string())]);
    }

    #[tokio::test]
    async fn file_source_reads_json_with_or_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("api")).unwrap();
        std::fs::write(dir.path().join("api/trips.json"), r#"{"data": [{"id": 1}]}"#).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();
        let source = FileDataSource::new(dir.path());

        assert_eq!(
            source.fetch(FetchRequest::get("/api/trips")).await.unwrap(),
            json!({"data": [{"id": 1}]})
        );
        assert!(matches!(
            source.fetch(FetchRequest::get("/broken.json")).await,
            Err(FetchError::Decode { .. })
        ));
        assert!(matches!(
            source.fetch(FetchRequest::get("/missing")).await,
            Err(FetchError::NotFound(_))
        ));
    }
}
