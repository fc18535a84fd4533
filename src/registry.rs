use crate::error::SyncError;
use crate::version_info::user_agent;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// The registry is the git refs API of a GitHub repository:
// <https://docs.github.com/en/rest/git/refs>

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// A tag record held by the registry. This is also the body that
/// is POSTed to create a new ref.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub sha: String,
}

impl RegistryEntry {
    pub fn new<R: Into<String>, S: Into<String>>(git_ref: R, sha: S) -> Self {
        Self {
            git_ref: git_ref.into(),
            sha: sha.into(),
        }
    }

    pub fn tag<T: AsRef<str>, S: Into<String>>(tag: T, sha: S) -> Self {
        Self::new(format!("refs/tags/{}", tag.as_ref()), sha)
    }
}

/// The shape of a ref as returned by the refs API
#[derive(Deserialize, Debug)]
struct GitRef {
    #[serde(rename = "ref")]
    git_ref: String,
    object: GitObject,
}

#[derive(Deserialize, Debug)]
struct GitObject {
    sha: String,
}

impl From<GitRef> for RegistryEntry {
    fn from(r: GitRef) -> Self {
        Self::new(r.git_ref, r.object.sha)
    }
}

/// Listing `refs/tags/<name>` yields a bare object when `<name>` is
/// an exact match for a ref, and an array of the refs that start
/// with `<name>` otherwise.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum ListRefsResponse {
    One(GitRef),
    Many(Vec<GitRef>),
}

impl ListRefsResponse {
    fn into_entries(self) -> Vec<RegistryEntry> {
        match self {
            Self::One(r) => vec![r.into()],
            Self::Many(refs) => refs.into_iter().map(Into::into).collect(),
        }
    }
}

pub fn from_json<T: serde::de::DeserializeOwned, S: AsRef<[u8]>>(text: S) -> anyhow::Result<T> {
    let text = text.as_ref();
    serde_json_path_to_error::from_slice(text)
        .map_err(|err| anyhow::anyhow!("{err}. Input: {}", String::from_utf8_lossy(text)))
}

#[async_trait]
pub trait TagRegistry: Send + Sync {
    /// Lists the tags whose name starts with `namespace`.
    /// A namespace with no tags yields an empty list.
    async fn list_tags(&self, namespace: &str) -> Result<Vec<RegistryEntry>, SyncError>;

    /// Creates a new tag ref.
    async fn create_tag(&self, entry: &RegistryEntry) -> Result<(), SyncError>;
}

#[derive(Clone)]
pub struct GitHubRegistry {
    api_url: String,
    repository: String,
    token: String,
    client: reqwest::Client,
}

impl GitHubRegistry {
    pub fn new<A: Into<String>, R: Into<String>, T: Into<String>>(
        api_url: A,
        repository: R,
        token: T,
    ) -> anyhow::Result<Self> {
        // The gzip feature advertises Accept-Encoding: gzip and
        // inflates compressed bodies before we ever see them
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(user_agent())
            .gzip(true)
            .build()?;

        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            repository: repository.into(),
            token: token.into(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{api}/repos/{repo}/{path}",
            api = self.api_url,
            repo = self.repository
        )
    }

    /// Performs a single request and returns the status along with
    /// the (already decompressed) body.
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&RegistryEntry>,
    ) -> Result<(StatusCode, Vec<u8>), SyncError> {
        let transport = |source| SyncError::TransportFailure {
            method: method.clone(),
            url: url.to_string(),
            source,
        };

        let mut request = self
            .client
            .request(method.clone(), url)
            .header(AUTHORIZATION, format!("token {}", self.token))
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let data = response.bytes().await.map_err(transport)?;
        log::trace!("{method} {url} -> {status}");

        Ok((status, data.to_vec()))
    }
}

fn unexpected_status(method: Method, url: String, status: StatusCode, body: &[u8]) -> SyncError {
    SyncError::UnexpectedStatus {
        method,
        url,
        status,
        body: String::from_utf8_lossy(body).into_owned(),
    }
}

#[async_trait]
impl TagRegistry for GitHubRegistry {
    async fn list_tags(&self, namespace: &str) -> Result<Vec<RegistryEntry>, SyncError> {
        let url = self.endpoint(&format!("git/refs/tags/{namespace}"));
        let (status, body) = self.send(Method::GET, &url, None).await?;

        match status {
            StatusCode::NOT_FOUND => {
                log::info!("No existing tags for {namespace}.");
                Ok(vec![])
            }
            StatusCode::OK if body.iter().all(u8::is_ascii_whitespace) => Ok(vec![]),
            StatusCode::OK => {
                let resp: ListRefsResponse =
                    from_json(&body).map_err(|err| SyncError::MalformedResponse {
                        url: url.clone(),
                        reason: format!("{err:#}"),
                    })?;
                Ok(resp.into_entries())
            }
            _ => Err(unexpected_status(Method::GET, url, status, &body)),
        }
    }

    async fn create_tag(&self, entry: &RegistryEntry) -> Result<(), SyncError> {
        let url = self.endpoint("git/refs");
        let (status, body) = self.send(Method::POST, &url, Some(entry)).await?;

        if status != StatusCode::CREATED {
            return Err(unexpected_status(Method::POST, url, status, &body));
        }

        log::info!("Tagged {} as {}", entry.sha, entry.git_ref);
        Ok(())
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::header::{CONTENT_ENCODING, CONTENT_TYPE};
    use axum::http::HeaderMap;
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    const REFS_2024_03: &str = include_str!("../test-data/refs_2024_03.json");
    const REF_SINGLE: &str = include_str!("../test-data/ref_single.json");
    const REFS_2024_08_GZ: &[u8] = include_bytes!("../test-data/refs_2024_08.json.gz");

    const TOKEN: &str = "secret";

    /// An in-memory registry that counts how often it is queried
    #[derive(Clone, Default)]
    pub struct FakeRegistry {
        tags: Arc<Mutex<Vec<RegistryEntry>>>,
        list_calls: Arc<Mutex<usize>>,
        fail_create: bool,
    }

    impl FakeRegistry {
        pub fn with_tags(refs: &[&str]) -> Self {
            let tags = refs
                .iter()
                .map(|r| RegistryEntry::new(*r, "0000000000000000000000000000000000000000"))
                .collect();
            Self {
                tags: Arc::new(Mutex::new(tags)),
                ..Self::default()
            }
        }

        pub fn failing_create() -> Self {
            Self {
                fail_create: true,
                ..Self::default()
            }
        }

        pub fn list_calls(&self) -> usize {
            *self.list_calls.lock().unwrap()
        }

        pub fn tags(&self) -> Vec<RegistryEntry> {
            self.tags.lock().unwrap().clone()
        }

        pub fn tag_names(&self) -> Vec<String> {
            self.tags().into_iter().map(|t| t.git_ref).collect()
        }
    }

    #[async_trait]
    impl TagRegistry for FakeRegistry {
        async fn list_tags(&self, namespace: &str) -> Result<Vec<RegistryEntry>, SyncError> {
            *self.list_calls.lock().unwrap() += 1;
            let prefix = format!("refs/tags/{namespace}");
            Ok(self
                .tags()
                .into_iter()
                .filter(|t| t.git_ref.starts_with(&prefix))
                .collect())
        }

        async fn create_tag(&self, entry: &RegistryEntry) -> Result<(), SyncError> {
            if self.fail_create {
                return Err(SyncError::UnexpectedStatus {
                    method: Method::POST,
                    url: "fake://git/refs".to_string(),
                    status: StatusCode::UNPROCESSABLE_ENTITY,
                    body: r#"{"message":"Reference already exists"}"#.to_string(),
                });
            }
            self.tags.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct FakeGitHub {
        created: Arc<Mutex<Vec<RegistryEntry>>>,
    }

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v == format!("token {TOKEN}"))
            .unwrap_or(false)
    }

    async fn list_refs(
        Path((_owner, _repo, tag)): Path<(String, String, String)>,
        headers: HeaderMap,
    ) -> Response {
        if !authorized(&headers) {
            return (
                axum::http::StatusCode::UNAUTHORIZED,
                r#"{"message":"Bad credentials"}"#,
            )
                .into_response();
        }

        match tag.as_str() {
            "2024.03" => ([(CONTENT_TYPE, "application/json")], REFS_2024_03).into_response(),
            "2024.06" => ([(CONTENT_TYPE, "application/json")], REF_SINGLE).into_response(),
            "2024.07" => "<html>not json</html>".into_response(),
            "2024.08" => (
                [
                    (CONTENT_TYPE, "application/json"),
                    (CONTENT_ENCODING, "gzip"),
                ],
                REFS_2024_08_GZ,
            )
                .into_response(),
            "2024.05" => (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"message":"Server Error"}"#,
            )
                .into_response(),
            _ => (
                axum::http::StatusCode::NOT_FOUND,
                Json(serde_json::json!({"message": "Not Found"})),
            )
                .into_response(),
        }
    }

    async fn create_ref(
        State(state): State<FakeGitHub>,
        Json(entry): Json<RegistryEntry>,
    ) -> Response {
        let mut created = state.created.lock().unwrap();
        if created.iter().any(|e| e.git_ref == entry.git_ref) {
            return (
                axum::http::StatusCode::UNPROCESSABLE_ENTITY,
                r#"{"message":"Reference already exists"}"#,
            )
                .into_response();
        }
        created.push(entry.clone());
        (
            axum::http::StatusCode::CREATED,
            Json(serde_json::json!({
                "ref": entry.git_ref,
                "object": {"sha": entry.sha, "type": "commit"},
            })),
        )
            .into_response()
    }

    async fn spawn_fake_github() -> (String, FakeGitHub) {
        let state = FakeGitHub::default();
        let app = Router::new()
            .route("/repos/{owner}/{repo}/git/refs/tags/{tag}", get(list_refs))
            .route("/repos/{owner}/{repo}/git/refs", post(create_ref))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        (format!("http://{addr}"), state)
    }

    async fn registry() -> (GitHubRegistry, FakeGitHub) {
        let (url, state) = spawn_fake_github().await;
        let registry = GitHubRegistry::new(url, "octocat/hello-world", TOKEN).unwrap();
        (registry, state)
    }

    #[test]
    fn decode_list() {
        let resp: ListRefsResponse = from_json(REFS_2024_03).unwrap();
        k9::snapshot!(
            resp.into_entries(),
            r#"
[
    RegistryEntry {
        git_ref: "refs/tags/2024.03.0-0",
        sha: "aa218f56b14c9653891f9e74264a383fa43fefbd",
    },
    RegistryEntry {
        git_ref: "refs/tags/2024.03.0-3",
        sha: "612077ae6dffb4d2fbd8ce0cccaa58893b07b5ac",
    },
    RegistryEntry {
        git_ref: "refs/tags/2024.03-release-notes",
        sha: "612077ae6dffb4d2fbd8ce0cccaa58893b07b5ac",
    },
]
"#
        );
    }

    #[test]
    fn decode_single() {
        let resp: ListRefsResponse = from_json(REF_SINGLE).unwrap();
        assert_eq!(
            resp.into_entries(),
            vec![RegistryEntry::tag(
                "2024.06.2.0",
                "aa218f56b14c9653891f9e74264a383fa43fefbd"
            )]
        );
    }

    #[test]
    fn create_body_shape() {
        let entry = RegistryEntry::tag("2024.03.4.0", "abc123");
        assert_eq!(
            serde_json::to_string(&entry).unwrap(),
            r#"{"ref":"refs/tags/2024.03.4.0","sha":"abc123"}"#
        );
    }

    #[tokio::test]
    async fn list_not_found_is_empty() {
        let (registry, _) = registry().await;
        let tags = registry.list_tags("2024.04").await.unwrap();
        assert!(tags.is_empty());
    }

    #[tokio::test]
    async fn list_ok() {
        let (registry, _) = registry().await;
        let tags = registry.list_tags("2024.03").await.unwrap();
        assert_eq!(tags.len(), 3);
        assert_eq!(tags[1].git_ref, "refs/tags/2024.03.0-3");

        let tags = registry.list_tags("2024.06").await.unwrap();
        assert_eq!(tags.len(), 1);
    }

    #[tokio::test]
    async fn list_gzip() {
        let (registry, _) = registry().await;
        let tags = registry.list_tags("2024.08").await.unwrap();
        assert_eq!(
            tags,
            vec![RegistryEntry::new(
                "refs/tags/2024.08.0-5",
                "aa218f56b14c9653891f9e74264a383fa43fefbd"
            )]
        );
    }

    #[tokio::test]
    async fn list_server_error_is_fatal() {
        let (registry, _) = registry().await;
        let err = registry.list_tags("2024.05").await.unwrap_err();
        match err {
            SyncError::UnexpectedStatus { status, body, .. } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert!(body.contains("Server Error"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_bad_credentials_is_fatal() {
        let (url, _) = spawn_fake_github().await;
        let registry = GitHubRegistry::new(url, "octocat/hello-world", "wrong").unwrap();
        let err = registry.list_tags("2024.03").await.unwrap_err();
        assert!(
            matches!(err, SyncError::UnexpectedStatus { status, .. } if status == StatusCode::UNAUTHORIZED)
        );
    }

    #[tokio::test]
    async fn list_malformed() {
        let (registry, _) = registry().await;
        let err = registry.list_tags("2024.07").await.unwrap_err();
        assert!(matches!(err, SyncError::MalformedResponse { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn list_transport_failure() {
        // Nothing listens on the discard port
        let registry = GitHubRegistry::new("http://127.0.0.1:9", "o/r", TOKEN).unwrap();
        let err = registry.list_tags("2024.03").await.unwrap_err();
        assert!(matches!(err, SyncError::TransportFailure { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn create_tag() {
        let (registry, state) = registry().await;
        let entry = RegistryEntry::tag("2024.03.4.0", "abc123");
        registry.create_tag(&entry).await.unwrap();
        assert_eq!(*state.created.lock().unwrap(), vec![entry.clone()]);

        // The same tag cannot be created twice
        let err = registry.create_tag(&entry).await.unwrap_err();
        assert!(
            matches!(err, SyncError::UnexpectedStatus { status, .. } if status == StatusCode::UNPROCESSABLE_ENTITY)
        );
    }
}
