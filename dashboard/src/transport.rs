use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::session::SessionState;
use crate::types::ProcessedImage;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// How a request authenticates.
#[derive(Debug, Clone)]
pub(crate) enum Auth {
    /// Current session token; a 401 expires the session.
    Session,
    /// Explicit token, no interception.
    Bearer(String),
    Anonymous,
}

pub struct Transport {
    client: Client,
    base: Url,
    base_url: String,
    session: Arc<SessionState>,
}

impl Transport {
    pub(crate) fn new(config: &Config, session: Arc<SessionState>) -> Result<Self> {
        let base = Url::parse(&config.api_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {e}", config.api_url)))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(config.api_url.clone()));
        }
        let client = Client::builder()
            .timeout(config.timeout())
            .cookie_store(config.with_credentials)
            .user_agent(concat!("aman-dashboard/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Joins raw segments into an absolute path, percent-encoding each one.
    pub(crate) fn path(&self, segments: &[&str]) -> String {
        let mut url = self.base.clone();
        if let Ok(mut parts) = url.path_segments_mut() {
            parts.clear().extend(segments);
        }
        url.path().to_string()
    }

    fn token_for(&self, auth: &Auth) -> Option<String> {
        match auth {
            Auth::Session => self.session.token(),
            Auth::Bearer(token) => Some(token.clone()),
            Auth::Anonymous => None,
        }
    }

    fn builder(&self, method: Method, path: &str, token: Option<&str>, request_id: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, self.url(path))
            .header(REQUEST_ID_HEADER, request_id);
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends the request and maps non-2xx statuses to [`ApiError::Http`].
    async fn dispatch<F>(&self, method: Method, path: &str, auth: Auth, configure: F) -> Result<Response>
    where
        F: FnOnce(RequestBuilder) -> RequestBuilder,
    {
        let request_id = Uuid::new_v4().to_string();
        let token = self.token_for(&auth);
        let builder = configure(self.builder(method.clone(), path, token.as_deref(), &request_id));

        log::debug!("{} {} [{}]", method, path, request_id);
        let response = builder.send().await.map_err(|e| {
            tracing::warn!(%method, path, request_id = %request_id, error = %e, "Request failed without a response");
            ApiError::from(e)
        })?;

        let status = response.status();
        if status.is_success() {
            log::debug!("{} {} -> {} [{}]", method, path, status, request_id);
            return Ok(response);
        }

        // Only the session this request was sent with may be expired by it.
        if status == StatusCode::UNAUTHORIZED && matches!(auth, Auth::Session) {
            if let Some(token) = &token {
                self.session.expire(token);
            }
        }

        let message = error_message(status, &response.text().await.unwrap_or_default());
        tracing::warn!(%method, path, request_id = %request_id, status = status.as_u16(), reason = %message, "Request rejected");
        Err(ApiError::Http { status, message })
    }

    async fn decode<T: DeserializeOwned>(method: &Method, path: &str, response: Response) -> Result<T> {
        let text = response.text().await?;
        // Mutations sometimes answer with an empty body.
        let raw = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(raw).map_err(|e| ApiError::Decode(format!("{method} {path}: {e}")))
    }

    pub(crate) async fn get_as<T: DeserializeOwned>(&self, path: &str, auth: Auth) -> Result<T> {
        let response = self.dispatch(Method::GET, path, auth, |b| b).await?;
        Self::decode(&Method::GET, path, response).await
    }

    pub(crate) async fn post_as<T, B>(&self, path: &str, body: &B, auth: Auth) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.dispatch(Method::POST, path, auth, |b| b.json(body)).await?;
        Self::decode(&Method::POST, path, response).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_as(path, Auth::Session).await
    }

    pub async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let response = self
            .dispatch(Method::GET, path, Auth::Session, |b| b.query(query))
            .await?;
        Self::decode(&Method::GET, path, response).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.post_as(path, body, Auth::Session).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self
            .dispatch(Method::PUT, path, Auth::Session, |b| b.json(body))
            .await?;
        Self::decode(&Method::PUT, path, response).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.dispatch(Method::DELETE, path, Auth::Session, |b| b).await?;
        Self::decode(&Method::DELETE, path, response).await
    }

    pub async fn delete_with_body<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self
            .dispatch(Method::DELETE, path, Auth::Session, |b| b.json(body))
            .await?;
        Self::decode(&Method::DELETE, path, response).await
    }

    pub async fn get_bytes(&self, path: &str) -> Result<ProcessedImage> {
        let response = self.dispatch(Method::GET, path, Auth::Session, |b| b).await?;
        read_image(response).await
    }

    pub async fn post_bytes(&self, path: &str, content_type: &str, bytes: Vec<u8>) -> Result<ProcessedImage> {
        let content_type = HeaderValue::from_str(content_type)
            .map_err(|e| ApiError::Decode(format!("bad content type {content_type:?}: {e}")))?;
        let response = self
            .dispatch(Method::POST, path, Auth::Session, |b| {
                b.header(CONTENT_TYPE, content_type).body(bytes)
            })
            .await?;
        read_image(response).await
    }

    #[cfg(test)]
    pub(crate) fn has_auth_header(&self) -> bool {
        self.builder(Method::GET, "/", self.token_for(&Auth::Session).as_deref(), "t")
            .build()
            .map(|r| r.headers().contains_key(reqwest::header::AUTHORIZATION))
            .unwrap_or(false)
    }
}

async fn read_image(response: Response) -> Result<ProcessedImage> {
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let bytes = response.bytes().await?.to_vec();
    log::info!("Received {} bytes of {}", bytes.len(), content_type);
    Ok(ProcessedImage { content_type, bytes })
}

/// Pulls a human-readable message out of an error body.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error", "message", "detail"] {
            if let Some(msg) = json.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ClientStorage;
    use crate::types::{Role, Session, User};

    #[test]
    fn error_message_prefers_json_fields() {
        let status = StatusCode::BAD_REQUEST;
        assert_eq!(error_message(status, r#"{"error":"Device already claimed"}"#), "Device already claimed");
        assert_eq!(error_message(status, r#"{"detail":"bad id"}"#), "bad id");
        assert_eq!(error_message(status, "plain failure\n"), "plain failure");
        assert_eq!(error_message(status, ""), "Bad Request");
    }

    #[test]
    fn urls_join_without_double_slashes() {
        let config = Config {
            api_url: "http://backend:8080/".into(),
            ..Config::default()
        };
        let state = SessionState::new(ClientStorage::in_memory().unwrap()).unwrap();
        let transport = Transport::new(&config, state).unwrap();
        assert_eq!(transport.url("/devices"), "http://backend:8080/devices");
        assert_eq!(transport.url("devices"), "http://backend:8080/devices");
        assert!(!transport.has_auth_header());
    }

    #[test]
    fn path_segments_are_percent_encoded() {
        let config = Config {
            api_url: "http://backend:8080/api".into(),
            ..Config::default()
        };
        let state = SessionState::new(ClientStorage::in_memory().unwrap()).unwrap();
        let transport = Transport::new(&config, state).unwrap();
        assert_eq!(transport.path(&["device", "EMULATOR-001", "jobs"]), "/device/EMULATOR-001/jobs");
        assert_eq!(transport.path(&["device", "pond 1/a", "camera"]), "/device/pond%201%2Fa/camera");
        assert_eq!(
            transport.url(&transport.path(&["devices"])),
            "http://backend:8080/api/devices"
        );
    }

    #[test]
    fn unparseable_api_url_is_rejected() {
        let config = Config {
            api_url: "not a url".into(),
            ..Config::default()
        };
        let state = SessionState::new(ClientStorage::in_memory().unwrap()).unwrap();
        assert!(matches!(Transport::new(&config, state), Err(ApiError::InvalidUrl(_))));
    }

    #[test]
    fn stored_session_token_is_injected() {
        let mut storage = ClientStorage::in_memory().unwrap();
        storage
            .save_session(&Session {
                token: "tok".into(),
                user: User {
                    id: Some(1),
                    username: "op".into(),
                    email: None,
                    role: Role::User,
                },
            })
            .unwrap();
        let state = SessionState::new(storage).unwrap();
        let transport = Transport::new(&Config::default(), state).unwrap();
        assert!(transport.has_auth_header());
    }
}
