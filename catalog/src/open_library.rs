use crate::CatalogError;
use crate::CatalogGateway;
use crate::EditionRecord;
use crate::HttpTransport;
use crate::Request;
use crate::error::TransportError;
use async_trait::async_trait;
use http::HeaderValue;
use http::Method;
use http::header::COOKIE;
use http::header::SET_COOKIE;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::info;

pub const DEFAULT_EDIT_COMMENT: &str = "Linking back to Internet Archive.";

/// Bot account used for edits.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

/// [`CatalogGateway`] backed by the Open Library JSON API.
///
/// Reads are anonymous. Writes log in on first use and replay the session
/// cookie; a rejected write drops the session so the next write logs in
/// again.
pub struct OpenLibraryClient<T: HttpTransport> {
    transport: T,
    base_url: String,
    credentials: Option<Credentials>,
    comment: String,
    timeout: Option<Duration>,
    session: Mutex<Option<HeaderValue>>,
}

impl<T: HttpTransport> OpenLibraryClient<T> {
    pub fn new(transport: T, base_url: &str, credentials: Option<Credentials>) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            comment: DEFAULT_EDIT_COMMENT.to_string(),
            timeout: None,
            session: Mutex::new(None),
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn edition_url(&self, edition_id: &str) -> Result<String, CatalogError> {
        let valid = !edition_id.is_empty()
            && edition_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(CatalogError::InvalidId(edition_id.to_string()));
        }
        Ok(format!("{}/books/{edition_id}.json", self.base_url))
    }

    async fn session_cookie(&self) -> Result<Option<HeaderValue>, CatalogError> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Ok(session.clone());
        }
        let Some(credentials) = self.credentials.as_ref() else {
            return Ok(None);
        };

        let url = format!("{}/account/login", self.base_url);
        let req = Request::new(Method::POST, url)
            .with_timeout(self.timeout)
            .with_json(&LoginBody {
                username: &credentials.username,
                password: &credentials.password,
            })
            .map_err(|err| CatalogError::Build(err.to_string()))?;
        let resp = self
            .transport
            .execute(req)
            .await
            .map_err(|err| login_error(err, &credentials.username))?;

        let cookie = resp
            .headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.split(';').next())
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .collect::<Vec<_>>()
            .join("; ");
        if cookie.is_empty() {
            return Err(CatalogError::Unauthorized(format!(
                "login for {} returned no session cookie",
                credentials.username
            )));
        }
        let cookie =
            HeaderValue::from_str(&cookie).map_err(|err| CatalogError::Build(err.to_string()))?;
        info!(username = %credentials.username, "logged in to catalog");
        *session = Some(cookie.clone());
        Ok(Some(cookie))
    }

    async fn forget_session(&self) {
        *self.session.lock().await = None;
    }
}

fn login_error(err: TransportError, username: &str) -> CatalogError {
    match CatalogError::from_transport(err, username) {
        // The login endpoint has no edition behind it; a 404 here is a bad base URL.
        CatalogError::NotFound(_) => {
            CatalogError::Unauthorized(format!("login endpoint not found for {username}"))
        }
        other => other,
    }
}

#[async_trait]
impl<T: HttpTransport> CatalogGateway for OpenLibraryClient<T> {
    async fn fetch(&self, edition_id: &str) -> Result<EditionRecord, CatalogError> {
        let url = self.edition_url(edition_id)?;
        let mut req = Request::new(Method::GET, url).with_timeout(self.timeout);
        if let Some(cookie) = self.session.lock().await.clone() {
            req.headers.insert(COOKIE, cookie);
        }
        let resp = self
            .transport
            .execute(req)
            .await
            .map_err(|err| CatalogError::from_transport(err, edition_id))?;

        let mut record: EditionRecord = serde_json::from_slice(&resp.body).map_err(|e| {
            CatalogError::Decode(format!(
                "edition {edition_id}: {e}; body: {}",
                String::from_utf8_lossy(&resp.body)
            ))
        })?;
        record.edition_id = edition_id.to_string();
        debug!(
            edition_id,
            archive_link = ?record.archive_link,
            "fetched edition"
        );
        Ok(record)
    }

    async fn persist(&self, record: &EditionRecord) -> Result<(), CatalogError> {
        let url = self.edition_url(&record.edition_id)?;
        let mut body =
            serde_json::to_value(record).map_err(|err| CatalogError::Build(err.to_string()))?;
        if let Value::Object(fields) = &mut body {
            fields.insert("_comment".to_string(), Value::String(self.comment.clone()));
        }

        let mut req = Request::new(Method::PUT, url).with_timeout(self.timeout);
        req.body = Some(body);
        if let Some(cookie) = self.session_cookie().await? {
            req.headers.insert(COOKIE, cookie);
        }

        match self.transport.execute(req).await {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = CatalogError::from_transport(err, &record.edition_id);
                if matches!(err, CatalogError::Unauthorized(_)) {
                    self.forget_session().await;
                }
                Err(err)
            }
        }
    }
}
