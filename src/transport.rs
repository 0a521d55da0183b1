//! The HTTP layer underneath [crate::Service].
//!
//! Everything the client sends goes through an [Opener], so the HTTP stack
//! can be swapped out (for instance, for an in-memory mine during testing).

use crate::constants::USER_AGENT;
use crate::errors::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest_middleware::ClientWithMiddleware;

/// Body of a response, read incrementally.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

pub(crate) const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
pub(crate) const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

/// A request to be sent to a mine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub method: Method,
    /// Absolute URL, including any query string.
    pub url: String,
    pub body: Option<String>,
    pub content_type: Option<String>,
    pub accept: Option<&'static str>,
}

impl OpenRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
            content_type: None,
            accept: None,
        }
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            ..Self::get(url)
        }
    }

    pub fn post(url: impl Into<String>, body: String, content_type: &str) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(body),
            content_type: Some(content_type.to_string()),
            accept: None,
        }
    }

    /// Send the urlencoded `form` as a POST body, or do a plain GET if there is none.
    pub fn form(url: impl Into<String>, form: Option<String>) -> Self {
        match form {
            Some(body) => Self::post(url, body, FORM_CONTENT_TYPE),
            None => Self::get(url),
        }
    }

    pub fn accept_json(self) -> Self {
        Self {
            accept: Some(JSON_CONTENT_TYPE),
            ..self
        }
    }
}

/// Sends requests to a mine and hands back response bodies.
///
/// Implementations must turn non-success responses into
/// [TransportError::Status], see [TransportError::from_status].
#[async_trait]
pub trait Opener: Send + Sync {
    async fn send(&self, request: OpenRequest) -> Result<ByteStream, TransportError>;

    /// Whether requests carry credentials.
    fn is_authenticated(&self) -> bool {
        false
    }

    /// GET `url`, or POST the urlencoded `form` to it.
    async fn open(&self, url: &str, form: Option<String>) -> Result<ByteStream, TransportError> {
        self.send(OpenRequest::form(url, form)).await
    }

    /// Like [Opener::open], but reads the whole response.
    async fn read(&self, url: &str, form: Option<String>) -> Result<String, TransportError> {
        read_to_string(self.open(url, form).await?).await
    }

    /// POST `body` as UTF-8 encoded content of the given media type.
    async fn post_content(
        &self,
        url: &str,
        body: String,
        mimetype: &str,
    ) -> Result<String, TransportError> {
        let content_type = format!("{}; charset=utf-8", mimetype);
        let req = OpenRequest::post(url, body, &content_type);
        read_to_string(self.send(req).await?).await
    }

    async fn post_plain_text(&self, url: &str, body: String) -> Result<String, TransportError> {
        self.post_content(url, body, "text/plain").await
    }

    async fn delete(&self, url: &str) -> Result<String, TransportError> {
        read_to_string(self.send(OpenRequest::delete(url)).await?).await
    }
}

/// Read an entire response body.
pub async fn read_to_string(stream: ByteStream) -> Result<String, TransportError> {
    let chunks: Vec<Bytes> = stream.try_collect().await?;
    let body = chunks.concat();
    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Credentials attached to every request.
#[derive(Clone)]
pub enum Auth {
    /// API access token.
    Token(String),
    Basic { username: String, password: String },
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::Token(_) => write!(f, "Auth::Token(***)"),
            Auth::Basic { username, .. } => write!(f, "Auth::Basic({}:***)", username),
        }
    }
}

/// [Opener] backed by reqwest.
#[derive(Clone)]
pub struct HttpOpener {
    client: ClientWithMiddleware,
    auth: Option<Auth>,
}

impl std::fmt::Debug for HttpOpener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpOpener").field("auth", &self.auth).finish()
    }
}

impl HttpOpener {
    pub fn new(client: ClientWithMiddleware, auth: Option<Auth>) -> Self {
        Self { client, auth }
    }

    /// Plain reqwest client identifying itself as this library.
    pub(crate) fn default_client() -> Result<reqwest::Client, reqwest::Error> {
        reqwest::ClientBuilder::new().user_agent(USER_AGENT).build()
    }

    async fn check(&self, res: reqwest::Response) -> Result<reqwest::Response, TransportError> {
        match res.error_for_status_ref() {
            Ok(_) => Ok(res),
            Err(_) => {
                let status = res.status();
                let text = res.text().await?;
                Err(TransportError::from_status(
                    status,
                    &text,
                    self.is_authenticated(),
                ))
            }
        }
    }
}

#[async_trait]
impl Opener for HttpOpener {
    async fn send(&self, request: OpenRequest) -> Result<ByteStream, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        };
        log::debug!("{} {}", method, request.url);
        let mut req = self.client.request(method, &request.url);
        if let Some(accept) = request.accept {
            req = req.header(ACCEPT, accept);
        }
        if let Some(content_type) = request.content_type {
            req = req.header(CONTENT_TYPE, content_type);
        }
        if let Some(body) = request.body {
            req = req.body(body);
        }
        req = match &self.auth {
            Some(Auth::Token(token)) => req.header(AUTHORIZATION, token2header(token)?),
            Some(Auth::Basic { username, password }) => req.basic_auth(username, Some(password)),
            None => req,
        };
        let res = self.check(req.send().await?).await?;
        Ok(res.bytes_stream().map_err(TransportError::Raw).boxed())
    }

    fn is_authenticated(&self) -> bool {
        self.auth.is_some()
    }
}

fn token2header(token: &str) -> Result<HeaderValue, TransportError> {
    let mut value = HeaderValue::from_str(&format!("Token {}", token))
        .map_err(|e| TransportError::Middleware(e.into()))?;
    value.set_sensitive(true);
    Ok(value)
}
