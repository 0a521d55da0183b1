use crate::config::{JobSettings, ListSettings, ServiceConfig};
use crate::constants::*;
use crate::errors::{Error, ProtocolError, ServiceError};
use crate::idresolution::{check_decay, IdResolutionRequest, Job};
use crate::lists::ListManager;
use crate::model::{ClassDescriptor, Field, Model};
use crate::query::PathQuery;
use crate::results::{ObjectFetcher, ResultIterator, Row, RowFormat};
use crate::transport::{read_to_string, Auth, HttpOpener, OpenRequest, Opener, JSON_CONTENT_TYPE};
use crate::types::{JobUid, ServiceRoot, View};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::OnceCell;

/// A connection to the web services of one mine.
///
/// Jobs, list managers, result iterators and result objects borrow the
/// [Service] they came from, so it outlives all of them.
pub struct Service {
    root: ServiceRoot,
    opener: Box<dyn Opener>,
    version: u32,
    jobs: JobSettings,
    lists: ListSettings,
    release: OnceCell<String>,
    model: OnceCell<Model>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("root", &self.root)
            .field("version", &self.version)
            .finish()
    }
}

pub struct ServiceBuilder {
    root: ServiceRoot,
    token: Option<String>,
    credentials: Option<(String, String)>,
    builder: reqwest_middleware::ClientBuilder,
    opener: Option<Box<dyn Opener>>,
    jobs: JobSettings,
    lists: ListSettings,
}

impl ServiceBuilder {
    fn new(root: ServiceRoot) -> Result<Self, reqwest::Error> {
        let client = HttpOpener::default_client()?;
        let builder = reqwest_middleware::ClientBuilder::new(client);
        Ok(Self {
            root,
            token: None,
            credentials: None,
            builder,
            opener: None,
            jobs: JobSettings::default(),
            lists: ListSettings::default(),
        })
    }

    /// Authenticate with an API access token.
    pub fn token(self, token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..self
        }
    }

    /// Authenticate with a username and password.
    pub fn credentials(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            credentials: Some((username.into(), password.into())),
            ..self
        }
    }

    /// Add middleware to the HTTP client.
    pub fn with<M: reqwest_middleware::Middleware>(self, middleware: M) -> Self {
        Self {
            builder: self.builder.with(middleware),
            ..self
        }
    }

    /// Send requests through `opener` instead of the built-in HTTP client.
    /// The opener is then responsible for authentication and middleware.
    pub fn opener(self, opener: impl Opener + 'static) -> Self {
        Self {
            opener: Some(Box::new(opener)),
            ..self
        }
    }

    /// Apply credentials, job and list settings from a [ServiceConfig].
    pub fn config(self, config: ServiceConfig) -> Self {
        let credentials = match (config.username, config.password) {
            (Some(username), Some(password)) => Some((username, password)),
            _ => self.credentials,
        };
        Self {
            token: config.token.or(self.token),
            credentials,
            jobs: config.jobs,
            lists: config.lists,
            ..self
        }
    }

    /// Connect to the mine, checking its web service version.
    pub async fn connect(self) -> Result<Service, Error> {
        check_decay(self.jobs.decay)?;
        let auth = match (self.token, self.credentials) {
            (Some(_), Some(_)) => {
                return Err(ServiceError::InvalidArgument(
                    "Both username and token credentials supplied".to_string(),
                )
                .into())
            }
            (Some(token), None) => Some(Auth::Token(token)),
            (None, Some((username, password))) => Some(Auth::Basic { username, password }),
            (None, None) => None,
        };
        let uses_token = matches!(auth, Some(Auth::Token(_)));
        let opener: Box<dyn Opener> = match self.opener {
            Some(opener) => opener,
            None => Box::new(HttpOpener::new(self.builder.build(), auth)),
        };
        let text = opener.read(&self.root.join(VERSION_PATH), None).await?;
        let version = text
            .trim()
            .parse::<u32>()
            .map_err(|_| ServiceError::BadVersion(text.trim().to_string()))?;
        if uses_token && version < TOKEN_AUTH_VERSION {
            return Err(ServiceError::Unsupported {
                feature: "API access token authentication",
                required: TOKEN_AUTH_VERSION,
                actual: version,
            }
            .into());
        }
        log::debug!("connected to {} (web service version {})", self.root, version);
        Ok(Service {
            root: self.root,
            opener,
            version,
            jobs: self.jobs,
            lists: self.lists,
            release: OnceCell::new(),
            model: OnceCell::new(),
        })
    }
}

#[derive(Deserialize)]
struct ErrorField {
    error: Option<String>,
}

/// Parse a JSON response, failing with its `error` member if that is set.
pub(crate) fn parse_envelope<T: DeserializeOwned>(text: &str) -> Result<T, Error> {
    let bad_envelope = |source| ProtocolError::BadEnvelope {
        text: text.to_string(),
        source,
    };
    if let Ok(ErrorField { error: Some(error) }) = serde_json::from_str(text) {
        return Err(ServiceError::Message(error).into());
    }
    Ok(serde_json::from_str(text).map_err(bad_envelope)?)
}

#[derive(Deserialize)]
struct SubmittedJob {
    uid: Option<JobUid>,
}

impl Service {
    /// Create a service builder.
    pub fn build(root: ServiceRoot) -> Result<ServiceBuilder, Error> {
        Ok(ServiceBuilder::new(root)?)
    }

    /// Connect anonymously to the mine at `root`, which may omit the scheme
    /// (`http://` is assumed) and the `/service` suffix.
    pub async fn connect(root: &str) -> Result<Service, Error> {
        Self::build(ServiceRoot::normalize(root)?)?.connect().await
    }

    /// Create a service builder from a [ServiceConfig].
    pub fn from_config(config: ServiceConfig) -> Result<ServiceBuilder, Error> {
        let root = ServiceRoot::normalize(&config.root)?;
        Ok(Self::build(root)?.config(config))
    }

    pub fn root(&self) -> &ServiceRoot {
        &self.root
    }

    /// Web service API version.
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn opener(&self) -> &dyn Opener {
        &*self.opener
    }

    pub(crate) fn job_settings(&self) -> &JobSettings {
        &self.jobs
    }

    pub(crate) fn list_settings(&self) -> &ListSettings {
        &self.lists
    }

    /// Absolute URL of a resource of this service.
    pub fn url(&self, path: &str) -> String {
        self.root.join(path)
    }

    /// Release of the data in this mine.
    pub async fn release(&self) -> Result<&str, Error> {
        let release = self
            .release
            .get_or_try_init(|| async {
                let text = self.opener.read(&self.url(RELEASE_PATH), None).await?;
                Ok::<_, Error>(text.trim().to_string())
            })
            .await?;
        Ok(release.as_str())
    }

    /// The data model of this mine, downloaded on first use.
    pub async fn model(&self) -> Result<&Model, Error> {
        self.model
            .get_or_try_init(|| async {
                let url = format!("{}?format=json", self.url(MODEL_PATH));
                let text = self.opener.read(&url, None).await?;
                Model::from_json(&text)
            })
            .await
    }

    /// Start a query rooted at the class `root`.
    pub async fn new_query(&self, root: &str) -> Result<PathQuery, Error> {
        let model = self.model().await?;
        let class = model.get_class(root)?;
        Ok(PathQuery::new(model.name(), &class.name))
    }

    /// Send a request expecting a JSON response.
    pub(crate) async fn read_json<T: DeserializeOwned>(
        &self,
        request: OpenRequest,
    ) -> Result<T, Error> {
        let body = self.opener.send(request.accept_json()).await?;
        let text = read_to_string(body).await?;
        parse_envelope(&text)
    }

    /// Results of `path` in the named row format. See [ResultIterator].
    pub fn get_results<'s>(
        &'s self,
        path: &str,
        params: Vec<(String, String)>,
        rowformat: &str,
        view: View,
        class: Option<&'s ClassDescriptor>,
    ) -> Result<ResultIterator<'s>, Error> {
        let format: RowFormat = rowformat.parse()?;
        ResultIterator::new(self, path, params, format, view, class)
    }

    /// Submit an id resolution job.
    pub async fn resolve_ids(&self, request: &IdResolutionRequest) -> Result<Job<'_>, Error> {
        if self.version < ID_RESOLUTION_VERSION {
            return Err(ServiceError::Unsupported {
                feature: "The id resolver",
                required: ID_RESOLUTION_VERSION,
                actual: self.version,
            }
            .into());
        }
        request.validate()?;
        let body = serde_json::to_string(request)
            .map_err(|e| ServiceError::InvalidArgument(e.to_string()))?;
        let url = self.url(IDS_PATH);
        let text = self
            .opener
            .post_content(&url, body, JSON_CONTENT_TYPE)
            .await?;
        let submitted: SubmittedJob = parse_envelope(&text)?;
        let uid = submitted.uid.ok_or_else(|| ServiceError::MissingKey {
            key: "uid",
            path: IDS_PATH.to_string(),
        })?;
        log::debug!("submitted id resolution job {}", uid);
        Ok(Job::new(self, uid))
    }

    /// A manager for the lists of this mine.
    pub fn list_manager(&self) -> ListManager<'_> {
        ListManager::new(self)
    }
}

#[async_trait]
impl ObjectFetcher for Service {
    /// Runs a one-row object query for just the field, constrained by the object's id.
    async fn fetch_field(
        &self,
        class: &ClassDescriptor,
        id: i64,
        field: &Field,
    ) -> Result<Option<Value>, Error> {
        let model = self.model().await?;
        let query = PathQuery::new(model.name(), &class.name).constrain("id", "=", id);
        let query = match field.referenced_type() {
            None => query.select([field.name.as_str()]),
            Some(referenced_type) => {
                let target = model.get_class(referenced_type)?;
                let paths: Vec<String> = target
                    .attributes()
                    .map(|a| format!("{}.{}", field.name, a.name))
                    .collect();
                query.select(paths).outer_join(&field.name)
            }
        };
        log::debug!("fetching {}.{} of object {}", class.name, field.name, id);
        match query.first(self, RowFormat::JsonObjects).await? {
            Some(Row::Object(object)) => Ok(object.into_raw().remove(&field.name)),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Thing {
        size: u32,
    }

    #[test]
    fn test_parse_envelope() {
        let thing: Thing = parse_envelope(r#"{"size": 3, "error": null}"#).unwrap();
        assert_eq!(thing.size, 3);
    }

    #[test]
    fn test_parse_envelope_error() {
        let err = parse_envelope::<Value>(r#"{"error": "No such job"}"#).unwrap_err();
        assert!(matches!(
            err,
            Error::Service(ServiceError::Message(m)) if m == "No such job"
        ));
    }

    #[test]
    fn test_parse_envelope_garbage() {
        let err = parse_envelope::<Value>("<html>").unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::BadEnvelope { .. })));
        assert_eq!(parse_envelope::<Value>("[1]").unwrap(), json!([1]));
    }
}
