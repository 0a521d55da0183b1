//! Identifier resolution jobs, which run on the server and are polled for completion.

use crate::constants::IDS_PATH;
use crate::errors::{Error, ServiceError};
use crate::service::parse_envelope;
use crate::transport::OpenRequest;
use crate::types::JobUid;
use crate::Service;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Error,
}

impl JobStatus {
    /// Whether the job has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Error)
    }
}

impl FromStr for JobStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "RUNNING" => Ok(JobStatus::Running),
            "SUCCESS" => Ok(JobStatus::Success),
            "ERROR" => Ok(JobStatus::Error),
            other => Err(ServiceError::UnknownStatus(other.to_string())),
        }
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Success => "SUCCESS",
            JobStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Identifiers to be resolved to objects of one class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdResolutionRequest {
    #[serde(rename = "type")]
    pub data_type: String,
    pub identifiers: Vec<String>,
    /// Disambiguating value, e.g. an organism name.
    pub extra: String,
    pub case_sensitive: bool,
    #[serde(rename = "wildCards")]
    pub wildcards: bool,
}

impl IdResolutionRequest {
    pub fn new<S: Into<String>>(
        data_type: impl Into<String>,
        identifiers: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            data_type: data_type.into(),
            identifiers: identifiers.into_iter().map(Into::into).collect(),
            extra: String::new(),
            case_sensitive: false,
            wildcards: false,
        }
    }

    pub fn extra(self, extra: impl Into<String>) -> Self {
        Self {
            extra: extra.into(),
            ..self
        }
    }

    pub fn case_sensitive(self, case_sensitive: bool) -> Self {
        Self {
            case_sensitive,
            ..self
        }
    }

    /// Whether `*` in identifiers is a wildcard.
    pub fn wildcards(self, wildcards: bool) -> Self {
        Self { wildcards, ..self }
    }

    pub(crate) fn validate(&self) -> Result<(), ServiceError> {
        if self.data_type.is_empty() {
            Err(ServiceError::InvalidArgument("No data-type supplied".to_string()))
        } else if self.identifiers.is_empty() {
            Err(ServiceError::InvalidArgument("No identifiers supplied".to_string()))
        } else {
            Ok(())
        }
    }
}

#[derive(Deserialize)]
struct StatusEnvelope {
    status: Option<String>,
}

#[derive(Deserialize)]
struct ResultsEnvelope {
    results: Option<Value>,
}

/// A submitted id resolution job.
///
/// The job's status is only known after polling. [Job::poll] sleeps before
/// each status check, for a period which grows by a constant factor up to a
/// maximum.
#[derive(Debug)]
pub struct Job<'s> {
    service: &'s Service,
    uid: JobUid,
    status: Option<JobStatus>,
    backoff: Duration,
    decay: f64,
    max_backoff: Duration,
}

pub(crate) fn check_decay(decay: f64) -> Result<(), ServiceError> {
    // also rejects NaN
    if decay >= 1.0 {
        Ok(())
    } else {
        Err(ServiceError::InvalidArgument(format!(
            "Backoff decay must be at least 1, got {}",
            decay
        )))
    }
}

impl<'s> Job<'s> {
    pub(crate) fn new(service: &'s Service, uid: JobUid) -> Self {
        let settings = service.job_settings();
        Self {
            service,
            uid,
            status: None,
            backoff: settings.initial_backoff,
            decay: settings.decay,
            max_backoff: settings.max_backoff,
        }
    }

    /// Override the polling schedule. `decay` must be at least 1.
    pub fn with_backoff(self, initial: Duration, decay: f64, max: Duration) -> Result<Self, Error> {
        check_decay(decay)?;
        Ok(Self {
            backoff: initial,
            decay,
            max_backoff: max,
            ..self
        })
    }

    pub fn uid(&self) -> &JobUid {
        &self.uid
    }

    /// Status as of the last poll, `None` if never polled.
    pub fn status(&self) -> Option<JobStatus> {
        self.status
    }

    /// How long the next poll will sleep for.
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn is_complete(&self) -> bool {
        self.status.map_or(false, |s| s.is_terminal())
    }

    /// Sleep, then check the job's status, unless it is already known to be
    /// complete. Returns whether the job is complete.
    pub async fn poll(&mut self) -> Result<bool, Error> {
        if !self.is_complete() {
            let backoff = self.backoff;
            self.backoff = Duration::try_from_secs_f64(backoff.as_secs_f64() * self.decay)
                .map_or(self.max_backoff, |next| next.min(self.max_backoff));
            log::debug!("polling job {} in {:?}", self.uid, backoff);
            tokio::time::sleep(backoff).await;
            if let Some(status) = self.fetch_status().await? {
                self.status = Some(status);
            }
        }
        Ok(self.is_complete())
    }

    /// Poll until the job is complete, returning its final status.
    pub async fn wait(&mut self) -> Result<JobStatus, Error> {
        loop {
            self.poll().await?;
            if let Some(status) = self.status.filter(JobStatus::is_terminal) {
                return Ok(status);
            }
        }
    }

    fn path(&self, suffix: &str) -> String {
        format!("{}/{}{}", IDS_PATH, self.uid, suffix)
    }

    /// Ask the server for the current status, without sleeping. `None` if
    /// the server has not reported one yet.
    pub async fn fetch_status(&self) -> Result<Option<JobStatus>, Error> {
        let request = OpenRequest::get(self.service.url(&self.path("/status")));
        let envelope: StatusEnvelope = self.service.read_json(request).await?;
        let status: Option<JobStatus> = envelope.status.map(|s| s.parse()).transpose()?;
        Ok(status)
    }

    /// The resolution results. The job should be complete.
    pub async fn fetch_results(&self) -> Result<Value, Error> {
        let path = self.path("/result");
        let request = OpenRequest::get(self.service.url(&path));
        let envelope: ResultsEnvelope = self.service.read_json(request).await?;
        let results = envelope.results.ok_or(ServiceError::MissingKey {
            key: "results",
            path,
        })?;
        Ok(results)
    }

    /// Remove the job from the server.
    pub async fn delete(self) -> Result<(), Error> {
        let url = self.service.url(&self.path(""));
        let text = self.service.opener().delete(&url).await?;
        if !text.trim().is_empty() {
            parse_envelope::<Value>(&text)?;
        }
        log::debug!("deleted job {}", self.uid);
        Ok(())
    }
}
