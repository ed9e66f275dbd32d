//! Client side of the computation backend: primer properties and primer
//! design. The backend is a black box reached over HTTP; tests swap in
//! their own [`BackendClient`].

use crate::{
    config::BackendConfig,
    error::{CloneError, ErrorCode},
};
use cloneplan_protocol::{
    DesignRequest, DesignResponse, ErrorBody, PRIMER_DETAILS_PATH, PRIMER_HETERODIMER_PATH,
    PrimerDetailsResponse, ThermoResult,
};
use log::{debug, warn};
use reqwest::{
    Url,
    blocking::{Client, Response},
};
use serde::de::DeserializeOwned;
use std::{error::Error, fmt};

#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// No response at all: refused connection, DNS failure, timeout.
    Network(String),
    /// The backend answered with an error status.
    Http {
        status: u16,
        description: Option<String>,
    },
    /// The backend answered with something we cannot read.
    Malformed(String),
}

impl BackendError {
    /// Builds the error for a non-success response from its status and body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let description = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|body| body.message());
        BackendError::Http {
            status,
            description,
        }
    }

    /// The single line shown to the user.
    pub fn to_display_string(&self) -> String {
        match self {
            BackendError::Network(_) => "Network error: Cannot connect to backend".to_string(),
            BackendError::Http {
                description: Some(description),
                ..
            } => description.clone(),
            BackendError::Http { status: 500, .. } => "Internal server error".to_string(),
            BackendError::Http { status, .. } => format!("Server error (status {status})"),
            BackendError::Malformed(_) => "Internal error: unexpected error response".to_string(),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl Error for BackendError {}

impl From<BackendError> for CloneError {
    fn from(err: BackendError) -> Self {
        let code = match err {
            BackendError::Network(_) => ErrorCode::Network,
            BackendError::Http { .. } => ErrorCode::Backend,
            BackendError::Malformed(_) => ErrorCode::Internal,
        };
        CloneError::new(code, err.to_display_string())
    }
}

pub trait BackendClient: Send + Sync {
    fn primer_details(&self, sequence: &str) -> Result<PrimerDetailsResponse, BackendError>;

    fn primer_heterodimer(
        &self,
        sequence1: &str,
        sequence2: &str,
    ) -> Result<ThermoResult, BackendError>;

    fn design_primers(&self, request: &DesignRequest) -> Result<DesignResponse, BackendError>;
}

pub struct HttpBackend {
    client: Client,
    config: BackendConfig,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Result<Self, CloneError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                CloneError::new(
                    ErrorCode::Network,
                    format!("Could not build backend HTTP client: {e}"),
                )
            })?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn url_with_query(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, BackendError> {
        let endpoint = self.config.endpoint(path);
        Url::parse_with_params(&endpoint, query)
            .map_err(|e| BackendError::Network(format!("Invalid backend URL '{endpoint}': {e}")))
    }

    fn read_json<T: DeserializeOwned>(
        url: &str,
        response: Result<Response, reqwest::Error>,
    ) -> Result<T, BackendError> {
        let response = response.map_err(|e| {
            warn!("Request to {url} failed: {e}");
            BackendError::Network(e.to_string())
        })?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| BackendError::Network(format!("Could not read response body: {e}")))?;
        if !status.is_success() {
            warn!("{url} answered with status {status}");
            return Err(BackendError::from_response(status.as_u16(), &body));
        }
        serde_json::from_str(&body).map_err(|e| {
            warn!("{url} returned unexpected JSON: {e}");
            BackendError::Malformed(e.to_string())
        })
    }
}

impl BackendClient for HttpBackend {
    fn primer_details(&self, sequence: &str) -> Result<PrimerDetailsResponse, BackendError> {
        let url = self.url_with_query(PRIMER_DETAILS_PATH, &[("sequence", sequence)])?;
        debug!("GET {url}");
        let response = self.client.get(url.clone()).send();
        Self::read_json(url.as_str(), response)
    }

    fn primer_heterodimer(
        &self,
        sequence1: &str,
        sequence2: &str,
    ) -> Result<ThermoResult, BackendError> {
        let url = self.url_with_query(
            PRIMER_HETERODIMER_PATH,
            &[("sequence1", sequence1), ("sequence2", sequence2)],
        )?;
        debug!("GET {url}");
        let response = self.client.get(url.clone()).send();
        Self::read_json(url.as_str(), response)
    }

    fn design_primers(&self, request: &DesignRequest) -> Result<DesignResponse, BackendError> {
        let query: Vec<(&str, &str)> = request
            .query
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        let url = self.url_with_query(request.endpoint.path(), &query)?;
        debug!("POST {url}");
        let response = self.client.post(url.clone()).json(&request.body).send();
        Self::read_json(url.as_str(), response)
    }
}
