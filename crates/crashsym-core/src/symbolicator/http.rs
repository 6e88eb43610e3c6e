//! Blocking HTTP client for the symbolication service.

use std::time::Duration;

use crashsym_protocol::{RequestId, SymbolicationResponse};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::client::{SymbolicationTask, SymbolicatorClient};
use crate::error::ServiceError;

/// Extra read time granted on top of the long-poll timeout.
const READ_GRACE: Duration = Duration::from_secs(10);

const MINIDUMP_FIELD: &str = "upload_file_minidump";

/// Agent with connect and read timeouts suitable for long polling.
pub(crate) fn agent(request_timeout: Duration) -> ureq::Agent
{
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(5))
        .timeout_read(request_timeout + READ_GRACE)
        .build()
}

/// Turn a ureq result into a decoded JSON body or a [`ServiceError`].
pub(crate) fn read_json<T: DeserializeOwned>(
    url: &str,
    result: std::result::Result<ureq::Response, ureq::Error>,
) -> Result<T, ServiceError>
{
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(status, _)) => {
            return Err(ServiceError::Status {
                status,
                url: url.to_string(),
            });
        }
        Err(ureq::Error::Transport(err)) => return Err(ServiceError::Transport(format!("{url}: {err}"))),
    };
    let body = response
        .into_string()
        .map_err(|err| ServiceError::InvalidResponse(format!("read body of {url}: {err}")))?;
    serde_json::from_str(&body).map_err(|err| ServiceError::InvalidResponse(format!("decode body of {url}: {err}")))
}

/// [`SymbolicatorClient`] talking to a symbolicator over HTTP
#[derive(Debug, Clone)]
pub struct HttpSymbolicator
{
    agent: ureq::Agent,
    base_url: String,
    timeout_secs: u64,
}

impl HttpSymbolicator
{
    pub fn new(base_url: &str, timeout_secs: u64) -> Self
    {
        Self {
            agent: agent(Duration::from_secs(timeout_secs)),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_secs,
        }
    }

    fn submit_stacktraces(&self, scope: &str, body: &str) -> Result<SymbolicationResponse, ServiceError>
    {
        let url = format!("{}/symbolicate", self.base_url);
        let result = self
            .agent
            .post(&url)
            .query("timeout", &self.timeout_secs.to_string())
            .query("scope", scope)
            .set("content-type", "application/json")
            .send_string(body);
        read_json(&url, result)
    }

    fn submit_minidump(&self, scope: &str, minidump: &[u8], sources: &str) -> Result<SymbolicationResponse, ServiceError>
    {
        let url = format!("{}/minidump", self.base_url);
        let (content_type, body) = multipart_body(minidump, sources);
        let result = self
            .agent
            .post(&url)
            .query("timeout", &self.timeout_secs.to_string())
            .query("scope", scope)
            .set("content-type", &content_type)
            .send_bytes(&body);
        read_json(&url, result)
    }
}

impl SymbolicatorClient for HttpSymbolicator
{
    fn submit(&self, scope: &str, task: &SymbolicationTask) -> Result<SymbolicationResponse, ServiceError>
    {
        match task {
            SymbolicationTask::Stacktraces(request) => {
                let body = serde_json::to_string(request)
                    .map_err(|err| ServiceError::InvalidResponse(format!("encode request: {err}")))?;
                debug!(scope, stacktraces = request.stacktraces.len(), "submitting symbolication request");
                self.submit_stacktraces(scope, &body)
            }
            SymbolicationTask::Minidump { minidump, sources } => {
                let sources = serde_json::to_string(sources)
                    .map_err(|err| ServiceError::InvalidResponse(format!("encode sources: {err}")))?;
                debug!(scope, bytes = minidump.len(), "submitting minidump");
                self.submit_minidump(scope, minidump, &sources)
            }
        }
    }

    fn poll(&self, request_id: &RequestId) -> Result<SymbolicationResponse, ServiceError>
    {
        let url = format!("{}/requests/{}", self.base_url, request_id);
        let result = self
            .agent
            .get(&url)
            .query("timeout", &self.timeout_secs.to_string())
            .call();
        read_json(&url, result)
    }
}

/// Build a `multipart/form-data` body with the minidump file and the sources field.
fn multipart_body(minidump: &[u8], sources: &str) -> (String, Vec<u8>)
{
    let boundary = format!("crashsym-{:x}", md5::compute(minidump));
    let mut body = Vec::with_capacity(minidump.len() + sources.len() + 512);

    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"sources\"\r\n\r\n");
    body.extend_from_slice(sources.as_bytes());
    body.extend_from_slice(b"\r\n");

    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{MINIDUMP_FIELD}\"; filename=\"minidump.dmp\"\r\n").as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(minidump);
    body.extend_from_slice(b"\r\n");

    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}
