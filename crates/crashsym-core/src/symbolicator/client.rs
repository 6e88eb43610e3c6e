//! The symbolication service seam.

use crashsym_protocol::{RequestId, SymbolicationRequest, SymbolicationResponse};
use serde_json::Value;

use crate::error::ServiceError;

/// Work submitted to the symbolication service
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolicationTask
{
    /// Symbolicate already walked stack traces.
    Stacktraces(SymbolicationRequest),
    /// Walk and symbolicate a raw minidump.
    Minidump
    {
        minidump: Vec<u8>,
        sources: Vec<Value>,
    },
}

/// Transport to the bulk symbolication service
///
/// Both calls return whatever status the service reports; `pending`
/// responses carry the id to poll next.
pub trait SymbolicatorClient: Send + Sync
{
    /// Submit a new job under `scope` (the project).
    fn submit(&self, scope: &str, task: &SymbolicationTask) -> Result<SymbolicationResponse, ServiceError>;

    /// Poll a job by id. An unknown id is reported as HTTP 404.
    fn poll(&self, request_id: &RequestId) -> Result<SymbolicationResponse, ServiceError>;
}
