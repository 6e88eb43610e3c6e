//! Fake collaborators shared by the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use crashsym_core::config::SymbolicationConfig;
use crashsym_core::error::{ServiceError, SymbolicationFailed};
use crashsym_core::symbolicator::{SymbolicationTask, SymbolicatorClient};
use crashsym_core::symbolizer::{Candidates, SymbolizeRequest, Symbolizer};
use crashsym_core::system_symbols::SystemSymbolLookup;
use crashsym_protocol::{
    RawImage, RequestId, SymbolCandidate, SymbolicationResponse, SystemSymbolRequest, SystemSymbolResponse,
};
use parking_lot::Mutex;
use serde_json::{json, Value};

pub type Reply = Result<SymbolicationResponse, ServiceError>;

/// Symbolication service answering from a script
#[derive(Default)]
pub struct ScriptedClient
{
    submit_replies: Mutex<VecDeque<Reply>>,
    poll_replies: Mutex<VecDeque<Reply>>,
    pub submitted: Mutex<Vec<SymbolicationTask>>,
    pub polled: Mutex<Vec<RequestId>>,
}

impl ScriptedClient
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn on_submit(self, reply: Reply) -> Self
    {
        self.submit_replies.lock().push_back(reply);
        self
    }

    pub fn on_poll(self, reply: Reply) -> Self
    {
        self.poll_replies.lock().push_back(reply);
        self
    }

    pub fn submit_count(&self) -> usize
    {
        self.submitted.lock().len()
    }

    pub fn poll_ids(&self) -> Vec<String>
    {
        self.polled.lock().iter().map(|id| id.0.clone()).collect()
    }
}

impl SymbolicatorClient for ScriptedClient
{
    fn submit(&self, _scope: &str, task: &SymbolicationTask) -> Reply
    {
        self.submitted.lock().push(task.clone());
        self.submit_replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ServiceError::InvalidResponse("no scripted submit reply".into())))
    }

    fn poll(&self, request_id: &RequestId) -> Reply
    {
        self.polled.lock().push(request_id.clone());
        self.poll_replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ServiceError::InvalidResponse("no scripted poll reply".into())))
    }
}

pub fn pending(request_id: &str) -> Reply
{
    Ok(SymbolicationResponse::Pending {
        request_id: RequestId(request_id.into()),
        retry_after: 0,
    })
}

pub fn completed(body: Value) -> Reply
{
    let mut body = body;
    body["status"] = json!("completed");
    Ok(serde_json::from_value(body).unwrap())
}

pub fn http_status(status: u16) -> Reply
{
    Err(ServiceError::Status {
        status,
        url: "http://symbolicator.test/requests".into(),
    })
}

/// System symbol service answering every lookup the same way
pub struct FakeLookup
{
    pub response: SystemSymbolResponse,
    pub requests: Mutex<Vec<SystemSymbolRequest>>,
}

impl FakeLookup
{
    pub fn new(response: Value) -> Self
    {
        Self {
            response: serde_json::from_value(response).unwrap(),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl SystemSymbolLookup for FakeLookup
{
    fn lookup(&self, request: &SystemSymbolRequest) -> Result<SystemSymbolResponse, ServiceError>
    {
        self.requests.lock().push(request.clone());
        Ok(self.response.clone())
    }
}

/// Local symbolizer with a fixed answer that counts its calls
pub struct CountingSymbolizer
{
    calls: AtomicUsize,
    answer: Result<Vec<SymbolCandidate>, SymbolicationFailed>,
}

impl CountingSymbolizer
{
    pub fn returning(candidates: Vec<SymbolCandidate>) -> Self
    {
        Self {
            calls: AtomicUsize::new(0),
            answer: Ok(candidates),
        }
    }

    pub fn failing(failure: SymbolicationFailed) -> Self
    {
        Self {
            calls: AtomicUsize::new(0),
            answer: Err(failure),
        }
    }

    pub fn calls(&self) -> usize
    {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Symbolizer for CountingSymbolizer
{
    fn symbolize(&self, _request: &SymbolizeRequest<'_>) -> Result<Candidates, SymbolicationFailed>
    {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone().map(Candidates::from_vec)
    }
}

pub fn function(name: &str) -> SymbolCandidate
{
    SymbolCandidate {
        function: Some(name.into()),
        ..SymbolCandidate::default()
    }
}

/// Configuration that never sleeps.
pub fn fast_config() -> SymbolicationConfig
{
    SymbolicationConfig {
        initial_backoff_ms: 0,
        max_poll_delay_ms: 0,
        ..SymbolicationConfig::default()
    }
}

pub fn macho_image(code_file: &str, debug_id: &str, start: u64, size: u64) -> RawImage
{
    serde_json::from_value(json!({
        "type": "macho",
        "image_addr": format!("{start:#x}"),
        "image_size": size,
        "debug_id": debug_id,
        "code_file": code_file,
        "arch": "arm64"
    }))
    .unwrap()
}
