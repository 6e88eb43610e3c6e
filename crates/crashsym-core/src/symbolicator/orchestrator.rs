//! Submit/poll coordination with the symbolication service.
//!
//! All frames of all threads of an event go out in one request. The service
//! answers either with a result or with a request id to poll. That id is
//! stored in the shared cache so another worker picking up the same event
//! (or a retry of this one) polls the running job instead of submitting a
//! duplicate.

use std::thread;
use std::time::{Duration, Instant};

use crashsym_protocol::{
    CompletedResponse, RequestFrame, RequestId, RequestStacktrace, SymbolicationRequest, SymbolicationResponse,
    Verbatim,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::client::{SymbolicationTask, SymbolicatorClient};
use crate::cache::SharedCache;
use crate::config::SymbolicationConfig;
use crate::error::{EventError, EventErrorKind, Result, ServiceError, SymbolicationError};
use crate::resolved::ResolvedFrame;
use crate::types::{DebugImage, RegisterSnapshot};

/// The frames of one thread as submitted, crashing frame first
#[derive(Debug, Clone, Default)]
pub struct StacktraceBatch
{
    pub registers: RegisterSnapshot,
    /// Indices into the pass's resolved frames.
    pub frames: Vec<usize>,
}

/// Where a job stands between two service calls
#[derive(Debug, Clone, PartialEq)]
pub enum RequestState
{
    Submitting,
    Polling(RequestId),
    /// The service reported a final status (which may still be a failure).
    Completed(SymbolicationResponse),
    /// Transport failures exhausted all attempts.
    Failed(ServiceError),
    /// Poll budget or deadline exhausted; the job may still finish later.
    TimedOut,
}

impl RequestState
{
    pub fn is_terminal(&self) -> bool
    {
        matches!(
            self,
            RequestState::Completed(_) | RequestState::Failed(_) | RequestState::TimedOut
        )
    }
}

/// Drives jobs on the symbolication service to completion
pub struct SymbolicationOrchestrator<'a>
{
    client: &'a dyn SymbolicatorClient,
    cache: &'a dyn SharedCache,
    config: &'a SymbolicationConfig,
}

impl<'a> SymbolicationOrchestrator<'a>
{
    pub fn new(client: &'a dyn SymbolicatorClient, cache: &'a dyn SharedCache, config: &'a SymbolicationConfig) -> Self
    {
        Self { client, cache, config }
    }

    /// Run `task` until the service reports a final status.
    ///
    /// Returns `None` if no final status was reached: transport failures
    /// exhausted their retries (the stored request id is dropped) or the
    /// poll budget ran out (the id is kept so a later attempt resumes).
    pub fn run(&self, scope: &str, request_id_key: &str, task: &SymbolicationTask) -> Option<SymbolicationResponse>
    {
        let deadline = Instant::now() + self.config.deadline();
        let mut polls = 0u32;
        let mut state = match self.stored_request_id(request_id_key) {
            Some(request_id) => {
                debug!(%request_id, "resuming stored symbolication request");
                RequestState::Polling(request_id)
            }
            None => RequestState::Submitting,
        };

        while !state.is_terminal() {
            if Instant::now() >= deadline {
                warn!(key = request_id_key, "symbolication deadline exceeded");
                state = RequestState::TimedOut;
                break;
            }
            if matches!(state, RequestState::Polling(_)) {
                if polls >= self.config.max_polls {
                    warn!(key = request_id_key, polls, "symbolication poll budget exhausted");
                    state = RequestState::TimedOut;
                    break;
                }
                polls += 1;
            }
            state = self.step(scope, request_id_key, task, state, deadline);
        }

        match state {
            RequestState::Completed(response) => Some(response),
            RequestState::Failed(err) => {
                error!(key = request_id_key, error = %err, "symbolication request failed");
                None
            }
            _ => None,
        }
    }

    /// One service call and the resulting transition.
    fn step(&self, scope: &str, key: &str, task: &SymbolicationTask, state: RequestState, deadline: Instant)
        -> RequestState
    {
        let polling = matches!(state, RequestState::Polling(_));
        let result = match &state {
            RequestState::Submitting => self.with_retries(deadline, || self.client.submit(scope, task)),
            RequestState::Polling(request_id) => self.with_retries(deadline, || self.client.poll(request_id)),
            _ => return state,
        };

        match result {
            Ok(SymbolicationResponse::Pending {
                request_id,
                retry_after,
            }) => {
                let request_id = self.claim(key, request_id);
                let delay = Duration::from_secs(retry_after).min(self.config.max_poll_delay());
                sleep_until_deadline(delay, deadline);
                RequestState::Polling(request_id)
            }
            Ok(response) => {
                info!(key, status = response.status(), "symbolication request finished");
                self.cache.delete(key);
                RequestState::Completed(response)
            }
            Err(err) if polling && err.is_not_found() => {
                debug!(key, "stored request id is unknown to the service, resubmitting");
                self.cache.delete(key);
                RequestState::Submitting
            }
            Err(err) => {
                self.cache.delete(key);
                RequestState::Failed(err)
            }
        }
    }

    /// Store `request_id` unless another worker already stored one, then return the id to poll.
    fn claim(&self, key: &str, request_id: RequestId) -> RequestId
    {
        let ttl = Duration::from_secs(self.config.request_id_ttl_secs);
        if self.cache.set_if_absent(key, Value::String(request_id.0.clone()), ttl) {
            return request_id;
        }
        match self.stored_request_id(key) {
            Some(existing) if existing != request_id => {
                debug!(ours = %request_id, theirs = %existing, "another worker owns this request");
                existing
            }
            _ => request_id,
        }
    }

    fn stored_request_id(&self, key: &str) -> Option<RequestId>
    {
        match self.cache.get(key)? {
            Value::String(id) if !id.is_empty() => Some(RequestId(id)),
            _ => None,
        }
    }

    /// Retry retryable failures with exponential backoff.
    fn with_retries<T>(
        &self,
        deadline: Instant,
        mut call: impl FnMut() -> std::result::Result<T, ServiceError>,
    ) -> std::result::Result<T, ServiceError>
    {
        let mut backoff = self.config.initial_backoff();
        let mut attempt = 1;
        loop {
            match call() {
                Err(err) if err.is_retryable() && attempt < self.config.max_attempts => {
                    warn!(attempt, error = %err, "symbolication service call failed, retrying");
                    sleep_until_deadline(backoff, deadline);
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Submit all batches and wait for a validated result.
    ///
    /// Returns `Ok(None)` without contacting the service when no batch has a
    /// frame, and when the service did not complete the job; in the latter
    /// case an event error describing the outcome is pushed to `errors`.
    /// A completed response whose module or stacktrace count does not match
    /// the request is a [`SymbolicationError::ProtocolViolation`].
    #[allow(clippy::too_many_arguments)]
    pub fn symbolicate(
        &self,
        scope: &str,
        request_id_key: &str,
        batches: &[StacktraceBatch],
        frames: &[ResolvedFrame],
        images: &[DebugImage],
        signal: Option<u32>,
        errors: &mut Vec<EventError>,
    ) -> Result<Option<CompletedResponse>>
    {
        if batches.iter().all(|batch| batch.frames.is_empty()) {
            return Ok(None);
        }

        let request = build_request(batches, frames, images, signal, &self.config.sources);
        let response = self.run(scope, request_id_key, &SymbolicationTask::Stacktraces(request));
        let Some(completed) = handle_response_status(response, errors) else {
            return Ok(None);
        };
        validate_completed(&completed, images.len(), batches.len())?;
        Ok(Some(completed))
    }
}

/// Assemble the request body for a set of batches.
pub fn build_request(
    batches: &[StacktraceBatch],
    frames: &[ResolvedFrame],
    images: &[DebugImage],
    signal: Option<u32>,
    sources: &[Value],
) -> SymbolicationRequest
{
    let stacktraces = batches
        .iter()
        .map(|batch| RequestStacktrace {
            registers: batch.registers.as_map().clone(),
            frames: batch
                .frames
                .iter()
                .filter_map(|&index| frames.get(index))
                .filter_map(|frame| {
                    Some(RequestFrame {
                        instruction_addr: frame.raw.address()?,
                        trust: frame.raw.trust.as_ref().map(Verbatim::value),
                    })
                })
                .collect(),
        })
        .collect();

    SymbolicationRequest {
        signal,
        sources: sources.to_vec(),
        stacktraces,
        modules: images.iter().map(|image| image.raw().clone()).collect(),
    }
}

/// Keep a completed response, or record why there is none.
///
/// A `failed` status is reported with the service's message; no response
/// at all and every other status count as an internal failure.
pub fn handle_response_status(
    response: Option<SymbolicationResponse>,
    errors: &mut Vec<EventError>,
) -> Option<CompletedResponse>
{
    let error = match response {
        Some(SymbolicationResponse::Completed(completed)) => return Some(completed),
        Some(SymbolicationResponse::Failed { message }) => {
            let error = EventError::new(EventErrorKind::NativeSymbolicatorFailed);
            if message.is_empty() {
                error
            } else {
                error.with_message(message)
            }
        }
        Some(other) => {
            error!(status = other.status(), "unexpected symbolication status");
            EventError::new(EventErrorKind::NativeInternalFailure)
        }
        None => EventError::new(EventErrorKind::NativeInternalFailure),
    };
    if !errors.contains(&error) {
        errors.push(error);
    }
    None
}

/// Check that a completed response answers exactly the submitted request.
pub fn validate_completed(completed: &CompletedResponse, image_count: usize, batch_count: usize) -> Result<()>
{
    if completed.modules.len() != image_count {
        return Err(SymbolicationError::ProtocolViolation(format!(
            "expected {image_count} modules, got {}",
            completed.modules.len()
        )));
    }
    if completed.stacktraces.len() != batch_count {
        return Err(SymbolicationError::ProtocolViolation(format!(
            "expected {batch_count} stacktraces, got {}",
            completed.stacktraces.len()
        )));
    }
    Ok(())
}

/// Sleep for `delay`, but never past `deadline`.
fn sleep_until_deadline(delay: Duration, deadline: Instant)
{
    let delay = delay.min(deadline.saturating_duration_since(Instant::now()));
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}

/// Hand every returned frame to the resolved frame it was computed for.
///
/// Frames are matched by `original_index` within their batch, never by
/// position. Entries without a usable index are skipped.
pub fn attach_matches(completed: &CompletedResponse, batches: &[StacktraceBatch], frames: &mut [ResolvedFrame])
{
    for (batch, stacktrace) in batches.iter().zip(&completed.stacktraces) {
        for symbolicated in &stacktrace.frames {
            let target = symbolicated
                .original_index
                .and_then(|original| batch.frames.get(original))
                .copied();
            match target.and_then(|index| frames.get_mut(index)) {
                Some(frame) => frame.remote_matches.push(symbolicated.clone()),
                None => warn!(
                    original_index = ?symbolicated.original_index,
                    "symbolicated frame does not refer to a submitted frame"
                ),
            }
        }
    }
}
