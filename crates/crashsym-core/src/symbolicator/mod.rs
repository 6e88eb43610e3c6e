//! # Symbolication Service
//!
//! Everything that talks to the bulk symbolication service: the client
//! seam and its HTTP implementation, the submit/poll orchestration, and the
//! merging of per-image results.

pub mod client;
pub mod http;
pub mod merge_image;
pub mod orchestrator;

pub use client::{SymbolicationTask, SymbolicatorClient};
pub use http::HttpSymbolicator;
pub use merge_image::merge_symbolicator_image;
pub use orchestrator::{
    attach_matches, build_request, handle_response_status, validate_completed, RequestState, StacktraceBatch,
    SymbolicationOrchestrator,
};
