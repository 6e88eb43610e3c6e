//! # crashsym-core
//!
//! Symbolication of native crash stack traces.
//!
//! Given a crash report with raw instruction addresses and the list of
//! binaries loaded in the crashed process, this crate works out per frame
//! which address to look up and which image it belongs to, resolves it to
//! function, file, and line through a remote symbolication service, a
//! system symbol service, or local debug files, and merges the results into
//! the report's frames. Frames that cannot be resolved keep their raw form,
//! annotated with the reason.
//!
//! ## Pipeline
//!
//! - [`image_index::ImageIndex`]: address to image lookup
//! - [`instruction::InstructionResolver`]: lookup address per frame
//! - [`cache::FrameCache`]: results shared across events
//! - [`system_symbols::SystemSymbolFallback`]: symbols for OS libraries
//! - [`symbolicator::SymbolicationOrchestrator`]: submit/poll against the service
//! - [`merge::FrameMerger`]: final output frames
//!
//! [`processor::NativeProcessor`] wires these together for one report, and
//! [`minidump::reprocess_minidump`] handles reports created from minidumps.
//!
//! ## Collaborators
//!
//! The shared cache, the symbolication service, the system symbol service,
//! and the local symbolizer are traits so hosts can plug in their own
//! implementations. In-memory and HTTP implementations ship with the crate.

pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod image_index;
pub mod in_app;
pub mod instruction;
pub mod merge;
pub mod minidump;
pub mod prelude;
pub mod processor;
pub mod resolved;
pub mod symbolicator;
pub mod symbolizer;
pub mod system_symbols;
pub mod types;

pub use config::SymbolicationConfig;
pub use error::{Result, SymbolicationError};
pub use event::CrashReport;
pub use processor::{NativeProcessor, ProcessingResult, Services};
