//! Common imports for hosts driving the pipeline

pub use crate::cache::{FrameCache, MemoryCache, SharedCache};
pub use crate::config::SymbolicationConfig;
pub use crate::error::{EventError, EventErrorKind, Result, SymbolicationError, SymbolicationFailed};
pub use crate::event::{CrashReport, Frame, StacktraceLocation};
pub use crate::minidump::reprocess_minidump;
pub use crate::processor::{NativeProcessor, ProcessingResult, Services};
pub use crate::symbolicator::{HttpSymbolicator, SymbolicatorClient};
pub use crate::symbolizer::{DwarfSymbolizer, MatchSymbolizer, Symbolizer};
pub use crate::system_symbols::{HttpSystemSymbols, SystemSymbolLookup};
pub use crate::types::{Address, Architecture, DebugImage, SdkInfo};
