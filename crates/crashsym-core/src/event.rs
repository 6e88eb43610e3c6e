//! # Event Model
//!
//! The crash report as the pipeline reads and writes it.
//!
//! Only the fields the pipeline interprets are typed. Everything else an SDK
//! sends is kept in flattened `other` maps, so a report survives a
//! read-process-write cycle unchanged apart from the symbolicated frames.
//!
//! Stack traces list their frames caller-first (outermost call at index 0,
//! crashing frame last), the order SDKs send them in.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crashsym_protocol::{FrameTrust, HexValue, RawImage, RegisterMap, SymbolCandidate, Verbatim};

use crate::error::{EventError, Result, SymbolicationError};
use crate::types::SdkInfo;

/// Platforms whose frames carry native instruction addresses.
pub const NATIVE_PLATFORMS: &[&str] = &["native", "cocoa"];

/// Key under a frame's `data` marking it as already processed by the symbolication service.
pub const SYMBOLICATOR_STATUS_KEY: &str = "symbolicator_status";

/// A single stack frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame
{
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction_addr: Option<Verbatim<HexValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust: Option<Verbatim<FrameTrust>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol_addr: Option<HexValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abs_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineno: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_addr: Option<HexValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Frame
{
    /// A bare frame at `address`.
    pub fn at(address: u64) -> Self
    {
        Self {
            instruction_addr: Some(HexValue(address).into()),
            ..Self::default()
        }
    }

    /// The frame's instruction address, however the report wrote it.
    pub fn address(&self) -> Option<HexValue>
    {
        self.instruction_addr.as_ref().map(Verbatim::value)
    }

    /// Trust of the frame, [`FrameTrust::Unknown`] if the SDK did not say.
    pub fn trust(&self) -> FrameTrust
    {
        self.trust.as_ref().map(Verbatim::value).unwrap_or_default()
    }

    /// `true` once the symbolication service has produced this frame.
    pub fn has_symbolicator_status(&self) -> bool
    {
        self.data
            .as_ref()
            .and_then(|data| data.get(SYMBOLICATOR_STATUS_KEY))
            .is_some_and(|status| !status.is_null() && status != &Value::Bool(false) && status != "")
    }

    /// Overlay the fields a symbol candidate carries onto this frame.
    ///
    /// Fields the candidate leaves empty keep their current value, so
    /// merging the same candidate twice gives the same frame.
    pub fn merge_candidate(&mut self, candidate: &SymbolCandidate)
    {
        fn overlay<T: Clone>(slot: &mut Option<T>, value: &Option<T>)
        {
            if let Some(value) = value {
                *slot = Some(value.clone());
            }
        }

        if let Some(addr) = candidate.instruction_addr {
            self.instruction_addr = Some(addr.into());
        }
        overlay(&mut self.package, &candidate.package);
        overlay(&mut self.lang, &candidate.lang);
        overlay(&mut self.symbol, &candidate.symbol);
        overlay(&mut self.function, &candidate.function);
        overlay(&mut self.symbol_addr, &candidate.symbol_addr);
        overlay(&mut self.filename, &candidate.filename);
        overlay(&mut self.abs_path, &candidate.abs_path);
        overlay(&mut self.lineno, &candidate.lineno);
        overlay(&mut self.line_addr, &candidate.line_addr);
    }

    /// Record a frame-level processing error under `data.errors`.
    pub fn push_error(&mut self, error: &EventError)
    {
        let Ok(value) = serde_json::to_value(error) else {
            return;
        };
        let data = self.data.get_or_insert_with(Map::new);
        match data.entry("errors").or_insert_with(|| Value::Array(Vec::new())) {
            Value::Array(errors) => errors.push(value),
            other => *other = Value::Array(vec![value]),
        }
    }
}

/// Frames of one thread or exception
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stacktrace
{
    #[serde(default)]
    pub frames: Vec<Frame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registers: Option<RegisterMap>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalMeta
{
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MechanismMeta
{
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<SignalMeta>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// How the exception was captured (`minidump`, `mach`, `signalhandler`, ...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mechanism
{
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<MechanismMeta>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exception
{
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mechanism: Option<Mechanism>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<Stacktrace>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExceptionList
{
    #[serde(default)]
    pub values: Vec<Exception>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thread
{
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crashed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<Stacktrace>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadList
{
    #[serde(default)]
    pub values: Vec<Thread>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceContext
{
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OsContext
{
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contexts
{
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<OsContext>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Contexts
{
    pub fn is_empty(&self) -> bool
    {
        self.device.is_none() && self.os.is_none() && self.other.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugMeta
{
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<RawImage>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl DebugMeta
{
    pub fn is_empty(&self) -> bool
    {
        self.images.is_empty() && self.other.is_empty()
    }
}

/// Where a stack trace lives inside a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum StacktraceLocation
{
    /// `exception.values[i].stacktrace`
    Exception(usize),
    /// `threads.values[i].stacktrace`
    Thread(usize),
    /// The top-level `stacktrace`
    TopLevel,
}

/// A native crash report
///
/// ## Example
///
/// ```rust
/// use crashsym_core::event::CrashReport;
///
/// let report = CrashReport::from_json(r#"{
///     "event_id": "9dac1e3a5b2f4e5c8d7a6b5c4d3e2f10",
///     "project": 42,
///     "platform": "cocoa",
///     "contexts": {"device": {"arch": "arm64"}, "os": {"name": "iOS", "version": "14.4", "build": "18D52"}},
///     "exception": {"values": [{"mechanism": {"type": "mach", "meta": {"signal": {"number": 11}}}}]}
/// }"#).unwrap();
///
/// assert_eq!(report.cpu_name(), Some("arm64"));
/// assert_eq!(report.signal(), Some(11));
/// assert_eq!(report.sdk_info().unwrap().sdk_id().as_deref(), Some("iOS_14.4.0_18D52"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrashReport
{
    pub event_id: String,
    pub project: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Contexts::is_empty")]
    pub contexts: Contexts,
    #[serde(default, skip_serializing_if = "DebugMeta::is_empty")]
    pub debug_meta: DebugMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<ThreadList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<Stacktrace>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<EventError>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
    /// Raw minidump attachment, never serialized.
    #[serde(skip)]
    minidump: Option<Vec<u8>>,
}

impl CrashReport
{
    /// Parse a report from JSON text.
    pub fn from_json(text: &str) -> Result<Self>
    {
        let report: CrashReport = serde_json::from_str(text)?;
        if report.event_id.is_empty() {
            return Err(SymbolicationError::InvalidReport("event_id is empty".into()));
        }
        Ok(report)
    }

    /// Attach the raw minidump the report was created from.
    #[must_use]
    pub fn with_minidump(mut self, minidump: Vec<u8>) -> Self
    {
        self.minidump = Some(minidump);
        self
    }

    pub fn minidump(&self) -> Option<&[u8]>
    {
        self.minidump.as_deref().filter(|bytes| !bytes.is_empty())
    }

    /// CPU name from the device context.
    pub fn cpu_name(&self) -> Option<&str>
    {
        self.contexts.device.as_ref()?.arch.as_deref()
    }

    /// Signal number of the first exception mechanism that has one.
    pub fn signal(&self) -> Option<u32>
    {
        self.exception
            .as_ref()?
            .values
            .iter()
            .filter_map(|exception| exception.mechanism.as_ref()?.meta.as_ref()?.signal.as_ref()?.number)
            .next()
    }

    /// SDK info derived from the OS context.
    pub fn sdk_info(&self) -> Option<SdkInfo>
    {
        let os = self.contexts.os.as_ref()?;
        SdkInfo::from_os(os.name.as_deref()?, os.version.as_deref()?, os.build.as_deref())
    }

    /// `true` if the report was created from a minidump upload.
    pub fn is_minidump_event(&self) -> bool
    {
        self.exception.as_ref().is_some_and(|list| {
            list.values
                .first()
                .and_then(|exception| exception.mechanism.as_ref())
                .is_some_and(|mechanism| mechanism.ty.as_deref() == Some("minidump"))
        })
    }

    /// All stack traces in a fixed order: exceptions, threads, top level.
    pub fn stacktraces(&self) -> Vec<(StacktraceLocation, &Stacktrace)>
    {
        let mut found = Vec::new();
        if let Some(exceptions) = &self.exception {
            for (index, exception) in exceptions.values.iter().enumerate() {
                if let Some(stacktrace) = &exception.stacktrace {
                    found.push((StacktraceLocation::Exception(index), stacktrace));
                }
            }
        }
        if let Some(threads) = &self.threads {
            for (index, thread) in threads.values.iter().enumerate() {
                if let Some(stacktrace) = &thread.stacktrace {
                    found.push((StacktraceLocation::Thread(index), stacktrace));
                }
            }
        }
        if let Some(stacktrace) = &self.stacktrace {
            found.push((StacktraceLocation::TopLevel, stacktrace));
        }
        found
    }

    pub fn stacktrace_mut(&mut self, location: StacktraceLocation) -> Option<&mut Stacktrace>
    {
        match location {
            StacktraceLocation::Exception(index) => self.exception.as_mut()?.values.get_mut(index)?.stacktrace.as_mut(),
            StacktraceLocation::Thread(index) => self.threads.as_mut()?.values.get_mut(index)?.stacktrace.as_mut(),
            StacktraceLocation::TopLevel => self.stacktrace.as_mut(),
        }
    }

    /// Cache key holding the in-flight symbolication request id of this event.
    pub fn request_id_cache_key(&self) -> String
    {
        crate::cache::keys::request_id_cache_key(&self.event_id, self.project)
    }

    /// Cache key marking the minidump of this event as already reprocessed.
    pub fn minidump_reprocessed_cache_key(&self) -> String
    {
        crate::cache::keys::minidump_reprocessed_cache_key(&self.event_id, self.project)
    }

    /// Record an event-level error unless an identical one is already present.
    pub fn push_error(&mut self, error: EventError)
    {
        if !self.errors.contains(&error) {
            self.errors.push(error);
        }
    }
}
