//! # Native Processor
//!
//! Runs one crash report through the whole pipeline:
//!
//! 1. index the report's images
//! 2. resolve the lookup address of every native frame and consult the
//!    frame cache
//! 3. ask the system symbol service about frames in OS libraries
//! 4. symbolicate all threads in one request to the symbolication service
//! 5. merge everything into output frames
//!
//! Frames the processor does not handle pass through untouched. Nothing in
//! the input report is modified; [`ProcessingResult::apply`] writes the
//! result back when the caller wants that.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crashsym_protocol::RawImage;

use crate::cache::{FrameCache, SharedCache};
use crate::config::SymbolicationConfig;
use crate::error::{EventError, EventErrorKind, Result};
use crate::event::{CrashReport, Frame, StacktraceLocation, NATIVE_PLATFORMS};
use crate::image_index::ImageIndex;
use crate::instruction::InstructionResolver;
use crate::merge::{FrameMerger, MergeOutcome};
use crate::resolved::ResolvedFrame;
use crate::symbolicator::{
    attach_matches, merge_symbolicator_image, StacktraceBatch, SymbolicationOrchestrator, SymbolicatorClient,
};
use crate::symbolizer::Symbolizer;
use crate::system_symbols::{SystemSymbolFallback, SystemSymbolLookup};
use crate::types::{Architecture, RegisterSnapshot, SdkInfo};

/// Collaborators the processor talks to
#[derive(Clone)]
pub struct Services
{
    pub cache: Arc<dyn SharedCache>,
    pub symbolicator: Option<Arc<dyn SymbolicatorClient>>,
    pub system_symbols: Option<Arc<dyn SystemSymbolLookup>>,
    pub symbolizer: Arc<dyn Symbolizer>,
}

impl Services
{
    /// Services without any remote collaborator.
    pub fn new(cache: Arc<dyn SharedCache>, symbolizer: Arc<dyn Symbolizer>) -> Self
    {
        Self {
            cache,
            symbolicator: None,
            system_symbols: None,
            symbolizer,
        }
    }

    #[must_use]
    pub fn with_symbolicator(mut self, client: Arc<dyn SymbolicatorClient>) -> Self
    {
        self.symbolicator = Some(client);
        self
    }

    #[must_use]
    pub fn with_system_symbols(mut self, lookup: Arc<dyn SystemSymbolLookup>) -> Self
    {
        self.system_symbols = Some(lookup);
        self
    }
}

impl std::fmt::Debug for Services
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("Services")
            .field("symbolicator", &self.symbolicator.is_some())
            .field("system_symbols", &self.system_symbols.is_some())
            .finish_non_exhaustive()
    }
}

/// Output frames of one input stack trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedStacktrace
{
    pub location: StacktraceLocation,
    pub frames: Vec<Frame>,
    /// Input frames with package defaults filled in.
    pub raw_frames: Vec<Frame>,
}

impl ProcessedStacktrace
{
    /// `true` if symbolication changed anything.
    pub fn is_modified(&self) -> bool
    {
        self.frames != self.raw_frames
    }
}

/// Everything one processing pass produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult
{
    pub stacktraces: Vec<ProcessedStacktrace>,
    /// The report's image list, with completion records merged in.
    pub images: Vec<RawImage>,
    pub errors: Vec<EventError>,
    /// Debug ids of the images any handled frame pointed into.
    pub referenced_debug_ids: BTreeSet<String>,
}

impl ProcessingResult
{
    /// Write the result into `report`.
    ///
    /// Modified stack traces keep their input frames next to them as
    /// `raw_stacktrace` on the owning exception or thread.
    pub fn apply(self, report: &mut CrashReport)
    {
        for processed in self.stacktraces {
            let modified = processed.is_modified();
            let raw = json!({ "frames": processed.raw_frames });
            if let Some(stacktrace) = report.stacktrace_mut(processed.location) {
                stacktrace.frames = processed.frames;
            }
            if modified {
                store_raw_stacktrace(report, processed.location, raw);
            }
        }
        report.debug_meta.images = self.images;
        for error in self.errors {
            report.push_error(error);
        }
    }
}

fn store_raw_stacktrace(report: &mut CrashReport, location: StacktraceLocation, raw: Value)
{
    let owner = match location {
        StacktraceLocation::Exception(index) => report
            .exception
            .as_mut()
            .and_then(|list| list.values.get_mut(index))
            .map(|exception| &mut exception.other),
        StacktraceLocation::Thread(index) => report
            .threads
            .as_mut()
            .and_then(|list| list.values.get_mut(index))
            .map(|thread| &mut thread.other),
        StacktraceLocation::TopLevel => Some(&mut report.other),
    };
    if let Some(owner) = owner {
        owner.insert("raw_stacktrace".to_string(), raw);
    }
}

fn push_unique(errors: &mut Vec<EventError>, error: EventError)
{
    if !errors.contains(&error) {
        errors.push(error);
    }
}

/// `true` if `frame` carries a native address the processor should look at.
///
/// The frame's own platform wins over the report's.
pub fn handles_frame(frame: &Frame, report_platform: Option<&str>) -> bool
{
    let platform = frame.platform.as_deref().or(report_platform);
    platform.is_some_and(|platform| NATIVE_PLATFORMS.contains(&platform))
        && !frame.has_symbolicator_status()
        && frame.instruction_addr.is_some()
}

/// Handled frames of a report, ready for symbolication
#[derive(Debug, Clone, Default)]
pub struct PreparedFrames
{
    pub resolved: Vec<ResolvedFrame>,
    /// One batch per stack trace with handled frames.
    pub batches: Vec<StacktraceBatch>,
    /// Per stack trace, the index into `resolved` of each of its frames.
    pub slots: Vec<Vec<Option<usize>>>,
}

/// Symbolicates the native stack traces of one crash report
pub struct NativeProcessor<'a>
{
    report: &'a CrashReport,
    config: &'a SymbolicationConfig,
    services: &'a Services,
    images: ImageIndex,
    sdk: Option<SdkInfo>,
    resolver: InstructionResolver,
}

impl<'a> NativeProcessor<'a>
{
    pub fn new(report: &'a CrashReport, config: &'a SymbolicationConfig, services: &'a Services) -> Self
    {
        let images = ImageIndex::new(&report.debug_meta.images);
        let architecture = Architecture::from_optional_name(report.cpu_name());
        Self {
            report,
            config,
            services,
            images,
            sdk: report.sdk_info(),
            resolver: InstructionResolver::new(architecture, report.signal()),
        }
    }

    /// `true` if the report has at least one usable image.
    ///
    /// The report's platform does not matter; native frames inside a
    /// managed report are still symbolicated.
    pub fn is_available(&self) -> bool
    {
        !self.images.is_empty()
    }

    pub fn handles_frame(&self, frame: &Frame) -> bool
    {
        self.is_available() && handles_frame(frame, self.report.platform.as_deref())
    }

    pub fn images(&self) -> &ImageIndex
    {
        &self.images
    }

    pub fn resolver(&self) -> &InstructionResolver
    {
        &self.resolver
    }

    fn frame_cache(&self) -> FrameCache
    {
        FrameCache::new(
            Arc::clone(&self.services.cache),
            Duration::from_secs(self.config.frame_cache_ttl_secs),
        )
    }

    /// Resolve every handled frame, batched per stack trace crashing frame first.
    pub fn prepare(&self, cache: Option<&FrameCache>) -> PreparedFrames
    {
        let mut resolved = Vec::new();
        let mut batches = Vec::new();
        let mut slots = Vec::new();

        for (location, stacktrace) in self.report.stacktraces() {
            let registers = RegisterSnapshot::from(stacktrace.registers.as_ref());
            let count = stacktrace.frames.len();
            let mut batch = StacktraceBatch {
                registers: registers.clone(),
                frames: Vec::new(),
            };
            let mut stacktrace_slots = vec![None; count];

            for (frame_index, frame) in stacktrace.frames.iter().enumerate().rev() {
                if !self.handles_frame(frame) {
                    continue;
                }
                let crash_index = count - 1 - frame_index;
                let Some(prepared) = ResolvedFrame::prepare(
                    location,
                    frame_index,
                    crash_index,
                    frame,
                    &registers,
                    &self.resolver,
                    &self.images,
                    cache,
                ) else {
                    continue;
                };
                stacktrace_slots[frame_index] = Some(resolved.len());
                batch.frames.push(resolved.len());
                resolved.push(prepared);
            }

            if !batch.frames.is_empty() {
                batches.push(batch);
            }
            slots.push(stacktrace_slots);
        }

        PreparedFrames {
            resolved,
            batches,
            slots,
        }
    }

    /// Run the pipeline and collect the output.
    pub fn process(&self) -> Result<ProcessingResult>
    {
        if !self.is_available() {
            debug!(event_id = %self.report.event_id, "no usable images, leaving report unchanged");
            return Ok(ProcessingResult {
                images: self.report.debug_meta.images.clone(),
                ..ProcessingResult::default()
            });
        }
        let cache = self.frame_cache();
        let PreparedFrames {
            mut resolved,
            batches,
            slots,
        } = self.prepare(Some(&cache));
        let mut errors = Vec::new();
        let mut images: Vec<RawImage> = self.report.debug_meta.images.clone();
        let mut image_failures: HashMap<usize, Vec<EventError>> = HashMap::new();

        debug!(
            event_id = %self.report.event_id,
            frames = resolved.len(),
            images = self.images.len(),
            cached = resolved.iter().filter(|frame| frame.cache_value.is_some()).count(),
            "prepared frames"
        );

        if self.config.system_symbols_enabled {
            if let Some(lookup) = &self.services.system_symbols {
                match SystemSymbolFallback::new(lookup.as_ref(), self.sdk.as_ref(), self.report.cpu_name()) {
                    Some(fallback) => fallback.run(&mut resolved),
                    None => debug!(event_id = %self.report.event_id, "no SDK id, skipping system symbols"),
                }
            }
        }

        if let Some(client) = &self.services.symbolicator {
            let orchestrator = SymbolicationOrchestrator::new(client.as_ref(), self.services.cache.as_ref(), self.config);
            let outcome = orchestrator.symbolicate(
                &self.report.project.to_string(),
                &self.report.request_id_cache_key(),
                &batches,
                &resolved,
                self.images.images(),
                self.report.signal(),
                &mut errors,
            );
            match outcome {
                Ok(Some(completed)) => {
                    for (image, complete) in self.images.images().iter().zip(&completed.modules) {
                        let (merged, failures) = merge_symbolicator_image(image.raw(), complete, self.sdk.as_ref());
                        if let Some(position) = self.images.report_position(image.index()) {
                            images[position] = merged;
                        }
                        for failure in failures {
                            let error = failure.to_event_error();
                            push_unique(&mut errors, error.clone());
                            image_failures.entry(image.index()).or_default().push(error);
                        }
                    }
                    attach_matches(&completed, &batches, &mut resolved);
                    info!(
                        event_id = %self.report.event_id,
                        stacktraces = completed.stacktraces.len(),
                        "symbolication service completed"
                    );
                }
                Ok(None) => {}
                Err(err) => {
                    error!(event_id = %self.report.event_id, error = %err, "discarding symbolication result");
                    push_unique(
                        &mut errors,
                        EventError::new(EventErrorKind::NativeInternalFailure).with_message(err.to_string()),
                    );
                }
            }
        }

        let merger = FrameMerger::new(self.services.symbolizer.as_ref(), Some(&cache), self.sdk.as_ref());
        let outcomes: Vec<MergeOutcome> = resolved
            .iter()
            .map(|frame| {
                let mut outcome = merger.merge(frame);
                let failures = frame
                    .image
                    .as_ref()
                    .and_then(|image| image_failures.get(&image.index()));
                if let Some(failures) = failures {
                    annotate_image_failures(&mut outcome, failures);
                }
                for error in &outcome.errors {
                    push_unique(&mut errors, error.clone());
                }
                outcome
            })
            .collect();

        let stacktraces = self
            .report
            .stacktraces()
            .into_iter()
            .zip(slots)
            .map(|((location, stacktrace), stacktrace_slots)| {
                let mut frames = Vec::with_capacity(stacktrace.frames.len());
                let mut raw_frames = Vec::with_capacity(stacktrace.frames.len());
                for (frame, slot) in stacktrace.frames.iter().zip(stacktrace_slots) {
                    match slot.and_then(|index| outcomes.get(index)) {
                        Some(outcome) => {
                            match &outcome.new_frames {
                                Some(new_frames) => frames.extend(new_frames.iter().cloned()),
                                None => frames.extend(outcome.raw_frames.iter().cloned()),
                            }
                            raw_frames.extend(outcome.raw_frames.iter().cloned());
                        }
                        None => {
                            frames.push(frame.clone());
                            raw_frames.push(frame.clone());
                        }
                    }
                }
                ProcessedStacktrace {
                    location,
                    frames,
                    raw_frames,
                }
            })
            .collect();

        let referenced_debug_ids = resolved
            .iter()
            .filter_map(|frame| frame.debug_id().map(str::to_string))
            .collect();

        if !errors.is_empty() {
            warn!(event_id = %self.report.event_id, errors = errors.len(), "symbolication finished with errors");
        }

        Ok(ProcessingResult {
            stacktraces,
            images,
            errors,
            referenced_debug_ids,
        })
    }
}

/// Put the failures of a frame's image onto its output frames.
fn annotate_image_failures(outcome: &mut MergeOutcome, failures: &[EventError])
{
    let failures: Vec<&EventError> = failures
        .iter()
        .filter(|failure| !outcome.errors.contains(*failure))
        .collect();
    if failures.is_empty() {
        return;
    }
    let frames = outcome
        .new_frames
        .get_or_insert_with(|| outcome.raw_frames.clone());
    for frame in frames {
        for failure in &failures {
            frame.push_error(failure);
        }
    }
}
