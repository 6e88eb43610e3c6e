//! # Minidump Reprocessing
//!
//! Reports created from a minidump upload start out with whatever the
//! ingesting side could walk on its own. Sending the raw minidump to the
//! symbolication service once gets stack traces walked with call frame
//! information, which replace the threads and images of the report.
//!
//! A marker in the shared cache makes sure this happens at most once per
//! event, even with several workers handling the same event.

use std::time::Duration;

use crashsym_protocol::{CompleteStacktrace, CompletedResponse, RawImage, SymbolicatedFrame};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::cache::SharedCache;
use crate::config::SymbolicationConfig;
use crate::event::{
    CrashReport, DeviceContext, Frame, OsContext, Stacktrace, Thread, ThreadList, SYMBOLICATOR_STATUS_KEY,
};
use crate::symbolicator::{
    handle_response_status, merge_symbolicator_image, SymbolicationOrchestrator, SymbolicationTask, SymbolicatorClient,
};

/// Symbolicate the report's minidump and return the updated report.
///
/// Returns `None` when the minidump was already reprocessed, is missing,
/// the service did not complete the job, or another worker finished first.
/// A failed attempt still sets the marker, so a minidump the service
/// cannot handle is not sent again.
pub fn reprocess_minidump(
    report: &CrashReport,
    cache: &dyn SharedCache,
    client: &dyn SymbolicatorClient,
    config: &SymbolicationConfig,
) -> Option<CrashReport>
{
    let marker_key = report.minidump_reprocessed_cache_key();
    if cache.get(&marker_key).is_some() {
        debug!(event_id = %report.event_id, "minidump already reprocessed");
        return None;
    }

    let Some(minidump) = report.minidump() else {
        error!(event_id = %report.event_id, "missing minidump attachment for reprocessing");
        return None;
    };

    let task = SymbolicationTask::Minidump {
        minidump: minidump.to_vec(),
        sources: config.sources.clone(),
    };
    let orchestrator = SymbolicationOrchestrator::new(client, cache, config);
    let response = orchestrator.run(&report.project.to_string(), &report.request_id_cache_key(), &task);

    let mut errors = Vec::new();
    let completed = handle_response_status(response, &mut errors);

    let ttl = Duration::from_secs(config.minidump_marker_ttl_secs);
    let claimed = cache.set_if_absent(&marker_key, Value::Bool(true), ttl);

    let Some(completed) = completed else {
        warn!(event_id = %report.event_id, ?errors, "minidump was not symbolicated");
        return None;
    };
    if !claimed {
        info!(event_id = %report.event_id, "minidump reprocessed concurrently, discarding result");
        return None;
    }
    Some(merge_minidump_response(report, &completed))
}

/// Copy of `report` with threads, images, and system info from a minidump result.
pub fn merge_minidump_response(report: &CrashReport, completed: &CompletedResponse) -> CrashReport
{
    let mut updated = report.clone();
    let sdk = report.sdk_info();

    let mut images = Vec::with_capacity(completed.modules.len());
    for module in &completed.modules {
        let (image, failures) = merge_symbolicator_image(&RawImage::default(), module, sdk.as_ref());
        for failure in failures {
            updated.push_error(failure.to_event_error());
        }
        images.push(image);
    }
    updated.debug_meta.images = images;

    let threads: Vec<Thread> = completed.stacktraces.iter().map(thread_from_stacktrace).collect();
    let crashed_thread = threads
        .iter()
        .find(|thread| thread.crashed == Some(true))
        .and_then(|thread| thread.id);
    updated.threads = Some(ThreadList { values: threads });

    if let Some(exception) = updated
        .exception
        .as_mut()
        .and_then(|list| list.values.first_mut())
    {
        if let Some(thread_id) = crashed_thread {
            exception.other.insert("thread_id".into(), Value::from(thread_id));
        }
        if let Some(reason) = &completed.crash_reason {
            exception.other.insert("type".into(), Value::from(reason.clone()));
        }
    }

    if let Some(Value::Object(system_info)) = &completed.system_info {
        merge_system_info(&mut updated, system_info);
    }

    updated
}

fn thread_from_stacktrace(stacktrace: &CompleteStacktrace) -> Thread
{
    // The service lists frames crashing frame first.
    let frames = stacktrace.frames.iter().rev().map(frame_from_symbolicated).collect();
    Thread {
        id: stacktrace.thread_id,
        crashed: stacktrace.is_requesting,
        stacktrace: Some(Stacktrace {
            frames,
            registers: (!stacktrace.registers.is_empty()).then(|| stacktrace.registers.clone()),
            other: Map::new(),
        }),
        other: Map::new(),
    }
}

fn frame_from_symbolicated(symbolicated: &SymbolicatedFrame) -> Frame
{
    let mut frame = Frame {
        trust: symbolicated.trust.map(Into::into),
        ..Frame::default()
    };
    frame.merge_candidate(&symbolicated.candidate);

    let status = serde_json::to_value(symbolicated.status).unwrap_or(Value::Null);
    frame
        .data
        .get_or_insert_with(Map::new)
        .insert(SYMBOLICATOR_STATUS_KEY.into(), status);
    frame
}

fn merge_system_info(report: &mut CrashReport, system_info: &Map<String, Value>)
{
    let text = |key: &str| {
        system_info
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    if let Some(arch) = text("cpu_arch") {
        report
            .contexts
            .device
            .get_or_insert_with(DeviceContext::default)
            .arch = Some(arch);
    }

    let os = report.contexts.os.get_or_insert_with(OsContext::default);
    if let Some(name) = text("os_name") {
        os.name = Some(name);
    }
    if let Some(version) = text("os_version") {
        os.version = Some(version);
    }
    if let Some(build) = text("os_build") {
        os.build = Some(build);
    }
}
