//! End-to-end processing with fake services

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{completed, fast_config, function, macho_image, pending, CountingSymbolizer, FakeLookup, ScriptedClient};
use crashsym_core::cache::{MemoryCache, SharedCache};
use crashsym_core::error::EventErrorKind;
use crashsym_core::event::CrashReport;
use crashsym_core::minidump::reprocess_minidump;
use crashsym_core::processor::{NativeProcessor, Services};
use crashsym_core::symbolizer::MatchSymbolizer;
use crashsym_core::SymbolicationConfig;
use crashsym_protocol::HexValue;
use serde_json::{json, Value};

const APP_ID: &str = "c0bcc3f1-9827-fe65-3058-404b2831d9e6";
const LIBC_ID: &str = "9f2f6a47-3a1b-4b5e-8c77-2c5f1e9d0a11";

fn ios_report() -> CrashReport
{
    serde_json::from_value(json!({
        "event_id": "9dac1e3a5b2f4e5c8d7a6b5c4d3e2f10",
        "project": 42,
        "platform": "cocoa",
        "contexts": {
            "device": {"arch": "arm64"},
            "os": {"name": "iOS", "version": "14.4", "build": "18D52"}
        },
        "exception": {"values": [{"mechanism": {"type": "mach", "meta": {"signal": {"number": 11}}}}]},
        "debug_meta": {"images": [
            macho_image("/var/containers/Bundle/App.app/App", APP_ID, 0x1000, 0x1000),
            macho_image("/usr/lib/system/libsystem_c.dylib", LIBC_ID, 0x5000, 0x1000),
        ]},
        "threads": {"values": [{
            "id": 1,
            "crashed": true,
            "stacktrace": {
                "registers": {"pc": "0x1508"},
                "frames": [
                    {"instruction_addr": "0x1104", "trust": "cfi"},
                    {"instruction_addr": "0x5208", "trust": "cfi"},
                    {"instruction_addr": "0x1508", "trust": "context"}
                ]
            }
        }]}
    }))
    .unwrap()
}

fn services(client: Arc<ScriptedClient>, lookup: Arc<FakeLookup>) -> Services
{
    Services::new(Arc::new(MemoryCache::new()), Arc::new(MatchSymbolizer::new()))
        .with_symbolicator(client)
        .with_system_symbols(lookup)
}

fn config() -> SymbolicationConfig
{
    SymbolicationConfig {
        system_symbols_enabled: true,
        ..fast_config()
    }
}

fn frame_errors(frame: &crashsym_core::event::Frame) -> usize
{
    frame
        .data
        .as_ref()
        .and_then(|data| data.get("errors"))
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

#[test]
fn test_remote_and_system_symbols_are_merged()
{
    let client = Arc::new(ScriptedClient::new().on_submit(completed(json!({
        "modules": [
            {"debug_status": "found", "arch": "arm64e"},
            {"debug_status": "missing"}
        ],
        "stacktraces": [{"frames": [
            {"original_index": 2, "status": "symbolicated", "function": "main", "lineno": 10},
            {"original_index": 0, "status": "symbolicated", "function": "crash", "lineno": 42},
            {"original_index": 1, "status": "missing", "instruction_addr": "0x5208"}
        ]}]
    }))));
    let lookup = Arc::new(FakeLookup::new(json!({
        "symbols": [{"object_name": "/usr/lib/system/libsystem_c.dylib", "symbol": "_abort", "addr": "0x204"}]
    })));
    let report = ios_report();
    let config = config();
    let services = services(client.clone(), lookup.clone());

    let result = NativeProcessor::new(&report, &config, &services).process().unwrap();

    let functions: Vec<_> = result.stacktraces[0]
        .frames
        .iter()
        .map(|frame| frame.function.as_deref().unwrap_or("?"))
        .collect();
    assert_eq!(functions, vec!["main", "abort", "crash"]);
    assert_eq!(result.stacktraces[0].frames[1].symbol_addr, Some(HexValue(0x5204)));
    assert!(result.errors.is_empty(), "{:?}", result.errors);

    // system library missing upstream is not an error, merged fields are kept
    assert_eq!(result.images[0].arch.as_deref(), Some("arm64e"));
    assert_eq!(result.images[1].arch.as_deref(), Some("arm64"));

    let lookups = lookup.requests.lock();
    assert_eq!(lookups[0].sdk_id, "iOS_14.4.0_18D52");
    assert_eq!(lookups[0].cpu_name, "arm64");
    assert_eq!(lookups[0].symbols.len(), 1);
    assert_eq!(lookups[0].symbols[0].addr, HexValue(0x204));
    assert_eq!(lookups[0].symbols[0].object_uuid, LIBC_ID);
}

#[test]
fn test_missing_app_debug_file_is_reported_once()
{
    let client = Arc::new(ScriptedClient::new().on_submit(completed(json!({
        "modules": [{"debug_status": "missing"}, {"debug_status": "unused"}],
        "stacktraces": [{"frames": [
            {"original_index": 0, "status": "missing", "instruction_addr": "0x1508"},
            {"original_index": 1, "status": "missing", "instruction_addr": "0x5208"},
            {"original_index": 2, "status": "missing", "instruction_addr": "0x1104"}
        ]}]
    }))));
    let lookup = Arc::new(FakeLookup::new(json!({"symbols": [null]})));
    let report = ios_report();
    let config = config();
    let services = services(client, lookup);

    let result = NativeProcessor::new(&report, &config, &services).process().unwrap();

    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, EventErrorKind::NativeMissingDsym);
    assert_eq!(result.errors[0].name.as_deref(), Some("App"));

    let frames = &result.stacktraces[0].frames;
    assert_eq!(frames.len(), 3);
    assert_eq!(frame_errors(&frames[0]), 1);
    assert_eq!(frame_errors(&frames[2]), 1);
    // system frame without a system match stays raw and silent
    assert_eq!(frame_errors(&frames[1]), 0);
    assert!(frames[1].function.is_none());
}

#[test]
fn test_symbolicator_failure_keeps_frames()
{
    let client = Arc::new(ScriptedClient::new().on_submit(Ok(crashsym_protocol::SymbolicationResponse::InternalError)));
    let lookup = Arc::new(FakeLookup::new(json!({"symbols": [null]})));
    let report = ios_report();
    let config = config();
    let services = services(client, lookup);

    let result = NativeProcessor::new(&report, &config, &services).process().unwrap();

    assert_eq!(result.errors[0].kind, EventErrorKind::NativeInternalFailure);
    assert_eq!(result.stacktraces[0].frames.len(), 3);
    assert!(result.stacktraces[0].frames.iter().all(|frame| frame.function.is_none()));
}

#[test]
fn test_apply_writes_frames_and_raw_stacktrace()
{
    let client = Arc::new(ScriptedClient::new().on_submit(completed(json!({
        "modules": [{"debug_status": "found"}, {"debug_status": "found"}],
        "stacktraces": [{"frames": [
            {"original_index": 0, "function": "crash"},
            {"original_index": 1, "function": "abort"},
            {"original_index": 2, "function": "main"}
        ]}]
    }))));
    let lookup = Arc::new(FakeLookup::new(json!({"symbols": [null]})));
    let mut report = ios_report();
    let config = config();
    let services = services(client, lookup);

    let result = NativeProcessor::new(&report, &config, &services).process().unwrap();
    result.apply(&mut report);

    let thread = &report.threads.as_ref().unwrap().values[0];
    let frames = &thread.stacktrace.as_ref().unwrap().frames;
    assert_eq!(frames[2].function.as_deref(), Some("crash"));
    assert_eq!(thread.other["raw_stacktrace"]["frames"][2]["instruction_addr"], json!("0x1508"));
    assert!(report.errors.is_empty());
}

#[test]
fn test_native_frames_in_managed_report_are_symbolicated()
{
    let report: CrashReport = serde_json::from_value(json!({
        "event_id": "0e4b6d2c1a3f4e5d9c8b7a6f5e4d3c2b",
        "project": 42,
        "platform": "csharp",
        "contexts": {"device": {"arch": "arm64"}},
        "debug_meta": {"images": [macho_image("/usr/lib/libmono.dylib", APP_ID, 0x1000, 0x1000)]},
        "exception": {"values": [{"stacktrace": {"frames": [
            {"function": "Program.Main", "platform": "csharp"},
            {"instruction_addr": "0x1104", "platform": "native"}
        ]}}]}
    }))
    .unwrap();
    let client = Arc::new(ScriptedClient::new().on_submit(completed(json!({
        "modules": [{"debug_status": "found"}],
        "stacktraces": [{"frames": [{"original_index": 0, "function": "mono_crash"}]}]
    }))));
    let config = fast_config();
    let services = Services::new(Arc::new(MemoryCache::new()), Arc::new(MatchSymbolizer::new()))
        .with_symbolicator(client.clone());

    let processor = NativeProcessor::new(&report, &config, &services);
    assert!(processor.is_available());
    let result = processor.process().unwrap();

    assert_eq!(client.submit_count(), 1);
    let frames = &result.stacktraces[0].frames;
    assert_eq!(frames[0].function.as_deref(), Some("Program.Main"));
    assert_eq!(frames[1].function.as_deref(), Some("mono_crash"));
}

#[test]
fn test_report_without_usable_images_is_left_alone()
{
    let report: CrashReport = serde_json::from_value(json!({
        "event_id": "7a1d3c5e9b2f4a6c8e0d1f3b5a7c9e2d",
        "project": 42,
        "platform": "native",
        "threads": {"values": [{"stacktrace": {"frames": [{"instruction_addr": "0x1104"}]}}]}
    }))
    .unwrap();
    let client = Arc::new(ScriptedClient::new());
    let symbolizer = Arc::new(CountingSymbolizer::returning(vec![function("main")]));
    let config = fast_config();
    let services = Services::new(Arc::new(MemoryCache::new()), symbolizer.clone()).with_symbolicator(client.clone());

    let processor = NativeProcessor::new(&report, &config, &services);
    assert!(!processor.is_available());
    let frame = &report.threads.as_ref().unwrap().values[0].stacktrace.as_ref().unwrap().frames[0];
    assert!(!processor.handles_frame(frame));

    let result = processor.process().unwrap();
    assert!(result.stacktraces.is_empty());
    assert!(result.errors.is_empty());
    assert_eq!(client.submit_count(), 0);
    assert_eq!(symbolizer.calls(), 0);
}

#[test]
fn test_module_count_mismatch_discards_completion()
{
    let client = Arc::new(ScriptedClient::new().on_submit(completed(json!({
        "modules": [{"debug_status": "found", "arch": "arm64e"}],
        "stacktraces": [{"frames": [
            {"original_index": 0, "function": "crash"},
            {"original_index": 1, "function": "abort"},
            {"original_index": 2, "function": "main"}
        ]}]
    }))));
    let lookup = Arc::new(FakeLookup::new(json!({"symbols": [null]})));
    let report = ios_report();
    let config = config();
    let services = services(client, lookup);

    let result = NativeProcessor::new(&report, &config, &services).process().unwrap();

    assert_eq!(result.errors[0].kind, EventErrorKind::NativeInternalFailure);
    assert!(result.errors[0].message.is_some());
    assert_eq!(result.images[0].arch.as_deref(), Some("arm64"));
    assert!(result.stacktraces[0].frames.iter().all(|frame| frame.function.is_none()));
}

fn minidump_report() -> CrashReport
{
    let report: CrashReport = serde_json::from_value(json!({
        "event_id": "5f1c8e2a9b3d4c6e8f7a0b1c2d3e4f50",
        "project": 7,
        "platform": "native",
        "exception": {"values": [{"mechanism": {"type": "minidump"}}]}
    }))
    .unwrap();
    report.with_minidump(b"MDMP\x93\xa7\x00\x00".to_vec())
}

#[test]
fn test_minidump_is_reprocessed_once()
{
    let client = ScriptedClient::new()
        .on_submit(pending("md-1"))
        .on_poll(completed(json!({
            "crashed": true,
            "modules": [],
            "stacktraces": [{"thread_id": 3, "is_requesting": true, "frames": [{"function": "crash"}]}]
        })));
    let cache = MemoryCache::new();
    let config = fast_config();
    let report = minidump_report();
    assert!(report.is_minidump_event());

    let updated = reprocess_minidump(&report, &cache, &client, &config).unwrap();
    let thread = &updated.threads.as_ref().unwrap().values[0];
    assert_eq!(thread.id, Some(3));
    assert!(matches!(
        client.submitted.lock()[0],
        crashsym_core::symbolicator::SymbolicationTask::Minidump { .. }
    ));

    assert_eq!(cache.get(&report.minidump_reprocessed_cache_key()), Some(json!(true)));
    assert!(reprocess_minidump(&report, &cache, &client, &config).is_none());
    assert_eq!(client.submit_count(), 1);
}

#[test]
fn test_failed_minidump_is_not_sent_again()
{
    let client = ScriptedClient::new().on_submit(Ok(crashsym_protocol::SymbolicationResponse::InternalError));
    let cache = MemoryCache::new();
    let config = fast_config();
    let report = minidump_report();

    assert!(reprocess_minidump(&report, &cache, &client, &config).is_none());
    assert_eq!(cache.get(&report.minidump_reprocessed_cache_key()), Some(json!(true)));

    assert!(reprocess_minidump(&report, &cache, &client, &config).is_none());
    assert_eq!(client.submit_count(), 1);
}

#[test]
fn test_minidump_without_attachment_is_skipped()
{
    let client = ScriptedClient::new();
    let cache = MemoryCache::new();
    let report: CrashReport =
        serde_json::from_value(json!({"event_id": "abc", "project": 7, "platform": "native"})).unwrap();

    assert!(reprocess_minidump(&report, &cache, &client, &fast_config()).is_none());
    assert_eq!(client.submit_count(), 0);

    cache.set(&report.minidump_reprocessed_cache_key(), json!(true), Duration::from_secs(60));
    let attached = report.with_minidump(vec![1, 2, 3]);
    assert!(reprocess_minidump(&attached, &cache, &client, &fast_config()).is_none());
    assert_eq!(client.submit_count(), 0);
}
