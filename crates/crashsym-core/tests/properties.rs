//! Behavior of the pipeline as a whole, per component and end to end

mod common;

use std::sync::Arc;

use common::{function, macho_image, CountingSymbolizer};
use crashsym_core::cache::{FrameCacheKey, MemoryCache};
use crashsym_core::event::{CrashReport, Frame};
use crashsym_core::image_index::ImageIndex;
use crashsym_core::processor::{NativeProcessor, Services};
use crashsym_core::symbolicator::{attach_matches, StacktraceBatch};
use crashsym_core::types::{Address, DebugImage};
use crashsym_core::SymbolicationConfig;
use crashsym_protocol::{CompletedResponse, HexValue};
use serde_json::{json, Value};

fn report(value: Value) -> CrashReport
{
    serde_json::from_value(value).unwrap()
}

fn crash_report(event_id: &str, pc: &str, frames: Value) -> CrashReport
{
    report(json!({
        "event_id": event_id,
        "project": 42,
        "platform": "cocoa",
        "contexts": {"device": {"arch": "arm64"}},
        "exception": {"values": [{"mechanism": {"type": "mach", "meta": {"signal": {"number": 11}}}}]},
        "debug_meta": {"images": [
            macho_image("/var/containers/App", "c0bcc3f1-9827-fe65-3058-404b2831d9e6", 0x1000, 0x1000),
        ]},
        "threads": {"values": [{
            "id": 1,
            "crashed": true,
            "stacktrace": {"registers": {"pc": pc}, "frames": frames}
        }]}
    }))
}

#[test]
fn test_find_image_only_returns_containing_images()
{
    let index = ImageIndex::new(&[
        macho_image("/a", "00000000-0000-0000-0000-00000000000a", 0x1000, 0x1000),
        macho_image("/b", "00000000-0000-0000-0000-00000000000b", 0x4000, 0x800),
        macho_image("/c", "00000000-0000-0000-0000-00000000000c", 0x2000, 0x100),
    ]);

    for address in [0x0, 0xfff, 0x1000, 0x1fff, 0x2000, 0x20ff, 0x2100, 0x3fff, 0x4000, 0x47ff, 0x4800, u64::MAX] {
        let address = Address::new(address);
        match index.find_image(address) {
            Some(image) => assert!(image.contains(address), "{address} not in {:?}", image.code_file()),
            None => assert!(index.images().iter().all(|image| !image.contains(address)), "{address} missed"),
        }
    }
}

#[test]
fn test_rebase_and_cache_key_are_pure()
{
    let raw = macho_image("/var/containers/App", "c0bcc3f1-9827-fe65-3058-404b2831d9e6", 0x1000, 0x1000);
    let first = DebugImage::from_raw(0, &raw).unwrap();
    let second = DebugImage::from_raw(3, &raw).unwrap();
    let address = Address::new(0x1500);

    assert_eq!(first.rebase(address), Some(0x500));

    let key_a = FrameCacheKey::new(address, &first).unwrap();
    let key_b = FrameCacheKey::new(address, &second).unwrap();
    assert_eq!(key_a, key_b);
    assert_eq!(key_a.digest(), key_b.digest());
    assert_eq!(key_a.rebased_address(), 0x500);

    let other = FrameCacheKey::new(Address::new(0x1504), &first).unwrap();
    assert_ne!(key_a.digest(), other.digest());
}

#[test]
fn test_merging_a_candidate_twice_is_idempotent()
{
    let candidate = crashsym_protocol::SymbolCandidate {
        function: Some("main".into()),
        filename: Some("main.c".into()),
        lineno: Some(12),
        symbol_addr: Some(HexValue(0x1400)),
        ..Default::default()
    };
    let mut once = Frame::at(0x1500);
    once.merge_candidate(&candidate);
    let mut twice = once.clone();
    twice.merge_candidate(&candidate);

    assert_eq!(once, twice);
    assert_eq!(once.address(), Some(HexValue(0x1500)));
}

#[test]
fn test_only_the_crashing_frame_sees_signal_and_registers()
{
    let frames = json!([
        {"instruction_addr": "0x1104", "trust": "cfi"},
        {"instruction_addr": "0x1204", "trust": "cfi"},
        {"instruction_addr": "0x1508", "trust": "context"}
    ]);
    let config = SymbolicationConfig::default();
    let services = Services::new(Arc::new(MemoryCache::new()), Arc::new(CountingSymbolizer::returning(vec![])));

    // pc matches the crashing frame: it is the faulting instruction itself
    let faulting = crash_report("a", "0x1508", frames.clone());
    let prepared = NativeProcessor::new(&faulting, &config, &services).prepare(None);
    let addresses: Vec<u64> = prepared.resolved.iter().map(|frame| frame.instruction_addr.value()).collect();
    assert_eq!(addresses, vec![0x1508, 0x1200, 0x1100]);
    assert_eq!(prepared.resolved[0].crash_index, 0);
    assert_eq!(prepared.resolved[0].frame_index, 2);

    // pc elsewhere with SIGSEGV: the crashing frame was recovered from the stack
    let jumped = crash_report("b", "0x9000", frames);
    let prepared = NativeProcessor::new(&jumped, &config, &services).prepare(None);
    let addresses: Vec<u64> = prepared.resolved.iter().map(|frame| frame.instruction_addr.value()).collect();
    assert_eq!(addresses, vec![0x1504, 0x1200, 0x1100]);
}

#[test]
fn test_zero_candidates_drop_scanned_frames_and_keep_others()
{
    let report = crash_report(
        "c",
        "0x1508",
        json!([
            {"instruction_addr": "0x1104", "trust": "scan"},
            {"instruction_addr": "0x1204", "trust": "cfi"},
            {"instruction_addr": "0x1508", "trust": "context"}
        ]),
    );
    let config = SymbolicationConfig::default();
    let services = Services::new(Arc::new(MemoryCache::new()), Arc::new(CountingSymbolizer::returning(vec![])));

    let result = NativeProcessor::new(&report, &config, &services).process().unwrap();
    let stacktrace = &result.stacktraces[0];

    assert_eq!(stacktrace.raw_frames.len(), 3);
    assert_eq!(stacktrace.frames.len(), 2);
    assert_eq!(stacktrace.frames[0].address(), Some(HexValue(0x1204)));
    assert!(stacktrace.frames.iter().all(|frame| frame.function.is_none()));
}

#[test]
fn test_remote_matches_follow_original_index()
{
    let report = crash_report(
        "d",
        "0x1508",
        json!([
            {"instruction_addr": "0x1104"},
            {"instruction_addr": "0x1204"},
            {"instruction_addr": "0x1508"}
        ]),
    );
    let config = SymbolicationConfig::default();
    let services = Services::new(Arc::new(MemoryCache::new()), Arc::new(CountingSymbolizer::returning(vec![])));
    let mut prepared = NativeProcessor::new(&report, &config, &services).prepare(None);

    // Index 1 is missing and the rest arrive out of order.
    let completed: CompletedResponse = serde_json::from_value(json!({
        "modules": [{"debug_status": "found"}],
        "stacktraces": [{"frames": [
            {"original_index": 2, "function": "outer"},
            {"original_index": 0, "function": "crashed"}
        ]}]
    }))
    .unwrap();
    attach_matches(&completed, &prepared.batches, &mut prepared.resolved);

    let function_of = |index: usize| {
        prepared.resolved[index]
            .remote_matches
            .first()
            .and_then(|found| found.candidate.function.clone())
    };
    assert_eq!(function_of(0).as_deref(), Some("crashed"));
    assert!(prepared.resolved[1].remote_matches.is_empty());
    assert_eq!(function_of(2).as_deref(), Some("outer"));
}

#[test]
fn test_scanned_frame_without_candidates_leaves_the_stack()
{
    let report = report(json!({
        "event_id": "e",
        "project": 42,
        "platform": "native",
        "debug_meta": {"images": [macho_image("/opt/D1", "D1", 0x1000, 0x1000)]},
        "stacktrace": {"frames": [{"instruction_addr": "0x1500", "trust": "scan"}]}
    }));
    let config = SymbolicationConfig::default();
    let symbolizer = Arc::new(CountingSymbolizer::returning(vec![]));
    let services = Services::new(Arc::new(MemoryCache::new()), symbolizer.clone());

    let processor = NativeProcessor::new(&report, &config, &services);
    assert!(processor.is_available());
    let result = processor.process().unwrap();

    assert_eq!(symbolizer.calls(), 1);
    assert!(result.stacktraces[0].frames.is_empty());
    assert_eq!(result.stacktraces[0].raw_frames[0].address(), Some(HexValue(0x1500)));
    assert!(result.errors.is_empty());
}

#[test]
fn test_symbol_results_are_shared_across_events()
{
    let cache = Arc::new(MemoryCache::new());
    let symbolizer = Arc::new(CountingSymbolizer::returning(vec![function("-[AppDelegate crash]")]));
    let services = Services::new(cache, symbolizer.clone());
    let config = SymbolicationConfig::default();
    let frames = json!([{"instruction_addr": "0x1204", "trust": "cfi"}]);

    let event_a = crash_report("event-a", "0x1208", frames.clone());
    let event_b = crash_report("event-b", "0x1208", frames);

    let first = NativeProcessor::new(&event_a, &config, &services).process().unwrap();
    let second = NativeProcessor::new(&event_b, &config, &services).process().unwrap();

    assert_eq!(symbolizer.calls(), 1);
    assert_eq!(first.stacktraces[0].frames, second.stacktraces[0].frames);
    assert_eq!(second.stacktraces[0].frames[0].function.as_deref(), Some("-[AppDelegate crash]"));
    assert!(second.referenced_debug_ids.contains("c0bcc3f1-9827-fe65-3058-404b2831d9e6"));
}

#[test]
fn test_unhandled_stack_traces_pass_through()
{
    let report = report(json!({
        "event_id": "f",
        "project": 42,
        "platform": "javascript",
        "debug_meta": {"images": [macho_image("/opt/App", "c0bcc3f1-9827-fe65-3058-404b2831d9e6", 0x1000, 0x1000)]},
        "stacktrace": {"frames": [{"instruction_addr": "0x1500", "function": "handler"}]}
    }));
    let config = SymbolicationConfig::default();
    let symbolizer = Arc::new(CountingSymbolizer::returning(vec![function("never")]));
    let services = Services::new(Arc::new(MemoryCache::new()), symbolizer.clone());

    let processor = NativeProcessor::new(&report, &config, &services);
    assert!(!processor.is_available());
    let result = processor.process().unwrap();

    assert_eq!(symbolizer.calls(), 0);
    assert_eq!(result.stacktraces[0].frames[0].function.as_deref(), Some("handler"));
    assert!(!result.stacktraces[0].is_modified());
}

#[test]
fn test_batches_list_crashing_frame_first()
{
    let report = crash_report(
        "g",
        "0x1508",
        json!([{"instruction_addr": "0x1104"}, {"instruction_addr": "0x1508"}]),
    );
    let config = SymbolicationConfig::default();
    let services = Services::new(Arc::new(MemoryCache::new()), Arc::new(CountingSymbolizer::returning(vec![])));
    let prepared = NativeProcessor::new(&report, &config, &services).prepare(None);

    let batch: &StacktraceBatch = &prepared.batches[0];
    let raw: Vec<u64> = batch
        .frames
        .iter()
        .map(|&index| prepared.resolved[index].raw.address().unwrap().value())
        .collect();
    assert_eq!(raw, vec![0x1508, 0x1104]);
    assert_eq!(prepared.slots[0], vec![Some(1), Some(0)]);
}
