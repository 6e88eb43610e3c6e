//! # System Symbol Fallback
//!
//! Symbols for OS libraries the user cannot provide debug files for.
//!
//! Apple ships system frameworks without debug information, but a separate
//! lookup service knows their symbol tables per OS build. Frames inside such
//! libraries are sent there in one batch before the main symbolication step.

use std::time::Duration;

use crashsym_protocol::{HexValue, SystemSymbolQuery, SystemSymbolRequest, SystemSymbolResponse};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::in_app::is_known_third_party;
use crate::resolved::ResolvedFrame;
use crate::symbolicator::http::{agent, read_json};
use crate::types::SdkInfo;

/// Transport to the system symbol lookup service
pub trait SystemSymbolLookup: Send + Sync
{
    /// Look up all queries of `request`. The response is parallel to `request.symbols`.
    fn lookup(&self, request: &SystemSymbolRequest) -> Result<SystemSymbolResponse, ServiceError>;
}

/// [`SystemSymbolLookup`] over HTTP (`POST {url}/lookup`)
#[derive(Debug, Clone)]
pub struct HttpSystemSymbols
{
    agent: ureq::Agent,
    base_url: String,
}

impl HttpSystemSymbols
{
    pub fn new(base_url: &str, timeout: Duration) -> Self
    {
        Self {
            agent: agent(timeout),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl SystemSymbolLookup for HttpSystemSymbols
{
    fn lookup(&self, request: &SystemSymbolRequest) -> Result<SystemSymbolResponse, ServiceError>
    {
        let url = format!("{}/lookup", self.base_url);
        let body = serde_json::to_string(request)
            .map_err(|err| ServiceError::InvalidResponse(format!("encode lookup request: {err}")))?;
        let result = self
            .agent
            .post(&url)
            .set("content-type", "application/json")
            .send_string(&body);
        read_json(&url, result)
    }
}

/// Canonical hyphenated lowercase form of `debug_id`, if it is a plain UUID.
///
/// Only the 32-digit forms with or without hyphens qualify; debug ids with
/// an age or appendix do not.
pub fn canonical_uuid(debug_id: &str) -> Option<String>
{
    let digits = debug_id.chars().filter(|c| *c != '-').count();
    if digits != 32 {
        return None;
    }
    Uuid::parse_str(debug_id)
        .ok()
        .map(|uuid| uuid.hyphenated().to_string())
}

/// `true` if `debug_id` is a plain UUID (no age or appendix).
pub fn is_plain_uuid(debug_id: &str) -> bool
{
    canonical_uuid(debug_id).is_some()
}

/// Batched system symbol lookup for the frames of one event
pub struct SystemSymbolFallback<'a>
{
    lookup: &'a dyn SystemSymbolLookup,
    sdk: &'a SdkInfo,
    cpu_name: &'a str,
}

impl<'a> SystemSymbolFallback<'a>
{
    /// A fallback for this event, `None` if the SDK or CPU is unknown.
    ///
    /// The lookup service files symbols under an SDK id, which needs the OS
    /// build number.
    pub fn new(lookup: &'a dyn SystemSymbolLookup, sdk: Option<&'a SdkInfo>, cpu_name: Option<&'a str>) -> Option<Self>
    {
        let sdk = sdk?;
        sdk.sdk_id()?;
        Some(Self {
            lookup,
            sdk,
            cpu_name: cpu_name?,
        })
    }

    /// Indices of frames worth asking the lookup service about.
    pub fn select(&self, frames: &[ResolvedFrame]) -> Vec<usize>
    {
        frames
            .iter()
            .enumerate()
            .filter(|(_, frame)| frame.cache_value.is_none())
            .filter(|(_, frame)| {
                frame.image.as_ref().is_some_and(|image| {
                    image
                        .code_file()
                        .is_some_and(|code_file| is_known_third_party(code_file, Some(self.sdk)))
                        && is_plain_uuid(image.debug_id())
                })
            })
            .map(|(index, _)| index)
            .collect()
    }

    /// Look up the selected frames and store matches in `system_match`.
    ///
    /// A failed lookup is logged and leaves all frames untouched.
    pub fn run(&self, frames: &mut [ResolvedFrame])
    {
        let Some(sdk_id) = self.sdk.sdk_id() else {
            return;
        };
        let (selected, symbols): (Vec<usize>, Vec<SystemSymbolQuery>) = self
            .select(frames)
            .into_iter()
            .filter_map(|index| {
                let frame = &frames[index];
                let image = frame.image.as_ref()?;
                let query = SystemSymbolQuery {
                    object_uuid: canonical_uuid(image.debug_id())?,
                    object_name: image.code_file().unwrap_or("<unknown>").to_string(),
                    addr: HexValue(frame.rebased_address()?),
                };
                Some((index, query))
            })
            .unzip();
        if selected.is_empty() {
            return;
        }

        let request = SystemSymbolRequest {
            sdk_id,
            cpu_name: self.cpu_name.to_string(),
            symbols,
        };

        let response = match self.lookup.lookup(&request) {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "system symbol lookup failed");
                return;
            }
        };
        if response.symbols.len() != selected.len() {
            warn!(
                expected = selected.len(),
                got = response.symbols.len(),
                "system symbol lookup returned a different number of results"
            );
        }

        let mut found = 0usize;
        for (index, symbol) in selected.into_iter().zip(response.symbols) {
            if let Some(symbol) = symbol {
                frames[index].system_match = Some(symbol);
                found += 1;
            }
        }
        debug!(queried = request.symbols.len(), found, "system symbol lookup finished");
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_plain_uuid_detection()
    {
        assert!(is_plain_uuid("c0bcc3f1-9827-fe65-3058-404b2831d9e6"));
        assert!(!is_plain_uuid("c0bcc3f1-9827-fe65-3058-404b2831d9e6-1a"));
        assert!(!is_plain_uuid("not-a-uuid"));
        assert!(!is_plain_uuid("c0bcc3f1-9827-fe65-3058-404b2831d9e6-0"));
        assert!(!is_plain_uuid("C0BCC3F19827FE653058404B2831D9E60"));
        assert!(!is_plain_uuid("{c0bcc3f1-9827-fe65-3058-404b2831d9e6}"));
    }

    #[test]
    fn test_lookup_sends_canonical_uuid()
    {
        assert_eq!(
            canonical_uuid("C0BCC3F19827FE653058404B2831D9E6").as_deref(),
            Some("c0bcc3f1-9827-fe65-3058-404b2831d9e6")
        );
        assert_eq!(
            canonical_uuid("C0BCC3F1-9827-FE65-3058-404B2831D9E6").as_deref(),
            Some("c0bcc3f1-9827-fe65-3058-404b2831d9e6")
        );
    }
}
