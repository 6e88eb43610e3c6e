//! Debug image records as they appear in crash reports and service payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::hex::HexValue;

/// One loaded binary as reported by the SDK (`debug_meta.images[]`).
///
/// Unknown keys are preserved in `other` so an image can be forwarded to the
/// symbolication service and merged with its completion record without
/// losing anything the SDK sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawImage
{
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_addr: Option<HexValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_vmaddr: Option<HexValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_id: Option<String>,
    /// Legacy identifier field used by older `symbolic` images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Legacy identifier field used by older `apple` images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_file: Option<String>,
    /// Legacy code file field used by older `apple` images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl RawImage
{
    /// `true` if the SDK sent an empty object.
    pub fn is_empty(&self) -> bool
    {
        self == &RawImage::default()
    }

    /// The first non-empty identifier, preferring `debug_id` over legacy fields.
    pub fn any_identifier(&self) -> Option<&str>
    {
        [&self.debug_id, &self.id, &self.uuid]
            .into_iter()
            .find_map(non_empty)
    }

    /// The code file, falling back to the legacy `name` field.
    pub fn code_file_or_name(&self) -> Option<&str>
    {
        non_empty(&self.code_file).or_else(|| non_empty(&self.name))
    }
}

fn non_empty(field: &Option<String>) -> Option<&str>
{
    field.as_deref().filter(|value| !value.is_empty())
}

/// Outcome of fetching one kind of debug file for an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectFileStatus
{
    Found,
    Unused,
    Missing,
    Malformed,
    TooLarge,
    FetchingFailed,
    Timeout,
    #[serde(other)]
    Other,
}

/// Per-image completion record returned by the symbolication service.
///
/// Everything besides the two status fields is image data the service may
/// know better than the SDK (for instance the architecture of a module that
/// was only listed in a minidump).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompleteObjectInfo
{
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_status: Option<ObjectFileStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unwind_status: Option<ObjectFileStatus>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl CompleteObjectInfo
{
    /// Distinct statuses reported for this image, `debug_status` first.
    pub fn statuses(&self) -> Vec<ObjectFileStatus>
    {
        let mut statuses = Vec::with_capacity(2);
        for status in [self.debug_status, self.unwind_status].into_iter().flatten() {
            if !statuses.contains(&status) {
                statuses.push(status);
            }
        }
        statuses
    }
}

#[cfg(test)]
mod tests
{
    use serde_json::json;

    use super::*;

    #[test]
    fn test_raw_image_preserves_unknown_keys()
    {
        let image: RawImage = serde_json::from_value(json!({
            "type": "macho",
            "image_addr": "0x1000",
            "image_size": 4096,
            "debug_id": "c0bcc3f1-9827-fe65-3058-404b2831d9e6",
            "cpu_subtype": 3
        }))
        .unwrap();

        assert_eq!(image.ty.as_deref(), Some("macho"));
        assert_eq!(image.image_addr, Some(HexValue(0x1000)));
        assert_eq!(image.other.get("cpu_subtype"), Some(&json!(3)));
        assert_eq!(serde_json::to_value(&image).unwrap()["cpu_subtype"], json!(3));
    }

    #[test]
    fn test_identifier_fallbacks()
    {
        let image = RawImage {
            uuid: Some("abc".into()),
            name: Some("/usr/lib/libc.dylib".into()),
            ..RawImage::default()
        };
        assert_eq!(image.any_identifier(), Some("abc"));
        assert_eq!(image.code_file_or_name(), Some("/usr/lib/libc.dylib"));
        assert!(RawImage::default().is_empty());
    }

    #[test]
    fn test_empty_identifiers_fall_through()
    {
        let image = RawImage {
            debug_id: Some(String::new()),
            id: Some("legacy-id".into()),
            uuid: Some("abc".into()),
            code_file: Some(String::new()),
            name: Some("/usr/lib/libc.dylib".into()),
            ..RawImage::default()
        };
        assert_eq!(image.any_identifier(), Some("legacy-id"));
        assert_eq!(image.code_file_or_name(), Some("/usr/lib/libc.dylib"));

        let blank = RawImage {
            debug_id: Some(String::new()),
            ..RawImage::default()
        };
        assert_eq!(blank.any_identifier(), None);
    }

    #[test]
    fn test_complete_object_statuses_are_deduplicated()
    {
        let info: CompleteObjectInfo = serde_json::from_value(json!({
            "debug_status": "missing",
            "unwind_status": "missing",
            "arch": "arm64"
        }))
        .unwrap();
        assert_eq!(info.statuses(), vec![ObjectFileStatus::Missing]);
        assert_eq!(info.fields.get("arch"), Some(&json!("arm64")));

        let odd: CompleteObjectInfo = serde_json::from_value(json!({"debug_status": "something_new"})).unwrap();
        assert_eq!(odd.debug_status, Some(ObjectFileStatus::Other));
    }
}
