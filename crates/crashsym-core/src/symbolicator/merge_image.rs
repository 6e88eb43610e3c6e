//! Folding per-image completion records back into image records.

use crashsym_protocol::{CompleteObjectInfo, ObjectFileStatus, RawImage};
use serde_json::{Map, Value};
use tracing::{error, warn};

use crate::error::{FailureReason, SymbolicationFailed};
use crate::in_app::is_known_third_party;
use crate::types::SdkInfo;

/// Merge a completion record into a copy of `raw` and report its statuses.
///
/// The service may know more about an image than the SDK did (for minidumps
/// it knows everything), so every non-null field of the record overwrites
/// the image, except an `"arch": "unknown"` placeholder. Returns the merged
/// image and one failure per status that is neither `found` nor `unused`.
pub fn merge_symbolicator_image(
    raw: &RawImage,
    complete: &CompleteObjectInfo,
    sdk: Option<&SdkInfo>,
) -> (RawImage, Vec<SymbolicationFailed>)
{
    let merged = overlay_fields(raw, &complete.fields);
    let failures = complete
        .statuses()
        .into_iter()
        .filter_map(|status| status_failure(status, &merged, sdk))
        .collect();
    (merged, failures)
}

fn overlay_fields(raw: &RawImage, fields: &Map<String, Value>) -> RawImage
{
    let mut object = match serde_json::to_value(raw) {
        Ok(Value::Object(object)) => object,
        _ => Map::new(),
    };
    for (key, value) in fields {
        if value.is_null() || (key == "arch" && value == "unknown") {
            continue;
        }
        object.insert(key.clone(), value.clone());
    }
    serde_json::from_value(Value::Object(object)).unwrap_or_else(|err| {
        warn!(error = %err, "completion record does not fit the image schema, keeping the original image");
        raw.clone()
    })
}

/// Failure for one image status, `None` if the status is not an error.
///
/// A missing debug file is only an error for images the user could upload
/// files for: images without a code file and system libraries are exempt.
pub fn status_failure(status: ObjectFileStatus, image: &RawImage, sdk: Option<&SdkInfo>) -> Option<SymbolicationFailed>
{
    let reason = match status {
        ObjectFileStatus::Found | ObjectFileStatus::Unused => return None,
        ObjectFileStatus::Missing => {
            let package = image.code_file_or_name()?;
            if is_known_third_party(package, sdk) {
                return None;
            }
            FailureReason::MissingDebugFile
        }
        ObjectFileStatus::Malformed => FailureReason::MalformedDebugFile,
        ObjectFileStatus::TooLarge => FailureReason::FetchTooLarge,
        ObjectFileStatus::FetchingFailed => FailureReason::FetchFailed,
        ObjectFileStatus::Timeout | ObjectFileStatus::Other => {
            error!(?status, debug_id = ?image.any_identifier(), "unexpected debug file status");
            FailureReason::Internal
        }
    };
    Some(SymbolicationFailed::new(reason).with_raw_image(image))
}
