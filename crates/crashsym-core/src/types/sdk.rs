//! Operating system SDK information.

use serde::{Deserialize, Serialize};

/// The OS SDK the crashed process ran against.
///
/// Derived from the event's OS context. System symbol lookups are keyed by
/// the SDK, and the third-party classifier uses the SDK name to decide
/// whether Apple system paths apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkInfo
{
    pub sdk_name: String,
    pub version_major: u32,
    pub version_minor: u32,
    pub version_patchlevel: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
}

const APPLE_SDK_NAMES: &[(&str, &str)] = &[
    ("iPhone OS", "iOS"),
    ("iOS", "iOS"),
    ("tvOS", "tvOS"),
    ("watchOS", "watchOS"),
    ("Mac OS", "macOS"),
    ("Mac OS X", "macOS"),
    ("macOS", "macOS"),
];

impl SdkInfo
{
    /// Build SDK info from an OS name, version string, and optional build.
    ///
    /// Versions may be partial (`"14"`, `"14.4"`) and may carry a suffix after a
    /// dash (`"10.0-beta"`). Returns `None` if the version is not numeric.
    ///
    /// ```rust
    /// use crashsym_core::types::SdkInfo;
    ///
    /// let sdk = SdkInfo::from_os("iPhone OS", "14.4", Some("18D52")).unwrap();
    /// assert_eq!(sdk.sdk_name, "iOS");
    /// assert_eq!((sdk.version_major, sdk.version_minor, sdk.version_patchlevel), (14, 4, 0));
    /// assert_eq!(sdk.sdk_id().as_deref(), Some("iOS_14.4.0_18D52"));
    /// ```
    pub fn from_os(name: &str, version: &str, build: Option<&str>) -> Option<Self>
    {
        let version = version.split('-').next().unwrap_or_default();
        let mut parts = [0u32; 3];
        for (slot, part) in parts.iter_mut().zip(version.split('.')) {
            *slot = part.trim().parse().ok()?;
        }

        let sdk_name = APPLE_SDK_NAMES
            .iter()
            .find(|(os, _)| *os == name)
            .map_or(name, |(_, sdk)| *sdk)
            .to_string();

        Some(Self {
            sdk_name,
            version_major: parts[0],
            version_minor: parts[1],
            version_patchlevel: parts[2],
            build: build.map(str::to_string),
        })
    }

    /// `true` for Apple platforms.
    pub fn is_apple(&self) -> bool
    {
        matches!(self.sdk_name.as_str(), "iOS" | "tvOS" | "watchOS" | "macOS")
    }

    /// Identifier the system symbol server files symbols under.
    pub fn sdk_id(&self) -> Option<String>
    {
        let build = self.build.as_deref()?;
        Some(format!(
            "{}_{}.{}.{}_{}",
            self.sdk_name, self.version_major, self.version_minor, self.version_patchlevel, build
        ))
    }
}
