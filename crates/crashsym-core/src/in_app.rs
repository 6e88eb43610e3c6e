//! Classification of system libraries.
//!
//! A "known third-party" image is an OS-provided library. Users never upload
//! debug files for those, so a missing debug file is not reported, and their
//! symbols may come from the system symbol lookup service instead.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::SdkInfo;

static APPLE_SYSTEM_PATH: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^(/System/Library/|/usr/lib/)
        | /(Library/)?Developer/CoreSimulator/Profiles/Runtimes/[^/]+\.simruntime/Contents/Resources/RuntimeRoot/(System/Library|usr/lib)/
        ",
    )
    .ok()
});

static LINUX_SYSTEM_PATH: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^/(usr/)?lib(64)?/").ok());

static WINDOWS_SYSTEM_PATH: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?i)^c:\\windows\\").ok());

fn is_match(pattern: &Lazy<Option<Regex>>, code_file: &str) -> bool
{
    pattern.as_ref().is_some_and(|regex| regex.is_match(code_file))
}

/// `true` if `code_file` is a system library of the platform.
///
/// Apple locations are checked for Apple SDKs, Linux and Windows locations
/// for everything else. Without SDK information all locations apply.
///
/// ```rust
/// use crashsym_core::in_app::is_known_third_party;
///
/// assert!(is_known_third_party("/usr/lib/system/libsystem_c.dylib", None));
/// assert!(is_known_third_party("C:\\WINDOWS\\System32\\ntdll.dll", None));
/// assert!(!is_known_third_party("/var/containers/Bundle/Application/X/App.app/App", None));
/// ```
pub fn is_known_third_party(code_file: &str, sdk: Option<&SdkInfo>) -> bool
{
    let apple = sdk.map_or(true, SdkInfo::is_apple);
    let other = sdk.map_or(true, |sdk| !sdk.is_apple());

    (apple && is_match(&APPLE_SYSTEM_PATH, code_file))
        || (other && (is_match(&LINUX_SYSTEM_PATH, code_file) || is_match(&WINDOWS_SYSTEM_PATH, code_file)))
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_system_path_patterns_compile()
    {
        assert!(APPLE_SYSTEM_PATH.is_some());
        assert!(LINUX_SYSTEM_PATH.is_some());
        assert!(WINDOWS_SYSTEM_PATH.is_some());
    }

    #[test]
    fn test_apple_paths()
    {
        let ios = SdkInfo::from_os("iOS", "14.4", None).unwrap();
        assert!(is_known_third_party("/System/Library/Frameworks/UIKit.framework/UIKit", Some(&ios)));
        assert!(is_known_third_party(
            "/Library/Developer/CoreSimulator/Profiles/Runtimes/iOS 14.4.simruntime/Contents/Resources/RuntimeRoot/usr/lib/libobjc.A.dylib",
            Some(&ios)
        ));
        assert!(!is_known_third_party(
            "/Users/me/Library/Developer/CoreSimulator/Devices/X/data/Containers/Bundle/Application/Y/App.app/App",
            Some(&ios)
        ));
        assert!(!is_known_third_party("/lib/x86_64-linux-gnu/libc.so.6", Some(&ios)));
    }

    #[test]
    fn test_linux_and_windows_paths()
    {
        let linux = SdkInfo::from_os("Linux", "5.10", None).unwrap();
        assert!(is_known_third_party("/lib64/ld-linux-x86-64.so.2", Some(&linux)));
        assert!(is_known_third_party("/usr/lib/libstdc++.so.6", Some(&linux)));
        assert!(!is_known_third_party("/opt/app/bin/server", Some(&linux)));
        assert!(!is_known_third_party("/System/Library/Frameworks/Foundation", Some(&linux)));

        let windows = SdkInfo::from_os("Windows", "10.0.19041", None).unwrap();
        assert!(is_known_third_party("c:\\windows\\system32\\KERNELBASE.dll", Some(&windows)));
        assert!(!is_known_third_party("C:\\Program Files\\App\\app.exe", Some(&windows)));
    }
}
