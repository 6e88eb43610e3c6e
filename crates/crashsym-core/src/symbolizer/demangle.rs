//! Symbol demangling utilities.
//!
//! Rust symbols (legacy `_ZN...E` and v0 `_R...`) are demangled with
//! `rustc-demangle`. Other names are returned as they are; a leading
//! underscore added by the Mach-O symbol table is stripped first.

use rustc_demangle::try_demangle;

/// Language guessed from a mangled name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolLanguage
{
    Rust,
    Cpp,
    Unknown,
}

impl SymbolLanguage
{
    /// Value for the frame's `lang` field.
    pub const fn as_lang(self) -> Option<&'static str>
    {
        match self {
            SymbolLanguage::Rust => Some("rust"),
            SymbolLanguage::Cpp => Some("cpp"),
            SymbolLanguage::Unknown => None,
        }
    }
}

/// Remove the underscore Mach-O prepends to C symbol names.
pub fn strip_symbol_prefix(raw: &str) -> &str
{
    raw.strip_prefix('_').unwrap_or(raw)
}

/// Detect the language of a raw symbol.
pub fn detect_language(raw: &str) -> SymbolLanguage
{
    let raw = raw.strip_prefix('_').filter(|rest| rest.starts_with("_Z") || rest.starts_with("_R")).unwrap_or(raw);
    if raw.starts_with("_R") || (raw.starts_with("_ZN") && try_demangle(raw).is_ok()) {
        SymbolLanguage::Rust
    } else if raw.starts_with("_Z") {
        SymbolLanguage::Cpp
    } else {
        SymbolLanguage::Unknown
    }
}

/// Human-readable function name for a raw symbol.
///
/// ```rust
/// use crashsym_core::symbolizer::demangle::demangle_symbol;
///
/// assert_eq!(demangle_symbol("_ZN4core9panicking5panic17h0123456789abcdefE"), "core::panicking::panic");
/// assert_eq!(demangle_symbol("_abort"), "abort");
/// ```
pub fn demangle_symbol(raw: &str) -> String
{
    if let Ok(demangled) = try_demangle(raw) {
        return format!("{demangled:#}");
    }
    if let Some(inner) = raw.strip_prefix('_') {
        if let Ok(demangled) = try_demangle(inner) {
            return format!("{demangled:#}");
        }
    }
    strip_symbol_prefix(raw).to_string()
}
