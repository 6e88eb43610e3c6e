//! CPU architecture classification.

use std::fmt;

/// CPU family of the crashed process
///
/// Crash reports name the CPU with free-form strings (`arm64e`, `armv7s`,
/// `x86_64h`, ...). Only the family matters for address adjustment, so every
/// name is folded into one of these variants.
///
/// ## Example
///
/// ```rust
/// use crashsym_core::types::Architecture;
///
/// assert_eq!(Architecture::from_name("arm64e"), Architecture::Arm64);
/// assert_eq!(Architecture::from_name("i686"), Architecture::X86);
/// assert_eq!(Architecture::from_name("sparc"), Architecture::Unknown);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture
{
    /// 32-bit x86
    X86,
    /// 64-bit x86 (Intel/AMD)
    X86_64,
    /// 32-bit ARM, including Thumb
    Arm,
    /// 64-bit ARM
    Arm64,
    /// 64-bit ARM with 32-bit pointers (watchOS)
    Arm64_32,
    /// 32-bit PowerPC
    Ppc,
    /// 64-bit PowerPC
    Ppc64,
    /// 32-bit MIPS
    Mips,
    /// 64-bit MIPS
    Mips64,
    /// Missing or unrecognized CPU name; no address adjustment is possible.
    Unknown,
}

impl Architecture
{
    /// Classify a CPU name as written by SDKs and minidump processors.
    pub fn from_name(name: &str) -> Self
    {
        let name = name.trim().to_ascii_lowercase();
        match name.as_str() {
            "x86" | "i386" | "i486" | "i586" | "i686" => Architecture::X86,
            "x86_64" | "x86_64h" | "amd64" => Architecture::X86_64,
            "arm64_32" => Architecture::Arm64_32,
            "arm64" | "arm64e" | "arm64v8" | "aarch64" => Architecture::Arm64,
            "ppc" | "powerpc" => Architecture::Ppc,
            "ppc64" | "powerpc64" => Architecture::Ppc64,
            "mips" => Architecture::Mips,
            "mips64" => Architecture::Mips64,
            other if other == "arm" || other.starts_with("armv") => Architecture::Arm,
            _ => Architecture::Unknown,
        }
    }

    /// Classify an optional CPU name, treating a missing name as unknown.
    pub fn from_optional_name(name: Option<&str>) -> Self
    {
        name.map_or(Architecture::Unknown, Architecture::from_name)
    }

    pub const fn is_known(self) -> bool
    {
        !matches!(self, Architecture::Unknown)
    }

    /// Instruction alignment in bytes, `None` when the architecture is unknown.
    pub const fn instruction_alignment(self) -> Option<u64>
    {
        match self {
            Architecture::X86 | Architecture::X86_64 => Some(1),
            Architecture::Arm => Some(2),
            Architecture::Arm64
            | Architecture::Arm64_32
            | Architecture::Ppc
            | Architecture::Ppc64
            | Architecture::Mips
            | Architecture::Mips64 => Some(4),
            Architecture::Unknown => None,
        }
    }

    /// Name of the register holding the instruction pointer in crash reports.
    pub const fn ip_register_name(self) -> Option<&'static str>
    {
        match self {
            Architecture::X86 => Some("eip"),
            Architecture::X86_64 => Some("rip"),
            Architecture::Arm | Architecture::Arm64 | Architecture::Arm64_32 => Some("pc"),
            Architecture::Ppc | Architecture::Ppc64 => Some("srr0"),
            Architecture::Mips | Architecture::Mips64 => Some("pc"),
            Architecture::Unknown => None,
        }
    }

    /// Distance between a return address and its call instruction.
    ///
    /// On MIPS the return address points two instructions past the call
    /// because of the branch delay slot.
    pub const fn return_address_offset(self) -> u64
    {
        let width = match self.instruction_alignment() {
            Some(width) => width,
            None => 1,
        };
        match self {
            Architecture::Mips | Architecture::Mips64 => 2 * width,
            _ => width,
        }
    }
}

impl fmt::Display for Architecture
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            Architecture::X86 => "x86",
            Architecture::X86_64 => "x86_64",
            Architecture::Arm => "arm",
            Architecture::Arm64 => "arm64",
            Architecture::Arm64_32 => "arm64_32",
            Architecture::Ppc => "ppc",
            Architecture::Ppc64 => "ppc64",
            Architecture::Mips => "mips",
            Architecture::Mips64 => "mips64",
            Architecture::Unknown => "unknown",
        };
        write!(f, "{label}")
    }
}
