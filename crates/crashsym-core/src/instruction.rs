//! # Instruction Resolution
//!
//! Computes the address to symbolize for each frame.
//!
//! Stack walkers report return addresses for every frame but the crashing
//! one: the instruction *after* the call. Looking that address up may land
//! in the next line or even the next function, so non-crashing frames are
//! moved back by one instruction to the call site. The crashing frame holds
//! the faulting instruction itself, unless the crash happened while jumping
//! to a bad address, in which case the signal and the instruction pointer
//! tell the two cases apart.

use crashsym_protocol::FrameTrust;

use crate::types::{Address, Architecture, RegisterSnapshot};

/// Signals raised by executing (or failing to fetch) an instruction: SIGILL, SIGBUS, SIGSEGV.
pub const CRASH_SIGNALS: [u32; 3] = [4, 10, 11];

/// Everything known about one frame's instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionInfo
{
    pub address: Address,
    pub architecture: Architecture,
    pub crashing_frame: bool,
    pub signal: Option<u32>,
    pub ip_register: Option<Address>,
    pub trust: FrameTrust,
}

impl InstructionInfo
{
    /// `address` rounded down to the instruction alignment.
    pub fn aligned_address(&self) -> Address
    {
        self.architecture
            .instruction_alignment()
            .map_or(self.address, |alignment| self.address.align_down(alignment))
    }

    /// Address of the instruction before the aligned address.
    pub fn previous_address(&self) -> Address
    {
        let aligned = self.aligned_address();
        aligned
            .checked_sub(self.architecture.return_address_offset())
            .unwrap_or(aligned)
    }

    /// `true` if the crashing frame should be read as a return address.
    ///
    /// A crash signal with an instruction pointer that differs from the frame
    /// address means the frame was recovered from the stack (the process
    /// jumped somewhere and faulted there).
    pub fn is_crash_return_address(&self) -> bool
    {
        let Some(ip) = self.ip_register else {
            return false;
        };
        ip != self.address && self.signal.is_some_and(|signal| CRASH_SIGNALS.contains(&signal))
    }

    /// `true` if the frame's address is a return address.
    pub fn should_adjust(&self) -> bool
    {
        if !self.crashing_frame {
            return true;
        }
        match self.trust {
            FrameTrust::Cfi | FrameTrust::FramePointer | FrameTrust::Scan | FrameTrust::CfiScan => true,
            FrameTrust::Context | FrameTrust::Prewalked | FrameTrust::Unknown => self.is_crash_return_address(),
        }
    }

    /// The address to look up.
    pub fn caller_address(&self) -> Address
    {
        if !self.architecture.is_known() {
            return self.address;
        }
        if self.should_adjust() {
            self.previous_address()
        } else {
            self.aligned_address()
        }
    }
}

/// Per-event resolver for lookup addresses
///
/// ## Example
///
/// ```rust
/// use crashsym_core::instruction::InstructionResolver;
/// use crashsym_core::types::{Address, Architecture, RegisterSnapshot};
/// use crashsym_protocol::FrameTrust;
///
/// let resolver = InstructionResolver::new(Architecture::Arm64, Some(11));
/// let registers = RegisterSnapshot::default();
///
/// // The crashing frame without register information keeps its (aligned) address.
/// let crashing = resolver.resolve(Address::new(0x1002), 0, &registers, FrameTrust::Context);
/// assert_eq!(crashing, Address::new(0x1000));
///
/// // Callers are moved back to the call instruction.
/// let caller = resolver.resolve(Address::new(0x2004), 1, &registers, FrameTrust::Cfi);
/// assert_eq!(caller, Address::new(0x2000));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionResolver
{
    architecture: Architecture,
    signal: Option<u32>,
}

impl InstructionResolver
{
    pub fn new(architecture: Architecture, signal: Option<u32>) -> Self
    {
        Self { architecture, signal }
    }

    pub fn architecture(&self) -> Architecture
    {
        self.architecture
    }

    /// Lookup address of the frame at `frame_index`, counted from the crashing frame.
    ///
    /// Only frame 0 sees the signal and the thread's instruction pointer.
    pub fn resolve(&self, address: Address, frame_index: usize, registers: &RegisterSnapshot, trust: FrameTrust)
        -> Address
    {
        self.info(address, frame_index, registers, trust).caller_address()
    }

    pub fn info(&self, address: Address, frame_index: usize, registers: &RegisterSnapshot, trust: FrameTrust)
        -> InstructionInfo
    {
        let crashing_frame = frame_index == 0;
        InstructionInfo {
            address,
            architecture: self.architecture,
            crashing_frame,
            signal: if crashing_frame { self.signal } else { None },
            ip_register: if crashing_frame {
                registers.instruction_pointer(self.architecture)
            } else {
                None
            },
            trust,
        }
    }
}

#[cfg(test)]
mod tests
{
    use crashsym_protocol::{HexValue, RegisterMap};

    use super::*;

    fn registers(name: &str, value: u64) -> RegisterSnapshot
    {
        RegisterSnapshot::new(RegisterMap::from([(name.to_string(), HexValue(value))]))
    }

    #[test]
    fn test_unknown_architecture_keeps_raw_address()
    {
        let resolver = InstructionResolver::new(Architecture::Unknown, Some(11));
        let empty = RegisterSnapshot::default();
        for index in 0..3 {
            assert_eq!(
                resolver.resolve(Address::new(0x1003), index, &empty, FrameTrust::Cfi),
                Address::new(0x1003)
            );
        }
    }

    #[test]
    fn test_only_crashing_frame_uses_signal_and_registers()
    {
        let resolver = InstructionResolver::new(Architecture::X86_64, Some(11));
        let regs = registers("rip", 0x9999);

        let f0 = resolver.info(Address::new(0x1500), 0, &regs, FrameTrust::Context);
        let f1 = resolver.info(Address::new(0x1600), 1, &regs, FrameTrust::Cfi);
        let f2 = resolver.info(Address::new(0x1700), 2, &regs, FrameTrust::Cfi);

        assert_eq!(f0.signal, Some(11));
        assert_eq!(f0.ip_register, Some(Address::new(0x9999)));
        assert_eq!(f1.signal, None);
        assert_eq!(f1.ip_register, None);

        // ip differs and SIGSEGV: the crashing frame is a return address.
        assert_eq!(f0.caller_address(), Address::new(0x14ff));
        assert_eq!(f1.caller_address(), Address::new(0x15ff));
        assert_eq!(f2.caller_address(), Address::new(0x16ff));
    }

    #[test]
    fn test_crashing_frame_at_instruction_pointer_is_not_adjusted()
    {
        let resolver = InstructionResolver::new(Architecture::X86_64, Some(11));
        let regs = registers("rip", 0x1500);
        assert_eq!(
            resolver.resolve(Address::new(0x1500), 0, &regs, FrameTrust::Context),
            Address::new(0x1500)
        );

        // Not a crash signal (SIGABRT).
        let resolver = InstructionResolver::new(Architecture::X86_64, Some(6));
        let regs = registers("rip", 0x9999);
        assert_eq!(
            resolver.resolve(Address::new(0x1500), 0, &regs, FrameTrust::Context),
            Address::new(0x1500)
        );
    }

    #[test]
    fn test_walked_crashing_frame_is_a_return_address()
    {
        let resolver = InstructionResolver::new(Architecture::Arm64, None);
        let empty = RegisterSnapshot::default();
        assert_eq!(
            resolver.resolve(Address::new(0x1008), 0, &empty, FrameTrust::Scan),
            Address::new(0x1004)
        );
        assert_eq!(
            resolver.resolve(Address::new(0x1008), 0, &empty, FrameTrust::Prewalked),
            Address::new(0x1008)
        );
    }

    #[test]
    fn test_architecture_specific_widths()
    {
        let empty = RegisterSnapshot::default();
        let arm = InstructionResolver::new(Architecture::Arm, None);
        assert_eq!(arm.resolve(Address::new(0x1003), 1, &empty, FrameTrust::Cfi), Address::new(0x1000));

        let mips = InstructionResolver::new(Architecture::Mips, None);
        assert_eq!(mips.resolve(Address::new(0x1010), 1, &empty, FrameTrust::Cfi), Address::new(0x1008));

        let ppc = InstructionResolver::new(Architecture::Ppc, Some(4));
        let regs = registers("srr0", 0x2000);
        assert_eq!(ppc.resolve(Address::new(0x1010), 0, &regs, FrameTrust::Context), Address::new(0x100c));
    }

    #[test]
    fn test_previous_address_saturates_at_zero()
    {
        let resolver = InstructionResolver::new(Architecture::Arm64, None);
        assert_eq!(
            resolver.resolve(Address::new(0x2), 1, &RegisterSnapshot::default(), FrameTrust::Cfi),
            Address::ZERO
        );
    }
}
