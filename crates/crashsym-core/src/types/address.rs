//! Instruction address type.

use std::fmt;

use crashsym_protocol::HexValue;

/// Strongly typed instruction address
///
/// This wrapper around `u64` keeps absolute addresses (as found in a crash
/// report) apart from sizes, offsets, and image-relative addresses, which are
/// all plain `u64` in this crate.
///
/// ## Example
///
/// ```rust
/// use crashsym_core::types::Address;
///
/// let addr = Address::from(0x1500);
/// assert_eq!(addr.offset_from(Address::new(0x1000)), Some(0x500));
/// assert_eq!(addr.align_down(0x100), Address::new(0x1500));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Subtract an offset from this address, checking for underflow
    ///
    /// ```rust
    /// use crashsym_core::types::Address;
    ///
    /// let addr = Address::from(0x1000);
    /// assert_eq!(addr.checked_sub(0x100), Some(Address::from(0xf00)));
    /// assert_eq!(addr.checked_sub(u64::MAX), None);
    /// ```
    pub fn checked_sub(self, offset: u64) -> Option<Self>
    {
        self.0.checked_sub(offset).map(Address)
    }

    /// Distance from `base` to this address, `None` if `base` lies above it.
    ///
    /// This is how an absolute address is rebased into an image.
    pub fn offset_from(self, base: Address) -> Option<u64>
    {
        self.0.checked_sub(base.0)
    }

    /// Round down to a multiple of `alignment` (an alignment of 0 or 1 is a no-op).
    #[must_use]
    pub const fn align_down(self, alignment: u64) -> Self
    {
        if alignment <= 1 {
            self
        } else {
            Address(self.0 - self.0 % alignment)
        }
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl From<HexValue> for Address
{
    fn from(value: HexValue) -> Self
    {
        Address(value.0)
    }
}

impl From<Address> for HexValue
{
    fn from(address: Address) -> Self
    {
        HexValue(address.0)
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}
