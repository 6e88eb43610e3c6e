//! Addresses on the wire.
//!
//! Crash reports carry addresses either as JSON numbers or as strings, and
//! strings may be hex (`"0x1a2b"`) or decimal (`"6699"`). [`HexValue`] accepts
//! all of them and always writes the canonical `0x` form back out.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Failure to read an address from its textual form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid address: {0:?}")]
pub struct ParseAddrError(pub String);

/// Parse an address string the way crash reports write them.
///
/// ```rust
/// use crashsym_protocol::hex::parse_addr;
///
/// assert_eq!(parse_addr("0x1000"), Ok(0x1000));
/// assert_eq!(parse_addr("4096"), Ok(4096));
/// assert!(parse_addr("0xzz").is_err());
/// ```
pub fn parse_addr(value: &str) -> Result<u64, ParseAddrError>
{
    let trimmed = value.trim();
    let parsed = if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        trimmed.parse::<u64>()
    };
    parsed.map_err(|_| ParseAddrError(value.to_string()))
}

/// A 64-bit address serialized as a `0x` hex string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HexValue(pub u64);

impl HexValue
{
    pub const fn value(self) -> u64
    {
        self.0
    }
}

impl From<u64> for HexValue
{
    fn from(value: u64) -> Self
    {
        HexValue(value)
    }
}

impl FromStr for HexValue
{
    type Err = ParseAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        parse_addr(s).map(HexValue)
    }
}

impl fmt::Display for HexValue
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{:#x}", self.0)
    }
}

impl Serialize for HexValue
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error>
    {
        serializer.collect_str(self)
    }
}

struct HexVisitor;

impl<'de> Visitor<'de> for HexVisitor
{
    type Value = HexValue;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        formatter.write_str("an address as a number or a hex/decimal string")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<HexValue, E>
    {
        Ok(HexValue(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<HexValue, E>
    {
        u64::try_from(value)
            .map(HexValue)
            .map_err(|_| E::invalid_value(de::Unexpected::Signed(value), &self))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<HexValue, E>
    {
        value.parse().map_err(|_| E::invalid_value(de::Unexpected::Str(value), &self))
    }
}

impl<'de> Deserialize<'de> for HexValue
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error>
    {
        deserializer.deserialize_any(HexVisitor)
    }
}
