//! Values that remember the JSON they were read from.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A typed value together with its original JSON.
///
/// Serializing writes the original JSON back unchanged, so a field that is
/// only read (an address sent as a decimal number, a trust tag this crate
/// does not know) leaves the report exactly as it came in. Values built in
/// code serialize like `T`.
///
/// ```rust
/// use crashsym_protocol::{FrameTrust, HexValue, Verbatim};
///
/// let addr: Verbatim<HexValue> = serde_json::from_str("4096").unwrap();
/// assert_eq!(addr.value(), HexValue(0x1000));
/// assert_eq!(serde_json::to_string(&addr).unwrap(), "4096");
///
/// let trust: Verbatim<FrameTrust> = serde_json::from_str("\"weird\"").unwrap();
/// assert_eq!(trust.value(), FrameTrust::Unknown);
/// assert_eq!(serde_json::to_string(&trust).unwrap(), "\"weird\"");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Verbatim<T>
{
    value: T,
    raw: Value,
}

impl<T> Verbatim<T>
{
    pub fn get(&self) -> &T
    {
        &self.value
    }

    /// The JSON this value serializes to.
    pub fn raw(&self) -> &Value
    {
        &self.raw
    }
}

impl<T: Copy> Verbatim<T>
{
    pub fn value(&self) -> T
    {
        self.value
    }
}

impl<T: Serialize> From<T> for Verbatim<T>
{
    fn from(value: T) -> Self
    {
        let raw = serde_json::to_value(&value).unwrap_or(Value::Null);
        Self { value, raw }
    }
}

impl<T> Serialize for Verbatim<T>
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error>
    {
        self.raw.serialize(serializer)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Verbatim<T>
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error>
    {
        let raw = Value::deserialize(deserializer)?;
        let value = T::deserialize(&raw).map_err(D::Error::custom)?;
        Ok(Self { value, raw })
    }
}
