//! Register snapshots attached to stack traces.

use crashsym_protocol::RegisterMap;

use super::{Address, Architecture};

/// Register values of one thread at the time of the crash
///
/// Only the crashing thread usually carries registers. The snapshot is keyed
/// by the register names SDKs emit (`rip`, `pc`, `x29`, ...), so lookups are
/// by name rather than by a fixed register layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterSnapshot
{
    values: RegisterMap,
}

impl RegisterSnapshot
{
    pub fn new(values: RegisterMap) -> Self
    {
        Self { values }
    }

    /// Value of a register by name, if captured.
    pub fn get(&self, name: &str) -> Option<Address>
    {
        self.values.get(name).map(|value| Address::from(*value))
    }

    /// Instruction pointer of the thread for the given architecture.
    pub fn instruction_pointer(&self, architecture: Architecture) -> Option<Address>
    {
        architecture.ip_register_name().and_then(|name| self.get(name))
    }

    pub fn is_empty(&self) -> bool
    {
        self.values.is_empty()
    }

    /// Raw map as sent to the symbolication service.
    pub fn as_map(&self) -> &RegisterMap
    {
        &self.values
    }
}

impl From<Option<&RegisterMap>> for RegisterSnapshot
{
    fn from(values: Option<&RegisterMap>) -> Self
    {
        Self::new(values.cloned().unwrap_or_default())
    }
}
