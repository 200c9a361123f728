//! Discovery method identifiers and the enabled-method bitset.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Target discovery methods.
///
/// Several methods may be enabled at once; `MethodSet` is the bitset form
/// used by the enable/disable paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMethod {
    Static,
    SendTargets,
    Slp,
    Isns,
}

impl DiscoveryMethod {
    /// All methods, in worker-table order.
    pub const ALL: [DiscoveryMethod; 4] = [
        DiscoveryMethod::Static,
        DiscoveryMethod::SendTargets,
        DiscoveryMethod::Slp,
        DiscoveryMethod::Isns,
    ];

    pub fn bit(self) -> u8 {
        match self {
            DiscoveryMethod::Static => 0b0001,
            DiscoveryMethod::SendTargets => 0b0010,
            DiscoveryMethod::Slp => 0b0100,
            DiscoveryMethod::Isns => 0b1000,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DiscoveryMethod::Static => "Static",
            DiscoveryMethod::SendTargets => "SendTargets",
            DiscoveryMethod::Slp => "SLP",
            DiscoveryMethod::Isns => "iSNS",
        }
    }
}

impl fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of discovery methods, stored as a bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MethodSet(u8);

impl MethodSet {
    pub const EMPTY: MethodSet = MethodSet(0);
    pub const ALL: MethodSet = MethodSet(0b1111);

    pub fn single(method: DiscoveryMethod) -> Self {
        MethodSet(method.bit())
    }

    pub fn contains(self, method: DiscoveryMethod) -> bool {
        self.0 & method.bit() != 0
    }

    pub fn insert(&mut self, method: DiscoveryMethod) {
        self.0 |= method.bit();
    }

    pub fn remove(&mut self, method: DiscoveryMethod) {
        self.0 &= !method.bit();
    }

    /// The complement within the known methods. The disable path is handed
    /// the complement of the enabled set.
    pub fn complement(self) -> Self {
        MethodSet(!self.0 & Self::ALL.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = DiscoveryMethod> {
        DiscoveryMethod::ALL.into_iter().filter(move |m| self.contains(*m))
    }
}

impl FromIterator<DiscoveryMethod> for MethodSet {
    fn from_iter<I: IntoIterator<Item = DiscoveryMethod>>(iter: I) -> Self {
        let mut set = MethodSet::EMPTY;
        for m in iter {
            set.insert(m);
        }
        set
    }
}

impl fmt::Display for MethodSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for m in self.iter() {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(m.name())?;
            first = false;
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}
