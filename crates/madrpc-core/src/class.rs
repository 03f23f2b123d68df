use std::{convert::TryFrom, fmt};

use crate::{constants::MAX_CLASS, error::ErrorKind};

/// A validated management class code.
///
/// Every `u8` is a valid class; raw integers coming from callers go through
/// `TryFrom<i32>`, which rejects anything outside `0..MAX_CLASS`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MgmtClass(u8);

impl MgmtClass {
    /// LID-routed subnet management.
    pub const SUBN_LID_ROUTED: MgmtClass = MgmtClass(0x01);
    /// Directed-route subnet management.
    pub const SUBN_DIRECTED_ROUTE: MgmtClass = MgmtClass(0x81);
    /// Subnet administration (the directory service).
    pub const SUBN_ADM: MgmtClass = MgmtClass(0x03);
    /// Performance management.
    pub const PERF: MgmtClass = MgmtClass(0x04);
    /// Baseboard management.
    pub const BOARD: MgmtClass = MgmtClass(0x05);
    /// Device management.
    pub const DEVICE: MgmtClass = MgmtClass(0x06);
    /// Communication management.
    pub const CM: MgmtClass = MgmtClass(0x07);
    /// SNMP tunneling.
    pub const SNMP: MgmtClass = MgmtClass(0x08);
    /// Congestion control.
    pub const CONGESTION: MgmtClass = MgmtClass(0x21);

    /// Wraps a class code.
    #[inline]
    pub const fn new(code: u8) -> Self {
        MgmtClass(code)
    }

    /// Returns the raw class code.
    #[inline]
    pub const fn code(self) -> u8 {
        self.0
    }

    /// Whether this class is served by the subnet-management (SMI) path.
    pub fn is_smi(self) -> bool {
        self == Self::SUBN_LID_ROUTED || self == Self::SUBN_DIRECTED_ROUTE
    }

    /// RMPP version to register the delivery agent with.
    pub fn rmpp_version(self) -> u8 {
        if self == Self::SUBN_ADM {
            1
        } else {
            0
        }
    }

    /// Class version placed in the common header of outgoing requests.
    pub fn class_version(self) -> u8 {
        match self {
            Self::SUBN_ADM => 2,
            Self::CONGESTION => 2,
            _ => 1,
        }
    }
}

impl From<u8> for MgmtClass {
    fn from(code: u8) -> Self {
        MgmtClass(code)
    }
}

impl TryFrom<i32> for MgmtClass {
    type Error = ErrorKind;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        if value < 0 || value as usize >= MAX_CLASS {
            return Err(ErrorKind::InvalidArgument(format!("class {} out of range", value)));
        }
        Ok(MgmtClass(value as u8))
    }
}

impl fmt::Display for MgmtClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_from_rejects_out_of_range() {
        assert!(MgmtClass::try_from(-1).is_err());
        assert!(MgmtClass::try_from(256).is_err());
        assert_eq!(MgmtClass::try_from(0x81).unwrap(), MgmtClass::SUBN_DIRECTED_ROUTE);
    }

    #[test]
    fn test_smi_classes() {
        assert!(MgmtClass::SUBN_LID_ROUTED.is_smi());
        assert!(MgmtClass::SUBN_DIRECTED_ROUTE.is_smi());
        assert!(!MgmtClass::SUBN_ADM.is_smi());
        assert!(!MgmtClass::PERF.is_smi());
    }

    #[test]
    fn test_only_sa_registers_with_rmpp() {
        assert_eq!(MgmtClass::SUBN_ADM.rmpp_version(), 1);
        assert_eq!(MgmtClass::PERF.rmpp_version(), 0);
        assert_eq!(MgmtClass::SUBN_LID_ROUTED.rmpp_version(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(MgmtClass::SUBN_DIRECTED_ROUTE.to_string(), "0x81");
    }
}
