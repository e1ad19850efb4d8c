use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A single distance reading decoded from the device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    meters: f32,
}

impl Measurement {
    pub fn from_meters(meters: f32) -> Self {
        Self { meters }
    }

    pub fn meters(&self) -> f32 {
        self.meters
    }

    /// Distance in whole millimeters. Scaled in single precision as the
    /// device reports it, then rounded half to even.
    /// NaN maps to 0, infinities saturate.
    pub fn millimeters(&self) -> i64 {
        (self.meters * 1000.0f32).round_ties_even() as i64
    }
}

/// 48-bit Bluetooth hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceAddress(u64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    #[error("expected 6 octets separated by ':' or '-', got {0:?}")]
    Format(String),
    #[error("address {0:#X} does not fit in 48 bits")]
    TooWide(u64),
}

impl DeviceAddress {
    pub const MAX: u64 = 0xFFFF_FFFF_FFFF;

    pub fn new(raw: u64) -> Result<Self, AddressParseError> {
        if raw > Self::MAX {
            return Err(AddressParseError::TooWide(raw));
        }
        Ok(Self(raw))
    }

    pub const fn from_raw_unchecked(raw: u64) -> Self {
        Self(raw & Self::MAX)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0.to_be_bytes();
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

impl FromStr for DeviceAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets: Vec<&str> = s.trim().split([':', '-']).collect();
        if octets.len() != 6 {
            return Err(AddressParseError::Format(s.to_string()));
        }

        let mut raw = 0u64;
        for octet in octets {
            if octet.len() != 2 || !octet.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(AddressParseError::Format(s.to_string()));
            }
            let value = u8::from_str_radix(octet, 16)
                .map_err(|_| AddressParseError::Format(s.to_string()))?;
            raw = (raw << 8) | u64::from(value);
        }
        Ok(Self(raw))
    }
}

impl TryFrom<String> for DeviceAddress {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceAddress> for String {
    fn from(address: DeviceAddress) -> Self {
        address.to_string()
    }
}

/// Lifecycle of a GATT session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    ServiceResolved,
    CharacteristicResolved,
    SubscriptionRequested,
    Listening,
    Terminated,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated | Self::Failed)
    }
}

/// Value-change delivery modes a characteristic advertises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharacteristicCapabilities(u8);

impl CharacteristicCapabilities {
    pub const NONE: Self = Self(0);
    pub const NOTIFY: Self = Self(0x01);
    pub const INDICATE: Self = Self(0x02);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for CharacteristicCapabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// CCCD value written to enable delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionMode {
    Notify,
    Indicate,
}

impl SubscriptionMode {
    /// Indicate when supported, notify otherwise
    pub fn select(capabilities: CharacteristicCapabilities) -> Self {
        if capabilities.contains(CharacteristicCapabilities::INDICATE) {
            Self::Indicate
        } else {
            Self::Notify
        }
    }
}

impl fmt::Display for SubscriptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Notify => f.write_str("notify"),
            Self::Indicate => f.write_str("indicate"),
        }
    }
}

/// Outcome reported by the GATT client for a request that reached the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(any(windows, test)), allow(dead_code))]
pub enum CommunicationStatus {
    Success,
    Unreachable,
    ProtocolError,
    AccessDenied,
}

/// Why a listening session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    Cancelled,
    ConnectionLost,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millimeters_rounding() {
        assert_eq!(Measurement::from_meters(1.234).millimeters(), 1234);
        assert_eq!(Measurement::from_meters(0.0).millimeters(), 0);
        assert_eq!(Measurement::from_meters(-0.5).millimeters(), -500);
        assert_eq!(Measurement::from_meters(f32::NAN).millimeters(), 0);
    }

    #[test]
    fn test_millimeters_scaled_in_single_precision() {
        assert_eq!(Measurement::from_meters(1.2345).millimeters(), 1234);
        assert_eq!(Measurement::from_meters(0.0005).millimeters(), 0);
        assert_eq!(Measurement::from_meters(0.1235).millimeters(), 124);
        assert_eq!(Measurement::from_meters(3.0015).millimeters(), 3002);
    }

    #[test]
    fn test_address_display_and_parse() {
        let address: DeviceAddress = "54:6c:0e:a4:85:76".parse().unwrap();
        assert_eq!(address.as_u64(), 0x546C0EA48576);
        assert_eq!(address.to_string(), "54:6C:0E:A4:85:76");

        let dashed: DeviceAddress = "54-6C-0E-A4-85-76".parse().unwrap();
        assert_eq!(dashed, address);
    }

    #[test]
    fn test_address_rejects_malformed() {
        assert!("54:6C:0E:A4:85".parse::<DeviceAddress>().is_err());
        assert!("54:6C:0E:A4:85:7G".parse::<DeviceAddress>().is_err());
        assert!("546:C:0E:A4:85:76".parse::<DeviceAddress>().is_err());
        assert!("54:+C:0E:A4:85:76".parse::<DeviceAddress>().is_err());
        assert!("54:6C:0E:A4:85:-7".parse::<DeviceAddress>().is_err());
        assert_eq!(
            DeviceAddress::new(1 << 48),
            Err(AddressParseError::TooWide(1 << 48))
        );
    }

    #[test]
    fn test_address_serde() {
        let address = DeviceAddress::new(0x546C0EA48576).unwrap();
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, "\"54:6C:0E:A4:85:76\"");
        let back: DeviceAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
        assert!(serde_json::from_str::<DeviceAddress>("\"nope\"").is_err());
    }

    #[test]
    fn test_subscription_mode_prefers_indicate() {
        let both = CharacteristicCapabilities::NOTIFY | CharacteristicCapabilities::INDICATE;
        assert_eq!(SubscriptionMode::select(both), SubscriptionMode::Indicate);
        assert_eq!(
            SubscriptionMode::select(CharacteristicCapabilities::NOTIFY),
            SubscriptionMode::Notify
        );
        assert_eq!(
            SubscriptionMode::select(CharacteristicCapabilities::NONE),
            SubscriptionMode::Notify
        );
    }
}
