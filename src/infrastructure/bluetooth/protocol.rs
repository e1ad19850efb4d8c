//! GLM Protocol
//!
//! Frame layout and constants for talking to the laser distance meter over
//! its single GATT characteristic. The same characteristic receives commands
//! and delivers measurement frames.

use crate::domain::models::{DeviceAddress, Measurement};
use thiserror::Error;
use uuid::Uuid;

/// GLM BLE Service UUID
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x02a6c0d0_0451_4000_b000_fb3210111989);

/// Command / notification characteristic UUID
pub const CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x02a6c0d1_0451_4000_b000_fb3210111989);

/// Address of the paired meter
pub const DEFAULT_DEVICE_ADDRESS: DeviceAddress = DeviceAddress::from_raw_unchecked(0x546C0EA48576);

/// "Enable auto-sync": the device pushes every new reading after this
pub const AUTO_SYNC_ENABLE: [u8; 6] = [0xC0, 0x55, 0x02, 0x01, 0x00, 0x1A];

/// Leading bytes of a measurement frame
pub const MEASUREMENT_PREFIX: [u8; 4] = [0xC0, 0x55, 0x10, 0x06];

/// Shortest frame that still carries the distance field
pub const MIN_MEASUREMENT_FRAME_LEN: usize = 12;

/// Offset of the little-endian f32 distance in meters
pub const DISTANCE_OFFSET: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("not a measurement frame ({len} bytes)")]
    NotAMeasurementFrame { len: usize },
}

/// Bytes of the auto-sync command
pub fn encode_command() -> [u8; 6] {
    AUTO_SYNC_ENABLE
}

/// True when `bytes` has the measurement prefix and enough room for the distance
pub fn is_measurement_frame(bytes: &[u8]) -> bool {
    bytes.len() >= MIN_MEASUREMENT_FRAME_LEN && bytes[..MEASUREMENT_PREFIX.len()] == MEASUREMENT_PREFIX
}

/// Decode a measurement notification
///
/// # Measurement Frame Structure (>= 12 bytes)
///
/// ```text
/// [0-3]   : Prefix C0 55 10 06
/// [4-6]   : Unused by the bridge
/// [7-10]  : Distance in meters (f32 little-endian)
/// [11..]  : Trailer, ignored
/// ```
///
/// The value is passed through as-is; negative or NaN readings are not
/// filtered.
pub fn decode_measurement(bytes: &[u8]) -> Result<Measurement, DecodeError> {
    if !is_measurement_frame(bytes) {
        return Err(DecodeError::NotAMeasurementFrame { len: bytes.len() });
    }

    let meters = f32::from_le_bytes([
        bytes[DISTANCE_OFFSET],
        bytes[DISTANCE_OFFSET + 1],
        bytes[DISTANCE_OFFSET + 2],
        bytes[DISTANCE_OFFSET + 3],
    ]);

    Ok(Measurement::from_meters(meters))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frame(meters: f32) -> Vec<u8> {
        let mut bytes = MEASUREMENT_PREFIX.to_vec();
        bytes.extend_from_slice(&[0x00, 0x00, 0x00]);
        bytes.extend_from_slice(&meters.to_le_bytes());
        bytes.push(0x00);
        bytes
    }

    #[test]
    fn test_command_bytes() {
        assert_eq!(encode_command(), [0xC0, 0x55, 0x02, 0x01, 0x00, 0x1A]);
        assert_eq!(encode_command(), encode_command());
    }

    #[test]
    fn test_uuid_constants() {
        assert_eq!(
            SERVICE_UUID.to_string(),
            "02a6c0d0-0451-4000-b000-fb3210111989"
        );
        assert_eq!(
            CHARACTERISTIC_UUID.to_string(),
            "02a6c0d1-0451-4000-b000-fb3210111989"
        );
        assert_eq!(DEFAULT_DEVICE_ADDRESS.to_string(), "54:6C:0E:A4:85:76");
    }

    #[test]
    fn test_decode_known_frame() {
        let m = decode_measurement(&frame(1.2345)).unwrap();
        assert!((m.meters() - 1.2345).abs() < 1e-6);
        assert_eq!(m.millimeters(), 1234);
    }

    #[test]
    fn test_decode_ignores_trailer() {
        let mut bytes = frame(2.5);
        bytes.extend_from_slice(&[0xAA; 8]);
        assert_eq!(decode_measurement(&bytes).unwrap().meters(), 2.5);
    }

    #[test]
    fn test_decode_passes_implausible_values() {
        assert_eq!(decode_measurement(&frame(-3.0)).unwrap().meters(), -3.0);
        assert!(decode_measurement(&frame(f32::NAN)).unwrap().meters().is_nan());
    }

    #[test]
    fn test_truncated_frames_rejected() {
        let full = frame(1.0);
        for len in 0..MIN_MEASUREMENT_FRAME_LEN {
            assert_eq!(
                decode_measurement(&full[..len]),
                Err(DecodeError::NotAMeasurementFrame { len })
            );
        }
    }

    #[test]
    fn test_command_echo_is_not_a_measurement() {
        assert!(decode_measurement(&AUTO_SYNC_ENABLE).is_err());
    }

    #[test]
    fn test_wrong_prefix_rejected() {
        let mut bytes = frame(1.0);
        bytes[2] = 0x11;
        assert!(!is_measurement_frame(&bytes));
        assert_eq!(
            decode_measurement(&bytes),
            Err(DecodeError::NotAMeasurementFrame { len: 12 })
        );
    }

    proptest! {
        #[test]
        fn short_input_never_decodes(bytes in proptest::collection::vec(any::<u8>(), 0..MIN_MEASUREMENT_FRAME_LEN)) {
            prop_assert!(decode_measurement(&bytes).is_err());
        }

        #[test]
        fn foreign_prefix_never_decodes(
            head in any::<[u8; 4]>(),
            tail in proptest::collection::vec(any::<u8>(), 8..64),
        ) {
            prop_assume!(head != MEASUREMENT_PREFIX);
            let mut bytes = head.to_vec();
            bytes.extend(tail);
            prop_assert!(decode_measurement(&bytes).is_err());
        }

        #[test]
        fn decode_is_deterministic(
            meters in any::<f32>(),
            tail in proptest::collection::vec(any::<u8>(), 0..16),
        ) {
            let mut bytes = frame(meters);
            bytes.extend(tail);
            let a = decode_measurement(&bytes).unwrap();
            let b = decode_measurement(&bytes).unwrap();
            prop_assert_eq!(a.meters().to_bits(), b.meters().to_bits());
            prop_assert_eq!(a.meters().to_bits(), meters.to_bits());
        }
    }
}
