//! SmartHub notification frame codec.
//!
//! Layout of the 18-byte payload (characteristic 0x2A56):
//! - byte 0: accel sign bits, bit i set means sub-sample i is negative
//! - byte 1: gyro sign bits
//! - bytes 2..10: four u16 LE accel magnitudes, divide by 1000
//! - bytes 10..18: four u16 LE gyro magnitudes (rad/s), divide by 100
//!
//! Sub-sample 0 is the oldest reading in the frame, 3 the newest.

use serde::{Deserialize, Serialize};

use crate::error::{HubResult, SmartHubError};

pub const FRAME_LEN: usize = 18;
pub const SUB_SAMPLES: usize = 4;

const ACCEL_OFFSET: usize = 2;
const GYRO_OFFSET: usize = 10;
const ACCEL_DIVISOR: f64 = 1000.0;
const GYRO_DIVISOR: f64 = 100.0;

/// One sign-corrected frame from a single wheel sensor
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DecodedSample {
    pub accel: [f64; SUB_SAMPLES],
    pub gyro: [f64; SUB_SAMPLES],
}

impl DecodedSample {
    pub fn new(accel: [f64; SUB_SAMPLES], gyro: [f64; SUB_SAMPLES]) -> Self {
        Self { accel, gyro }
    }

    /// Wheel rotation rate over the frame window (mean of the four gyro readings)
    pub fn wheel_rate(&self) -> f64 {
        self.gyro.iter().sum::<f64>() / SUB_SAMPLES as f64
    }
}

/// Decode one raw notification payload
pub fn decode(data: &[u8]) -> HubResult<DecodedSample> {
    if data.len() != FRAME_LEN {
        return Err(SmartHubError::MalformedFrame { len: data.len() });
    }

    let accel_signs = data[0];
    let gyro_signs = data[1];
    let mut sample = DecodedSample::default();

    for i in 0..SUB_SAMPLES {
        sample.accel[i] = read_channel(data, ACCEL_OFFSET, i, accel_signs, ACCEL_DIVISOR);
        sample.gyro[i] = read_channel(data, GYRO_OFFSET, i, gyro_signs, GYRO_DIVISOR);
    }

    Ok(sample)
}

fn read_channel(data: &[u8], offset: usize, index: usize, signs: u8, divisor: f64) -> f64 {
    let at = offset + 2 * index;
    let magnitude = u16::from_le_bytes([data[at], data[at + 1]]) as f64 / divisor;
    if signs & (1 << index) != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Encode a sample back into the wire layout.
///
/// Magnitudes are rounded to the wire resolution and saturate at `u16::MAX`.
pub fn encode(sample: &DecodedSample) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];

    for i in 0..SUB_SAMPLES {
        frame[0] |= write_channel(&mut frame, ACCEL_OFFSET, i, sample.accel[i], ACCEL_DIVISOR);
        frame[1] |= write_channel(&mut frame, GYRO_OFFSET, i, sample.gyro[i], GYRO_DIVISOR);
    }

    frame
}

fn write_channel(frame: &mut [u8; FRAME_LEN], offset: usize, index: usize, value: f64, divisor: f64) -> u8 {
    let magnitude = (value.abs() * divisor).round().min(u16::MAX as f64) as u16;
    let at = offset + 2 * index;
    frame[at..at + 2].copy_from_slice(&magnitude.to_le_bytes());

    if value.is_sign_negative() && magnitude != 0 {
        1 << index
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCEL_RAW: [u16; 4] = [1000, 2500, 65535, 7];
    const GYRO_RAW: [u16; 4] = [150, 0, 1234, 300];

    fn frame_with_signs(accel_signs: u8, gyro_signs: u8) -> Vec<u8> {
        let mut frame = vec![accel_signs, gyro_signs];
        for raw in ACCEL_RAW {
            frame.extend_from_slice(&raw.to_le_bytes());
        }
        for raw in GYRO_RAW {
            frame.extend_from_slice(&raw.to_le_bytes());
        }
        frame
    }

    #[test]
    fn test_decode_positive_frame() {
        let sample = decode(&frame_with_signs(0, 0)).unwrap();

        assert_eq!(sample.accel, [1.0, 2.5, 65.535, 0.007]);
        assert_eq!(sample.gyro, [1.5, 0.0, 12.34, 3.0]);
    }

    #[test]
    fn test_decode_all_sign_combinations() {
        for accel_signs in 0u8..16 {
            for gyro_signs in 0u8..16 {
                let sample = decode(&frame_with_signs(accel_signs, gyro_signs)).unwrap();

                for i in 0..SUB_SAMPLES {
                    let mut accel = ACCEL_RAW[i] as f64 / 1000.0;
                    if accel_signs & (1 << i) != 0 {
                        accel = -accel;
                    }
                    let mut gyro = GYRO_RAW[i] as f64 / 100.0;
                    if gyro_signs & (1 << i) != 0 {
                        gyro = -gyro;
                    }
                    assert_eq!(sample.accel[i], accel, "accel {} signs {:04b}", i, accel_signs);
                    assert_eq!(sample.gyro[i], gyro, "gyro {} signs {:04b}", i, gyro_signs);
                }
            }
        }
    }

    #[test]
    fn test_upper_sign_bits_ignored() {
        let plain = decode(&frame_with_signs(0x00, 0x00)).unwrap();
        let noisy = decode(&frame_with_signs(0xF0, 0xF0)).unwrap();
        assert_eq!(plain, noisy);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert_eq!(
            decode(&[0u8; 17]),
            Err(SmartHubError::MalformedFrame { len: 17 })
        );
        assert_eq!(
            decode(&[0u8; 19]),
            Err(SmartHubError::MalformedFrame { len: 19 })
        );
        assert_eq!(decode(&[]), Err(SmartHubError::MalformedFrame { len: 0 }));
    }

    #[test]
    fn test_encode_matches_wire_layout() {
        let sample = DecodedSample::new([-1.0, 0.5, 0.0, 2.0], [0.25, -3.5, 1.0, -0.01]);
        let frame = encode(&sample);

        assert_eq!(frame[0], 0b0001);
        assert_eq!(frame[1], 0b1010);
        assert_eq!(u16::from_le_bytes([frame[2], frame[3]]), 1000);
        assert_eq!(u16::from_le_bytes([frame[12], frame[13]]), 350);
        assert_eq!(decode(&frame).unwrap(), sample);
    }

    #[test]
    fn test_encode_saturates() {
        let sample = DecodedSample::new([100.0, 0.0, 0.0, 0.0], [-1000.0, 0.0, 0.0, 0.0]);
        let decoded = decode(&encode(&sample)).unwrap();
        assert_eq!(decoded.accel[0], 65.535);
        assert_eq!(decoded.gyro[0], -655.35);
    }

    #[test]
    fn test_wheel_rate() {
        let sample = DecodedSample::new([0.0; 4], [1.0, 2.0, 3.0, 6.0]);
        assert_eq!(sample.wheel_rate(), 3.0);
    }
}
