//! Heart Rate Measurement codec
//!
//! Decodes the value notified on the Heart Rate Measurement characteristic
//! (0x2A37). The layout is a flags byte followed by the heart rate value and
//! optional fields:
//! - bit 0: value format, `u8` when clear, little-endian `u16` when set
//! - bit 1: sensor contact detected
//! - bit 2: sensor contact supported
//! - bit 3: energy expended present (`u16`, kJ)
//! - bit 4: RR intervals present (`u16` each, 1/1024 s resolution)

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use std::fmt;
use std::time::Duration;

use crate::core::errors::CodecError;
use crate::{get_u16_little_endian, is_bit_set};

/// A decoded Bluetooth LE Heart Rate Service (HRS) measurement.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct HeartRateMeasurement {
    /// Flags indicating the presence of optional data and data encoding.
    flags: u8,
    /// Heart rate value in beats per minute (BPM).
    hr_value: u16,
    /// Energy expenditure in kilojoules.
    energy_expended: Option<u16>,
    /// RR intervals converted to milliseconds.
    rr_intervals: Vec<u16>,
}

impl HeartRateMeasurement {
    /// Decodes a raw characteristic value.
    ///
    /// # Errors
    /// `CodecError::MalformedPayload` if the payload is shorter than the
    /// format declared by its flags requires.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let flags = *data.first().ok_or(CodecError::MalformedPayload {
            expected: 2,
            actual: 0,
        })?;

        let value_end = if is_bit_set!(flags, 0) { 3 } else { 2 };
        if data.len() < value_end {
            return Err(CodecError::MalformedPayload {
                expected: value_end,
                actual: data.len(),
            });
        }
        let hr_value = if is_bit_set!(flags, 0) {
            get_u16_little_endian!(data, 1)
        } else {
            data[1] as u16
        };

        let mut offset = value_end;
        let energy_expended = if is_bit_set!(flags, 3) {
            if data.len() < offset + 2 {
                return Err(CodecError::MalformedPayload {
                    expected: offset + 2,
                    actual: data.len(),
                });
            }
            let energy = get_u16_little_endian!(data, offset);
            offset += 2;
            Some(energy)
        } else {
            None
        };

        let rr_intervals = if is_bit_set!(flags, 4) {
            data[offset..]
                .chunks_exact(2)
                .map(|chunk| (get_u16_little_endian!(chunk, 0) as f64 * 1000f64 / 1024f64) as u16)
                .collect()
        } else {
            Vec::new()
        };

        Ok(Self {
            flags,
            hr_value,
            energy_expended,
            rr_intervals,
        })
    }

    /// Decodes a characteristic value as delivered by the adapter, i.e.
    /// base64 encoded.
    pub fn decode_base64(value: &str) -> Result<Self, CodecError> {
        let data = BASE64_STANDARD.decode(value.trim())?;
        Self::decode(&data)
    }

    /// Heart rate value in beats per minute.
    pub fn bpm(&self) -> u16 {
        self.hr_value
    }

    /// Checks if the heart rate value uses 16-bit representation.
    pub fn has_long_hr(&self) -> bool {
        is_bit_set!(self.flags, 0)
    }

    pub fn sen_has_contact(&self) -> bool {
        is_bit_set!(self.flags, 1)
    }

    pub fn sen_contact_supported(&self) -> bool {
        is_bit_set!(self.flags, 2)
    }

    pub fn energy_expended(&self) -> Option<u16> {
        self.energy_expended
    }

    /// RR intervals in milliseconds, empty when the sensor sent none.
    pub fn rr_intervals(&self) -> &[u16] {
        &self.rr_intervals
    }

    /// Time between two beats at the current rate, used to pace the pulse
    /// cue. `None` for a reading of 0 bpm.
    pub fn beat_interval(&self) -> Option<Duration> {
        (self.hr_value > 0).then(|| Duration::from_millis(60_000 / self.hr_value as u64))
    }
}

/// Decodes a base64 transported payload straight into beats per minute.
pub fn decode_heart_rate(value: &str) -> Result<u16, CodecError> {
    HeartRateMeasurement::decode_base64(value).map(|m| m.bpm())
}

impl fmt::Display for HeartRateMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bpm", self.hr_value)?;
        if self.sen_contact_supported() && !self.sen_has_contact() {
            write!(f, " (no contact)")?;
        }
        if let Some(energy) = self.energy_expended {
            write!(f, ", {} kJ", energy)?;
        }
        if !self.rr_intervals.is_empty() {
            let rr = self
                .rr_intervals
                .iter()
                .map(|rr| format!("{} ms", rr))
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, ", RR [{}]", rr)?;
        }
        Ok(())
    }
}
