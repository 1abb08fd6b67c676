//! Track number parsing and binary encoding
//!
//! The encoded form is the 8-byte payload of an MPEG-4 `trkn` atom:
//! bytes 0-3 track (big-endian u32), bytes 4-5 total (big-endian u16),
//! bytes 6-7 zero.

use crate::error::{Error, Result};

/// Length of an encoded track number
pub const ENCODED_LEN: usize = 8;

/// Track position within its album
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackNumberPair {
    pub track: u32,
    /// Track count (0 when unknown)
    pub total: u32,
}

impl TrackNumberPair {
    /// Parse `"N"` or `"N/M"`
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || Error::MetadataParse {
            key: "track number".to_string(),
            value: value.to_string(),
        };

        let parts: Vec<&str> = value.split('/').collect();
        match parts.as_slice() {
            [track] => Ok(Self {
                track: track.parse().map_err(|_| invalid())?,
                total: 0,
            }),
            [track, total] => Ok(Self {
                track: track.parse().map_err(|_| invalid())?,
                total: total.parse().map_err(|_| invalid())?,
            }),
            _ => Err(invalid()),
        }
    }

    /// Serialize into the `trkn` layout; the total keeps only its low 16 bits
    pub fn encode(&self) -> [u8; ENCODED_LEN] {
        let mut buffer = [0u8; ENCODED_LEN];
        buffer[0..4].copy_from_slice(&self.track.to_be_bytes());
        buffer[4..6].copy_from_slice(&(self.total as u16).to_be_bytes());
        buffer
    }

    /// Read back an encoded pair
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() != ENCODED_LEN {
            return None;
        }
        let track = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let total = u16::from_be_bytes([data[4], data[5]]) as u32;
        Some(Self { track, total })
    }
}
