//! Source and output bit depth resolution
//!
//! Packetized lossless codecs do not fill in bits per channel; their source
//! depth lives in the lossless format flags instead.

use crate::audio::types::{SourceDescriptor, StreamFormat};

/// Lossless format flag: 16-bit source data
pub const LOSSLESS_FLAG_16BIT_SOURCE: u32 = 1;
/// Lossless format flag: 20-bit source data
pub const LOSSLESS_FLAG_20BIT_SOURCE: u32 = 2;
/// Lossless format flag: 24-bit source data
pub const LOSSLESS_FLAG_24BIT_SOURCE: u32 = 3;
/// Lossless format flag: 32-bit source data
pub const LOSSLESS_FLAG_32BIT_SOURCE: u32 = 4;

/// Bit depth encoded by a lossless format flag value (0 when unrecognized)
pub fn bits_for_lossless_flags(flags: u32) -> u32 {
    match flags {
        LOSSLESS_FLAG_16BIT_SOURCE => 16,
        LOSSLESS_FLAG_20BIT_SOURCE => 20,
        LOSSLESS_FLAG_24BIT_SOURCE => 24,
        LOSSLESS_FLAG_32BIT_SOURCE => 32,
        _ => 0,
    }
}

/// Lossless format flag value for a bit depth (0 when not representable)
pub fn lossless_flags_for_bits(bits: u32) -> u32 {
    match bits {
        16 => LOSSLESS_FLAG_16BIT_SOURCE,
        20 => LOSSLESS_FLAG_20BIT_SOURCE,
        24 => LOSSLESS_FLAG_24BIT_SOURCE,
        32 => LOSSLESS_FLAG_32BIT_SOURCE,
        _ => 0,
    }
}

/// Source bit depth of a stream format (0 = unknown)
pub fn resolve_format_bit_depth(format: &StreamFormat) -> u32 {
    if format.bits_per_channel > 0 {
        return format.bits_per_channel;
    }
    if format.codec.is_lossless_flagged() {
        return bits_for_lossless_flags(format.format_flags);
    }
    0
}

/// Source bit depth of an opened source (0 = unknown)
pub fn resolve_source_bit_depth(descriptor: &SourceDescriptor) -> u32 {
    resolve_format_bit_depth(&descriptor.format)
}

/// Output bit depth after applying a requested cap.
///
/// A request of 0 or below means no cap.
pub fn resolve_effective_bit_depth(source_bit_depth: u32, requested: i32) -> u32 {
    if requested > 0 {
        (requested as u32).min(source_bit_depth)
    } else {
        source_bit_depth
    }
}
