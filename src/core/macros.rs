//! Core Macros
//!
//! Small helpers for picking apart the Heart Rate Measurement bit layout.

/// Checks if a specific bit is set in a byte.
#[macro_export]
macro_rules! is_bit_set {
    ($byte:expr, $pos:expr) => {
        ($byte & (1 << $pos)) != 0
    };
}

/// Reads a little-endian `u16` starting at `$lsb` in a byte slice.
///
/// The caller guarantees that `$lsb + 1` is in bounds.
#[macro_export]
macro_rules! get_u16_little_endian {
    ($slice:expr, $lsb:expr) => {
        (($slice[1 + $lsb] as u16) << 8) | $slice[$lsb] as u16
    };
}
