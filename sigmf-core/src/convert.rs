//! Sample conversion for playback into a different output format.
//!
//! Rules:
//! - float -> signed int rounds and saturates at the symmetric type max
//! - signed int -> float scales by 1 / type max
//! - signed int -> signed int is a plain width cast
//! - float -> float is a precision cast
//!
//! Unsigned types and real/complex changes are not converted.

use crate::error::MetaError;
use crate::format::{ElementType, Endianness, FormatDescriptor};

/// Reverse the byte order of every element in `buf`
pub fn swap_element_bytes(buf: &mut [u8], element_size: usize) {
    if element_size <= 1 {
        return;
    }
    for chunk in buf.chunks_exact_mut(element_size) {
        chunk.reverse();
    }
}

/// Largest positive value of a signed integer of `bits` width
fn signed_max(bits: u32) -> i64 {
    ((1u64 << (bits - 1)) - 1) as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Identity,
    FloatToFloat,
    IntToFloat,
    FloatToInt,
    IntToInt,
}

/// Converts native-order samples from one format to another
#[derive(Debug, Clone)]
pub struct SampleConverter {
    from: FormatDescriptor,
    to: FormatDescriptor,
    kind: Kind,
}

impl SampleConverter {
    /// Both formats are taken in host byte order
    pub fn new(from: FormatDescriptor, to: FormatDescriptor) -> Result<Self, MetaError> {
        let from = from.with_native_order();
        let to = to.with_native_order();
        let unsupported = || MetaError::UnsupportedConversion {
            from: from.to_string(),
            to: to.to_string(),
        };

        if from == to {
            return Ok(Self { from, to, kind: Kind::Identity });
        }
        if from.domain != to.domain {
            return Err(unsupported());
        }
        let kind = match (from.element_type, to.element_type) {
            (ElementType::Float, ElementType::Float) => Kind::FloatToFloat,
            (ElementType::SignedInt, ElementType::Float) => Kind::IntToFloat,
            (ElementType::Float, ElementType::SignedInt) => Kind::FloatToInt,
            (ElementType::SignedInt, ElementType::SignedInt) => Kind::IntToInt,
            _ => return Err(unsupported()),
        };
        Ok(Self { from, to, kind })
    }

    pub fn is_identity(&self) -> bool {
        self.kind == Kind::Identity
    }

    pub fn output_format(&self) -> FormatDescriptor {
        self.to
    }

    /// Convert whole samples from `input`, appending to `output`
    pub fn convert(&self, input: &[u8], output: &mut Vec<u8>) {
        if self.kind == Kind::Identity {
            output.extend_from_slice(input);
            return;
        }
        let in_size = self.from.element_size_bytes();
        let out_bits = self.to.bit_width;
        output.reserve(input.len() / in_size * self.to.element_size_bytes());

        for element in input.chunks_exact(in_size) {
            match self.kind {
                Kind::FloatToFloat => write_float(output, read_float(element), out_bits),
                Kind::IntToFloat => {
                    let max = signed_max(self.from.bit_width) as f64;
                    write_float(output, read_int(element) as f64 / max, out_bits);
                }
                Kind::FloatToInt => {
                    let max = signed_max(out_bits);
                    let v = read_float(element).round();
                    let clamped = if v.is_nan() {
                        0
                    } else {
                        v.clamp(-(max as f64), max as f64) as i64
                    };
                    write_int(output, clamped, out_bits);
                }
                Kind::IntToInt => write_int(output, read_int(element), out_bits),
                Kind::Identity => {}
            }
        }
    }
}

fn read_float(b: &[u8]) -> f64 {
    match b.len() {
        4 => f32::from_ne_bytes([b[0], b[1], b[2], b[3]]) as f64,
        _ => f64::from_ne_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]),
    }
}

fn read_int(b: &[u8]) -> i64 {
    match b.len() {
        1 => b[0] as i8 as i64,
        2 => i16::from_ne_bytes([b[0], b[1]]) as i64,
        4 => i32::from_ne_bytes([b[0], b[1], b[2], b[3]]) as i64,
        _ => i64::from_ne_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]),
    }
}

fn write_float(out: &mut Vec<u8>, v: f64, bits: u32) {
    match bits {
        32 => out.extend_from_slice(&(v as f32).to_ne_bytes()),
        _ => out.extend_from_slice(&v.to_ne_bytes()),
    }
}

fn write_int(out: &mut Vec<u8>, v: i64, bits: u32) {
    match bits {
        8 => out.push(v as i8 as u8),
        16 => out.extend_from_slice(&(v as i16).to_ne_bytes()),
        32 => out.extend_from_slice(&(v as i32).to_ne_bytes()),
        _ => out.extend_from_slice(&v.to_ne_bytes()),
    }
}

/// Whether data stored as `format` must be byte swapped on this host
pub fn needs_swap(format: &FormatDescriptor) -> bool {
    format.bit_width > 8 && format.endianness != Endianness::native()
}
