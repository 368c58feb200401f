//! Sample format descriptor.
//!
//! Parses the SigMF datatype string, e.g. `cf32_le`, `ri16`, `cu8`:
//!
//! ```text
//!   c      f       32      _le
//!   │      │       │       │
//!   │      │       │       └── byte order (optional, not allowed for 8 bit)
//!   │      │       └────────── element width in bits: 8, 16, 32, 64
//!   │      └────────────────── element type: f(loat), i(nt), u(nsigned)
//!   └───────────────────────── domain: r(eal) or c(omplex)
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::MetaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Real,
    Complex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Float,
    SignedInt,
    UnsignedInt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    /// Byte order of the machine we are running on
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Endianness::Little => "_le",
            Endianness::Big => "_be",
        }
    }
}

/// Canonical description of one stored sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatDescriptor {
    pub domain: Domain,
    pub element_type: ElementType,
    pub bit_width: u32,
    pub endianness: Endianness,
}

impl FormatDescriptor {
    /// Parse a datatype string such as `cf32_le`
    pub fn parse(type_string: &str) -> Result<Self, MetaError> {
        let invalid = || MetaError::InvalidFormat(type_string.to_string());

        let s = type_string.trim();
        let (body, order) = if let Some(rest) = s.strip_suffix("_le") {
            (rest, Some(Endianness::Little))
        } else if let Some(rest) = s.strip_suffix("_be") {
            (rest, Some(Endianness::Big))
        } else {
            (s, None)
        };

        let mut chars = body.chars();
        let domain = match chars.next() {
            Some('r') => Domain::Real,
            Some('c') => Domain::Complex,
            _ => return Err(invalid()),
        };
        let element_type = match chars.next() {
            Some('f') => ElementType::Float,
            Some('i') => ElementType::SignedInt,
            Some('u') => ElementType::UnsignedInt,
            _ => return Err(invalid()),
        };
        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let bit_width: u32 = digits.parse().map_err(|_| invalid())?;

        let width_ok = match element_type {
            ElementType::Float => matches!(bit_width, 32 | 64),
            _ => matches!(bit_width, 8 | 16 | 32 | 64),
        };
        if !width_ok {
            return Err(invalid());
        }

        if bit_width == 8 && order.is_some() {
            return Err(MetaError::UnsupportedEndianness(format!(
                "{}: 8 bit types take no byte order suffix",
                type_string
            )));
        }

        Ok(FormatDescriptor {
            domain,
            element_type,
            bit_width,
            endianness: order.unwrap_or(Endianness::native()),
        })
    }

    /// Fails unless the samples can be written in host byte order.
    ///
    /// A recording sink writes raw memory, so a suffix naming the opposite
    /// order is rejected before any file is created.
    pub fn require_native(&self) -> Result<(), MetaError> {
        if self.is_native() {
            Ok(())
        } else {
            Err(MetaError::UnsupportedEndianness(format!(
                "{} does not match host byte order",
                self
            )))
        }
    }

    pub fn is_native(&self) -> bool {
        self.bit_width == 8 || self.endianness == Endianness::native()
    }

    pub fn is_complex(&self) -> bool {
        self.domain == Domain::Complex
    }

    /// Bytes in one scalar element (one component of a complex sample)
    pub fn element_size_bytes(&self) -> usize {
        (self.bit_width / 8) as usize
    }

    /// Bytes in one sample
    pub fn sample_size_bytes(&self) -> usize {
        let components = if self.is_complex() { 2 } else { 1 };
        self.element_size_bytes() * components
    }

    /// Same format with the byte order set to the host's
    pub fn with_native_order(mut self) -> Self {
        self.endianness = Endianness::native();
        self
    }
}

impl FromStr for FormatDescriptor {
    type Err = MetaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FormatDescriptor::parse(s)
    }
}

impl fmt::Display for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let domain = match self.domain {
            Domain::Real => 'r',
            Domain::Complex => 'c',
        };
        let element = match self.element_type {
            ElementType::Float => 'f',
            ElementType::SignedInt => 'i',
            ElementType::UnsignedInt => 'u',
        };
        write!(f, "{}{}{}", domain, element, self.bit_width)?;
        if self.bit_width > 8 {
            f.write_str(self.endianness.suffix())?;
        }
        Ok(())
    }
}
