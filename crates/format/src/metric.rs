//! Metric descriptors carried out-of-band from the 8-byte metric words.
//!
//! A metric word is just 64 bits. Whether it holds an integer count or an
//! IEEE-754 double is decided by the metric's [`ValueFormat`], never by
//! inspecting the bits.
//!
//! [`MetricFlags`] packs into one `u64`, one field per byte:
//!
//! ```text
//! byte 0: kind   byte 1: value_type   byte 2: value_format   byte 3: unused
//! bytes 4-5: partner (u16 LE)   byte 6: show   byte 7: show_percent
//! ```

use core::fmt;

/// How a metric was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum MetricKind {
    /// Unspecified
    #[default]
    Null = 0,
    /// Sampled directly
    Raw = 1,
    /// Post-processed final value
    Final = 2,
    /// Computed from other metrics
    Derived = 3,
}

/// Inclusive or exclusive attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ValueType {
    /// Unspecified
    #[default]
    Null = 0,
    /// Includes callees
    Inclusive = 1,
    /// Excludes callees
    Exclusive = 2,
}

/// Interpretation of a metric word's bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ValueFormat {
    /// Unspecified; read as an integer
    #[default]
    Null = 0,
    /// Unsigned integer
    Int = 1,
    /// IEEE-754 double
    Real = 2,
}

macro_rules! from_code {
    ($ty:ident { $($code:literal => $variant:ident),* $(,)? }) => {
        impl $ty {
            /// Decode a flag byte; unknown codes map to `Null`.
            pub fn from_code(code: u8) -> Self {
                match code {
                    $($code => $ty::$variant,)*
                    _ => $ty::Null,
                }
            }
        }
    };
}

from_code!(MetricKind { 1 => Raw, 2 => Final, 3 => Derived });
from_code!(ValueType { 1 => Inclusive, 2 => Exclusive });
from_code!(ValueFormat { 1 => Int, 2 => Real });

/// Decoded metric word.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    /// Integer count
    Int(u64),
    /// Floating-point value
    Real(f64),
}

impl ValueFormat {
    /// Interpret a raw metric word.
    pub fn decode(self, word: u64) -> MetricValue {
        match self {
            ValueFormat::Real => MetricValue::Real(f64::from_bits(word)),
            ValueFormat::Int | ValueFormat::Null => MetricValue::Int(word),
        }
    }
}

impl MetricValue {
    /// Raw word as stored on disk.
    pub fn to_bits(self) -> u64 {
        match self {
            MetricValue::Int(v) => v,
            MetricValue::Real(v) => v.to_bits(),
        }
    }

    /// Whether the value is zero.
    pub fn is_zero(self) -> bool {
        match self {
            MetricValue::Int(v) => v == 0,
            MetricValue::Real(v) => v == 0.0,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Int(v) => write!(f, "{v}"),
            MetricValue::Real(v) => write!(f, "{v}"),
        }
    }
}

/// Flags describing one metric column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricFlags {
    /// Provenance
    pub kind: MetricKind,
    /// Attribution
    pub value_type: ValueType,
    /// Word interpretation
    pub value_format: ValueFormat,
    /// Index of the paired inclusive/exclusive metric
    pub partner: u16,
    /// Whether viewers show the metric
    pub show: bool,
    /// Whether viewers show a percentage column
    pub show_percent: bool,
}

impl Default for MetricFlags {
    fn default() -> Self {
        MetricFlags {
            kind: MetricKind::Null,
            value_type: ValueType::Null,
            value_format: ValueFormat::Null,
            partner: 0,
            show: true,
            show_percent: true,
        }
    }
}

impl MetricFlags {
    /// Raw sampled integer metric.
    pub fn raw_int() -> Self {
        MetricFlags {
            kind: MetricKind::Raw,
            value_format: ValueFormat::Int,
            ..Default::default()
        }
    }

    /// Raw sampled real metric.
    pub fn raw_real() -> Self {
        MetricFlags {
            kind: MetricKind::Raw,
            value_format: ValueFormat::Real,
            ..Default::default()
        }
    }

    /// Set the attribution.
    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    /// Pack into the on-disk word.
    pub fn to_bits(self) -> u64 {
        let partner = self.partner.to_le_bytes();
        u64::from_le_bytes([
            self.kind as u8,
            self.value_type as u8,
            self.value_format as u8,
            0,
            partner[0],
            partner[1],
            u8::from(self.show),
            u8::from(self.show_percent),
        ])
    }

    /// Unpack the on-disk word.
    pub fn from_bits(bits: u64) -> Self {
        let b = bits.to_le_bytes();
        MetricFlags {
            kind: MetricKind::from_code(b[0]),
            value_type: ValueType::from_code(b[1]),
            value_format: ValueFormat::from_code(b[2]),
            partner: u16::from_le_bytes([b[4], b[5]]),
            show: b[6] != 0,
            show_percent: b[7] != 0,
        }
    }
}
