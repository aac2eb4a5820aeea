// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

use thiserror::Error;

/// Decode-side failures. Encoding is infallible once a value exists.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TlvError {
    #[error("truncated TLV input")]
    TruncatedInput,
    #[error("invalid TLV tag or element type 0x{0:02x}")]
    InvalidTag(u8),
    #[error("container not terminated")]
    UnterminatedContainer,
}

/// A decoded TLV element tree.
///
/// Structs map context tags to values and are encoded in ascending tag
/// order; arrays hold anonymous elements; lists may mix tagged and
/// anonymous entries.
#[derive(Debug, Clone, PartialEq)]
pub enum TlvValue {
    UnsignedInt(u64),
    SignedInt(i64),
    Bool(bool),
    Float(f32),
    Double(f64),
    Utf8(String),
    Bytes(Vec<u8>),
    Null,
    Struct(Vec<(u8, TlvValue)>),
    Array(Vec<TlvValue>),
    List(Vec<(Option<u8>, TlvValue)>),
}

impl TlvValue {
    /// Field of a struct by context tag.
    pub fn field(&self, tag: u8) -> Option<&TlvValue> {
        match self {
            TlvValue::Struct(fields) => {
                fields.iter().find(|(t, _)| *t == tag).map(|(_, v)| v)
            },
            _ => None,
        }
    }

    /// Walk nested containers by context-tag path. An array element is
    /// addressed by its index.
    pub fn get(&self, path: &[u8]) -> Option<&TlvValue> {
        let mut cur = self;
        for seg in path {
            cur = match cur {
                TlvValue::Struct(_) => cur.field(*seg)?,
                TlvValue::Array(items) => items.get(*seg as usize)?,
                TlvValue::List(items) => items
                    .iter()
                    .find(|(t, _)| *t == Some(*seg))
                    .map(|(_, v)| v)?,
                _ => return None,
            };
        }
        Some(cur)
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            TlvValue::UnsignedInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TlvValue::SignedInt(v) => Some(*v),
            TlvValue::UnsignedInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TlvValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            TlvValue::Bytes(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TlvValue::Utf8(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&[(u8, TlvValue)]> {
        match self {
            TlvValue::Struct(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[TlvValue]> {
        match self {
            TlvValue::Array(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

impl fmt::Display for TlvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlvValue::UnsignedInt(v) => write!(f, "{v}u"),
            TlvValue::SignedInt(v) => write!(f, "{v}i"),
            TlvValue::Bool(v) => write!(f, "{v}"),
            TlvValue::Float(v) => write!(f, "{v}f32"),
            TlvValue::Double(v) => write!(f, "{v}f64"),
            TlvValue::Utf8(v) => write!(f, "{v:?}"),
            TlvValue::Bytes(v) => write!(f, "0x{}", hex::encode(v)),
            TlvValue::Null => write!(f, "null"),
            TlvValue::Struct(fields) => {
                write!(f, "{{")?;
                for (i, (t, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}: {v}")?;
                }
                write!(f, "}}")
            },
            TlvValue::Array(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            },
            TlvValue::List(items) => {
                write!(f, "[[")?;
                for (i, (t, v)) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match t {
                        Some(t) => write!(f, "{t}: {v}")?,
                        None => write!(f, "{v}")?,
                    }
                }
                write!(f, "]]")
            },
        }
    }
}
