// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::tlv::{
    ELEM_ARRAY, ELEM_BYTES_L1, ELEM_BYTES_L8, ELEM_END, ELEM_FALSE, ELEM_FLOAT32,
    ELEM_FLOAT64, ELEM_INT8, ELEM_INT16, ELEM_INT32, ELEM_INT64, ELEM_LIST,
    ELEM_MASK, ELEM_NULL, ELEM_STRUCT, ELEM_TRUE, ELEM_UINT8, ELEM_UINT16,
    ELEM_UINT32, ELEM_UINT64, ELEM_UTF8_L1, ELEM_UTF8_L8, MAX_DEPTH, TAG_ANONYMOUS,
    TAG_CONTEXT, TAG_MASK,
    value::{TlvError, TlvValue},
};

/// Decode a single top-level element. Trailing bytes are rejected.
pub fn decode(input: &[u8]) -> Result<TlvValue, TlvError> {
    let mut r = TlvReader::new(input);
    let (_, v) = r.element(0)?;
    if !r.is_empty() {
        return Err(TlvError::UnterminatedContainer);
    }
    Ok(v)
}

/// Cursor-style reader over a TLV byte slice.
#[derive(Debug)]
pub struct TlvReader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> TlvReader<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn u8(&mut self) -> Result<u8, TlvError> {
        let b = *self.input.get(self.pos).ok_or(TlvError::TruncatedInput)?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], TlvError> {
        let end = self.pos.checked_add(n).ok_or(TlvError::TruncatedInput)?;
        let s = self
            .input
            .get(self.pos..end)
            .ok_or(TlvError::TruncatedInput)?;
        self.pos = end;
        Ok(s)
    }

    fn le_uint(&mut self, width: usize) -> Result<u64, TlvError> {
        let raw = self.take(width)?;
        let mut v = 0u64;
        for (i, b) in raw.iter().enumerate() {
            v |= (*b as u64) << (8 * i);
        }
        Ok(v)
    }

    fn le_int(&mut self, width: usize) -> Result<i64, TlvError> {
        let v = self.le_uint(width)?;
        let shift = 64 - 8 * width as u32;
        Ok(((v << shift) as i64) >> shift)
    }

    /// Read one element including its tag. Returns `(tag, value)`.
    pub fn element(&mut self, depth: usize) -> Result<(Option<u8>, TlvValue), TlvError> {
        if depth > MAX_DEPTH {
            return Err(TlvError::InvalidTag(ELEM_STRUCT));
        }
        let control = self.u8()?;
        let tag = match control & TAG_MASK {
            TAG_ANONYMOUS => None,
            TAG_CONTEXT => Some(self.u8()?),
            _ => return Err(TlvError::InvalidTag(control)),
        };
        let elem = control & ELEM_MASK;
        let value = match elem {
            ELEM_INT8 => TlvValue::SignedInt(self.le_int(1)?),
            ELEM_INT16 => TlvValue::SignedInt(self.le_int(2)?),
            ELEM_INT32 => TlvValue::SignedInt(self.le_int(4)?),
            ELEM_INT64 => TlvValue::SignedInt(self.le_int(8)?),
            ELEM_UINT8 => TlvValue::UnsignedInt(self.le_uint(1)?),
            ELEM_UINT16 => TlvValue::UnsignedInt(self.le_uint(2)?),
            ELEM_UINT32 => TlvValue::UnsignedInt(self.le_uint(4)?),
            ELEM_UINT64 => TlvValue::UnsignedInt(self.le_uint(8)?),
            ELEM_FALSE => TlvValue::Bool(false),
            ELEM_TRUE => TlvValue::Bool(true),
            ELEM_FLOAT32 => {
                let raw = self.take(4)?;
                let mut b = [0u8; 4];
                b.copy_from_slice(raw);
                TlvValue::Float(f32::from_le_bytes(b))
            },
            ELEM_FLOAT64 => {
                let raw = self.take(8)?;
                let mut b = [0u8; 8];
                b.copy_from_slice(raw);
                TlvValue::Double(f64::from_le_bytes(b))
            },
            e if (ELEM_UTF8_L1..=ELEM_UTF8_L8).contains(&e) => {
                let width = 1usize << (e - ELEM_UTF8_L1);
                let len = self.le_uint(width)?;
                let len = usize::try_from(len).map_err(|_| TlvError::TruncatedInput)?;
                let raw = self.take(len)?;
                let s = std::str::from_utf8(raw)
                    .map_err(|_| TlvError::InvalidTag(control))?;
                TlvValue::Utf8(s.to_string())
            },
            e if (ELEM_BYTES_L1..=ELEM_BYTES_L8).contains(&e) => {
                let width = 1usize << (e - ELEM_BYTES_L1);
                let len = self.le_uint(width)?;
                let len = usize::try_from(len).map_err(|_| TlvError::TruncatedInput)?;
                TlvValue::Bytes(self.take(len)?.to_vec())
            },
            ELEM_NULL => TlvValue::Null,
            ELEM_STRUCT => {
                let mut fields = Vec::new();
                while !self.consume_end()? {
                    let (t, v) = self.element(depth + 1)?;
                    // struct members must carry a context tag
                    let t = t.ok_or(TlvError::InvalidTag(control))?;
                    fields.push((t, v));
                }
                TlvValue::Struct(fields)
            },
            ELEM_ARRAY => {
                let mut items = Vec::new();
                while !self.consume_end()? {
                    let (t, v) = self.element(depth + 1)?;
                    if t.is_some() {
                        return Err(TlvError::InvalidTag(control));
                    }
                    items.push(v);
                }
                TlvValue::Array(items)
            },
            ELEM_LIST => {
                let mut items = Vec::new();
                while !self.consume_end()? {
                    items.push(self.element(depth + 1)?);
                }
                TlvValue::List(items)
            },
            _ => return Err(TlvError::InvalidTag(control)),
        };
        Ok((tag, value))
    }

    /// Consume the end-of-container octet if it is next.
    fn consume_end(&mut self) -> Result<bool, TlvError> {
        match self.input.get(self.pos) {
            Some(&ELEM_END) => {
                self.pos += 1;
                Ok(true)
            },
            Some(_) => Ok(false),
            // ran off the end while inside a container
            None => Err(TlvError::UnterminatedContainer),
        }
    }
}
