// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::tlv::{
    ELEM_ARRAY, ELEM_BYTES_L1, ELEM_BYTES_L2, ELEM_BYTES_L4, ELEM_END, ELEM_FALSE,
    ELEM_FLOAT32, ELEM_FLOAT64, ELEM_INT8, ELEM_INT16, ELEM_INT32, ELEM_INT64,
    ELEM_LIST, ELEM_NULL, ELEM_STRUCT, ELEM_TRUE, ELEM_UINT8, ELEM_UINT16,
    ELEM_UINT32, ELEM_UINT64, ELEM_UTF8_L1, ELEM_UTF8_L2, ELEM_UTF8_L4,
    TAG_ANONYMOUS, TAG_CONTEXT, value::TlvValue,
};

/// Encode a single value as an anonymous top-level element.
pub fn encode(value: &TlvValue) -> Vec<u8> {
    let mut w = TlvWriter::new();
    w.value(None, value);
    w.into_bytes()
}

/// Incremental TLV writer.
///
/// Always picks the smallest sufficient integer/length width, and emits
/// struct fields in ascending context-tag order regardless of the order
/// they were supplied in.
#[derive(Debug, Default)]
pub struct TlvWriter {
    buf: Vec<u8>,
}

impl TlvWriter {
    pub fn new() -> Self {
        Self { buf: Vec::with_capacity(64) }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn control(&mut self, tag: Option<u8>, elem: u8) {
        match tag {
            None => {
                self.buf.push(TAG_ANONYMOUS | elem);
            },
            Some(t) => {
                self.buf.push(TAG_CONTEXT | elem);
                self.buf.push(t);
            },
        }
    }

    pub fn unsigned(&mut self, tag: Option<u8>, v: u64) {
        if v <= u8::MAX as u64 {
            self.control(tag, ELEM_UINT8);
            self.buf.push(v as u8);
        } else if v <= u16::MAX as u64 {
            self.control(tag, ELEM_UINT16);
            self.buf.extend_from_slice(&(v as u16).to_le_bytes());
        } else if v <= u32::MAX as u64 {
            self.control(tag, ELEM_UINT32);
            self.buf.extend_from_slice(&(v as u32).to_le_bytes());
        } else {
            self.control(tag, ELEM_UINT64);
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
    }

    pub fn signed(&mut self, tag: Option<u8>, v: i64) {
        if (i8::MIN as i64..=i8::MAX as i64).contains(&v) {
            self.control(tag, ELEM_INT8);
            self.buf.push(v as i8 as u8);
        } else if (i16::MIN as i64..=i16::MAX as i64).contains(&v) {
            self.control(tag, ELEM_INT16);
            self.buf.extend_from_slice(&(v as i16).to_le_bytes());
        } else if (i32::MIN as i64..=i32::MAX as i64).contains(&v) {
            self.control(tag, ELEM_INT32);
            self.buf.extend_from_slice(&(v as i32).to_le_bytes());
        } else {
            self.control(tag, ELEM_INT64);
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
    }

    pub fn boolean(&mut self, tag: Option<u8>, v: bool) {
        self.control(tag, if v { ELEM_TRUE } else { ELEM_FALSE });
    }

    pub fn float(&mut self, tag: Option<u8>, v: f32) {
        self.control(tag, ELEM_FLOAT32);
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn double(&mut self, tag: Option<u8>, v: f64) {
        self.control(tag, ELEM_FLOAT64);
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn utf8(&mut self, tag: Option<u8>, v: &str) {
        self.str_like(tag, v.as_bytes(), [ELEM_UTF8_L1, ELEM_UTF8_L2, ELEM_UTF8_L4]);
    }

    pub fn bytes(&mut self, tag: Option<u8>, v: &[u8]) {
        self.str_like(tag, v, [ELEM_BYTES_L1, ELEM_BYTES_L2, ELEM_BYTES_L4]);
    }

    fn str_like(&mut self, tag: Option<u8>, v: &[u8], elems: [u8; 3]) {
        if v.len() <= u8::MAX as usize {
            self.control(tag, elems[0]);
            self.buf.push(v.len() as u8);
        } else if v.len() <= u16::MAX as usize {
            self.control(tag, elems[1]);
            self.buf.extend_from_slice(&(v.len() as u16).to_le_bytes());
        } else {
            self.control(tag, elems[2]);
            self.buf.extend_from_slice(&(v.len() as u32).to_le_bytes());
        }
        self.buf.extend_from_slice(v);
    }

    pub fn null(&mut self, tag: Option<u8>) {
        self.control(tag, ELEM_NULL);
    }

    pub fn start_struct(&mut self, tag: Option<u8>) {
        self.control(tag, ELEM_STRUCT);
    }

    pub fn start_array(&mut self, tag: Option<u8>) {
        self.control(tag, ELEM_ARRAY);
    }

    pub fn start_list(&mut self, tag: Option<u8>) {
        self.control(tag, ELEM_LIST);
    }

    pub fn end_container(&mut self) {
        self.buf.push(ELEM_END);
    }

    pub fn value(&mut self, tag: Option<u8>, v: &TlvValue) {
        match v {
            TlvValue::UnsignedInt(v) => self.unsigned(tag, *v),
            TlvValue::SignedInt(v) => self.signed(tag, *v),
            TlvValue::Bool(v) => self.boolean(tag, *v),
            TlvValue::Float(v) => self.float(tag, *v),
            TlvValue::Double(v) => self.double(tag, *v),
            TlvValue::Utf8(v) => self.utf8(tag, v),
            TlvValue::Bytes(v) => self.bytes(tag, v),
            TlvValue::Null => self.null(tag),
            TlvValue::Struct(fields) => {
                self.start_struct(tag);
                let mut ordered: Vec<&(u8, TlvValue)> = fields.iter().collect();
                ordered.sort_by_key(|(t, _)| *t);
                for (t, v) in ordered {
                    self.value(Some(*t), v);
                }
                self.end_container();
            },
            TlvValue::Array(items) => {
                self.start_array(tag);
                for v in items {
                    self.value(None, v);
                }
                self.end_container();
            },
            TlvValue::List(items) => {
                self.start_list(tag);
                for (t, v) in items {
                    self.value(*t, v);
                }
                self.end_container();
            },
        }
    }
}
