// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use matter_node_rs::tlv::{TlvError, TlvValue, decode, encode};

fn sample_tree() -> TlvValue {
    TlvValue::Struct(vec![
        (0, TlvValue::UnsignedInt(0)),
        (1, TlvValue::UnsignedInt(0xFFFF_FFFF_FFFF_FFFF)),
        (2, TlvValue::SignedInt(-1)),
        (3, TlvValue::SignedInt(i64::MIN)),
        (4, TlvValue::Bool(true)),
        (5, TlvValue::Bool(false)),
        (6, TlvValue::Float(1.5)),
        (7, TlvValue::Double(-2.25)),
        (8, TlvValue::Utf8("on/off light".to_string())),
        (9, TlvValue::Bytes(vec![0xDE, 0xAD, 0xBE, 0xEF])),
        (10, TlvValue::Null),
        (
            11,
            TlvValue::Array(vec![
                TlvValue::UnsignedInt(6),
                TlvValue::UnsignedInt(0x1D),
                TlvValue::Struct(vec![(0, TlvValue::Bool(false))]),
            ]),
        ),
        (
            12,
            TlvValue::List(vec![
                (Some(2), TlvValue::UnsignedInt(1)),
                (None, TlvValue::Utf8("anon".to_string())),
            ]),
        ),
    ])
}

#[test]
fn roundtrip_composite_value() -> Result<()> {
    let v = sample_tree();
    let encoded = encode(&v);
    assert_eq!(decode(&encoded)?, v);
    Ok(())
}

#[test]
fn roundtrip_integer_boundaries() -> Result<()> {
    for n in [
        0u64,
        0xFF,
        0x100,
        0xFFFF,
        0x1_0000,
        0xFFFF_FFFF,
        0x1_0000_0000,
        u64::MAX,
    ] {
        let v = TlvValue::UnsignedInt(n);
        assert_eq!(decode(&encode(&v))?, v, "u64 {n}");
    }
    for n in [0i64, -1, 127, -128, 128, -129, 32767, -32768, i64::MAX, i64::MIN] {
        let v = TlvValue::SignedInt(n);
        assert_eq!(decode(&encode(&v))?, v, "i64 {n}");
    }
    Ok(())
}

#[test]
fn long_strings_use_wider_length_fields() -> Result<()> {
    let long = "x".repeat(300);
    let v = TlvValue::Utf8(long.clone());
    let encoded = encode(&v);
    // 2-byte length variant
    assert_eq!(encoded[0] & 0x1F, 0x0D);
    assert_eq!(decode(&encoded)?, v);

    let blob = TlvValue::Bytes(vec![7u8; 70_000]);
    let encoded = encode(&blob);
    // 4-byte length variant
    assert_eq!(encoded[0] & 0x1F, 0x12);
    assert_eq!(decode(&encoded)?, blob);
    Ok(())
}

#[test]
fn truncated_inputs_fail_cleanly() {
    let encoded = encode(&sample_tree());
    for cut in 1..encoded.len() {
        let err = decode(&encoded[..cut]).expect_err("truncation must fail");
        assert!(
            matches!(
                err,
                TlvError::TruncatedInput
                    | TlvError::UnterminatedContainer
                    | TlvError::InvalidTag(_)
            ),
            "unexpected error {err:?} at cut {cut}"
        );
    }
}

#[test]
fn nested_structs_roundtrip_and_path_access() -> Result<()> {
    let v = TlvValue::Struct(vec![(
        1,
        TlvValue::Struct(vec![(
            4,
            TlvValue::Struct(vec![(2, TlvValue::Bytes(vec![1, 2, 3]))]),
        )]),
    )]);
    let back = decode(&encode(&v))?;
    assert_eq!(
        back.get(&[1, 4, 2]).and_then(TlvValue::as_bytes),
        Some(&[1u8, 2, 3][..])
    );
    Ok(())
}

#[test]
fn excessive_nesting_is_rejected() {
    // 32 nested anonymous structs, no terminators needed to trip the cap
    let mut raw = vec![0x15u8; 32];
    raw.push(0x00);
    assert!(decode(&raw).is_err());
}
