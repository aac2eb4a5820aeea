// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use matter_node_rs::pairing::{OnboardingPayload, verhoeff_validate};

#[test]
fn reference_onboarding_vectors() {
    let payload = OnboardingPayload::new(0xFFF1, 0x8000, 3840, 20202021, 0, 2);
    assert_eq!(payload.qr_code(), "MT:Y.K9042C00KA0648G00");
    assert_eq!(payload.manual_code(), "34970112332");
}

#[test]
fn qr_payload_is_always_19_chars_after_prefix() {
    for (vid, pid, disc, pass) in [
        (0u16, 0u16, 0u16, 1u32),
        (0xFFFF, 0xFFFF, 0x0FFF, (1 << 27) - 1),
        (0x1234, 0x5678, 2048, 86442723),
    ] {
        let qr = OnboardingPayload::new(vid, pid, disc, pass, 0, 2).qr_code();
        assert!(qr.starts_with("MT:"), "{qr}");
        assert_eq!(qr.len(), 3 + 19, "{qr}");
    }
}

#[test]
fn manual_codes_always_carry_a_valid_check_digit() {
    for pass in [1u32, 97024679, 20202021, (1 << 27) - 1] {
        for disc in [0u16, 1234, 4095] {
            let code = OnboardingPayload::new(0, 0, disc, pass, 0, 0).manual_code();
            assert_eq!(code.len(), 11);
            assert!(verhoeff_validate(&code), "{code}");
        }
    }
}
