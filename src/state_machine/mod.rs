// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Session-establishment state machines (device/responder role).

pub mod case;
pub mod common;
pub mod pase;

pub use case::CaseResponder;
pub use common::HandshakeOutput;
pub use pase::PaseResponder;
