// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test harness for request flood simulation.
//!
//! This module provides utilities for replaying flood patterns against the
//! rate guard with synthetic timestamps, so results do not depend on
//! wall-clock timing.

pub mod attacks;
pub mod generators;
pub mod metrics;
