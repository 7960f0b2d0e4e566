// SPDX-License-Identifier: MIT

pub mod kinetic;
pub mod ndk;
