// SPDX-License-Identifier: Apache-2.0

pub mod fs;
pub mod retry;
