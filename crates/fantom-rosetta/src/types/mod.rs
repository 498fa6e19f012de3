// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

mod identifiers;
mod misc;
mod objects;
mod requests;

pub use identifiers::*;
pub use misc::*;
pub use objects::*;
pub use requests::*;
