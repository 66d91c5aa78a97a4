// Copyright (c) 2024 The Actors Project Contributors
//
// Licensed under the Business Source License 1.1 (BSL 1.1).
// See the LICENSE file for details.

pub mod error;
pub mod metrics;
pub mod progress;
pub mod quid;
pub mod runtimes;
pub mod terminate_sig;
pub mod type_map;

pub use error::*;
pub use progress::{Progress, ProtectedZoneGuard};
pub use quid::*;
pub use runtimes::*;
pub use terminate_sig::TerimateSignal;
pub use type_map::*;
