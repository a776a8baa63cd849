// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use std::fmt;

use crate::{Cycle, VcState};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    // Configuration errors, reported when a router is built.
    LookaheadRoutingRequired { routing_delay: Cycle },
    InvalidDimension(&'static str),
    InvalidSpeedup { input_speedup: usize, vcs: usize },
    InvalidConfiguration(String),

    // Misuse of the router's ports by the surrounding simulator.
    InvalidPort(usize),
    InvalidVc(usize),
    BufferOverflow { input: usize, vc: usize },
    DownstreamOverflow { output: usize, vc: usize },
    CreditUnderflow { output: usize, vc: usize },
    NoRoute { input: usize, vc: usize },

    // Broken allocation invariants. None of these can be recovered from.
    FastPathConflict { input: usize, vc: usize, fast_vc: usize },
    NoAdmissibleVc { input: usize, vc: usize, output: usize },
    SwitchHoldMismatch { expanded_input: usize, expanded_output: usize },
    InvalidGrant { input: usize, vc: usize, state: VcState },

    /// The router hit an invariant violation in an earlier cycle.
    Faulted,
}

impl Error {
    /// True for errors that indicate a modeling bug inside the allocation
    /// cycle rather than a bad configuration or bad input.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::FastPathConflict { .. }
                | Self::NoAdmissibleVc { .. }
                | Self::SwitchHoldMismatch { .. }
                | Self::InvalidGrant { .. }
                | Self::CreditUnderflow { .. }
                | Self::DownstreamOverflow { .. }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::LookaheadRoutingRequired { routing_delay } => write!(
                f,
                "ERROR: This router architecture requires lookahead routing (routing delay {})",
                routing_delay
            ),
            Self::InvalidDimension(name) => {
                write!(f, "ERROR: Router dimension {} must be non-zero", name)
            }
            Self::InvalidSpeedup { input_speedup, vcs } => write!(
                f,
                "ERROR: Input speedup {} exceeds the number of VCs {}",
                input_speedup, vcs
            ),
            Self::InvalidConfiguration(reason) => {
                write!(f, "ERROR: Invalid router configuration: {}", reason)
            }
            Self::BufferOverflow { input, vc } => {
                write!(f, "ERROR: Input buffer overflow at input {} VC {}", input, vc)
            }
            Self::DownstreamOverflow { output, vc } => write!(
                f,
                "ERROR: Sending flit to full downstream VC {} at output {}",
                vc, output
            ),
            Self::CreditUnderflow { output, vc } => write!(
                f,
                "ERROR: Credit received for empty downstream VC {} at output {}",
                vc, output
            ),
            Self::NoRoute { input, vc } => write!(
                f,
                "ERROR: Routing produced no candidates for VC {} at input {}",
                vc, input
            ),
            Self::FastPathConflict { input, vc, fast_vc } => write!(
                f,
                "ERROR: VC {} at input {} selected for the fast path while VC {} already holds it",
                vc, input, fast_vc
            ),
            Self::NoAdmissibleVc { input, vc, output } => write!(
                f,
                "ERROR: None of the VCs at output {} were suitable and available for VC {} at input {}",
                output, vc, input
            ),
            Self::SwitchHoldMismatch {
                expanded_input,
                expanded_output,
            } => write!(
                f,
                "ERROR: Switch hold between expanded input {} and expanded output {} is not exclusive",
                expanded_input, expanded_output
            ),
            Self::InvalidGrant { input, vc, state } => write!(
                f,
                "ERROR: Grant for VC {} at input {} in state {}",
                vc, input, state
            ),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl std::error::Error for Error {}
