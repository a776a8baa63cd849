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


use crate::{Cycle, Flit, SwitchRequest, VcState};

/// How a switch request was built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestPath {
    Slow,
    Fast,
}

/// How a grant was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrantPath {
    Slow,
    Fast,
    /// Carried over from a switch hold without arbitration.
    Held,
}

/// Why a VC did not request a crossbar slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenyReason {
    /// Wrong state, or still inside the allocation delay.
    NotReady { state: VcState, state_time: Cycle },
    /// The downstream VC is reserved by another packet.
    DownstreamBusy { output: usize, vc: usize },
    DownstreamFull { output: usize, vc: usize },
    SwitchHeld {
        expanded_input: usize,
        expanded_output: usize,
    },
    /// A fast-path request found the slot already requested.
    SlotInUse {
        expanded_input: usize,
        expanded_output: usize,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Grant {
    pub input: usize,
    pub vc: usize,
    pub expanded_input: usize,
    pub expanded_output: usize,
    pub output: usize,
    pub output_vc: usize,
    pub flit_id: u64,
    pub tail: bool,
    pub path: GrantPath,
}

/// Hooks into the allocation cycle. Every method defaults to doing nothing.
pub trait AllocationObserver {
    fn request_submitted(
        &mut self,
        _cycle: Cycle,
        _request: &SwitchRequest,
        _path: RequestPath,
        _flit: &Flit,
    ) {
    }

    fn request_denied(
        &mut self,
        _cycle: Cycle,
        _input: usize,
        _vc: usize,
        _flit: &Flit,
        _reason: &DenyReason,
    ) {
    }

    fn grant_committed(&mut self, _cycle: Cycle, _grant: &Grant, _flit: &Flit) {}

    fn fast_path_changed(&mut self, _cycle: Cycle, _input: usize, _vc: usize, _enabled: bool) {}

    fn cycle_completed(&mut self, _cycle: Cycle) {}
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NullObserver;

impl AllocationObserver for NullObserver {}

/// Logs the allocation decisions about flits marked `watch`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WatchLogger;

impl AllocationObserver for WatchLogger {
    fn request_submitted(
        &mut self,
        cycle: Cycle,
        request: &SwitchRequest,
        path: RequestPath,
        flit: &Flit,
    ) {
        if flit.watch {
            log::trace!(
                "{} | VC {} at expanded input {} requests expanded output {} ({:?} path, priority {}) for flit {}",
                cycle,
                request.vc,
                request.expanded_input,
                request.expanded_output,
                path,
                request.in_priority,
                flit
            );
        }
    }

    fn request_denied(
        &mut self,
        cycle: Cycle,
        input: usize,
        vc: usize,
        flit: &Flit,
        reason: &DenyReason,
    ) {
        if flit.watch {
            log::trace!(
                "{} | VC {} at input {} not requesting for flit {}: {:?}",
                cycle,
                vc,
                input,
                flit,
                reason
            );
        }
    }

    fn grant_committed(&mut self, cycle: Cycle, grant: &Grant, flit: &Flit) {
        if flit.watch {
            log::trace!(
                "{} | flit {} from VC {} at input {} granted output {} VC {} ({:?})",
                cycle,
                flit,
                grant.vc,
                grant.input,
                grant.output,
                grant.output_vc,
                grant.path
            );
        }
    }
}

impl AllocationObserver for Vec<Box<dyn AllocationObserver>> {
    fn request_submitted(
        &mut self,
        cycle: Cycle,
        request: &SwitchRequest,
        path: RequestPath,
        flit: &Flit,
    ) {
        for observer in self.iter_mut() {
            observer.request_submitted(cycle, request, path, flit);
        }
    }

    fn request_denied(
        &mut self,
        cycle: Cycle,
        input: usize,
        vc: usize,
        flit: &Flit,
        reason: &DenyReason,
    ) {
        for observer in self.iter_mut() {
            observer.request_denied(cycle, input, vc, flit, reason);
        }
    }

    fn grant_committed(&mut self, cycle: Cycle, grant: &Grant, flit: &Flit) {
        for observer in self.iter_mut() {
            observer.grant_committed(cycle, grant, flit);
        }
    }

    fn fast_path_changed(&mut self, cycle: Cycle, input: usize, vc: usize, enabled: bool) {
        for observer in self.iter_mut() {
            observer.fast_path_changed(cycle, input, vc, enabled);
        }
    }

    fn cycle_completed(&mut self, cycle: Cycle) {
        for observer in self.iter_mut() {
            observer.cycle_completed(cycle);
        }
    }
}
