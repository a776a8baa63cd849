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


use std::collections::VecDeque;
use std::fmt;

use crate::{Cycle, Error, Flit, OutputSet};

/// Lifecycle of the packet at the head of a VC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VcState {
    Idle,
    Routing,
    VcAlloc,
    Active,
}

impl fmt::Display for VcState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Routing => "routing",
            Self::VcAlloc => "vc_alloc",
            Self::Active => "active",
        };
        write!(f, "{}", name)
    }
}

#[derive(Clone, Debug)]
struct VirtualChannel {
    queue: VecDeque<Flit>,
    state: VcState,
    /// The cycle at which `state` was entered.
    state_entered: Cycle,
    /// (output port, downstream VC); only set while active.
    output: Option<(usize, usize)>,
    route_set: OutputSet,
    priority: i32,
}

impl VirtualChannel {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            state: VcState::Idle,
            state_entered: 0,
            output: None,
            route_set: OutputSet::new(),
            priority: 0,
        }
    }
}

/// The VC queues of one input port, addressed by VC index.
#[derive(Clone, Debug)]
pub struct InputBuffer {
    input: usize,
    capacity: usize,
    vcs: Vec<VirtualChannel>,
}

impl InputBuffer {
    pub fn new(input: usize, vc_count: usize, capacity: usize) -> Self {
        Self {
            input,
            capacity,
            vcs: (0..vc_count).map(|_| VirtualChannel::new()).collect(),
        }
    }

    pub fn vc_count(&self) -> usize {
        self.vcs.len()
    }

    pub fn add_flit(&mut self, vc: usize, flit: Flit) -> Result<(), Error> {
        let capacity = self.capacity;
        let channel = self.vcs.get_mut(vc).ok_or(Error::InvalidVc(vc))?;
        if channel.queue.len() >= capacity {
            return Err(Error::BufferOverflow {
                input: self.input,
                vc,
            });
        }
        channel.queue.push_back(flit);
        Ok(())
    }

    pub fn remove_flit(&mut self, vc: usize) -> Option<Flit> {
        self.vcs[vc].queue.pop_front()
    }

    pub fn front(&self, vc: usize) -> Option<&Flit> {
        self.vcs[vc].queue.front()
    }

    pub fn is_empty(&self, vc: usize) -> bool {
        self.vcs[vc].queue.is_empty()
    }

    pub fn occupancy(&self, vc: usize) -> usize {
        self.vcs[vc].queue.len()
    }

    pub fn state(&self, vc: usize) -> VcState {
        self.vcs[vc].state
    }

    /// Enter `state` at `cycle`. Leaving the active state drops the output
    /// assignment.
    pub fn set_state(&mut self, vc: usize, state: VcState, cycle: Cycle) {
        let channel = &mut self.vcs[vc];
        log::trace!(
            "input {} VC {}: {} -> {} at cycle {}",
            self.input,
            vc,
            channel.state,
            state,
            cycle
        );
        if state != VcState::Active {
            channel.output = None;
        }
        channel.state = state;
        channel.state_entered = cycle;
    }

    /// Cycles spent in the current state as of `now`.
    pub fn state_time(&self, vc: usize, now: Cycle) -> Cycle {
        now.saturating_sub(self.vcs[vc].state_entered)
    }

    pub fn set_output(&mut self, vc: usize, output: usize, output_vc: usize) {
        let channel = &mut self.vcs[vc];
        assert_eq!(channel.state, VcState::Active);
        channel.output = Some((output, output_vc));
    }

    pub fn output(&self, vc: usize) -> Option<(usize, usize)> {
        self.vcs[vc].output
    }

    pub fn output_port(&self, vc: usize) -> Option<usize> {
        self.vcs[vc].output.map(|(port, _)| port)
    }

    pub fn output_vc(&self, vc: usize) -> Option<usize> {
        self.vcs[vc].output.map(|(_, output_vc)| output_vc)
    }

    pub fn route_set(&self, vc: usize) -> &OutputSet {
        &self.vcs[vc].route_set
    }

    pub fn set_route_set(&mut self, vc: usize, route_set: OutputSet) {
        self.vcs[vc].route_set = route_set;
    }

    pub fn priority(&self, vc: usize) -> i32 {
        self.vcs[vc].priority
    }

    pub fn set_priority(&mut self, vc: usize, priority: i32) {
        self.vcs[vc].priority = priority;
    }
}
