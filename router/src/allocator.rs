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


//! Bipartite matching between expanded inputs and expanded outputs.

mod pim;
mod separable;
mod wavefront;

pub use pim::PimAllocator;
pub use separable::SeparableInputFirstAllocator;
pub use wavefront::WavefrontAllocator;

use crate::{AllocatorConfiguration, AllocatorKind};

/// One crossbar request for a cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwitchRequest {
    pub expanded_input: usize,
    pub expanded_output: usize,
    /// The input VC that would traverse the crossbar.
    pub vc: usize,
    /// Admission priority, the best candidate priority at the output.
    pub in_priority: i32,
    /// Tie-break weight, the packet priority.
    pub out_priority: i32,
}

impl SwitchRequest {
    /// Arbitration key; larger wins.
    pub fn key(&self) -> (i32, i32) {
        (self.in_priority, self.out_priority)
    }
}

/// Request/grant service used by the allocation core once per cycle.
///
/// Implementations must return a partial injection: every expanded input is
/// matched with at most one expanded output and vice versa, and only
/// requested pairs are matched.
pub trait BipartiteAllocator {
    fn name(&self) -> &'static str;

    /// Drop all requests and grants of the previous cycle.
    fn clear(&mut self);

    /// Register a request. An existing request for the same pair is only
    /// replaced if the new one has a strictly higher admission priority.
    fn add_request(&mut self, request: SwitchRequest);

    /// The request currently registered for a pair, if any.
    fn request(&self, expanded_input: usize, expanded_output: usize) -> Option<&SwitchRequest>;

    fn allocate(&mut self);

    fn granted_output(&self, expanded_input: usize) -> Option<usize>;

    fn requested_vc(&self, expanded_input: usize, expanded_output: usize) -> Option<usize> {
        self.request(expanded_input, expanded_output)
            .map(|request| request.vc)
    }
}

/// Build the allocator selected by `config` for an `inputs` x `outputs`
/// crossbar.
pub fn new_allocator(
    config: &AllocatorConfiguration,
    inputs: usize,
    outputs: usize,
) -> Box<dyn BipartiteAllocator> {
    log::debug!(
        "Using {:?} allocator for {}x{} crossbar ({} iterations)",
        config.kind,
        inputs,
        outputs,
        config.iterations
    );
    match config.kind {
        AllocatorKind::SeparableInputFirst => Box::new(SeparableInputFirstAllocator::new(
            inputs,
            outputs,
            config.iterations,
        )),
        AllocatorKind::Wavefront => Box::new(WavefrontAllocator::new(inputs, outputs)),
        AllocatorKind::Pim => Box::new(PimAllocator::new(
            inputs,
            outputs,
            config.iterations,
            config.seed,
        )),
    }
}

/// Requests and grants shared by all allocators.
#[derive(Clone, Debug)]
pub(crate) struct RequestMatrix {
    inputs: usize,
    outputs: usize,
    requests: Vec<Option<SwitchRequest>>,
    input_grant: Vec<Option<usize>>,
    output_grant: Vec<Option<usize>>,
}

impl RequestMatrix {
    pub(crate) fn new(inputs: usize, outputs: usize) -> Self {
        Self {
            inputs,
            outputs,
            requests: vec![None; inputs * outputs],
            input_grant: vec![None; inputs],
            output_grant: vec![None; outputs],
        }
    }

    pub(crate) fn inputs(&self) -> usize {
        self.inputs
    }

    pub(crate) fn outputs(&self) -> usize {
        self.outputs
    }

    pub(crate) fn clear(&mut self) {
        self.requests.iter_mut().for_each(|request| *request = None);
        self.input_grant.iter_mut().for_each(|grant| *grant = None);
        self.output_grant.iter_mut().for_each(|grant| *grant = None);
    }

    pub(crate) fn add(&mut self, request: SwitchRequest) {
        assert!(request.expanded_input < self.inputs);
        assert!(request.expanded_output < self.outputs);
        let index = request.expanded_input * self.outputs + request.expanded_output;
        let replace = match &self.requests[index] {
            Some(existing) => request.in_priority > existing.in_priority,
            None => true,
        };
        if replace {
            self.requests[index] = Some(request);
        }
    }

    pub(crate) fn get(&self, input: usize, output: usize) -> Option<&SwitchRequest> {
        self.requests[input * self.outputs + output].as_ref()
    }

    /// Requests of `input` towards outputs that are still unmatched.
    pub(crate) fn open_row(&self, input: usize) -> impl Iterator<Item = &SwitchRequest> + '_ {
        (0..self.outputs)
            .filter(move |&output| self.output_grant[output].is_none())
            .filter_map(move |output| self.get(input, output))
    }

    pub(crate) fn is_input_matched(&self, input: usize) -> bool {
        self.input_grant[input].is_some()
    }

    pub(crate) fn is_output_matched(&self, output: usize) -> bool {
        self.output_grant[output].is_some()
    }

    pub(crate) fn grant(&mut self, input: usize, output: usize) {
        assert!(self.get(input, output).is_some());
        assert!(self.input_grant[input].is_none() && self.output_grant[output].is_none());
        log::trace!("grant expanded input {} -> expanded output {}", input, output);
        self.input_grant[input] = Some(output);
        self.output_grant[output] = Some(input);
    }

    pub(crate) fn granted_output(&self, input: usize) -> Option<usize> {
        self.input_grant[input]
    }

    /// The distinct arbitration keys present, highest first.
    pub(crate) fn keys_descending(&self) -> Vec<(i32, i32)> {
        let mut keys: Vec<_> = self.requests.iter().flatten().map(|r| r.key()).collect();
        keys.sort_unstable_by(|a, b| b.cmp(a));
        keys.dedup();
        keys
    }
}

/// A round-robin arbiter that prefers higher keys and breaks ties by the
/// distance from its pointer.
#[derive(Clone, Debug)]
pub(crate) struct RoundRobinArbiter {
    size: usize,
    pointer: usize,
}

impl RoundRobinArbiter {
    pub(crate) fn new(size: usize) -> Self {
        Self { size, pointer: 0 }
    }

    pub(crate) fn pick<I>(&self, candidates: I) -> Option<usize>
    where
        I: IntoIterator<Item = (usize, (i32, i32))>,
    {
        candidates
            .into_iter()
            .min_by_key(|&(index, key)| {
                (
                    std::cmp::Reverse(key),
                    (index + self.size - self.pointer) % self.size,
                )
            })
            .map(|(index, _)| index)
    }

    /// Make `index` the lowest priority for the next round.
    pub(crate) fn advance_past(&mut self, index: usize) {
        self.pointer = (index + 1) % self.size;
    }
}
