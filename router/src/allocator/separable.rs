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


use crate::allocator::{RequestMatrix, RoundRobinArbiter};
use crate::{BipartiteAllocator, SwitchRequest};

/// Input-first separable allocator with round-robin arbiters on both sides.
///
/// Each iteration every unmatched input proposes its best open request, then
/// every output accepts the best proposal. Arbiter pointers only move for
/// grants made in the first iteration, which keeps the rotation starvation
/// free.
#[derive(Clone, Debug)]
pub struct SeparableInputFirstAllocator {
    matrix: RequestMatrix,
    iterations: usize,
    input_arbiters: Vec<RoundRobinArbiter>,
    output_arbiters: Vec<RoundRobinArbiter>,
}

impl SeparableInputFirstAllocator {
    pub fn new(inputs: usize, outputs: usize, iterations: usize) -> Self {
        Self {
            matrix: RequestMatrix::new(inputs, outputs),
            iterations: iterations.max(1),
            input_arbiters: (0..inputs).map(|_| RoundRobinArbiter::new(outputs)).collect(),
            output_arbiters: (0..outputs).map(|_| RoundRobinArbiter::new(inputs)).collect(),
        }
    }
}

impl BipartiteAllocator for SeparableInputFirstAllocator {
    fn name(&self) -> &'static str {
        "separable_input_first"
    }

    fn clear(&mut self) {
        self.matrix.clear();
    }

    fn add_request(&mut self, request: SwitchRequest) {
        self.matrix.add(request);
    }

    fn request(&self, expanded_input: usize, expanded_output: usize) -> Option<&SwitchRequest> {
        self.matrix.get(expanded_input, expanded_output)
    }

    fn allocate(&mut self) {
        let (inputs, outputs) = (self.matrix.inputs(), self.matrix.outputs());
        for iteration in 0..self.iterations {
            let mut proposals: Vec<Vec<(usize, (i32, i32))>> = vec![Vec::new(); outputs];
            for input in (0..inputs).filter(|&i| !self.matrix.is_input_matched(i)) {
                let choice = self.input_arbiters[input].pick(
                    self.matrix
                        .open_row(input)
                        .map(|r| (r.expanded_output, r.key())),
                );
                if let Some(output) = choice {
                    let key = self.matrix.get(input, output).map(|r| r.key());
                    if let Some(key) = key {
                        proposals[output].push((input, key));
                    }
                }
            }
            let mut matched = false;
            for (output, proposals) in proposals.into_iter().enumerate() {
                if let Some(input) = self.output_arbiters[output].pick(proposals) {
                    self.matrix.grant(input, output);
                    matched = true;
                    if iteration == 0 {
                        self.input_arbiters[input].advance_past(output);
                        self.output_arbiters[output].advance_past(input);
                    }
                }
            }
            if !matched {
                break;
            }
        }
    }

    fn granted_output(&self, expanded_input: usize) -> Option<usize> {
        self.matrix.granted_output(expanded_input)
    }
}
