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


use crate::allocator::RequestMatrix;
use crate::{BipartiteAllocator, SwitchRequest};

/// Wavefront allocator.
///
/// Priority classes are matched highest first. Within a class the square
/// request matrix is swept diagonal by diagonal, starting from a diagonal
/// that rotates every cycle.
#[derive(Clone, Debug)]
pub struct WavefrontAllocator {
    matrix: RequestMatrix,
    size: usize,
    start: usize,
}

impl WavefrontAllocator {
    pub fn new(inputs: usize, outputs: usize) -> Self {
        Self {
            matrix: RequestMatrix::new(inputs, outputs),
            size: inputs.max(outputs),
            start: 0,
        }
    }
}

impl BipartiteAllocator for WavefrontAllocator {
    fn name(&self) -> &'static str {
        "wavefront"
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
        for key in self.matrix.keys_descending() {
            for offset in 0..self.size {
                let diagonal = (self.start + offset) % self.size;
                for input in 0..inputs {
                    let output = (input + diagonal) % self.size;
                    if output >= outputs
                        || self.matrix.is_input_matched(input)
                        || self.matrix.is_output_matched(output)
                    {
                        continue;
                    }
                    if self.matrix.get(input, output).map(|r| r.key()) == Some(key) {
                        self.matrix.grant(input, output);
                    }
                }
            }
        }
        self.start = (self.start + 1) % self.size;
    }

    fn granted_output(&self, expanded_input: usize) -> Option<usize> {
        self.matrix.granted_output(expanded_input)
    }
}
