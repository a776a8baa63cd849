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


use rand::seq::SliceRandom;
use rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;

use crate::allocator::RequestMatrix;
use crate::{BipartiteAllocator, SwitchRequest};

/// Parallel iterative matching.
///
/// Outputs grant a random requester among those with the best key, then
/// inputs accept a random grant among the best ones. The generator is seeded
/// so runs are reproducible.
#[derive(Clone, Debug)]
pub struct PimAllocator {
    matrix: RequestMatrix,
    iterations: usize,
    rng: Xoshiro256StarStar,
}

impl PimAllocator {
    pub fn new(inputs: usize, outputs: usize, iterations: usize, seed: u64) -> Self {
        Self {
            matrix: RequestMatrix::new(inputs, outputs),
            iterations: iterations.max(1),
            rng: Xoshiro256StarStar::seed_from_u64(seed),
        }
    }
}

/// The entries of `candidates` with the largest key.
fn best<T: Copy>(candidates: &[(T, (i32, i32))]) -> Vec<T> {
    match candidates.iter().map(|&(_, key)| key).max() {
        Some(top) => candidates
            .iter()
            .filter(|&&(_, key)| key == top)
            .map(|&(item, _)| item)
            .collect(),
        None => Vec::new(),
    }
}

impl BipartiteAllocator for PimAllocator {
    fn name(&self) -> &'static str {
        "pim"
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
        for _ in 0..self.iterations {
            // Grant phase
            let mut offers: Vec<Vec<(usize, (i32, i32))>> = vec![Vec::new(); inputs];
            for output in (0..outputs).filter(|&o| !self.matrix.is_output_matched(o)) {
                let requesters: Vec<_> = (0..inputs)
                    .filter(|&i| !self.matrix.is_input_matched(i))
                    .filter_map(|i| self.matrix.get(i, output).map(|r| (i, r.key())))
                    .collect();
                if let Some(&input) = best(&requesters).choose(&mut self.rng) {
                    if let Some(request) = self.matrix.get(input, output) {
                        offers[input].push((output, request.key()));
                    }
                }
            }
            // Accept phase
            let mut matched = false;
            for (input, offers) in offers.iter().enumerate() {
                if let Some(&output) = best(offers).choose(&mut self.rng) {
                    self.matrix.grant(input, output);
                    matched = true;
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
