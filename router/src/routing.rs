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


use itertools::Itertools;

use crate::Flit;

/// A downstream VC a packet may be forwarded to, with its preference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouteCandidate {
    pub output: usize,
    pub vc: usize,
    pub priority: i32,
}

/// The ordered set of admissible (output, VC, priority) candidates computed
/// for a packet by the routing function.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutputSet {
    candidates: Vec<RouteCandidate>,
}

impl OutputSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, output: usize, vc: usize, priority: i32) {
        self.candidates.push(RouteCandidate {
            output,
            vc,
            priority,
        });
    }

    /// Add every VC in `vcs` at `output` with the same priority.
    pub fn add_range(&mut self, output: usize, vcs: std::ops::Range<usize>, priority: i32) {
        for vc in vcs {
            self.add(output, vc, priority);
        }
    }

    pub fn candidates(&self, output: usize) -> impl Iterator<Item = &RouteCandidate> + '_ {
        self.candidates
            .iter()
            .filter(move |candidate| candidate.output == output)
    }

    pub fn num_vcs(&self, output: usize) -> usize {
        self.candidates(output).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteCandidate> + '_ {
        self.candidates.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// The distinct outputs named by the set, in insertion order.
    pub fn outputs(&self) -> Vec<usize> {
        self.candidates
            .iter()
            .map(|candidate| candidate.output)
            .unique()
            .collect()
    }
}

impl FromIterator<RouteCandidate> for OutputSet {
    fn from_iter<I: IntoIterator<Item = RouteCandidate>>(iter: I) -> Self {
        Self {
            candidates: iter.into_iter().collect(),
        }
    }
}

/// Computes the candidate set for a head flit arriving at `input`.
///
/// The router calls this once per packet when the packet's head reaches the
/// front of an idle VC.
pub trait RouteCandidateProvider {
    fn route(&self, input: usize, flit: &Flit) -> OutputSet;
}

impl<F> RouteCandidateProvider for F
where
    F: Fn(usize, &Flit) -> OutputSet,
{
    fn route(&self, input: usize, flit: &Flit) -> OutputSet {
        self(input, flit)
    }
}

/// Sends every packet to output `dest % outputs`, on any VC of a fixed range.
#[derive(Clone, Debug)]
pub struct DestinationRouting {
    outputs: usize,
    vcs: std::ops::Range<usize>,
    priority: i32,
}

impl DestinationRouting {
    pub fn new(outputs: usize, vcs: usize) -> Self {
        assert!(outputs > 0 && vcs > 0);
        Self {
            outputs,
            vcs: 0..vcs,
            priority: 0,
        }
    }

    /// Restrict the candidate VCs, e.g. to keep traffic classes apart.
    pub fn with_vcs(mut self, vcs: std::ops::Range<usize>) -> Self {
        assert!(!vcs.is_empty());
        self.vcs = vcs;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl RouteCandidateProvider for DestinationRouting {
    fn route(&self, _input: usize, flit: &Flit) -> OutputSet {
        let mut set = OutputSet::new();
        set.add_range(flit.dest % self.outputs, self.vcs.clone(), self.priority);
        set
    }
}

/// Sends every packet to the same candidate set.
#[derive(Clone, Debug)]
pub struct FixedRouting(pub OutputSet);

impl RouteCandidateProvider for FixedRouting {
    fn route(&self, _input: usize, _flit: &Flit) -> OutputSet {
        self.0.clone()
    }
}
