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


/// One freed input buffer slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CreditEntry {
    pub vc: usize,
    /// The flit that freed the slot was the tail of its packet.
    pub tail: bool,
}

/// Credits aggregated per input per cycle and sent back upstream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreditMessage {
    pub entries: Vec<CreditEntry>,
    pub dest_router: Option<usize>,
}

impl CreditMessage {
    pub fn new(dest_router: Option<usize>) -> Self {
        Self {
            entries: Vec::new(),
            dest_router,
        }
    }

    pub fn push(&mut self, vc: usize, tail: bool) {
        self.entries.push(CreditEntry { vc, tail });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn vcs(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().map(|entry| entry.vc)
    }

    /// The number of VCs whose packet left entirely with this credit.
    pub fn released_vcs(&self) -> usize {
        self.entries.iter().filter(|entry| entry.tail).count()
    }
}
