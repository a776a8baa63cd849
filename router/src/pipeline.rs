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


use crate::{CreditMessage, Flit};

/// Receives the flits that win the crossbar, addressed by expanded output.
pub trait CrossbarTransport {
    fn write(&mut self, flit: Flit, expanded_output: usize);
}

/// Receives the per-input credit messages of a cycle.
pub trait CreditTransport {
    fn write(&mut self, credit: CreditMessage, input: usize);
}

/// A fixed-latency delay line with one lane per slot.
///
/// Values written in a cycle become readable `delay` calls to `advance`
/// later. The stages form a circular buffer; the write stage trails the
/// read stage by `delay`.
#[derive(Clone, Debug)]
pub struct Pipeline<T> {
    stages: Vec<Vec<Option<T>>>,
    read_idx: usize,
    delay: usize,
}

impl<T> Pipeline<T> {
    pub fn new(slots: usize, delay: usize) -> Self {
        Self {
            stages: (0..=delay)
                .map(|_| (0..slots).map(|_| None).collect())
                .collect(),
            read_idx: 0,
            delay,
        }
    }

    pub fn delay(&self) -> usize {
        self.delay
    }

    pub fn slots(&self) -> usize {
        self.stages[0].len()
    }

    fn write_idx(&self) -> usize {
        (self.read_idx + self.delay) % self.stages.len()
    }

    /// Put `value` on lane `slot`. Each lane carries one value per cycle.
    pub fn write(&mut self, slot: usize, value: T) {
        let write_idx = self.write_idx();
        let lane = &mut self.stages[write_idx][slot];
        assert!(lane.is_none(), "Pipeline slot {} written twice", slot);
        *lane = Some(value);
    }

    /// Take the value that arrives on lane `slot` this cycle.
    pub fn read(&mut self, slot: usize) -> Option<T> {
        self.stages[self.read_idx][slot].take()
    }

    /// Move to the next cycle. Everything due this cycle must have been read.
    pub fn advance(&mut self) {
        assert!(
            self.stages[self.read_idx].iter().all(Option::is_none),
            "Pipeline advanced with unread values"
        );
        self.read_idx = (self.read_idx + 1) % self.stages.len();
    }

    /// Nothing is in flight.
    pub fn is_idle(&self) -> bool {
        self.stages.iter().flatten().all(Option::is_none)
    }
}

impl CrossbarTransport for Pipeline<Flit> {
    fn write(&mut self, flit: Flit, expanded_output: usize) {
        log::trace!("crossbar: flit {} -> expanded output {}", flit, expanded_output);
        Pipeline::write(self, expanded_output, flit);
    }
}

impl CreditTransport for Pipeline<CreditMessage> {
    fn write(&mut self, credit: CreditMessage, input: usize) {
        Pipeline::write(self, input, credit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_delay_is_readable_in_the_same_cycle() {
        let mut pipe = Pipeline::new(2, 0);
        pipe.write(1, 'a');
        assert_eq!(pipe.read(0), None);
        assert_eq!(pipe.read(1), Some('a'));
        pipe.advance();
        assert!(pipe.is_idle());
    }

    #[test]
    fn values_arrive_after_the_delay() {
        let mut pipe = Pipeline::new(1, 2);
        pipe.write(0, 1);
        assert_eq!(pipe.read(0), None);
        pipe.advance();
        pipe.write(0, 2);
        assert_eq!(pipe.read(0), None);
        pipe.advance();
        assert_eq!(pipe.read(0), Some(1));
        pipe.advance();
        assert!(!pipe.is_idle());
        assert_eq!(pipe.read(0), Some(2));
        pipe.advance();
        assert!(pipe.is_idle());
    }

    #[test]
    fn transports_address_lanes() {
        let mut pipe: Pipeline<Flit> = Pipeline::new(3, 0);
        CrossbarTransport::write(&mut pipe, Flit::new(9, 9, 0), 2);
        assert_eq!(pipe.read(2).map(|f| f.id), Some(9));
    }

    #[test]
    #[should_panic]
    fn double_write_panics() {
        let mut pipe = Pipeline::new(1, 1);
        pipe.write(0, ());
        pipe.write(0, ());
    }
}
