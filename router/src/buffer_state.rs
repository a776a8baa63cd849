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


use crate::{CreditMessage, Error, Flit};

/// The view an output port has of the VC buffers at the far end of its link.
pub trait DownstreamBufferState {
    /// The VC is not reserved by any packet.
    fn is_available(&self, vc: usize) -> bool;
    /// The VC has no free slot left for another flit.
    fn is_full(&self, vc: usize) -> bool;
    fn occupancy(&self, vc: usize) -> usize;
    /// Claim the VC for a packet. Must only be called on an available VC.
    fn reserve(&mut self, vc: usize);
    fn release(&mut self, vc: usize);
    /// Account for a flit leaving towards the downstream VC `flit.vc`.
    fn sending_flit(&mut self, flit: &Flit) -> Result<(), Error>;
    fn process_credit(&mut self, credit: &CreditMessage) -> Result<(), Error>;
}

#[derive(Clone, Debug, Default)]
struct VcCredits {
    occupancy: usize,
    in_use: bool,
    tail_sent: bool,
}

/// Credit-counting downstream state of one output port.
#[derive(Clone, Debug)]
pub struct BufferState {
    output: usize,
    depth: usize,
    wait_for_tail_credit: bool,
    vcs: Vec<VcCredits>,
}

impl BufferState {
    pub fn new(output: usize, vcs: usize, depth: usize, wait_for_tail_credit: bool) -> Self {
        Self {
            output,
            depth,
            wait_for_tail_credit,
            vcs: vec![VcCredits::default(); vcs],
        }
    }

    pub fn vc_count(&self) -> usize {
        self.vcs.len()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Total flits in flight or buffered downstream.
    pub fn total_occupancy(&self) -> usize {
        self.vcs.iter().map(|vc| vc.occupancy).sum()
    }
}

impl DownstreamBufferState for BufferState {
    fn is_available(&self, vc: usize) -> bool {
        !self.vcs[vc].in_use
    }

    fn is_full(&self, vc: usize) -> bool {
        self.vcs[vc].occupancy >= self.depth
    }

    fn occupancy(&self, vc: usize) -> usize {
        self.vcs[vc].occupancy
    }

    fn reserve(&mut self, vc: usize) {
        let state = &mut self.vcs[vc];
        assert!(
            !state.in_use,
            "Reserving busy VC {} at output {}",
            vc, self.output
        );
        state.in_use = true;
        state.tail_sent = false;
    }

    fn release(&mut self, vc: usize) {
        log::trace!("output {}: releasing downstream VC {}", self.output, vc);
        let state = &mut self.vcs[vc];
        state.in_use = false;
        state.tail_sent = false;
    }

    fn sending_flit(&mut self, flit: &Flit) -> Result<(), Error> {
        let (output, depth) = (self.output, self.depth);
        let state = self.vcs.get_mut(flit.vc).ok_or(Error::InvalidVc(flit.vc))?;
        if state.occupancy >= depth {
            return Err(Error::DownstreamOverflow {
                output,
                vc: flit.vc,
            });
        }
        state.occupancy += 1;
        if flit.tail {
            state.tail_sent = true;
            if !self.wait_for_tail_credit {
                self.release(flit.vc);
            }
        }
        Ok(())
    }

    fn process_credit(&mut self, credit: &CreditMessage) -> Result<(), Error> {
        for vc in credit.vcs() {
            let state = self.vcs.get_mut(vc).ok_or(Error::InvalidVc(vc))?;
            if state.occupancy == 0 {
                return Err(Error::CreditUnderflow {
                    output: self.output,
                    vc,
                });
            }
            state.occupancy -= 1;
            if self.wait_for_tail_credit
                && state.in_use
                && state.tail_sent
                && state.occupancy == 0
            {
                self.release(vc);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credit(vc: usize, tail: bool) -> CreditMessage {
        let mut credit = CreditMessage::new(None);
        credit.push(vc, tail);
        credit
    }

    #[test]
    fn released_when_tail_credit_returns() {
        let mut state = BufferState::new(1, 2, 2, true);
        state.reserve(0);
        assert!(!state.is_available(0));
        assert!(state.is_available(1));
        let flits = Flit::packet(0, 0, 2, 0, 1, 0);
        state.sending_flit(&flits[0]).unwrap();
        state.sending_flit(&flits[1]).unwrap();
        assert!(state.is_full(0));
        assert_eq!(
            state.sending_flit(&flits[1]),
            Err(Error::DownstreamOverflow { output: 1, vc: 0 })
        );
        state.process_credit(&credit(0, false)).unwrap();
        assert!(!state.is_full(0));
        assert!(!state.is_available(0));
        state.process_credit(&credit(0, true)).unwrap();
        assert!(state.is_available(0));
        assert_eq!(state.total_occupancy(), 0);
    }

    #[test]
    fn released_on_tail_send_without_waiting() {
        let mut state = BufferState::new(0, 1, 4, false);
        state.reserve(0);
        state.sending_flit(&Flit::new(0, 0, 0)).unwrap();
        assert!(state.is_available(0));
        assert_eq!(state.occupancy(0), 1);
    }

    #[test]
    fn credit_underflow_is_reported() {
        let mut state = BufferState::new(3, 2, 4, true);
        assert_eq!(
            state.process_credit(&credit(1, true)),
            Err(Error::CreditUnderflow { output: 3, vc: 1 })
        );
    }

    #[test]
    #[should_panic]
    fn double_reservation_panics() {
        let mut state = BufferState::new(0, 1, 4, true);
        state.reserve(0);
        state.reserve(0);
    }
}
