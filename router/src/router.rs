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

use crate::{AllocationObserver, BufferState, CreditMessage, CycleReport, DownstreamBufferState};
use crate::{Cycle, Error, Flit, InputBuffer, Pipeline, RouteCandidateProvider};
use crate::{RouterConfiguration, RouterPorts, SplitAllocator, VcState, WatchLogger};

/// An input-queued VC router built around the split allocator.
///
/// Flits enter through `write_flit` and leave through `read_flit` once they
/// have crossed the crossbar pipeline. Credits flow the other way:
/// `write_credit` returns buffer space to an output, `read_credit` yields the
/// credits freed at an input.
pub struct Router {
    id: usize,
    config: RouterConfiguration,
    cycle: Cycle,
    inputs: Vec<InputBuffer>,
    next_buf: Vec<BufferState>,
    core: SplitAllocator,
    crossbar_pipe: Pipeline<Flit>,
    credit_pipe: Pipeline<CreditMessage>,
    routing: Box<dyn RouteCandidateProvider>,
    observer: Box<dyn AllocationObserver>,
    output_queues: Vec<VecDeque<Flit>>,
    credit_out: Vec<Option<CreditMessage>>,
}

impl Router {
    pub fn new(
        id: usize,
        config: &RouterConfiguration,
        routing: Box<dyn RouteCandidateProvider>,
    ) -> Result<Self, Error> {
        let core = SplitAllocator::new(config)?;
        log::info!(
            "Router {}: {}x{} ports, {} VCs, speedup {}/{}, {} allocator",
            id,
            config.inputs,
            config.outputs,
            config.vcs,
            config.input_speedup,
            config.output_speedup,
            core.allocator_name()
        );
        Ok(Self {
            id,
            config: config.clone(),
            cycle: 0,
            inputs: (0..config.inputs)
                .map(|input| InputBuffer::new(input, config.vcs, config.vc_buffer_size))
                .collect(),
            next_buf: (0..config.outputs)
                .map(|output| {
                    BufferState::new(
                        output,
                        config.vcs,
                        config.vc_buffer_size,
                        config.wait_for_tail_credit,
                    )
                })
                .collect(),
            core,
            crossbar_pipe: Pipeline::new(config.expanded_outputs(), config.crossbar_delay),
            credit_pipe: Pipeline::new(config.inputs, config.credit_delay),
            routing,
            observer: Box::new(WatchLogger),
            output_queues: vec![VecDeque::new(); config.outputs],
            credit_out: vec![None; config.inputs],
        })
    }

    pub fn with_observer(mut self, observer: Box<dyn AllocationObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn cycle(&self) -> Cycle {
        self.cycle
    }

    pub fn config(&self) -> &RouterConfiguration {
        &self.config
    }

    pub fn core(&self) -> &SplitAllocator {
        &self.core
    }

    pub fn input_buffer(&self, input: usize) -> &InputBuffer {
        &self.inputs[input]
    }

    pub fn downstream(&self, output: usize) -> &BufferState {
        &self.next_buf[output]
    }

    /// Accept a flit arriving at `input` on VC `flit.vc`.
    pub fn write_flit(&mut self, input: usize, flit: Flit) -> Result<(), Error> {
        let buffer = self.inputs.get_mut(input).ok_or(Error::InvalidPort(input))?;
        if flit.watch {
            log::trace!(
                "{} | router {} received flit {} at input {} VC {}",
                self.cycle,
                self.id,
                flit,
                input,
                flit.vc
            );
        }
        buffer.add_flit(flit.vc, flit)
    }

    /// Return downstream buffer space at `output`.
    pub fn write_credit(&mut self, output: usize, credit: &CreditMessage) -> Result<(), Error> {
        self.next_buf
            .get_mut(output)
            .ok_or(Error::InvalidPort(output))?
            .process_credit(credit)
    }

    pub fn read_flit(&mut self, output: usize) -> Option<Flit> {
        self.output_queues.get_mut(output)?.pop_front()
    }

    pub fn read_credit(&mut self, input: usize) -> Option<CreditMessage> {
        self.credit_out.get_mut(input)?.take()
    }

    /// No flits are buffered or in flight inside the router.
    pub fn is_idle(&self) -> bool {
        self.inputs
            .iter()
            .all(|buffer| (0..buffer.vc_count()).all(|vc| buffer.is_empty(vc)))
            && self.crossbar_pipe.is_idle()
            && self.output_queues.iter().all(VecDeque::is_empty)
    }

    /// Route the packets waiting at the head of idle VCs. With lookahead
    /// routing this takes no time: they are ready for allocation in the same
    /// cycle.
    fn route_waiting_vcs(&mut self) -> Result<(), Error> {
        for (input, buffer) in self.inputs.iter_mut().enumerate() {
            for vc in 0..buffer.vc_count() {
                let head = match buffer.front(vc) {
                    Some(flit) if buffer.state(vc) == VcState::Idle => flit,
                    _ => continue,
                };
                if !head.head {
                    log::warn!(
                        "{} | router {}: body flit {} at the front of idle VC {} at input {}",
                        self.cycle,
                        self.id,
                        head,
                        vc,
                        input
                    );
                    continue;
                }
                let route_set = self.routing.route(input, head);
                if route_set.is_empty() {
                    return Err(Error::NoRoute { input, vc });
                }
                let priority = head.priority;
                buffer.set_state(vc, VcState::Routing, self.cycle);
                buffer.set_route_set(vc, route_set);
                buffer.set_priority(vc, priority);
                buffer.set_state(vc, VcState::VcAlloc, self.cycle);
            }
        }
        Ok(())
    }

    /// Advance the router by one cycle.
    pub fn step(&mut self) -> Result<CycleReport, Error> {
        if self.core.is_faulted() {
            return Err(Error::Faulted);
        }
        self.route_waiting_vcs()?;

        let mut ports = RouterPorts {
            cycle: self.cycle,
            inputs: &mut self.inputs,
            next_buf: &mut self.next_buf,
            crossbar: &mut self.crossbar_pipe,
            credits: &mut self.credit_pipe,
            observer: self.observer.as_mut(),
        };
        let report = self.core.advance(&mut ports)?;

        for expanded_output in 0..self.crossbar_pipe.slots() {
            if let Some(flit) = self.crossbar_pipe.read(expanded_output) {
                self.output_queues[expanded_output / self.config.output_speedup].push_back(flit);
            }
        }
        for (input, pending) in self.credit_out.iter_mut().enumerate() {
            if let Some(credit) = self.credit_pipe.read(input) {
                match pending {
                    Some(pending) => pending.entries.extend(credit.entries),
                    None => *pending = Some(credit),
                }
            }
        }
        self.observer.cycle_completed(self.cycle);
        self.crossbar_pipe.advance();
        self.credit_pipe.advance();
        self.cycle += 1;
        Ok(report)
    }
}
