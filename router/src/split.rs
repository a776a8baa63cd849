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


//! The split switch allocator: VC allocation and switch allocation are
//! resolved together in one matching per cycle, with a speculative fast path
//! for VCs that already hold their output.

use itertools::Either;

use crate::{AllocationObserver, BipartiteAllocator, CreditMessage, CreditTransport};
use crate::{CrossbarTransport, DenyReason, DownstreamBufferState, Error, Grant, GrantPath};
use crate::{Cycle, InputBuffer, OutputSet, RequestPath, RouterConfiguration, SwitchRequest};
use crate::{new_allocator, VcState};

/// A crossbar connection kept for the rest of a packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwitchHold {
    pub expanded_output: usize,
    pub vc: usize,
}

/// Everything the allocation core touches outside its own bookkeeping.
pub struct RouterPorts<'a, B: DownstreamBufferState> {
    pub cycle: Cycle,
    pub inputs: &'a mut [InputBuffer],
    pub next_buf: &'a mut [B],
    pub crossbar: &'a mut dyn CrossbarTransport,
    pub credits: &'a mut dyn CreditTransport,
    pub observer: &'a mut dyn AllocationObserver,
}

/// What happened in one allocation cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: Cycle,
    pub requests: usize,
    pub grants: Vec<Grant>,
    /// The credit message emitted for each input that forwarded a flit.
    pub credits: Vec<(usize, CreditMessage)>,
    /// (input, vc) pairs whose tail left with more flits queued behind it.
    pub requeued: Vec<(usize, usize)>,
    /// The VC selected for the fast path at each input, if any.
    pub fast_path: Vec<Option<usize>>,
}

pub struct SplitAllocator {
    inputs: usize,
    outputs: usize,
    vcs: usize,
    input_speedup: usize,
    output_speedup: usize,
    sw_alloc_delay: Cycle,
    hold_switch_for_packet: bool,
    allocator: Box<dyn BipartiteAllocator>,
    /// Per (input, vc): the output that candidate scanning starts from.
    vc_rr_offset: Vec<usize>,
    /// Per expanded input: the VC that local arbitration starts from.
    sw_rr_offset: Vec<usize>,
    /// Per (input, vc).
    use_fast_path: Vec<bool>,
    switch_hold_in: Vec<Option<SwitchHold>>,
    switch_hold_out: Vec<Option<usize>>,
    faulted: bool,
    denials: Vec<DenyReason>,
}

/// The outputs a VC may request, in scan order.
fn output_order(
    outputs: usize,
    assigned: Option<usize>,
    start: usize,
) -> impl Iterator<Item = usize> {
    match assigned {
        Some(output) => Either::Left(std::iter::once(output)),
        None => Either::Right((0..outputs).map(move |i| (start + i) % outputs)),
    }
}

/// Highest priority among the admissible candidates at `output`.
///
/// A VC that already holds `assigned_vc` only admits that VC and does not
/// care whether it is reserved (by itself). Rejections are appended to
/// `denials`.
fn admission<B: DownstreamBufferState>(
    route_set: &OutputSet,
    output: usize,
    assigned_vc: Option<usize>,
    dest: &B,
    denials: &mut Vec<DenyReason>,
) -> Option<i32> {
    let mut best: Option<i32> = None;
    for candidate in route_set.candidates(output) {
        let vc = candidate.vc;
        match assigned_vc {
            Some(assigned) if assigned != vc => continue,
            None if !dest.is_available(vc) => {
                denials.push(DenyReason::DownstreamBusy { output, vc });
                continue;
            }
            _ => (),
        }
        if dest.is_full(vc) {
            denials.push(DenyReason::DownstreamFull { output, vc });
            continue;
        }
        best = Some(best.map_or(candidate.priority, |p| p.max(candidate.priority)));
    }
    best
}

/// The first downstream VC with the highest priority that is free and has
/// room.
fn select_output_vc<B: DownstreamBufferState>(
    route_set: &OutputSet,
    output: usize,
    dest: &B,
) -> Option<usize> {
    route_set
        .candidates(output)
        .filter(|c| dest.is_available(c.vc) && !dest.is_full(c.vc))
        .fold(None, |best, c| match best {
            Some((_, priority)) if c.priority <= priority => best,
            _ => Some((c.vc, c.priority)),
        })
        .map(|(vc, _)| vc)
}

impl SplitAllocator {
    pub fn new(config: &RouterConfiguration) -> Result<Self, Error> {
        config.validate()?;
        let expanded_inputs = config.expanded_inputs();
        let expanded_outputs = config.expanded_outputs();
        Ok(Self {
            inputs: config.inputs,
            outputs: config.outputs,
            vcs: config.vcs,
            input_speedup: config.input_speedup,
            output_speedup: config.output_speedup,
            sw_alloc_delay: config.sw_alloc_delay,
            hold_switch_for_packet: config.hold_switch_for_packet,
            allocator: new_allocator(&config.allocator, expanded_inputs, expanded_outputs),
            vc_rr_offset: vec![0; config.inputs * config.vcs],
            sw_rr_offset: (0..expanded_inputs)
                .map(|i| i % config.input_speedup)
                .collect(),
            use_fast_path: vec![false; config.inputs * config.vcs],
            switch_hold_in: vec![None; expanded_inputs],
            switch_hold_out: vec![None; expanded_outputs],
            faulted: false,
            denials: Vec::new(),
        })
    }

    pub fn expanded_input(&self, input: usize, vc: usize) -> usize {
        input * self.input_speedup + vc % self.input_speedup
    }

    pub fn expanded_output(&self, input: usize, output: usize) -> usize {
        output * self.output_speedup + input % self.output_speedup
    }

    /// The VC after `vc` on replica `s`, wrapping back to `s`.
    fn next_replica_vc(&self, vc: usize, s: usize) -> usize {
        let next = vc + self.input_speedup;
        if next < self.vcs {
            next
        } else {
            s
        }
    }

    /// The number of VCs served by replica `s`.
    fn replica_vcs(&self, s: usize) -> usize {
        (self.vcs - s + self.input_speedup - 1) / self.input_speedup
    }

    pub fn allocator_name(&self) -> &'static str {
        self.allocator.name()
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    pub fn fast_path_enabled(&self, input: usize, vc: usize) -> bool {
        self.use_fast_path[input * self.vcs + vc]
    }

    pub fn switch_hold(&self, expanded_input: usize) -> Option<SwitchHold> {
        self.switch_hold_in[expanded_input]
    }

    pub fn switch_hold_owner(&self, expanded_output: usize) -> Option<usize> {
        self.switch_hold_out[expanded_output]
    }

    pub fn sw_rr_offset(&self, expanded_input: usize) -> usize {
        self.sw_rr_offset[expanded_input]
    }

    pub fn vc_rr_offset(&self, input: usize, vc: usize) -> usize {
        self.vc_rr_offset[input * self.vcs + vc]
    }

    /// Run one allocation cycle. After an error the core stays faulted and
    /// refuses to run again.
    pub fn advance<B: DownstreamBufferState>(
        &mut self,
        ports: &mut RouterPorts<'_, B>,
    ) -> Result<CycleReport, Error> {
        if self.faulted {
            return Err(Error::Faulted);
        }
        let result = self.allocate(ports);
        if let Err(err) = &result {
            log::error!("Allocation failed at cycle {}: {}", ports.cycle, err);
            self.faulted = true;
        }
        result
    }

    fn allocate<B: DownstreamBufferState>(
        &mut self,
        ports: &mut RouterPorts<'_, B>,
    ) -> Result<CycleReport, Error> {
        assert_eq!(ports.inputs.len(), self.inputs);
        assert_eq!(ports.next_buf.len(), self.outputs);

        self.allocator.clear();
        let mut report = CycleReport {
            cycle: ports.cycle,
            fast_path: vec![None; self.inputs],
            ..Default::default()
        };

        for input in 0..self.inputs {
            for s in 0..self.input_speedup {
                let expanded_input = input * self.input_speedup + s;
                let mut vc = self.sw_rr_offset[expanded_input];
                debug_assert_eq!(vc % self.input_speedup, s);
                for _ in 0..self.replica_vcs(s) {
                    report.requests += self.slow_path_request(ports, input, expanded_input, vc);
                    vc = self.next_replica_vc(vc, s);
                }
            }
            // Only after every slow-path request of the input is in, so the
            // fast path can yield to them.
            let (fast_vc, requests) = self.fast_path_request(ports, input)?;
            report.fast_path[input] = fast_vc;
            report.requests += requests;
        }

        self.allocator.allocate();

        for input in 0..self.inputs {
            let mut credit: Option<CreditMessage> = None;
            for s in 0..self.input_speedup {
                self.commit(ports, input, s, report.fast_path[input], &mut credit, &mut report)?;
            }
            if let Some(credit) = credit {
                report.credits.push((input, credit.clone()));
                ports.credits.write(credit, input);
            }
        }
        Ok(report)
    }

    fn flush_denials<B: DownstreamBufferState>(
        &mut self,
        ports: &mut RouterPorts<'_, B>,
        input: usize,
        vc: usize,
    ) {
        if self.denials.is_empty() {
            return;
        }
        if let Some(flit) = ports.inputs[input].front(vc) {
            for reason in self.denials.iter() {
                ports
                    .observer
                    .request_denied(ports.cycle, input, vc, flit, reason);
            }
        }
        self.denials.clear();
    }

    /// Build the slow-path requests of one VC. Returns the number submitted.
    fn slow_path_request<B: DownstreamBufferState>(
        &mut self,
        ports: &mut RouterPorts<'_, B>,
        input: usize,
        expanded_input: usize,
        vc: usize,
    ) -> usize {
        let cycle = ports.cycle;
        let buffer = &ports.inputs[input];
        let flit = match buffer.front(vc) {
            Some(flit) => flit,
            None => return 0,
        };
        let state = buffer.state(vc);
        let state_time = buffer.state_time(vc, cycle);
        if !matches!(state, VcState::VcAlloc | VcState::Active) || state_time < self.sw_alloc_delay
        {
            let reason = DenyReason::NotReady { state, state_time };
            ports.observer.request_denied(cycle, input, vc, flit, &reason);
            return 0;
        }
        if let Some(hold) = self.switch_hold_in[expanded_input] {
            let reason = DenyReason::SwitchHeld {
                expanded_input,
                expanded_output: hold.expanded_output,
            };
            ports.observer.request_denied(cycle, input, vc, flit, &reason);
            return 0;
        }

        let (assigned_port, assigned_vc) = match state {
            VcState::Active => (buffer.output_port(vc), buffer.output_vc(vc)),
            _ => (None, None),
        };
        let start = self.vc_rr_offset[input * self.vcs + vc];
        let mut submitted = 0;
        for output in output_order(self.outputs, assigned_port, start) {
            let expanded_output = self.expanded_output(input, output);
            if self.switch_hold_out[expanded_output].is_some() {
                self.denials.push(DenyReason::SwitchHeld {
                    expanded_input,
                    expanded_output,
                });
                continue;
            }
            let priority = admission(
                buffer.route_set(vc),
                output,
                assigned_vc,
                &ports.next_buf[output],
                &mut self.denials,
            );
            if let Some(in_priority) = priority {
                let request = SwitchRequest {
                    expanded_input,
                    expanded_output,
                    vc,
                    in_priority,
                    out_priority: buffer.priority(vc),
                };
                ports
                    .observer
                    .request_submitted(cycle, &request, RequestPath::Slow, flit);
                self.allocator.add_request(request);
                submitted += 1;
            }
        }
        self.flush_denials(ports, input, vc);
        submitted
    }

    /// Build the fast-path request of an input, if one of its VCs is flagged
    /// and ready. Returns the selected VC and the number of requests.
    fn fast_path_request<B: DownstreamBufferState>(
        &mut self,
        ports: &mut RouterPorts<'_, B>,
        input: usize,
    ) -> Result<(Option<usize>, usize), Error> {
        let cycle = ports.cycle;
        let mut selected: Option<usize> = None;
        let mut submitted = 0;
        for vc in 0..self.vcs {
            if !self.use_fast_path[input * self.vcs + vc] {
                continue;
            }
            let buffer = &ports.inputs[input];
            let flit = match buffer.front(vc) {
                Some(flit) => flit,
                None => continue,
            };
            let state = buffer.state(vc);
            if !matches!(state, VcState::VcAlloc | VcState::Active) {
                let reason = DenyReason::NotReady {
                    state,
                    state_time: buffer.state_time(vc, cycle),
                };
                ports.observer.request_denied(cycle, input, vc, flit, &reason);
                continue;
            }
            if let Some(fast_vc) = selected {
                return Err(Error::FastPathConflict { input, vc, fast_vc });
            }
            selected = Some(vc);

            let expanded_input = self.expanded_input(input, vc);
            let (assigned_port, assigned_vc) = match state {
                VcState::Active => (buffer.output_port(vc), buffer.output_vc(vc)),
                _ => (None, None),
            };
            for output in output_order(self.outputs, assigned_port, 0) {
                let expanded_output = self.expanded_output(input, output);
                if self.allocator.request(expanded_input, expanded_output).is_some() {
                    self.denials.push(DenyReason::SlotInUse {
                        expanded_input,
                        expanded_output,
                    });
                    continue;
                }
                if self.switch_hold_in[expanded_input].is_some()
                    || self.switch_hold_out[expanded_output].is_some()
                {
                    self.denials.push(DenyReason::SwitchHeld {
                        expanded_input,
                        expanded_output,
                    });
                    continue;
                }
                let priority = admission(
                    buffer.route_set(vc),
                    output,
                    assigned_vc,
                    &ports.next_buf[output],
                    &mut self.denials,
                );
                if let Some(in_priority) = priority {
                    let request = SwitchRequest {
                        expanded_input,
                        expanded_output,
                        vc,
                        in_priority,
                        out_priority: buffer.priority(vc),
                    };
                    ports
                        .observer
                        .request_submitted(cycle, &request, RequestPath::Fast, flit);
                    self.allocator.add_request(request);
                    submitted += 1;
                }
            }
            self.flush_denials(ports, input, vc);
        }
        Ok((selected, submitted))
    }

    fn set_fast_path(
        &mut self,
        cycle: Cycle,
        input: usize,
        vc: usize,
        enabled: bool,
        observer: &mut dyn AllocationObserver,
    ) {
        if enabled {
            // At most one flagged VC per input.
            for other in (0..self.vcs).filter(|&other| other != vc) {
                self.set_fast_path(cycle, input, other, false, observer);
            }
        }
        let flag = &mut self.use_fast_path[input * self.vcs + vc];
        if *flag != enabled {
            *flag = enabled;
            log::trace!(
                "{} | {} fast path for VC {} at input {}",
                cycle,
                if enabled { "Enabling" } else { "Disabling" },
                vc,
                input
            );
            observer.fast_path_changed(cycle, input, vc, enabled);
        }
    }

    fn release_hold(&mut self, expanded_input: usize) {
        if let Some(hold) = self.switch_hold_in[expanded_input].take() {
            self.switch_hold_out[hold.expanded_output] = None;
        }
    }

    /// Apply the outcome of the matching for replica `s` of `input`.
    fn commit<B: DownstreamBufferState>(
        &mut self,
        ports: &mut RouterPorts<'_, B>,
        input: usize,
        s: usize,
        fast_vc: Option<usize>,
        credit: &mut Option<CreditMessage>,
        report: &mut CycleReport,
    ) -> Result<(), Error> {
        let cycle = ports.cycle;
        let expanded_input = input * self.input_speedup + s;

        let mut granted = None;
        let mut path = GrantPath::Held;
        if let Some(hold) = self.switch_hold_in[expanded_input] {
            let buffer = &ports.inputs[input];
            if buffer.is_empty(hold.vc) {
                log::trace!(
                    "{} | Cancelling switch hold of VC {} at input {}",
                    cycle,
                    hold.vc,
                    input
                );
                self.release_hold(expanded_input);
            } else if let Some((output, output_vc)) = buffer.output(hold.vc) {
                // A held VC waits for credits without giving up the hold.
                if !ports.next_buf[output].is_full(output_vc) {
                    granted = Some((hold.expanded_output, hold.vc));
                }
            }
        }
        if granted.is_none() {
            if let Some(expanded_output) = self.allocator.granted_output(expanded_input) {
                if self.switch_hold_out[expanded_output].is_some() {
                    return Err(Error::SwitchHoldMismatch {
                        expanded_input,
                        expanded_output,
                    });
                }
                granted = self
                    .allocator
                    .requested_vc(expanded_input, expanded_output)
                    .map(|vc| (expanded_output, vc));
                path = match granted {
                    Some((_, vc)) if Some(vc) == fast_vc => GrantPath::Fast,
                    _ => GrantPath::Slow,
                };
            }
        }

        let (expanded_output, vc) = match granted {
            Some(granted) => granted,
            None => {
                if let Some(fvc) = fast_vc.filter(|fvc| fvc % self.input_speedup == s) {
                    self.set_fast_path(cycle, input, fvc, false, &mut *ports.observer);
                }
                return Ok(());
            }
        };
        let output = expanded_output / self.output_speedup;

        if let Some(fvc) = fast_vc.filter(|&fvc| fvc != vc) {
            self.set_fast_path(cycle, input, fvc, false, &mut *ports.observer);
        }

        let buffer = &mut ports.inputs[input];
        match buffer.state(vc) {
            VcState::VcAlloc => {
                let dest = &mut ports.next_buf[output];
                let output_vc = select_output_vc(buffer.route_set(vc), output, &*dest)
                    .ok_or(Error::NoAdmissibleVc { input, vc, output })?;
                buffer.set_state(vc, VcState::Active, cycle);
                buffer.set_output(vc, output, output_vc);
                dest.reserve(output_vc);
                self.vc_rr_offset[input * self.vcs + vc] = (output + 1) % self.outputs;
            }
            VcState::Active => (),
            state => return Err(Error::InvalidGrant { input, vc, state }),
        }
        let output_vc = match buffer.output(vc) {
            Some((port, output_vc)) if port == output => output_vc,
            _ => {
                return Err(Error::InvalidGrant {
                    input,
                    vc,
                    state: VcState::Active,
                })
            }
        };

        if self.hold_switch_for_packet {
            self.switch_hold_in[expanded_input] = Some(SwitchHold {
                expanded_output,
                vc,
            });
            self.switch_hold_out[expanded_output] = Some(expanded_input);
        }

        let mut flit = buffer.remove_flit(vc).ok_or(Error::InvalidGrant {
            input,
            vc,
            state: VcState::Active,
        })?;
        flit.hops += 1;
        let message = credit.get_or_insert_with(|| CreditMessage::new(flit.from_router));
        message.push(vc, flit.tail);
        message.dest_router = flit.from_router;
        flit.vc = output_vc;
        ports.next_buf[output].sending_flit(&flit)?;

        let grant = Grant {
            input,
            vc,
            expanded_input,
            expanded_output,
            output,
            output_vc,
            flit_id: flit.id,
            tail: flit.tail,
            path,
        };
        ports.observer.grant_committed(cycle, &grant, &flit);
        report.grants.push(grant);
        let tail = flit.tail;
        ports.crossbar.write(flit, expanded_output);

        if tail {
            buffer.set_state(vc, VcState::Idle, cycle);
            if !buffer.is_empty(vc) {
                report.requeued.push((input, vc));
            }
            self.release_hold(expanded_input);
        }

        let fast = self.use_fast_path[input * self.vcs + vc];
        if !fast {
            self.sw_rr_offset[expanded_input] = self.next_replica_vc(vc, s);
            if buffer.is_empty(vc) {
                self.set_fast_path(cycle, input, vc, true, &mut *ports.observer);
            }
        }
        Ok(())
    }
}
