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


//! Packet sources and sinks attached to the router's ports.

use std::collections::{HashMap, VecDeque};

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use router::{BufferState, CreditMessage, Cycle, DownstreamBufferState, Flit, Router};

/// Hands out packet and flit identifiers shared by all sources.
#[derive(Debug, Default)]
pub struct Ids {
    packet: u64,
    flit: u64,
}

impl Ids {
    fn next_packet(&mut self, size: usize) -> (u64, u64) {
        let ids = (self.packet, self.flit);
        self.packet += 1;
        self.flit += size as u64;
        ids
    }
}

/// Injects packets into one router input, one flit per cycle, gated by the
/// credits the router returns.
pub struct Source {
    input: usize,
    rng: Pcg64,
    /// Probability of creating a packet in a cycle.
    packet_rate: f64,
    packet_size: usize,
    outputs: usize,
    credits: BufferState,
    next_vc: usize,
    /// VC of the packet currently being sent.
    current_vc: Option<usize>,
    queue: VecDeque<Flit>,
    pub injected_flits: usize,
    pub injected_packets: usize,
}

impl Source {
    pub fn new(
        input: usize,
        seed: u64,
        injection_rate: f64,
        packet_size: usize,
        router: &Router,
    ) -> Self {
        let config = router.config();
        Self {
            input,
            rng: Pcg64::seed_from_u64(seed.wrapping_add(input as u64)),
            packet_rate: (injection_rate / packet_size as f64).min(1.0),
            packet_size,
            outputs: config.outputs,
            credits: BufferState::new(
                input,
                config.vcs,
                config.vc_buffer_size,
                config.wait_for_tail_credit,
            ),
            next_vc: 0,
            current_vc: None,
            queue: VecDeque::new(),
            injected_flits: 0,
            injected_packets: 0,
        }
    }

    /// Flits created but not yet handed to the router.
    pub fn backlog(&self) -> usize {
        self.queue.len()
    }

    pub fn generate(&mut self, cycle: Cycle, ids: &mut Ids, watch: &[u64]) {
        if !self.rng.gen_bool(self.packet_rate) {
            return;
        }
        let dest = self.rng.gen_range(0..self.outputs);
        let (packet_id, first_id) = ids.next_packet(self.packet_size);
        let watched = watch.contains(&packet_id);
        for flit in Flit::packet(packet_id, first_id, self.packet_size, 0, dest, 0) {
            self.queue.push_back(Flit {
                source: self.input,
                injected_at: cycle,
                watch: watched,
                ..flit
            });
        }
        self.injected_packets += 1;
    }

    /// Pick a free VC for a new packet, round-robin.
    fn allocate_vc(&mut self) -> Option<usize> {
        let vcs = self.credits.vc_count();
        let vc = (0..vcs)
            .map(|i| (self.next_vc + i) % vcs)
            .find(|&vc| self.credits.is_available(vc))?;
        self.credits.reserve(vc);
        self.next_vc = (vc + 1) % vcs;
        Some(vc)
    }

    /// Send at most one flit into the router.
    pub fn send(&mut self, router: &mut Router) -> Result<(), router::Error> {
        let head = match self.queue.front() {
            Some(flit) => flit.head,
            None => return Ok(()),
        };
        let vc = match (self.current_vc, head) {
            (Some(vc), _) => vc,
            (None, true) => match self.allocate_vc() {
                Some(vc) => vc,
                None => return Ok(()),
            },
            (None, false) => unreachable!("body flit without a packet in flight"),
        };
        self.current_vc = Some(vc);
        if self.credits.is_full(vc) {
            return Ok(());
        }
        if let Some(mut flit) = self.queue.pop_front() {
            flit.vc = vc;
            self.credits.sending_flit(&flit)?;
            if flit.tail {
                self.current_vc = None;
            }
            router.write_flit(self.input, flit)?;
            self.injected_flits += 1;
        }
        Ok(())
    }

    pub fn receive_credit(&mut self, credit: &CreditMessage) -> Result<(), router::Error> {
        self.credits.process_credit(credit)
    }
}

/// Drains one router output, checks delivery order and returns credits after
/// a fixed delay.
pub struct Sink {
    output: usize,
    delay: Cycle,
    credits: VecDeque<(Cycle, usize, bool)>,
    /// packet id -> id of the next expected flit
    in_flight: HashMap<u64, u64>,
    pub delivered_flits: usize,
    pub delivered_packets: usize,
    pub total_latency: Cycle,
}

impl Sink {
    pub fn new(output: usize, delay: Cycle) -> Self {
        Self {
            output,
            delay,
            credits: VecDeque::new(),
            in_flight: HashMap::new(),
            delivered_flits: 0,
            delivered_packets: 0,
            total_latency: 0,
        }
    }

    pub fn receive(&mut self, cycle: Cycle, outputs: usize, flit: Flit) -> anyhow::Result<()> {
        anyhow::ensure!(
            flit.dest % outputs == self.output,
            "Flit {} for destination {} delivered at output {}",
            flit,
            flit.dest,
            self.output
        );
        if flit.head {
            anyhow::ensure!(
                !self.in_flight.contains_key(&flit.packet_id),
                "Packet {} delivered twice",
                flit.packet_id
            );
        } else {
            let expected = self.in_flight.get(&flit.packet_id).copied();
            anyhow::ensure!(
                expected == Some(flit.id),
                "Flit {} of packet {} out of order (expected {:?})",
                flit,
                flit.packet_id,
                expected
            );
        }
        if flit.tail {
            self.in_flight.remove(&flit.packet_id);
            self.delivered_packets += 1;
            self.total_latency += cycle - flit.injected_at;
            if flit.watch {
                log::info!(
                    "{} | packet {} delivered at output {} after {} cycles, {} hops",
                    cycle,
                    flit.packet_id,
                    self.output,
                    cycle - flit.injected_at,
                    flit.hops
                );
            }
        } else {
            self.in_flight.insert(flit.packet_id, flit.id + 1);
        }
        self.delivered_flits += 1;
        self.credits.push_back((cycle + self.delay, flit.vc, flit.tail));
        Ok(())
    }

    /// The credits that are due by `cycle`, as one message.
    pub fn due_credits(&mut self, cycle: Cycle) -> Option<CreditMessage> {
        let mut message: Option<CreditMessage> = None;
        while let Some(&(due, vc, tail)) = self.credits.front() {
            if due > cycle {
                break;
            }
            self.credits.pop_front();
            message
                .get_or_insert_with(|| CreditMessage::new(None))
                .push(vc, tail);
        }
        message
    }

    pub fn is_idle(&self) -> bool {
        self.credits.is_empty() && self.in_flight.is_empty()
    }
}
