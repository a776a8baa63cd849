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


use std::collections::{HashMap, HashSet, VecDeque};

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use router::{AllocatorConfiguration, AllocatorKind, CreditMessage, CycleReport};
use router::{DestinationRouting, DownstreamBufferState, Flit, Router, RouterConfiguration};

const CREDIT_DELAY: usize = 2;

/// Random traffic around a single router, checking the allocation
/// invariants after every cycle.
struct Testbench {
    router: Router,
    rng: Xoshiro256StarStar,
    rate: f64,
    /// Per input, per VC: flits waiting to enter the router.
    pending: Vec<Vec<VecDeque<Flit>>>,
    /// (due cycle, output, credit)
    credits: VecDeque<(usize, usize, CreditMessage)>,
    next_packet: u64,
    next_flit: u64,
    injected: usize,
    delivered: usize,
    /// packet id -> id of the next flit expected at the sink.
    expected: HashMap<u64, u64>,
}

impl Testbench {
    fn new(config: RouterConfiguration, rate: f64, seed: u64) -> Self {
        let routing = DestinationRouting::new(config.outputs, config.vcs);
        let pending = vec![vec![VecDeque::new(); config.vcs]; config.inputs];
        Self {
            router: Router::new(0, &config, Box::new(routing)).unwrap(),
            rng: Xoshiro256StarStar::seed_from_u64(seed),
            rate,
            pending,
            credits: VecDeque::new(),
            next_packet: 0,
            next_flit: 0,
            injected: 0,
            delivered: 0,
            expected: HashMap::new(),
        }
    }

    fn inject(&mut self, generate: bool) {
        let config = self.router.config().clone();
        for input in 0..config.inputs {
            if generate && self.rng.gen_bool(self.rate) {
                let vc = self.rng.gen_range(0..config.vcs);
                if self.pending[input][vc].is_empty() {
                    let size = self.rng.gen_range(1..=4);
                    let dest = self.rng.gen_range(0..config.outputs);
                    let priority = self.rng.gen_range(0..2);
                    let flits = Flit::packet(
                        self.next_packet,
                        self.next_flit,
                        size,
                        vc,
                        dest,
                        priority,
                    );
                    self.expected.insert(self.next_packet, self.next_flit);
                    self.next_packet += 1;
                    self.next_flit += size as u64;
                    self.pending[input][vc].extend(flits);
                }
            }
            for vc in 0..config.vcs {
                if self.router.input_buffer(input).occupancy(vc) < config.vc_buffer_size {
                    if let Some(flit) = self.pending[input][vc].pop_front() {
                        self.router.write_flit(input, flit).unwrap();
                        self.injected += 1;
                    }
                }
            }
        }
    }

    fn drain(&mut self) {
        let config = self.router.config().clone();
        let cycle = self.router.cycle();
        while let Some(&(due, _, _)) = self.credits.front() {
            if due > cycle {
                break;
            }
            if let Some((_, output, credit)) = self.credits.pop_front() {
                self.router.write_credit(output, &credit).unwrap();
            }
        }
        for output in 0..config.outputs {
            while let Some(flit) = self.router.read_flit(output) {
                assert_eq!(flit.dest % config.outputs, output);
                let expected = self.expected.get_mut(&flit.packet_id).unwrap();
                assert_eq!(flit.id, *expected, "flit out of order");
                *expected += 1;
                self.delivered += 1;
                let mut credit = CreditMessage::new(None);
                credit.push(flit.vc, flit.tail);
                self.credits.push_back((cycle + CREDIT_DELAY, output, credit));
            }
        }
        for input in 0..config.inputs {
            self.router.read_credit(input);
        }
    }

    fn step(&mut self, generate: bool) -> CycleReport {
        self.inject(generate);
        let report = self.router.step().unwrap();
        self.check(&report);
        self.drain();
        report
    }

    fn check(&self, report: &CycleReport) {
        let config = self.router.config();
        let core = self.router.core();

        // The grants form a partial injection.
        let inputs: HashSet<_> = report.grants.iter().map(|g| g.expanded_input).collect();
        let outputs: HashSet<_> = report.grants.iter().map(|g| g.expanded_output).collect();
        assert_eq!(inputs.len(), report.grants.len());
        assert_eq!(outputs.len(), report.grants.len());

        for grant in &report.grants {
            assert_eq!(grant.output, grant.expanded_output / config.output_speedup);
            assert_eq!(
                grant.expanded_input,
                grant.input * config.input_speedup + grant.vc % config.input_speedup
            );
            // The downstream VC stays reserved until its packet is gone.
            if !grant.tail {
                assert!(!self.router.downstream(grant.output).is_available(grant.output_vc));
            }
        }

        for input in 0..config.inputs {
            let flagged = (0..config.vcs)
                .filter(|&vc| core.fast_path_enabled(input, vc))
                .count();
            assert!(flagged <= 1, "input {} has {} fast-path VCs", input, flagged);

            let grants: Vec<_> = report.grants.iter().filter(|g| g.input == input).collect();
            let credit = report.credits.iter().find(|(i, _)| *i == input);
            match credit {
                Some((_, credit)) => {
                    assert_eq!(credit.len(), grants.len());
                    assert_eq!(
                        credit.released_vcs(),
                        grants.iter().filter(|g| g.tail).count()
                    );
                }
                None => assert!(grants.is_empty()),
            }
        }

        for expanded_input in 0..config.expanded_inputs() {
            if let Some(hold) = core.switch_hold(expanded_input) {
                assert_eq!(
                    core.switch_hold_owner(hold.expanded_output),
                    Some(expanded_input)
                );
            }
        }
        for expanded_output in 0..config.expanded_outputs() {
            if let Some(owner) = core.switch_hold_owner(expanded_output) {
                assert_eq!(
                    core.switch_hold(owner).map(|h| h.expanded_output),
                    Some(expanded_output)
                );
            }
        }
    }

    fn run(&mut self, cycles: usize) {
        for _ in 0..cycles {
            self.step(true);
        }
        for _ in 0..500 {
            self.step(false);
            if self.pending.iter().flatten().all(VecDeque::is_empty) && self.router.is_idle() {
                break;
            }
        }
        assert_eq!(self.delivered, self.injected);
        assert!(self.router.is_idle());
    }
}

fn configurations() -> Vec<RouterConfiguration> {
    let mut configs = Vec::new();
    for kind in [
        AllocatorKind::SeparableInputFirst,
        AllocatorKind::Wavefront,
        AllocatorKind::Pim,
    ] {
        for (input_speedup, hold_switch_for_packet) in [(1, false), (2, true), (2, false)] {
            configs.push(RouterConfiguration {
                inputs: 4,
                outputs: 4,
                vcs: 4,
                vc_buffer_size: 4,
                input_speedup,
                hold_switch_for_packet,
                allocator: AllocatorConfiguration {
                    kind,
                    iterations: 2,
                    ..Default::default()
                },
                ..Default::default()
            });
        }
    }
    configs
}

#[test]
fn random_traffic_keeps_invariants() {
    let _ = env_logger::builder().is_test(true).try_init();
    for (seed, config) in configurations().into_iter().enumerate() {
        let mut bench = Testbench::new(config, 0.3, seed as u64);
        bench.run(1000);
        assert!(bench.delivered > 0);
    }
}

#[test]
fn allocation_delay_and_pipelines_keep_invariants() {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = RouterConfiguration {
        inputs: 3,
        outputs: 3,
        vcs: 2,
        sw_alloc_delay: 2,
        crossbar_delay: 1,
        credit_delay: 1,
        wait_for_tail_credit: false,
        ..Default::default()
    };
    let mut bench = Testbench::new(config, 0.5, 42);
    bench.run(500);
}

#[test]
fn saturated_output_is_shared_fairly() {
    let _ = env_logger::builder().is_test(true).try_init();
    const INPUTS: usize = 4;
    let config = RouterConfiguration {
        inputs: INPUTS,
        outputs: 1,
        vcs: 4,
        wait_for_tail_credit: false,
        ..Default::default()
    };
    let mut router = Router::new(0, &config, Box::new(DestinationRouting::new(1, 4))).unwrap();
    let mut next_id = 0;
    let mut grants = vec![0; INPUTS];
    for _ in 0..10 * INPUTS {
        for input in 0..INPUTS {
            while router.input_buffer(input).occupancy(0) < config.vc_buffer_size {
                router.write_flit(input, Flit::new(next_id, next_id, 0)).unwrap();
                next_id += 1;
            }
        }
        let report = router.step().unwrap();
        assert_eq!(report.grants.len(), 1);
        grants[report.grants[0].input] += 1;
        while let Some(flit) = router.read_flit(0) {
            let mut credit = CreditMessage::new(None);
            credit.push(flit.vc, flit.tail);
            router.write_credit(0, &credit).unwrap();
        }
        assert!((0..4).all(|vc| router.downstream(0).occupancy(vc) == 0));
    }
    assert_eq!(grants, vec![10; INPUTS]);
}
