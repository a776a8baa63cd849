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


//! A single-router testbench for the split switch-allocation core.
//!
//! Every router input is fed by a [`traffic::Source`] that injects fixed-size
//! packets with uniformly random destinations at a configurable flit rate;
//! every output is drained by a [`traffic::Sink`] that checks per-packet flit
//! order and hands credits back after a fixed delay. Sources obey the credits
//! the router returns, so the run exercises the whole flow-control loop.
//!
//! The run injects for `injection_cycles`, then keeps stepping for up to
//! `drain_cycles` until everything injected has been delivered.
//!
use anyhow::Context;
use router::{
    AllocationObserver, DestinationRouting, Router, RouterConfiguration, VcdObserver,
    WatchLogger,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub mod traffic;

use traffic::{Ids, Sink, Source};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrafficConfiguration {
    /// Offered load in flits per cycle per input.
    pub injection_rate: f64,
    pub packet_size: usize,
    pub seed: u64,
    pub injection_cycles: usize,
    pub drain_cycles: usize,
    /// Cycles between a flit reaching a sink and its credit reaching the router.
    pub sink_delay: usize,
    /// Packets to trace through the router.
    pub watch_packets: Vec<u64>,
}

impl Default for TrafficConfiguration {
    fn default() -> Self {
        Self {
            injection_rate: 0.4,
            packet_size: 4,
            seed: 1,
            injection_cycles: 2000,
            drain_cycles: 1000,
            sink_delay: 1,
            watch_packets: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub router: RouterConfiguration,
    pub traffic: TrafficConfiguration,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(file_name: P) -> anyhow::Result<Self> {
        let file_name = file_name.as_ref();
        let file = File::open(file_name)
            .with_context(|| format!("Failed to open config {}", file_name.display()))?;
        serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse config {}", file_name.display()))
    }

    pub fn from_str(config: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(config).context("Failed to parse config")
    }

    fn validate(&self) -> anyhow::Result<()> {
        self.router.validate()?;
        let traffic = &self.traffic;
        anyhow::ensure!(
            (0.0..=1.0).contains(&traffic.injection_rate),
            "Injection rate {} is not in [0, 1]",
            traffic.injection_rate
        );
        anyhow::ensure!(traffic.packet_size > 0, "Packets need at least one flit");
        Ok(())
    }
}

/// Totals of one run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Report {
    pub cycles: usize,
    pub injected_packets: usize,
    pub injected_flits: usize,
    pub delivered_packets: usize,
    pub delivered_flits: usize,
    pub total_latency: usize,
}

impl Report {
    /// Accepted flits per cycle per output.
    pub fn throughput(&self, outputs: usize) -> f64 {
        if self.cycles == 0 || outputs == 0 {
            return 0.0;
        }
        self.delivered_flits as f64 / (self.cycles * outputs) as f64
    }

    /// Mean head injection to tail delivery latency, in cycles.
    pub fn mean_latency(&self) -> f64 {
        if self.delivered_packets == 0 {
            return 0.0;
        }
        self.total_latency as f64 / self.delivered_packets as f64
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "cycles:            {}", self.cycles)?;
        writeln!(
            f,
            "packets:           {} injected, {} delivered",
            self.injected_packets, self.delivered_packets
        )?;
        writeln!(
            f,
            "flits:             {} injected, {} delivered",
            self.injected_flits, self.delivered_flits
        )?;
        write!(f, "mean latency:      {:.2}", self.mean_latency())
    }
}

pub struct Simulation {
    router: Router,
    sources: Vec<Source>,
    sinks: Vec<Sink>,
    ids: Ids,
    traffic: TrafficConfiguration,
}

impl Simulation {
    pub fn new(config: &Config, vcd: Option<PathBuf>) -> anyhow::Result<Self> {
        config.validate()?;
        let rc = &config.router;
        let routing = Box::new(DestinationRouting::new(rc.outputs, rc.vcs));
        let mut router = Router::new(0, rc, routing)?;
        if let Some(path) = vcd {
            let vcd = VcdObserver::from_path(path.clone(), rc)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let observers: Vec<Box<dyn AllocationObserver>> =
                vec![Box::new(WatchLogger), Box::new(vcd)];
            router = router.with_observer(Box::new(observers));
        }
        let traffic = config.traffic.clone();
        let sources = (0..rc.inputs)
            .map(|input| {
                Source::new(
                    input,
                    traffic.seed,
                    traffic.injection_rate,
                    traffic.packet_size,
                    &router,
                )
            })
            .collect();
        let sinks = (0..rc.outputs)
            .map(|output| Sink::new(output, traffic.sink_delay))
            .collect();
        Ok(Self {
            router,
            sources,
            sinks,
            ids: Ids::default(),
            traffic,
        })
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    fn step(&mut self, inject: bool) -> anyhow::Result<()> {
        let cycle = self.router.cycle();
        for (output, sink) in self.sinks.iter_mut().enumerate() {
            if let Some(credit) = sink.due_credits(cycle) {
                self.router.write_credit(output, &credit)?;
            }
        }
        for (input, source) in self.sources.iter_mut().enumerate() {
            if let Some(credit) = self.router.read_credit(input) {
                source.receive_credit(&credit)?;
            }
            if inject {
                source.generate(cycle, &mut self.ids, &self.traffic.watch_packets);
            }
            source.send(&mut self.router)?;
        }
        self.router.step()?;
        let outputs = self.router.config().outputs;
        for (output, sink) in self.sinks.iter_mut().enumerate() {
            while let Some(flit) = self.router.read_flit(output) {
                sink.receive(cycle, outputs, flit)?;
            }
        }
        Ok(())
    }

    fn is_drained(&self) -> bool {
        self.router.is_idle()
            && self.sources.iter().all(|s| s.backlog() == 0)
            && self.sinks.iter().all(Sink::is_idle)
    }

    pub fn report(&self) -> Report {
        let mut report = Report {
            cycles: self.router.cycle(),
            ..Report::default()
        };
        for source in &self.sources {
            report.injected_packets += source.injected_packets;
            report.injected_flits += source.injected_flits;
        }
        for sink in &self.sinks {
            report.delivered_packets += sink.delivered_packets;
            report.delivered_flits += sink.delivered_flits;
            report.total_latency += sink.total_latency;
        }
        report
    }

    pub fn run(&mut self) -> anyhow::Result<Report> {
        for _ in 0..self.traffic.injection_cycles {
            self.step(true)?;
        }
        log::info!(
            "Injection done after {} cycles, draining",
            self.router.cycle()
        );
        for _ in 0..self.traffic.drain_cycles {
            if self.is_drained() {
                break;
            }
            self.step(false)?;
        }
        let report = self.report();
        anyhow::ensure!(
            self.is_drained(),
            "Router did not drain within {} cycles: {} of {} packets delivered",
            self.traffic.drain_cycles,
            report.delivered_packets,
            report.injected_packets
        );
        Ok(report)
    }
}

/// Build and run a simulation; optionally dump allocation signals to `vcd`.
pub fn run_simulation(config: &Config, vcd: Option<PathBuf>) -> anyhow::Result<Report> {
    let mut simulation = Simulation::new(config, vcd)?;
    let report = simulation.run()?;
    log::info!(
        "Throughput {:.3} flits/cycle/output",
        report.throughput(config.router.outputs)
    );
    Ok(report)
}
