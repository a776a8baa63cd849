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


use crate::{Cycle, Error};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Seed used by the randomized allocators unless one is configured.
pub const DEFAULT_ALLOCATOR_SEED: u64 = 0x87654321FEDCBA09;

/// The bipartite matching policy used for switch allocation.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum AllocatorKind {
    /// Round-robin priority arbiters at the inputs, then at the outputs.
    SeparableInputFirst,
    /// Priority classes swept with a rotating diagonal wavefront.
    Wavefront,
    /// Parallel iterative matching with seeded random selection.
    Pim,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AllocatorConfiguration {
    pub kind: AllocatorKind,
    pub iterations: usize,
    pub seed: u64,
}

impl Default for AllocatorConfiguration {
    fn default() -> Self {
        Self {
            kind: AllocatorKind::SeparableInputFirst,
            iterations: 1,
            seed: DEFAULT_ALLOCATOR_SEED,
        }
    }
}

/// parameters for an input-queued router
///
/// constructed programmatically or read from a config file.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RouterConfiguration {
    pub inputs: usize,
    pub outputs: usize,
    pub vcs: usize,
    /// Depth of every VC buffer, both at our inputs and downstream.
    pub vc_buffer_size: usize,
    pub input_speedup: usize,
    pub output_speedup: usize,
    /// Must be zero; the split allocator relies on lookahead routing.
    pub routing_delay: Cycle,
    /// Cycles a VC must spend in its current state before the slow path
    /// considers it.
    pub sw_alloc_delay: Cycle,
    pub crossbar_delay: Cycle,
    pub credit_delay: Cycle,
    pub hold_switch_for_packet: bool,
    /// Keep a downstream VC reserved until the tail's credit has returned.
    pub wait_for_tail_credit: bool,
    pub allocator: AllocatorConfiguration,
}

impl Default for RouterConfiguration {
    fn default() -> Self {
        Self {
            inputs: 5,
            outputs: 5,
            vcs: 4,
            vc_buffer_size: 8,
            input_speedup: 1,
            output_speedup: 1,
            routing_delay: 0,
            sw_alloc_delay: 0,
            crossbar_delay: 0,
            credit_delay: 0,
            hold_switch_for_packet: false,
            wait_for_tail_credit: true,
            allocator: AllocatorConfiguration::default(),
        }
    }
}

impl RouterConfiguration {
    /// Check the architectural constraints of the split allocator.
    pub fn validate(&self) -> Result<(), Error> {
        if self.routing_delay != 0 {
            return Err(Error::LookaheadRoutingRequired {
                routing_delay: self.routing_delay,
            });
        }
        let dimensions = [
            ("inputs", self.inputs),
            ("outputs", self.outputs),
            ("vcs", self.vcs),
            ("vc_buffer_size", self.vc_buffer_size),
            ("input_speedup", self.input_speedup),
            ("output_speedup", self.output_speedup),
            ("allocator.iterations", self.allocator.iterations),
        ];
        if let Some((name, _)) = dimensions.iter().find(|(_, value)| *value == 0) {
            return Err(Error::InvalidDimension(*name));
        }
        if self.input_speedup > self.vcs {
            return Err(Error::InvalidSpeedup {
                input_speedup: self.input_speedup,
                vcs: self.vcs,
            });
        }
        Ok(())
    }

    pub fn expanded_inputs(&self) -> usize {
        self.inputs * self.input_speedup
    }

    pub fn expanded_outputs(&self) -> usize {
        self.outputs * self.output_speedup
    }

    pub fn from_file<P: AsRef<Path>>(file_name: P) -> anyhow::Result<Self> {
        let file_name = file_name.as_ref();
        let file = File::open(file_name)
            .with_context(|| format!("Failed to open router config {}", file_name.display()))?;
        let reader = BufReader::new(file);
        serde_yaml::from_reader(reader)
            .with_context(|| format!("Failed to parse router config {}", file_name.display()))
    }

    pub fn from_str(config: &str) -> Result<Self, Error> {
        serde_yaml::from_str(config).map_err(|e| Error::InvalidConfiguration(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_yaml_config() {
        let conf_str = "---
inputs: 2
outputs: 3
vcs: 4
vc_buffer_size: 6
input_speedup: 2
output_speedup: 1
sw_alloc_delay: 1
crossbar_delay: 2
hold_switch_for_packet: true
allocator:
  kind: Wavefront
  iterations: 2
";
        let config = RouterConfiguration::from_str(conf_str).unwrap();
        assert_eq!(config.inputs, 2);
        assert_eq!(config.outputs, 3);
        assert_eq!(config.vcs, 4);
        assert_eq!(config.vc_buffer_size, 6);
        assert_eq!(config.input_speedup, 2);
        assert_eq!(config.sw_alloc_delay, 1);
        assert_eq!(config.crossbar_delay, 2);
        assert!(config.hold_switch_for_packet);
        // unspecified fields keep their defaults
        assert_eq!(config.routing_delay, 0);
        assert_eq!(config.credit_delay, 0);
        assert!(config.wait_for_tail_credit);
        assert_eq!(config.allocator.kind, AllocatorKind::Wavefront);
        assert_eq!(config.allocator.iterations, 2);
        assert_eq!(config.allocator.seed, DEFAULT_ALLOCATOR_SEED);
        assert_eq!(config.expanded_inputs(), 4);
        assert_eq!(config.expanded_outputs(), 3);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn write_yaml_config() {
        let mut config = RouterConfiguration::default();
        config.allocator.kind = AllocatorKind::Pim;
        let yaml = serde_yaml::to_string(&config).unwrap();
        println!("{}", yaml);
        assert_eq!(RouterConfiguration::from_str(&yaml).unwrap(), config);
    }

    #[test]
    fn rejects_routing_delay() {
        let config = RouterConfiguration {
            routing_delay: 1,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(Error::LookaheadRoutingRequired { routing_delay: 1 })
        );
    }

    #[test]
    fn rejects_degenerate_dimensions() {
        let config = RouterConfiguration {
            vcs: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(Error::InvalidDimension("vcs")));
        let config = RouterConfiguration {
            vcs: 2,
            input_speedup: 3,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(Error::InvalidSpeedup {
                input_speedup: 3,
                vcs: 2
            })
        );
    }

    #[test]
    fn malformed_yaml_is_a_configuration_error() {
        match RouterConfiguration::from_str("inputs: [1, 2") {
            Err(Error::InvalidConfiguration(_)) => (),
            other => panic!("unexpected result {:?}", other),
        }
    }
}
