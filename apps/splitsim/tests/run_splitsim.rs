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


use splitsim::{run_simulation, Config};
use std::path::PathBuf;

fn default_config() -> Config {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("configs/default.yaml");
    Config::from_file(path).unwrap()
}

#[test]
fn default_config_runs_to_completion() {
    let mut config = default_config();
    config.traffic.injection_cycles = 300;
    let report = run_simulation(&config, None).unwrap();
    assert!(report.injected_packets > 0);
    assert_eq!(report.injected_packets, report.delivered_packets);
    assert!(report.throughput(config.router.outputs) > 0.0);
}

#[test]
fn speedup_and_switch_hold() {
    let mut config = default_config();
    config.router.input_speedup = 2;
    config.router.hold_switch_for_packet = true;
    config.router.crossbar_delay = 2;
    config.router.credit_delay = 2;
    config.router.sw_alloc_delay = 1;
    config.traffic.injection_cycles = 300;
    config.traffic.sink_delay = 3;
    let report = run_simulation(&config, None).unwrap();
    assert_eq!(report.injected_flits, report.delivered_flits);
}

#[test]
fn vcd_dump() {
    let mut config = default_config();
    config.traffic.injection_cycles = 50;
    let path = std::env::temp_dir().join(format!("splitsim-{}.vcd", std::process::id()));
    run_simulation(&config, Some(path.clone())).unwrap();
    let dump = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert!(dump.contains("$enddefinitions"));
    assert!(dump.contains("ei0_grant"));
}
