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


use env_logger::Target;
use std::path::PathBuf;
use structopt::StructOpt;

use splitsim::Config;

#[derive(StructOpt)]
#[structopt(
    name = "splitsim",
    about = "Drive a single router with the split switch allocator"
)]
struct Arguments {
    /// YAML file with `router` and `traffic` sections
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,
    /// Overrides the number of injection cycles
    #[structopt(long)]
    cycles: Option<usize>,
    /// Overrides the injection rate, in flits per cycle per input
    #[structopt(short, long)]
    rate: Option<f64>,
    #[structopt(short, long)]
    packet_size: Option<usize>,
    /// Dump allocation signals to this VCD file
    #[structopt(long, parse(from_os_str))]
    vcd: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Arguments::from_args();

    env_logger::builder()
        .filter(Some("splitsim"), log::LevelFilter::Info)
        .target(Target::Stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(cycles) = args.cycles {
        config.traffic.injection_cycles = cycles;
    }
    if let Some(rate) = args.rate {
        config.traffic.injection_rate = rate;
    }
    if let Some(size) = args.packet_size {
        config.traffic.packet_size = size;
    }

    let report = splitsim::run_simulation(&config, args.vcd)?;
    println!("{}", report);
    println!(
        "throughput:        {:.3} flits/cycle/output",
        report.throughput(config.router.outputs)
    );
    Ok(())
}
