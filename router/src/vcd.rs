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


use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::io;
use std::path;

use crate::{AllocationObserver, Cycle, Grant, RouterConfiguration};

pub const DEFAULT_TOP_MODULE: &str = "router";
const DEFAULT_VCD_HEADER: &str = "split router VCD";

/// Thin wrapper around `vcd::Writer` that tracks scopes and only records
/// actual value changes. IO errors are logged once and then tracing stops.
pub struct VcdWriter {
    writer: vcd::Writer<Box<dyn io::Write>>,
    is_error_state: bool,
    scope_stack: Vec<String>,
    id_map: HashMap<String, (vcd::IdCode, usize)>,
    last_value_map: HashMap<vcd::IdCode, u64>,
}

impl VcdWriter {
    pub fn new(dst: path::PathBuf) -> io::Result<Self> {
        let dst_file = fs::File::create(&dst)?;
        log::debug!("VCD file: {}", dst.display());
        Ok(Self::from_writer(Box::new(io::BufWriter::new(dst_file))))
    }

    pub fn from_writer(writer: Box<dyn io::Write>) -> Self {
        Self {
            writer: vcd::Writer::new(writer),
            is_error_state: false,
            scope_stack: vec![],
            id_map: HashMap::new(),
            last_value_map: HashMap::new(),
        }
    }

    fn vcd_error_handler(&mut self, err: io::Error) {
        if !self.is_error_state {
            self.is_error_state = true;
            log::error!("VCD writing failed with error {:?}", err)
        }
    }

    fn guarded<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Self) -> io::Result<()>,
    {
        if self.is_error_state {
            return;
        }
        f(self).unwrap_or_else(|err| self.vcd_error_handler(err));
    }

    pub fn write_header(&mut self) {
        self.guarded(|this| {
            this.writer.comment(DEFAULT_VCD_HEADER)?;
            this.writer.date(chrono::Utc::now().to_string().as_str())
        });
    }

    pub fn add_module<T: Display + ?Sized>(&mut self, name: &T) {
        self.guarded(|this| {
            this.writer.add_module(&name.to_string())?;
            this.scope_stack.push(name.to_string());
            Ok(())
        });
    }

    pub fn upscope(&mut self) {
        self.guarded(|this| {
            this.scope_stack.pop();
            this.writer.upscope()
        });
    }

    /// Declare an integer signal as wide as `T`.
    pub fn add_integer_var<T: Sized>(&mut self, reference: &str) {
        let width = std::mem::size_of::<T>() * 8;
        self.guarded(|this| {
            let var_id =
                this.writer
                    .add_var(vcd::VarType::Integer, width as u32, reference, None)?;
            let scoped_name = this.scoped_name(reference);
            if this.id_map.insert(scoped_name.clone(), (var_id, width)).is_some() {
                log::warn!("Scoped name {} was redefined for VCD dumps.", scoped_name);
            }
            Ok(())
        });
    }

    pub fn enddefinitions(&mut self) {
        self.guarded(|this| this.writer.enddefinitions());
    }

    pub fn timestamp(&mut self, cycle: Cycle) {
        self.guarded(|this| this.writer.timestamp(cycle as u64));
    }

    /// Record `value` for the signal `name` in the current scope.
    pub fn change_integer(&mut self, name: &str, value: u64) {
        let scoped_name = self.scoped_name(name);
        let (id_code, width) = match self.id_map.get(scoped_name.as_str()) {
            Some(entry) => *entry,
            None => {
                log::warn!("No such scoped name {} was defined for VCD dumps.", scoped_name);
                return;
            }
        };
        if self.last_value_map.get(&id_code) == Some(&value) {
            return;
        }
        if cfg!(feature = "trace-echo-vcd-signal-changes") {
            log::trace!("VCD changing {} to {}", scoped_name, value);
        }
        self.guarded(|this| {
            let bits: Vec<vcd::Value> = (0..width)
                .rev()
                .map(|bit| (bit < 64 && (value >> bit) & 1 == 1).into())
                .collect();
            this.writer.change_vector(id_code, &bits)?;
            this.last_value_map.insert(id_code, value);
            Ok(())
        });
    }

    /// Resolve later signal names relative to `name` without declaring it.
    pub fn enter_scope<T: Display + ?Sized>(&mut self, name: &T) {
        self.scope_stack.push(name.to_string())
    }

    fn scoped_name(&self, name: &str) -> String {
        self.scope_stack.join(".") + "." + name
    }
}

/// Dumps per-cycle crossbar grants and fast-path selections as a waveform.
///
/// `ei<n>_grant` holds the granted expanded output plus one (zero when idle),
/// `in<n>_fast_vc` the fast-path VC plus one.
pub struct VcdObserver {
    writer: VcdWriter,
    grants: Vec<u64>,
    fast_vcs: Vec<u64>,
}

impl VcdObserver {
    pub fn new(mut writer: VcdWriter, config: &RouterConfiguration) -> Self {
        let grants = vec![0; config.expanded_inputs()];
        let fast_vcs = vec![0; config.inputs];
        writer.write_header();
        writer.add_module(DEFAULT_TOP_MODULE);
        writer.add_integer_var::<u64>("sim_cycles");
        for expanded_input in 0..grants.len() {
            writer.add_integer_var::<u32>(&format!("ei{}_grant", expanded_input));
        }
        for input in 0..fast_vcs.len() {
            writer.add_integer_var::<u32>(&format!("in{}_fast_vc", input));
        }
        writer.upscope();
        writer.enddefinitions();
        writer.enter_scope(DEFAULT_TOP_MODULE);
        Self {
            writer,
            grants,
            fast_vcs,
        }
    }

    pub fn from_path(dst: path::PathBuf, config: &RouterConfiguration) -> io::Result<Self> {
        Ok(Self::new(VcdWriter::new(dst)?, config))
    }
}

impl AllocationObserver for VcdObserver {
    fn grant_committed(&mut self, _cycle: Cycle, grant: &Grant, _flit: &crate::Flit) {
        self.grants[grant.expanded_input] = grant.expanded_output as u64 + 1;
    }

    fn fast_path_changed(&mut self, _cycle: Cycle, input: usize, vc: usize, enabled: bool) {
        if enabled {
            self.fast_vcs[input] = vc as u64 + 1;
        } else if self.fast_vcs[input] == vc as u64 + 1 {
            self.fast_vcs[input] = 0;
        }
    }

    fn cycle_completed(&mut self, cycle: Cycle) {
        self.writer.timestamp(cycle);
        self.writer.change_integer("sim_cycles", cycle as u64);
        for (expanded_input, grant) in self.grants.iter_mut().enumerate() {
            self.writer
                .change_integer(&format!("ei{}_grant", expanded_input), *grant);
            *grant = 0;
        }
        for (input, fast_vc) in self.fast_vcs.iter().enumerate() {
            self.writer
                .change_integer(&format!("in{}_fast_vc", input), *fast_vc);
        }
    }
}
