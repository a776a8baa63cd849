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


use std::fmt;

use crate::Cycle;

/// The smallest flow-controlled unit of a packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Flit {
    pub id: u64,
    pub packet_id: u64,
    /// The VC the flit occupies on the link it is currently crossing.
    pub vc: usize,
    pub head: bool,
    pub tail: bool,
    /// Packet priority; used as the tie-break weight in switch allocation.
    pub priority: i32,
    pub hops: usize,
    pub source: usize,
    pub dest: usize,
    /// The router (or injection port) that credits for this flit go back to.
    pub from_router: Option<usize>,
    pub injected_at: Cycle,
    /// Trace this flit through the observer hooks.
    pub watch: bool,
}

impl Flit {
    pub fn new(id: u64, packet_id: u64, vc: usize) -> Self {
        Self {
            id,
            packet_id,
            vc,
            head: true,
            tail: true,
            priority: 0,
            hops: 0,
            source: 0,
            dest: 0,
            from_router: None,
            injected_at: 0,
            watch: false,
        }
    }

    /// Build the flits of one packet of `size` flits, numbered from
    /// `first_id`. The first flit is the head, the last one the tail.
    pub fn packet(
        packet_id: u64,
        first_id: u64,
        size: usize,
        vc: usize,
        dest: usize,
        priority: i32,
    ) -> Vec<Flit> {
        assert!(size > 0, "a packet needs at least one flit");
        (0..size)
            .map(|i| Flit {
                head: i == 0,
                tail: i + 1 == size,
                priority,
                dest,
                ..Flit::new(first_id + i as u64, packet_id, vc)
            })
            .collect()
    }
}

impl fmt::Display for Flit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.id)?;
        match (self.head, self.tail) {
            (true, true) => write!(f, "(HT)"),
            (true, false) => write!(f, "(H)"),
            (false, true) => write!(f, "(T)"),
            (false, false) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_marks_head_and_tail() {
        let flits = Flit::packet(7, 100, 3, 1, 2, 5);
        assert_eq!(flits.len(), 3);
        assert!(flits[0].head && !flits[0].tail);
        assert!(!flits[1].head && !flits[1].tail);
        assert!(!flits[2].head && flits[2].tail);
        assert!(flits
            .iter()
            .all(|f| f.packet_id == 7 && f.vc == 1 && f.dest == 2 && f.priority == 5));
        assert_eq!(
            flits.iter().map(|f| f.id).collect::<Vec<_>>(),
            vec![100, 101, 102]
        );
        assert_eq!(format!("{}", flits[0]), "100(H)");
        assert_eq!(format!("{}", Flit::new(4, 4, 0)), "4(HT)");
    }
}
