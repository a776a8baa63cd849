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


//! Switch allocation for an input-queued virtual-channel router with split
//! (slow-path / fast-path) switch requests.
//!
//! The crate is organised around [`SplitAllocator`], which runs one cycle of
//! request construction, bipartite matching and grant commit against the
//! input buffers and downstream buffer state owned by a [`Router`]. Everything
//! the allocator talks to sits behind a small trait so the surrounding
//! simulator can substitute its own implementation.

mod allocator;
mod buffer;
mod buffer_state;
mod config;
mod credit;
mod error;
mod flit;
mod observer;
mod pipeline;
mod router;
mod routing;
mod split;
mod vcd;

// type to use for cycles
pub type Cycle = usize;

pub use crate::allocator::{new_allocator, BipartiteAllocator, SwitchRequest};
pub use crate::allocator::{PimAllocator, SeparableInputFirstAllocator, WavefrontAllocator};
pub use crate::buffer::{InputBuffer, VcState};
pub use crate::buffer_state::{BufferState, DownstreamBufferState};
pub use crate::config::{AllocatorConfiguration, AllocatorKind, RouterConfiguration};
pub use crate::credit::{CreditEntry, CreditMessage};
pub use crate::error::Error;
pub use crate::flit::Flit;
pub use crate::observer::{AllocationObserver, DenyReason, Grant, GrantPath, RequestPath};
pub use crate::observer::{NullObserver, WatchLogger};
pub use crate::pipeline::{CreditTransport, CrossbarTransport, Pipeline};
pub use crate::router::Router;
pub use crate::routing::{DestinationRouting, FixedRouting, OutputSet};
pub use crate::routing::{RouteCandidate, RouteCandidateProvider};
pub use crate::split::{CycleReport, RouterPorts, SplitAllocator, SwitchHold};
pub use crate::vcd::{VcdObserver, VcdWriter};
