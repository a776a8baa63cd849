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


use std::cell::RefCell;
use std::rc::Rc;

use router::{AllocationObserver, CreditMessage, Cycle, DestinationRouting};
use router::{DownstreamBufferState, Error, FixedRouting, Flit, GrantPath, OutputSet};
use router::{RequestPath, Router, RouterConfiguration, SwitchRequest, VcState};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Shares the submitted requests with the test body.
#[derive(Clone, Default)]
struct RequestLog(Rc<RefCell<Vec<(Cycle, SwitchRequest, RequestPath)>>>);

impl AllocationObserver for RequestLog {
    fn request_submitted(
        &mut self,
        cycle: Cycle,
        request: &SwitchRequest,
        path: RequestPath,
        _flit: &Flit,
    ) {
        self.0.borrow_mut().push((cycle, *request, path));
    }
}

fn fixed_route(output: usize, vc: usize, priority: i32) -> Box<FixedRouting> {
    let mut set = OutputSet::new();
    set.add(output, vc, priority);
    Box::new(FixedRouting(set))
}

#[test]
fn grant_on_expanded_output() {
    init_logging();
    let config = RouterConfiguration {
        inputs: 2,
        outputs: 2,
        vcs: 2,
        input_speedup: 1,
        output_speedup: 2,
        ..Default::default()
    };
    let requests = RequestLog::default();
    let routing = |_: usize, _: &Flit| {
        let mut set = OutputSet::new();
        set.add(1, 0, 5);
        set
    };
    let mut router = Router::new(0, &config, Box::new(routing))
        .unwrap()
        .with_observer(Box::new(requests.clone()));

    for flit in Flit::packet(0, 0, 2, 0, 1, 0) {
        router.write_flit(0, flit).unwrap();
    }
    let report = router.step().unwrap();

    let submitted = requests.0.borrow().clone();
    assert_eq!(submitted.len(), 1);
    let (_, request, path) = submitted[0];
    assert_eq!(path, RequestPath::Slow);
    assert_eq!(request.expanded_input, 0);
    assert_eq!(request.expanded_output, 2);
    assert_eq!(request.in_priority, 5);

    assert_eq!(report.grants.len(), 1);
    assert_eq!(report.grants[0].expanded_output, 2);
    assert_eq!(router.input_buffer(0).state(0), VcState::Active);
    assert_eq!(router.input_buffer(0).output(0), Some((1, 0)));
    assert!(!router.downstream(1).is_available(0));

    assert_eq!(report.credits.len(), 1);
    let (input, credit) = &report.credits[0];
    assert_eq!(*input, 0);
    assert_eq!(credit.len(), 1);
    assert_eq!(router.read_flit(1).map(|f| f.id), Some(0));
}

#[test]
fn contention_for_one_downstream_vc() {
    init_logging();
    let config = RouterConfiguration {
        inputs: 2,
        outputs: 1,
        vcs: 1,
        wait_for_tail_credit: false,
        ..Default::default()
    };
    let mut router = Router::new(0, &config, fixed_route(0, 0, 0)).unwrap();
    router.write_flit(0, Flit::new(0, 0, 0)).unwrap();
    router.write_flit(1, Flit::new(1, 1, 0)).unwrap();

    let first = router.step().unwrap();
    assert_eq!(first.grants.len(), 1);
    let winner = first.grants[0].input;
    let loser = 1 - winner;
    assert_eq!(router.input_buffer(loser).state(0), VcState::VcAlloc);
    assert_eq!(router.input_buffer(loser).occupancy(0), 1);

    let second = router.step().unwrap();
    assert_eq!(second.grants.len(), 1);
    assert_eq!(second.grants[0].input, loser);
}

#[test]
fn emptied_vc_uses_the_fast_path() {
    init_logging();
    let config = RouterConfiguration {
        inputs: 2,
        outputs: 2,
        vcs: 2,
        ..Default::default()
    };
    let requests = RequestLog::default();
    let mut router = Router::new(0, &config, fixed_route(1, 1, 0))
        .unwrap()
        .with_observer(Box::new(requests.clone()));
    let mut flits = Flit::packet(0, 0, 3, 1, 1, 0).into_iter();

    router.write_flit(0, flits.next().unwrap()).unwrap();
    let report = router.step().unwrap();
    assert_eq!(report.grants[0].path, GrantPath::Slow);
    assert!(router.core().fast_path_enabled(0, 1));

    router.write_flit(0, flits.next().unwrap()).unwrap();
    let report = router.step().unwrap();
    assert_eq!(report.fast_path[0], Some(1));
    assert_eq!(report.grants.len(), 1);
    assert_eq!(report.grants[0].path, GrantPath::Fast);
    assert!(router.core().fast_path_enabled(0, 1));
    assert!(requests
        .0
        .borrow()
        .iter()
        .all(|(_, request, _)| request.expanded_output == 1));
}

#[test]
fn switch_hold_for_a_whole_packet() {
    init_logging();
    let config = RouterConfiguration {
        inputs: 2,
        outputs: 2,
        vcs: 2,
        hold_switch_for_packet: true,
        ..Default::default()
    };
    let routing = DestinationRouting::new(2, 2);
    let mut router = Router::new(0, &config, Box::new(routing)).unwrap();
    for flit in Flit::packet(0, 0, 3, 0, 1, 0) {
        router.write_flit(0, flit).unwrap();
    }
    router.write_flit(1, Flit { dest: 1, ..Flit::new(10, 1, 0) }).unwrap();

    let head = router.step().unwrap();
    assert_eq!(head.grants.len(), 1);
    assert_eq!(head.grants[0].input, 0);
    let pair = (head.grants[0].expanded_input, head.grants[0].expanded_output);
    let hold = router.core().switch_hold(pair.0).unwrap();
    assert_eq!(hold.expanded_output, pair.1);
    assert_eq!(router.core().switch_hold_owner(pair.1), Some(pair.0));

    for _ in 0..2 {
        let report = router.step().unwrap();
        assert_eq!(report.grants.len(), 1);
        let grant = report.grants[0];
        assert_eq!((grant.expanded_input, grant.expanded_output), pair);
        assert_eq!(grant.path, GrantPath::Held);
    }
    assert_eq!(router.core().switch_hold(pair.0), None);
    assert_eq!(router.core().switch_hold_owner(pair.1), None);

    // The other input only now gets the output, on a second downstream VC.
    let report = router.step().unwrap();
    assert_eq!(report.grants.len(), 1);
    assert_eq!(report.grants[0].input, 1);
    assert_eq!(report.grants[0].output_vc, 1);
}

#[test]
fn routing_delay_is_rejected() {
    init_logging();
    let config = RouterConfiguration {
        routing_delay: 2,
        ..Default::default()
    };
    let routing = DestinationRouting::new(config.outputs, config.vcs);
    match Router::new(0, &config, Box::new(routing)) {
        Err(err @ Error::LookaheadRoutingRequired { .. }) => {
            assert!(err.to_string().contains("lookahead routing"));
            assert!(!err.is_invariant_violation());
        }
        Err(err) => panic!("unexpected error {}", err),
        Ok(_) => panic!("router built with a routing delay"),
    }
}

#[test]
fn credits_release_downstream_vcs() {
    init_logging();
    let config = RouterConfiguration {
        inputs: 1,
        outputs: 1,
        vcs: 1,
        vc_buffer_size: 2,
        ..Default::default()
    };
    let mut router = Router::new(0, &config, fixed_route(0, 0, 0)).unwrap();
    let mut flits = Flit::packet(0, 0, 3, 0, 0, 0).into_iter();
    for flit in flits.by_ref().take(2) {
        router.write_flit(0, flit).unwrap();
    }
    assert_eq!(router.step().unwrap().grants.len(), 1);
    router.write_flit(0, flits.next().unwrap()).unwrap();
    assert_eq!(router.step().unwrap().grants.len(), 1);
    // Two flits downstream fill the VC.
    assert!(router.downstream(0).is_full(0));
    assert!(router.step().unwrap().grants.is_empty());

    let mut credit = CreditMessage::new(None);
    credit.push(0, false);
    router.write_credit(0, &credit).unwrap();
    let report = router.step().unwrap();
    assert_eq!(report.grants.len(), 1);
    assert!(report.grants[0].tail);
    assert_eq!(report.credits[0].1.released_vcs(), 1);
}
