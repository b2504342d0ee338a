//! Fuzzing the cell subscription lifecycle against a counting oracle:
//! arbitrary interleavings of set/subscribe/drop/cancel/clear must keep
//! every listener's delivery count, the live-listener count, and the
//! version in lockstep with a straight-line model.

#![no_main]

use std::cell::Cell;
use std::rc::Rc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rootward_cell::{Subscription, ValueCell};

#[derive(Arbitrary, Debug, Clone, Copy)]
enum Op {
    Set(i16),
    NotifyAll,
    Subscribe,
    DropNewest,
    DropOldest,
    CancelNewest,
    ClearListeners,
}

struct Slot {
    guard: Option<Subscription>,
    deliveries: Rc<Cell<u64>>,
    expected: u64,
    live: bool,
}

fuzz_target!(|ops: Vec<Op>| {
    let cell = ValueCell::new(0i16);
    let mut slots: Vec<Slot> = Vec::new();
    let mut value = 0i16;
    let mut version = 0u64;

    for op in ops {
        match op {
            Op::Set(next) => {
                cell.set(next);
                if next != value {
                    value = next;
                    version += 1;
                    for slot in slots.iter_mut().filter(|s| s.live) {
                        slot.expected += 1;
                    }
                }
            }
            Op::NotifyAll => {
                cell.notify_all();
                for slot in slots.iter_mut().filter(|s| s.live) {
                    slot.expected += 1;
                }
            }
            Op::Subscribe => {
                if slots.len() >= 64 {
                    continue;
                }
                let deliveries = Rc::new(Cell::new(0));
                let counter = Rc::clone(&deliveries);
                let guard = cell.subscribe(move |_| counter.set(counter.get() + 1));
                slots.push(Slot {
                    guard: Some(guard),
                    deliveries,
                    expected: 0,
                    live: true,
                });
            }
            Op::DropNewest => {
                if let Some(slot) = slots.iter_mut().rev().find(|s| s.guard.is_some()) {
                    drop(slot.guard.take());
                    slot.live = false;
                }
            }
            Op::DropOldest => {
                if let Some(slot) = slots.iter_mut().find(|s| s.guard.is_some()) {
                    drop(slot.guard.take());
                    slot.live = false;
                }
            }
            Op::CancelNewest => {
                if let Some(slot) = slots.iter_mut().rev().find(|s| s.guard.is_some()) {
                    if let Some(guard) = slot.guard.take() {
                        guard.cancel();
                    }
                    slot.live = false;
                }
            }
            Op::ClearListeners => {
                cell.clear_listeners();
                // Outstanding guards go inert; dropping them later must
                // stay a no-op, which the end-of-run teardown exercises.
                for slot in slots.iter_mut() {
                    slot.live = false;
                }
            }
        }

        assert_eq!(cell.get(), value);
        assert_eq!(cell.version(), version);
        assert_eq!(
            cell.listener_count(),
            slots.iter().filter(|s| s.live).count()
        );
        for slot in &slots {
            assert_eq!(slot.deliveries.get(), slot.expected);
        }
    }
});
