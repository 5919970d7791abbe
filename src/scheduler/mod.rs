// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! A hierarchical timing wheel: a 256-slot near wheel cascading into four 64-slot far
//! wheels. See `spec.md` §3/§4.5/§9 for the data model and algorithm this implements.

mod entry;
mod wheel;

pub use entry::TimerHandle;
pub use wheel::Scheduler;

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn timer_fan_out_fires_each_entry_exactly_once() {
        let mut sched = Scheduler::init(0, 1);
        let fires = Rc::new(RefCell::new(0u32));
        for _ in 0..1000 {
            let fires = Rc::clone(&fires);
            sched.arm(10, 1, move |_sched, _handle| {
                *fires.borrow_mut() += 1;
            });
        }
        sched.advance(10);
        assert_eq!(*fires.borrow(), 1000);
        sched.advance(20);
        assert_eq!(*fires.borrow(), 1000, "one-shot entries must not refire");
    }

    #[test]
    fn periodic_entry_fires_at_its_nominal_cadence_then_stops() {
        let mut sched = Scheduler::init(0, 1);
        let fire_times = Rc::new(RefCell::new(Vec::new()));
        {
            let fire_times = Rc::clone(&fire_times);
            sched.arm(5, 3, move |sched, _handle| {
                fire_times.borrow_mut().push(sched.current_time_ms());
            });
        }
        sched.advance(5);
        sched.advance(10);
        sched.advance(15);
        sched.advance(20);
        assert_eq!(*fire_times.borrow(), vec![5, 10, 15]);
    }

    #[test]
    fn long_period_cascades_from_far_wheel_into_near_wheel() {
        let mut sched = Scheduler::init(0, 1);
        let fired = Rc::new(RefCell::new(false));
        {
            let fired = Rc::clone(&fired);
            sched.arm(300, 1, move |_sched, _handle| {
                *fired.borrow_mut() = true;
            });
        }
        // Still two far-wheel cascades away; must not have fired yet.
        sched.advance(256);
        assert!(!*fired.borrow(), "entry must have cascaded, not fired, at tick 256");
        sched.advance(300);
        assert!(*fired.borrow(), "entry must fire exactly at its nominal deadline");
    }

    #[test]
    fn cancel_inside_own_callback_suppresses_reinsertion() {
        let mut sched = Scheduler::init(0, 1);
        let fires = Rc::new(RefCell::new(0u32));
        let handle_cell: Rc<RefCell<Option<TimerHandle>>> = Rc::new(RefCell::new(None));
        let handle_for_closure = Rc::clone(&handle_cell);
        let fires_for_closure = Rc::clone(&fires);
        let handle = sched.arm(5, 0, move |sched, handle| {
            *fires_for_closure.borrow_mut() += 1;
            let stored = *handle_for_closure.borrow();
            if stored == Some(handle) {
                sched.cancel(handle).expect("cancel from within own callback must succeed");
            }
        });
        *handle_cell.borrow_mut() = Some(handle);

        sched.advance(5);
        assert_eq!(*fires.borrow(), 1);
        sched.advance(10);
        sched.advance(15);
        assert_eq!(*fires.borrow(), 1, "self-cancelling entry must not be reinserted");
    }

    #[test]
    fn cancelling_an_armed_entry_prevents_its_future_fire() {
        let mut sched = Scheduler::init(0, 1);
        let fires = Rc::new(RefCell::new(0u32));
        let handle = {
            let fires = Rc::clone(&fires);
            sched.arm(10, 1, move |_sched, _handle| {
                *fires.borrow_mut() += 1;
            })
        };
        sched.cancel(handle).unwrap();
        sched.advance(10);
        assert_eq!(*fires.borrow(), 0);
    }

    #[test]
    fn stale_handle_after_one_shot_completion_is_rejected() {
        let mut sched = Scheduler::init(0, 1);
        let handle = sched.arm(1, 1, |_sched, _handle| {});
        sched.advance(1);
        assert!(sched.cancel(handle).is_err(), "handle must be stale once its slot is recycled");
    }

    #[test]
    fn entries_sharing_a_slot_fire_in_insertion_order() {
        let mut sched = Scheduler::init(0, 1);
        let order = Rc::new(RefCell::new(Vec::new()));
        for id in 0..5 {
            let order = Rc::clone(&order);
            sched.arm(10, 1, move |_sched, _handle| order.borrow_mut().push(id));
        }
        sched.advance(10);
        assert_eq!(*order.borrow(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn next_fire_ms_reports_the_earliest_armed_deadline() {
        let mut sched = Scheduler::init(0, 1);
        assert_eq!(sched.next_fire_ms(), None);
        sched.arm(50, 1, |_sched, _handle| {});
        sched.arm(10, 1, |_sched, _handle| {});
        assert_eq!(sched.next_fire_ms(), Some(10));
        sched.advance(10);
        assert_eq!(sched.next_fire_ms(), Some(50));
    }
}
