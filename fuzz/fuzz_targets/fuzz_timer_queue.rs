//! Fuzz target: `TimerQueue`
//!
//! Decodes the input as a stream of arm / cancel / advance operations.
//!
//! Invariants checked:
//! - No timer fires before its deadline
//! - After `expire(now)`, the next deadline is strictly after `now`
//! - `len()` never exceeds the number of timers armed
//!
//! cargo fuzz run fuzz_timer_queue

#![no_main]

use std::collections::HashMap;

use bmc_buttons::scheduler::{TimerOwner, TimerQueue};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut queue = TimerQueue::new();
    let mut deadlines = HashMap::new();
    let mut ids = Vec::new();
    let mut now = 0u64;

    for chunk in data.chunks_exact(3) {
        let arg = u64::from(u16::from_le_bytes([chunk[1], chunk[2]]));
        match chunk[0] % 3 {
            0 => {
                let periodic = chunk[0] & 0x80 != 0;
                let id = queue.arm(TimerOwner::Device(0), now, arg, periodic);
                deadlines.insert(id, (now + arg, periodic.then_some(arg.max(1))));
                ids.push(id);
            }
            1 => {
                if !ids.is_empty() {
                    let id = ids[arg as usize % ids.len()];
                    queue.cancel(id);
                }
            }
            _ => {
                now += arg;
                let mut fired = Vec::new();
                queue.expire(now, &mut fired);
                for (id, _) in fired {
                    let (deadline, period) = deadlines[&id];
                    assert!(deadline <= now, "timer fired at {now} before {deadline}");
                    if let Some(period) = period {
                        let mut next = deadline + period;
                        if next <= now {
                            next = now + period;
                        }
                        deadlines.insert(id, (next, Some(period)));
                    }
                }
                if let Some(next) = queue.next_deadline() {
                    assert!(next > now);
                }
            }
        }
        assert!(queue.len() <= ids.len());
    }
});
