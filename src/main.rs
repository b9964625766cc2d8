//! # QuantOS Example Firmware
//!
//! Three tasks that hand the CPU to one another by direct call, the way the
//! boot dispatch reaches task 0:
//!
//! | Task | Priority | Behavior |
//! |------|----------|----------|
//! | 0    | 1 | Three rounds of busy work, terminates, runs task 1 |
//! | 1    | 2 | Three rounds of busy work, terminates, runs task 2 |
//! | 2    | 1 | Three rounds of busy work, terminates |
//!
//! SysTick keeps firing throughout; trace output shows quanta expiring and
//! the timer path moving bookkeeping between Ready tasks. Output goes via
//! semihosting to the debugger/QEMU console.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod firmware {
    use core::ptr::addr_of_mut;

    use cortex_m_rt::{entry, exception};
    use cortex_m_semihosting::hio::{self, HostStream};
    use panic_halt as _;

    use quantos::{kernel, ktrace, trace};

    /// Base priority of each demo task, indexed by task id.
    const PRIORITIES: [u32; 3] = [1, 2, 1];

    /// Busy-loop iterations per round of work.
    const WORK_SPIN: u32 = 1_000_000;

    /// Busy-loop iterations spent waiting for the first ticks.
    const TIMER_CHECK_SPIN: u32 = 100_000;

    static mut STDOUT: Option<HostStream> = None;

    // -----------------------------------------------------------------------
    // Task entry points
    // -----------------------------------------------------------------------

    /// Demo task body. `id` is the task's own id, passed as its argument.
    extern "C" fn demo_task(id: usize) {
        ktrace!("task", "task {} started (priority {})", id, PRIORITIES[id]);

        for round in 1..=3 {
            ktrace!("task", "task {} running, round {}", id, round);
            let mut work: u32 = 0;
            for _ in 0..WORK_SPIN {
                work = work.wrapping_add(1);
            }
            core::hint::black_box(work);
        }

        ktrace!("task", "task {} finished", id);
        kernel::terminate(id);

        if !kernel::run_direct(id + 1) {
            ktrace!("task", "all tasks completed");
        }
    }

    // -----------------------------------------------------------------------
    // Interrupts
    // -----------------------------------------------------------------------

    #[exception]
    fn SysTick() {
        kernel::timer_tick();
    }

    // -----------------------------------------------------------------------
    // Main entry point
    // -----------------------------------------------------------------------

    fn install_trace() {
        let Ok(out) = hio::hstdout() else {
            return;
        };
        // Safety: runs once, before any task or interrupt.
        unsafe {
            let slot = &mut *addr_of_mut!(STDOUT);
            *slot = Some(out);
            if let Some(stream) = slot.as_mut() {
                trace::set_sink(stream);
            }
        }
    }

    fn halt() -> ! {
        loop {
            cortex_m::asm::wfi();
        }
    }

    #[entry]
    fn main() -> ! {
        install_trace();
        kernel::init();

        let Some(mut cp) = cortex_m::Peripherals::take() else {
            halt();
        };
        kernel::start_timer(&mut cp.SYST, &mut cp.SCB);
        if !kernel::timer_alive(TIMER_CHECK_SPIN) {
            ktrace!("main", "warning: continuing without a working timer");
        }

        for (id, &priority) in PRIORITIES.iter().enumerate() {
            if kernel::create_task(demo_task, id, priority).is_err() {
                halt();
            }
        }

        if kernel::start().is_ok() {
            ktrace!("main", "system halted");
        }
        halt()
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    eprintln!("quantos is firmware; build it with --target thumbv7em-none-eabi");
}
