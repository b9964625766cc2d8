//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor:
//! SysTick configuration, exception priority, and the voluntary context
//! switch.
//!
//! ## Context Switch Mechanism
//!
//! Tasks run in Thread mode on the main stack pointer. `yield_now` is a
//! naked routine that performs the whole save → orchestrate → restore
//! sequence of `context::yield_through` in registers:
//!
//! 1. `push {r0-r12, lr}` commits one `ContextFrame` to the active stack
//! 2. the resulting `sp` is handed to the orchestrator, which records it and
//!    returns the next task's saved `sp`
//! 3. `pop {r0-r12, pc}` reloads the frame and resumes at its return slot
//!
//! Before the pop, `lr` is pointed at `task_exit`, so a task resumed for the
//! first time from its bootstrap frame terminates cleanly if its entry
//! function returns. The exiting task is identified by the stack it is
//! still running on.
//!
//! The SysTick handler only updates scheduler bookkeeping; it never moves
//! registers.

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::context::CONTEXT_FRAME_WORDS;
use crate::kernel;

// `push {r0-r12, lr}` moves exactly fourteen words.
const _: () = assert!(CONTEXT_FRAME_WORDS == 14);

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure the SysTick timer to fire at `TICK_HZ` from the core clock.
pub fn configure_systick(syst: &mut SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Put SysTick at the lowest exception priority so it never delays
/// application interrupts.
pub fn set_interrupt_priorities(scb: &mut SCB) {
    // Safety: priority changes only affect preemption order, and this runs
    // before the first task is dispatched.
    unsafe {
        scb.set_priority(SystemHandler::SysTick, 0xFF);
    }
}

// ---------------------------------------------------------------------------
// Voluntary switch
// ---------------------------------------------------------------------------

/// Suspend the calling task and resume whichever task the orchestrator
/// selects. Returns when this task is chosen again.
#[unsafe(naked)]
pub extern "C" fn yield_now() {
    naked_asm!(
        // --- Save current context ---
        "push {{r0-r12, lr}}",

        // --- Hand off: r0 = saved sp in, next task's sp out ---
        "mov r0, sp",
        "bl {switch}",
        "mov sp, r0",

        // --- Restore next context ---
        "movw lr, #:lower16:{exit}",
        "movt lr, #:upper16:{exit}",
        "pop {{r0-r12, pc}}",

        switch = sym switch_from,
        exit = sym task_exit,
    );
}

/// Orchestrator entry used by `yield_now`.
extern "C" fn switch_from(sp: *mut usize) -> *mut usize {
    kernel::switch_from(sp)
}

/// Landing pad for a bootstrapped task whose entry function returned.
extern "C" fn task_exit() -> ! {
    let sp: *const usize;
    // Safety: only reads the stack pointer.
    unsafe { asm!("mov {}, sp", out(reg) sp, options(nomem, nostack, preserves_flags)) };
    kernel::exit_from(sp);
    loop {
        yield_now();
    }
}
