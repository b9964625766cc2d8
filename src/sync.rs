//! # Synchronization Primitives
//!
//! Scoped interrupt masking for state shared between task context and the
//! SysTick handler.
//!
//! Off-target there is no interrupt to mask and the closure is simply called,
//! which lets the scheduler be driven from host tests.

use crate::config::GUARD_SWITCH_WINDOW;

/// Execute a closure with interrupts disabled, restoring them on exit.
///
/// # Usage
/// ```ignore
/// let id = sync::critical_section(|| scheduler.create_task(entry, 0, 1));
/// ```
///
/// Keep the enclosed work short: SysTick is held off for its duration.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    #[cfg(target_os = "none")]
    {
        cortex_m::interrupt::free(|_cs| f())
    }
    #[cfg(not(target_os = "none"))]
    {
        f()
    }
}

/// Run the voluntary-switch bookkeeping, masked only if
/// `GUARD_SWITCH_WINDOW` is set.
///
/// With the default configuration a timer tick may land between the
/// orchestrator's demotion of the current task and its promotion of the next
/// one, and both paths then write `current_task` and task states.
#[inline]
pub fn guard_switch_window<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    if GUARD_SWITCH_WINDOW {
        critical_section(f)
    } else {
        f()
    }
}
