//! # Kernel
//!
//! The global scheduler instance and the public task API.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()        ← Reset global state
//!         ├─► kernel::start_timer() ← Configure SysTick and its priority
//!         ├─► kernel::timer_alive() ← Check that ticks are arriving
//!         ├─► kernel::create_task() ← Register tasks (×N)
//!         └─► kernel::start()       ← Direct call of task 0
//!               └─► task 0 entry(arg)   (no context switch)
//! ```
//!
//! After `start`, the context-switch machinery is only reached through
//! `yield_task`/`delay`. The SysTick handler calls `timer_tick`, which moves
//! bookkeeping but never registers.
//!
//! This module is only glue around one global [`Scheduler`]: every decision
//! is made by `Scheduler` methods (`reset`, `boot`, `tick`,
//! `retire_stack_owner`, ...) and `start` follows `context::start_with`,
//! all of which are exercised by the host tests.

use core::ptr::{addr_of, addr_of_mut};

use cortex_m::peripheral::{SCB, SYST};

use crate::arch::cortex_m4;
use crate::config::TRACE_EVERY_TICK;
use crate::ktrace;
use crate::scheduler::{self, KernelError, Scheduler, TickOutcome};
use crate::sync;
use crate::task::{TaskEntry, TaskId};

// ---------------------------------------------------------------------------
// Global scheduler instance
// ---------------------------------------------------------------------------

/// Global scheduler instance.
///
/// # Safety
/// Shared between task context and the SysTick handler without a lock;
/// see `sync::guard_switch_window`.
static mut SCHEDULER: Scheduler = Scheduler::new();

#[inline]
fn instance() -> &'static mut Scheduler {
    // Safety: single core; the only concurrent writer is the SysTick
    // handler, whose interleaving with task context is accepted.
    unsafe { &mut *addr_of_mut!(SCHEDULER) }
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Reset all scheduler state. Call once before creating tasks.
pub fn init() {
    sync::critical_section(|| instance().reset());
    ktrace!("kernel", "initialized");
}

/// Arm SysTick at `TICK_HZ` with the lowest exception priority.
///
/// With no tasks created the handler only counts ticks, so this may run
/// right after `init`.
pub fn start_timer(syst: &mut SYST, scb: &mut SCB) {
    cortex_m4::configure_systick(syst);
    cortex_m4::set_interrupt_priorities(scb);
    ktrace!("kernel", "timer armed at {} Hz", crate::config::TICK_HZ);
}

/// Busy-wait `spins` iterations and report whether the tick counter moved.
pub fn timer_alive(spins: u32) -> bool {
    let before = system_ticks();
    for _ in 0..spins {
        cortex_m::asm::nop();
    }
    let after = system_ticks();

    let alive = after != before;
    if alive {
        ktrace!("kernel", "timer running, ticks {} -> {}", before, after);
    } else {
        ktrace!("kernel", "timer not firing, ticks stuck at {}", before);
    }
    alive
}

/// Create a task that will run `entry(arg)`.
///
/// # Returns
/// - `Ok(task_id)`: ids are `0, 1, 2, …` in creation order.
/// - `Err(KernelError::TaskTableFull)`: `MAX_TASKS` already exist.
pub fn create_task(entry: TaskEntry, arg: usize, priority: u32) -> Result<TaskId, KernelError> {
    let result = sync::critical_section(|| instance().create_task(entry, arg, priority));
    match result {
        Ok(id) => ktrace!("kernel", "created task {} (priority {})", id, priority),
        Err(e) => ktrace!("kernel", "create failed: {}", e),
    }
    result
}

/// Start the kernel by calling task 0's entry directly.
///
/// Fails with `KernelError::NoTasks`, touching nothing, if no task exists.
/// Otherwise returns once task 0's entry returns. The timer is armed
/// separately by `start_timer`.
pub fn start() -> Result<(), KernelError> {
    let dispatch = match sync::critical_section(|| instance().boot()) {
        Ok(dispatch) => dispatch,
        Err(e) => {
            ktrace!("kernel", "start failed: {}", e);
            return Err(e);
        }
    };

    ktrace!(
        "kernel",
        "starting with {} tasks, task {} entry {:#010x}",
        instance().task_count,
        dispatch.task,
        dispatch.entry as usize
    );
    dispatch.invoke();

    ktrace!("kernel", "execution completed");
    Ok(())
}

/// Hand control to task `id` by direct call, bypassing the scheduler.
///
/// Returns `false` without doing anything if `id` is not a created task,
/// otherwise `true` once that task's entry returns.
pub fn run_direct(id: TaskId) -> bool {
    let Some(dispatch) = sync::critical_section(|| instance().direct_dispatch(id)) else {
        return false;
    };
    ktrace!("kernel", "direct hand-off to task {}", id);
    dispatch.invoke();
    true
}

/// Voluntarily give up the CPU. Returns when this task is selected again.
pub fn yield_task() {
    cortex_m4::yield_now();
}

/// Yield repeatedly until at least `ticks` timer ticks have elapsed.
///
/// The task stays Ready throughout; this is not a sleep.
pub fn delay(ticks: u32) {
    scheduler::spin_delay(ticks, system_ticks, yield_task);
}

/// Timer ticks since `init`. Wraps.
pub fn system_ticks() -> u32 {
    // Safety: aligned word read; written only by `timer_tick`.
    unsafe { core::ptr::read_volatile(addr_of!(SCHEDULER.system_ticks)) }
}

/// Index of the current task.
pub fn current_task() -> TaskId {
    instance().current_task
}

/// Mark task `id` Terminated. It is never selected again.
pub fn terminate(id: TaskId) {
    if sync::critical_section(|| instance().terminate(id)) {
        ktrace!("kernel", "task {} terminated", id);
    }
}

/// Timer-interrupt entry point. Call from the SysTick handler.
pub fn timer_tick() {
    let scheduler = instance();
    match scheduler.tick() {
        TickOutcome::Counted => {
            if TRACE_EVERY_TICK {
                ktrace!(
                    "irq",
                    "timer tick={}, current_task={}",
                    scheduler.system_ticks,
                    scheduler.current_task
                );
            }
        }
        TickOutcome::QuantumExpired { current } => {
            ktrace!("irq", "time slice expired, task {} keeps running", current);
        }
        TickOutcome::Preempted { from, to } => {
            ktrace!("irq", "time slice expired, switched task {} -> {}", from, to);
        }
    }
}

/// Retire the task whose entry returned while running on the stack at `sp`.
///
/// The exiting task is found by its stack rather than `current_task`, which
/// a timer hand-off may already have moved on.
pub(crate) fn exit_from(sp: *const usize) {
    match sync::critical_section(|| instance().retire_stack_owner(sp)) {
        Some(id) => ktrace!("kernel", "task {} returned, terminated", id),
        None => ktrace!("kernel", "exit on unowned stack {:#010x}", sp as usize),
    }
}

/// Orchestrator half of a voluntary switch. `sp` is the caller's stack
/// pointer just after its registers were saved; returns the stack pointer
/// to restore from.
pub(crate) fn switch_from(sp: *mut usize) -> *mut usize {
    let dispatch = sync::guard_switch_window(|| instance().switch_context(sp));
    if dispatch.from != dispatch.to {
        ktrace!("sched", "switch {} -> {}", dispatch.from, dispatch.to);
    }
    dispatch.stack_pointer
}
