//! # QuantOS — Quantum-Sliced Operating System
//!
//! A minimal preemptive/cooperative multitasking kernel for single-core
//! ARM Cortex-M4 microcontrollers.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                    │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │   init() · create_task() · start() · yield() · delay()  │
//! ├───────────────────────────┬────────────────────────────┤
//! │  Scheduler (scheduler.rs) │  Sync / Trace              │
//! │  ─ switch_context()       │  sync.rs · trace.rs        │
//! │  ─ tick()                 │                            │
//! │  ─ boot()                 │                            │
//! ├───────────────────────────┴────────────────────────────┤
//! │     Task Model (task.rs) · Register Context (context.rs) │
//! ├────────────────────────────────────────────────────────┤
//! │      Arch Ports (arch/cortex_m4.rs · arch/hosted.rs)     │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduling
//!
//! - **Voluntary** (`yield`, `delay`): the strictly highest-priority Ready
//!   task wins; if no Ready task has priority above zero, round-robin.
//! - **Timer** (SysTick): once the current task's quantum of `TIME_SLICE`
//!   ticks is used up, bookkeeping passes to the next Ready task in table
//!   order. Priority is not consulted.
//! - **Boot**: `start` calls task 0's entry directly. No register context is
//!   saved or restored for the first dispatch.
//!
//! ## Memory Model
//!
//! - **No heap**: All state is statically allocated
//! - **Fixed-size TCB array**: `[TaskControlBlock; MAX_TASKS]`
//! - **Per-task stack**: `STACK_SIZE` bytes inline in the TCB
//! - **No slot reuse**: a terminated task keeps its id and slot forever
//!
//! ## Concurrency
//!
//! Task context and the SysTick handler share the scheduler without a lock.
//! A tick landing inside a voluntary switch can leave two tasks marked
//! Running; `config::GUARD_SWITCH_WINDOW` masks that window when set.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod context;
pub mod task;
pub mod scheduler;
pub mod sync;
pub mod trace;
pub mod arch;

#[cfg(target_os = "none")]
pub mod kernel;
