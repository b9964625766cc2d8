//! # QuantOS Configuration
//!
//! Compile-time constants governing the scheduler and system behavior.
//! All limits are fixed at compile time — no dynamic allocation.

/// Capacity of the task table. Slots are never reclaimed, so this is also
/// the total number of tasks that can ever be created.
pub const MAX_TASKS: usize = 8;

/// Per-task stack size in bytes. Must hold the deepest call chain plus one
/// saved register frame (`CONTEXT_FRAME_BYTES`) and the hardware exception
/// frame a SysTick interrupt pushes.
pub const STACK_SIZE: usize = 1024;

/// Quantum in timer ticks. Reloaded whenever a task becomes Running.
pub const TIME_SLICE: u32 = 10;

/// SysTick frequency in Hz.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Emit diagnostic trace lines through the installed sink.
pub const TRACE_ENABLED: bool = true;

/// Also trace every tick that only counts. Very chatty at `TICK_HZ`.
pub const TRACE_EVERY_TICK: bool = false;

/// Mask interrupts around the voluntary switch.
///
/// Off by default: the timer path and the orchestrator then race on
/// `current_task`, task states and quanta, which is the kernel's documented
/// timing behavior. Turning it on serializes the two.
pub const GUARD_SWITCH_WINDOW: bool = false;
