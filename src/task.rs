//! # Task Control Block
//!
//! Per-task state for QuantOS and the routine that gives a new task its
//! initial saved context.
//!
//! A task is born Ready with a bootstrapped stack, so the first resume through
//! the context-transfer path lands at its entry function with its argument in
//! the first argument register. Slots and ids are never reclaimed.

use crate::config::{STACK_SIZE, TIME_SLICE};
use crate::context::{self, ContextFrame, CONTEXT_FRAME_WORDS};

/// Index of a task in the scheduler's table.
pub type TaskId = usize;

/// Task entry point. Receives the argument given at creation.
pub type TaskEntry = extern "C" fn(usize);

/// Number of machine words in a task stack.
pub const STACK_WORDS: usize = STACK_SIZE / core::mem::size_of::<usize>();

const _: () = assert!(STACK_WORDS > CONTEXT_FRAME_WORDS);

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task.
///
/// ```text
///   ┌──────────┐   switch / preempt   ┌─────────┐
///   │  Ready   │ ───────────────────► │ Running │
///   └──────────┘ ◄─────────────────── └─────────┘
///                    yield / expire        │
///   ┌──────────┐                           │ entry returns
///   │ Blocked  │                           ▼
///   └──────────┘                    ┌────────────┐
///                                   │ Terminated │
///                                   └────────────┘
/// ```
///
/// Blocked has no incoming transition yet; it exists so that future
/// synchronization primitives have somewhere to park a task, and neither
/// selection policy will pick it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Eligible to be selected.
    Ready,
    /// The task the scheduler considers loaded on the CPU.
    Running,
    /// Waiting on an event. Never selected.
    Blocked,
    /// Finished. Never selected, slot never reused.
    Terminated,
}

// ---------------------------------------------------------------------------
// Stack storage
// ---------------------------------------------------------------------------

/// Private stack memory of one task. Aligned to 8 bytes as required by AAPCS.
#[repr(C, align(8))]
pub struct TaskStack(pub [usize; STACK_WORDS]);

impl TaskStack {
    pub const fn new() -> Self {
        Self([0; STACK_WORDS])
    }

    /// One past the highest word, rounded down to 8 bytes.
    pub fn top(&mut self) -> *mut usize {
        let end = self.0.as_mut_ptr_range().end as usize;
        (end & !0x07) as *mut usize
    }

    /// Whether `sp` points into this region.
    pub fn contains(&self, sp: *const usize) -> bool {
        let range = self.0.as_ptr_range();
        sp >= range.start && sp < range.end
    }
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Task Control Block (TCB).
///
/// TCBs are stored in a fixed array inside the scheduler; the stack is
/// inline, so a TCB must not move once its stack has been bootstrapped.
pub struct TaskControlBlock {
    /// Index in the scheduler's table, assigned at creation.
    pub id: TaskId,

    /// Current execution state.
    pub state: TaskState,

    /// Higher is more eligible under priority selection. No enforced range.
    pub priority: u32,

    /// Ticks left before the timer path hands the CPU to another task.
    pub remaining_quantum: u32,

    /// Saved stack pointer. Only meaningful while the task is not Running.
    pub saved_stack_pointer: *mut usize,

    /// Entry function, `None` for unused slots.
    pub entry: Option<TaskEntry>,

    /// Single argument passed to `entry`.
    pub arg: usize,

    /// Private stack. The only memory the task's context is saved into.
    pub stack: TaskStack,
}

// Safety: `saved_stack_pointer` only ever points into the TCB's own stack and
// the kernel runs on a single core.
unsafe impl Send for TaskControlBlock {}
unsafe impl Sync for TaskControlBlock {}

impl TaskControlBlock {
    /// An unused slot. Used to initialize the static table.
    pub const EMPTY: Self = Self {
        id: 0,
        state: TaskState::Terminated,
        priority: 0,
        remaining_quantum: 0,
        saved_stack_pointer: core::ptr::null_mut(),
        entry: None,
        arg: 0,
        stack: TaskStack::new(),
    };

    /// Fill this slot with a new Ready task and bootstrap its stack.
    pub fn init(&mut self, id: TaskId, entry: TaskEntry, arg: usize, priority: u32) {
        self.id = id;
        self.state = TaskState::Ready;
        self.priority = priority;
        self.remaining_quantum = TIME_SLICE;
        self.entry = Some(entry);
        self.arg = arg;
        self.bootstrap_stack();
    }

    /// Build the synthetic saved context at the top of the private stack.
    ///
    /// ## Stack Layout (top = high address, growing down)
    ///
    /// ```text
    /// [top, 8-byte aligned]
    ///   ret  (entry)
    ///   r12  (0)
    ///   r11 .. r4 (0)
    ///   r3 .. r1  (0)
    ///   r0   (arg)           <- saved_stack_pointer
    /// ```
    fn bootstrap_stack(&mut self) {
        let entry = self.entry.map_or(0, |f| f as usize);
        let frame = ContextFrame::bootstrap(entry, self.arg);
        let top = self.stack.top();
        // Safety: STACK_WORDS > CONTEXT_FRAME_WORDS, checked at compile time.
        self.saved_stack_pointer = unsafe { context::push_frame(top, &frame) };
    }

    /// Whether `saved_stack_pointer` lies inside this task's own stack.
    pub fn owns_saved_stack_pointer(&self) -> bool {
        self.stack.contains(self.saved_stack_pointer)
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state == TaskState::Ready
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
