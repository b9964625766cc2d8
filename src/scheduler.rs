//! # Scheduler
//!
//! Task selection and the state transitions around it.
//!
//! ## Two selectors, on purpose
//!
//! Voluntary switches (`switch_context`, reached from `yield`) use
//! [`PriorityWithFallback`]: the strictly highest-priority Ready task, else
//! round-robin. Timer expiry (`tick`) uses [`PreemptScan`]: plain round-robin
//! that never consults priority. The two paths therefore disagree about who
//! runs next; that asymmetry is part of the kernel's observable behavior.
//!
//! ## Priority threshold
//!
//! Priority selection starts from a best-so-far of `0` and only accepts a
//! strictly greater priority. Ready tasks at priority `0` are never chosen by
//! it and fall through to round-robin.

use crate::config::{MAX_TASKS, TIME_SLICE};
use crate::task::{TaskControlBlock, TaskEntry, TaskId, TaskState};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Recoverable kernel errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// `MAX_TASKS` tasks already exist.
    TaskTableFull,
    /// `start` was called with an empty task table.
    NoTasks,
}

impl core::fmt::Display for KernelError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            KernelError::TaskTableFull => write!(f, "task table full ({} tasks)", MAX_TASKS),
            KernelError::NoTasks => write!(f, "no tasks to run"),
        }
    }
}

// ---------------------------------------------------------------------------
// Selection policies
// ---------------------------------------------------------------------------

/// A pure selection rule over the occupied part of the task table.
pub trait SelectionPolicy {
    /// Pick the next task, or `None` if this rule finds no candidate.
    fn select(&self, tasks: &[TaskControlBlock], current: TaskId) -> Option<TaskId>;
}

/// Strictly highest priority among Ready tasks, earliest slot on ties,
/// starting from a threshold of `0`.
pub struct PriorityFirst;

impl SelectionPolicy for PriorityFirst {
    fn select(&self, tasks: &[TaskControlBlock], _current: TaskId) -> Option<TaskId> {
        let mut best: Option<TaskId> = None;
        let mut highest = 0u32;

        for (i, task) in tasks.iter().enumerate() {
            if task.is_ready() && task.priority > highest {
                highest = task.priority;
                best = Some(i);
            }
        }

        best
    }
}

/// First Ready slot scanning forward from `current + 1`, wrapping. The
/// current slot itself is examined last.
pub struct RoundRobin;

impl SelectionPolicy for RoundRobin {
    fn select(&self, tasks: &[TaskControlBlock], current: TaskId) -> Option<TaskId> {
        let count = tasks.len();
        (1..=count)
            .map(|step| (current + step) % count)
            .find(|&idx| tasks[idx].is_ready())
    }
}

/// [`PriorityFirst`], then [`RoundRobin`], then `current` unchanged.
///
/// Always returns an index; the result is not necessarily Ready.
pub struct PriorityWithFallback;

impl SelectionPolicy for PriorityWithFallback {
    fn select(&self, tasks: &[TaskControlBlock], current: TaskId) -> Option<TaskId> {
        PriorityFirst
            .select(tasks, current)
            .or_else(|| RoundRobin.select(tasks, current))
            .or(Some(current))
    }
}

/// The timer path's selector: first Ready slot after `current`, wrapping, and
/// stopping when the scan returns to `current`. Never returns `current`.
pub struct PreemptScan;

impl SelectionPolicy for PreemptScan {
    fn select(&self, tasks: &[TaskControlBlock], current: TaskId) -> Option<TaskId> {
        let count = tasks.len();
        if count == 0 {
            return None;
        }

        let mut next = (current + 1) % count;
        while !tasks[next].is_ready() && next != current {
            next = (next + 1) % count;
        }

        (next != current && tasks[next].is_ready()).then_some(next)
    }
}

// ---------------------------------------------------------------------------
// Dispatch records
// ---------------------------------------------------------------------------

/// Direct-call dispatch: the task's entry is invoked as a plain function on
/// the caller's stack, bypassing the context-transfer machinery.
#[derive(Debug, Clone, Copy)]
pub struct BootDispatch {
    pub task: TaskId,
    pub entry: TaskEntry,
    pub arg: usize,
}

impl BootDispatch {
    /// Call the entry function. Returns when it does.
    pub fn invoke(self) {
        (self.entry)(self.arg)
    }
}

/// Outcome of a voluntary switch through the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledDispatch {
    /// Task that was current when the switch began.
    pub from: TaskId,
    /// Task now current.
    pub to: TaskId,
    /// Stack pointer to load.
    pub stack_pointer: *mut usize,
    /// Whether `to` was Ready and has been made Running. `false` means the
    /// selector found nothing eligible and `to` keeps whatever state it had.
    pub promoted: bool,
}

/// What one timer tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Only counters moved.
    Counted,
    /// The current task's quantum is exhausted but no other task is Ready.
    QuantumExpired { current: TaskId },
    /// The quantum expired and bookkeeping moved to another task.
    Preempted { from: TaskId, to: TaskId },
}

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// The single scheduler-state object: task table, occupancy, current index
/// and the tick counter. Stored as a global `static mut` in `kernel.rs`.
///
/// No method takes a lock. The timer path (`tick`) and the orchestrator
/// (`switch_context`) both read-modify-write `current_task`, task states and
/// quanta; see `sync::guard_switch_window`.
pub struct Scheduler {
    /// Fixed-size task table.
    pub tasks: [TaskControlBlock; MAX_TASKS],

    /// Occupied slots, `0..=MAX_TASKS`. Never decreases.
    pub task_count: usize,

    /// Index of the current task. Meaningful once `task_count > 0`.
    pub current_task: TaskId,

    /// Timer ticks since init. Wraps.
    pub system_ticks: u32,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            tasks: [TaskControlBlock::EMPTY; MAX_TASKS],
            task_count: 0,
            current_task: 0,
            system_ticks: 0,
        }
    }

    /// Occupied part of the table.
    #[inline]
    pub fn active(&self) -> &[TaskControlBlock] {
        &self.tasks[..self.task_count]
    }

    /// Register a new Ready task and bootstrap its stack.
    ///
    /// Ids are handed out as `0, 1, 2, …` and never reused.
    pub fn create_task(
        &mut self,
        entry: TaskEntry,
        arg: usize,
        priority: u32,
    ) -> Result<TaskId, KernelError> {
        if self.task_count >= MAX_TASKS {
            return Err(KernelError::TaskTableFull);
        }

        let id = self.task_count;
        self.tasks[id].init(id, entry, arg, priority);
        self.task_count += 1;
        Ok(id)
    }

    // -- selection ----------------------------------------------------------

    pub fn select_with<P: SelectionPolicy>(&self, policy: &P) -> Option<TaskId> {
        policy.select(self.active(), self.current_task)
    }

    /// Priority-first selection, `None` when no Ready task clears the
    /// strict threshold.
    pub fn select_priority(&self) -> Option<TaskId> {
        self.select_with(&PriorityFirst)
    }

    /// Round-robin fallback. Returns `current_task` when nothing is Ready;
    /// that index may not be runnable.
    pub fn select_round_robin(&self) -> TaskId {
        self.select_with(&RoundRobin).unwrap_or(self.current_task)
    }

    /// The orchestrator's combined rule.
    pub fn select_next(&self) -> TaskId {
        self.select_with(&PriorityWithFallback)
            .unwrap_or(self.current_task)
    }

    // -- orchestrator -------------------------------------------------------

    /// Voluntary hand-off. Records `sp` for the current task, demotes it if
    /// Running, selects the next task, promotes it and returns the stack
    /// pointer to load.
    ///
    /// Must be bracketed by a save/restore pair; only the pointer is touched
    /// here.
    pub fn switch_context(&mut self, sp: *mut usize) -> ScheduledDispatch {
        let from = self.park_current(sp);
        let mut dispatch = self.dispatch_next();
        dispatch.from = from;
        dispatch
    }

    /// First half of `switch_context`: store `sp` and demote a Running
    /// current task to Ready. Blocked and Terminated tasks keep their state.
    pub fn park_current(&mut self, sp: *mut usize) -> TaskId {
        let current = self.current_task;
        let task = &mut self.tasks[current];
        task.saved_stack_pointer = sp;
        if task.state == TaskState::Running {
            task.state = TaskState::Ready;
        }
        current
    }

    /// Second half of `switch_context`: select, promote, reset the quantum.
    pub fn dispatch_next(&mut self) -> ScheduledDispatch {
        let from = self.current_task;
        let next = self.select_next();
        self.current_task = next;

        let task = &mut self.tasks[next];
        let promoted = task.is_ready();
        if promoted {
            task.state = TaskState::Running;
            task.remaining_quantum = TIME_SLICE;
        }

        ScheduledDispatch {
            from,
            to: next,
            stack_pointer: task.saved_stack_pointer,
            promoted,
        }
    }

    // -- timer path ---------------------------------------------------------

    /// Called once per timer interrupt.
    ///
    /// Counts the tick and burns one unit of the current task's quantum. Once
    /// the quantum is zero, hands bookkeeping to the next Ready task found by
    /// [`PreemptScan`]. No registers move; the interrupted code keeps running.
    pub fn tick(&mut self) -> TickOutcome {
        self.system_ticks = self.system_ticks.wrapping_add(1);

        if self.task_count == 0 {
            return TickOutcome::Counted;
        }

        let current = self.current_task;
        let task = &mut self.tasks[current];
        if task.remaining_quantum > 0 {
            task.remaining_quantum -= 1;
        }
        if task.remaining_quantum > 0 {
            return TickOutcome::Counted;
        }

        match self.select_with(&PreemptScan) {
            Some(next) => {
                if self.tasks[current].state == TaskState::Running {
                    self.tasks[current].state = TaskState::Ready;
                }
                self.tasks[next].state = TaskState::Running;
                self.tasks[next].remaining_quantum = TIME_SLICE;
                self.current_task = next;
                TickOutcome::Preempted { from: current, to: next }
            }
            None => TickOutcome::QuantumExpired { current },
        }
    }

    // -- boot / direct dispatch ---------------------------------------------

    /// Prepare the first dispatch: task 0 becomes Running and is handed back
    /// for a direct call.
    pub fn boot(&mut self) -> Result<BootDispatch, KernelError> {
        if self.task_count == 0 {
            return Err(KernelError::NoTasks);
        }
        self.direct_dispatch(0).ok_or(KernelError::NoTasks)
    }

    /// Make `id` current and Running for a direct call of its entry.
    /// `None` if `id` is not an occupied slot.
    ///
    /// A different current task that is still Running drops back to Ready;
    /// Blocked and Terminated tasks keep their state.
    pub fn direct_dispatch(&mut self, id: TaskId) -> Option<BootDispatch> {
        if id >= self.task_count {
            return None;
        }
        let entry = self.tasks[id].entry?;

        let current = self.current_task;
        if current != id && self.tasks[current].state == TaskState::Running {
            self.tasks[current].state = TaskState::Ready;
        }

        let task = &mut self.tasks[id];
        task.state = TaskState::Running;
        self.current_task = id;

        Some(BootDispatch {
            task: id,
            entry,
            arg: task.arg,
        })
    }

    /// Mark `id` Terminated. Ignored for unoccupied slots.
    pub fn terminate(&mut self, id: TaskId) -> bool {
        if id >= self.task_count {
            return false;
        }
        self.tasks[id].state = TaskState::Terminated;
        true
    }

    /// Terminate the task whose entry just returned, found by the stack it
    /// was running on. `sp` is the stack pointer at the exit point, which may
    /// sit exactly at the top of that stack.
    pub fn retire_stack_owner(&mut self, sp: *const usize) -> Option<TaskId> {
        let id = self.owner_of(sp.wrapping_sub(1))?;
        self.tasks[id].state = TaskState::Terminated;
        Some(id)
    }

    /// Drop every task and zero the counters.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    // -- introspection ------------------------------------------------------

    /// The task whose stack region contains `sp`, if any.
    ///
    /// Identifies the code actually executing, which after a timer hand-off
    /// is not necessarily `current_task`.
    pub fn owner_of(&self, sp: *const usize) -> Option<TaskId> {
        self.active()
            .iter()
            .position(|t| t.stack.contains(sp))
    }

    /// Number of tasks currently marked Running.
    pub fn running_count(&self) -> usize {
        self.active()
            .iter()
            .filter(|t| t.state == TaskState::Running)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Delay
// ---------------------------------------------------------------------------

/// Busy-wait until `now()` has advanced by at least `ticks` from its first
/// reading, calling `yield_now` on every round. Wraparound-safe.
///
/// Returns the number of yields performed.
pub fn spin_delay(
    ticks: u32,
    mut now: impl FnMut() -> u32,
    mut yield_now: impl FnMut(),
) -> u32 {
    let start = now();
    let mut rounds = 0u32;
    while now().wrapping_sub(start) < ticks {
        yield_now();
        rounds = rounds.wrapping_add(1);
    }
    rounds
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
