//! # Hosted Port
//!
//! A software CPU: a live register file, an active stack pointer and
//! counters for every save and restore. It moves frames with the same
//! `push_frame`/`pop_frame` routines the bootstrap uses, so it observes
//! exactly what the Cortex-M4 port would load.

use crate::context::{self, ContextFrame, ContextTransfer, TransferCounts};

/// Software register file implementing [`ContextTransfer`].
pub struct HostedCpu {
    /// Live general-purpose registers.
    pub regs: ContextFrame,
    /// Active stack pointer.
    pub sp: *mut usize,
    /// Save/restore instrumentation.
    pub counts: TransferCounts,
}

impl HostedCpu {
    /// A CPU whose active stack starts at `sp` with all registers zero.
    pub fn new(sp: *mut usize) -> Self {
        Self {
            regs: ContextFrame::ZERO,
            sp,
            counts: TransferCounts::default(),
        }
    }
}

impl ContextTransfer for HostedCpu {
    unsafe fn save_context(&mut self) -> *mut usize {
        self.sp = context::push_frame(self.sp, &self.regs);
        self.counts.saves += 1;
        self.sp
    }

    unsafe fn restore_context(&mut self, sp: *mut usize) {
        let (frame, after) = context::pop_frame(sp);
        self.regs = frame;
        self.sp = after;
        self.counts.restores += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TIME_SLICE;
    use crate::context::{start_with, yield_through, CONTEXT_FRAME_WORDS};
    use crate::scheduler::{KernelError, Scheduler};
    use crate::task::TaskState;
    use core::sync::atomic::{AtomicUsize, Ordering};

    extern "C" fn worker(_arg: usize) {}

    static BOOT_ARG: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn record_arg(arg: usize) {
        BOOT_ARG.store(arg, Ordering::SeqCst);
    }

    fn pattern(seed: usize) -> ContextFrame {
        ContextFrame {
            args: [seed, seed + 1, seed + 2, seed + 3],
            saved: [seed + 4, seed + 5, seed + 6, seed + 7, seed + 8, seed + 9, seed + 10, seed + 11],
            scratch: seed + 12,
            ret: seed + 13,
        }
    }

    #[test]
    fn test_restore_of_fresh_task_loads_entry_and_arg() {
        let mut s = Box::new(Scheduler::new());
        let id = s.create_task(worker, 0xC0FFEE, 1).unwrap();
        let sp = s.tasks[id].saved_stack_pointer;
        let top = s.tasks[id].stack.top();

        let mut cpu = HostedCpu::new(core::ptr::null_mut());
        unsafe { cpu.restore_context(sp) };

        assert_eq!(cpu.regs.ret, worker as usize);
        assert_eq!(cpu.regs.args[0], 0xC0FFEE);
        assert_eq!(cpu.regs.args[1..], [0, 0, 0]);
        assert_eq!(cpu.regs.saved, [0; 8]);
        assert_eq!(cpu.regs.scratch, 0);
        assert_eq!(cpu.sp, top);
        assert_eq!(cpu.counts, TransferCounts { saves: 0, restores: 1 });
    }

    #[test]
    fn test_fresh_frame_matches_live_save_layout() {
        // A frame saved from live registers and one built by the bootstrap
        // are read back identically.
        let mut boot_stack = [0usize; 32];
        let top = unsafe { boot_stack.as_mut_ptr().add(boot_stack.len()) };
        let mut cpu = HostedCpu::new(top);
        cpu.regs = ContextFrame::bootstrap(worker as usize, 9);

        let sp = unsafe { cpu.save_context() };
        assert_eq!(unsafe { top.offset_from(sp) }, CONTEXT_FRAME_WORDS as isize);

        let mut s = Box::new(Scheduler::new());
        s.create_task(worker, 9, 1).unwrap();
        let fresh = s.tasks[0].saved_stack_pointer;

        let (live, _) = unsafe { context::pop_frame(sp) };
        let (boot, _) = unsafe { context::pop_frame(fresh) };
        assert_eq!(live, boot);
    }

    #[test]
    fn test_yield_round_trip_between_two_tasks() {
        let mut s = Box::new(Scheduler::new());
        s.create_task(worker, 10, 0).unwrap();
        s.create_task(worker, 11, 0).unwrap();
        s.boot().unwrap();

        // Task 0 runs on the boot stack, as after a direct-call dispatch
        let mut boot_stack = [0usize; 64];
        let boot_top = unsafe { boot_stack.as_mut_ptr().add(boot_stack.len()) };
        let mut cpu = HostedCpu::new(boot_top);
        cpu.regs = pattern(100);

        unsafe { yield_through(&mut s, &mut cpu) };
        assert_eq!(s.current_task, 1);
        assert_eq!(s.tasks[0].state, TaskState::Ready);
        assert_eq!(s.tasks[1].state, TaskState::Running);
        assert_eq!(cpu.regs.ret, worker as usize);
        assert_eq!(cpu.regs.args[0], 11);
        let task1_top = s.tasks[1].stack.top();
        assert_eq!(cpu.sp, task1_top);

        // Task 1 now has its own live registers; yielding returns to task 0
        cpu.regs = pattern(200);
        unsafe { yield_through(&mut s, &mut cpu) };
        assert_eq!(s.current_task, 0);
        assert_eq!(cpu.regs, pattern(100));
        assert_eq!(cpu.sp, boot_top);
        assert!(s.tasks[1].owns_saved_stack_pointer());

        // And back to task 1 where it left off
        unsafe { yield_through(&mut s, &mut cpu) };
        assert_eq!(s.current_task, 1);
        assert_eq!(cpu.regs, pattern(200));
        assert_eq!(cpu.sp, task1_top);
        assert_eq!(cpu.counts, TransferCounts { saves: 3, restores: 3 });
        assert_eq!(s.running_count(), 1);
    }

    #[test]
    fn test_start_bypasses_context_transfer() {
        let mut s = Box::new(Scheduler::new());
        s.create_task(record_arg, 77, 0).unwrap();
        s.create_task(worker, 78, 0).unwrap();
        let frame_base = unsafe { s.tasks[0].stack.top().sub(CONTEXT_FRAME_WORDS) };

        let mut boot_stack = [0usize; 64];
        let boot_top = unsafe { boot_stack.as_mut_ptr().add(boot_stack.len()) };
        let mut cpu = HostedCpu::new(boot_top);

        let mut booted = None;
        let started = start_with(&mut s, &mut cpu, |d| booted = Some(d.task));
        assert_eq!(started, Ok(0));
        assert_eq!(booted, Some(0));
        assert_eq!(BOOT_ARG.load(Ordering::SeqCst), 77);
        assert_eq!(cpu.counts, TransferCounts::default());
        assert_eq!(cpu.sp, boot_top);
        assert_eq!(s.tasks[0].state, TaskState::Running);
        // The bootstrap frame was never consumed
        assert_eq!(s.tasks[0].saved_stack_pointer, frame_base);

        // A voluntary switch on the same port moves one frame each way
        unsafe { yield_through(&mut s, &mut cpu) };
        assert_eq!(cpu.counts, TransferCounts { saves: 1, restores: 1 });
        assert_eq!(s.current_task, 1);
        assert_eq!(cpu.regs.args[0], 78);
    }

    #[test]
    fn test_start_without_tasks_touches_nothing() {
        let mut s = Box::new(Scheduler::new());
        let mut cpu = HostedCpu::new(core::ptr::null_mut());

        let mut armed = false;
        let started = start_with(&mut s, &mut cpu, |_| armed = true);
        assert_eq!(started, Err(KernelError::NoTasks));
        assert!(!armed);
        assert_eq!(cpu.counts, TransferCounts::default());
        assert_eq!(s.running_count(), 0);
        assert_eq!(s.current_task, 0);
    }

    #[test]
    fn test_entry_return_after_timer_hand_off_retires_own_task() {
        let mut s = Box::new(Scheduler::new());
        for arg in 0..3 {
            s.create_task(worker, arg, 0).unwrap();
        }
        s.boot().unwrap();

        let mut boot_stack = [0usize; 64];
        let boot_top = unsafe { boot_stack.as_mut_ptr().add(boot_stack.len()) };
        let mut cpu = HostedCpu::new(boot_top);

        // Task 1 resumes from its bootstrap frame
        unsafe { yield_through(&mut s, &mut cpu) };
        assert_eq!(s.current_task, 1);
        assert_eq!(cpu.regs.ret, worker as usize);

        // Its quantum runs out; bookkeeping moves on, execution does not
        for _ in 0..TIME_SLICE {
            s.tick();
        }
        assert_eq!(s.current_task, 2);

        // Task 1's entry returns at the top of its own stack
        assert_eq!(s.retire_stack_owner(cpu.sp), Some(1));
        assert_eq!(s.tasks[1].state, TaskState::Terminated);
        assert_eq!(s.tasks[2].state, TaskState::Running);
        assert_eq!(s.tasks[0].state, TaskState::Ready);

        // An exit on a stack no task owns retires nothing
        assert_eq!(s.retire_stack_owner(boot_top), None);
        assert_eq!(s.running_count(), 1);
    }
}
