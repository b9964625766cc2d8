//! # Register Context
//!
//! Layout of the saved register frame and the save/restore contract every
//! port implements.
//!
//! ## Frame Layout (ascending addresses, `sp` points at `r0`)
//!
//! ```text
//!   sp + 0x00  r0   ← first argument
//!   sp + 0x04  r1
//!   sp + 0x08  r2
//!   sp + 0x0C  r3
//!   sp + 0x10  r4   ┐
//!   ...             │ callee-saved
//!   sp + 0x2C  r11  ┘
//!   sp + 0x30  r12  ← temporary (ip)
//!   sp + 0x34  ret  ← resume address, loaded into pc
//! ```
//!
//! This is the order `push {r0-r12, lr}` writes and `pop {r0-r12, pc}` reads
//! on the Cortex-M4 port. The bootstrap frame for a new task is built with
//! the same type, so the first resume of a task cannot be told apart from
//! any later one.

use core::mem::size_of;

use crate::scheduler::{BootDispatch, KernelError, Scheduler};
use crate::task::TaskId;

/// Number of machine words in one saved register frame.
pub const CONTEXT_FRAME_WORDS: usize = 14;

/// Size in bytes of one saved register frame.
pub const CONTEXT_FRAME_BYTES: usize = CONTEXT_FRAME_WORDS * size_of::<usize>();

/// A saved general-purpose register set, exactly as it sits on a task stack.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContextFrame {
    /// Argument registers r0–r3.
    pub args: [usize; 4],
    /// Callee-saved registers r4–r11.
    pub saved: [usize; 8],
    /// Temporary register r12.
    pub scratch: usize,
    /// Resume address.
    pub ret: usize,
}

const _: () = assert!(size_of::<ContextFrame>() == CONTEXT_FRAME_BYTES);

impl ContextFrame {
    /// All registers zero.
    pub const ZERO: Self = Self {
        args: [0; 4],
        saved: [0; 8],
        scratch: 0,
        ret: 0,
    };

    /// Frame for a task that has never run: resumes at `entry` with `arg` in
    /// the first argument register and everything else cleared.
    pub const fn bootstrap(entry: usize, arg: usize) -> Self {
        Self {
            args: [arg, 0, 0, 0],
            saved: [0; 8],
            scratch: 0,
            ret: entry,
        }
    }

    /// The frame as raw words, in stack order.
    pub fn words(&self) -> [usize; CONTEXT_FRAME_WORDS] {
        let mut out = [0usize; CONTEXT_FRAME_WORDS];
        out[..4].copy_from_slice(&self.args);
        out[4..12].copy_from_slice(&self.saved);
        out[12] = self.scratch;
        out[13] = self.ret;
        out
    }
}

/// Write `frame` just below `sp` and return the lowered stack pointer.
///
/// # Safety
/// `sp` must point one past a writable region of at least
/// `CONTEXT_FRAME_WORDS` words, aligned for `usize`.
pub unsafe fn push_frame(sp: *mut usize, frame: &ContextFrame) -> *mut usize {
    let base = sp.sub(CONTEXT_FRAME_WORDS);
    (base as *mut ContextFrame).write(*frame);
    base
}

/// Read the frame stored at `sp` and return it with the retracted stack
/// pointer.
///
/// # Safety
/// `sp` must point at a frame previously written by [`push_frame`] or by a
/// port's save operation.
pub unsafe fn pop_frame(sp: *mut usize) -> (ContextFrame, *mut usize) {
    let frame = (sp as *const ContextFrame).read();
    (frame, sp.add(CONTEXT_FRAME_WORDS))
}

// ---------------------------------------------------------------------------
// Transfer contract
// ---------------------------------------------------------------------------

/// The matched pair used around every voluntary control transfer.
///
/// `save_context` commits the live register set to the top of the active
/// stack and lowers the active stack pointer past it. `restore_context` makes
/// `sp` the active stack pointer, reloads the register set stored there and
/// retracts past it. Both move exactly one [`ContextFrame`].
///
/// No integrity check is performed: a port that moves a different amount
/// silently corrupts control flow.
pub trait ContextTransfer {
    /// Save the live registers; returns the stack pointer to record.
    ///
    /// # Safety
    /// The active stack must have room for one frame.
    unsafe fn save_context(&mut self) -> *mut usize;

    /// Load the registers saved at `sp` and continue from there.
    ///
    /// # Safety
    /// `sp` must point at a complete frame.
    unsafe fn restore_context(&mut self, sp: *mut usize);
}

/// One voluntary yield: save, hand off through the orchestrator, restore.
///
/// The Cortex-M4 port fuses the same three steps into a single naked routine
/// (`arch::cortex_m4::yield_now`); this generic form drives any other port.
///
/// # Safety
/// `cpu`'s active stack must belong to the scheduler's current task and every
/// Ready task must have a valid saved stack pointer.
pub unsafe fn yield_through<C: ContextTransfer>(scheduler: &mut Scheduler, cpu: &mut C) {
    let sp = cpu.save_context();
    let dispatch = crate::sync::guard_switch_window(|| scheduler.switch_context(sp));
    cpu.restore_context(dispatch.stack_pointer);
}

/// Start by direct call: boot `scheduler`, run `on_boot`, then call task 0's
/// entry on the caller's stack. Returns once that entry returns.
///
/// `_port` is the port a scheduled dispatch would move registers through;
/// starting never saves or restores through it. `kernel::start` is the
/// Cortex-M4 form of the same sequence.
///
/// Fails with `KernelError::NoTasks` before `on_boot` runs if the table is
/// empty.
pub fn start_with<C: ContextTransfer>(
    scheduler: &mut Scheduler,
    _port: &mut C,
    on_boot: impl FnOnce(&BootDispatch),
) -> Result<TaskId, KernelError> {
    let dispatch = scheduler.boot()?;
    on_boot(&dispatch);
    dispatch.invoke();
    Ok(dispatch.task)
}

/// Counts of save and restore operations a port has performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferCounts {
    pub saves: usize,
    pub restores: usize,
}
