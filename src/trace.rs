//! # Diagnostic Trace
//!
//! A single process-wide byte sink for kernel trace lines of the form
//! `[target] message`. Nothing in the kernel depends on a sink being
//! installed; without one every trace call is a no-op.

use core::cell::UnsafeCell;
use core::fmt::{self, Write};

use crate::config::TRACE_ENABLED;

struct GlobalSink {
    inner: UnsafeCell<Option<&'static mut dyn Write>>,
}

// Safety: single core; the sink is installed before interrupts are enabled.
unsafe impl Sync for GlobalSink {}

static SINK: GlobalSink = GlobalSink {
    inner: UnsafeCell::new(None),
};

/// Install the sink that receives every trace line.
///
/// # Safety
/// Must not race with `emit`. Call during init, before `kernel::start`.
pub unsafe fn set_sink(sink: &'static mut dyn Write) {
    *SINK.inner.get() = Some(sink);
}

/// Write one trace line to the installed sink, if any.
pub fn emit(target: &str, args: fmt::Arguments<'_>) {
    if !TRACE_ENABLED {
        return;
    }
    // Safety: see `GlobalSink`.
    let slot = unsafe { &mut *SINK.inner.get() };
    if let Some(sink) = slot.as_mut() {
        let _ = write_line(&mut **sink, target, args);
    }
}

/// Format one `[target] message` line, `\r\n`-terminated for serial
/// consoles.
pub fn write_line<W: Write + ?Sized>(out: &mut W, target: &str, args: fmt::Arguments<'_>) -> fmt::Result {
    out.write_char('[')?;
    out.write_str(target)?;
    out.write_str("] ")?;
    out.write_fmt(args)?;
    out.write_str("\r\n")
}

/// Emit a kernel trace line: `ktrace!("sched", "switch {} -> {}", a, b)`.
#[macro_export]
macro_rules! ktrace {
    ($target:expr, $($arg:tt)*) => {
        $crate::trace::emit($target, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Capture {
        buf: [u8; 64],
        len: usize,
    }

    impl Write for Capture {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            let bytes = s.as_bytes();
            let end = self.len + bytes.len();
            if end > self.buf.len() {
                return Err(fmt::Error);
            }
            self.buf[self.len..end].copy_from_slice(bytes);
            self.len = end;
            Ok(())
        }
    }

    #[test]
    fn test_line_format() {
        let mut cap = Capture { buf: [0; 64], len: 0 };
        write_line(&mut cap, "sched", format_args!("switch {} -> {}", 0, 2)).unwrap();
        assert_eq!(&cap.buf[..cap.len], b"[sched] switch 0 -> 2\r\n");
    }

    #[test]
    fn test_overflowing_sink_reports_error() {
        let mut cap = Capture { buf: [0; 64], len: 60 };
        assert!(write_line(&mut cap, "irq", format_args!("quantum expired")).is_err());
    }
}
