//! # Architecture Abstraction Layer
//!
//! Ports implement the register-context contract in `context`. The
//! Cortex-M4 port is the real one; the hosted port runs the same contract
//! over a software register file so the kernel can be exercised off-target.

#[cfg(target_os = "none")]
pub mod cortex_m4;

pub mod hosted;
