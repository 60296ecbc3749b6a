#![no_std]
#![forbid(unsafe_code)]

//! # HDX State Machines
//!
//! Two dispatch engines for active objects:
//! - [`Stm`]: flat machines with a single active state
//! - [`Hsm`]: hierarchical machines with one active state per nesting level
//!
//! Both drive user behavior through the reserved `ENTRY`, `EXIT` and `INIT`
//! pseudo-events and implement [`hdx_core::ActiveObject`], so the kernel can
//! schedule either kind.

#[cfg(test)]
extern crate std;

pub mod hsm;
pub mod stm;

pub use hsm::*;
pub use stm::*;


/// Maximum nesting depth for hierarchical machines
pub const MAX_STATE_DEPTH: usize = 8;
