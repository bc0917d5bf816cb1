//! mlfq-sim — core interpreter, paged memory manager, and MLFQ scheduler.
//!
//! The crate is organized the way the simulator's data flows: a [`clock`]
//! tick counter, a [`memory`] subsystem (physical store, page tables, the
//! manager that demand-loads and evicts pages), a [`process`] subsystem
//! (PCBs and the ready/io/terminated queues), a [`cpu`] that fetches,
//! decodes, and executes instructions against a process's address space,
//! a [`scheduler`] that dispatches PCBs to the CPU under MLFQ/RR/FCFS, and
//! a [`system`] façade that wires all of the above behind the command
//! surface an external shell speaks.

pub mod clock;
pub mod config;
pub mod cpu;
pub mod error;
pub mod gantt;
pub mod memory;
pub mod process;
pub mod scheduler;
pub mod shared;
pub mod system;

pub use clock::Clock;
pub use config::Config;
pub use error::{SysResult, SystemCode};
pub use system::System;
