//! Process control blocks and the FIFO queues they travel through.

pub mod pcb;
pub mod queue;

pub use pcb::{Pcb, ProcessState};
pub use queue::Queue;
