//! The register-machine interpreter: instruction decode plus the
//! fetch/decode/execute loop and its software-interrupt syscalls.

pub mod instruction;
pub mod interpreter;

pub use instruction::{Instruction, Opcode};
pub use interpreter::{run_quantum, StepOutcome};
