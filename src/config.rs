//! Crate-wide configuration.
//!
//! A single plain-data struct with a `Default` impl, the same shape the
//! teacher kernel favors over builder abstractions for small, explicit
//! records (`MemoryStats`, `Context`).

/// Default total size of physical memory, in bytes (matches the original's
/// `'1M'` default).
pub const DEFAULT_MEMORY_SIZE: usize = 1 << 20;

/// Default page size, in bytes: 4 instructions of 6 bytes each.
pub const DEFAULT_PAGE_SIZE: usize = 24;

/// Default number of frames a process may hold resident at once.
pub const DEFAULT_PAGE_LIMIT: usize = 3;

/// Default Round-Robin quantum, in retired instructions.
pub const DEFAULT_RR_QUANTUM: u64 = 10;

/// MLFQ Q1 quantum.
pub const DEFAULT_MLFQ_Q1: u64 = 8;

/// MLFQ Q2 quantum.
pub const DEFAULT_MLFQ_Q2: u64 = 16;

/// FCFS quantum — effectively unbounded.
pub const FCFS_QUANTUM: u64 = 1_000_000;

/// Preemption-ratio threshold that drives MLFQ promotion/demotion.
pub const MLFQ_PROMOTION_RATIO: f64 = 0.2;

/// Number of runs between MLFQ promotion/demotion evaluations.
pub const MLFQ_CHECK_PROMOTE_AT: u32 = 5;

/// Instruction width in bytes. SWIs that must retry rewind `pc` by exactly
/// this many bytes.
pub const INSTRUCTION_WIDTH: u32 = 6;

/// Inclusive bounds of the simulated I/O-wait duration, in ticks.
pub const IO_WAIT_RANGE: (u64, u64) = (1, 50);

/// Everything the system needs to know before it boots: memory geometry,
/// default scheduling quantums, and the RNG seed that makes I/O-wait
/// sampling reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Total physical memory size, in bytes.
    pub memory_size: usize,
    /// Page size, in bytes. May only change while no job is loaded.
    pub page_size: usize,
    /// Default `max_resident_pages` assigned to a newly loaded process.
    pub default_page_limit: usize,
    /// Round-Robin quantum.
    pub rr_quantum: u64,
    /// MLFQ Q1 quantum.
    pub mlfq_q1_quantum: u64,
    /// MLFQ Q2 quantum.
    pub mlfq_q2_quantum: u64,
    /// Seed for the `ChaCha8Rng` used to sample I/O-wait durations, kept
    /// as configuration rather than a process-global so that a given
    /// `Config` reproduces a given run exactly (§9 redesign note).
    pub rng_seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            memory_size: DEFAULT_MEMORY_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            default_page_limit: DEFAULT_PAGE_LIMIT,
            rr_quantum: DEFAULT_RR_QUANTUM,
            mlfq_q1_quantum: DEFAULT_MLFQ_Q1,
            mlfq_q2_quantum: DEFAULT_MLFQ_Q2,
            rng_seed: 0x5EED_u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_original_simulator() {
        let cfg = Config::default();
        assert_eq!(cfg.memory_size, 1 << 20);
        assert_eq!(cfg.page_size, 24);
        assert_eq!(cfg.default_page_limit, 3);
        assert_eq!(cfg.rr_quantum, 10);
        assert_eq!(cfg.mlfq_q1_quantum, 8);
        assert_eq!(cfg.mlfq_q2_quantum, 16);
    }
}
