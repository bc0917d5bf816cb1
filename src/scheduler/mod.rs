//! The multi-level feedback scheduler: admission, ready-queue rotation,
//! MLFQ promotion/demotion, and fork/exec/wait bookkeeping.

use std::collections::{HashMap, VecDeque};

use crate::config::{Config, FCFS_QUANTUM, MLFQ_CHECK_PROMOTE_AT, MLFQ_PROMOTION_RATIO};
use crate::error::SystemCode;
use crate::process::pcb::{Pcb, ProcessState};
use crate::process::queue::Queue;

/// The three scheduling disciplines the façade may select between.
/// Strategy may only change while all ready queues are empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingStrategy {
    Fcfs,
    Rr,
    Mlfq,
}

/// Owns the canonical process table and every queue a PCB passes through.
/// Queues hold PIDs; [`Scheduler::processes`] is the single place a
/// [`Pcb`] actually lives (§9: "the scheduler owns all subsystems").
#[derive(Debug)]
pub struct Scheduler {
    pub processes: HashMap<u64, Pcb>,
    strategy: SchedulingStrategy,
    mlfq_index: usize,
    check_promote_at: u32,

    pub job_queue: VecDeque<u64>,
    pub q1: Queue,
    pub q2: Queue,
    pub q3: Queue,
    pub io_queue: Vec<u64>,
    pub terminated_queue: Vec<u64>,
}

impl Scheduler {
    pub fn new(config: &Config) -> Self {
        Scheduler {
            processes: HashMap::new(),
            strategy: SchedulingStrategy::Mlfq,
            mlfq_index: 0,
            check_promote_at: MLFQ_CHECK_PROMOTE_AT,
            job_queue: VecDeque::new(),
            q1: Queue::new(config.mlfq_q1_quantum),
            q2: Queue::new(config.mlfq_q2_quantum),
            q3: Queue::new(FCFS_QUANTUM),
            io_queue: Vec::new(),
            terminated_queue: Vec::new(),
        }
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// Switch scheduling strategy. Fails while any ready queue holds a
    /// process, mirroring the original's `set_strategy`.
    pub fn set_strategy(&mut self, strategy: SchedulingStrategy, config: &Config) -> Result<(), SystemCode> {
        if !self.q1.is_empty() || !self.q2.is_empty() || !self.q3.is_empty() {
            return Err(SystemCode::InvalidArgs);
        }
        match strategy {
            SchedulingStrategy::Fcfs => self.q1.set_quantum(FCFS_QUANTUM),
            SchedulingStrategy::Rr => self.q1.set_quantum(config.rr_quantum),
            SchedulingStrategy::Mlfq => {
                self.q1.set_quantum(config.mlfq_q1_quantum);
                self.q2.set_quantum(config.mlfq_q2_quantum);
            }
        }
        self.strategy = strategy;
        Ok(())
    }

    pub fn set_rr_quantum(&mut self, quantum: u64) {
        self.q1.set_quantum(quantum);
    }

    pub fn set_mlfq_quantums(&mut self, q1: u64, q2: u64) {
        self.q1.set_quantum(q1);
        self.q2.set_quantum(q2);
    }

    pub fn quantums(&self) -> (u64, u64, u64) {
        (self.q1.quantum(), self.q2.quantum(), self.q3.quantum())
    }

    /// Register a newly admitted PCB and park it in `job_queue`, kept
    /// sorted by arrival time as the original maintains.
    pub fn admit(&mut self, pcb: Pcb) {
        let pid = pcb.pid;
        let arrival = pcb.arrival_time;
        self.processes.insert(pid, pcb);
        let pos = self
            .job_queue
            .iter()
            .position(|p| self.processes[p].arrival_time > arrival)
            .unwrap_or(self.job_queue.len());
        self.job_queue.insert(pos, pid);
    }

    pub fn jobs_in_ready_queue(&self) -> bool {
        !self.q1.is_empty() || !self.q2.is_empty() || !self.q3.is_empty()
    }

    pub fn jobs_in_any_queue(&self) -> bool {
        self.jobs_in_ready_queue()
            || !self.job_queue.is_empty()
            || !self.io_queue.is_empty()
    }

    /// Admit arrived jobs into Q1 once memory admission succeeds. Stops
    /// at the first PCB whose `arrival_time` is still in the future,
    /// since `job_queue` is kept sorted.
    pub fn check_new_jobs(
        &mut self,
        clock_ticks: u64,
        mut try_load: impl FnMut(&mut Pcb) -> bool,
    ) {
        loop {
            let Some(&pid) = self.job_queue.front() else { break };
            let arrival = self.processes[&pid].arrival_time;
            if arrival > clock_ticks {
                break;
            }
            let pcb = self.processes.get_mut(&pid).expect("admitted pcb missing");
            if try_load(pcb) {
                self.job_queue.pop_front();
                self.q1.add_process(pid);
            } else {
                break;
            }
        }
    }

    /// Move any I/O-complete PCB back into a ready queue.
    pub fn check_io_complete(&mut self, clock_ticks: u64) {
        let mut i = 0;
        while i < self.io_queue.len() {
            let pid = self.io_queue[i];
            let due = self.processes[&pid].wait_until.unwrap_or(u64::MAX);
            if clock_ticks >= due {
                self.io_queue.remove(i);
                if let Some(pcb) = self.processes.get_mut(&pid) {
                    pcb.ready(clock_ticks);
                }
                self.put_process_back(pid);
            } else {
                i += 1;
            }
        }
    }

    /// Pop the next `(pid, quantum)` to dispatch, per the active
    /// strategy.
    pub fn get_next_job(&mut self) -> Option<(u64, u64)> {
        match self.strategy {
            SchedulingStrategy::Fcfs | SchedulingStrategy::Rr => {
                let quantum = self.q1.quantum();
                self.q1.get_process().map(|pid| (pid, quantum))
            }
            SchedulingStrategy::Mlfq => {
                for _ in 0..3 {
                    let queue = match self.mlfq_index {
                        0 => &mut self.q1,
                        1 => &mut self.q2,
                        _ => &mut self.q3,
                    };
                    let quantum = queue.quantum();
                    self.mlfq_index = (self.mlfq_index + 1) % 3;
                    if !queue.is_empty() {
                        return queue.get_process().map(|pid| (pid, quantum));
                    }
                }
                None
            }
        }
    }

    /// Mark `pid` as having been dispatched for one more run.
    pub fn begin_run(&mut self, pid: u64, clock_ticks: u64) {
        if let Some(pcb) = self.processes.get_mut(&pid) {
            pcb.ready(clock_ticks);
            pcb.run_count += 1;
            pcb.running();
        }
    }

    /// Re-enqueue `pid` into the queue matching its current level,
    /// applying MLFQ promotion/demotion first.
    pub fn put_process_back(&mut self, pid: u64) {
        if self.strategy == SchedulingStrategy::Mlfq {
            self.check_for_promotion(pid);
        }
        let level = self.processes.get(&pid).map(|p| p.queue_level).unwrap_or(1);
        match level {
            1 => self.q1.add_process(pid),
            2 => self.q2.add_process(pid),
            _ => self.q3.add_process(pid),
        }
    }

    fn check_for_promotion(&mut self, pid: u64) {
        let Some(pcb) = self.processes.get_mut(&pid) else { return };
        if pcb.run_count != self.check_promote_at {
            return;
        }
        let ratio = pcb.preempt_count as f64 / pcb.run_count as f64;
        if ratio > MLFQ_PROMOTION_RATIO {
            pcb.queue_level = (pcb.queue_level + 1).min(3);
        } else if ratio < MLFQ_PROMOTION_RATIO {
            pcb.queue_level = pcb.queue_level.saturating_sub(1).max(1);
        }
        pcb.preempt_count = 0;
        pcb.run_count = 0;
    }

    /// `fork()` — allocate a child PCB sharing the parent's image, per
    /// §4.3.3. Returns the new child pid.
    pub fn fork(&mut self, parent_pid: u64, next_pid: &mut u64, clock_ticks: u64) -> u64 {
        let child_pid = *next_pid;
        *next_pid += 1;

        let parent = self.processes.get_mut(&parent_pid).expect("fork: unknown parent");
        let mut child = parent.make_child(child_pid, clock_ticks);
        parent.registers[0] = child_pid as i64;
        parent.state = ProcessState::Ready;
        child.registers[0] = 0;
        child.state = ProcessState::Ready;

        self.processes.insert(child_pid, child);
        self.q1.add_process(child_pid);
        child_pid
    }

    /// `wait()` — a parent polls whether all its children have
    /// terminated. Always returns the parent to READY so it re-polls on
    /// its next quantum (§4.3.3): the simulator is single-threaded, so
    /// there is no true block.
    pub fn wait(&mut self, pid: u64, clock_ticks: u64) -> bool {
        let all_terminated = self
            .processes
            .get(&pid)
            .map(|p| {
                p.children
                    .iter()
                    .all(|c| self.processes.get(c).map(|c| c.state == ProcessState::Terminated).unwrap_or(true))
            })
            .unwrap_or(true);
        if let Some(pcb) = self.processes.get_mut(&pid) {
            pcb.ready(clock_ticks);
        }
        all_terminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_scheduler() -> Scheduler {
        Scheduler::new(&Config::default())
    }

    #[test]
    fn mlfq_round_robins_across_queues() {
        let mut s = make_scheduler();
        s.processes.insert(1, Pcb::new(1, "a".into(), 0));
        s.processes.insert(2, Pcb::new(2, "b".into(), 0));
        s.q1.add_process(1);
        s.q2.add_process(2);
        let (first, _) = s.get_next_job().unwrap();
        assert_eq!(first, 1);
        let (second, _) = s.get_next_job().unwrap();
        assert_eq!(second, 2);
    }

    #[test]
    fn promotion_triggers_after_check_promote_at_runs_with_high_preemption() {
        let mut s = make_scheduler();
        let mut pcb = Pcb::new(1, "a".into(), 0);
        pcb.run_count = 5;
        pcb.preempt_count = 5;
        s.processes.insert(1, pcb);
        s.put_process_back(1);
        assert_eq!(s.processes[&1].queue_level, 2);
        assert_eq!(s.processes[&1].run_count, 0);
    }

    #[test]
    fn demotion_triggers_after_check_promote_at_runs_with_low_preemption() {
        let mut s = make_scheduler();
        let mut pcb = Pcb::new(1, "a".into(), 0);
        pcb.queue_level = 2;
        pcb.run_count = 5;
        pcb.preempt_count = 0;
        s.processes.insert(1, pcb);
        s.put_process_back(1);
        assert_eq!(s.processes[&1].queue_level, 1);
    }

    #[test]
    fn fork_sets_parent_and_child_registers() {
        let mut s = make_scheduler();
        s.processes.insert(1, Pcb::new(1, "a".into(), 0));
        let mut next_pid = 2u64;
        let child = s.fork(1, &mut next_pid, 0);
        assert_eq!(child, 2);
        assert_eq!(s.processes[&1].registers[0], 2);
        assert_eq!(s.processes[&2].registers[0], 0);
    }
}
