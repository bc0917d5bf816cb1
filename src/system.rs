//! The system façade: owns every subsystem and exposes the command
//! surface an external shell speaks (§6).

use std::path::{Path, PathBuf};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::clock::Clock;
use crate::config::{Config, IO_WAIT_RANGE};
use crate::cpu::interpreter::{run_quantum, StepOutcome};
use crate::error::SystemCode;
use crate::gantt::GanttTrace;
use crate::memory::manager::MemoryManager;
use crate::process::pcb::Pcb;
use crate::scheduler::{Scheduler, SchedulingStrategy};
use crate::shared::SharedState;

/// Observational mode flag: toggled around every command dispatch,
/// gating nothing beyond a logged transition (§1's "no protection...
/// beyond a mode flag").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    User,
    Kernel,
}

/// One entry in the in-memory error log (§7): every `SystemCode` with
/// `code() >= 100` routed through [`System::system_code`] is appended
/// here and logged.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub program: Option<String>,
    pub code: SystemCode,
    pub message: Option<String>,
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code)?;
        if let Some(program) = &self.program {
            write!(f, " ({})", program)?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

/// A single row of the `ps`/state-table view (§6 `ps`).
#[derive(Debug, Clone)]
pub struct ProcessSummary {
    pub pid: u64,
    pub file: String,
    pub state: crate::process::pcb::ProcessState,
    pub queue_level: u8,
    pub arrival_time: u64,
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
    pub turnaround_time: Option<u64>,
    pub waiting_time: u64,
    pub response_time: Option<u64>,
}

/// The fixed program image `exec()` replaces a process's image with
/// (§4.3.3). Configurable so tests don't depend on a file on disk.
const DEFAULT_CHILD_EXEC_PROGRAM: &str = "child.bin";

/// Owns the clock, memory manager, scheduler, shared-memory/mutex state,
/// Gantt trace, error log, and RNG; exposes the command surface of §6.
pub struct System {
    config: Config,
    clock: Clock,
    memory: MemoryManager,
    scheduler: Scheduler,
    shared: SharedState,
    gantt: GanttTrace,
    errors: Vec<ErrorRecord>,
    rng: ChaCha8Rng,
    next_pid: u64,
    mode: Mode,
    last_registers: Option<[i64; crate::process::pcb::NUM_REGISTERS]>,
    child_exec_program: PathBuf,
}

impl System {
    pub fn new(config: Config) -> Self {
        let memory = MemoryManager::new(config.memory_size, config.page_size, config.default_page_limit);
        let scheduler = Scheduler::new(&config);
        let rng = ChaCha8Rng::seed_from_u64(config.rng_seed);
        System {
            clock: Clock::new(),
            memory,
            scheduler,
            shared: SharedState::new(),
            gantt: GanttTrace::new(),
            errors: Vec::new(),
            rng,
            next_pid: 1,
            mode: Mode::User,
            last_registers: None,
            child_exec_program: PathBuf::from(DEFAULT_CHILD_EXEC_PROGRAM),
            config,
        }
    }

    fn switch_mode(&mut self) {
        self.mode = match self.mode {
            Mode::User => Mode::Kernel,
            Mode::Kernel => Mode::User,
        };
        log::trace!("mode switched to {:?}", self.mode);
    }

    /// Run `body` with the observational USER/KERNEL toggle wrapped
    /// around it, the way the original's `call()` does for every
    /// dispatched command.
    fn dispatch<T>(&mut self, body: impl FnOnce(&mut Self) -> T) -> T {
        self.switch_mode();
        let result = body(self);
        self.switch_mode();
        result
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// The register file of a specific process, by pid (`registers <pid>`,
    /// §6), regardless of whether it most recently ran.
    pub fn registers_of(&self, pid: u64) -> Option<[i64; crate::process::pcb::NUM_REGISTERS]> {
        self.scheduler.processes.get(&pid).map(|pcb| pcb.registers)
    }

    pub fn registers(&self) -> Option<&[i64; crate::process::pcb::NUM_REGISTERS]> {
        self.last_registers.as_ref()
    }

    /// Number of page faults serviced across every process so far.
    pub fn page_faults(&self) -> u64 {
        self.memory.page_faults()
    }

    /// How many of `pid`'s pages are currently resident.
    pub fn resident_pages_of(&self, pid: u64) -> Option<usize> {
        self.scheduler.processes.get(&pid).map(|pcb| pcb.resident_pages())
    }

    /// Route an error (or success) code through the façade's logging
    /// sink, per §7: informational codes (0, 1) return immediately;
    /// everything else is appended to the error log and logged.
    pub fn system_code(&mut self, code: SystemCode, message: Option<String>, program: Option<String>) {
        if code.is_informational() {
            return;
        }
        log::warn!("system error: {} ({:?})", code, program);
        self.errors.push(ErrorRecord { program, code, message });
    }

    // ---- Admission -----------------------------------------------------

    fn next_pid(&mut self) -> u64 {
        let pid = self.next_pid;
        self.next_pid += 1;
        pid
    }

    /// `load <path>` — prepare and eagerly load one program, admitting it
    /// into the job queue at the current clock tick.
    pub fn load(&mut self, path: &Path) -> Result<u64, SystemCode> {
        self.dispatch(|this| {
            let descriptor = this.memory.prepare_program(path)?;
            let pid = this.next_pid();
            let mut pcb = Pcb::new(pid, path.display().to_string(), this.clock.ticks());
            this.memory.load_to_memory(&mut pcb, descriptor);
            this.scheduler.admit(pcb);
            Ok(pid)
        })
    }

    /// `execute <path1> <t1> [<path2> <t2> ...]` — admit each program with
    /// its arrival time, then run the scheduler to completion.
    pub fn execute(&mut self, programs: &[(PathBuf, u64)]) -> Result<(), SystemCode> {
        if programs.is_empty() {
            return Err(SystemCode::InvalidArgs);
        }
        self.dispatch(|this| {
            for (path, arrival_time) in programs {
                this.memory.prepare_program(path)?;
                let pid = this.next_pid();
                let pcb = Pcb::new(pid, path.display().to_string(), *arrival_time);
                this.scheduler.admit(pcb);
            }
            Ok(())
        })?;
        self.run_scheduler();
        Ok(())
    }

    /// `run <path>` — admit a single program at the current clock tick and
    /// run it alone to completion, returning its final `R0`.
    pub fn run(&mut self, path: &Path) -> Result<i64, SystemCode> {
        let pid = self.load(path)?;
        self.run_scheduler();
        let r0 = self
            .scheduler
            .processes
            .get(&pid)
            .map(|pcb| pcb.registers[0])
            .ok_or(SystemCode::InvalidSize)?;
        Ok(r0)
    }

    // ---- Scheduler main loop (§4.3) ------------------------------------

    /// Drive the scheduler until every queue (job, ready tiers, I/O) is
    /// empty: admit arrivals, complete I/O, dispatch one PCB for up to a
    /// quantum, record its Gantt interval, then classify the outcome.
    pub fn run_scheduler(&mut self) {
        while self.step() {}
    }

    /// Advance the scheduler by one dispatch: admit arrivals, complete I/O,
    /// then either run one PCB for up to a quantum or record an idle tick.
    /// Returns `false` once every queue is empty. Useful for stepping
    /// through a run (e.g. to observe MLFQ promotion mid-flight) without
    /// driving it to completion.
    pub fn step(&mut self) -> bool {
        if !self.scheduler.jobs_in_any_queue() {
            return false;
        }
        let ticks = self.clock.ticks();
        let memory = &mut self.memory;
        self.scheduler.check_new_jobs(ticks, |pcb| {
            match memory.prepare_program(Path::new(&pcb.file)) {
                Ok(descriptor) if memory.check_memory_available(&descriptor) => {
                    memory.load_to_memory(pcb, descriptor);
                    true
                }
                _ => false,
            }
        });
        self.scheduler.check_io_complete(ticks);

        if self.scheduler.jobs_in_ready_queue() {
            let (pid, quantum) = self.scheduler.get_next_job().expect("non-empty ready queue");
            self.run_one(pid, quantum);
        } else {
            self.gantt.record_idle(self.clock.ticks());
            self.clock.tick();
        }
        true
    }

    fn run_one(&mut self, pid: u64, quantum: u64) {
        let start = self.clock.ticks();
        self.scheduler.begin_run(pid, start);

        let mut pcb = self.scheduler.processes.remove(&pid).expect("scheduled pid vanished");
        let queue_level = pcb.queue_level;
        let outcome = run_quantum(
            &mut pcb,
            quantum,
            &mut self.memory,
            &mut self.scheduler.processes,
            &mut self.shared,
            &mut self.clock,
        );
        self.last_registers = Some(pcb.registers);
        self.scheduler.processes.insert(pid, pcb);

        let end = self.clock.ticks();
        self.gantt.record_run(pid, queue_level, start, end);

        self.classify(pid, outcome);
    }

    fn classify(&mut self, pid: u64, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Terminated => {
                if let Some(pcb) = self.scheduler.processes.get_mut(&pid) {
                    self.memory.free_memory(pcb);
                }
                self.scheduler.terminated_queue.push(pid);
            }
            StepOutcome::ForkRequested => {
                let clock_ticks = self.clock.ticks();
                let child = self.scheduler.fork(pid, &mut self.next_pid, clock_ticks);
                self.memory.share_image_on_fork(pid, child);
                log::info!("pid {} forked child {}", pid, child);
                self.scheduler.put_process_back(pid);
            }
            StepOutcome::ExecRequested => {
                self.handle_exec(pid);
                self.scheduler.put_process_back(pid);
            }
            StepOutcome::WaitRequested => {
                let clock_ticks = self.clock.ticks();
                let done = self.scheduler.wait(pid, clock_ticks);
                if done {
                    log::info!("pid {} has waited for all children to terminate", pid);
                }
                self.scheduler.put_process_back(pid);
            }
            StepOutcome::IoWait => {
                let wait_for = self.rng.gen_range(IO_WAIT_RANGE.0..=IO_WAIT_RANGE.1);
                let wait_until = self.clock.ticks() + wait_for;
                if let Some(pcb) = self.scheduler.processes.get_mut(&pid) {
                    pcb.wait_until = Some(wait_until);
                }
                self.scheduler.io_queue.push(pid);
            }
            StepOutcome::Yielded => {
                let ticks = self.clock.ticks();
                if let Some(pcb) = self.scheduler.processes.get_mut(&pid) {
                    pcb.wait_until = Some(ticks);
                    pcb.ready(ticks);
                }
                self.scheduler.put_process_back(pid);
            }
            StepOutcome::Preempted => {
                self.scheduler.put_process_back(pid);
            }
            StepOutcome::Rescheduled => {
                let ticks = self.clock.ticks();
                if let Some(pcb) = self.scheduler.processes.get_mut(&pid) {
                    pcb.ready(ticks);
                }
                self.scheduler.put_process_back(pid);
            }
            StepOutcome::RuntimeError(code) => {
                let program = self.scheduler.processes.get(&pid).map(|p| p.file.clone());
                self.system_code(code, None, program);
                self.scheduler.put_process_back(pid);
            }
        }
    }

    fn handle_exec(&mut self, pid: u64) {
        let descriptor = match self.memory.prepare_program(&self.child_exec_program.clone()) {
            Ok(d) => d,
            Err(code) => {
                self.system_code(code, None, Some(pid.to_string()));
                return;
            }
        };
        if let Some(pcb) = self.scheduler.processes.get_mut(&pid) {
            self.memory.load_to_memory(pcb, descriptor);
            pcb.ready(self.clock.ticks());
        }
    }

    // ---- Reporting / command surface -----------------------------------

    /// `coredump` — always writes `memory.txt`; `verbose` additionally
    /// returns the dump for display (§6).
    pub fn coredump(&self, verbose: bool) -> Option<String> {
        let dump = self.memory.physical().hex_dump();
        std::fs::write("memory.txt", &dump).ok();
        verbose.then_some(dump)
    }

    pub fn errordump(&self, verbose: bool) {
        if verbose {
            for e in &self.errors {
                log::info!("{}", e);
            }
        } else {
            let body: String = self.errors.iter().map(|e| format!("{}\n", e)).collect();
            std::fs::write("errors.txt", body).ok();
        }
    }

    pub fn job_queue(&self) -> Vec<u64> {
        self.scheduler.job_queue.iter().copied().collect()
    }

    pub fn ready_queue(&self) -> Vec<u64> {
        self.scheduler
            .q1
            .iter()
            .chain(self.scheduler.q2.iter())
            .chain(self.scheduler.q3.iter())
            .copied()
            .collect()
    }

    pub fn io_queue(&self) -> Vec<u64> {
        self.scheduler.io_queue.clone()
    }

    pub fn terminated_queue(&self) -> Vec<u64> {
        self.scheduler.terminated_queue.clone()
    }

    pub fn ps(&self) -> Vec<ProcessSummary> {
        let mut rows: Vec<ProcessSummary> = self
            .scheduler
            .processes
            .values()
            .map(|pcb| ProcessSummary {
                pid: pcb.pid,
                file: pcb.file.clone(),
                state: pcb.state,
                queue_level: pcb.queue_level,
                arrival_time: pcb.arrival_time,
                start_time: pcb.start_time,
                end_time: pcb.end_time,
                turnaround_time: pcb.turnaround_time,
                waiting_time: pcb.waiting_time,
                response_time: pcb.response_time,
            })
            .collect();
        rows.sort_by_key(|r| r.pid);
        rows
    }

    pub fn set_sched(&mut self, strategy: SchedulingStrategy) -> Result<(), SystemCode> {
        self.scheduler.set_strategy(strategy, &self.config)
    }

    pub fn set_rr(&mut self, q1: u64, q2: u64) {
        self.scheduler.set_mlfq_quantums(q1, q2);
    }

    pub fn quantums(&self) -> (u64, u64, u64) {
        self.scheduler.quantums()
    }

    pub fn gantt(&self) -> &[crate::gantt::GanttInterval] {
        self.gantt.intervals()
    }

    /// `gantt_graph` — plotting itself is an external collaborator (§1);
    /// this hands back the same trace a plotting driver would render.
    pub fn gantt_graph(&self) -> &[crate::gantt::GanttInterval] {
        self.gantt.intervals()
    }

    pub fn shm_open(&mut self, name: &str) {
        self.shared.shm_open(name);
    }

    pub fn shm_unlink(&mut self, name: &str) {
        self.shared.shm_unlink(name);
    }

    pub fn shared_memory(&self, name: &str) -> Option<Vec<i64>> {
        self.shared.peek(name).map(|b| b.iter().copied().collect())
    }

    pub fn mutex_locked(&self) -> bool {
        self.shared.mutex_locked()
    }

    /// Page size in instructions (`getpagesize`, §6): the byte size divided
    /// by the fixed instruction width.
    pub fn get_page_size(&self) -> usize {
        self.memory.page_size() / crate::config::INSTRUCTION_WIDTH as usize
    }

    /// `setpagesize <lines>` — `lines` is a count of instructions, converted
    /// to bytes for the memory manager.
    pub fn set_page_size(&mut self, lines: usize) -> Result<(), SystemCode> {
        self.memory.set_page_size(lines * crate::config::INSTRUCTION_WIDTH as usize)
    }

    pub fn get_page_number(&self) -> usize {
        self.memory.page_limit()
    }

    pub fn set_page_number(&mut self, n: usize) {
        self.memory.set_page_limit(n);
    }

    pub fn reset(&mut self) {
        let config = self.config;
        *self = System::new(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_program(name: &str, instructions: &[[u8; 6]], entry_pc: u32) -> PathBuf {
        let dir = std::env::temp_dir();
        let path = dir.join(name);
        let mut image = Vec::new();
        for insn in instructions {
            image.extend_from_slice(insn);
        }
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&(image.len() as u32).to_le_bytes()).unwrap();
        f.write_all(&entry_pc.to_le_bytes()).unwrap();
        f.write_all(&0u32.to_le_bytes()).unwrap();
        f.write_all(&image).unwrap();
        path
    }

    fn mvi(reg: u8, value: u32) -> [u8; 6] {
        let v = value.to_le_bytes();
        [22, reg, v[0], v[1], v[2], v[3]]
    }

    fn add(rd: u8, rs: u8, rt: u8) -> [u8; 6] {
        [16, rd, rs, rt, 0, 0]
    }

    fn swi(code: u8) -> [u8; 6] {
        [20, code, 0, 0, 0, 0]
    }

    #[test]
    fn e1_single_program_fcfs_terminates_with_expected_registers() {
        let path = write_program(
            "mlfq_sim_test_e1.bin",
            &[mvi(0, 2), mvi(1, 3), add(0, 0, 1), swi(1)],
            0,
        );
        let mut sys = System::new(Config::default());
        sys.set_sched(SchedulingStrategy::Fcfs).unwrap();
        let r0 = sys.run(&path).unwrap();
        assert_eq!(r0, 5);
        let summary = sys.ps();
        let pcb = summary.into_iter().find(|p| p.state == crate::process::pcb::ProcessState::Terminated);
        assert!(pcb.is_some());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn idle_ticks_are_recorded_when_nothing_is_ready() {
        let path = write_program("mlfq_sim_test_idle.bin", &[swi(1)], 0);
        let mut sys = System::new(Config::default());
        sys.execute(&[(path.clone(), 3)]).unwrap();
        assert!(sys.gantt().iter().any(|i| i.pid.is_none()));
        std::fs::remove_file(path).ok();
    }
}
