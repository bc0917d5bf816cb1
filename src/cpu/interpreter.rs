//! Fetch/decode/execute loop and the software-interrupt syscall family.

use std::collections::HashMap;

use crate::clock::Clock;
use crate::config::INSTRUCTION_WIDTH;
use crate::cpu::instruction::{Instruction, Opcode};
use crate::error::SystemCode;
use crate::memory::manager::MemoryManager;
use crate::process::pcb::{Pcb, REG_LINK, REG_PC, REG_Z};
use crate::shared::{SharedState, DEFAULT_BUFFER};

/// What happened to a process during one call to [`run_quantum`]. The
/// scheduler's post-run classification (§4.3.1) dispatches on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// `SWI 1` — the process ran to completion.
    Terminated,
    /// `SWI 10` — the scheduler must allocate and admit a child PCB.
    ForkRequested,
    /// `SWI 11` — the scheduler must replace this process's image.
    ExecRequested,
    /// `SWI 12` — the scheduler must check this process's children.
    WaitRequested,
    /// `SWI 20` — move to the I/O queue for a randomly sampled duration.
    IoWait,
    /// `SWI 21` — return to ready immediately, no I/O wait.
    Yielded,
    /// The quantum was fully consumed; `preempt_count` has been bumped
    /// and the PCB moved to READY.
    Preempted,
    /// Execution stopped early without consuming a full quantum and
    /// without any state transition — reaching `code_end`, or a
    /// cooperative retry (`SWI 31` on an empty buffer, `SWI 33` against a
    /// held mutex). The scheduler re-enqueues as-is, no `preempt_count`
    /// bump.
    Rescheduled,
    /// A runtime error (103 invalid instruction, 104 division by zero,
    /// 110 out-of-bounds) halted the quantum. State is left untouched;
    /// the façade logs the code and the scheduler re-enqueues by current
    /// state, per §7.
    RuntimeError(SystemCode),
}

/// Run `pcb` on the CPU for up to `quantum` retired instructions.
pub fn run_quantum(
    pcb: &mut Pcb,
    quantum: u64,
    memory: &mut MemoryManager,
    others: &mut HashMap<u64, Pcb>,
    shared: &mut SharedState,
    clock: &mut Clock,
) -> StepOutcome {
    let mut regs = pcb.registers;
    regs[REG_PC] = pcb.pc as i64;
    let code_end = pcb.layout.code_end;
    let mut time_slice = 0u64;

    macro_rules! commit {
        () => {{
            pcb.registers = regs;
            pcb.pc = regs[REG_PC] as u32;
        }};
    }

    loop {
        if (regs[REG_PC] as u32) >= code_end {
            commit!();
            return StepOutcome::Rescheduled;
        }

        let pc_before = regs[REG_PC] as u32;
        let phys = match memory.translate(pcb, pc_before, others) {
            Ok(addr) => addr,
            Err(code) => {
                commit!();
                return StepOutcome::RuntimeError(code);
            }
        };
        let raw = match memory.physical().read_slice(phys, 6) {
            Ok(bytes) => {
                let mut arr = [0u8; 6];
                arr.copy_from_slice(bytes);
                arr
            }
            Err(code) => {
                commit!();
                return StepOutcome::RuntimeError(code);
            }
        };
        let insn = match Instruction::decode(&raw) {
            Ok(insn) => insn,
            Err(code) => {
                commit!();
                return StepOutcome::RuntimeError(code);
            }
        };
        regs[REG_PC] += INSTRUCTION_WIDTH as i64;

        // Tick before dispatch so any timestamp a syscall stamps (ready,
        // waiting, terminated) reflects this instruction's own retirement.
        clock.tick();
        pcb.execution_time += 1;
        time_slice += 1;

        if let Err(outcome) = execute(&insn, &mut regs, pcb, memory, others, shared, clock) {
            match outcome {
                Dispatched::Halt(code) => {
                    commit!();
                    return code;
                }
            }
        }

        if time_slice == quantum {
            commit!();
            pcb.preempt_count += 1;
            pcb.ready(clock.ticks());
            return StepOutcome::Preempted;
        }
    }
}

enum Dispatched {
    Halt(StepOutcome),
}

#[allow(clippy::too_many_arguments)]
fn execute(
    insn: &Instruction,
    regs: &mut [i64; crate::process::pcb::NUM_REGISTERS],
    pcb: &mut Pcb,
    memory: &mut MemoryManager,
    others: &mut HashMap<u64, Pcb>,
    shared: &mut SharedState,
    clock: &Clock,
) -> Result<(), Dispatched> {
    match insn.opcode {
        Opcode::Add => {
            regs[insn.reg(0)] = regs[insn.reg(1)] + regs[insn.reg(2)];
        }
        Opcode::Sub => {
            regs[insn.reg(0)] = regs[insn.reg(1)] - regs[insn.reg(2)];
        }
        Opcode::Mul => {
            regs[insn.reg(0)] = regs[insn.reg(1)] * regs[insn.reg(2)];
        }
        Opcode::Div => {
            if regs[insn.reg(2)] == 0 {
                return Err(Dispatched::Halt(StepOutcome::RuntimeError(SystemCode::DivisionByZero)));
            }
            regs[insn.reg(0)] = regs[insn.reg(1)] / regs[insn.reg(2)];
        }
        Opcode::Mov => {
            regs[insn.reg(0)] = regs[insn.reg(1)];
        }
        Opcode::Mvi => {
            regs[insn.reg(0)] = insn.u32_at(1) as i64;
        }
        Opcode::Adr => {
            regs[insn.reg(0)] = insn.u32_at(1) as i64;
        }
        Opcode::Str => {
            let addr = regs[insn.reg(1)] as u32;
            let phys = translate_or_halt(memory, pcb, others, addr)?;
            let value = (regs[insn.reg(0)] as u32).to_le_bytes();
            memory
                .physical_mut()
                .write_slice(phys, &value)
                .map_err(|c| Dispatched::Halt(StepOutcome::RuntimeError(c)))?;
        }
        Opcode::Strb => {
            let addr = regs[insn.reg(1)] as u32;
            let phys = translate_or_halt(memory, pcb, others, addr)?;
            let value = regs[insn.reg(0)] as u8;
            memory
                .physical_mut()
                .write_byte(phys, value)
                .map_err(|c| Dispatched::Halt(StepOutcome::RuntimeError(c)))?;
        }
        Opcode::Ldr => {
            let addr = regs[insn.reg(1)] as u32;
            let phys = translate_or_halt(memory, pcb, others, addr)?;
            let bytes = memory
                .physical()
                .read_slice(phys, 4)
                .map_err(|c| Dispatched::Halt(StepOutcome::RuntimeError(c)))?;
            let mut arr = [0u8; 4];
            arr.copy_from_slice(bytes);
            regs[insn.reg(0)] = u32::from_le_bytes(arr) as i64;
        }
        Opcode::Ldrb => {
            let addr = regs[insn.reg(1)] as u32;
            let phys = translate_or_halt(memory, pcb, others, addr)?;
            let byte = memory
                .physical()
                .read_byte(phys)
                .map_err(|c| Dispatched::Halt(StepOutcome::RuntimeError(c)))?;
            regs[insn.reg(0)] = byte as i64;
        }
        Opcode::B => {
            let offset = insn.u32_at(0) as i32;
            regs[REG_PC] = (pcb.layout.code_start as i64) + offset as i64;
        }
        Opcode::Bl => {
            let address = insn.u32_at(0);
            regs[REG_LINK] = regs[REG_PC];
            regs[REG_PC] = address as i64;
        }
        Opcode::Bx => {
            regs[REG_PC] = regs[insn.reg(0)];
        }
        Opcode::Bne => branch_if(regs, pcb, insn, regs[REG_Z] != 0),
        Opcode::Bgt => branch_if(regs, pcb, insn, regs[REG_Z] > 0),
        Opcode::Blt => branch_if(regs, pcb, insn, regs[REG_Z] < 0),
        Opcode::Beq => branch_if(regs, pcb, insn, regs[REG_Z] == 0),
        Opcode::Cmp => {
            regs[REG_Z] = regs[insn.reg(0)] - regs[insn.reg(1)];
        }
        Opcode::And => {
            regs[insn.reg(0)] = regs[insn.reg(1)] & regs[insn.reg(2)];
        }
        Opcode::Orr => {
            regs[REG_Z] = regs[insn.reg(0)] | regs[insn.reg(1)];
        }
        Opcode::Eor => {
            regs[REG_Z] = regs[insn.reg(0)] ^ regs[insn.reg(1)];
        }
        Opcode::Swi => return dispatch_swi(insn.swi_code(), regs, pcb, shared, clock),
    }
    Ok(())
}

fn branch_if(
    regs: &mut [i64; crate::process::pcb::NUM_REGISTERS],
    pcb: &Pcb,
    insn: &Instruction,
    take: bool,
) {
    if take {
        let offset = insn.u32_at(0) as i32;
        regs[REG_PC] = (pcb.layout.code_start as i64) + offset as i64;
    }
}

fn translate_or_halt(
    memory: &mut MemoryManager,
    pcb: &mut Pcb,
    others: &mut HashMap<u64, Pcb>,
    addr: u32,
) -> Result<usize, Dispatched> {
    memory
        .translate(pcb, addr, others)
        .map_err(|c| Dispatched::Halt(StepOutcome::RuntimeError(c)))
}

fn dispatch_swi(
    swi: u16,
    regs: &mut [i64; crate::process::pcb::NUM_REGISTERS],
    pcb: &mut Pcb,
    shared: &mut SharedState,
    clock: &Clock,
) -> Result<(), Dispatched> {
    match swi {
        1 => {
            pcb.registers = *regs;
            pcb.pc = regs[REG_PC] as u32;
            pcb.terminated(clock.ticks());
            Err(Dispatched::Halt(StepOutcome::Terminated))
        }
        2 => {
            log::info!("pid {} print R0={}", pcb.pid, regs[0]);
            Ok(())
        }
        10 => {
            pcb.registers = *regs;
            pcb.pc = regs[REG_PC] as u32;
            Err(Dispatched::Halt(StepOutcome::ForkRequested))
        }
        11 => {
            pcb.registers = *regs;
            pcb.pc = regs[REG_PC] as u32;
            Err(Dispatched::Halt(StepOutcome::ExecRequested))
        }
        12 => {
            pcb.registers = *regs;
            pcb.pc = regs[REG_PC] as u32;
            Err(Dispatched::Halt(StepOutcome::WaitRequested))
        }
        20 => {
            pcb.registers = *regs;
            pcb.pc = regs[REG_PC] as u32;
            pcb.waiting();
            Err(Dispatched::Halt(StepOutcome::IoWait))
        }
        21 => {
            pcb.registers = *regs;
            pcb.pc = regs[REG_PC] as u32;
            pcb.cpu_code = Some(21);
            pcb.waiting();
            Err(Dispatched::Halt(StepOutcome::Yielded))
        }
        30 => {
            shared.push(DEFAULT_BUFFER, regs[0]);
            Ok(())
        }
        31 => match shared.pop(DEFAULT_BUFFER) {
            Some(value) => {
                regs[0] = value;
                Ok(())
            }
            None => {
                regs[REG_PC] -= INSTRUCTION_WIDTH as i64;
                pcb.registers = *regs;
                pcb.pc = regs[REG_PC] as u32;
                Err(Dispatched::Halt(StepOutcome::Rescheduled))
            }
        },
        33 => {
            if shared.test_and_set() {
                Ok(())
            } else {
                regs[REG_PC] -= INSTRUCTION_WIDTH as i64;
                pcb.registers = *regs;
                pcb.pc = regs[REG_PC] as u32;
                Err(Dispatched::Halt(StepOutcome::Rescheduled))
            }
        }
        34 => {
            shared.release();
            Ok(())
        }
        _ => {
            pcb.registers = *regs;
            pcb.pc = regs[REG_PC] as u32;
            Err(Dispatched::Halt(StepOutcome::RuntimeError(SystemCode::InvalidArgs)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_MEMORY_SIZE, DEFAULT_PAGE_LIMIT, DEFAULT_PAGE_SIZE};
    use std::io::Write;

    fn mvi(reg: u8, value: u32) -> [u8; 6] {
        let v = value.to_le_bytes();
        [22, reg, v[0], v[1], v[2], v[3]]
    }

    fn str_(rs: u8, ra: u8) -> [u8; 6] {
        [2, rs, ra, 0, 0, 0]
    }

    fn ldr(rd: u8, ra: u8) -> [u8; 6] {
        [4, rd, ra, 0, 0, 0]
    }

    fn cmp(ra: u8, rb: u8) -> [u8; 6] {
        [12, ra, rb, 0, 0, 0]
    }

    fn branch(opcode: u8, offset: u32) -> [u8; 6] {
        let v = offset.to_le_bytes();
        [opcode, v[0], v[1], v[2], v[3], 0]
    }

    fn swi(code: u8) -> [u8; 6] {
        [20, code, 0, 0, 0, 0]
    }

    /// Writes `data_bytes` worth of zeroed data region followed by
    /// `instructions`, with `entry_pc == data_bytes` so the code region
    /// starts right after it.
    fn write_program(name: &str, data_bytes: usize, instructions: &[[u8; 6]]) -> std::path::PathBuf {
        let entry_pc = data_bytes as u32;
        let mut image = vec![0u8; data_bytes];
        for insn in instructions {
            image.extend_from_slice(insn);
        }
        let path = std::env::temp_dir().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&(image.len() as u32).to_le_bytes()).unwrap();
        f.write_all(&entry_pc.to_le_bytes()).unwrap();
        f.write_all(&0u32.to_le_bytes()).unwrap();
        f.write_all(&image).unwrap();
        path
    }

    /// Loads `path` into a fresh `Pcb` and `MemoryManager`, then runs it
    /// to completion (or until the quantum is exhausted).
    fn load_and_run(path: &std::path::Path, quantum: u64) -> (Pcb, StepOutcome) {
        let mut memory = MemoryManager::new(DEFAULT_MEMORY_SIZE, DEFAULT_PAGE_SIZE, DEFAULT_PAGE_LIMIT);
        let descriptor = memory.prepare_program(path).unwrap();
        let mut pcb = Pcb::new(1, path.display().to_string(), 0);
        memory.load_to_memory(&mut pcb, descriptor);
        let mut others = HashMap::new();
        let mut shared = SharedState::new();
        let mut clock = Clock::new();
        let outcome = run_quantum(&mut pcb, quantum, &mut memory, &mut others, &mut shared, &mut clock);
        (pcb, outcome)
    }

    #[test]
    fn str_then_ldr_round_trips_through_translated_memory() {
        let path = write_program(
            "mlfq_sim_it_interp_str_ldr.bin",
            DEFAULT_PAGE_SIZE,
            &[
                mvi(1, 0),   // R1 = data address 0
                mvi(0, 99),  // R0 = 99
                str_(0, 1),  // [R1] = R0
                mvi(0, 0),   // clobber R0 so the LDR below proves the round trip
                ldr(0, 1),   // R0 = [R1]
                swi(1),
            ],
        );
        let (pcb, outcome) = load_and_run(&path, 100);
        assert_eq!(outcome, StepOutcome::Terminated);
        assert_eq!(pcb.registers[0], 99);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn strb_round_trips_through_translated_memory_like_str() {
        // Pins the deliberate deviation from the original's `_strb`, which
        // indexes physical memory directly instead of translating first.
        let path = write_program(
            "mlfq_sim_it_interp_strb_ldrb.bin",
            DEFAULT_PAGE_SIZE,
            &[
                mvi(1, 1), // R1 = data address 1
                mvi(0, 7), // R0 = 7
                [3, 0, 1, 0, 0, 0], // STRB R0, R1
                mvi(0, 0),
                [5, 0, 1, 0, 0, 0], // LDRB R0, R1
                swi(1),
            ],
        );
        let (pcb, outcome) = load_and_run(&path, 100);
        assert_eq!(outcome, StepOutcome::Terminated);
        assert_eq!(pcb.registers[0], 7);
        std::fs::remove_file(path).ok();
    }

    fn branch_family_case(opcode: u8, name: &str, z_lhs: i64, z_rhs: i64) {
        // CMP sets Z = lhs - rhs, then the conditional branch jumps to
        // code_start + offset, landing on the MVI that sets R0 = 42 and
        // skipping the MVI that would set it to 13.
        let path = write_program(
            &format!("mlfq_sim_it_interp_branch_{name}.bin"),
            0,
            &[
                mvi(2, z_lhs as u32),
                mvi(3, z_rhs as u32),
                cmp(2, 3),
                branch(opcode, 30), // code_start (0) + 30 == the MVI R0, 42 below
                mvi(0, 13),
                mvi(0, 42),
                swi(1),
            ],
        );
        let (pcb, outcome) = load_and_run(&path, 100);
        assert_eq!(outcome, StepOutcome::Terminated, "{name}");
        assert_eq!(pcb.registers[0], 42, "{name} did not branch to code_start + offset");
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn bne_branches_to_code_start_plus_offset_when_not_equal() {
        branch_family_case(8, "bne", 1, 2);
    }

    #[test]
    fn bgt_branches_to_code_start_plus_offset_when_greater() {
        branch_family_case(9, "bgt", 5, 2);
    }

    #[test]
    fn blt_branches_to_code_start_plus_offset_when_less() {
        branch_family_case(10, "blt", 2, 5);
    }

    #[test]
    fn beq_branches_to_code_start_plus_offset_when_equal() {
        branch_family_case(11, "beq", 4, 4);
    }

    #[test]
    fn division_by_zero_halts_the_quantum_with_the_documented_code() {
        let path = write_program(
            "mlfq_sim_it_interp_divzero.bin",
            0,
            &[mvi(0, 10), mvi(1, 0), [19, 0, 0, 1, 0, 0], swi(1)],
        );
        let (_pcb, outcome) = load_and_run(&path, 100);
        assert_eq!(outcome, StepOutcome::RuntimeError(SystemCode::DivisionByZero));
        std::fs::remove_file(path).ok();
    }
}
