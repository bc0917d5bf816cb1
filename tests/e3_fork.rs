mod common;

use mlfq_sim::process::pcb::ProcessState;
use mlfq_sim::{Config, System};

#[test]
fn fork_creates_a_child_and_both_terminate() {
    let path = common::write_program("mlfq_sim_it_e3.bin", &[common::swi(10), common::swi(1)], 0, 0);

    let mut sys = System::new(Config::default());
    let parent_pid = sys.load(&path).unwrap();
    sys.run_scheduler();

    let child_pid = parent_pid + 1;
    assert_eq!(sys.registers_of(parent_pid).unwrap()[0], child_pid as i64);
    assert_eq!(sys.registers_of(child_pid).unwrap()[0], 0);

    let rows = sys.ps();
    assert!(rows.iter().all(|r| r.state == ProcessState::Terminated));
    assert_eq!(sys.terminated_queue().len(), 2);

    std::fs::remove_file(path).ok();
}
