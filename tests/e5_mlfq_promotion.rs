mod common;

use mlfq_sim::{Config, System};

#[test]
fn a_cpu_bound_process_is_promoted_twice_then_stays_at_the_top_queue() {
    // Tight infinite loop: ADD R0 R0 R0; B 0 — never yields, never
    // terminates, so every dispatch ends in a full preemption.
    let path = common::write_program("mlfq_sim_it_e5.bin", &[common::add(0, 0, 0), common::b(0)], 0, 0);

    let mut sys = System::new(Config::default());
    let pid = sys.load(&path).unwrap();

    let queue_level = |sys: &System, pid: u64| sys.ps().into_iter().find(|p| p.pid == pid).unwrap().queue_level;

    for _ in 0..5 {
        sys.step();
    }
    assert_eq!(queue_level(&sys, pid), 2);

    for _ in 0..5 {
        sys.step();
    }
    assert_eq!(queue_level(&sys, pid), 3);

    for _ in 0..5 {
        sys.step();
    }
    assert_eq!(queue_level(&sys, pid), 3);

    std::fs::remove_file(path).ok();
}
