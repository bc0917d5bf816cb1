mod common;

use mlfq_sim::process::pcb::ProcessState;
use mlfq_sim::scheduler::SchedulingStrategy;
use mlfq_sim::{Config, System};

#[test]
fn single_program_runs_to_completion_under_fcfs() {
    let path = common::write_program(
        "mlfq_sim_it_e1.bin",
        &[
            common::mvi(0, 2),
            common::mvi(1, 3),
            common::add(0, 0, 1),
            common::swi(1),
        ],
        0,
        0,
    );

    let mut sys = System::new(Config::default());
    sys.set_sched(SchedulingStrategy::Fcfs).unwrap();
    let r0 = sys.run(&path).unwrap();
    assert_eq!(r0, 5);

    let pcb = sys
        .ps()
        .into_iter()
        .find(|p| p.state == ProcessState::Terminated)
        .expect("process should have terminated");
    assert_eq!(pcb.turnaround_time, Some(4));
    assert_eq!(pcb.waiting_time, 0);
    assert_eq!(pcb.response_time, Some(0));

    let intervals = sys.gantt();
    assert_eq!(intervals.len(), 1);
    assert_eq!(intervals[0].start, 0);
    assert_eq!(intervals[0].end, 4);

    std::fs::remove_file(path).ok();
}
