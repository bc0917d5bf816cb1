mod common;

use mlfq_sim::{Config, System};

#[test]
fn sequential_execution_across_ten_pages_faults_once_per_page_and_respects_resident_limit() {
    // page_size=24 bytes = 4 instructions per page; 10 pages of straight-line
    // code touches virtual pages 0..9 exactly once each, in order.
    let mut instructions = Vec::new();
    for i in 0..39u32 {
        instructions.push(common::mvi(0, i));
    }
    instructions.push(common::swi(1));
    let path = common::write_program("mlfq_sim_it_e4.bin", &instructions, 0, 0);

    let config = Config { default_page_limit: 3, ..Config::default() };
    let mut sys = System::new(config);
    let pid = sys.load(&path).unwrap();
    sys.run_scheduler();

    assert_eq!(sys.page_faults(), 10);
    assert!(sys.resident_pages_of(pid).unwrap() <= 3);

    std::fs::remove_file(path).ok();
}
