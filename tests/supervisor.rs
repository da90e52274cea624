use std::{fs, process::Command, thread, time::Duration};

use polyinv::supervisor::{
    descendants, Limits, MemorySampler, ProcessWorker, ProcfsSampler, Status, Supervisor,
    SystemClock, Worker,
};

fn limits(timeout_ms: u64) -> Limits {
    Limits {
        timeout: Some(Duration::from_millis(timeout_ms)),
        memory_limit_mb: None,
        poll_interval: Duration::from_millis(100),
    }
}

/// Returns true if the process is gone or a zombie.
fn is_dead(pid: u32) -> bool {
    match fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rfind(')')
            .and_then(|i| stat[i + 1..].split_whitespace().next())
            .is_some_and(|s| s == "Z" || s == "X"),
        Err(_) => true,
    }
}

#[test]
fn sleeping_worker_times_out() {
    let mut c = Command::new("sleep");
    c.arg("5");
    let mut w = ProcessWorker::spawn(c).unwrap();

    let s = Supervisor::new(limits(1000), ProcfsSampler::new(), SystemClock::new());
    let out = s.run(&mut w);

    assert_eq!(out.status, Status::Tle);
    assert!(out.time >= Duration::from_secs(1), "{:?}", out.time);
    assert!(out.time < Duration::from_secs(2), "{:?}", out.time);
}

#[test]
fn process_tree_is_killed() {
    let mut c = Command::new("sh");
    c.args(["-c", "sleep 30 & sleep 30; wait"]);
    let mut w = ProcessWorker::spawn(c).unwrap();

    thread::sleep(Duration::from_millis(200));
    let tree = descendants(w.id());
    assert!(!tree.is_empty());
    assert!(ProcfsSampler::new().sample(w.id()).is_some_and(|m| m > 0));

    let s = Supervisor::new(limits(300), ProcfsSampler::new(), SystemClock::new());
    assert_eq!(s.run(&mut w).status, Status::Tle);

    thread::sleep(Duration::from_millis(200));
    for p in tree {
        assert!(is_dead(p), "process {} survived", p);
    }
}

#[test]
fn exit_status() {
    let s = Supervisor::new(limits(5000), ProcfsSampler::new(), SystemClock::new());

    let mut w = ProcessWorker::spawn(Command::new("true")).unwrap();
    let out = s.run(&mut w);
    assert_eq!(out.status, Status::Ok);
    assert!(out.time < Duration::from_secs(5));

    let mut c = Command::new("sh");
    c.args(["-c", "exit 3"]);
    let mut w = ProcessWorker::spawn(c).unwrap();
    let out = s.run(&mut w);
    assert_eq!(out.status, Status::Error);
    assert_eq!(out.error.as_deref(), Some("WorkerFailure: exit code 3"));

    // an aborting worker keeps its signal in the error
    let mut c = Command::new("sh");
    c.args(["-c", "kill -ABRT $$"]);
    let mut w = ProcessWorker::spawn(c).unwrap();
    let out = s.run(&mut w);
    assert_eq!(out.status, Status::Error);
    assert_eq!(
        out.error.as_deref(),
        Some(format!("WorkerSignal: killed by signal {}", libc::SIGABRT).as_str())
    );
}
