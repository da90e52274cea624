//! Resource-bounded execution of pipeline stages in worker processes.
//!
//! A [Supervisor] polls a [Worker] until it exits, while a monitor thread samples
//! the resident memory of the worker and all of its descendants. A worker that
//! exceeds the time or memory limit is killed together with its process tree.
use std::{
    collections::VecDeque,
    fmt::Display,
    fs,
    io,
    process::{Child, Command, ExitStatus},
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    thread,
    time::{Duration, Instant},
};

use ahash::{HashMap, HashMapExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// The granularity with which the supervisor polls the worker and the monitor checks for shutdown.
const WAIT_STEP: Duration = Duration::from_millis(10);

/// The limits of a supervised stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    pub timeout: Option<Duration>,
    pub memory_limit_mb: Option<u64>,
    /// The interval between two memory samples.
    pub poll_interval: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            timeout: None,
            memory_limit_mb: None,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// The final status of a supervised stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "OK")]
    Ok,
    /// The time limit was exceeded.
    #[serde(rename = "TLE")]
    Tle,
    /// The memory limit was exceeded.
    #[serde(rename = "MEM")]
    Mem,
    #[serde(rename = "ERROR")]
    Error,
    /// The verification rejected the candidate inverse.
    #[serde(rename = "ANS")]
    Ans,
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Status::Ok => "OK",
            Status::Tle => "TLE",
            Status::Mem => "MEM",
            Status::Error => "ERROR",
            Status::Ans => "ANS",
        })
    }
}

/// The result of supervising a single worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageOutcome {
    pub status: Status,
    /// The time until the worker exited, or until the violation of a limit.
    pub time: Duration,
    /// The peak sampled resident memory of the process tree in bytes.
    pub memory: u64,
    pub error: Option<String>,
}

/// How a worker process ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerExit {
    Success,
    Code(i32),
    /// Killed by a signal, for example `SIGABRT` after a failed allocation.
    Signal(i32),
}

impl WorkerExit {
    pub fn from_status(status: ExitStatus) -> WorkerExit {
        if status.success() {
            return WorkerExit::Success;
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(s) = status.signal() {
                return WorkerExit::Signal(s);
            }
        }

        WorkerExit::Code(status.code().unwrap_or(-1))
    }

    /// The error label of a failed exit, `None` on success.
    pub fn error(&self) -> Option<String> {
        match self {
            WorkerExit::Success => None,
            WorkerExit::Code(c) => Some(format!("WorkerFailure: exit code {}", c)),
            WorkerExit::Signal(s) => Some(format!("WorkerSignal: killed by signal {}", s)),
        }
    }
}

/// A running computation that can be polled and killed.
pub trait Worker {
    fn id(&self) -> u32;
    /// Returns the exit state if the worker has exited.
    fn try_wait(&mut self) -> io::Result<Option<WorkerExit>>;
    /// Kill the worker and every process it spawned.
    fn terminate(&mut self) -> io::Result<()>;
}

pub trait MemorySampler: Sync {
    /// The resident memory in bytes of the process `pid` and its descendants,
    /// or `None` if it cannot be measured.
    fn sample(&self, pid: u32) -> Option<u64>;
}

pub trait Clock: Sync {
    /// The time since an arbitrary fixed instant.
    fn now(&self) -> Duration;
    fn sleep(&self, d: Duration);
}

#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    base: Instant,
}

impl SystemClock {
    pub fn new() -> SystemClock {
        SystemClock {
            base: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.base.elapsed()
    }

    fn sleep(&self, d: Duration) {
        thread::sleep(d)
    }
}

/// Find all descendants of `pid` by following the parent links in `/proc/*/stat`.
pub fn descendants(pid: u32) -> Vec<u32> {
    let Ok(entries) = fs::read_dir("/proc") else {
        return vec![];
    };

    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for e in entries.flatten() {
        let Some(p) = e.file_name().to_str().and_then(|x| x.parse::<u32>().ok()) else {
            continue;
        };
        if let Some(parent) = parent_pid(p) {
            children.entry(parent).or_default().push(p);
        }
    }

    let mut res = vec![];
    let mut queue = VecDeque::from([pid]);
    while let Some(p) = queue.pop_front() {
        if let Some(c) = children.get(&p) {
            for &c in c {
                res.push(c);
                queue.push_back(c);
            }
        }
    }
    res
}

fn parent_pid(pid: u32) -> Option<u32> {
    let stat = fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    // the command name is in parentheses and may contain spaces
    let rest = &stat[stat.rfind(')')? + 1..];
    rest.split_whitespace().nth(1)?.parse().ok()
}

fn page_size() -> u64 {
    #[cfg(unix)]
    {
        let s = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if s > 0 {
            return s as u64;
        }
    }
    4096
}

/// Samples the resident set size from `/proc/<pid>/statm`.
#[derive(Clone, Copy, Debug)]
pub struct ProcfsSampler {
    page_size: u64,
}

impl ProcfsSampler {
    pub fn new() -> ProcfsSampler {
        ProcfsSampler {
            page_size: page_size(),
        }
    }

    fn rss(&self, pid: u32) -> Option<u64> {
        let statm = fs::read_to_string(format!("/proc/{}/statm", pid)).ok()?;
        let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
        Some(pages * self.page_size)
    }
}

impl Default for ProcfsSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler for ProcfsSampler {
    fn sample(&self, pid: u32) -> Option<u64> {
        let root = self.rss(pid)?;
        Some(
            root + descendants(pid)
                .into_iter()
                .filter_map(|p| self.rss(p))
                .sum::<u64>(),
        )
    }
}

/// A child process in its own process group.
#[derive(Debug)]
pub struct ProcessWorker {
    child: Child,
    exited: bool,
}

impl ProcessWorker {
    pub fn spawn(mut command: Command) -> io::Result<ProcessWorker> {
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        Ok(ProcessWorker {
            child: command.spawn()?,
            exited: false,
        })
    }
}

impl Worker for ProcessWorker {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn try_wait(&mut self) -> io::Result<Option<WorkerExit>> {
        let status = self.child.try_wait()?;
        if status.is_some() {
            self.exited = true;
        }
        Ok(status.map(WorkerExit::from_status))
    }

    fn terminate(&mut self) -> io::Result<()> {
        let pid = self.child.id();
        // collect the tree first, as killing a parent reparents its children
        let tree = descendants(pid);

        #[cfg(unix)]
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
            // descendants that moved to another process group
            for p in &tree {
                libc::kill(*p as libc::pid_t, libc::SIGKILL);
            }
        }
        #[cfg(not(unix))]
        let _ = tree;

        match self.child.kill() {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e),
        }
        self.child.wait()?;
        self.exited = true;
        Ok(())
    }
}

impl Drop for ProcessWorker {
    fn drop(&mut self) {
        if !self.exited {
            if let Err(e) = self.terminate() {
                warn!("could not terminate worker {}: {}", self.child.id(), e);
            }
        }
    }
}

/// Enforces [Limits] on a worker.
pub struct Supervisor<S: MemorySampler, C: Clock> {
    limits: Limits,
    sampler: S,
    clock: C,
}

impl<S: MemorySampler, C: Clock> Supervisor<S, C> {
    pub fn new(limits: Limits, sampler: S, clock: C) -> Self {
        Supervisor {
            limits,
            sampler,
            clock,
        }
    }

    /// Supervise `worker` until it exits or violates a limit.
    /// The memory monitor is stopped and joined before this function returns.
    pub fn run<W: Worker>(&self, worker: &mut W) -> StageOutcome {
        let pid = worker.id();
        let start = self.clock.now();

        let stop = AtomicBool::new(false);
        let exceeded = AtomicBool::new(false);
        let peak = AtomicU64::new(0);
        let violation = AtomicU64::new(0);

        let (status, time, error) = thread::scope(|s| {
            s.spawn(|| self.monitor(pid, start, &stop, &exceeded, &peak, &violation));
            let res = self.wait(worker, start, &exceeded, &violation);
            stop.store(true, Ordering::SeqCst);
            res
        });

        StageOutcome {
            status,
            time,
            memory: peak.load(Ordering::SeqCst),
            error,
        }
    }

    fn monitor(
        &self,
        pid: u32,
        start: Duration,
        stop: &AtomicBool,
        exceeded: &AtomicBool,
        peak: &AtomicU64,
        violation: &AtomicU64,
    ) {
        let limit = self.limits.memory_limit_mb.map(|m| m * 1024 * 1024);

        while !stop.load(Ordering::SeqCst) {
            if let Some(bytes) = self.sampler.sample(pid) {
                peak.fetch_max(bytes, Ordering::SeqCst);

                if limit.is_some_and(|l| bytes > l) {
                    let t = self.clock.now().saturating_sub(start);
                    violation.store(t.as_nanos() as u64, Ordering::SeqCst);
                    exceeded.store(true, Ordering::SeqCst);
                    return;
                }
            }

            let next = self.clock.now() + self.limits.poll_interval;
            while !stop.load(Ordering::SeqCst) {
                let now = self.clock.now();
                if now >= next {
                    break;
                }
                self.clock.sleep(WAIT_STEP.min(next - now));
            }
        }
    }

    fn wait<W: Worker>(
        &self,
        worker: &mut W,
        start: Duration,
        exceeded: &AtomicBool,
        violation: &AtomicU64,
    ) -> (Status, Duration, Option<String>) {
        loop {
            if exceeded.load(Ordering::SeqCst) {
                self.kill(worker);
                let t = Duration::from_nanos(violation.load(Ordering::SeqCst));
                warn!(
                    "worker {} exceeded the memory limit of {} MB",
                    worker.id(),
                    self.limits.memory_limit_mb.unwrap_or_default()
                );
                return (Status::Mem, t, None);
            }

            let elapsed = self.clock.now().saturating_sub(start);
            match worker.try_wait() {
                Ok(Some(WorkerExit::Success)) => return (Status::Ok, elapsed, None),
                Ok(Some(exit)) => {
                    warn!("worker {} failed: {:?}", worker.id(), exit);
                    return (Status::Error, elapsed, exit.error());
                }
                Ok(None) => {}
                Err(e) => {
                    self.kill(worker);
                    return (Status::Error, elapsed, Some(format!("IoError: {}", e)));
                }
            }

            let mut step = WAIT_STEP;
            if let Some(timeout) = self.limits.timeout {
                if elapsed >= timeout {
                    self.kill(worker);
                    warn!("worker {} exceeded the time limit of {:?}", worker.id(), timeout);
                    return (Status::Tle, elapsed, None);
                }
                step = step.min(timeout - elapsed);
            }

            self.clock.sleep(step);
        }
    }

    fn kill<W: Worker>(&self, worker: &mut W) {
        if let Err(e) = worker.terminate() {
            warn!("could not terminate worker {}: {}", worker.id(), e);
        } else {
            debug!("terminated worker {}", worker.id());
        }
    }
}

#[cfg(test)]
mod test {
    use std::{
        io,
        sync::{
            atomic::{AtomicU64, Ordering},
            Mutex,
        },
        thread,
        time::Duration,
    };

    use super::{Clock, Limits, MemorySampler, Status, Supervisor, Worker, WorkerExit};

    const MB: u64 = 1024 * 1024;

    #[derive(Default)]
    struct FakeClock {
        nanos: AtomicU64,
    }

    impl Clock for FakeClock {
        fn now(&self) -> Duration {
            Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
        }

        fn sleep(&self, d: Duration) {
            self.nanos.fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
            thread::sleep(Duration::from_micros(20));
        }
    }

    /// Replays a list of samples and then repeats the last one.
    struct ScriptedSampler {
        script: Mutex<Vec<u64>>,
    }

    impl ScriptedSampler {
        fn new(mut script: Vec<u64>) -> Self {
            script.reverse();
            ScriptedSampler {
                script: Mutex::new(script),
            }
        }
    }

    impl MemorySampler for ScriptedSampler {
        fn sample(&self, _pid: u32) -> Option<u64> {
            let mut s = self.script.lock().unwrap();
            if s.len() > 1 {
                s.pop()
            } else {
                s.last().copied()
            }
        }
    }

    struct FakeWorker {
        exit_after: Option<(usize, WorkerExit)>,
        polls: usize,
        terminated: bool,
    }

    impl FakeWorker {
        fn new(exit_after: Option<(usize, WorkerExit)>) -> Self {
            FakeWorker {
                exit_after,
                polls: 0,
                terminated: false,
            }
        }
    }

    impl Worker for FakeWorker {
        fn id(&self) -> u32 {
            1
        }

        fn try_wait(&mut self) -> io::Result<Option<WorkerExit>> {
            self.polls += 1;
            Ok(match self.exit_after {
                Some((n, exit)) if self.polls > n => Some(exit),
                _ => None,
            })
        }

        fn terminate(&mut self) -> io::Result<()> {
            self.terminated = true;
            Ok(())
        }
    }

    #[test]
    fn timeout() {
        let limits = Limits {
            timeout: Some(Duration::from_secs(5)),
            ..Limits::default()
        };
        let s = Supervisor::new(limits, ScriptedSampler::new(vec![MB]), FakeClock::default());
        let mut w = FakeWorker::new(None);
        let out = s.run(&mut w);

        assert_eq!(out.status, Status::Tle);
        assert!(out.time >= Duration::from_secs(5));
        assert!(w.terminated);
    }

    #[test]
    fn memory_violation() {
        let limits = Limits {
            timeout: Some(Duration::from_secs(1000)),
            memory_limit_mb: Some(100),
            poll_interval: Duration::from_secs(1),
        };
        let s = Supervisor::new(
            limits,
            ScriptedSampler::new(vec![10 * MB, 50 * MB, 200 * MB]),
            FakeClock::default(),
        );
        let mut w = FakeWorker::new(None);
        let out = s.run(&mut w);

        assert_eq!(out.status, Status::Mem);
        assert_eq!(out.memory, 200 * MB);
        assert!(out.time >= Duration::from_secs(2) && out.time < Duration::from_secs(1000));
        assert!(w.terminated);
    }

    #[test]
    fn normal_exit() {
        let s = Supervisor::new(
            Limits::default(),
            ScriptedSampler::new(vec![10 * MB]),
            FakeClock::default(),
        );
        let mut w = FakeWorker::new(Some((3, WorkerExit::Success)));
        let out = s.run(&mut w);

        assert_eq!(out.status, Status::Ok);
        assert!(out.memory <= 10 * MB);
        assert!(out.error.is_none());
        assert!(!w.terminated);

        let mut w = FakeWorker::new(Some((0, WorkerExit::Code(2))));
        let out = s.run(&mut w);
        assert_eq!(out.status, Status::Error);
        assert_eq!(out.error.as_deref(), Some("WorkerFailure: exit code 2"));

        let mut w = FakeWorker::new(Some((1, WorkerExit::Signal(6))));
        let out = s.run(&mut w);
        assert_eq!(out.status, Status::Error);
        assert_eq!(out.error.as_deref(), Some("WorkerSignal: killed by signal 6"));
    }

    #[test]
    fn status_names() {
        assert_eq!(serde_json::to_string(&Status::Tle).unwrap(), "\"TLE\"");
        assert_eq!(Status::Ans.to_string(), "ANS");
    }
}
