//! Supervised runs: an inversion stage followed by an optional verification stage,
//! each in its own worker process, and the run log.
//!
//! Workers are the current executable started with a hidden subcommand. They
//! communicate with the supervisor through a JSON report that they create exactly once.
use std::{
    env,
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    process::Command,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{
    algorithms::{self, Algorithm, EngineOptions},
    catalog,
    parser::PolynomialParser,
    supervisor::{Limits, ProcessWorker, ProcfsSampler, StageOutcome, Status, Supervisor, SystemClock},
    verify::{check_inversion, check_jacobian},
    InversionError,
};

/// The inversion stage: invert a catalog map with an algorithm.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InversionStage {
    pub algorithm: Algorithm,
    pub mapping: String,
    pub engine: EngineOptions,
    /// Also check that the Jacobian determinant of the map is 1.
    pub jacobian: bool,
}

/// The write-once record of a worker.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub status: Option<Status>,
    pub error: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// The coordinates of the inverse.
    pub inverse: Option<Vec<String>>,
    pub jacobian: Option<bool>,
}

impl WorkerReport {
    /// Create the report file at `path`. Fails if it already exists.
    pub fn write(&self, path: &Path) -> io::Result<()> {
        let mut f = OpenOptions::new().write(true).create_new(true).open(path)?;
        serde_json::to_writer(&mut f, self)?;
        f.flush()
    }

    pub fn read(path: &Path) -> io::Result<WorkerReport> {
        let s = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&s)?)
    }

    fn failure(e: &InversionError) -> WorkerReport {
        WorkerReport {
            status: Some(Status::Error),
            error: Some(format!("{}: {}", e.kind(), e)),
            ..WorkerReport::default()
        }
    }
}

/// Run the inversion stage in the current process and write its report.
#[instrument(skip_all, fields(algorithm = %stage.algorithm, mapping = %stage.mapping))]
pub fn inversion_worker(stage: &InversionStage, report: &Path) -> io::Result<()> {
    let result = catalog::get(&stage.mapping)
        .map_err(InversionError::from)
        .and_then(|f| {
            let jacobian = stage.jacobian.then(|| check_jacobian(&f));
            let outcome = algorithms::invert(&f, stage.algorithm, &stage.engine)?;
            debug!("{}", outcome.inverse);
            Ok((jacobian, outcome))
        });

    let r = match result {
        Ok((jacobian, outcome)) => WorkerReport {
            status: Some(Status::Ok),
            error: None,
            warnings: outcome.warnings,
            inverse: Some(
                outcome
                    .inverse
                    .coordinates
                    .iter()
                    .map(|c| c.to_string())
                    .collect(),
            ),
            jacobian,
        },
        Err(e) => {
            warn!("inversion failed: {}", e);
            WorkerReport::failure(&e)
        }
    };
    r.write(report)
}

/// Check the inverse in the report `candidate` against the catalog map `mapping`
/// and write the verdict to `report`.
#[instrument(skip_all, fields(mapping = %mapping))]
pub fn verification_worker(mapping: &str, candidate: &Path, report: &Path) -> io::Result<()> {
    let coordinates = WorkerReport::read(candidate)?.inverse.unwrap_or_default();

    let result = catalog::get(mapping).map_err(InversionError::from).and_then(|f| {
        let parser = PolynomialParser::new(f.variables.clone());
        let g = coordinates
            .iter()
            .map(|c| parser.parse(c))
            .collect::<Result<Vec<_>, _>>()?;
        let g = f.with_coordinates(&format!("{}^{{-1}}", f.name), g);
        Ok(check_inversion(&f, &g))
    });

    let r = match result {
        Ok(true) => WorkerReport {
            status: Some(Status::Ok),
            ..WorkerReport::default()
        },
        Ok(false) => WorkerReport {
            status: Some(Status::Ans),
            ..WorkerReport::default()
        },
        Err(e) => WorkerReport::failure(&e),
    };
    r.write(report)
}

/// A fresh path for a worker report.
fn report_path(stage: &str) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    env::temp_dir().join(format!("polyinv-{}-{}-{}.json", std::process::id(), stage, n))
}

/// Run `command` under `limits` and read the report the worker wrote to `report`.
///
/// A worker that exits normally without a readable report is an error.
pub fn supervise(
    command: Command,
    report: &Path,
    limits: &Limits,
) -> (StageOutcome, Option<WorkerReport>) {
    let mut worker = match ProcessWorker::spawn(command) {
        Ok(w) => w,
        Err(e) => {
            return (
                StageOutcome {
                    status: Status::Error,
                    time: Duration::ZERO,
                    memory: 0,
                    error: Some(format!("SpawnError: {}", e)),
                },
                None,
            )
        }
    };

    let supervisor = Supervisor::new(*limits, ProcfsSampler::new(), SystemClock::new());
    let mut outcome = supervisor.run(&mut worker);
    drop(worker);

    if outcome.status != Status::Ok {
        return (outcome, None);
    }

    match WorkerReport::read(report) {
        Ok(r) => {
            if let Some(s) = r.status {
                outcome.status = s;
            }
            outcome.error = r.error.clone();
            (outcome, Some(r))
        }
        Err(e) => {
            outcome.status = Status::Error;
            outcome.error = Some(format!("ReportError: {}", e));
            (outcome, None)
        }
    }
}

/// A supervised run as requested on the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunRequest {
    pub stage: InversionStage,
    pub verify: bool,
    pub limits: Limits,
    /// Let the workers log at debug level.
    pub debug: bool,
}

/// The record of one run, as written to the log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SupervisionResult {
    pub algorithm: Algorithm,
    pub mapping: String,
    pub method: String,
    pub status: Status,
    /// Seconds.
    pub time: f64,
    /// Peak resident memory in MB.
    pub memory: f64,
    pub error: Option<String>,
    pub warnings: Vec<String>,
    pub jacobian: Option<bool>,
    pub inverse_check_status: Option<Status>,
    pub inverse_check_time: Option<f64>,
}

impl SupervisionResult {
    /// Returns true if the verification stage accepted the inverse.
    pub fn is_verified(&self) -> bool {
        self.inverse_check_status == Some(Status::Ok)
    }

    /// The log line `YYYY-mm-dd HH:MM:SS <json>`.
    pub fn log_line(&self) -> Result<String, serde_json::Error> {
        Ok(format!(
            "{} {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            serde_json::to_string(self)?
        ))
    }
}

/// Append a line to the log file, creating it if needed.
pub fn append_log(path: &Path, line: &str) -> io::Result<()> {
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(f, "{}", line)
}

fn worker_command(debug: bool) -> io::Result<Command> {
    let mut c = Command::new(env::current_exe()?);
    if debug {
        c.env("POLYINV_LOG", "debug");
    }
    Ok(c)
}

fn inversion_command(request: &RunRequest, report: &Path) -> io::Result<Command> {
    let stage = &request.stage;
    let mut c = worker_command(request.debug)?;
    c.arg("invert-worker")
        .args(["--algorithm", stage.algorithm.name()])
        .args(["--mapping", &stage.mapping])
        .args(["--method", &stage.engine.method])
        .args(["--workers", &stage.engine.workers.to_string()])
        .arg("--report")
        .arg(report);
    if let Some(e) = &stage.engine.engine_command {
        c.args(["--engine-command", e]);
    }
    if stage.jacobian {
        c.arg("--jacobian");
    }
    Ok(c)
}

fn verification_command(request: &RunRequest, candidate: &Path, report: &Path) -> io::Result<Command> {
    let mut c = worker_command(request.debug)?;
    c.arg("verify-worker")
        .args(["--mapping", &request.stage.mapping])
        .arg("--candidate")
        .arg(candidate)
        .arg("--report")
        .arg(report);
    Ok(c)
}

/// A stage of a run, as handed to a [StageRunner].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage<'a> {
    /// Invert the requested map and write the report to `report`.
    Inversion { report: &'a Path },
    /// Check the inverse in the report `candidate` and write the verdict to `report`.
    Verification {
        candidate: &'a Path,
        report: &'a Path,
    },
}

/// Executes the stages of a run under the limits of the request.
pub trait StageRunner {
    fn run_stage(
        &mut self,
        request: &RunRequest,
        stage: Stage<'_>,
    ) -> (StageOutcome, Option<WorkerReport>);
}

/// Runs every stage in a supervised worker process started from the current executable.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessRunner;

impl StageRunner for ProcessRunner {
    fn run_stage(
        &mut self,
        request: &RunRequest,
        stage: Stage<'_>,
    ) -> (StageOutcome, Option<WorkerReport>) {
        let (command, report) = match stage {
            Stage::Inversion { report } => (inversion_command(request, report), report),
            Stage::Verification { candidate, report } => {
                (verification_command(request, candidate, report), report)
            }
        };

        match command {
            Ok(c) => supervise(c, report, &request.limits),
            Err(e) => (
                StageOutcome {
                    status: Status::Error,
                    time: Duration::ZERO,
                    memory: 0,
                    error: Some(format!("IoError: {}", e)),
                },
                None,
            ),
        }
    }
}

/// Invert the requested map in a supervised worker, then verify the inverse in a
/// second supervised worker if requested and the inversion succeeded.
pub fn run(request: &RunRequest) -> SupervisionResult {
    run_with(request, &mut ProcessRunner)
}

/// Run the stages of `request` with `runner`. The verification stage only starts
/// after an `OK` inversion stage.
#[instrument(skip_all, fields(algorithm = %request.stage.algorithm, mapping = %request.stage.mapping))]
pub fn run_with<R: StageRunner>(request: &RunRequest, runner: &mut R) -> SupervisionResult {
    let report = report_path("invert");
    let (outcome, worker_report) = runner.run_stage(request, Stage::Inversion { report: &report });
    info!("inversion finished with {} after {:?}", outcome.status, outcome.time);

    let mut result = SupervisionResult {
        algorithm: request.stage.algorithm,
        mapping: request.stage.mapping.clone(),
        method: request.stage.engine.method.clone(),
        status: outcome.status,
        time: outcome.time.as_secs_f64(),
        memory: outcome.memory as f64 / (1024. * 1024.),
        error: outcome.error,
        warnings: vec![],
        jacobian: None,
        inverse_check_status: None,
        inverse_check_time: None,
    };

    if let Some(r) = worker_report {
        result.warnings = r.warnings;
        result.jacobian = r.jacobian;
    }

    if request.verify && result.status == Status::Ok {
        let check_report = report_path("verify");
        let (check, _) = runner.run_stage(
            request,
            Stage::Verification {
                candidate: &report,
                report: &check_report,
            },
        );
        info!("verification finished with {} after {:?}", check.status, check.time);
        if let Some(e) = check.error {
            result.warnings.push(format!("verification: {}", e));
        }
        result.inverse_check_status = Some(check.status);
        result.inverse_check_time = Some(check.time.as_secs_f64());
        remove_report(&check_report);
    } else if request.verify {
        debug!("skipping the verification after {}", result.status);
    }

    remove_report(&report);
    result
}

/// Run every algorithm on `mapping` with the settings of `template`.
///
/// The results are ordered by time, with the runs that did not finish with `OK` last.
pub fn compare<R: StageRunner>(
    template: &RunRequest,
    mapping: &str,
    runner: &mut R,
) -> Vec<SupervisionResult> {
    let mut results: Vec<_> = Algorithm::ALL
        .into_iter()
        .map(|a| {
            let mut request = template.clone();
            request.stage.algorithm = a;
            request.stage.mapping = mapping.to_owned();
            run_with(&request, runner)
        })
        .collect();

    results.sort_by(|a, b| {
        (a.status != Status::Ok)
            .cmp(&(b.status != Status::Ok))
            .then(a.time.total_cmp(&b.time))
    });
    results
}

/// The maps of the regression sweep.
pub const REGRESSION_MAPPINGS: [&str; 8] = ["H1", "H2", "H3", "H4", "H5", "H6", "H7", "B1"];

/// Invert and verify every map of [REGRESSION_MAPPINGS] with every algorithm.
/// The external engine algorithms only take part when an engine command is configured.
///
/// A run passed if [SupervisionResult::is_verified] holds.
pub fn regression<R: StageRunner>(template: &RunRequest, runner: &mut R) -> Vec<SupervisionResult> {
    let mut results = vec![];
    for a in Algorithm::ALL {
        if a.is_external() && template.stage.engine.engine_command.is_none() {
            info!("skipping {} without an engine command", a);
            continue;
        }

        for m in REGRESSION_MAPPINGS {
            let mut request = template.clone();
            request.stage.algorithm = a;
            request.stage.mapping = m.to_owned();
            request.stage.jacobian = true;
            request.verify = true;

            let r = run_with(&request, runner);
            if !r.is_verified() {
                warn!("{} failed for {}: {:?}", a, m, r.error);
            }
            results.push(r);
        }
    }
    results
}

fn remove_report(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("could not remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod test {
    use std::{fs, time::Duration};

    use crate::{
        algorithms::{Algorithm, EngineOptions},
        catalog,
        supervisor::{Limits, StageOutcome, Status},
    };

    use super::{
        append_log, compare, inversion_worker, regression, report_path, run_with,
        verification_worker, InversionStage, RunRequest, Stage, StageRunner, SupervisionResult,
        WorkerReport, REGRESSION_MAPPINGS,
    };

    /// Replays scripted stage outcomes and records the stages it was asked to run.
    struct ScriptedRunner {
        /// The status and duration in ms of the inversion stage per algorithm.
        inversion: Box<dyn Fn(Algorithm) -> (Status, u64)>,
        verification: Status,
        stages: Vec<String>,
    }

    impl ScriptedRunner {
        fn new(
            inversion: impl Fn(Algorithm) -> (Status, u64) + 'static,
            verification: Status,
        ) -> Self {
            ScriptedRunner {
                inversion: Box::new(inversion),
                verification,
                stages: vec![],
            }
        }
    }

    fn outcome(status: Status, ms: u64) -> StageOutcome {
        StageOutcome {
            status,
            time: Duration::from_millis(ms),
            memory: 1024 * 1024,
            error: (status == Status::Error).then(|| "WorkerFailure: exit code 1".into()),
        }
    }

    impl StageRunner for ScriptedRunner {
        fn run_stage(
            &mut self,
            request: &RunRequest,
            stage: Stage<'_>,
        ) -> (StageOutcome, Option<WorkerReport>) {
            let a = request.stage.algorithm;
            match stage {
                Stage::Inversion { .. } => {
                    self.stages
                        .push(format!("invert {} {}", a, request.stage.mapping));
                    let (status, ms) = (self.inversion)(a);
                    let report = (status == Status::Ok).then(|| WorkerReport {
                        status: Some(status),
                        warnings: vec!["coordinate 1 is not Pascal finite".into()],
                        jacobian: Some(true),
                        ..WorkerReport::default()
                    });
                    (outcome(status, ms), report)
                }
                Stage::Verification { .. } => {
                    self.stages
                        .push(format!("verify {} {}", a, request.stage.mapping));
                    (outcome(self.verification, 5), None)
                }
            }
        }
    }

    fn request(verify: bool) -> RunRequest {
        RunRequest {
            stage: InversionStage {
                algorithm: Algorithm::Abch,
                mapping: "H1".into(),
                engine: EngineOptions::default(),
                jacobian: true,
            },
            verify,
            limits: Limits::default(),
            debug: false,
        }
    }

    #[test]
    fn verification_follows_inversion() {
        let mut runner = ScriptedRunner::new(|_| (Status::Ok, 1500), Status::Ans);
        let r = run_with(&request(true), &mut runner);

        assert_eq!(runner.stages, ["invert ABCH H1", "verify ABCH H1"]);
        assert_eq!(r.status, Status::Ok);
        assert_eq!(r.time, 1.5);
        assert_eq!(r.memory, 1.);
        assert_eq!(r.jacobian, Some(true));
        assert_eq!(r.warnings, ["coordinate 1 is not Pascal finite"]);
        assert_eq!(r.inverse_check_status, Some(Status::Ans));
        assert!(!r.is_verified());

        let mut runner = ScriptedRunner::new(|_| (Status::Ok, 10), Status::Ok);
        assert!(run_with(&request(true), &mut runner).is_verified());

        let mut runner = ScriptedRunner::new(|_| (Status::Ok, 10), Status::Ok);
        let r = run_with(&request(false), &mut runner);
        assert_eq!(runner.stages, ["invert ABCH H1"]);
        assert_eq!(r.inverse_check_status, None);
    }

    #[test]
    fn no_verification_after_failure() {
        for status in [Status::Tle, Status::Mem, Status::Error] {
            let mut runner = ScriptedRunner::new(move |_| (status, 1000), Status::Ok);
            let r = run_with(&request(true), &mut runner);

            assert_eq!(runner.stages, ["invert ABCH H1"]);
            assert_eq!(r.status, status);
            assert_eq!(r.inverse_check_status, None);
            assert_eq!(r.inverse_check_time, None);
        }
    }

    #[test]
    fn compare_orders_by_time() {
        let mut runner = ScriptedRunner::new(
            |a| match a {
                Algorithm::Abch => (Status::Ok, 400),
                Algorithm::AbchParallel => (Status::Ok, 300),
                Algorithm::AbchCrt => (Status::Tle, 100),
                Algorithm::AbchCrtParallel => (Status::Ok, 100),
                _ => (Status::Error, 0),
            },
            Status::Ok,
        );
        let results = compare(&request(false), "H3", &mut runner);

        let order: Vec<_> = results.iter().map(|r| r.algorithm).collect();
        assert_eq!(
            order,
            [
                Algorithm::AbchCrtParallel,
                Algorithm::AbchParallel,
                Algorithm::Abch,
                Algorithm::GbExternal,
                Algorithm::GbExternalCrt,
                Algorithm::AbchCrt,
            ]
        );
        assert!(results.iter().all(|r| r.mapping == "H3"));
    }

    #[test]
    fn regression_sweep() {
        let mut runner = ScriptedRunner::new(
            |a| match a {
                Algorithm::AbchCrt => (Status::Tle, 120_000),
                _ => (Status::Ok, 10),
            },
            Status::Ok,
        );
        let results = regression(&request(false), &mut runner);

        // the external engine algorithms need an engine command
        assert_eq!(results.len(), 4 * REGRESSION_MAPPINGS.len());
        assert!(results.iter().all(|r| !r.algorithm.is_external()));
        assert!(results.iter().all(|r| r.jacobian.is_some() || r.status != Status::Ok));

        let failed: Vec<_> = results.iter().filter(|r| !r.is_verified()).collect();
        assert_eq!(failed.len(), REGRESSION_MAPPINGS.len());
        assert!(failed.iter().all(|r| r.algorithm == Algorithm::AbchCrt));

        let mut template = request(false);
        template.stage.engine.engine_command = Some("engine".into());
        let mut runner = ScriptedRunner::new(|_| (Status::Ok, 10), Status::Ok);
        assert_eq!(
            regression(&template, &mut runner).len(),
            6 * REGRESSION_MAPPINGS.len()
        );
    }

    #[test]
    fn report_is_write_once() {
        let path = report_path("test-once");
        let r = WorkerReport {
            status: Some(Status::Ok),
            inverse: Some(vec!["X1".into()]),
            ..WorkerReport::default()
        };
        r.write(&path).unwrap();
        assert!(r.write(&path).is_err());
        assert_eq!(WorkerReport::read(&path).unwrap(), r);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn worker_stages() {
        let stage = InversionStage {
            algorithm: Algorithm::AbchCrt,
            mapping: "H4".into(),
            engine: EngineOptions::default(),
            jacobian: true,
        };
        let inv = report_path("test-invert");
        inversion_worker(&stage, &inv).unwrap();
        let r = WorkerReport::read(&inv).unwrap();
        assert_eq!(r.status, Some(Status::Ok), "{:?}", r.error);
        assert_eq!(r.jacobian, Some(true));
        assert_eq!(r.inverse.as_ref().map(|x| x.len()), Some(4));

        let check = report_path("test-verify");
        verification_worker("H4", &inv, &check).unwrap();
        assert_eq!(WorkerReport::read(&check).unwrap().status, Some(Status::Ok));

        fs::remove_file(&inv).unwrap();
        fs::remove_file(&check).unwrap();
    }

    #[test]
    fn wrong_candidate() {
        // the identity is not the inverse of H4
        let f = catalog::get("H4").unwrap();
        let candidate = report_path("test-candidate");
        WorkerReport {
            status: Some(Status::Ok),
            inverse: Some(f.variables.iter().map(|v| v.as_str().to_owned()).collect()),
            ..WorkerReport::default()
        }
        .write(&candidate)
        .unwrap();

        let check = report_path("test-wrong");
        verification_worker("H4", &candidate, &check).unwrap();
        let r = WorkerReport::read(&check).unwrap();
        assert_eq!(r.status, Some(Status::Ans));
        assert_eq!(r.error, None);

        fs::remove_file(&candidate).unwrap();
        fs::remove_file(&check).unwrap();
    }

    #[test]
    fn failing_stage() {
        let stage = InversionStage {
            algorithm: Algorithm::Abch,
            mapping: "H0".into(),
            engine: EngineOptions::default(),
            jacobian: false,
        };
        let path = report_path("test-fail");
        inversion_worker(&stage, &path).unwrap();
        let r = WorkerReport::read(&path).unwrap();
        assert_eq!(r.status, Some(Status::Error));
        assert!(r.error.unwrap().starts_with("MappingError"));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn log_line() {
        let r = SupervisionResult {
            algorithm: Algorithm::AbchCrtParallel,
            mapping: "H2".into(),
            method: String::new(),
            status: Status::Tle,
            time: 1.5,
            memory: 12.,
            error: None,
            warnings: vec![],
            jacobian: None,
            inverse_check_status: None,
            inverse_check_time: None,
        };
        let line = r.log_line().unwrap();
        // 2024-01-01 12:00:00 {...}
        assert_eq!(&line[4..5], "-");
        assert_eq!(&line[19..21], " {");
        assert!(line.contains("\"algorithm\":\"ABCH_CRT_PARALLEL\""));
        assert!(line.contains("\"status\":\"TLE\""));

        let path = report_path("test-log");
        append_log(&path, &line).unwrap();
        append_log(&path, &line).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
        fs::remove_file(&path).unwrap();
    }
}
