use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use log::{error, info};

use crate::errors::PipelineError;
use crate::extraction::extract_points;
use crate::manager_psl::WindowedDataset;
use crate::report::{build_table, write_report};
use crate::state::StateTracker;
use crate::targets::load_targets;

/// An opened gridded dataset
pub trait DatasetHandle {
    fn latest_timestamp(&self) -> DateTime<Utc>;

    /// Returns the trailing window of the given length in days
    fn window(&self, days: usize) -> Result<WindowedDataset, PipelineError>;
}

/// Source of gridded datasets, opened once per run
pub trait DatasetSource {
    fn open(&self) -> Result<Box<dyn DatasetHandle>, PipelineError>;
}

/// Sink consuming a finished report file
pub trait ReportSink {
    fn deliver(&self, subject: &str, body: &str, attachment: &Path) -> Result<(), PipelineError>;
}

/// Outcome of a single orchestrator pass
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum RunOutcome {
    /// A report was produced and the state advanced to this timestamp
    Completed(DateTime<Utc>),
    /// The upstream latest timestamp was not newer than the state marker
    NoNewData,
    /// Another run was in flight, the trigger was dropped
    Skipped,
}

/// Drives one pipeline pass per trigger:
/// check timestamp, extract, build, write, notify, commit state.
///
/// Any stage failure aborts the pass before the commit, leaving the output
/// file and state marker exactly as before, so the next trigger retries
/// from the same baseline. Report delivery is the one exception: it is
/// best effort and never blocks the commit, the report file on disk is the
/// durable deliverable.
pub struct Orchestrator<S, N> {
    source: S,
    sink: N,
    state: StateTracker,
    target_file: String,
    output_file: String,
    extracted_days: usize,
    in_flight: AtomicBool,
}

impl<S: DatasetSource, N: ReportSink> Orchestrator<S, N> {
    pub fn new(
        source: S,
        sink: N,
        state: StateTracker,
        target_file: &str,
        output_file: &str,
        extracted_days: usize,
    ) -> Orchestrator<S, N> {
        Orchestrator {
            source,
            sink,
            state,
            target_file: target_file.to_string(),
            output_file: output_file.to_string(),
            extracted_days,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Executes one pass, with single-flight protection: a trigger firing
    /// while a run is in flight is skipped, never interleaved.
    pub fn run_once(&self) -> Result<RunOutcome, PipelineError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(RunOutcome::Skipped);
        }

        let result = self.run_stages();
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    fn run_stages(&self) -> Result<RunOutcome, PipelineError> {
        let handle = self.source.open()?;
        let latest = handle.latest_timestamp();
        let previous = self.state.load_previous()?;

        if latest <= previous {
            info!("no new data, latest {} is not after {}", latest, previous);
            return Ok(RunOutcome::NoNewData);
        }

        let targets = load_targets(&self.target_file).map_err(|e| {
            error!("target coordinate file unusable, every run will fail until it is fixed: {}", e);
            e
        })?;

        let window = handle.window(self.extracted_days)?;
        info!("extracting {} timestamps for {} targets", window.times.len(), targets.len());

        let points = extract_points(&window, &targets);
        let table = build_table(&points, &targets);

        write_report(&table, &self.output_file)?;
        info!("report written to {}", self.output_file);

        let subject = format!("Precipitation report {}", latest.format("%Y-%m-%d"));
        let body = format!("New dataset timestamp {}. Report attached.", latest.to_rfc3339());
        if let Err(e) = self.sink.deliver(&subject, &body, Path::new(&self.output_file)) {
            // Best effort, the report file is the durable artifact
            error!("report delivery failed: {}", e);
        }

        self.state.commit(latest)?;
        info!("state advanced to {}", latest);

        Ok(RunOutcome::Completed(latest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use chrono::TimeDelta;

    struct FakeHandle {
        times: Vec<DateTime<Utc>>,
    }

    impl DatasetHandle for FakeHandle {
        fn latest_timestamp(&self) -> DateTime<Utc> {
            *self.times.last().unwrap()
        }

        fn window(&self, days: usize) -> Result<WindowedDataset, PipelineError> {
            let n = days.min(self.times.len());
            let times = self.times[self.times.len() - n..].to_vec();
            // 2x2 grid, cell (0,0) = 1.0 + t, cell (1,1) = 4.0 + t, rest fill
            let fill = -9.96921e36;
            let values = (0..n)
                .flat_map(|t| vec![1.0 + t as f64, fill, fill, 4.0 + t as f64])
                .collect();
            Ok(WindowedDataset {
                times,
                lats: vec![40.0, 42.0],
                lons: vec![200.0, 202.0],
                values,
                fill_value: Some(fill),
            })
        }
    }

    struct FakeSource {
        latest_day: i64,
        opens: Arc<AtomicUsize>,
        fail: bool,
    }

    impl DatasetSource for FakeSource {
        fn open(&self) -> Result<Box<dyn DatasetHandle>, PipelineError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PipelineError::DataSource("host unreachable".to_string()));
            }
            let times = (self.latest_day - 1..=self.latest_day)
                .map(|d| DateTime::UNIX_EPOCH + TimeDelta::days(d))
                .collect();
            Ok(Box::new(FakeHandle { times }))
        }
    }

    struct FakeSink {
        deliveries: Arc<AtomicUsize>,
        fail: bool,
    }

    impl ReportSink for FakeSink {
        fn deliver(&self, _subject: &str, _body: &str, attachment: &Path) -> Result<(), PipelineError> {
            if self.fail {
                return Err(PipelineError::Notify("smtp down".to_string()));
            }
            assert!(attachment.exists());
            self.deliveries.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        deliveries: Arc<AtomicUsize>,
        opens: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn new() -> Fixture {
            let dir = tempfile::tempdir().unwrap();
            fs::write(
                dir.path().join("target_coords.csv"),
                "Location,Lat,Lon\nA,40.0,-160.0\nB,42.0,202.0\n",
            )
            .unwrap();
            Fixture {
                dir,
                deliveries: Arc::new(AtomicUsize::new(0)),
                opens: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn path(&self, name: &str) -> String {
            self.dir.path().join(name).to_str().unwrap().to_string()
        }

        fn orchestrator(
            &self,
            latest_day: i64,
            source_fails: bool,
            sink_fails: bool,
        ) -> Orchestrator<FakeSource, FakeSink> {
            Orchestrator::new(
                FakeSource {
                    latest_day,
                    opens: Arc::clone(&self.opens),
                    fail: source_fails,
                },
                FakeSink {
                    deliveries: Arc::clone(&self.deliveries),
                    fail: sink_fails,
                },
                StateTracker::new(&self.path("prev_time.txt")),
                &self.path("target_coords.csv"),
                &self.path("report.csv"),
                30,
            )
        }
    }

    #[test]
    fn normal_run_writes_report_and_commits() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator(20_000, false, false);
        let latest = DateTime::UNIX_EPOCH + TimeDelta::days(20_000);

        assert_eq!(orchestrator.run_once().unwrap(), RunOutcome::Completed(latest));

        let report = fs::read_to_string(fx.path("report.csv")).unwrap();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[0], "time,A,B");
        assert_eq!(lines.len(), 3);
        // both locations have data at both timestamps
        for line in &lines[1..] {
            assert_eq!(line.split(',').filter(|c| !c.is_empty()).count(), 3);
        }

        let state = StateTracker::new(&fx.path("prev_time.txt"));
        assert_eq!(state.load_previous().unwrap(), latest);
        assert_eq!(fx.deliveries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn second_run_with_unchanged_upstream_is_a_no_op() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator(20_000, false, false);

        orchestrator.run_once().unwrap();
        let report_before = fs::read(fx.path("report.csv")).unwrap();
        let state_before = fs::read(fx.path("prev_time.txt")).unwrap();

        assert_eq!(orchestrator.run_once().unwrap(), RunOutcome::NoNewData);

        assert_eq!(fs::read(fx.path("report.csv")).unwrap(), report_before);
        assert_eq!(fs::read(fx.path("prev_time.txt")).unwrap(), state_before);
        assert_eq!(fx.deliveries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn source_failure_leaves_state_and_output_untouched() {
        let fx = Fixture::new();
        fx.orchestrator(20_000, false, false).run_once().unwrap();
        let report_before = fs::read(fx.path("report.csv")).unwrap();
        let state_before = fs::read(fx.path("prev_time.txt")).unwrap();

        let failing = fx.orchestrator(20_001, true, false);
        assert!(matches!(failing.run_once(), Err(PipelineError::DataSource(_))));

        assert_eq!(fs::read(fx.path("report.csv")).unwrap(), report_before);
        assert_eq!(fs::read(fx.path("prev_time.txt")).unwrap(), state_before);
    }

    #[test]
    fn missing_target_file_aborts_before_any_write() {
        let fx = Fixture::new();
        fs::remove_file(fx.path("target_coords.csv")).unwrap();
        let orchestrator = fx.orchestrator(20_000, false, false);

        assert!(matches!(
            orchestrator.run_once(),
            Err(PipelineError::MissingCoordinateFile(_))
        ));
        assert!(!fs::exists(fx.path("report.csv")).unwrap());
        assert!(!fs::exists(fx.path("prev_time.txt")).unwrap());
    }

    #[test]
    fn notify_failure_still_commits_state() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator(20_000, false, true);
        let latest = DateTime::UNIX_EPOCH + TimeDelta::days(20_000);

        assert_eq!(orchestrator.run_once().unwrap(), RunOutcome::Completed(latest));

        let state = StateTracker::new(&fx.path("prev_time.txt"));
        assert_eq!(state.load_previous().unwrap(), latest);
        assert_eq!(fx.deliveries.load(Ordering::SeqCst), 0);
    }

    struct BlockingSource {
        entered: Arc<Barrier>,
        release: Arc<Barrier>,
    }

    impl DatasetSource for BlockingSource {
        fn open(&self) -> Result<Box<dyn DatasetHandle>, PipelineError> {
            self.entered.wait();
            self.release.wait();
            Err(PipelineError::DataSource("blocked".to_string()))
        }
    }

    #[test]
    fn overlapping_trigger_is_skipped() {
        let fx = Fixture::new();
        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));

        let orchestrator = Arc::new(Orchestrator::new(
            BlockingSource {
                entered: Arc::clone(&entered),
                release: Arc::clone(&release),
            },
            FakeSink { deliveries: Arc::clone(&fx.deliveries), fail: false },
            StateTracker::new(&fx.path("prev_time.txt")),
            &fx.path("target_coords.csv"),
            &fx.path("report.csv"),
            30,
        ));

        let first = Arc::clone(&orchestrator);
        let runner = thread::spawn(move || first.run_once());

        // once the first run is inside the source, a second trigger must be dropped
        entered.wait();
        assert_eq!(orchestrator.run_once().unwrap(), RunOutcome::Skipped);
        release.wait();

        assert!(runner.join().unwrap().is_err());
    }
}
