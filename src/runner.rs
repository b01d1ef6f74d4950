use crate::config::CritConfig;
use crate::core::{ScanEvent, ScanReport, analyze_with_events, load_snapshot};
use crate::format::{create_formatter, write_report};
use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Mutex;

fn notify(tx: &Option<Sender<ScanEvent>>, event: ScanEvent) {
    if let Some(tx) = tx {
        let _ = tx.send(event);
    }
}

/// Main entry point in CLI mode: a single scan.
pub fn run(config: CritConfig) -> Result<()> {
    let coordinator = ScanCoordinator::new();
    coordinator.request();
    run_pending(&config, &coordinator)?;
    Ok(())
}

/// Runs scans until `coordinator` has no follow-up queued and returns the
/// number of passes. The caller must hold the scan slot, i.e. its last
/// `request()` returned `true`. Other threads sharing the coordinator may
/// call `request()` while a pass is running; all such requests coalesce into
/// one more pass.
///
/// Each pass runs on a background thread; its events are consumed on the
/// calling thread.
pub fn run_pending(config: &CritConfig, coordinator: &ScanCoordinator) -> Result<usize> {
    let mut passes = 0;
    loop {
        passes += 1;
        let (tx, rx) = crossbeam_channel::unbounded();
        let config_clone = config.clone();
        let handle = std::thread::spawn(move || {
            if let Err(e) = run_scan(&config_clone, Some(tx.clone())) {
                let _ = tx.send(ScanEvent::Error(format!("{:#}", e)));
            }
        });

        let mut failure = None;
        for event in rx {
            match event {
                ScanEvent::StartScanning => tracing::info!("Scanning started..."),
                ScanEvent::SnapshotLoaded(sources, changes) => {
                    tracing::info!("Loaded {} source files, {} changes", sources, changes)
                }
                ScanEvent::PhaseComplete(phase) => tracing::info!("Finished {}", phase),
                ScanEvent::Complete(msg) => tracing::info!("{}", msg),
                ScanEvent::Error(e) => {
                    tracing::error!("{}", e);
                    failure = Some(e);
                }
            }
        }

        if handle.join().is_err() {
            coordinator.abandon();
            anyhow::bail!("scan thread panicked");
        }
        if let Some(e) = failure {
            coordinator.abandon();
            anyhow::bail!(e);
        }
        if !coordinator.finish() {
            break;
        }
        tracing::info!("Rescan requested during pass {}, scanning again", passes);
    }

    Ok(passes)
}

/// Loads the snapshot, scores it and writes the report.
pub fn run_scan(config: &CritConfig, tx: Option<Sender<ScanEvent>>) -> Result<ScanReport> {
    notify(&tx, ScanEvent::StartScanning);

    config.validate()?;
    let input = load_snapshot(&config.input)?;
    notify(
        &tx,
        ScanEvent::SnapshotLoaded(input.sources.len(), input.changes.len()),
    );

    let report = analyze_with_events(&input, &config.scoring, &tx);
    write_output(config, &report)?;

    let destination = config
        .output
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "stdout".to_string());
    notify(
        &tx,
        ScanEvent::Complete(format!(
            "Scored {} files; report written to {}",
            report.files.len(),
            destination
        )),
    );

    Ok(report)
}

fn write_output(config: &CritConfig, report: &ScanReport) -> Result<()> {
    let mut formatter = create_formatter(config.output_format);
    match &config.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {:?}", path))?;
            let mut writer = BufWriter::new(file);
            write_report(formatter.as_mut(), &mut writer, report)?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            write_report(formatter.as_mut(), &mut lock, report)?;
            lock.flush()?;
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
struct CoordinatorState {
    running: bool,
    pending: bool,
}

/// Keeps at most one scan in flight per snapshot.
#[derive(Debug, Default)]
pub struct ScanCoordinator {
    state: Mutex<CoordinatorState>,
}

impl ScanCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if the caller should start scanning now. Otherwise a single
    /// follow-up is queued; repeated requests coalesce into it.
    pub fn request(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.running {
            state.pending = true;
            false
        } else {
            state.running = true;
            true
        }
    }

    /// Called when a scan ends. `true` consumes the queued follow-up and the
    /// caller must scan again; `false` leaves the coordinator idle.
    pub fn finish(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.pending {
            state.pending = false;
            true
        } else {
            state.running = false;
            false
        }
    }

    /// Drops the slot and any queued follow-up after a failed scan.
    pub fn abandon(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.running = false;
        state.pending = false;
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().map(|s| s.running).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use std::sync::Arc;
    use tempfile::tempdir;

    const SNAPSHOT: &str = r#"{
        "sources": [
            { "repo": "api", "path": "api/src/a.service.ts",
              "symbols": { "methods": [ { "name": "run", "start_line": 1, "end_line": 4,
                                           "signature": "run(x: number)" } ] } }
        ],
        "changes": [
            { "repo": "api", "path": "api/src/a.service.ts", "additions": 1, "deletions": 1,
              "hunks": [ { "old_start": 2, "new_start": 2,
                           "lines": [ { "kind": "del", "text": "return x;" },
                                      { "kind": "add", "text": "return x * 2;" } ] } ],
              "old_symbols": { "methods": [ { "name": "run", "start_line": 1, "end_line": 4,
                                               "signature": "run(x: number)" } ] },
              "new_symbols": { "methods": [ { "name": "run", "start_line": 1, "end_line": 4,
                                               "signature": "run(x: number)" } ] } }
        ]
    }"#;

    #[test]
    fn test_coordinator_coalesces_requests() {
        let coordinator = ScanCoordinator::new();
        assert!(coordinator.request());
        assert!(!coordinator.request());
        assert!(!coordinator.request());

        // one follow-up for both queued requests
        assert!(coordinator.finish());
        assert!(coordinator.is_running());
        assert!(!coordinator.finish());
        assert!(!coordinator.is_running());

        assert!(coordinator.request());
    }

    #[test]
    fn test_coordinator_across_threads() {
        let coordinator = Arc::new(ScanCoordinator::new());
        assert!(coordinator.request());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&coordinator);
                std::thread::spawn(move || c.request())
            })
            .collect();
        let started = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&b| b)
            .count();

        assert_eq!(started, 0);
        assert!(coordinator.finish());
        assert!(!coordinator.finish());
    }

    #[test]
    fn test_run_scan_writes_report() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("snapshot.json");
        let output = dir.path().join("report.md");
        std::fs::write(&input, SNAPSHOT).unwrap();

        let config = CritConfig {
            input,
            output: Some(output.clone()),
            output_format: OutputFormat::Markdown,
            ..Default::default()
        };

        let (tx, rx) = crossbeam_channel::unbounded();
        let report = run_scan(&config, Some(tx)).unwrap();
        assert_eq!(report.files.len(), 1);

        let written = std::fs::read_to_string(&output).unwrap();
        assert!(written.contains("api/src/a.service.ts"));

        let events: Vec<ScanEvent> = rx.try_iter().collect();
        assert!(matches!(events.first(), Some(ScanEvent::StartScanning)));
        assert!(matches!(events.last(), Some(ScanEvent::Complete(_))));
    }

    #[test]
    fn test_requests_during_scan_trigger_one_follow_up() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("snapshot.json");
        std::fs::write(&input, SNAPSHOT).unwrap();
        let config = CritConfig {
            input,
            output: Some(dir.path().join("report.json")),
            ..Default::default()
        };

        let coordinator = Arc::new(ScanCoordinator::new());
        assert!(coordinator.request());

        // Three triggers from another thread while the slot is held
        let trigger = Arc::clone(&coordinator);
        let started = std::thread::spawn(move || (0..3).filter(|_| trigger.request()).count())
            .join()
            .unwrap();
        assert_eq!(started, 0);

        let passes = run_pending(&config, &coordinator).unwrap();
        assert_eq!(passes, 2);
        assert!(!coordinator.is_running());
        assert!(coordinator.request());
    }

    #[test]
    fn test_single_request_is_single_pass() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("snapshot.json");
        std::fs::write(&input, SNAPSHOT).unwrap();
        let config = CritConfig {
            input,
            output: Some(dir.path().join("report.json")),
            ..Default::default()
        };

        let coordinator = ScanCoordinator::new();
        assert!(coordinator.request());
        assert_eq!(run_pending(&config, &coordinator).unwrap(), 1);
        assert!(!coordinator.is_running());
    }

    #[test]
    fn test_failed_scan_releases_coordinator() {
        let dir = tempdir().unwrap();
        let config = CritConfig {
            input: dir.path().join("nope.json"),
            ..Default::default()
        };

        let coordinator = ScanCoordinator::new();
        assert!(coordinator.request());
        assert!(!coordinator.request());
        assert!(run_pending(&config, &coordinator).is_err());
        assert!(!coordinator.is_running());
        assert!(coordinator.request());
    }

    #[test]
    fn test_run_scan_missing_input() {
        let dir = tempdir().unwrap();
        let config = CritConfig {
            input: dir.path().join("nope.json"),
            ..Default::default()
        };
        assert!(run_scan(&config, None).is_err());
    }
}
