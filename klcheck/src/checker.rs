//! Parallel driver: one task per library file, fanned out to worker threads.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::core::{CheckSummary, KlcCore, LibraryReport};

struct Task {
    index: usize,
    path: PathBuf,
}

struct Outcome {
    index: usize,
    report: LibraryReport,
}

/// Largest files first so long jobs do not end up last. Unit tests keep
/// the given order.
pub fn order_files(files: &[PathBuf], unittest: bool) -> Vec<PathBuf> {
    let mut ordered = files.to_vec();
    if !unittest {
        ordered.sort_by_cached_key(|p| std::cmp::Reverse(file_size(p)));
    }
    ordered
}

fn file_size(path: &Path) -> u64 {
    if path.is_dir() {
        std::fs::read_dir(path)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| e.metadata().ok())
                    .map(|m| m.len())
                    .sum()
            })
            .unwrap_or(0)
    } else {
        std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
    }
}

fn check_guarded(core: &KlcCore, path: &Path, cancelled: &AtomicBool) -> LibraryReport {
    match panic::catch_unwind(AssertUnwindSafe(|| core.check_library_until(path, cancelled))) {
        Ok(report) => report,
        Err(_) => {
            tracing::warn!("Worker panicked while checking {}", path.display());
            LibraryReport::failed(path, format!("Internal error while checking {}", path.display()))
        }
    }
}

/// Stops taking tasks once `cancelled` is set.
fn worker(core: Arc<KlcCore>, tasks: Receiver<Task>, results: Sender<Outcome>, cancelled: Arc<AtomicBool>) {
    while let Ok(task) = tasks.recv() {
        if cancelled.load(Ordering::SeqCst) {
            break;
        }
        let report = check_guarded(&core, &task.path, &cancelled);
        if results.send(Outcome { index: task.index, report }).is_err() {
            break;
        }
    }
}

fn worker_count(requested: usize, files: usize) -> usize {
    let jobs = if requested == 0 {
        thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    } else {
        requested
    };
    jobs.clamp(1, files.max(1))
}

/// Check all files and aggregate their reports in processing order.
pub fn run(core: Arc<KlcCore>, files: &[PathBuf]) -> CheckSummary {
    let options = core.options().clone();
    let ordered = order_files(files, options.unittest);
    let jobs = worker_count(options.jobs, ordered.len());

    let mut summary = CheckSummary::default();
    let cancelled = Arc::new(AtomicBool::new(false));
    if jobs == 1 && options.timeout.is_none() {
        for path in &ordered {
            summary.push(check_guarded(&core, path, &cancelled));
        }
        return summary;
    }

    tracing::debug!("Checking {} libraries with {} workers", ordered.len(), jobs);
    let (task_tx, task_rx) = unbounded::<Task>();
    let (result_tx, result_rx) = unbounded::<Outcome>();
    for (index, path) in ordered.iter().enumerate() {
        // Receiver is still held locally, so this cannot fail.
        let _ = task_tx.send(Task { index, path: path.clone() });
    }
    drop(task_tx);

    for _ in 0..jobs {
        let core = Arc::clone(&core);
        let tasks = task_rx.clone();
        let results = result_tx.clone();
        let cancelled = Arc::clone(&cancelled);
        thread::spawn(move || worker(core, tasks, results, cancelled));
    }
    drop(result_tx);

    let deadline = options.timeout.map(|t| Instant::now() + t);
    let mut slots: Vec<Option<LibraryReport>> = vec![None; ordered.len()];
    let mut received = 0;
    while received < ordered.len() {
        let outcome = match deadline {
            Some(deadline) => match result_rx.recv_deadline(deadline) {
                Ok(outcome) => outcome,
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!("Timed out waiting for workers");
                    cancelled.store(true, Ordering::SeqCst);
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match result_rx.recv() {
                Ok(outcome) => outcome,
                Err(_) => break,
            },
        };
        slots[outcome.index] = Some(outcome.report);
        received += 1;
    }

    for (slot, path) in slots.into_iter().zip(&ordered) {
        match slot {
            Some(report) => summary.push(report),
            None => {
                tracing::warn!("No result for {}", path.display());
                summary.push(LibraryReport::failed(path, format!("No result for {}", path.display())));
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CheckOptions;
    use std::time::Duration;

    const LIB: &str = r#"(kicad_symbol_lib
	(version 20251024)
	(generator "klcheck")
	(symbol "Bad Name"
		(property "Reference" "U"
			(at 0 0 0)
			(effects
				(font
					(size 1.27 1.27)
				)
			)
		)
	)
)
"#;

    /// One 40 mil pin, which the S4.1 fix lengthens.
    const SHORT_PIN_LIB: &str = r#"(kicad_symbol_lib
	(version 20251024)
	(generator "klcheck")
	(symbol "R"
		(property "Reference" "R"
			(at 0 0 0)
			(effects
				(font
					(size 1.27 1.27)
				)
			)
		)
		(symbol "R_1_1"
			(pin passive line
				(at 0 2.54 270)
				(length 1.016)
				(name "~"
					(effects
						(font
							(size 1.27 1.27)
						)
					)
				)
				(number "1"
					(effects
						(font
							(size 1.27 1.27)
						)
					)
				)
			)
		)
	)
)
"#;

    fn write_libs(dir: &Path, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = dir.join(format!("lib{}.kicad_sym", i));
                std::fs::write(&path, LIB).unwrap();
                path
            })
            .collect()
    }

    fn core(jobs: usize, timeout: Option<Duration>) -> Arc<KlcCore> {
        Arc::new(
            KlcCore::new(CheckOptions {
                rules: vec!["G1.1".to_string()],
                jobs,
                timeout,
                ..Default::default()
            })
            .unwrap(),
        )
    }

    #[test]
    fn test_worker_count() {
        assert_eq!(worker_count(4, 2), 2);
        assert_eq!(worker_count(1, 0), 1);
        assert!(worker_count(0, 64) >= 1);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = write_libs(dir.path(), 5);
        files.push(dir.path().join("missing.kicad_sym"));

        let sequential = run(core(1, None), &files);
        let parallel = run(core(3, Some(Duration::from_secs(60))), &files);
        assert_eq!(sequential.libraries.len(), 6);
        assert_eq!(sequential.errors, 6);
        assert_eq!(parallel.errors, sequential.errors);
        assert_eq!(parallel.libraries.len(), sequential.libraries.len());
    }

    #[test]
    fn test_cancelled_worker_takes_no_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_libs(dir.path(), 2);
        let (task_tx, task_rx) = unbounded::<Task>();
        let (result_tx, result_rx) = unbounded::<Outcome>();
        for (index, path) in files.into_iter().enumerate() {
            task_tx.send(Task { index, path }).unwrap();
        }
        drop(task_tx);

        worker(core(2, None), task_rx, result_tx, Arc::new(AtomicBool::new(true)));
        assert!(result_rx.try_recv().is_err());
    }

    #[test]
    fn test_cancelled_fix_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.kicad_sym");
        std::fs::write(&path, SHORT_PIN_LIB).unwrap();
        let core = KlcCore::new(CheckOptions {
            rules: vec!["S4.1".to_string()],
            fix: true,
            ..Default::default()
        })
        .unwrap();

        let report = core.check_library_until(&path, &AtomicBool::new(true));
        assert!(report.symbols[0].fixed);
        assert!(!report.written);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), SHORT_PIN_LIB);

        let report = core.check_library_until(&path, &AtomicBool::new(false));
        assert!(report.written);
        assert_ne!(std::fs::read_to_string(&path).unwrap(), SHORT_PIN_LIB);
    }

    #[test]
    fn test_unittest_keeps_order() {
        let files = vec![PathBuf::from("b"), PathBuf::from("a")];
        assert_eq!(order_files(&files, true), files);
    }
}
