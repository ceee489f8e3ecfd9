/// Tails the growing AOC log file, delivering batches of new lines.
///
/// Uses the `notify` crate for OS-level change notifications plus a fixed
/// poll timer as a fallback; both triggers are redundant by design
/// (notifications get missed on some platforms) and are coalesced through a
/// monotonic line cursor so a line is never delivered twice.
///
/// On start the whole existing file is treated as historical and handed to
/// the handler once, as a single bulk batch, before incremental tailing
/// begins.
///
/// Known limitation: if the file is truncated or rotated in place the line
/// cursor desynchronizes and new content is skipped until the file grows
/// past the old cursor. A `Tailer` is single-use — build a fresh one to
/// re-tail.
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Callback invoked with every non-empty batch of new lines, synchronously
/// inside the tailer's background task.
pub type BatchHandler = Box<dyn FnMut(Vec<String>) + Send>;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum TailerError {
    #[error("tailer already started")]
    AlreadyStarted,
    #[error("log file is not readable: {0}")]
    FileAccess(#[from] std::io::Error),
    #[error("failed to install filesystem watch: {0}")]
    WatchSetup(#[from] notify::Error),
}

// ---------------------------------------------------------------------------
// Line cursor
// ---------------------------------------------------------------------------

/// Read position expressed as a count of already-delivered lines. Reopening
/// the file and skipping past the cursor makes the notify and poll triggers
/// idempotent with respect to each other.
struct LineCursor {
    path: PathBuf,
    line: usize,
}

impl LineCursor {
    fn new(path: PathBuf) -> Self {
        Self { path, line: 0 }
    }

    /// Read all lines appended past the cursor and advance it by the number
    /// read. A temporarily unavailable file yields an empty batch; the next
    /// trigger retries.
    fn read_new_lines(&mut self) -> Vec<String> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(_) => return Vec::new(),
        };

        let mut batch = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            match line {
                Ok(l) => {
                    if idx >= self.line {
                        batch.push(l);
                    }
                }
                Err(e) => {
                    tracing::warn!("tailer read error: {}", e);
                    break;
                }
            }
        }

        self.line += batch.len();
        batch
    }
}

// ---------------------------------------------------------------------------
// Tailer
// ---------------------------------------------------------------------------

struct Running {
    shutdown: watch::Sender<bool>,
    task:     JoinHandle<()>,
}

pub struct Tailer {
    path:          PathBuf,
    poll_interval: Duration,
    handler:       Option<BatchHandler>,
    running:       Option<Running>,
}

impl Tailer {
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration, handler: BatchHandler) -> Self {
        Self {
            path:          path.into(),
            poll_interval,
            handler:       Some(handler),
            running:       None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Open the file, install the filesystem watch, deliver the existing
    /// content as one bulk batch, then launch the background loop.
    ///
    /// Fails without side effects if already running; a watch setup failure
    /// is fatal and returned to the caller. Must be called from within a
    /// tokio runtime.
    pub fn start(&mut self) -> Result<(), TailerError> {
        if self.running.is_some() {
            return Err(TailerError::AlreadyStarted);
        }
        let mut handler = self.handler.take().ok_or(TailerError::AlreadyStarted)?;

        // The target must be openable at start; afterwards a missing file
        // only skips cycles.
        File::open(&self.path)?;

        let (fs_tx, mut fs_rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = fs_tx.send(res);
            },
            notify::Config::default(),
        )?;
        let watch_dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

        let mut cursor = LineCursor::new(self.path.clone());

        // Historical content: everything present before monitoring began is
        // delivered once, as a single batch.
        let initial = cursor.read_new_lines();
        tracing::info!(
            path = %self.path.display(),
            historical_lines = initial.len(),
            "tailer starting"
        );
        if !initial.is_empty() {
            handler(initial);
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let path = self.path.clone();
        let poll = self.poll_interval;

        let task = tokio::spawn(async move {
            // Owning the watcher here keeps the OS watch alive exactly as
            // long as the loop; dropping it on exit releases the handle.
            let _watcher = watcher;
            let mut ticker = tokio::time::interval(poll);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    maybe = fs_rx.recv() => match maybe {
                        Some(Ok(Event { kind: EventKind::Modify(_) | EventKind::Create(_), paths, .. }))
                            if paths.iter().any(|p| p == &path) =>
                        {
                            deliver(&mut cursor, &mut handler);
                        }
                        Some(Ok(_)) => {} // Unrelated path or event kind
                        Some(Err(e)) => tracing::warn!("watch error: {}", e),
                        None => break, // Watcher gone — poll alone can't outlive it here
                    },
                    _ = ticker.tick() => deliver(&mut cursor, &mut handler),
                }
            }
            tracing::debug!("tailer loop exited");
        });

        self.running = Some(Running { shutdown: shutdown_tx, task });
        Ok(())
    }

    /// Signal the loop to exit at its next wait point and wait for it to
    /// finish; an in-progress batch always completes first. Safe to call
    /// repeatedly and on a never-started instance.
    pub async fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown.send(true);
            let _ = running.task.await;
            tracing::info!(path = %self.path.display(), "tailer stopped");
        }
    }
}

fn deliver(cursor: &mut LineCursor, handler: &mut BatchHandler) {
    let batch = cursor.read_new_lines();
    // A zero-length batch never reaches the handler
    if !batch.is_empty() {
        handler(batch);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tempfile::NamedTempFile;

    fn collecting_handler() -> (BatchHandler, Arc<Mutex<Vec<Vec<String>>>>) {
        let batches: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = batches.clone();
        let handler = Box::new(move |batch: Vec<String>| {
            sink.lock().unwrap().push(batch);
        });
        (handler, batches)
    }

    #[test]
    fn cursor_reads_once_and_advances() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "line one").unwrap();
        writeln!(f, "line two").unwrap();
        f.flush().unwrap();

        let mut cursor = LineCursor::new(f.path().to_path_buf());
        assert_eq!(cursor.read_new_lines(), vec!["line one", "line two"]);
        // Second read with nothing appended: empty, no duplicates
        assert!(cursor.read_new_lines().is_empty());

        writeln!(f, "line three").unwrap();
        f.flush().unwrap();
        assert_eq!(cursor.read_new_lines(), vec!["line three"]);
    }

    #[test]
    fn cursor_skips_cycle_when_file_missing() {
        let mut cursor = LineCursor::new(PathBuf::from("/nonexistent/aoc.log"));
        assert!(cursor.read_new_lines().is_empty());
        assert_eq!(cursor.line, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delivers_bulk_batch_then_increments() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "one").unwrap();
        writeln!(f, "two").unwrap();
        f.flush().unwrap();

        let (handler, batches) = collecting_handler();
        let mut tailer = Tailer::new(f.path(), Duration::from_millis(50), handler);
        tailer.start().unwrap();

        // Historical content arrives synchronously as one batch
        {
            let seen = batches.lock().unwrap();
            assert_eq!(seen.len(), 1);
            assert_eq!(seen[0], vec!["one", "two"]);
        }

        writeln!(f, "three").unwrap();
        f.flush().unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        tailer.stop().await;

        let seen = batches.lock().unwrap();
        let appended: Vec<&String> = seen.iter().skip(1).flatten().collect();
        assert_eq!(appended, vec!["three"], "appended line delivered exactly once");
    }

    #[tokio::test]
    async fn start_twice_fails() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "x").unwrap();
        f.flush().unwrap();

        let (handler, _batches) = collecting_handler();
        let mut tailer = Tailer::new(f.path(), DEFAULT_POLL_INTERVAL, handler);
        tailer.start().unwrap();
        assert!(matches!(tailer.start(), Err(TailerError::AlreadyStarted)));
        tailer.stop().await;
    }

    #[tokio::test]
    async fn start_fails_on_missing_file() {
        let (handler, _batches) = collecting_handler();
        let mut tailer = Tailer::new("/nonexistent/aoc.log", DEFAULT_POLL_INTERVAL, handler);
        assert!(matches!(tailer.start(), Err(TailerError::FileAccess(_))));
        assert!(!tailer.is_running());
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_safe_unstarted() {
        let (handler, _batches) = collecting_handler();
        let mut tailer = Tailer::new("/nonexistent/aoc.log", DEFAULT_POLL_INTERVAL, handler);
        tailer.stop().await; // never started
        tailer.stop().await; // and again
        assert!(!tailer.is_running());
    }
}
