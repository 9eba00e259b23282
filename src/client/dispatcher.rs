use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Silence interval after the last transcript update before an evaluation
/// is dispatched.
pub const PAUSE_INTERVAL: Duration = Duration::from_millis(1500);

type PauseCallback = Arc<dyn Fn(String) + Send + Sync>;
type TranscriptAccessor = Arc<dyn Fn() -> String + Send + Sync>;

/// Debounces a continuously updated live transcript into evaluation
/// dispatches: every update restarts one pause timer, and only the timer
/// belonging to the latest update may fire. The transcript is read at
/// expiry, not at scheduling time.
pub struct PauseDispatcher {
    on_pause: PauseCallback,
    get_transcript: TranscriptAccessor,
    pause: Duration,
    // Exactly one timer may be outstanding; the generation tag lets an
    // expiring task detect that it has been superseded even if the abort
    // raced with its wake-up.
    pending: Arc<Mutex<Option<(u64, JoinHandle<()>)>>>,
    generation: AtomicU64,
}

impl PauseDispatcher {
    pub fn new(
        on_pause: impl Fn(String) + Send + Sync + 'static,
        get_transcript: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        Self::with_pause(PAUSE_INTERVAL, on_pause, get_transcript)
    }

    pub fn with_pause(
        pause: Duration,
        on_pause: impl Fn(String) + Send + Sync + 'static,
        get_transcript: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_pause: Arc::new(on_pause),
            get_transcript: Arc::new(get_transcript),
            pause,
            pending: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    /// Call whenever the observed transcript changes. Restarts the pause
    /// timer; any previously pending timer is cancelled.
    pub fn on_transcript_update(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let on_pause = Arc::clone(&self.on_pause);
        let get_transcript = Arc::clone(&self.get_transcript);
        let pending = Arc::clone(&self.pending);
        let pause = self.pause;

        let mut slot = self.pending.lock().expect("dispatcher slot poisoned");
        if let Some((_, handle)) = slot.take() {
            handle.abort();
        }
        *slot = Some((
            generation,
            tokio::spawn(async move {
                tokio::time::sleep(pause).await;
                {
                    let mut slot = pending.lock().expect("dispatcher slot poisoned");
                    let is_current = slot
                        .as_ref()
                        .map(|(current, _)| *current == generation)
                        .unwrap_or(false);
                    // A newer update or a cancel superseded this timer.
                    if !is_current {
                        return;
                    }
                    slot.take();
                }
                let transcript = get_transcript().trim().to_string();
                if !transcript.is_empty() {
                    on_pause(transcript);
                }
            }),
        ));
    }

    /// Submit now: cancel any pending timer and fire synchronously when
    /// the trimmed transcript is non-empty.
    pub fn trigger(&self) {
        self.cancel();
        let transcript = (self.get_transcript)().trim().to_string();
        if !transcript.is_empty() {
            (self.on_pause)(transcript);
        }
    }

    /// Drop a pending timer without firing. Safe when none is pending.
    pub fn cancel(&self) {
        let mut slot = self.pending.lock().expect("dispatcher slot poisoned");
        if let Some((_, handle)) = slot.take() {
            handle.abort();
        }
    }
}

impl Drop for PauseDispatcher {
    fn drop(&mut self) {
        self.cancel();
    }
}
