/// Why a render run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TerminalKind {
    /// Every frame of the range was written.
    Finished,
    /// The run was stopped on request (`abort`).
    Stopped,
    /// The run failed (source, flow or target error).
    Aborted,
}

/// End-of-run notification, emitted exactly once per run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TerminalEvent {
    /// Tag distinguishing success, stop and failure.
    pub kind: TerminalKind,
    /// Descriptive message.
    pub reason: String,
}

/// Lifecycle and progress notifications of a render task.
///
/// A run emits one `Sized`, then non-decreasing `Progress` values within `[0, total]`, then one
/// `Terminal`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskEvent {
    /// A run started; `total` output frames will be produced.
    Sized {
        /// Human-readable summary of the run.
        description: String,
        /// Total work units (output frames).
        total: u64,
    },
    /// Number of output frames written so far.
    Progress(u64),
    /// The run ended.
    Terminal(TerminalEvent),
}

/// Receiver of [`TaskEvent`]s, registered on a task before it starts.
///
/// Events are delivered on the task's worker thread.
pub trait TaskObserver: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: &TaskEvent);
}

impl<F> TaskObserver for F
where
    F: Fn(&TaskEvent) + Send + Sync,
{
    fn on_event(&self, event: &TaskEvent) {
        self(event)
    }
}
