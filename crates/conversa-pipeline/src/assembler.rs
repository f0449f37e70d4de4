// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation assembly: ordered merge of per-device fragment streams.
//!
//! Each conversation's timeline is owned by exactly one [`ConversationWorker`]
//! task fed by an mpsc queue -- the single-writer-per-conversation invariant.
//! The merge itself lives in [`Timeline`], a synchronous state machine that
//! the worker drives, so the ordering rules are testable without tasks.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use conversa_analysis::AnalysisRunner;
use conversa_core::types::{
    AnalysisPass, Annotation, ConversationId, ConversationRecord, ConversationState, DeviceId,
    Fragment,
};
use conversa_core::ResultStore;

/// Commands delivered to a conversation worker through its queue.
///
/// Queue order is the drain guarantee: `Close` enqueued behind in-flight
/// fragments is processed only after all of them.
#[derive(Debug)]
pub enum ConversationCmd {
    /// An accepted fragment (including join fragments, which register the
    /// joining device's watermark).
    Fragment(Fragment),
    /// The device moved to another conversation; stop holding the commit
    /// point for it.
    Leave(DeviceId),
    /// Drain and close: commit the rest, run the final pass, persist.
    Close,
}

/// Outcome of offering one fragment to a timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Buffered pending commit-point advancement.
    Pending,
    /// Capture timestamp at or below the commit point: dropped, counted,
    /// never retried.
    LateDropped,
}

/// A committed window slice handed to the analysis engine.
#[derive(Debug, Clone)]
pub struct WindowSlice {
    pub index: u64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub fragments: Vec<Fragment>,
}

/// Pending-heap entry ordered by the timeline ordering key.
#[derive(Debug)]
struct HeapEntry(Fragment);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.ordering_key() == other.0.ordering_key()
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.ordering_key().cmp(&other.0.ordering_key())
    }
}

/// Ordered merge state for one conversation.
///
/// Fragments buffer in a min-heap ordered by `(capture_ts, arrival_ts,
/// device_id)`. Each active participant contributes a watermark (its highest
/// accepted capture timestamp); the commit point is the minimum watermark
/// minus the out-of-order tolerance, and never regresses. Fragments at or
/// below the commit point move to the immutable committed prefix in order.
pub struct Timeline {
    tolerance: chrono::Duration,
    window_size: chrono::Duration,
    committed: Vec<Fragment>,
    pending: BinaryHeap<Reverse<HeapEntry>>,
    watermarks: HashMap<DeviceId, DateTime<Utc>>,
    commit_point: Option<DateTime<Utc>>,
    /// First committed capture timestamp; windows are anchored here so
    /// boundaries are deterministic under replay.
    window_anchor: Option<DateTime<Utc>>,
    next_window: u64,
    late_dropped: u64,
}

impl Timeline {
    pub fn new(tolerance: std::time::Duration, window_size: std::time::Duration) -> Self {
        Self {
            tolerance: chrono::Duration::from_std(tolerance)
                .unwrap_or_else(|_| chrono::Duration::zero()),
            window_size: chrono::Duration::from_std(window_size)
                .unwrap_or_else(|_| chrono::Duration::seconds(30)),
            committed: Vec::new(),
            pending: BinaryHeap::new(),
            watermarks: HashMap::new(),
            commit_point: None,
            window_anchor: None,
            next_window: 0,
            late_dropped: 0,
        }
    }

    /// Offer a fragment: advance the device's watermark and buffer it, or
    /// drop it as late if the commit point already passed it.
    pub fn insert(&mut self, fragment: Fragment) -> InsertOutcome {
        if let Some(commit_point) = self.commit_point
            && fragment.capture_ts <= commit_point
        {
            self.late_dropped += 1;
            return InsertOutcome::LateDropped;
        }

        self.watermarks
            .entry(fragment.device_id.clone())
            .and_modify(|wm| {
                if fragment.capture_ts > *wm {
                    *wm = fragment.capture_ts;
                }
            })
            .or_insert(fragment.capture_ts);

        self.pending.push(Reverse(HeapEntry(fragment)));
        InsertOutcome::Pending
    }

    /// Remove a device's watermark so it no longer holds back the commit
    /// point. Its already-buffered fragments stay in the merge.
    pub fn remove_watermark(&mut self, device_id: &DeviceId) {
        self.watermarks.remove(device_id);
    }

    /// Recompute the commit point, commit eligible fragments, and return any
    /// fully committed windows in order.
    pub fn advance(&mut self) -> Vec<WindowSlice> {
        let Some(min_watermark) = self.watermarks.values().min().copied() else {
            return Vec::new();
        };

        let candidate = min_watermark - self.tolerance;
        match self.commit_point {
            // Monotonic: the commit point never regresses.
            Some(current) if candidate <= current => {}
            _ => self.commit_point = Some(candidate),
        }

        let commit_point = match self.commit_point {
            Some(cp) => cp,
            None => return Vec::new(),
        };

        while let Some(Reverse(entry)) = self.pending.peek() {
            if entry.0.capture_ts > commit_point {
                break;
            }
            let Reverse(HeapEntry(fragment)) = self.pending.pop().expect("peeked above");
            if self.window_anchor.is_none() {
                self.window_anchor = Some(fragment.capture_ts);
            }
            self.committed.push(fragment);
        }

        self.collect_windows(commit_point)
    }

    /// Windows whose end boundary the commit point has passed.
    fn collect_windows(&mut self, commit_point: DateTime<Utc>) -> Vec<WindowSlice> {
        let Some(anchor) = self.window_anchor else {
            return Vec::new();
        };

        let mut slices = Vec::new();
        loop {
            let start = anchor + self.window_size * self.next_window as i32;
            let end = start + self.window_size;
            if commit_point < end {
                break;
            }
            let fragments: Vec<Fragment> = self
                .committed
                .iter()
                .filter(|f| f.capture_ts >= start && f.capture_ts < end)
                .cloned()
                .collect();
            slices.push(WindowSlice {
                index: self.next_window,
                start,
                end,
                fragments,
            });
            self.next_window += 1;
        }
        slices
    }

    /// Close the timeline: commit everything still pending, in order. The
    /// remaining fragments were accepted within tolerance, so they belong to
    /// the conversation even though no further watermark advancement will
    /// come.
    pub fn close(&mut self) {
        while let Some(Reverse(HeapEntry(fragment))) = self.pending.pop() {
            if self.window_anchor.is_none() {
                self.window_anchor = Some(fragment.capture_ts);
            }
            if self.commit_point.is_none_or(|cp| fragment.capture_ts > cp) {
                self.commit_point = Some(fragment.capture_ts);
            }
            self.committed.push(fragment);
        }
    }

    pub fn committed(&self) -> &[Fragment] {
        &self.committed
    }

    pub fn commit_point(&self) -> Option<DateTime<Utc>> {
        self.commit_point
    }

    pub fn late_dropped(&self) -> u64 {
        self.late_dropped
    }

    pub fn windows_emitted(&self) -> u64 {
        self.next_window
    }

    /// Capture timestamp of the newest committed fragment.
    pub fn last_committed_capture(&self) -> Option<DateTime<Utc>> {
        self.committed.last().map(|f| f.capture_ts)
    }
}

/// Single-writer task owning one conversation's timeline.
///
/// Incremental analysis runs on spawned tasks so ingestion (this queue and
/// every other conversation) is never blocked by an in-flight pass.
pub struct ConversationWorker {
    id: ConversationId,
    created_at: DateTime<Utc>,
    rx: mpsc::Receiver<ConversationCmd>,
    timeline: Timeline,
    participants: HashSet<DeviceId>,
    annotations: Vec<Annotation>,
    analysis: JoinSet<Vec<Annotation>>,
    runner: Arc<AnalysisRunner>,
    store: Arc<dyn ResultStore>,
    cancel: CancellationToken,
}

impl ConversationWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ConversationId,
        created_at: DateTime<Utc>,
        first_participant: DeviceId,
        rx: mpsc::Receiver<ConversationCmd>,
        timeline: Timeline,
        runner: Arc<AnalysisRunner>,
        store: Arc<dyn ResultStore>,
        cancel: CancellationToken,
    ) -> Self {
        let mut participants = HashSet::new();
        participants.insert(first_participant);
        Self {
            id,
            created_at,
            rx,
            timeline,
            participants,
            annotations: Vec::new(),
            analysis: JoinSet::new(),
            runner,
            store,
            cancel,
        }
    }

    /// Drive the conversation until `Close` arrives, then archive it.
    pub async fn run(mut self) {
        while let Some(cmd) = self.rx.recv().await {
            match cmd {
                ConversationCmd::Fragment(fragment) => {
                    self.participants.insert(fragment.device_id.clone());
                    match self.timeline.insert(fragment) {
                        InsertOutcome::Pending => {
                            let windows = self.timeline.advance();
                            self.spawn_incremental(windows);
                        }
                        InsertOutcome::LateDropped => {
                            warn!(
                                conversation_id = %self.id,
                                late_dropped = self.timeline.late_dropped(),
                                "fragment below commit point dropped as late"
                            );
                        }
                    }
                }
                ConversationCmd::Leave(device_id) => {
                    self.timeline.remove_watermark(&device_id);
                    let windows = self.timeline.advance();
                    self.spawn_incremental(windows);
                }
                ConversationCmd::Close => {
                    // Stop the queue, then salvage fragments that raced in
                    // behind the close marker. Once closed, intake sees the
                    // dead channel and rejects with conversation_closed --
                    // an accepted fragment is never lost.
                    self.rx.close();
                    while let Ok(cmd) = self.rx.try_recv() {
                        if let ConversationCmd::Fragment(fragment) = cmd {
                            self.participants.insert(fragment.device_id.clone());
                            self.timeline.insert(fragment);
                        }
                    }
                    self.finish().await;
                    return;
                }
            }
        }

        // Queue senders dropped without an explicit Close (pipeline teardown);
        // archive what we have.
        self.finish().await;
    }

    fn spawn_incremental(&mut self, windows: Vec<WindowSlice>) {
        for window in windows {
            debug!(
                conversation_id = %self.id,
                window = window.index,
                fragments = window.fragments.len(),
                "window committed"
            );
            let runner = Arc::clone(&self.runner);
            let id = self.id.clone();
            self.analysis.spawn(async move {
                runner
                    .run(&id, &window.fragments, AnalysisPass::Incremental, window.index)
                    .await
            });
        }
    }

    /// Final drain: commit the rest of the timeline, collect in-flight
    /// incremental passes, run the final pass, and persist until it sticks.
    async fn finish(mut self) {
        self.timeline.close();

        while let Some(result) = self.analysis.join_next().await {
            match result {
                Ok(annotations) => self.annotations.extend(annotations),
                Err(e) => warn!(
                    conversation_id = %self.id,
                    error = %e,
                    "incremental analysis task failed"
                ),
            }
        }

        let final_annotations = self
            .runner
            .run(
                &self.id,
                self.timeline.committed(),
                AnalysisPass::Final,
                self.timeline.windows_emitted(),
            )
            .await;
        self.annotations.extend(final_annotations);

        let record = ConversationRecord {
            id: self.id.clone(),
            state: ConversationState::Closed,
            participants: {
                let mut participants: Vec<DeviceId> =
                    self.participants.iter().cloned().collect();
                participants.sort();
                participants
            },
            created_at: self.created_at,
            last_activity_at: self
                .timeline
                .last_committed_capture()
                .unwrap_or(self.created_at),
            fragment_count: self.timeline.committed().len() as u64,
            late_dropped: self.timeline.late_dropped(),
        };

        self.persist_until_success(&record).await;

        info!(
            conversation_id = %self.id,
            fragments = record.fragment_count,
            annotations = self.annotations.len(),
            "conversation archived"
        );
    }

    /// Archival data is never silently lost: storage failure on the closure
    /// path is retried with capped backoff until it succeeds or the process
    /// is told to stop.
    async fn persist_until_success(&self, record: &ConversationRecord) {
        let mut backoff = std::time::Duration::from_millis(500);
        loop {
            match self
                .store
                .persist_conversation(record, self.timeline.committed(), &self.annotations)
                .await
            {
                Ok(()) => return,
                Err(e) => {
                    warn!(
                        conversation_id = %self.id,
                        error = %e,
                        retry_in = ?backoff,
                        "archive persistence failed, retrying"
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = self.cancel.cancelled() => {
                    error!(
                        conversation_id = %self.id,
                        "shutdown during archive retry -- conversation data not persisted"
                    );
                    return;
                }
            }
            backoff = (backoff * 2).min(std::time::Duration::from_secs(30));
        }
    }
}
