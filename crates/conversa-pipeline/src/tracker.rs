// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session tracking: device registry, conversation resolution, lifecycle.
//!
//! The device map is the only structure mutated by concurrent intake paths;
//! DashMap gives per-entry exclusive mutation, which preserves the
//! at-most-one-open-conversation-per-device invariant. Map guards are never
//! held across awaits.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use conversa_analysis::AnalysisRunner;
use conversa_config::model::ConversaConfig;
use conversa_core::types::{
    AcceptOutcome, ConversationId, ConversationState, Device, DeviceId, Fragment,
    FragmentSubmission, PayloadKind, RejectReason,
};
use conversa_core::{ConversaError, ResultStore};
use tokio_util::sync::CancellationToken;

use crate::assembler::{ConversationCmd, ConversationWorker, Timeline};
use crate::intake::{self, DedupRing};

/// Live summary of a conversation still owned by the pipeline.
#[derive(Debug, Clone)]
pub struct OpenConversation {
    pub id: ConversationId,
    pub state: ConversationState,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub active_devices: usize,
}

struct DeviceEntry {
    device: Device,
    dedup: DedupRing,
}

struct ConversationHandle {
    state: ConversationState,
    tx: mpsc::Sender<ConversationCmd>,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
    /// Devices currently attached (watermark holders). Departed devices are
    /// removed here but remain in the worker's historical participant set.
    active_devices: HashSet<DeviceId>,
    task: Option<JoinHandle<()>>,
}

/// Resolves fragments to conversations and manages conversation lifecycle.
pub struct SessionTracker {
    config: ConversaConfig,
    devices: DashMap<DeviceId, DeviceEntry>,
    conversations: DashMap<ConversationId, ConversationHandle>,
    runner: Arc<AnalysisRunner>,
    store: Arc<dyn ResultStore>,
    cancel: CancellationToken,
}

enum Attach {
    /// Enqueue into this existing conversation.
    Existing(mpsc::Sender<ConversationCmd>, ConversationId),
    /// Conversation is closing or already archived.
    Closed(ConversationId),
    /// Attach window lapsed; leave the old conversation and open fresh.
    OpenNew { leave: Option<(mpsc::Sender<ConversationCmd>, ConversationId)> },
}

impl SessionTracker {
    pub fn new(
        config: ConversaConfig,
        store: Arc<dyn ResultStore>,
        runner: Arc<AnalysisRunner>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            devices: DashMap::new(),
            conversations: DashMap::new(),
            runner,
            store,
            cancel,
        }
    }

    /// Seed the in-memory registry from the store. Active-conversation
    /// references are not seeded: open conversations do not survive a
    /// restart, their fragments were never archived.
    pub async fn load_registry(&self) -> Result<usize, ConversaError> {
        let devices = self.store.list_devices().await?;
        let count = devices.len();
        for mut device in devices {
            device.active_conversation = None;
            self.devices.insert(
                device.id.clone(),
                DeviceEntry {
                    device,
                    dedup: DedupRing::new(self.config.intake.dedup_window_size),
                },
            );
        }
        Ok(count)
    }

    /// Register a new device, persisting it immediately.
    pub async fn register_device(&self, id: DeviceId) -> Result<Device, ConversaError> {
        let now = Utc::now();
        let device = Device {
            id: id.clone(),
            registered_at: now,
            last_seen_at: now,
            active_conversation: None,
            active: true,
        };
        self.store.register_device(&device).await?;
        self.devices.insert(
            id.clone(),
            DeviceEntry {
                device: device.clone(),
                dedup: DedupRing::new(self.config.intake.dedup_window_size),
            },
        );
        info!(device_id = %id, "device registered");
        Ok(device)
    }

    /// Look up a device's current in-memory state.
    pub fn device(&self, id: &DeviceId) -> Option<Device> {
        self.devices.get(id).map(|entry| entry.device.clone())
    }

    /// Number of open conversations holding this device in their active set.
    /// Always 0 or 1 -- the invariant the registry's per-device exclusive
    /// mutation exists to protect.
    pub fn open_conversations_containing(&self, device_id: &DeviceId) -> usize {
        self.conversations
            .iter()
            .filter(|entry| {
                entry.state == ConversationState::Open
                    && entry.active_devices.contains(device_id)
            })
            .count()
    }

    /// Live summaries of conversations the pipeline still owns.
    pub fn open_conversations(&self) -> Vec<OpenConversation> {
        self.conversations
            .iter()
            .map(|entry| OpenConversation {
                id: entry.key().clone(),
                state: entry.state,
                created_at: entry.created_at,
                last_activity_at: entry.last_activity_at,
                active_devices: entry.active_devices.len(),
            })
            .collect()
    }

    /// The full intake path: validate, dedup, resolve, enqueue.
    ///
    /// Returns synchronously to the submitting device. The dedup sequence is
    /// recorded and the device's last-seen bumped only on acceptance, so a
    /// rejected fragment can be resubmitted verbatim.
    pub async fn submit(&self, submission: FragmentSubmission) -> AcceptOutcome {
        let now = Utc::now();

        if let Some(reason) =
            intake::validate(&submission, now, self.config.intake.clock_skew_tolerance())
        {
            return AcceptOutcome::Rejected(reason);
        }

        // Registration and dedup checks under the device entry's lock.
        {
            let Some(entry) = self.devices.get(&submission.device_id) else {
                return AcceptOutcome::Rejected(RejectReason::UnknownDevice);
            };
            if entry.dedup.contains(submission.seq) {
                debug!(
                    device_id = %submission.device_id,
                    seq = submission.seq,
                    "duplicate fragment acknowledged"
                );
                return AcceptOutcome::Duplicate;
            }
        }

        let seq = submission.seq;
        let fragment = submission.into_fragment(now);
        let device_id = fragment.device_id.clone();

        let attached = if fragment.payload_kind == PayloadKind::Join {
            self.attach_join(fragment).await
        } else {
            self.attach(fragment).await
        };

        match attached {
            Ok(conversation_id) => {
                if let Some(mut entry) = self.devices.get_mut(&device_id) {
                    entry.dedup.record(seq);
                    entry.device.last_seen_at = now;
                    entry.device.active_conversation = Some(conversation_id.clone());
                }
                AcceptOutcome::Accepted { conversation_id }
            }
            Err(reason) => AcceptOutcome::Rejected(reason),
        }
    }

    /// Resolve a non-join fragment per the attachment policy: stay with the
    /// device's open conversation while the capture time is within the idle
    /// window of its last activity, otherwise open a new conversation.
    async fn attach(&self, fragment: Fragment) -> Result<ConversationId, RejectReason> {
        let device_id = fragment.device_id.clone();
        let current = self
            .devices
            .get(&device_id)
            .and_then(|entry| entry.device.active_conversation.clone());

        let idle_timeout = chrono::Duration::from_std(self.config.pipeline.idle_timeout())
            .unwrap_or_else(|_| chrono::Duration::zero());

        let decision = match current {
            None => Attach::OpenNew { leave: None },
            Some(conversation_id) => match self.conversations.get(&conversation_id) {
                Some(handle) if handle.state == ConversationState::Open => {
                    if fragment.capture_ts >= handle.last_activity_at - idle_timeout {
                        Attach::Existing(handle.tx.clone(), conversation_id.clone())
                    } else {
                        Attach::OpenNew {
                            leave: Some((handle.tx.clone(), conversation_id.clone())),
                        }
                    }
                }
                // Closing, or already archived and gone from the map: the
                // device must start a new conversation with its next fragment.
                Some(_) | None => Attach::Closed(conversation_id),
            },
        };

        match decision {
            Attach::Existing(tx, conversation_id) => {
                self.enqueue(&tx, &conversation_id, fragment).await?;
                Ok(conversation_id)
            }
            Attach::Closed(conversation_id) => {
                if let Some(mut entry) = self.devices.get_mut(&device_id) {
                    entry.device.active_conversation = None;
                }
                debug!(
                    device_id = %device_id,
                    conversation_id = %conversation_id,
                    "fragment for closed conversation rejected"
                );
                Err(RejectReason::ConversationClosed)
            }
            Attach::OpenNew { leave } => {
                if let Some((old_tx, old_id)) = leave {
                    self.leave_conversation(&old_tx, &old_id, &device_id);
                }
                self.open_conversation(fragment).await
            }
        }
    }

    /// Attach a join fragment to the conversation named in its payload.
    /// Only OPEN conversations accept joins.
    async fn attach_join(&self, fragment: Fragment) -> Result<ConversationId, RejectReason> {
        let device_id = fragment.device_id.clone();
        let target = ConversationId(fragment.payload.clone());

        let tx = match self.conversations.get(&target) {
            Some(handle) if handle.state == ConversationState::Open => handle.tx.clone(),
            _ => {
                debug!(
                    device_id = %device_id,
                    conversation_id = %target,
                    "join to non-open conversation rejected"
                );
                return Err(RejectReason::UnknownConversation);
            }
        };

        // A device is in at most one open conversation: leave the previous
        // one before joining.
        let previous = self
            .devices
            .get(&device_id)
            .and_then(|entry| entry.device.active_conversation.clone());
        if let Some(previous_id) = previous
            && previous_id != target
            && let Some(old) = self.conversations.get(&previous_id)
        {
            let old_tx = old.tx.clone();
            drop(old);
            self.leave_conversation(&old_tx, &previous_id, &device_id);
        }

        self.enqueue(&tx, &target, fragment).await?;

        if let Some(mut handle) = self.conversations.get_mut(&target) {
            handle.active_devices.insert(device_id.clone());
        }
        info!(device_id = %device_id, conversation_id = %target, "device joined conversation");
        Ok(target)
    }

    /// Bounded enqueue into a conversation's single-writer queue. On success
    /// the conversation's activity clock advances; on a full queue the
    /// caller gets `Overloaded` within the backpressure wait.
    async fn enqueue(
        &self,
        tx: &mpsc::Sender<ConversationCmd>,
        conversation_id: &ConversationId,
        fragment: Fragment,
    ) -> Result<(), RejectReason> {
        let capture_ts = fragment.capture_ts;
        let device_id = fragment.device_id.clone();
        let wait = self.config.intake.backpressure_wait();

        match tx
            .send_timeout(ConversationCmd::Fragment(fragment), wait)
            .await
        {
            Ok(()) => {
                if let Some(mut handle) = self.conversations.get_mut(conversation_id) {
                    if capture_ts > handle.last_activity_at {
                        handle.last_activity_at = capture_ts;
                    }
                    handle.active_devices.insert(device_id);
                }
                Ok(())
            }
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                warn!(
                    conversation_id = %conversation_id,
                    waited_ms = wait.as_millis() as u64,
                    "conversation queue full, rejecting as overloaded"
                );
                Err(RejectReason::Overloaded)
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                Err(RejectReason::ConversationClosed)
            }
        }
    }

    /// Open a new conversation seeded with this fragment.
    async fn open_conversation(&self, fragment: Fragment) -> Result<ConversationId, RejectReason> {
        let id = ConversationId::generate();
        let now = Utc::now();
        let device_id = fragment.device_id.clone();
        let capture_ts = fragment.capture_ts;

        let (tx, rx) = mpsc::channel(self.config.intake.queue_depth);
        let timeline = Timeline::new(
            self.config.pipeline.out_of_order_tolerance(),
            self.config.pipeline.window_size(),
        );
        let worker = ConversationWorker::new(
            id.clone(),
            now,
            device_id.clone(),
            rx,
            timeline,
            Arc::clone(&self.runner),
            Arc::clone(&self.store),
            self.cancel.clone(),
        );
        let task = tokio::spawn(worker.run());

        // A fresh queue cannot be full.
        tx.try_send(ConversationCmd::Fragment(fragment))
            .map_err(|_| RejectReason::Overloaded)?;

        let mut active_devices = HashSet::new();
        active_devices.insert(device_id.clone());
        self.conversations.insert(
            id.clone(),
            ConversationHandle {
                state: ConversationState::Open,
                tx,
                created_at: now,
                last_activity_at: capture_ts,
                active_devices,
                task: Some(task),
            },
        );

        info!(conversation_id = %id, device_id = %device_id, "conversation opened");
        Ok(id)
    }

    /// Remove a device's watermark from a conversation it is leaving.
    /// Best-effort: if the queue is saturated the watermark clears at close.
    fn leave_conversation(
        &self,
        tx: &mpsc::Sender<ConversationCmd>,
        conversation_id: &ConversationId,
        device_id: &DeviceId,
    ) {
        if tx
            .try_send(ConversationCmd::Leave(device_id.clone()))
            .is_err()
        {
            debug!(
                conversation_id = %conversation_id,
                device_id = %device_id,
                "leave not delivered (queue full or closed)"
            );
        }
        if let Some(mut handle) = self.conversations.get_mut(conversation_id) {
            handle.active_devices.remove(device_id);
        }
    }

    /// One idle-closure pass: conversations whose last activity is older
    /// than the idle timeout transition OPEN -> CLOSING -> CLOSED.
    pub async fn sweep(&self) {
        let now = Utc::now();
        let idle_timeout = chrono::Duration::from_std(self.config.pipeline.idle_timeout())
            .unwrap_or_else(|_| chrono::Duration::zero());

        let idle: Vec<ConversationId> = self
            .conversations
            .iter()
            .filter(|entry| {
                entry.state == ConversationState::Open
                    && now - entry.last_activity_at > idle_timeout
            })
            .map(|entry| entry.key().clone())
            .collect();

        for id in idle {
            self.close_conversation(&id).await;
        }
    }

    /// Close one conversation: mark CLOSING, enqueue the close behind any
    /// in-flight fragments, wait for the worker to archive, then drop the
    /// handle and clear device references. The sole path out of OPEN.
    pub async fn close_conversation(&self, id: &ConversationId) {
        let (tx, task) = {
            let Some(mut handle) = self.conversations.get_mut(id) else {
                return;
            };
            if handle.state != ConversationState::Open {
                return;
            }
            handle.state = ConversationState::Closing;
            (handle.tx.clone(), handle.task.take())
        };

        info!(conversation_id = %id, "conversation closing");

        if tx.send(ConversationCmd::Close).await.is_err() {
            warn!(conversation_id = %id, "conversation worker queue already gone");
        }

        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(conversation_id = %id, error = %e, "conversation worker join failed");
        }

        self.conversations.remove(id);

        let mut departed: Vec<Device> = Vec::new();
        for mut entry in self.devices.iter_mut() {
            if entry.device.active_conversation.as_ref() == Some(id) {
                entry.device.active_conversation = None;
                departed.push(entry.device.clone());
            }
        }
        for device in departed {
            if let Err(e) = self.store.upsert_device(&device).await {
                warn!(device_id = %device.id, error = %e, "device flush failed");
            }
        }

        info!(conversation_id = %id, "conversation closed");
    }

    /// Drain everything: close all open conversations and flush the device
    /// registry to the store.
    pub async fn shutdown(&self) {
        let open: Vec<ConversationId> = self
            .conversations
            .iter()
            .filter(|entry| entry.state == ConversationState::Open)
            .map(|entry| entry.key().clone())
            .collect();

        info!(conversations = open.len(), "draining open conversations");
        for id in open {
            self.close_conversation(&id).await;
        }

        let devices: Vec<Device> = self
            .devices
            .iter()
            .map(|entry| entry.device.clone())
            .collect();
        for device in devices {
            if let Err(e) = self.store.upsert_device(&device).await {
                warn!(device_id = %device.id, error = %e, "device flush failed");
            }
        }
    }
}
