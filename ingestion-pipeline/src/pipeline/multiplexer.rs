use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use common::storage::types::ingestion_task::StageKind;
use futures::StreamExt;
use tokio::{sync::mpsc, task::AbortHandle};
use tracing::{debug, warn};

use super::{
    services::UpdateChannel,
    status::{classify, classify_failure, StageEvent},
};

/// An event as delivered by a forwarder, tagged only with the backend job id.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMessage {
    pub job_id: String,
    pub event: StageEvent,
}

/// A [`ChannelMessage`] matched back to the task that owns its subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedEvent {
    pub task_id: String,
    pub job_id: String,
    pub stage: StageKind,
    pub event: StageEvent,
}

struct Subscription {
    job_id: String,
    stage: StageKind,
    forwarder: AbortHandle,
}

#[derive(Default)]
struct Subscriptions {
    by_task: HashMap<String, Subscription>,
    job_to_task: HashMap<String, String>,
}

impl Subscriptions {
    fn remove(&mut self, task_id: &str) -> Option<Subscription> {
        let subscription = self.by_task.remove(task_id)?;
        if self
            .job_to_task
            .get(&subscription.job_id)
            .is_some_and(|owner| owner == task_id)
        {
            self.job_to_task.remove(&subscription.job_id);
        }
        Some(subscription)
    }
}

/// Keeps at most one live update subscription per task and funnels all of their
/// events into a single channel.
pub struct ConnectionMultiplexer {
    channel: Arc<dyn UpdateChannel>,
    sender: mpsc::UnboundedSender<ChannelMessage>,
    subscriptions: Mutex<Subscriptions>,
}

impl ConnectionMultiplexer {
    pub fn new(
        channel: Arc<dyn UpdateChannel>,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                channel,
                sender,
                subscriptions: Mutex::new(Subscriptions::default()),
            },
            receiver,
        )
    }

    /// Subscribes `task_id` to `job_id`, replacing any subscription the task already had.
    /// Must be called from within a tokio runtime.
    pub fn open(&self, task_id: &str, job_id: &str, stage: StageKind) {
        let mut subscriptions = self.lock();

        if let Some(previous) = subscriptions.remove(task_id) {
            debug!(
                %task_id,
                previous_job_id = %previous.job_id,
                "Replacing live subscription"
            );
            previous.forwarder.abort();
        }
        if let Some(owner) = subscriptions.job_to_task.get(job_id).cloned() {
            warn!(%job_id, %owner, %task_id, "Job was subscribed by another task; moving it");
            if let Some(stolen) = subscriptions.remove(&owner) {
                stolen.forwarder.abort();
            }
        }

        let forwarder = tokio::spawn(forward(
            Arc::clone(&self.channel),
            job_id.to_string(),
            self.sender.clone(),
        ))
        .abort_handle();

        subscriptions
            .job_to_task
            .insert(job_id.to_string(), task_id.to_string());
        subscriptions.by_task.insert(
            task_id.to_string(),
            Subscription {
                job_id: job_id.to_string(),
                stage,
                forwarder,
            },
        );
        debug!(%task_id, %job_id, stage = stage.as_str(), "Opened live subscription");
    }

    /// Ends the task's subscription. Returns whether one was open.
    pub fn close(&self, task_id: &str) -> bool {
        let removed = self.lock().remove(task_id);
        match removed {
            Some(subscription) => {
                subscription.forwarder.abort();
                debug!(%task_id, job_id = %subscription.job_id, "Closed live subscription");
                true
            }
            None => false,
        }
    }

    /// Maps a message to its task. Messages for unregistered job ids yield `None`.
    /// The record is dropped once its forwarder has delivered a final event.
    pub fn resolve(&self, message: ChannelMessage) -> Option<RoutedEvent> {
        let mut subscriptions = self.lock();
        let task_id = subscriptions.job_to_task.get(&message.job_id)?.clone();
        let stage = subscriptions.by_task.get(&task_id)?.stage;

        if message.event.is_final() {
            subscriptions.remove(&task_id);
        }

        Some(RoutedEvent {
            task_id,
            job_id: message.job_id,
            stage,
            event: message.event,
        })
    }

    /// The job id and stage the task is subscribed to, if any.
    pub fn active(&self, task_id: &str) -> Option<(String, StageKind)> {
        self.lock()
            .by_task
            .get(task_id)
            .map(|subscription| (subscription.job_id.clone(), subscription.stage))
    }

    pub fn len(&self) -> usize {
        self.lock().by_task.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Subscriptions> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ConnectionMultiplexer {
    fn drop(&mut self) {
        let subscriptions = self
            .subscriptions
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for (_, subscription) in subscriptions.by_task.drain() {
            subscription.forwarder.abort();
        }
        subscriptions.job_to_task.clear();
    }
}

/// Pumps one job's update stream into the shared channel until a final event.
async fn forward(
    channel: Arc<dyn UpdateChannel>,
    job_id: String,
    sender: mpsc::UnboundedSender<ChannelMessage>,
) {
    let mut stream = match channel.subscribe(&job_id).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!(%job_id, error = %err, "Could not open status stream");
            let _ = sender.send(ChannelMessage {
                job_id,
                event: classify_failure(&err),
            });
            return;
        }
    };

    while let Some(item) = stream.next().await {
        let event = match item {
            Ok(status) => classify(status),
            Err(err) => classify_failure(&err),
        };
        let last = event.is_final();
        if sender
            .send(ChannelMessage {
                job_id: job_id.clone(),
                event,
            })
            .is_err()
            || last
        {
            return;
        }
    }

    let _ = sender.send(ChannelMessage {
        job_id,
        event: StageEvent::Close,
    });
}
