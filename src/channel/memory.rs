//! In-process channel backend.
//!
//! Queues, topics and subscriptions live in a mutex-protected map. Published
//! messages are wrapped in the same notification document SNS produces, so
//! the decoder sees exactly what it would see in production. Receive never
//! blocks: a long-poll wait is ignored.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::types::{MessageId, ReceiptHandle};

use super::{
    ChannelBackend, ChannelError, EVENT_ATTRIBUTE, Envelope, QueueHandle, ReceiveRequest, Result,
    TopicHandle,
};

/// Builds the notification document SNS delivers to a subscribed queue.
pub fn sns_notification(topic_arn: &str, message_id: &str, event_type: &str, message: &str) -> String {
    json!({
        "Type": "Notification",
        "MessageId": message_id,
        "TopicArn": topic_arn,
        "Message": message,
        "MessageAttributes": {
            EVENT_ATTRIBUTE: {"Type": "String", "Value": event_type}
        }
    })
    .to_string()
}

#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: String,
}

#[derive(Debug)]
struct InFlight {
    receipt: String,
    message: StoredMessage,
}

#[derive(Debug)]
struct MemoryQueue {
    handle: QueueHandle,
    visible: VecDeque<StoredMessage>,
    /// Received but not yet deleted, in receive order.
    in_flight: VecDeque<InFlight>,
    deleted: usize,
}

#[derive(Debug)]
struct MemoryTopic {
    handle: TopicHandle,
    /// Subscribed queue names, in subscription order.
    subscribers: Vec<String>,
}

#[derive(Debug, Default)]
struct State {
    queues: BTreeMap<String, MemoryQueue>,
    topics: BTreeMap<String, MemoryTopic>,
    next_id: u64,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn queue_mut(&mut self, name: &str) -> Result<&mut MemoryQueue> {
        self.queues
            .get_mut(name)
            .ok_or_else(|| ChannelError::NoSuchQueue(name.to_string()))
    }
}

/// A channel backend that keeps everything in memory.
///
/// Clones share state, so a test can keep one clone for assertions and hand
/// another to the code under test.
#[derive(Debug, Clone, Default)]
pub struct MemoryChannel {
    state: Arc<Mutex<State>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes `message` to a topic, tagged with `event_type`.
    ///
    /// Returns the number of queues the message was delivered to.
    pub fn publish(&self, topic: &str, event_type: &str, message: &str) -> Result<usize> {
        let mut state = self.lock();
        let (arn, subscribers) = {
            let topic = state
                .topics
                .get(topic)
                .ok_or_else(|| ChannelError::NoSuchTopic(topic.to_string()))?;
            (topic.handle.arn.clone(), topic.subscribers.clone())
        };

        for queue in &subscribers {
            let id = format!("msg-{}", state.next_id());
            let body = sns_notification(&arn, &id, event_type, message);
            state.queue_mut(queue)?.visible.push_back(StoredMessage {
                message_id: MessageId::new(id),
                body,
            });
        }
        Ok(subscribers.len())
    }

    /// Enqueues a raw body directly, bypassing any topic.
    pub fn send(&self, queue: &str, body: impl Into<String>) -> Result<MessageId> {
        let mut state = self.lock();
        let id = MessageId::new(format!("msg-{}", state.next_id()));
        state.queue_mut(queue)?.visible.push_back(StoredMessage {
            message_id: id.clone(),
            body: body.into(),
        });
        Ok(id)
    }

    /// Makes every received-but-unacknowledged message visible again, as
    /// happens when a consumer dies before deleting. They go back to the
    /// front of the queue in the order they were received.
    pub fn redeliver_unacknowledged(&self, queue: &str) -> Result<usize> {
        let mut state = self.lock();
        let queue = state.queue_mut(queue)?;
        let pending = std::mem::take(&mut queue.in_flight);
        let count = pending.len();
        for entry in pending.into_iter().rev() {
            queue.visible.push_front(entry.message);
        }
        Ok(count)
    }

    pub fn queue_count(&self) -> usize {
        self.lock().queues.len()
    }

    pub fn topic_count(&self) -> usize {
        self.lock().topics.len()
    }

    /// Number of queues subscribed to `topic` (0 if it does not exist).
    pub fn subscription_count(&self, topic: &str) -> usize {
        self.lock()
            .topics
            .get(topic)
            .map_or(0, |topic| topic.subscribers.len())
    }

    /// Messages waiting to be received.
    pub fn visible_count(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map_or(0, |q| q.visible.len())
    }

    /// Messages received but not yet deleted.
    pub fn in_flight_count(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map_or(0, |q| q.in_flight.len())
    }

    /// Messages deleted so far.
    pub fn deleted_count(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map_or(0, |q| q.deleted)
    }
}

#[async_trait]
impl ChannelBackend for MemoryChannel {
    async fn create_queue(&self, name: &str) -> Result<QueueHandle> {
        let mut state = self.lock();
        let queue = state
            .queues
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(queue = name, "Creating in-memory queue");
                MemoryQueue {
                    handle: QueueHandle {
                        name: name.to_string(),
                        url: format!("memory://queue/{}", name),
                        arn: format!("arn:memory:sqs:local:{}", name),
                    },
                    visible: VecDeque::new(),
                    in_flight: VecDeque::new(),
                    deleted: 0,
                }
            });
        Ok(queue.handle.clone())
    }

    async fn create_topic(&self, name: &str) -> Result<TopicHandle> {
        let mut state = self.lock();
        let topic = state
            .topics
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(topic = name, "Creating in-memory topic");
                MemoryTopic {
                    handle: TopicHandle {
                        name: name.to_string(),
                        arn: format!("arn:memory:sns:local:{}", name),
                    },
                    subscribers: Vec::new(),
                }
            });
        Ok(topic.handle.clone())
    }

    async fn subscribe(&self, topic: &TopicHandle, queue: &QueueHandle) -> Result<()> {
        let mut state = self.lock();
        if !state.queues.contains_key(&queue.name) {
            return Err(ChannelError::NoSuchQueue(queue.name.clone()));
        }
        let topic = state
            .topics
            .get_mut(&topic.name)
            .ok_or_else(|| ChannelError::NoSuchTopic(topic.name.clone()))?;
        if !topic.subscribers.contains(&queue.name) {
            topic.subscribers.push(queue.name.clone());
        }
        Ok(())
    }

    async fn receive(
        &self,
        queue: &QueueHandle,
        request: &ReceiveRequest,
    ) -> Result<Vec<Envelope>> {
        let mut state = self.lock();
        let limit = request.max_messages.clamp(1, super::MAX_BATCH) as usize;

        let mut batch = Vec::new();
        while batch.len() < limit {
            let Some(message) = state.queue_mut(&queue.name)?.visible.pop_front() else {
                break;
            };
            let receipt = format!("{}-receipt-{}", message.message_id, state.next_id());
            let envelope = Envelope {
                message_id: message.message_id.clone(),
                receipt: ReceiptHandle::new(receipt.clone()),
                body: message.body.clone(),
                attributes: BTreeMap::new(),
            };
            state
                .queue_mut(&queue.name)?
                .in_flight
                .push_back(InFlight { receipt, message });
            batch.push(envelope);
        }
        Ok(batch)
    }

    async fn delete(&self, queue: &QueueHandle, receipt: &ReceiptHandle) -> Result<()> {
        let mut state = self.lock();
        let queue = state.queue_mut(&queue.name)?;
        if let Some(pos) = queue
            .in_flight
            .iter()
            .position(|entry| entry.receipt == receipt.as_str())
        {
            queue.in_flight.remove(pos);
            queue.deleted += 1;
        }
        Ok(())
    }
}
