//! Lifecycle notification fan-out
//!
//! Each subscriber gets its own bounded queue and delivery thread, so a slow
//! callback only ever delays itself. What happens when a queue is full is
//! the hub's [`Backpressure`] policy.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::diagnostics::Diagnostics;
use crate::models::{MonitorError, ProcessEvent};

/// Full-queue policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum Backpressure {
    /// Discard the oldest queued notification to make room
    DropOldest,
    /// Wait up to `timeout_ms` for room, then discard the new notification
    BlockWithTimeout { timeout_ms: u64 },
}

impl Default for Backpressure {
    fn default() -> Self {
        Backpressure::DropOldest
    }
}

#[derive(Default)]
struct Queue {
    events: VecDeque<ProcessEvent>,
    /// No more events will arrive; drain then stop
    closed: bool,
    /// Stop now, discarding anything queued
    cancelled: bool,
}

struct Channel {
    queue: Mutex<Queue>,
    ready: Condvar,
    space: Condvar,
    capacity: usize,
    policy: Backpressure,
}

impl Channel {
    fn new(capacity: usize, policy: Backpressure) -> Self {
        Self {
            queue: Mutex::new(Queue::default()),
            ready: Condvar::new(),
            space: Condvar::new(),
            capacity: capacity.max(1),
            policy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue `event`; returns the number of notifications dropped
    fn push(&self, event: ProcessEvent) -> u64 {
        let mut queue = self.lock();
        if queue.cancelled || queue.closed {
            return 0;
        }
        let mut dropped = 0;
        if queue.events.len() >= self.capacity {
            match self.policy {
                Backpressure::DropOldest => {
                    queue.events.pop_front();
                    dropped = 1;
                }
                Backpressure::BlockWithTimeout { timeout_ms } => {
                    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
                    while queue.events.len() >= self.capacity && !queue.cancelled {
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        if remaining.is_zero() {
                            break;
                        }
                        queue = self
                            .space
                            .wait_timeout(queue, remaining)
                            .unwrap_or_else(PoisonError::into_inner)
                            .0;
                    }
                    if queue.cancelled {
                        return 0;
                    }
                    if queue.events.len() >= self.capacity {
                        return 1;
                    }
                }
            }
        }
        queue.events.push_back(event);
        self.ready.notify_one();
        dropped
    }

    /// Next event, or None once cancelled or closed and drained
    fn pop(&self) -> Option<ProcessEvent> {
        let mut queue = self.lock();
        loop {
            if queue.cancelled {
                return None;
            }
            if let Some(event) = queue.events.pop_front() {
                self.space.notify_one();
                return Some(event);
            }
            if queue.closed {
                return None;
            }
            queue = self.ready.wait(queue).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    fn cancel(&self) {
        let mut queue = self.lock();
        queue.cancelled = true;
        queue.events.clear();
        drop(queue);
        self.ready.notify_all();
        self.space.notify_all();
    }

    fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }
}

/// Handle on one subscriber. Dropping it cancels delivery.
pub struct Subscription {
    id: Uuid,
    channel: Arc<Channel>,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Stop delivery now; queued notifications are discarded
    pub fn cancel(mut self) {
        self.channel.cancel();
        self.join_thread();
    }

    /// Wait for the delivery thread to finish. It finishes once the hub is
    /// closed and the queue has drained, or on cancellation.
    pub fn join(mut self) {
        self.join_thread();
    }

    fn join_thread(&mut self) {
        if let Some(handle) = self.handle.take() {
            // a callback may own its own subscription
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!("Delivery thread for subscriber {} panicked", self.id);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.channel.cancel();
            self.join_thread();
        }
    }
}

pub struct DispatchHub {
    subscribers: Mutex<Vec<(Uuid, Arc<Channel>)>>,
    capacity: usize,
    policy: Backpressure,
    diagnostics: Arc<Diagnostics>,
    closed: AtomicBool,
}

impl DispatchHub {
    pub fn new(capacity: usize, policy: Backpressure, diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity,
            policy,
            diagnostics,
            closed: AtomicBool::new(false),
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<(Uuid, Arc<Channel>)>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `callback`; it runs on a dedicated thread, once per
    /// notification, in publish order.
    pub fn subscribe<F>(&self, mut callback: F) -> Result<Subscription, MonitorError>
    where
        F: FnMut(ProcessEvent) + Send + 'static,
    {
        let id = Uuid::new_v4();
        let channel = Arc::new(Channel::new(self.capacity, self.policy));
        {
            // registration and close() serialize on the subscriber list
            let mut subscribers = self.subscribers();
            if self.closed.load(Ordering::Acquire) {
                channel.close();
            } else {
                subscribers.push((id, channel.clone()));
            }
        }

        let worker = channel.clone();
        let handle = thread::Builder::new()
            .name(format!("procinfo-dispatch-{}", &id.simple().to_string()[..8]))
            .spawn(move || {
                while let Some(event) = worker.pop() {
                    if panic::catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                        error!("Subscriber {} callback panicked", id);
                    }
                }
                debug!("Subscriber {} delivery finished", id);
            })
            .map_err(|source| {
                self.subscribers().retain(|(registered, _)| *registered != id);
                MonitorError::Spawn {
                    name: "dispatch",
                    source,
                }
            })?;

        debug!("Subscriber {} registered", id);
        Ok(Subscription {
            id,
            channel,
            handle: Some(handle),
        })
    }

    /// Deliver `event` to every live subscriber
    pub fn publish(&self, event: &ProcessEvent) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let channels: Vec<Arc<Channel>> = {
            let mut subscribers = self.subscribers();
            subscribers.retain(|(_, channel)| !channel.is_cancelled());
            subscribers.iter().map(|(_, channel)| channel.clone()).collect()
        };
        for channel in channels {
            let dropped = channel.push(event.clone());
            if dropped > 0 {
                self.diagnostics.add_dropped_notifications(dropped);
            }
        }
    }

    /// Stop accepting notifications; delivery threads drain and exit
    pub fn close(&self) {
        let mut subscribers = self.subscribers();
        self.closed.store(true, Ordering::Release);
        for (_, channel) in subscribers.drain(..) {
            channel.close();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers();
        subscribers.retain(|(_, channel)| !channel.is_cancelled());
        subscribers.len()
    }
}

impl Drop for DispatchHub {
    fn drop(&mut self) {
        self.close();
    }
}
