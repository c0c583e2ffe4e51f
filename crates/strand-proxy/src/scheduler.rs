//! Fair delivery of proxy notifications to observers.
//!
//! Notifications are queued per (proxy, particle, handle). A single dispatch
//! task drains one queue at a time, in the order the queues were first
//! created, and yields to the runtime between queues so that a busy observer
//! cannot starve the rest of the task set. Observer failures are logged and
//! never propagate.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::observer::{Notification, Observer};
use crate::{HandleId, ParticleId, ProxyId};

pub struct NotificationScheduler<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for NotificationScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<T> {
    state: Mutex<State<T>>,
    idle: watch::Sender<bool>,
}

struct State<T> {
    queues: Vec<Queue<T>>,
    dispatching: bool,
}

struct Queue<T> {
    proxy: ProxyId,
    particle: ParticleId,
    handle: HandleId,
    observer: Arc<dyn Observer<T>>,
    pending: VecDeque<Notification<T>>,
}

impl<T> Queue<T> {
    fn is_for(&self, notification: &Notification<T>) -> bool {
        self.proxy == notification.proxy
            && self.particle == notification.particle
            && self.handle == notification.handle
    }

    fn deliver(self) {
        for notification in self.pending {
            let kind = notification.kind.name();
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| self.observer.notify(notification)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    metrics::counter!("strand_observer_failures_total", "cause" => "error")
                        .increment(1);
                    tracing::error!(
                        proxy = %self.proxy,
                        particle = %self.particle,
                        handle = %self.handle,
                        kind,
                        error = %err,
                        "observer failed"
                    );
                }
                Err(payload) => {
                    metrics::counter!("strand_observer_failures_total", "cause" => "panic")
                        .increment(1);
                    tracing::error!(
                        proxy = %self.proxy,
                        particle = %self.particle,
                        handle = %self.handle,
                        kind,
                        panic = panic_message(payload.as_ref()),
                        "observer panicked"
                    );
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

impl<T> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn dispatch(self: Arc<Self>) {
        loop {
            let next = {
                let mut state = self.lock();
                if state.queues.is_empty() {
                    state.dispatching = false;
                    self.idle.send_replace(true);
                    return;
                }
                state.queues.remove(0)
            };
            next.deliver();
            tokio::task::yield_now().await;
        }
    }
}

impl<T: Send + 'static> Default for NotificationScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> NotificationScheduler<T> {
    pub fn new() -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queues: Vec::new(),
                    dispatching: false,
                }),
                idle,
            }),
        }
    }

    /// Queue `notification` for `observer` and make sure a dispatch task is
    /// running. Must be called from within a tokio runtime.
    pub fn enqueue(&self, observer: &Arc<dyn Observer<T>>, notification: Notification<T>) {
        tracing::trace!(
            proxy = %notification.proxy,
            particle = %notification.particle,
            handle = %notification.handle,
            kind = notification.kind.name(),
            "enqueue notification"
        );

        let mut state = self.inner.lock();
        match state.queues.iter().position(|queue| queue.is_for(&notification)) {
            Some(index) => state.queues[index].pending.push_back(notification),
            None => state.queues.push(Queue {
                proxy: notification.proxy,
                particle: notification.particle.clone(),
                handle: notification.handle.clone(),
                observer: observer.clone(),
                pending: VecDeque::from([notification]),
            }),
        }

        if !state.dispatching {
            state.dispatching = true;
            self.inner.idle.send_replace(false);
            drop(state);
            n0_future::task::spawn(self.inner.clone().dispatch());
        }
    }

    /// True when nothing is queued or being delivered.
    pub fn is_idle(&self) -> bool {
        *self.inner.idle.borrow()
    }

    /// Wait until every notification queued so far has been delivered.
    pub async fn idle(&self) {
        let mut idle = self.inner.idle.subscribe();
        let _ = idle.wait_for(|idle| *idle).await;
    }
}
