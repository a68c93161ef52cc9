//! Recompute and notification threads.
//!
//! Views that fall behind their table are queued on a recompute channel and
//! caught up by a pool of worker threads. Caught-up views hand their
//! `ViewUpdate`s to a single notifier thread, which delivers them to
//! subscribers, optionally batched per `notify_interval`. A panicking
//! callback is logged and never reaches the table or view that triggered it.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use vista_core::{Error, Result};

use crate::subscription::SubscriptionManager;
use crate::update::{ViewId, ViewUpdate};

/// Something a worker can bring up to date.
pub trait Recompute: Send + Sync {
    fn recompute(&self);
}

/// Dispatcher settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Recompute worker threads. With zero workers views only advance on
    /// an explicit flush.
    pub workers: usize,
    /// Window over which notifications for the same view are merged; `None`
    /// delivers each batch as soon as it is applied.
    pub notify_interval: Option<Duration>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            notify_interval: None,
        }
    }
}

impl DispatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn notify_interval(mut self, interval: Option<Duration>) -> Self {
        self.notify_interval = interval;
        self
    }
}

/// A pending delivery: an update and the subscribers of its view.
pub struct Notice {
    pub update: ViewUpdate,
    pub subscribers: Arc<Mutex<SubscriptionManager>>,
}

impl Notice {
    #[inline]
    fn view_id(&self) -> ViewId {
        self.update.view_id
    }

    fn deliver(self) {
        let targets = self.subscribers.lock().targets();
        for sub in targets {
            let outcome = catch_unwind(AssertUnwindSafe(|| sub.notify(&self.update)));
            if let Err(payload) = outcome {
                log::error!(
                    "observer {} of view {} panicked: {}",
                    sub.id(),
                    self.update.view_id,
                    panic_message(&*payload)
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

enum Job {
    Recompute(Weak<dyn Recompute>),
    Stop,
}

enum Message {
    Notice(Notice),
    Stop,
}

/// Owns the recompute workers and the notifier thread.
pub struct Dispatcher {
    config: DispatcherConfig,
    jobs: Sender<Job>,
    notices: Sender<Message>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl Dispatcher {
    /// Spawns the worker and notifier threads.
    pub fn new(config: DispatcherConfig) -> Result<Self> {
        let (jobs, job_rx) = unbounded::<Job>();
        let (notices, notice_rx) = unbounded::<Message>();
        let mut threads = Vec::with_capacity(config.workers + 1);

        for i in 0..config.workers {
            let rx = job_rx.clone();
            let handle = thread::Builder::new()
                .name(format!("vista-recompute-{i}"))
                .spawn(move || run_worker(rx))
                .map_err(|e| Error::config(format!("failed to spawn recompute worker: {e}")))?;
            threads.push(handle);
        }

        let interval = config.notify_interval;
        let handle = thread::Builder::new()
            .name("vista-notify".into())
            .spawn(move || run_notifier(notice_rx, interval))
            .map_err(|e| Error::config(format!("failed to spawn notifier: {e}")))?;
        threads.push(handle);

        log::debug!(
            "dispatcher started: {} workers, notify interval {:?}",
            config.workers,
            config.notify_interval
        );
        Ok(Self {
            config,
            jobs,
            notices,
            threads: Mutex::new(threads),
            running: AtomicBool::new(true),
        })
    }

    #[inline]
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Queues `target` for a catch-up. Never blocks; a no-op once shut down
    /// or when there are no workers.
    pub fn schedule(&self, target: Weak<dyn Recompute>) {
        if self.config.workers == 0 || !self.is_running() {
            return;
        }
        let _ = self.jobs.send(Job::Recompute(target));
    }

    /// Queues a notice for delivery. After shutdown it is delivered on the
    /// calling thread.
    pub fn notify(&self, notice: Notice) {
        if !self.is_running() {
            notice.deliver();
            return;
        }
        if let Err(err) = self.notices.send(Message::Notice(notice)) {
            if let Message::Notice(notice) = err.into_inner() {
                notice.deliver();
            }
        }
    }

    /// Stops the threads after they drain what is already queued. Idempotent.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        for _ in 0..self.config.workers {
            let _ = self.jobs.send(Job::Stop);
        }
        let mut handles: Vec<JoinHandle<()>> = self.threads.lock().drain(..).collect();
        let notifier = handles.pop();
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() != current && handle.join().is_err() {
                log::error!("recompute worker exited by panic");
            }
        }
        // Workers are done, so no more notices are coming.
        let _ = self.notices.send(Message::Stop);
        if let Some(handle) = notifier {
            if handle.thread().id() != current && handle.join().is_err() {
                log::error!("notifier exited by panic");
            }
        }
        log::debug!("dispatcher stopped");
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(rx: Receiver<Job>) {
    for job in rx.iter() {
        match job {
            Job::Recompute(target) => {
                let Some(target) = target.upgrade() else {
                    continue;
                };
                if catch_unwind(AssertUnwindSafe(|| target.recompute())).is_err() {
                    log::error!("view recompute panicked");
                }
            }
            Job::Stop => break,
        }
    }
}

fn run_notifier(rx: Receiver<Message>, interval: Option<Duration>) {
    let Some(interval) = interval else {
        for message in rx.iter() {
            match message {
                Message::Notice(notice) => notice.deliver(),
                Message::Stop => break,
            }
        }
        return;
    };

    // Pending notices merged per view, in order of first arrival.
    let mut pending: Vec<Notice> = Vec::new();
    let mut deadline = Instant::now() + interval;
    loop {
        let received = if pending.is_empty() {
            rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
        } else {
            rx.recv_deadline(deadline)
        };
        match received {
            Ok(Message::Notice(notice)) => {
                if pending.is_empty() {
                    deadline = Instant::now() + interval;
                }
                match pending.iter_mut().find(|p| p.view_id() == notice.view_id()) {
                    Some(existing) => existing.update.merge(notice.update),
                    None => pending.push(notice),
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                for notice in pending.drain(..) {
                    notice.deliver();
                }
            }
            Ok(Message::Stop) | Err(RecvTimeoutError::Disconnected) => {
                for notice in pending.drain(..) {
                    notice.deliver();
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counter(AtomicUsize);

    impl Recompute for Counter {
        fn recompute(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn notice(view_id: ViewId, seq: u64, subscribers: &Arc<Mutex<SubscriptionManager>>) -> Notice {
        Notice {
            update: ViewUpdate {
                view_id,
                first_seq: seq,
                last_seq: seq,
                changes: Vec::new(),
            },
            subscribers: Arc::clone(subscribers),
        }
    }

    #[test]
    fn test_workers_run_scheduled_targets() {
        let dispatcher = Dispatcher::new(DispatcherConfig::new().workers(2)).unwrap();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let weak: Weak<dyn Recompute> = Arc::downgrade(&counter) as Weak<dyn Recompute>;
        for _ in 0..10 {
            dispatcher.schedule(weak.clone());
        }
        dispatcher.shutdown();
        assert_eq!(counter.0.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_dropped_target_is_skipped() {
        let dispatcher = Dispatcher::new(DispatcherConfig::new().workers(1)).unwrap();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let weak: Weak<dyn Recompute> = Arc::downgrade(&counter) as Weak<dyn Recompute>;
        drop(counter);
        dispatcher.schedule(weak);
        dispatcher.shutdown();
    }

    #[test]
    fn test_panicking_observer_is_isolated() {
        let dispatcher = Dispatcher::new(DispatcherConfig::new().workers(0)).unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let subscribers = Arc::new(Mutex::new(SubscriptionManager::new()));
        subscribers.lock().subscribe(|_| panic!("observer failure"));
        let s = seen.clone();
        subscribers.lock().subscribe(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.notify(notice(1, 1, &subscribers));
        dispatcher.notify(notice(1, 2, &subscribers));
        dispatcher.shutdown();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_interval_merges_per_view() {
        let dispatcher = Dispatcher::new(
            DispatcherConfig::new()
                .workers(0)
                .notify_interval(Some(Duration::from_secs(5))),
        )
        .unwrap();
        let deliveries = Arc::new(Mutex::new(Vec::new()));
        let subscribers = Arc::new(Mutex::new(SubscriptionManager::new()));
        let d = deliveries.clone();
        subscribers.lock().subscribe(move |update: &ViewUpdate| {
            d.lock().push((update.first_seq, update.last_seq));
        });

        for seq in 1..=3 {
            dispatcher.notify(notice(1, seq, &subscribers));
        }
        dispatcher.shutdown();
        assert_eq!(*deliveries.lock(), vec![(1, 3)]);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default()).unwrap();
        dispatcher.shutdown();
        dispatcher.shutdown();
        assert!(!dispatcher.is_running());
    }
}
