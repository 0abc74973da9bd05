//! Background notification context.
//!
//! Mirrors the split between a foreground app and a background execution
//! context: the worker holds its own id → timer map, fires alerts
//! independently of the foreground scheduler, and reports user interaction
//! back as a `Confirm` hint. Everything here is best-effort; the
//! reconciliation loop never depends on it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Local;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use catchup_core::{Component, Notifier, WorkerMessage};

pub struct NotificationWorker {
    notifier: Arc<dyn Notifier>,
    confirm_tx: mpsc::Sender<WorkerMessage>,
    timers: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl NotificationWorker {
    /// `confirm_tx` carries `Confirm` hints back to the foreground loop.
    pub fn new(notifier: Arc<dyn Notifier>, confirm_tx: mpsc::Sender<WorkerMessage>) -> Self {
        Self {
            notifier,
            confirm_tx,
            timers: Mutex::new(HashMap::new()),
        }
    }

    fn schedule_alert(&self, id: Uuid, title: String, body: String, fire_at_ms: i64) {
        self.cancel_alert(id);

        let delay_ms = fire_at_ms - Local::now().timestamp_millis();
        let delay = Duration::from_millis(delay_ms.max(0) as u64);
        let notifier = self.notifier.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = notifier.notify(&title, &body, &id.to_string()) {
                warn!(person_id = %id, error = %e, "Worker failed to show alert");
            }
        });
        self.timers.lock().unwrap().insert(id, handle);
        debug!(person_id = %id, fire_at_ms, "Worker alert scheduled");
    }

    fn cancel_alert(&self, id: Uuid) {
        if let Some(handle) = self.timers.lock().unwrap().remove(&id) {
            handle.abort();
            debug!(person_id = %id, "Worker alert cancelled");
        }
    }

    /// Report user interaction with a fired alert. At-most-once hint; a
    /// full or closed channel is dropped silently.
    pub async fn confirm(&self, id: Uuid) {
        if self
            .confirm_tx
            .send(WorkerMessage::Confirm { id })
            .await
            .is_err()
        {
            debug!(person_id = %id, "Confirm channel closed, dropping hint");
        }
    }
}

#[async_trait]
impl Component for NotificationWorker {
    fn name(&self) -> &str {
        "notification-worker"
    }

    async fn start(&self, mut rx: mpsc::Receiver<WorkerMessage>) -> Result<()> {
        info!("Notification worker started");
        while let Some(msg) = rx.recv().await {
            match msg {
                WorkerMessage::Schedule {
                    id,
                    title,
                    body,
                    fire_at_ms,
                } => self.schedule_alert(id, title, body, fire_at_ms),
                WorkerMessage::Cancel { id } => self.cancel_alert(id),
                WorkerMessage::Confirm { id } => {
                    debug!(person_id = %id, "Worker ignoring confirm addressed to foreground");
                }
            }
        }
        info!("Worker channel closed, cancelling pending alerts");
        let mut timers = self.timers.lock().unwrap();
        for (_, handle) in timers.drain() {
            handle.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingNotifier {
        count: Mutex<usize>,
    }

    impl Notifier for CountingNotifier {
        fn notify(&self, _title: &str, _body: &str, _tag: &str) -> anyhow::Result<()> {
            *self.count.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn build() -> (Arc<NotificationWorker>, Arc<CountingNotifier>, mpsc::Receiver<WorkerMessage>) {
        let notifier = Arc::new(CountingNotifier {
            count: Mutex::new(0),
        });
        let (confirm_tx, confirm_rx) = mpsc::channel(8);
        let worker = Arc::new(NotificationWorker::new(notifier.clone(), confirm_tx));
        (worker, notifier, confirm_rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_fires_alert() {
        let (worker, notifier, _confirm_rx) = build();
        worker.schedule_alert(
            Uuid::new_v4(),
            "t".into(),
            "b".into(),
            Local::now().timestamp_millis() + 100,
        );
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*notifier.count.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_suppresses_alert() {
        let (worker, notifier, _confirm_rx) = build();
        let id = Uuid::new_v4();
        worker.schedule_alert(id, "t".into(), "b".into(), Local::now().timestamp_millis() + 100);
        worker.cancel_alert(id);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*notifier.count.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_pending_alert() {
        let (worker, notifier, _confirm_rx) = build();
        let id = Uuid::new_v4();
        let now = Local::now().timestamp_millis();
        worker.schedule_alert(id, "t".into(), "b".into(), now + 50);
        worker.schedule_alert(id, "t".into(), "b".into(), now + 150);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*notifier.count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_confirm_reaches_foreground() {
        let (worker, _notifier, mut confirm_rx) = build();
        let id = Uuid::new_v4();
        worker.confirm(id).await;
        match confirm_rx.recv().await {
            Some(WorkerMessage::Confirm { id: got }) => assert_eq!(got, id),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_start_consumes_messages() {
        let (worker, notifier, _confirm_rx) = build();
        let (tx, rx) = mpsc::channel(8);
        let handle = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.start(rx).await })
        };

        tx.send(WorkerMessage::Schedule {
            id: Uuid::new_v4(),
            title: "t".into(),
            body: "b".into(),
            // Already due: fires immediately.
            fire_at_ms: Local::now().timestamp_millis() - 1,
        })
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*notifier.count.lock().unwrap(), 1);

        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
