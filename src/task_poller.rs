//! The async task poller: long-polls an external workflow queue in a
//! dedicated worker thread and delivers wrapped tasks non-blockingly.
//!
//! The concrete queue backend's wire protocol is out of scope for this
//! crate; `QueueClient` is the seam a real backend would plug into.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use serde_json::Value;

use crate::error::UnknownRegion;

/// A handful of region names a real backend would recognize, standing in
/// for a real region table without pulling in a concrete cloud SDK.
const KNOWN_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "eu-central-1",
];

/// Resolve a region name, failing fast if it is not recognized.
fn resolve_region(region_name: &str) -> Result<(), UnknownRegion> {
    if KNOWN_REGIONS.contains(&region_name) {
        Ok(())
    } else {
        Err(UnknownRegion(region_name.to_string()))
    }
}

/// An activity returned by a long-poll, already filtered to ones that
/// actually carry work.
#[derive(Debug, Clone)]
pub struct RawActivity {
    pub activity_id: String,
    pub task_token: String,
    /// Raw JSON text of the task's `input` field.
    pub input: String,
}

/// Errors a `QueueClient` may return from poll/ack operations. `Transient`
/// is for hiccups a caller may want to retry past; `Permanent` is not.
#[derive(Debug)]
pub enum QueueError {
    Transient(String),
    Permanent(String),
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::Transient(msg) => write!(f, "transient queue error: {msg}"),
            QueueError::Permanent(msg) => write!(f, "queue error: {msg}"),
        }
    }
}

impl std::error::Error for QueueError {}

/// Abstraction over the external workflow-activity queue. A real
/// implementation would talk to whatever backs the queue in production;
/// none ships in this crate.
pub trait QueueClient: Send + Sync {
    /// Register the activity type. Idempotent: a pre-existing registration
    /// is not an error.
    fn register(&self) -> Result<(), QueueError>;

    /// Long-poll for the next activity. Blocks for the duration of one
    /// poll; returns `None` on an empty long-poll response.
    fn poll(&self) -> Result<Option<RawActivity>, QueueError>;

    fn complete(&self, task_token: &str, result: Option<&str>) -> Result<(), QueueError>;

    fn fail(&self, task_token: &str, details: Option<&str>) -> Result<(), QueueError>;
}

/// A queue client that never produces a task. Used when `--noworker` is
/// set, and as a test double for callers that don't need real delivery.
pub struct NullQueueClient;

impl QueueClient for NullQueueClient {
    fn register(&self) -> Result<(), QueueError> {
        Ok(())
    }

    fn poll(&self) -> Result<Option<RawActivity>, QueueError> {
        // A real long-poll blocks for many seconds; sleep briefly so a
        // poller built on this client doesn't spin.
        std::thread::sleep(std::time::Duration::from_millis(50));
        Ok(None)
    }

    fn complete(&self, _task_token: &str, _result: Option<&str>) -> Result<(), QueueError> {
        Ok(())
    }

    fn fail(&self, _task_token: &str, _details: Option<&str>) -> Result<(), QueueError> {
        Ok(())
    }
}

/// A unit of work pulled from the queue, with acknowledgement handles
/// bound to its token by value.
pub struct Task {
    pub params: Value,
    token: String,
    client: Arc<dyn QueueClient>,
}

impl Task {
    fn new(token: String, params: Value, client: Arc<dyn QueueClient>) -> Self {
        Task {
            params,
            token,
            client,
        }
    }

    /// Acknowledge success.
    pub fn complete(&self, result: Option<&str>) -> Result<(), QueueError> {
        self.client.complete(&self.token, result)
    }

    /// Acknowledge failure.
    pub fn fail(&self, details: Option<&str>) -> Result<(), QueueError> {
        self.client.fail(&self.token, details)
    }
}

/// Handle returned by `TaskPoller::start`: `get` pulls a task
/// non-blockingly, `stop` asks the worker to exit after its current
/// long-poll returns.
pub struct PollHandle {
    receiver: mpsc::Receiver<Task>,
    stop_flag: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Non-blocking: returns a task or `None`.
    pub fn get(&self) -> Option<Task> {
        self.receiver.try_recv().ok()
    }

    /// Signal the worker to exit after its current long-poll returns. Does
    /// not cancel an in-flight poll.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }
}

/// Wraps an external workflow-activity worker.
pub struct TaskPoller {
    client: Arc<dyn QueueClient>,
}

impl TaskPoller {
    /// Construct a poller for `region_name`/`domain`, registering the
    /// activity type immediately. Region resolution failure is fatal here.
    pub fn new(region_name: &str, client: Arc<dyn QueueClient>) -> Result<Self, UnknownRegion> {
        resolve_region(region_name)?;
        // Registration conflicts (activity type already exists) are
        // ignored by the client implementation, not surfaced here.
        let _ = client.register();
        Ok(TaskPoller { client })
    }

    /// Start the long-poll worker thread and return a handle to pull tasks
    /// from non-blockingly.
    pub fn start_async_polling(&self) -> PollHandle {
        let (sender, receiver) = mpsc::channel();
        let stop_flag = Arc::new(AtomicBool::new(false));
        let client = Arc::clone(&self.client);
        let worker_stop = Arc::clone(&stop_flag);

        let worker = std::thread::spawn(move || loop {
            if worker_stop.load(Ordering::Relaxed) {
                break;
            }
            match client.poll() {
                Ok(Some(activity)) => {
                    let params: Value =
                        serde_json::from_str(&activity.input).unwrap_or(Value::Null);
                    let task = Task::new(activity.task_token, params, Arc::clone(&client));
                    if sender.send(task).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(_) => {
                    // A single poll hiccup doesn't kill the worker; keep
                    // looping and let the next poll attempt recover.
                }
            }
        });

        PollHandle {
            receiver,
            stop_flag,
            worker: Some(worker),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn unknown_region_is_fatal_at_construction() {
        let err = TaskPoller::new("mars-north-1", Arc::new(NullQueueClient));
        assert!(err.is_err());
    }

    #[test]
    fn known_region_constructs() {
        let poller = TaskPoller::new("us-west-2", Arc::new(NullQueueClient));
        assert!(poller.is_ok());
    }

    /// A client that returns one task then goes quiet, to test delivery
    /// end to end.
    struct OneShotClient {
        delivered: Mutex<bool>,
    }

    impl QueueClient for OneShotClient {
        fn register(&self) -> Result<(), QueueError> {
            Ok(())
        }

        fn poll(&self) -> Result<Option<RawActivity>, QueueError> {
            let mut delivered = self.delivered.lock().unwrap();
            if *delivered {
                std::thread::sleep(std::time::Duration::from_millis(20));
                return Ok(None);
            }
            *delivered = true;
            Ok(Some(RawActivity {
                activity_id: "a1".to_string(),
                task_token: "tok-1".to_string(),
                input: r#"{"classname": "htmlrenderer"}"#.to_string(),
            }))
        }

        fn complete(&self, _task_token: &str, _result: Option<&str>) -> Result<(), QueueError> {
            Ok(())
        }

        fn fail(&self, _task_token: &str, _details: Option<&str>) -> Result<(), QueueError> {
            Ok(())
        }
    }

    #[test]
    fn delivers_wrapped_task_with_decoded_params() {
        let poller = TaskPoller::new(
            "us-west-2",
            Arc::new(OneShotClient {
                delivered: Mutex::new(false),
            }),
        )
        .unwrap();
        let mut handle = poller.start_async_polling();

        let mut task = None;
        for _ in 0..100 {
            if let Some(t) = handle.get() {
                task = Some(t);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        let task = task.expect("task delivered within timeout");
        assert_eq!(task.params["classname"], "htmlrenderer");
        assert!(task.complete(Some("123")).is_ok());
        handle.stop();
    }

    #[test]
    fn get_is_non_blocking_when_empty() {
        let poller = TaskPoller::new("us-west-2", Arc::new(NullQueueClient)).unwrap();
        let mut handle = poller.start_async_polling();
        let start = std::time::Instant::now();
        assert!(handle.get().is_none());
        assert!(start.elapsed() < std::time::Duration::from_millis(50));
        handle.stop();
    }
}
