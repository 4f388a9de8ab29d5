//! # Mutation Lanes
//!
//! Serializes work per key. Each key gets its own lane: a spawned task draining an
//! unbounded queue of futures one at a time. Work for different keys runs concurrently;
//! work for the same key never overlaps, and runs in submission order.
//!
//! A lane retires itself as soon as its queue is empty, so only keys with work in flight
//! hold a task.
//!
//! This is the actor pattern again, with the "state" being the right to touch one
//! entity: whoever holds the lane's turn may snapshot, write optimistically, dispatch and
//! reconcile without another mutation of the same id interleaving.

use crate::error::SyncError;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

struct Lane {
    number: u64,
    sender: mpsc::UnboundedSender<Job>,
}

struct Registry<K> {
    lanes: HashMap<K, Lane>,
    opened: u64,
}

pub struct MutationLanes<K> {
    registry: Arc<Mutex<Registry<K>>>,
}

impl<K> Clone for MutationLanes<K> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<K> Default for MutationLanes<K> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                lanes: HashMap::new(),
                opened: 0,
            })),
        }
    }
}

fn lock<K>(registry: &Mutex<Registry<K>>) -> MutexGuard<'_, Registry<K>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<K> MutationLanes<K>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a job on the key's lane, opening one if needed. Sending happens under the
    /// registry lock, the same lock a draining lane takes before it retires.
    fn submit(&self, key: &K, job: Job) -> Result<(), SyncError> {
        let mut registry = lock(&self.registry);
        if let Some(lane) = registry.lanes.get(key) {
            return match lane.sender.send(job) {
                Ok(()) => Ok(()),
                Err(_) => Err(SyncError::Other(format!("mutation lane for {key} is closed"))),
            };
        }

        let number = registry.opened;
        registry.opened += 1;
        let (sender, receiver) = mpsc::unbounded_channel::<Job>();
        sender
            .send(job)
            .map_err(|_| SyncError::Other(format!("mutation lane for {key} is closed")))?;
        registry.lanes.insert(key.clone(), Lane { number, sender });
        tokio::spawn(drain(self.registry.clone(), key.clone(), number, receiver));
        Ok(())
    }

    /// Runs `work` on the key's lane once everything queued before it has finished.
    pub async fn run<F, R>(&self, key: K, work: F) -> Result<R, SyncError>
    where
        F: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        let (done, result) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let _ = done.send(work.await);
        });
        self.submit(&key, job)?;
        result
            .await
            .map_err(|_| SyncError::Other(format!("mutation lane for {key} dropped its job")))
    }

    /// Detaches the key's lane. Jobs already queued still run; later work opens a new lane.
    pub fn close(&self, key: &K) {
        lock(&self.registry).lanes.remove(key);
    }

    /// Detaches every lane.
    pub fn shutdown(&self) {
        lock(&self.registry).lanes.clear();
    }

    pub fn open_lanes(&self) -> usize {
        lock(&self.registry).lanes.len()
    }
}

/// Runs a lane's jobs in order and retires the lane once its queue is empty.
async fn drain<K>(
    registry: Arc<Mutex<Registry<K>>>,
    key: K,
    number: u64,
    mut receiver: mpsc::UnboundedReceiver<Job>,
) where
    K: Eq + Hash + Display,
{
    debug!(lane = %key, "Lane opened");
    loop {
        let job = match receiver.try_recv() {
            Ok(job) => job,
            Err(_) => {
                let mut registry = lock(&registry);
                match receiver.try_recv() {
                    Ok(job) => job,
                    Err(_) => {
                        if registry
                            .lanes
                            .get(&key)
                            .is_some_and(|lane| lane.number == number)
                        {
                            registry.lanes.remove(&key);
                        }
                        break;
                    }
                }
            }
        };
        job.await;
    }
    debug!(lane = %key, "Lane retired");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn test_same_key_runs_in_order() {
        let lanes = MutationLanes::<String>::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let slow = {
            let log = log.clone();
            lanes.run("a".to_string(), async move {
                sleep(Duration::from_millis(100)).await;
                log.lock().unwrap().push("slow");
            })
        };
        let fast = {
            let log = log.clone();
            lanes.run("a".to_string(), async move {
                log.lock().unwrap().push("fast");
            })
        };
        let (first, second) = tokio::join!(slow, fast);
        first.unwrap();
        second.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["slow", "fast"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_keys_run_concurrently() {
        let lanes = MutationLanes::<String>::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let slow = {
            let log = log.clone();
            lanes.run("a".to_string(), async move {
                sleep(Duration::from_millis(100)).await;
                log.lock().unwrap().push("a");
            })
        };
        let fast = {
            let log = log.clone();
            lanes.run("b".to_string(), async move {
                log.lock().unwrap().push("b");
            })
        };
        let (first, second) = tokio::join!(slow, fast);
        first.unwrap();
        second.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["b", "a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drained_lanes_retire() {
        let lanes = MutationLanes::<String>::new();
        let busy = tokio::spawn({
            let lanes = lanes.clone();
            async move {
                lanes
                    .run("a".to_string(), async {
                        sleep(Duration::from_millis(100)).await;
                    })
                    .await
            }
        });
        lanes.run("b".to_string(), async {}).await.unwrap();

        sleep(Duration::from_millis(10)).await;
        // "b" drained, "a" is still working.
        assert_eq!(lanes.open_lanes(), 1);

        busy.await.unwrap().unwrap();
        sleep(Duration::from_millis(1)).await;
        assert_eq!(lanes.open_lanes(), 0);

        // A retired key opens a fresh lane on demand.
        assert_eq!(lanes.run("a".to_string(), async { 3 }).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_returns_job_output() {
        let lanes = MutationLanes::<u32>::new();
        assert_eq!(lanes.run(1, async { 42 }).await.unwrap(), 42);
        lanes.close(&1);
        assert_eq!(lanes.open_lanes(), 0);
        assert_eq!(lanes.run(1, async { 7 }).await.unwrap(), 7);
    }
}
