use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// One async mutex per volume. Calls for the same key run one after the
/// other; calls for different keys do not wait on each other. An entry
/// lives only while someone holds or waits for it.
#[derive(Default)]
pub struct VolumeLocks {
  locks: Arc<LockMap>,
}

impl VolumeLocks {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn lock(&self, key: &str) -> VolumeGuard {
    let mutex = self
      .locks
      .entry(key.to_owned())
      .or_default()
      .value()
      .clone();

    if mutex.try_lock().is_err() {
      debug!(%key, "waiting for in-flight operation on volume");
    }

    let guard = mutex.lock_owned().await;
    VolumeGuard {
      key: key.to_owned(),
      locks: self.locks.clone(),
      guard: Some(guard),
    }
  }

  /// Number of keys currently held or waited for.
  pub fn len(&self) -> usize {
    self.locks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.locks.is_empty()
  }
}

pub struct VolumeGuard {
  key: String,
  locks: Arc<LockMap>,
  guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for VolumeGuard {
  fn drop(&mut self) {
    drop(self.guard.take());
    // Only the map still references the mutex when nobody else waits.
    self
      .locks
      .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;
  use tokio::time::timeout;

  #[tokio::test]
  async fn same_key_waits() {
    let locks = VolumeLocks::new();
    let held = locks.lock("pv-a").await;

    assert!(timeout(Duration::from_millis(50), locks.lock("pv-a"))
      .await
      .is_err());

    drop(held);
    assert!(timeout(Duration::from_millis(50), locks.lock("pv-a"))
      .await
      .is_ok());
  }

  #[tokio::test]
  async fn different_keys_do_not_wait() {
    let locks = VolumeLocks::new();
    let _a = locks.lock("pv-a").await;

    assert!(timeout(Duration::from_millis(50), locks.lock("pv-b"))
      .await
      .is_ok());
  }

  #[tokio::test]
  async fn released_keys_are_removed() {
    let locks = VolumeLocks::new();
    {
      let _a = locks.lock("pv-a").await;
      let _b = locks.lock("pv-b").await;
      assert_eq!(locks.len(), 2);
    }

    assert!(locks.is_empty());
  }

  #[tokio::test]
  async fn waiter_keeps_entry_alive() {
    let locks = Arc::new(VolumeLocks::new());
    let held = locks.lock("pv-a").await;

    let waiter = {
      let locks = locks.clone();
      tokio::spawn(async move {
        let _guard = locks.lock("pv-a").await;
      })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    drop(held);
    assert_eq!(locks.len(), 1);

    waiter.await.unwrap();
    assert!(locks.is_empty());
  }
}
