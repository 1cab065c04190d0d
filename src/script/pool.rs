// Pooled sandboxed interpreters (spec §4.7/§9): a bounded channel of
// pre-warmed `rquickjs` runtime/context pairs. `get` waits for
// availability or reports cancellation; `put` always constructs a
// *fresh* interpreter rather than returning the used one — state leakage
// between script executions is cheaper to prevent by discarding the
// used instance than by trying to fully reset it on the hot path.

use crate::error::CoreError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A logical handle to one sandboxed interpreter instance (spec §3
/// `VMHandle`). Carries its own interrupt flag so the resource monitor
/// can abort execution without needing a reference back into the pool.
pub struct VMHandle {
    pub runtime: rquickjs::Runtime,
    pub context: rquickjs::Context,
    interrupt: Arc<AtomicBool>,
}

impl VMHandle {
    fn build(max_memory_bytes: usize) -> Result<Self, CoreError> {
        let runtime = rquickjs::Runtime::new().map_err(|e| CoreError::Internal(format!("failed to create script runtime: {e}")))?;
        runtime.set_memory_limit(max_memory_bytes);

        let interrupt = Arc::new(AtomicBool::new(false));
        let flag = interrupt.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || flag.load(Ordering::Relaxed))));

        let context = rquickjs::Context::full(&runtime)
            .map_err(|e| CoreError::Internal(format!("failed to create script context: {e}")))?;

        Ok(Self { runtime, context, interrupt })
    }

    /// Signals the interrupt handler to abort at the next QuickJS
    /// bytecode checkpoint. Used by the resource monitor on timeout or
    /// memory-limit violation.
    pub fn interrupt(&self) {
        self.interrupt.store(true, Ordering::Relaxed);
    }

    /// Approximate bytes currently allocated by this interpreter, used
    /// by the resource monitor's memory check.
    pub fn memory_used_bytes(&self) -> usize {
        self.runtime.memory_usage().memory_used_size as usize
    }
}

/// Bounded pool of pre-warmed [`VMHandle`]s (spec §4.7 "VM pool",
/// default size 10).
pub struct VmPool {
    sender: mpsc::Sender<VMHandle>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<VMHandle>>,
    max_memory_bytes: usize,
    closed: AtomicBool,
}

impl VmPool {
    /// Constructs a pool of `size` pre-warmed interpreters, each capped
    /// at `max_memory_bytes`.
    pub fn new(size: usize, max_memory_bytes: usize) -> Result<Self, CoreError> {
        let size = size.max(1);
        let (sender, receiver) = mpsc::channel(size);
        for _ in 0..size {
            sender
                .try_send(VMHandle::build(max_memory_bytes)?)
                .map_err(|_| CoreError::Internal("failed to pre-warm script vm pool".into()))?;
        }
        Ok(Self {
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            max_memory_bytes,
            closed: AtomicBool::new(false),
        })
    }

    /// Waits for an available interpreter, honoring `cancel`. Returns
    /// `PoolClosed` once [`VmPool::close`] has been called.
    pub async fn get(&self, cancel: &CancellationToken) -> Result<VMHandle, CoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CoreError::PoolClosed);
        }
        let mut receiver = self.receiver.lock().await;
        tokio::select! {
            handle = receiver.recv() => handle.ok_or(CoreError::PoolClosed),
            _ = cancel.cancelled() => Err(CoreError::Timeout),
        }
    }

    /// Discards the used interpreter and returns a freshly constructed
    /// one to the pool (spec §4.7/§9 "returned items are always freshly
    /// constructed; the used item is discarded").
    pub async fn put(&self, used: VMHandle) {
        drop(used);
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        match VMHandle::build(self.max_memory_bytes) {
            Ok(fresh) => {
                let _ = self.sender.try_send(fresh);
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to rebuild script vm for the pool");
            }
        }
    }

    /// Builds and returns a fresh interpreter without requiring ownership
    /// of the used one (used when the caller only holds the handle inside
    /// an `Arc` shared with a monitor task and cannot safely unwrap it).
    pub async fn replace(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        match VMHandle::build(self.max_memory_bytes) {
            Ok(fresh) => {
                let _ = self.sender.try_send(fresh);
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to rebuild script vm for the pool");
            }
        }
    }

    /// Drains the pool and prevents further `get` calls from succeeding.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_and_put_cycle_preserves_pool_size() {
        let pool = VmPool::new(2, 16 * 1024 * 1024).unwrap();
        let cancel = CancellationToken::new();
        let a = pool.get(&cancel).await.unwrap();
        let b = pool.get(&cancel).await.unwrap();
        pool.put(a).await;
        pool.put(b).await;
        assert!(pool.get(&cancel).await.is_ok());
        assert!(pool.get(&cancel).await.is_ok());
    }

    #[tokio::test]
    async fn close_prevents_further_gets() {
        let pool = VmPool::new(1, 16 * 1024 * 1024).unwrap();
        pool.close();
        let cancel = CancellationToken::new();
        assert!(matches!(pool.get(&cancel).await.unwrap_err(), CoreError::PoolClosed));
    }

    #[tokio::test]
    async fn cancellation_during_wait_is_reported() {
        let pool = VmPool::new(1, 16 * 1024 * 1024).unwrap();
        let cancel = CancellationToken::new();
        let _held = pool.get(&cancel).await.unwrap();
        let cancel2 = CancellationToken::new();
        cancel2.cancel();
        let result = pool.get(&cancel2).await;
        assert!(result.is_err());
    }
}
