use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

#[derive(Debug, Default)]
struct LockState {
    held: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// Single-holder async lock with a FIFO waiter queue.
///
/// Serializes the admit-and-record sequence across scan loops. Ownership is
/// handed directly to the oldest live waiter on release, so a late arrival
/// can never overtake a queued caller.
#[derive(Debug, Clone, Default)]
pub struct TradingLock {
    state: Arc<Mutex<LockState>>,
}

/// Held lock. Released on drop, on every exit path.
#[derive(Debug)]
#[must_use = "the trading lock is released as soon as the guard is dropped"]
pub struct TradingGuard {
    state: Arc<Mutex<LockState>>,
}

impl Drop for TradingGuard {
    fn drop(&mut self) {
        release(&self.state);
    }
}

/// Queued acquire. If dropped after ownership was handed over but before the
/// caller saw it, ownership is passed on instead of leaked.
struct PendingAcquire {
    rx: oneshot::Receiver<()>,
    state: Arc<Mutex<LockState>>,
    granted: bool,
}

impl Drop for PendingAcquire {
    fn drop(&mut self) {
        if self.granted {
            return;
        }
        self.rx.close();
        if self.rx.try_recv().is_ok() {
            release(&self.state);
        }
    }
}

fn release(state: &Mutex<LockState>) {
    let mut s = state.lock();
    while let Some(tx) = s.waiters.pop_front() {
        // Receiver gone means the waiter was cancelled; skip it
        if tx.send(()).is_ok() {
            debug!("Trading lock handed to next waiter ({} queued)", s.waiters.len());
            return;
        }
    }
    s.held = false;
}

impl TradingLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the lock. Granted immediately when free, otherwise in
    /// arrival order.
    pub async fn acquire(&self) -> TradingGuard {
        loop {
            let rx = {
                let mut s = self.state.lock();
                if !s.held {
                    s.held = true;
                    return self.guard();
                }
                let (tx, rx) = oneshot::channel();
                s.waiters.push_back(tx);
                rx
            };

            let mut pending = PendingAcquire {
                rx,
                state: self.state.clone(),
                granted: false,
            };
            if (&mut pending.rx).await.is_ok() {
                pending.granted = true;
                return self.guard();
            }
        }
    }

    pub fn try_acquire(&self) -> Option<TradingGuard> {
        let mut s = self.state.lock();
        if s.held {
            return None;
        }
        s.held = true;
        Some(self.guard())
    }

    pub fn is_held(&self) -> bool {
        self.state.lock().held
    }

    /// Live waiters.
    pub fn queue_len(&self) -> usize {
        self.state
            .lock()
            .waiters
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    fn guard(&self) -> TradingGuard {
        TradingGuard {
            state: self.state.clone(),
        }
    }
}
