//! Context-switch lock
//!
//! Guards the debugger's notion of "current thread" and "current frame".
//!
//! - An *exclusive* hold excludes every other hold. It is taken by whoever
//!   needs to change the selected thread/frame.
//! - *Shared* holds coexist. A context-scoped command runs under one so a
//!   concurrent exclusive holder cannot reselect underneath it.
//! - [`ContextLockToken::downgrade`] turns an exclusive hold into a shared one
//!   in a single step under the lock's mutex; no other caller can observe the
//!   lock as free in between.
//!
//! Queued exclusive acquirers are served in FIFO order and take precedence
//! over newly arriving shared acquirers. A dropped or cancelled acquire never
//! leaves a holder behind: if the grant raced the cancellation, the grant is
//! released on the spot.
//!
//! Reentrant exclusive acquisition from the same caller is not detected and
//! deadlocks.

use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldKind {
    Exclusive,
    Shared,
}

/// Where a token is in its life cycle; the only way forward is through
/// [`ContextLockToken::downgrade`] and [`ContextLockToken::release`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Exclusive,
    Shared,
    Released,
}

/// Point-in-time view of the lock, for diagnostics and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockSnapshot {
    pub exclusive: bool,
    pub shared: usize,
    pub waiting_exclusive: usize,
    pub waiting_shared: usize,
    pub closed: bool,
}

enum LockState {
    Free,
    Shared(usize),
    Exclusive,
    Closed(Error),
}

type Grant = oneshot::Sender<Result<()>>;

struct Waiter {
    id: u64,
    tx: Grant,
}

struct Inner {
    state: LockState,
    exclusive_waiters: VecDeque<Waiter>,
    shared_waiters: Vec<Waiter>,
    next_waiter_id: u64,
}

impl Inner {
    /// Take the hold now if possible
    fn try_take(&mut self, kind: HoldKind) -> Result<bool> {
        match self.state {
            LockState::Closed(ref err) => Err(err.clone()),
            LockState::Free => {
                self.state = match kind {
                    HoldKind::Exclusive => LockState::Exclusive,
                    HoldKind::Shared => LockState::Shared(1),
                };
                Ok(true)
            }
            LockState::Shared(n)
                if kind == HoldKind::Shared && self.exclusive_waiters.is_empty() =>
            {
                self.state = LockState::Shared(n + 1);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn enqueue(&mut self, kind: HoldKind) -> (u64, oneshot::Receiver<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        let id = self.next_waiter_id;
        self.next_waiter_id += 1;
        match kind {
            HoldKind::Exclusive => self.exclusive_waiters.push_back(Waiter { id, tx }),
            HoldKind::Shared => self.shared_waiters.push(Waiter { id, tx }),
        }
        (id, rx)
    }

    fn remove_waiter(&mut self, id: u64) -> bool {
        let before = self.exclusive_waiters.len() + self.shared_waiters.len();
        self.exclusive_waiters.retain(|w| w.id != id);
        self.shared_waiters.retain(|w| w.id != id);
        before != self.exclusive_waiters.len() + self.shared_waiters.len()
    }

    fn release(&mut self, kind: HoldKind) {
        match self.state {
            LockState::Exclusive if kind == HoldKind::Exclusive => self.state = LockState::Free,
            LockState::Shared(n) if kind == HoldKind::Shared => {
                self.state = if n > 1 {
                    LockState::Shared(n - 1)
                } else {
                    LockState::Free
                }
            }
            LockState::Closed(_) => return,
            _ => {
                warn!(?kind, "Context lock release does not match the lock state");
                return;
            }
        }
        self.dispatch();
    }

    fn downgrade(&mut self) -> Result<()> {
        match self.state {
            LockState::Exclusive => {
                self.state = LockState::Shared(1);
                self.dispatch();
                Ok(())
            }
            LockState::Closed(ref err) => Err(err.clone()),
            _ => Err(Error::LockDiscipline(
                "downgrade without an exclusive hold".to_string(),
            )),
        }
    }

    /// Hand the lock to whoever is next in line
    fn dispatch(&mut self) {
        match self.state {
            LockState::Free => {
                while let Some(waiter) = self.exclusive_waiters.pop_front() {
                    if waiter.tx.send(Ok(())).is_ok() {
                        self.state = LockState::Exclusive;
                        return;
                    }
                }
                let granted = self.grant_shared();
                if granted > 0 {
                    self.state = LockState::Shared(granted);
                }
            }
            LockState::Shared(n) if self.exclusive_waiters.is_empty() => {
                let granted = self.grant_shared();
                self.state = LockState::Shared(n + granted);
            }
            _ => {}
        }
    }

    fn grant_shared(&mut self) -> usize {
        std::mem::take(&mut self.shared_waiters)
            .into_iter()
            .filter_map(|w| w.tx.send(Ok(())).ok())
            .count()
    }
}

/// The context-switch lock of one session. Cloning shares the lock.
#[derive(Clone)]
pub struct ContextLock {
    inner: Arc<Mutex<Inner>>,
}

impl Default for ContextLock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ContextLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextLock")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl ContextLock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: LockState::Free,
                exclusive_waiters: VecDeque::new(),
                shared_waiters: Vec::new(),
                next_waiter_id: 0,
            })),
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        // The critical sections never panic midway; a poisoned guard is still consistent
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait for a hold of the given kind
    pub async fn acquire(&self, kind: HoldKind) -> Result<ContextLockToken> {
        self.acquire_inner(kind, None).await
    }

    /// Like [`acquire`](Self::acquire), giving up with `Error::Cancelled`
    /// when `cancel` fires. Cancelling never leaves a holder behind.
    pub async fn acquire_cancellable(
        &self,
        kind: HoldKind,
        cancel: &CancellationToken,
    ) -> Result<ContextLockToken> {
        self.acquire_inner(kind, Some(cancel)).await
    }

    async fn acquire_inner(
        &self,
        kind: HoldKind,
        cancel: Option<&CancellationToken>,
    ) -> Result<ContextLockToken> {
        let (id, rx) = {
            let mut inner = self.lock_inner();
            if inner.try_take(kind)? {
                trace!(?kind, "Context lock taken");
                return Ok(ContextLockToken::new(self.clone(), kind));
            }
            inner.enqueue(kind)
        };
        trace!(?kind, waiter = id, "Context lock busy, queued");

        let mut pending = PendingAcquire {
            lock: self.clone(),
            id,
            kind,
            rx,
            settled: false,
        };

        let outcome = match cancel {
            Some(cancel) => tokio::select! {
                biased;
                outcome = &mut pending.rx => outcome,
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            },
            None => (&mut pending.rx).await,
        };
        pending.settled = true;

        match outcome {
            Ok(Ok(())) => {
                trace!(?kind, waiter = id, "Context lock granted");
                Ok(ContextLockToken::new(self.clone(), kind))
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(Error::LockDiscipline(
                "context lock dropped a queued waiter".to_string(),
            )),
        }
    }

    /// Fail every waiter and every later acquire with `err`.
    ///
    /// Outstanding tokens stay valid; releasing them is a no-op.
    pub fn close(&self, err: Error) {
        let mut inner = self.lock_inner();
        if matches!(inner.state, LockState::Closed(_)) {
            return;
        }
        for waiter in inner.exclusive_waiters.drain(..) {
            let _ = waiter.tx.send(Err(err.clone()));
        }
        for waiter in inner.shared_waiters.drain(..) {
            let _ = waiter.tx.send(Err(err.clone()));
        }
        inner.state = LockState::Closed(err);
    }

    pub fn snapshot(&self) -> LockSnapshot {
        let inner = self.lock_inner();
        let mut snapshot = LockSnapshot {
            waiting_exclusive: inner.exclusive_waiters.len(),
            waiting_shared: inner.shared_waiters.len(),
            ..LockSnapshot::default()
        };
        match inner.state {
            LockState::Free => {}
            LockState::Shared(n) => snapshot.shared = n,
            LockState::Exclusive => snapshot.exclusive = true,
            LockState::Closed(_) => snapshot.closed = true,
        }
        snapshot
    }

    fn release_hold(&self, kind: HoldKind) {
        self.lock_inner().release(kind);
        trace!(?kind, "Context lock released");
    }

    fn downgrade_hold(&self) -> Result<()> {
        self.lock_inner().downgrade()
    }
}

/// Cleans up a queued acquire whose future was dropped or cancelled
struct PendingAcquire {
    lock: ContextLock,
    id: u64,
    kind: HoldKind,
    rx: oneshot::Receiver<Result<()>>,
    settled: bool,
}

impl Drop for PendingAcquire {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut inner = self.lock.lock_inner();
        if inner.remove_waiter(self.id) {
            // a queued exclusive may have been holding back shared waiters
            inner.dispatch();
            return;
        }
        // Granted under the mutex but never observed: give it back
        if let Ok(Ok(())) = self.rx.try_recv() {
            trace!(kind = ?self.kind, waiter = self.id, "Returning unobserved context lock grant");
            inner.release(self.kind);
        }
    }
}

/// A hold on the context lock.
///
/// Dropping a token that was not released releases it, so every exit path
/// (error, early return, cancellation) gives the hold back exactly once.
pub struct ContextLockToken {
    lock: ContextLock,
    state: TokenState,
}

impl std::fmt::Debug for ContextLockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextLockToken")
            .field("state", &self.state)
            .finish()
    }
}

impl ContextLockToken {
    fn new(lock: ContextLock, kind: HoldKind) -> Self {
        let state = match kind {
            HoldKind::Exclusive => TokenState::Exclusive,
            HoldKind::Shared => TokenState::Shared,
        };
        Self { lock, state }
    }

    pub fn state(&self) -> TokenState {
        self.state
    }

    pub fn is_exclusive(&self) -> bool {
        self.state == TokenState::Exclusive
    }

    /// Error unless this token currently holds the lock exclusively
    pub fn ensure_exclusive(&self) -> Result<()> {
        match self.state {
            TokenState::Exclusive => Ok(()),
            TokenState::Shared => Err(Error::LockDiscipline(
                "operation requires an exclusive hold, token is shared".to_string(),
            )),
            TokenState::Released => Err(Error::LockDiscipline(
                "use of a released context lock token".to_string(),
            )),
        }
    }

    /// Exclusive -> Shared, atomically
    pub fn downgrade(&mut self) -> Result<()> {
        self.ensure_exclusive()?;
        self.lock.downgrade_hold()?;
        self.state = TokenState::Shared;
        Ok(())
    }

    /// Give the hold back. Releasing twice is an error.
    pub fn release(&mut self) -> Result<()> {
        let kind = match self.state {
            TokenState::Exclusive => HoldKind::Exclusive,
            TokenState::Shared => HoldKind::Shared,
            TokenState::Released => {
                return Err(Error::LockDiscipline(
                    "context lock token released twice".to_string(),
                ))
            }
        };
        self.state = TokenState::Released;
        self.lock.release_hold(kind);
        Ok(())
    }
}

impl Drop for ContextLockToken {
    fn drop(&mut self) {
        if self.state != TokenState::Released {
            let _ = self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn still_pending<F: std::future::Future + Unpin>(fut: &mut F) -> bool {
        tokio::time::timeout(Duration::from_millis(10), fut)
            .await
            .is_err()
    }

    #[tokio::test]
    async fn test_exclusive_excludes_exclusive() {
        let lock = ContextLock::new();
        let mut first = lock.acquire(HoldKind::Exclusive).await.unwrap();

        let mut second = Box::pin(lock.acquire(HoldKind::Exclusive));
        assert!(still_pending(&mut second).await);
        assert_eq!(lock.snapshot().waiting_exclusive, 1);

        first.release().unwrap();
        let token = second.await.unwrap();
        assert!(token.is_exclusive());
        assert!(lock.snapshot().exclusive);
    }

    #[tokio::test]
    async fn test_shared_holds_coexist() {
        let lock = ContextLock::new();
        let a = lock.acquire(HoldKind::Shared).await.unwrap();
        let b = lock.acquire(HoldKind::Shared).await.unwrap();
        assert_eq!(lock.snapshot().shared, 2);
        drop(a);
        drop(b);
        assert_eq!(lock.snapshot(), LockSnapshot::default());
    }

    #[tokio::test]
    async fn test_shared_waits_for_downgrade() {
        let lock = ContextLock::new();
        let mut writer = lock.acquire(HoldKind::Exclusive).await.unwrap();

        let mut reader = Box::pin(lock.acquire(HoldKind::Shared));
        assert!(still_pending(&mut reader).await);

        writer.downgrade().unwrap();
        assert_eq!(writer.state(), TokenState::Shared);
        let reader = reader.await.unwrap();
        assert_eq!(reader.state(), TokenState::Shared);
        assert_eq!(lock.snapshot().shared, 2);
    }

    #[tokio::test]
    async fn test_downgrade_keeps_exclusive_waiters_out() {
        let lock = ContextLock::new();
        let mut writer = lock.acquire(HoldKind::Exclusive).await.unwrap();
        let mut next = Box::pin(lock.acquire(HoldKind::Exclusive));
        assert!(still_pending(&mut next).await);

        writer.downgrade().unwrap();
        // a downgraded holder still excludes writers
        assert!(still_pending(&mut next).await);

        writer.release().unwrap();
        assert!(next.await.unwrap().is_exclusive());
    }

    #[tokio::test]
    async fn test_queued_exclusive_blocks_new_shared() {
        let lock = ContextLock::new();
        let reader = lock.acquire(HoldKind::Shared).await.unwrap();
        let mut writer = Box::pin(lock.acquire(HoldKind::Exclusive));
        assert!(still_pending(&mut writer).await);

        let mut late_reader = Box::pin(lock.acquire(HoldKind::Shared));
        assert!(still_pending(&mut late_reader).await);

        drop(reader);
        let mut writer = writer.await.unwrap();
        assert!(still_pending(&mut late_reader).await);
        writer.release().unwrap();
        late_reader.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_acquire_leaves_no_waiter() {
        let lock = ContextLock::new();
        let holder = lock.acquire(HoldKind::Exclusive).await.unwrap();

        let cancel = CancellationToken::new();
        let lock2 = lock.clone();
        let cancel2 = cancel.clone();
        let task = tokio::spawn(async move {
            lock2
                .acquire_cancellable(HoldKind::Exclusive, &cancel2)
                .await
                .map(|_| ())
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        assert_eq!(task.await.unwrap(), Err(Error::Cancelled));

        let snapshot = lock.snapshot();
        assert_eq!(snapshot.waiting_exclusive, 0);
        assert!(snapshot.exclusive);
        drop(holder);
        assert_eq!(lock.snapshot(), LockSnapshot::default());
    }

    #[tokio::test]
    async fn test_unobserved_grant_is_returned() {
        let lock = ContextLock::new();
        let mut holder = lock.acquire(HoldKind::Exclusive).await.unwrap();

        let mut waiter = Box::pin(lock.acquire(HoldKind::Exclusive));
        assert!(still_pending(&mut waiter).await);

        // grant lands in the waiter's slot, but the waiter is never polled again
        holder.release().unwrap();
        assert!(lock.snapshot().exclusive);
        drop(waiter);

        assert_eq!(lock.snapshot(), LockSnapshot::default());
    }

    #[tokio::test]
    async fn test_double_release_fails_loudly() {
        let lock = ContextLock::new();
        let mut token = lock.acquire(HoldKind::Shared).await.unwrap();
        token.release().unwrap();
        assert!(matches!(token.release(), Err(Error::LockDiscipline(_))));
        assert!(matches!(token.downgrade(), Err(Error::LockDiscipline(_))));
        assert!(matches!(token.ensure_exclusive(), Err(Error::LockDiscipline(_))));
    }

    #[tokio::test]
    async fn test_shared_cannot_downgrade() {
        let lock = ContextLock::new();
        let mut token = lock.acquire(HoldKind::Shared).await.unwrap();
        assert!(matches!(token.downgrade(), Err(Error::LockDiscipline(_))));
        assert_eq!(token.state(), TokenState::Shared);
    }

    #[tokio::test]
    async fn test_close_fails_waiters_and_later_acquires() {
        let lock = ContextLock::new();
        let holder = lock.acquire(HoldKind::Exclusive).await.unwrap();
        let mut waiter = Box::pin(lock.acquire(HoldKind::Shared));
        assert!(still_pending(&mut waiter).await);

        let exited = Error::DebuggerExited { exit_code: None };
        lock.close(exited.clone());
        assert_eq!(waiter.await.unwrap_err(), exited);
        assert_eq!(
            lock.acquire(HoldKind::Exclusive).await.unwrap_err(),
            exited
        );
        // releasing after close is harmless
        drop(holder);
        assert!(lock.snapshot().closed);
    }
}
