//! Cooperative cancellation of in-flight OCI calls.
//!
//! OCI has no per-call deadline; the only way to abort a running call is
//! `OCIBreak` from another thread. A [`CancelToken`] carries the request;
//! a [`CancelGuard`] (from [`Connection::watch`](crate::Connection::watch))
//! runs a watcher thread that delivers the break if the token fires while
//! the guard is alive. The interrupted call surfaces as
//! [`Error::Cancelled`](crate::Error::Cancelled) (ORA-01013) and the
//! connection remains usable afterwards.

use crate::conn::Connection;
use crate::oci::*;
use crate::ptr::Ptr;
use libc::c_void;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

extern "C" {
    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/miscellaneous-functions.html#GUID-DDAE3122-8769-4A30-8D78-EB2A3CCF77D4
    fn OCIBreak(
        hndlp:      *mut c_void,
        errhp:      *mut OCIError,
    ) -> i32;
}

#[derive(Default)]
struct State {
    cancelled: Mutex<bool>,
    cond: Condvar,
}

/// A clonable cancellation request shared between the caller and whoever
/// decides to abort the work.
#[derive(Clone, Default)]
pub struct CancelToken {
    state: Arc<State>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent; wakes every active watcher.
    pub fn cancel(&self) {
        let mut cancelled = self.state.cancelled.lock();
        *cancelled = true;
        self.state.cond.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.cancelled.lock()
    }
}

/// Keeps a watcher thread alive for the scope of one or more OCI calls.
/// Dropping the guard marks the scope done (the flag flips exactly once)
/// and joins the watcher, so a break can never arrive after the guarded
/// scope has ended.
pub struct CancelGuard<'a> {
    state: Arc<State>,
    done: Arc<AtomicBool>,
    watcher: Option<JoinHandle<()>>,
    // the watcher holds raw pointers into this connection's handle tree
    _conn: &'a Connection,
}

impl<'a> CancelGuard<'a> {
    pub(crate) fn new(conn: &'a Connection, token: &CancelToken) -> Self {
        let state = Arc::clone(&token.state);
        let done = Arc::new(AtomicBool::new(false));
        let svc: Ptr<OCISvcCtx> = Ptr::new(conn.svc_ptr().unwrap_or(std::ptr::null_mut()));
        let err: Ptr<OCIError> = Ptr::new(conn.brk_err_ptr());
        let watch_state = Arc::clone(&state);
        let watch_done = Arc::clone(&done);
        let watcher = std::thread::spawn(move || {
            let mut cancelled = watch_state.cancelled.lock();
            while !*cancelled && !watch_done.load(Ordering::Acquire) {
                watch_state.cond.wait(&mut cancelled);
            }
            let fire = *cancelled && !watch_done.load(Ordering::Acquire);
            drop(cancelled);
            if fire && !svc.is_null() {
                // best effort; the interrupted call reports ORA-01013
                let res = unsafe { OCIBreak(svc.get() as *mut c_void, err.get()) };
                log::debug!("delivered OCIBreak, rc={}", res);
            }
        });
        Self { state, done, watcher: Some(watcher), _conn: conn }
    }
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        {
            let _lock = self.state.cancelled.lock();
            self.done.store(true, Ordering::Release);
            self.state.cond.notify_all();
        }
        if let Some(watcher) = self.watcher.take() {
            let _ = watcher.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_starts_clear_and_latches() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
        assert!(token.clone().is_cancelled());
    }
}
