//! Single-owner advisory lock for a single-threaded event loop.
//!
//! Acquisition is either immediate (`acquire`, fails if held) or awaited
//! (`await_acquire`). Waiters are resumed one per `release`, in the order they
//! registered.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use futures::channel::oneshot;

use crate::error::CanvasError;

#[derive(Default)]
struct LockState {
    held: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

#[derive(Clone, Default)]
pub struct EditLock {
    state: Rc<RefCell<LockState>>,
}

impl EditLock {
    pub fn new() -> EditLock {
        EditLock::default()
    }

    pub fn is_acquired(&self) -> bool {
        self.state.borrow().held
    }

    pub fn error_if_acquired(&self) -> Result<(), CanvasError> {
        if self.is_acquired() {
            Err(CanvasError::AlreadyHeld)
        } else {
            Ok(())
        }
    }

    pub fn acquire(&self) -> Result<(), CanvasError> {
        let mut state = self.state.borrow_mut();
        if state.held {
            return Err(CanvasError::AlreadyHeld);
        }
        state.held = true;
        Ok(())
    }

    pub fn release(&self) -> Result<(), CanvasError> {
        {
            let mut state = self.state.borrow_mut();
            if !state.held {
                return Err(CanvasError::NotHeld);
            }
            state.held = false;
        }
        self.wake_next();
        Ok(())
    }

    /// Resolves once the lock is free. Does not take the lock.
    pub async fn await_acquirable(&self) {
        loop {
            let receiver = {
                let mut state = self.state.borrow_mut();
                if !state.held {
                    return;
                }
                let (sender, receiver) = oneshot::channel();
                state.waiters.push_back(sender);
                receiver
            };
            // a dropped sender still means we should look again
            let _ = receiver.await;
            if !self.is_acquired() {
                // we were handed the wakeup but are not taking the lock, so
                // the next waiter gets its turn
                self.wake_next();
                return;
            }
        }
    }

    /// Resolves once the lock has been taken on behalf of the caller.
    pub async fn await_acquire(&self) {
        loop {
            self.await_acquirable_for_owner().await;
            if self.acquire().is_ok() {
                return;
            }
        }
    }

    async fn await_acquirable_for_owner(&self) {
        loop {
            let receiver = {
                let mut state = self.state.borrow_mut();
                if !state.held {
                    return;
                }
                let (sender, receiver) = oneshot::channel();
                state.waiters.push_back(sender);
                receiver
            };
            let _ = receiver.await;
            if !self.is_acquired() {
                return;
            }
        }
    }

    fn wake_next(&self) {
        let mut state = self.state.borrow_mut();
        if state.held {
            return;
        }
        // skip waiters whose futures were dropped
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.send(()).is_ok() {
                break;
            }
        }
    }
}
