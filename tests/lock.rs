mod common;

use std::cell::RefCell;
use std::rc::Rc;

use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;

use canvas_wasm::{CanvasError, EditLock};
use common::drive;

#[test]
fn waiters_acquire_in_registration_order() {
    let mut pool = LocalPool::new();
    let lock = EditLock::new();
    lock.acquire().unwrap();

    let order = Rc::new(RefCell::new(vec![]));
    for id in 0..3 {
        let lock = lock.clone();
        let order = order.clone();
        pool.spawner()
            .spawn_local(async move {
                lock.await_acquire().await;
                order.borrow_mut().push(id);
            })
            .unwrap();
    }
    pool.run_until_stalled();
    assert!(order.borrow().is_empty());

    for expected in 0..3 {
        lock.release().unwrap();
        pool.run_until_stalled();
        assert_eq!(*order.borrow().last().unwrap(), expected);
        assert!(lock.is_acquired());
    }
    lock.release().unwrap();
    assert!(!lock.is_acquired());
}

#[test]
fn acquirable_does_not_take_the_lock() {
    let mut pool = LocalPool::new();
    let lock = EditLock::new();
    lock.acquire().unwrap();

    let waiting = lock.clone();
    assert_eq!(drive(&mut pool, async move { waiting.await_acquirable().await }), None);

    lock.release().unwrap();
    pool.run_until_stalled();
    assert!(!lock.is_acquired());
    lock.acquire().unwrap();
}

#[test]
fn acquirable_waiter_passes_the_turn_on() {
    let mut pool = LocalPool::new();
    let lock = EditLock::new();
    lock.acquire().unwrap();

    let observed = Rc::new(RefCell::new(false));
    let taken = Rc::new(RefCell::new(false));
    {
        let lock = lock.clone();
        let observed = observed.clone();
        pool.spawner()
            .spawn_local(async move {
                lock.await_acquirable().await;
                *observed.borrow_mut() = true;
            })
            .unwrap();
    }
    {
        let lock = lock.clone();
        let taken = taken.clone();
        pool.spawner()
            .spawn_local(async move {
                lock.await_acquire().await;
                *taken.borrow_mut() = true;
            })
            .unwrap();
    }
    pool.run_until_stalled();

    lock.release().unwrap();
    pool.run_until_stalled();
    assert!(*observed.borrow());
    assert!(*taken.borrow());
    assert!(lock.is_acquired());
}

#[test]
fn dropped_waiters_are_skipped() {
    let mut pool = LocalPool::new();
    let lock = EditLock::new();
    lock.acquire().unwrap();

    let abandoned = lock.clone();
    assert_eq!(drive(&mut pool, async move { abandoned.await_acquire().await }), None);
    // dropping the pool drops the parked waiter
    drop(pool);
    let mut pool = LocalPool::new();

    let waiting = lock.clone();
    assert_eq!(drive(&mut pool, async move { waiting.await_acquire().await }), None);
    lock.release().unwrap();
    pool.run_until_stalled();
    assert!(lock.is_acquired());
}

#[test]
fn misuse_is_reported() {
    let lock = EditLock::new();
    assert!(matches!(lock.release(), Err(CanvasError::NotHeld)));
    lock.acquire().unwrap();
    assert!(matches!(lock.acquire(), Err(CanvasError::AlreadyHeld)));
}
