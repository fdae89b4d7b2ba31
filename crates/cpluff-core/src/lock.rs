//! The context's single recursive lock: owner-thread-id plus a depth
//! counter, backed by a `parking_lot` mutex and condvar, since neither
//! `std::sync::Mutex` nor `parking_lot::ReentrantMutex` exposes condvar
//! wait/broadcast alongside reentrancy.

use parking_lot::{Condvar, Mutex};
use std::cell::UnsafeCell;
use std::thread::{self, ThreadId};

struct LockState {
    owner: Option<ThreadId>,
    depth: u32,
}

pub struct ReentrantLock<T> {
    state: Mutex<LockState>,
    condvar: Condvar,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is only ever handed out through a `ReentrantGuard`
// held while `state.owner` names the accessing thread, which `state`'s own
// mutex serializes.
unsafe impl<T: Send> Send for ReentrantLock<T> {}
unsafe impl<T: Send> Sync for ReentrantLock<T> {}

impl<T> ReentrantLock<T> {
    pub fn new(data: T) -> Self {
        ReentrantLock {
            state: Mutex::new(LockState {
                owner: None,
                depth: 0,
            }),
            condvar: Condvar::new(),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquire the lock. Blocks while another thread holds it; recurses for
    /// free if the calling thread already holds it.
    pub fn lock(&self) -> ReentrantGuard<'_, T> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        loop {
            match state.owner {
                Some(owner) if owner == me => {
                    state.depth += 1;
                    break;
                }
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    break;
                }
                Some(_) => self.condvar.wait(&mut state),
            }
        }
        ReentrantGuard { lock: self }
    }

    fn release_for_wait(&self) -> u32 {
        let me = thread::current().id();
        let mut state = self.state.lock();
        debug_assert_eq!(state.owner, Some(me));
        let saved_depth = state.depth;
        state.owner = None;
        state.depth = 0;
        self.condvar.notify_all();
        saved_depth
    }

    fn reacquire_after_wait(&self, saved_depth: u32) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        while state.owner.is_some() {
            self.condvar.wait(&mut state);
        }
        state.owner = Some(me);
        state.depth = saved_depth;
    }
}

pub struct ReentrantGuard<'a, T> {
    lock: &'a ReentrantLock<T>,
}

impl<'a, T> ReentrantGuard<'a, T> {
    /// Release the lock, block until another thread calls [`Self::notify_all`],
    /// then reacquire it at the same reentrancy depth before returning.
    pub fn wait(&self) {
        let saved_depth = self.lock.release_for_wait();
        {
            let me = thread::current().id();
            let mut state = self.lock.state.lock();
            // release_for_wait already cleared ownership; wait for a signal.
            if state.owner.is_none() || state.owner != Some(me) {
                self.lock.condvar.wait(&mut state);
            }
        }
        self.lock.reacquire_after_wait(saved_depth);
    }

    pub fn notify_all(&self) {
        self.lock.condvar.notify_all();
    }
}

impl<'a, T> Drop for ReentrantGuard<'a, T> {
    fn drop(&mut self) {
        let me = thread::current().id();
        let mut state = self.lock.state.lock();
        debug_assert_eq!(state.owner, Some(me));
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            self.lock.condvar.notify_all();
        }
    }
}

impl<'a, T> std::ops::Deref for ReentrantGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> std::ops::DerefMut for ReentrantGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn reentrant_lock_from_same_thread_does_not_deadlock() {
        let lock = ReentrantLock::new(0);
        let outer = lock.lock();
        {
            let inner = lock.lock();
            assert_eq!(*inner, 0);
        }
        assert_eq!(*outer, 0);
    }

    #[test]
    fn mutation_through_nested_guards_is_visible() {
        let lock = ReentrantLock::new(vec![1]);
        {
            let mut g = lock.lock();
            g.push(2);
            {
                let mut g2 = lock.lock();
                g2.push(3);
            }
        }
        let g = lock.lock();
        assert_eq!(*g, vec![1, 2, 3]);
    }

    #[test]
    fn second_thread_blocks_until_release() {
        let lock = Arc::new(ReentrantLock::new(0));
        let guard = lock.lock();
        let lock2 = lock.clone();
        let handle = std::thread::spawn(move || {
            let g = lock2.lock();
            *g
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        drop(guard);
        assert_eq!(handle.join().unwrap(), 0);
    }
}
