//! Unbounded blocking FIFO shared between producer and consumer threads.
//!
//! The elements live in a singly linked chain guarded by one [`Mutex`].
//! A [`Condvar`] bound to the same mutex lets [`SyncQueue::pop`] sleep while
//! the chain is empty instead of polling.
use std::{
    fmt::Debug,
    marker::PhantomData,
    ptr::NonNull,
    sync::{Condvar, Mutex, MutexGuard}
};
use thiserror::Error;
use tracing::{debug, trace};

const LOCK_LABEL: &str = "queue.chain";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError{
    /// Another thread panicked while holding the queue lock.
    #[error("queue lock is poisoned, a thread panicked while holding it")]
    Poisoned
}

struct Node<T>{
    value: T,
    next: Option<NonNull<Node<T>>>
}

/// The linked chain itself. Only ever touched through the queue mutex.
struct Chain<T>{
    head: Option<NonNull<Node<T>>>,
    tail: Option<NonNull<Node<T>>>,
    len: usize,
    marker: PhantomData<Box<Node<T>>>
}

// SAFETY: every node reachable from `head` is uniquely owned by the chain,
// so moving the chain to another thread moves the payloads with it.
unsafe impl<T: Send> Send for Chain<T> {}

impl<T> Chain<T>
{
    const fn new() -> Self
    {
        Self {
            head: None,
            tail: None,
            len: 0,
            marker: PhantomData
        }
    }

    fn push_back(&mut self, node: Box<Node<T>>)
    {
        let node = NonNull::from(Box::leak(node));
        match self.tail {
            // SAFETY: `tail` points to the last live node owned by this chain
            Some(tail) => unsafe { (*tail.as_ptr()).next = Some(node) },
            None => self.head = Some(node)
        }
        self.tail = Some(node);
        self.len += 1;
    }

    fn pop_front(&mut self) -> Option<T>
    {
        self.head.map(
            |head|
            {
                // SAFETY: `head` came from `Box::leak` in `push_back` and is
                // unlinked right here, so it is reclaimed exactly once.
                let node = unsafe { Box::from_raw(head.as_ptr()) };
                self.head = node.next;
                if self.head.is_none(){
                    self.tail = None;
                }
                self.len -= 1;
                node.value
            }
        )
    }

    /// Frees every node, front to back. Returns how many were freed.
    fn clear(&mut self) -> usize
    {
        let mut freed = 0;
        while self.pop_front().is_some(){
            freed += 1;
        }
        freed
    }
}

impl<T> Drop for Chain<T>
{
    fn drop(&mut self)
    {
        self.clear();
    }
}

/// Unbounded FIFO queue, safe for any number of producers and consumers.
///
/// `push` never waits for anything but the lock. `pop` blocks until an
/// element is available and has no timeout.
pub struct SyncQueue<T>{
    chain: Mutex<Chain<T>>,
    not_empty: Condvar
}

impl<T> Default for SyncQueue<T>
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl<T> SyncQueue<T>
{
    pub const fn new() -> Self
    {
        Self {
            chain: Mutex::new(Chain::new()),
            not_empty: Condvar::new()
        }
    }

    fn acquire(&self) -> Result<MutexGuard<'_, Chain<T>>, QueueError>
    {
        trace!(lock = LOCK_LABEL, "trying to acquire lock");
        let guard = self.chain
            .lock()
            .map_err(|_| QueueError::Poisoned)?;
        trace!(lock = LOCK_LABEL, "acquired lock");
        Ok(guard)
    }

    fn release(guard: MutexGuard<'_, Chain<T>>)
    {
        drop(guard);
        trace!(lock = LOCK_LABEL, "released lock");
    }

    pub fn len(&self) -> Result<usize, QueueError>
    {
        let lock = self.acquire()?;
        let len = lock.len;
        Self::release(lock);
        Ok(len)
    }

    pub fn is_empty(&self) -> Result<bool, QueueError>
    {
        self.len().map(|len| len == 0)
    }

    /// Frees every node that is still queued, then the lock and the condvar.
    ///
    /// Taking `self` by value means no other thread can still reach the queue.
    /// Returns the number of elements that were never popped.
    pub fn destroy(self) -> Result<usize, QueueError>
    {
        let mut lock = self.acquire()?;
        let freed = lock.clear();
        Self::release(lock);
        debug!(freed, "queue destroyed");
        Ok(freed)
    }
}

impl<T> SyncQueue<T>
where T: Debug
{
    /// Appends `value` at the tail and wakes one blocked `pop`, if any.
    pub fn push(&self, value: T) -> Result<(), QueueError>
    {
        let node = Box::new(Node { value, next: None });
        let mut lock = self.acquire()?;
        debug!(len = lock.len + 1, "enqueued {:?}", node.value);
        lock.push_back(node);
        self.not_empty.notify_one();
        Self::release(lock);
        Ok(())
    }

    /// Removes the head element, sleeping on the condvar for as long as the
    /// queue is empty.
    pub fn pop(&self) -> Result<T, QueueError>
    {
        let mut lock = self.acquire()?;
        let value = loop {
            if let Some(value) = lock.pop_front(){
                break value;
            }
            trace!(lock = LOCK_LABEL, "queue empty, waiting for a push");
            lock = self.not_empty
                .wait(lock)
                .map_err(|_| QueueError::Poisoned)?;
            trace!(lock = LOCK_LABEL, "woken up, re-acquired lock");
        };
        debug!(len = lock.len, "dequeued {value:?}");
        Self::release(lock);
        Ok(value)
    }
}
