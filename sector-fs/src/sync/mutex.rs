use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::thread::{self, ThreadId};

use super::Semaphore;

/// 会睡眠的互斥锁，记录持有者。
///
/// 与自旋锁不同，拿不到锁的线程会在等候队列中阻塞，
/// 因此可以在持锁期间等待磁盘中断。
/// 只有持有者才能释放锁，否则视为致命错误。
pub struct BlockMutex<T> {
    sem: Semaphore,
    owner: spin::Mutex<Option<ThreadId>>,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for BlockMutex<T> {}
unsafe impl<T: Send> Sync for BlockMutex<T> {}

pub struct BlockMutexGuard<'a, T> {
    mutex: &'a BlockMutex<T>,
}

impl<T> BlockMutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            sem: Semaphore::new(1),
            owner: spin::Mutex::new(None),
            data: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> BlockMutexGuard<'_, T> {
        let me = thread::current().id();
        assert_ne!(
            *self.owner.lock(),
            Some(me),
            "BlockMutex is not reentrant"
        );
        self.sem.down();
        *self.owner.lock() = Some(me);
        BlockMutexGuard { mutex: self }
    }

    #[inline]
    pub fn is_held_by_current_thread(&self) -> bool {
        *self.owner.lock() == Some(thread::current().id())
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    fn unlock(&self) {
        let mut owner = self.owner.lock();
        assert_eq!(
            *owner,
            Some(thread::current().id()),
            "BlockMutex released by a thread that does not hold it"
        );
        *owner = None;
        drop(owner);
        self.sem.up();
    }
}

impl<T: Default> Default for BlockMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for BlockMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockMutex")
            .field("owner", &*self.owner.lock())
            .finish_non_exhaustive()
    }
}

impl<T> Deref for BlockMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for BlockMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for BlockMutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn serializes_increments() {
        let counter = Arc::new(BlockMutex::new(0usize));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let mut guard = counter.lock();
                        let value = *guard;
                        thread::yield_now();
                        *guard = value + 1;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*counter.lock(), 4000);
    }

    #[test]
    fn tracks_owner() {
        let mutex = BlockMutex::new(());
        assert!(!mutex.is_held_by_current_thread());
        let guard = mutex.lock();
        assert!(mutex.is_held_by_current_thread());
        drop(guard);
        assert!(!mutex.is_held_by_current_thread());
    }

    #[test]
    fn release_by_foreign_thread_is_fatal() {
        let mutex = Arc::new(BlockMutex::new(()));
        let guard = mutex.lock();
        // 把锁当作裸指针偷渡到别的线程去释放
        let raw = &*mutex as *const BlockMutex<()> as usize;
        let result = thread::spawn(move || {
            let mutex = unsafe { &*(raw as *const BlockMutex<()>) };
            mutex.unlock();
        })
        .join();
        assert!(result.is_err());
        drop(guard);
    }
}
