use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, Thread};

use spin::Mutex;

/// 计数信号量，等候队列先进先出
#[derive(Debug)]
pub struct Semaphore {
    inner: Mutex<SemaphoreInner>,
}

#[derive(Debug)]
struct SemaphoreInner {
    permits: usize,
    wait_queue: VecDeque<Arc<Waiter>>,
}

/// 排队中的线程
#[derive(Debug)]
struct Waiter {
    thread: Thread,
    /// 被 `up` 选中并转交了资源
    woken: AtomicBool,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            inner: Mutex::new(SemaphoreInner {
                permits,
                wait_queue: VecDeque::new(),
            }),
        }
    }

    /// Verhogen 增加
    pub fn up(&self) {
        let mut inner = self.inner.lock();
        if let Some(waiter) = inner.wait_queue.pop_front() {
            // 转让资源给最早排队的线程
            drop(inner);
            waiter.woken.store(true, Ordering::Release);
            waiter.thread.unpark();
        } else {
            inner.permits += 1;
        }
    }

    /// Proberen 尝试
    pub fn down(&self) {
        let mut inner = self.inner.lock();

        if inner.permits > 0 {
            inner.permits -= 1;
            return;
        }

        // 资源派发完，去排队
        let waiter = Arc::new(Waiter {
            thread: thread::current(),
            woken: AtomicBool::new(false),
        });
        inner.wait_queue.push_back(waiter.clone());
        drop(inner);

        // `park` 可能虚假返回，以 `woken` 为准
        while !waiter.woken.load(Ordering::Acquire) {
            thread::park();
        }
    }

    /// 当前可用的资源数
    pub fn permits(&self) -> usize {
        self.inner.lock().permits
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn counts_permits() {
        let sem = Semaphore::new(2);
        sem.down();
        sem.down();
        assert_eq!(sem.permits(), 0);
        sem.up();
        assert_eq!(sem.permits(), 1);
    }

    #[test]
    fn wakes_waiters_in_queue_order() {
        let sem = Arc::new(Semaphore::new(0));
        let (tx, rx) = mpsc::channel();

        let handles: Vec<_> = (0..3)
            .map(|i| {
                let sem_thread = sem.clone();
                let tx = tx.clone();
                let handle = thread::spawn(move || {
                    sem_thread.down();
                    tx.send(i).unwrap();
                });
                // 保证按序排队
                while sem.inner.lock().wait_queue.len() <= i {
                    thread::yield_now();
                }
                handle
            })
            .collect();

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        for expected in 0..3 {
            sem.up();
            assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), expected);
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(sem.permits(), 0);
    }
}
