//! # 同步原语
//!
//! 线程之间只通过阻塞原语协调：信号量与会睡眠的互斥锁。
//! 短临界区内的簿记仍使用 `spin` 的自旋锁。

mod mutex;
mod semaphore;

pub use self::{
    mutex::{BlockMutex, BlockMutexGuard},
    semaphore::Semaphore,
};
