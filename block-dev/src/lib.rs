//! # 块设备接口层
//!
//! 裸块设备是**异步**设备：发起读写请求后立即返回，传输完成时设备通过中断
//! 通知一次；并且同一时刻设备上只能有一个未完成的请求。
//! [`BlockDevice`] 就是对这类设备的抽象，实现了此特质的类型称为**块设备驱动**。
//!
//! 中断在独立的线程上送达，见 [`IrqLine`]。

use std::any::Any;
use std::sync::Arc;

mod irq;
mod ram_disk;

pub use self::{
    irq::IrqLine,
    ram_disk::{DiskStats, RamDisk},
};

/// 扇区大小，也是设备传输的单位
pub const SECTOR_SIZE: usize = 128;

/// 传输完成的中断处理函数。
///
/// 在中断上下文中执行，不得阻塞。
pub type IrqHandler = Arc<dyn Fn() + Send + Sync>;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any {
    /// 设备的扇区总数
    fn num_blocks(&self) -> usize;

    /// 发起读请求，完成后触发恰好一次中断。
    /// 在中断到来之前不得发起下一个请求。
    fn read_block(&self, block_id: usize, buf: &mut [u8]);

    /// 发起写请求，完成后触发恰好一次中断
    fn write_block(&self, block_id: usize, buf: &[u8]);

    /// 登记中断处理函数，替换掉之前登记的
    fn set_irq_handler(&self, handler: IrqHandler);
}
