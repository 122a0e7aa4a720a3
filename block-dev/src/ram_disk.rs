use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use spin::Mutex;

use crate::{BlockDevice, IrqHandler, IrqLine, SECTOR_SIZE};

/// 内存中的块设备，启动时全部扇区为零
pub struct RamDisk {
    sectors: Mutex<Vec<[u8; SECTOR_SIZE]>>,
    irq: IrqLine,
    stats: DiskStats,
}

/// 设备实际完成的传输次数
#[derive(Debug, Default)]
pub struct DiskStats {
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl RamDisk {
    #[inline]
    pub fn new(blocks: usize) -> Self {
        Self::with_latency(blocks, Duration::ZERO)
    }

    /// 每次传输都要等待 `latency` 之后才触发中断
    pub fn with_latency(blocks: usize, latency: Duration) -> Self {
        Self {
            sectors: Mutex::new(vec![[0; SECTOR_SIZE]; blocks]),
            irq: IrqLine::new(latency),
            stats: DiskStats::default(),
        }
    }

    #[inline]
    pub fn stats(&self) -> &DiskStats {
        &self.stats
    }

    fn check(&self, block_id: usize, len: usize) {
        assert!(
            block_id < self.num_blocks(),
            "sector {block_id} out of range"
        );
        assert_eq!(len, SECTOR_SIZE, "not a complete sector!");
    }
}

impl BlockDevice for RamDisk {
    fn num_blocks(&self) -> usize {
        self.sectors.lock().len()
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        self.check(block_id, buf.len());
        self.irq.start();
        buf.copy_from_slice(&self.sectors.lock()[block_id]);
        self.stats.reads.fetch_add(1, Ordering::Relaxed);
        self.irq.raise();
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        self.check(block_id, buf.len());
        self.irq.start();
        self.sectors.lock()[block_id].copy_from_slice(buf);
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        self.irq.raise();
    }

    fn set_irq_handler(&self, handler: IrqHandler) {
        self.irq.set_handler(handler);
    }
}

impl DiskStats {
    #[inline]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn one_interrupt_per_request() {
        let disk = RamDisk::new(8);
        let (tx, rx) = mpsc::channel();
        let tx = spin::Mutex::new(tx);
        disk.set_irq_handler(Arc::new(move || tx.lock().send(()).unwrap()));

        disk.write_block(3, &[7; SECTOR_SIZE]);
        rx.recv_timeout(Duration::from_secs(1)).unwrap();

        let mut buf = [0; SECTOR_SIZE];
        disk.read_block(3, &mut buf);
        rx.recv_timeout(Duration::from_secs(1)).unwrap();

        assert_eq!(buf, [7; SECTOR_SIZE]);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        assert_eq!(disk.stats().reads(), 1);
        assert_eq!(disk.stats().writes(), 1);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_is_fatal() {
        let disk = RamDisk::new(4);
        disk.write_block(4, &[0; SECTOR_SIZE]);
    }
}
