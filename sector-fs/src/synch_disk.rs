//! # 同步磁盘层
//!
//! 裸磁盘是异步设备，请求立即返回，传输完成后以中断通知。
//! [`SynchDisk`] 在其上提供同步接口：发起请求的线程一直等到传输完成才返回。
//!
//! - 设备同一时刻只能处理一个请求，用一把锁保证互斥；
//! - 用信号量把请求线程与中断处理函数同步起来；
//! - 一个容量固定的扇区缓存，吸收对热点扇区（目录表、inode）的重复读取。
//!   缓存是**直写**的：写操作直达设备并作废对应缓存行，缓存里从不存放脏数据；
//! - 每个扇区一份读写访问令牌（读者优先），供上层协调对同一扇区的访问。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use block_dev::BlockDevice;

use crate::sync::{BlockMutex, Semaphore};
use crate::{SectorBuf, CACHE_SIZE, SECTOR_SIZE};

pub struct SynchDisk {
    device: Arc<dyn BlockDevice>,
    /// 与中断处理函数同步
    semaphore: Arc<Semaphore>,
    /// 持有它才能向设备发请求或访问缓存
    cache: BlockMutex<SectorCache>,
    /// 每个扇区的访问控制
    sectors: Vec<SectorAccess>,
}

/// 扇区的读写访问令牌
struct SectorAccess {
    /// 独占访问令牌：写者直接持有；读者中第一个获取、最后一个释放
    token: Semaphore,
    /// 活跃读者数
    readers: BlockMutex<usize>,
    /// 以此扇区为 inode 的文件被打开的次数
    visitors: AtomicUsize,
}

/// 全相联的扇区缓存，按最近最少使用换出
struct SectorCache {
    lines: Vec<Option<CacheLine>>,
    /// 逻辑时钟，每次访问递增
    clock: u64,
}

struct CacheLine {
    sector: usize,
    last_visited: u64,
    data: SectorBuf,
}

impl SynchDisk {
    #[inline]
    pub fn new(device: Arc<dyn BlockDevice>) -> Self {
        Self::with_cache_size(device, CACHE_SIZE)
    }

    pub fn with_cache_size(device: Arc<dyn BlockDevice>, cache_size: usize) -> Self {
        let semaphore = Arc::new(Semaphore::new(0));
        {
            let semaphore = semaphore.clone();
            device.set_irq_handler(Arc::new(move || semaphore.up()));
        }

        let sectors = (0..device.num_blocks())
            .map(|_| SectorAccess {
                token: Semaphore::new(1),
                readers: BlockMutex::new(0),
                visitors: AtomicUsize::new(0),
            })
            .collect();

        Self {
            device,
            semaphore,
            cache: BlockMutex::new(SectorCache::new(cache_size)),
            sectors,
        }
    }

    #[inline]
    pub fn num_sectors(&self) -> usize {
        self.sectors.len()
    }

    /// 读出扇区的当前内容，只在数据真正就绪后返回
    pub fn read_sector(&self, sector: usize, buf: &mut [u8]) {
        self.check(sector, buf.len());
        let mut cache = self.cache.lock(); // 同一时刻只有一个磁盘 I/O

        if let Some(data) = cache.lookup(sector) {
            log::trace!("cache hit: sector {sector}");
            buf.copy_from_slice(data);
            return;
        }

        log::trace!("cache miss: sector {sector}");
        self.device.read_block(sector, buf);
        self.semaphore.down(); // 等待中断
        cache.install(sector, buf);
    }

    /// 写入扇区，只在数据真正落盘后返回
    pub fn write_sector(&self, sector: usize, buf: &[u8]) {
        self.check(sector, buf.len());
        let mut cache = self.cache.lock();

        cache.invalidate(sector);
        self.device.write_block(sector, buf);
        self.semaphore.down();
    }

    /// 读者进入扇区
    pub fn begin_read(&self, sector: usize) {
        let access = self.access(sector);
        let mut readers = access.readers.lock();
        *readers += 1;
        if *readers == 1 {
            // 第一个读者替所有读者拿令牌
            access.token.down();
        }
        log::trace!("sector {sector}: {} reader(s)", *readers);
    }

    /// 读者离开扇区
    pub fn end_read(&self, sector: usize) {
        let access = self.access(sector);
        let mut readers = access.readers.lock();
        assert!(*readers > 0, "end_read on sector {sector} without begin_read");
        *readers -= 1;
        if *readers == 0 {
            access.token.up();
        }
        log::trace!("sector {sector}: {} reader(s)", *readers);
    }

    /// 写者独占扇区
    pub fn begin_write(&self, sector: usize) {
        self.access(sector).token.down();
        log::trace!("sector {sector}: writer in");
    }

    pub fn end_write(&self, sector: usize) {
        log::trace!("sector {sector}: writer out");
        self.access(sector).token.up();
    }

    /// 记录一次对 `sector` 处 inode 的打开
    pub fn open_sector(&self, sector: usize) {
        self.access(sector).visitors.fetch_add(1, Ordering::AcqRel);
    }

    pub fn close_sector(&self, sector: usize) {
        let previous = self.access(sector).visitors.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 0, "sector {sector} closed more often than opened");
    }

    /// `sector` 处的 inode 当前被打开的次数
    #[inline]
    pub fn visitors(&self, sector: usize) -> usize {
        self.access(sector).visitors.load(Ordering::Acquire)
    }
}

impl SynchDisk {
    fn check(&self, sector: usize, len: usize) {
        assert!(sector < self.num_sectors(), "sector {sector} out of range");
        assert_eq!(len, SECTOR_SIZE, "not a complete sector!");
    }

    #[inline]
    fn access(&self, sector: usize) -> &SectorAccess {
        assert!(sector < self.num_sectors(), "sector {sector} out of range");
        &self.sectors[sector]
    }
}

impl SectorCache {
    fn new(capacity: usize) -> Self {
        Self {
            lines: (0..capacity).map(|_| None).collect(),
            clock: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// 命中时刷新访问时间
    fn lookup(&mut self, sector: usize) -> Option<&SectorBuf> {
        let now = self.tick();
        let line = self
            .lines
            .iter_mut()
            .flatten()
            .find(|line| line.sector == sector)?;
        line.last_visited = now;
        Some(&line.data)
    }

    fn install(&mut self, sector: usize, data: &[u8]) {
        let now = self.tick();

        // 先找空行，没有空行就换出最久未访问的
        let slot = match self.lines.iter().position(Option::is_none) {
            Some(free) => free,
            None => {
                let Some(victim) = self
                    .lines
                    .iter()
                    .enumerate()
                    .filter_map(|(i, line)| line.as_ref().map(|line| (i, line.last_visited)))
                    .min_by_key(|&(_, last_visited)| last_visited)
                    .map(|(i, _)| i)
                else {
                    // 容量为零，不缓存
                    return;
                };
                log::trace!(
                    "cache evict: sector {}",
                    self.lines[victim].as_ref().map_or(0, |line| line.sector)
                );
                victim
            }
        };

        let mut buf = [0; SECTOR_SIZE];
        buf.copy_from_slice(data);
        self.lines[slot] = Some(CacheLine {
            sector,
            last_visited: now,
            data: buf,
        });
    }

    fn invalidate(&mut self, sector: usize) {
        for line in &mut self.lines {
            if line.as_ref().is_some_and(|line| line.sector == sector) {
                *line = None;
            }
        }
    }

    #[cfg(test)]
    fn cached_sectors(&self) -> Vec<usize> {
        let mut sectors: Vec<usize> = self.lines.iter().flatten().map(|line| line.sector).collect();
        sectors.sort_unstable();
        sectors
    }
}
