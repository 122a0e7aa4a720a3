//! # 打开文件层
//!
//! [`OpenFile`] 是对某个文件 inode 扇区的句柄，另带一个读写位置。
//! 句柄不缓存 inode，每次操作都在该扇区的访问令牌下重新读入，
//! 因此同一文件的多个句柄总能看到彼此的增长。

use std::sync::Arc;

use crate::fs::FreeMap;
use crate::layout::DiskInode;
use crate::{Error, Result, SynchDisk};

pub struct OpenFile {
    disk: Arc<SynchDisk>,
    free_map: Arc<FreeMap>,
    /// inode 所在扇区
    sector: usize,
    position: usize,
}

impl OpenFile {
    pub(crate) fn new(disk: Arc<SynchDisk>, free_map: Arc<FreeMap>, sector: usize) -> Self {
        disk.open_sector(sector);
        Self {
            disk,
            free_map,
            sector,
            position: 0,
        }
    }

    /// 从当前位置读，位置随之前移
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let read = self.read_at(buf, self.position);
        self.position += read;
        read
    }

    /// 在当前位置写，位置随之前移
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let written = self.write_at(buf, self.position)?;
        self.position += written;
        Ok(written)
    }

    /// 从 `offset` 读，不越过文件末尾，随后刷新最近访问时间
    pub fn read_at(&self, buf: &mut [u8], offset: usize) -> usize {
        self.disk.begin_read(self.sector);
        let inode = DiskInode::fetch_from(&self.disk, self.sector);
        let read = inode.read_at(offset, buf, &self.disk);
        self.disk.end_read(self.sector);

        self.disk.begin_write(self.sector);
        let mut inode = DiskInode::fetch_from(&self.disk, self.sector);
        inode.touch_accessed();
        inode.write_back(&self.disk, self.sector);
        self.disk.end_write(self.sector);

        read
    }

    /// 在 `offset` 处写入 `buf`，写过末尾时先扩展文件。
    ///
    /// 扩展失败时文件保持原样，一个字节也不写。
    pub fn write_at(&self, buf: &[u8], offset: usize) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        self.disk.begin_write(self.sector);
        let written = self.write_locked(buf, offset);
        self.disk.end_write(self.sector);
        written
    }

    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn length(&self) -> usize {
        self.inode().length()
    }

    /// inode 所在扇区
    #[inline]
    pub fn sector(&self) -> usize {
        self.sector
    }

    /// inode 的当前快照
    pub fn inode(&self) -> DiskInode {
        self.disk.begin_read(self.sector);
        let inode = DiskInode::fetch_from(&self.disk, self.sector);
        self.disk.end_read(self.sector);
        inode
    }
}

impl OpenFile {
    /// 调用者持有 inode 扇区的写令牌
    fn write_locked(&self, buf: &[u8], offset: usize) -> Result<usize> {
        let mut inode = DiskInode::fetch_from(&self.disk, self.sector);

        let Some(end) = offset.checked_add(buf.len()) else {
            log::warn!("write at offset {offset} overflows file at sector {}", self.sector);
            return Err(Error::FileTooLarge);
        };
        if end > inode.length() {
            let mut bitmap = self.free_map.lock();
            if let Err(err) = inode.extend(&mut bitmap, end - inode.length(), &self.disk) {
                log::warn!("cannot grow file at sector {} to {end} bytes: {err}", self.sector);
                return Err(err);
            }
            self.free_map.write_back(&bitmap);
        }

        let written = inode.write_at(offset, buf, &self.disk);
        inode.touch_modified();
        inode.write_back(&self.disk, self.sector);
        Ok(written)
    }
}

impl Drop for OpenFile {
    fn drop(&mut self) {
        self.disk.close_sector(self.sector);
    }
}
