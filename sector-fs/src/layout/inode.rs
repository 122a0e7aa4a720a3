//! 磁盘上的 inode（文件头），恰好占一个扇区
//!
//! 数据扇区的索引：
//! - 扇区数小于 [`NUM_DIRECT`] 时，`direct` 的前 `sectors` 项都是数据扇区；
//! - 否则前 `NUM_DIRECT - 1` 项是数据扇区，最后一项改作**间接索引块**的扇区号，
//!   间接索引块依次存放其余数据扇区的编号。
//!
//! 文件只会变长，在增长跨过阈值的那一刻才从全直接索引转为直接加间接索引。

use std::fmt;
use std::mem;
use std::ptr;
use std::slice;

use crate::layout::{Bitmap, Timestamp};
use crate::{Error, Result, SynchDisk};
use crate::{SectorBuf, INDIRECT_COUNT, MAX_FILE_SECTORS, NUM_DIRECT, SECTOR_SIZE};

/// 直接索引能覆盖的字节数，超出部分经由间接索引块定位
const DIRECT_BYTES: usize = (NUM_DIRECT - 1) * SECTOR_SIZE;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[repr(C)]
pub struct DiskInode {
    /// 文件的有效字节数。
    // 不用usize是为了严控布局
    size: u32,
    /// 数据扇区数，恒等于 `size` 除以扇区大小向上取整
    sectors: u32,
    direct: [u32; NUM_DIRECT],
    created: Timestamp,
    accessed: Timestamp,
    modified: Timestamp,
    _reserved: [u8; 5],
}

const _: () = assert!(mem::size_of::<DiskInode>() == SECTOR_SIZE);

/// 间接索引块：第 `i` 项是块内字节 `[4i, 4i+4)` 处的小端 `u32`
struct IndirectBlock([u32; INDIRECT_COUNT]);

impl DiskInode {
    /// 为新文件分配 `size` 字节的数据扇区。
    ///
    /// 空闲扇区不足时返回错误，且不产生任何副作用。
    pub fn allocate(&mut self, free_map: &mut Bitmap, size: usize, disk: &SynchDisk) -> Result<()> {
        let sectors = Self::count_data_sectors(size);
        if sectors > MAX_FILE_SECTORS {
            return Err(Error::FileTooLarge);
        }
        if free_map.count_clear() < Self::count_total_sectors(size) {
            return Err(Error::NoSpace);
        }

        let now = Timestamp::now();
        *self = Self {
            size: size as u32,
            sectors: sectors as u32,
            created: now,
            accessed: now,
            modified: now,
            ..Default::default()
        };

        if sectors < NUM_DIRECT {
            for slot in &mut self.direct[..sectors] {
                *slot = claim(free_map);
            }
        } else {
            for slot in &mut self.direct[..NUM_DIRECT - 1] {
                *slot = claim(free_map);
            }
            self.direct[NUM_DIRECT - 1] = claim(free_map);

            let mut indirect = IndirectBlock::new();
            for slot in &mut indirect.0[..sectors - (NUM_DIRECT - 1)] {
                *slot = claim(free_map);
            }
            indirect.write_back(disk, self.indirect_sector_unchecked());
        }

        log::debug!("allocated {sectors} data sector(s) for {size} bytes");
        Ok(())
    }

    /// 把文件占有的全部扇区（数据扇区，以及间接索引块自身）清零并归还位图
    pub fn deallocate(&self, free_map: &mut Bitmap, disk: &SynchDisk) {
        let owned = self.owned_sectors(disk);
        for &sector in &owned {
            disk.write_sector(sector, &[0; SECTOR_SIZE]);
            free_map.clear(sector);
        }
        log::debug!("released {} sector(s)", owned.len());
    }

    /// 文件增长 `bytes` 字节，只分配新需要的扇区。
    ///
    /// 空闲扇区不足时返回错误，文件长度保持不变。
    pub fn extend(&mut self, free_map: &mut Bitmap, bytes: usize, disk: &SynchDisk) -> Result<()> {
        let old_size = self.size as usize;
        let new_size = old_size + bytes;
        let old_sectors = self.sectors as usize;
        let new_sectors = Self::count_data_sectors(new_size);

        if new_sectors == old_sectors {
            self.size = new_size as u32;
            return Ok(());
        }
        if new_sectors > MAX_FILE_SECTORS {
            return Err(Error::FileTooLarge);
        }
        let needed = Self::count_total_sectors(new_size) - Self::count_total_sectors(old_size);
        if free_map.count_clear() < needed {
            return Err(Error::NoSpace);
        }

        log::debug!("extending {} sector(s)", new_sectors - old_sectors);

        if new_sectors < NUM_DIRECT {
            // 仍然只用直接索引
            for slot in &mut self.direct[old_sectors..new_sectors] {
                *slot = claim(free_map);
            }
        } else if old_sectors < NUM_DIRECT {
            // 这次增长跨过了阈值，创建间接索引块
            for slot in &mut self.direct[old_sectors..NUM_DIRECT - 1] {
                *slot = claim(free_map);
            }
            self.direct[NUM_DIRECT - 1] = claim(free_map);

            let mut indirect = IndirectBlock::new();
            for slot in &mut indirect.0[..new_sectors - (NUM_DIRECT - 1)] {
                *slot = claim(free_map);
            }
            indirect.write_back(disk, self.indirect_sector_unchecked());
        } else {
            // 已有间接索引块，原地增长
            let sector = self.indirect_sector_unchecked();
            let mut indirect = IndirectBlock::fetch_from(disk, sector);
            let range = old_sectors - (NUM_DIRECT - 1)..new_sectors - (NUM_DIRECT - 1);
            for slot in &mut indirect.0[range] {
                *slot = claim(free_map);
            }
            indirect.write_back(disk, sector);
        }

        self.size = new_size as u32;
        self.sectors = new_sectors as u32;
        Ok(())
    }

    /// 文件内字节偏移到其所在扇区的转换
    pub fn byte_to_sector(&self, offset: usize, disk: &SynchDisk) -> usize {
        debug_assert!(offset < self.sectors as usize * SECTOR_SIZE);

        if offset < DIRECT_BYTES {
            self.direct[offset / SECTOR_SIZE] as usize
        } else {
            // 剔去直接索引的部分
            let index = (offset - DIRECT_BYTES) / SECTOR_SIZE;
            IndirectBlock::fetch_from(disk, self.indirect_sector_unchecked()).0[index] as usize
        }
    }

    /// 按文件顺序排列的数据扇区
    pub fn data_sectors(&self, disk: &SynchDisk) -> Vec<usize> {
        let sectors = self.sectors as usize;
        let mut data: Vec<usize> = Vec::with_capacity(sectors);

        if sectors < NUM_DIRECT {
            data.extend(self.direct[..sectors].iter().map(|&s| s as usize));
        } else {
            data.extend(self.direct[..NUM_DIRECT - 1].iter().map(|&s| s as usize));
            let indirect = IndirectBlock::fetch_from(disk, self.indirect_sector_unchecked());
            data.extend(
                indirect.0[..sectors - (NUM_DIRECT - 1)]
                    .iter()
                    .map(|&s| s as usize),
            );
        }

        data
    }

    /// 文件占有的全部扇区：数据扇区按文件顺序，其后是间接索引块（若有）
    pub fn owned_sectors(&self, disk: &SynchDisk) -> Vec<usize> {
        let mut owned = self.data_sectors(disk);
        owned.extend(self.indirect_sector());
        owned
    }

    #[inline]
    pub fn indirect_sector(&self) -> Option<usize> {
        (self.sectors as usize >= NUM_DIRECT).then(|| self.indirect_sector_unchecked())
    }

    /// 从指定位置(字节偏移)读出数据填充`buf`，不会越过文件末尾。
    ///
    /// 每个数据扇区都在其读者令牌的保护下读取。
    pub fn read_at(&self, offset: usize, buf: &mut [u8], disk: &SynchDisk) -> usize {
        if offset >= self.size as usize {
            return 0;
        }
        let mut start = offset;
        let end = start.saturating_add(buf.len()).min(self.size as usize);

        if start >= end {
            return 0;
        }

        let mut data: SectorBuf = [0; SECTOR_SIZE];
        // 已读取多少字节
        let mut read_size = 0;
        loop {
            // 当前扇区的末地址(字节)
            let current_sector_end = ((start / SECTOR_SIZE + 1) * SECTOR_SIZE).min(end);
            let sector_read_size = current_sector_end - start;
            let sector = self.byte_to_sector(start, disk);

            disk.begin_read(sector);
            disk.read_sector(sector, &mut data);
            disk.end_read(sector);

            // 绝对地址 % 扇区大小 = 扇区内偏移
            let src = &data[start % SECTOR_SIZE..start % SECTOR_SIZE + sector_read_size];
            buf[read_size..read_size + sector_read_size].copy_from_slice(src);
            read_size += sector_read_size;

            if current_sector_end == end {
                break;
            }
            start = current_sector_end;
        }

        read_size
    }

    /// 从指定位置写入`buf`，不会越过文件末尾，先用 [`DiskInode::extend`] 扩容。
    ///
    /// 每个数据扇区都在其写者令牌的保护下写入，不满一个扇区的部分先读后写。
    pub fn write_at(&self, offset: usize, buf: &[u8], disk: &SynchDisk) -> usize {
        if offset >= self.size as usize {
            return 0;
        }
        let mut start = offset;
        let end = start.saturating_add(buf.len()).min(self.size as usize);

        if start >= end {
            return 0;
        }

        let mut data: SectorBuf = [0; SECTOR_SIZE];
        let mut written_size = 0;
        loop {
            let current_sector_end = ((start / SECTOR_SIZE + 1) * SECTOR_SIZE).min(end);
            let sector_write_size = current_sector_end - start;
            let sector = self.byte_to_sector(start, disk);

            disk.begin_write(sector);
            if sector_write_size < SECTOR_SIZE {
                disk.read_sector(sector, &mut data);
            }
            data[start % SECTOR_SIZE..start % SECTOR_SIZE + sector_write_size]
                .copy_from_slice(&buf[written_size..written_size + sector_write_size]);
            disk.write_sector(sector, &data);
            disk.end_write(sector);

            written_size += sector_write_size;

            if current_sector_end == end {
                break;
            }
            start = current_sector_end;
        }

        written_size
    }

    pub fn fetch_from(disk: &SynchDisk, sector: usize) -> Self {
        let mut inode = Self::default();
        disk.read_sector(sector, inode.as_bytes_mut());
        inode
    }

    pub fn write_back(&self, disk: &SynchDisk, sector: usize) {
        disk.write_sector(sector, self.as_bytes());
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.size as usize
    }

    #[inline]
    pub fn sector_count(&self) -> usize {
        self.sectors as usize
    }

    #[inline]
    pub fn created(&self) -> Timestamp {
        self.created
    }

    #[inline]
    pub fn accessed(&self) -> Timestamp {
        self.accessed
    }

    #[inline]
    pub fn modified(&self) -> Timestamp {
        self.modified
    }

    pub fn touch_accessed(&mut self) {
        self.accessed = Timestamp::now();
    }

    pub fn touch_modified(&mut self) {
        self.modified = Timestamp::now();
    }

    /// 打印扇区索引与文件内容，不可打印的字节以 `\xx` 表示
    pub fn dump(&self, disk: &SynchDisk, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "FileHeader contents:  File size: {}.  File blocks:", self.size)?;
        let data = self.data_sectors(disk);
        let direct = data.len().min(NUM_DIRECT - 1);
        for sector in &data[..direct] {
            write!(out, "{sector} ")?;
        }
        if let Some(indirect) = self.indirect_sector() {
            write!(out, "\nIndirect index: {indirect}\n")?;
            for sector in &data[direct..] {
                write!(out, "{sector} ")?;
            }
        }

        writeln!(out, "\nFile contents:")?;
        let mut buf: SectorBuf = [0; SECTOR_SIZE];
        let mut remaining = self.size as usize;
        for &sector in &data {
            disk.read_sector(sector, &mut buf);
            let len = remaining.min(SECTOR_SIZE);
            for &byte in &buf[..len] {
                if byte.is_ascii_graphic() || byte == b' ' {
                    write!(out, "{}", byte as char)?;
                } else {
                    write!(out, "\\{byte:x}")?;
                }
            }
            remaining -= len;
        }
        writeln!(out)
    }

    /// 计算容纳指定数据量需要多少个**数据扇区**
    #[inline]
    pub fn count_data_sectors(size: usize) -> usize {
        size.div_ceil(SECTOR_SIZE)
    }

    /// 计算容纳指定数据量需要多少个 **数据扇区** 和 **索引块**
    #[inline]
    pub fn count_total_sectors(size: usize) -> usize {
        let data_sectors = Self::count_data_sectors(size);
        data_sectors + usize::from(data_sectors >= NUM_DIRECT)
    }

    /// 按内存布局原样转成字节，整数即小端序（见 [`crate::layout`] 的编译期检查）
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), SECTOR_SIZE) }
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(ptr::from_mut(self).cast(), SECTOR_SIZE) }
    }
}

impl DiskInode {
    #[inline]
    fn indirect_sector_unchecked(&self) -> usize {
        self.direct[NUM_DIRECT - 1] as usize
    }
}

impl IndirectBlock {
    #[inline]
    fn new() -> Self {
        Self([0; INDIRECT_COUNT])
    }

    fn fetch_from(disk: &SynchDisk, sector: usize) -> Self {
        let mut raw: SectorBuf = [0; SECTOR_SIZE];
        disk.read_sector(sector, &mut raw);

        let mut block = Self::new();
        for (slot, chunk) in block.0.iter_mut().zip(raw.chunks_exact(4)) {
            *slot = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        block
    }

    fn write_back(&self, disk: &SynchDisk, sector: usize) {
        let mut raw: SectorBuf = [0; SECTOR_SIZE];
        for (chunk, slot) in raw.chunks_exact_mut(4).zip(self.0) {
            chunk.copy_from_slice(&slot.to_le_bytes());
        }
        disk.write_sector(sector, &raw);
    }
}

/// 位图中的空闲扇区已事先清点过
fn claim(free_map: &mut Bitmap) -> u32 {
    free_map
        .find()
        .expect("free sectors were counted before claiming") as u32
}
