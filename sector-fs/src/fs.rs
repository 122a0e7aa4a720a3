//! # 文件系统层
//!
//! 把各层组装起来：格式化与挂载磁盘，按路径创建、打开、删除文件与目录。
//!
//! 磁盘布局：
//!
//! | 扇区 | 内容 |
//! |---|---|
//! | 0 | 空闲位图文件的 inode |
//! | 1 | 根目录的 inode |
//! | 其余 | 按位图分配的 inode、数据与间接索引块 |
//!
//! 所有名字空间操作以及每一次分配、扩展、回收都在位图锁下进行，
//! 位图锁之后才去碰目录表与数据扇区。

use std::fmt;
use std::sync::Arc;

use enumflags2::bitflags;

use crate::directory::Directory;
use crate::layout::{Bitmap, DirEntry, DiskInode, EntryKind, Timestamp};
use crate::path::Path;
use crate::sync::{BlockMutex, BlockMutexGuard};
use crate::{Error, OpenFile, Result, SynchDisk};
use crate::{DIRECTORY_SECTOR, FREE_MAP_SECTOR, NUM_DIR_ENTRIES, SECTOR_SIZE};

pub struct FileSystem {
    disk: Arc<SynchDisk>,
    free_map: Arc<FreeMap>,
}

/// 空闲位图及其所在的文件
pub(crate) struct FreeMap {
    disk: Arc<SynchDisk>,
    /// 位图文件的 inode，格式化后长度不再改变
    file: DiskInode,
    bitmap: BlockMutex<Bitmap>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    /// inode 所在扇区
    pub sector: usize,
    pub kind: StatKind,
    pub size: usize,
    /// 数据扇区数
    pub sectors: usize,
    pub created: Timestamp,
    pub accessed: Timestamp,
    pub modified: Timestamp,
}

#[allow(clippy::upper_case_acronyms)]
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatKind {
    DIR = 0o040000,
    #[default]
    FILE = 0o100000,
}

impl FileSystem {
    /// 把整个磁盘格式化为只含一个空根目录的文件系统
    pub fn format(disk: Arc<SynchDisk>) -> Result<Self> {
        let num_sectors = disk.num_sectors();

        // 先清空整个磁盘，空闲扇区在盘上总是全零
        for sector in 0..num_sectors {
            disk.write_sector(sector, &[0; SECTOR_SIZE]);
        }

        let mut bitmap = Bitmap::new(num_sectors);
        bitmap.mark(FREE_MAP_SECTOR);
        bitmap.mark(DIRECTORY_SECTOR);

        let mut map_file = DiskInode::default();
        map_file.allocate(&mut bitmap, Bitmap::file_size(num_sectors), &disk)?;
        let mut dir_file = DiskInode::default();
        dir_file.allocate(&mut bitmap, Directory::file_size(NUM_DIR_ENTRIES), &disk)?;

        map_file.write_back(&disk, FREE_MAP_SECTOR);
        dir_file.write_back(&disk, DIRECTORY_SECTOR);

        Directory::new(NUM_DIR_ENTRIES).write_back(&dir_file, &disk);
        bitmap.write_back(&map_file, &disk);

        log::info!(
            "formatted {num_sectors} sectors, {} free",
            bitmap.count_clear()
        );

        Ok(Self::assemble(disk, map_file, bitmap))
    }

    /// 挂载已格式化的磁盘，读入空闲位图
    ///
    /// 位图文件长度与扇区数对不上时视为未格式化。
    pub fn mount(disk: Arc<SynchDisk>) -> Result<Self> {
        let num_sectors = disk.num_sectors();
        let map_file = DiskInode::fetch_from(&disk, FREE_MAP_SECTOR);
        if map_file.length() != Bitmap::file_size(num_sectors) {
            log::warn!(
                "free map file is {} bytes, expected {}",
                map_file.length(),
                Bitmap::file_size(num_sectors)
            );
            return Err(Error::NotFormatted);
        }

        let mut bitmap = Bitmap::new(num_sectors);
        bitmap.fetch_from(&map_file, &disk);

        log::info!(
            "mounted {num_sectors} sectors, {} free",
            bitmap.count_clear()
        );

        Ok(Self::assemble(disk, map_file, bitmap))
    }

    /// 创建初始长度为 `size` 字节的文件
    pub fn create(&self, path: &str, size: usize) -> Result<()> {
        self.create_entry(path, size, EntryKind::File)
    }

    /// 创建空目录
    pub fn mkdir(&self, path: &str) -> Result<()> {
        self.create_entry(path, Directory::file_size(NUM_DIR_ENTRIES), EntryKind::Directory)
    }

    pub fn open(&self, path: &str) -> Result<OpenFile> {
        let _bitmap = self.free_map.lock();
        let entry = self.lookup(path)?;
        if entry.is_dir() {
            return Err(Error::IsADirectory);
        }

        log::debug!("open {path:?} at sector {}", entry.sector());
        Ok(OpenFile::new(
            self.disk.clone(),
            self.free_map.clone(),
            entry.sector(),
        ))
    }

    /// 删除文件或空目录，归还其 inode 扇区与全部数据扇区。
    ///
    /// 文件仍被打开时拒绝删除。
    pub fn remove(&self, path: &str) -> Result<()> {
        let mut bitmap = self.free_map.lock();

        let parent_sector = Directory::resolve_parent_sector(&self.disk, path)?;
        let parent_file = DiskInode::fetch_from(&self.disk, parent_sector);
        let mut parent = Directory::new(NUM_DIR_ENTRIES);
        parent.fetch_from(&parent_file, &self.disk);

        let name = path.file_name();
        let entry = parent.entry(name).cloned().ok_or(Error::NotFound)?;
        let sector = entry.sector();

        if self.disk.visitors(sector) > 0 {
            log::warn!("cannot remove {path:?}: still open");
            return Err(Error::Busy);
        }
        if entry.is_dir() && !Directory::open(&self.disk, &entry)?.is_empty() {
            log::warn!("cannot remove {path:?}: directory not empty");
            return Err(Error::DirectoryNotEmpty);
        }

        let file = DiskInode::fetch_from(&self.disk, sector);
        file.deallocate(&mut bitmap, &self.disk);
        self.disk.write_sector(sector, &[0; SECTOR_SIZE]);
        bitmap.clear(sector);

        parent.remove(name)?;
        parent.write_back(&parent_file, &self.disk);
        self.free_map.write_back(&bitmap);

        log::debug!("removed {path:?}, {} sectors free", bitmap.count_clear());
        Ok(())
    }

    pub fn stat(&self, path: &str) -> Result<Stat> {
        let entry = {
            let _bitmap = self.free_map.lock();
            self.lookup(path)?
        };

        let sector = entry.sector();
        self.disk.begin_read(sector);
        let file = DiskInode::fetch_from(&self.disk, sector);
        self.disk.end_read(sector);

        Ok(Stat {
            sector,
            kind: entry.kind().into(),
            size: file.length(),
            sectors: file.sector_count(),
            created: file.created(),
            accessed: file.accessed(),
            modified: file.modified(),
        })
    }

    /// 列出整棵目录树
    pub fn list(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let _bitmap = self.free_map.lock();
        Directory::load(&self.disk, DIRECTORY_SECTOR).list(&self.disk, out)
    }

    /// 打印位图与整棵目录树，连同每个文件的内容
    pub fn print(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let bitmap = self.free_map.lock();

        writeln!(out, "Bit map file header:")?;
        self.free_map.file.dump(&self.disk, out)?;
        writeln!(out, "Directory file header:")?;
        DiskInode::fetch_from(&self.disk, DIRECTORY_SECTOR).dump(&self.disk, out)?;

        writeln!(out, "Bitmap set:")?;
        for sector in (0..bitmap.capacity()).filter(|&s| bitmap.test(s)) {
            write!(out, "{sector}, ")?;
        }
        writeln!(out)?;

        Directory::load(&self.disk, DIRECTORY_SECTOR).print(&self.disk, out)
    }

    pub fn free_sectors(&self) -> usize {
        self.free_map.lock().count_clear()
    }

    #[inline]
    pub fn disk(&self) -> &Arc<SynchDisk> {
        &self.disk
    }
}

impl FileSystem {
    fn assemble(disk: Arc<SynchDisk>, map_file: DiskInode, bitmap: Bitmap) -> Self {
        let free_map = Arc::new(FreeMap {
            disk: disk.clone(),
            file: map_file,
            bitmap: BlockMutex::new(bitmap),
        });
        Self { disk, free_map }
    }

    /// 调用者持有位图锁
    fn lookup(&self, path: &str) -> Result<DirEntry> {
        let parent_sector = Directory::resolve_parent_sector(&self.disk, path)?;
        Directory::load(&self.disk, parent_sector)
            .entry(path.file_name())
            .cloned()
            .ok_or(Error::NotFound)
    }

    /// 在父目录中添加新项并分配其 inode 与数据扇区。
    ///
    /// 一切检查都在写盘之前完成：失败时位图与目录保持原样。
    fn create_entry(&self, path: &str, size: usize, kind: EntryKind) -> Result<()> {
        let mut guard = self.free_map.lock();

        let parent_sector = Directory::resolve_parent_sector(&self.disk, path)?;
        let parent_file = DiskInode::fetch_from(&self.disk, parent_sector);
        let mut parent = Directory::new(NUM_DIR_ENTRIES);
        parent.fetch_from(&parent_file, &self.disk);

        // 在副本上分配，全部成功后才提交
        let mut bitmap = (*guard).clone();
        let sector = bitmap.find().ok_or(Error::NoSpace)?;
        if let Err(err) = parent.add(path, sector, kind) {
            log::warn!("cannot create {path:?}: {err}");
            return Err(err);
        }

        let mut file = DiskInode::default();
        if let Err(err) = file.allocate(&mut bitmap, size, &self.disk) {
            log::warn!("cannot create {path:?}: {err}");
            return Err(err);
        }

        file.write_back(&self.disk, sector);
        if kind == EntryKind::Directory {
            Directory::new(NUM_DIR_ENTRIES).write_back(&file, &self.disk);
        }
        parent.write_back(&parent_file, &self.disk);
        self.free_map.write_back(&bitmap);
        *guard = bitmap;

        log::debug!("created {} {path:?} at sector {sector}", kind.as_str());
        Ok(())
    }
}

impl FreeMap {
    #[inline]
    pub(crate) fn lock(&self) -> BlockMutexGuard<'_, Bitmap> {
        self.bitmap.lock()
    }

    /// 调用者持有位图锁
    pub(crate) fn write_back(&self, bitmap: &Bitmap) {
        bitmap.write_back(&self.file, &self.disk);
    }
}

impl From<EntryKind> for StatKind {
    fn from(kind: EntryKind) -> Self {
        match kind {
            EntryKind::File => Self::FILE,
            EntryKind::Directory => Self::DIR,
        }
    }
}
