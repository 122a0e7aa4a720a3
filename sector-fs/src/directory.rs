//! # 目录层
//!
//! 目录是定长的目录项表，作为其 inode 的文件内容整体读写。
//! 目录项指向文件或下一级目录的 inode 扇区，于是目录按扇区号组成一棵树；
//! 目录项只会指向新分配的 inode，树中不会出现环。
//!
//! 目录表的容量在创建时固定，满了就不能再添加。

use std::fmt;

use crate::layout::{DirEntry, DiskInode, EntryKind};
use crate::path::Path;
use crate::{Error, Result, SynchDisk};
use crate::{DIRECTORY_SECTOR, NAME_MAX_LEN, NUM_DIR_ENTRIES};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    table: Vec<DirEntry>,
}

impl Directory {
    /// 空目录，`size` 即目录表容量
    pub fn new(size: usize) -> Self {
        Self {
            table: vec![DirEntry::default(); size],
        }
    }

    /// 读入 inode 位于 `sector` 的目录
    pub fn load(disk: &SynchDisk, sector: usize) -> Self {
        let inode = DiskInode::fetch_from(disk, sector);
        let mut dir = Self::new(NUM_DIR_ENTRIES);
        dir.fetch_from(&inode, disk);
        dir
    }

    /// 把目录项所指的 inode 当作目录打开，目录项必须是目录类型
    pub fn open(disk: &SynchDisk, entry: &DirEntry) -> Result<Self> {
        if !entry.is_dir() {
            return Err(Error::NotADirectory);
        }
        Ok(Self::load(disk, entry.sector()))
    }

    /// 目录表在磁盘上占的字节数
    #[inline]
    pub fn file_size(size: usize) -> usize {
        size * DirEntry::SIZE
    }

    pub fn fetch_from(&mut self, file: &DiskInode, disk: &SynchDisk) {
        let mut bytes = vec![0; Self::file_size(self.table.len())];
        assert_eq!(file.read_at(0, &mut bytes, disk), bytes.len());
        for (entry, raw) in self.table.iter_mut().zip(bytes.chunks_exact(DirEntry::SIZE)) {
            entry.as_bytes_mut().copy_from_slice(raw);
        }
    }

    pub fn write_back(&self, file: &DiskInode, disk: &SynchDisk) {
        let bytes: Vec<u8> = self
            .table
            .iter()
            .flat_map(|entry| entry.as_bytes())
            .copied()
            .collect();
        assert_eq!(file.write_at(0, &bytes, disk), bytes.len());
    }

    /// 在本级目录表中按名字查找，返回表中位置
    pub fn find_index(&self, name: &str) -> Option<usize> {
        self.table
            .iter()
            .position(|entry| entry.is_in_use() && entry.name() == name)
    }

    /// 在本级目录表中按名字查找，返回所指 inode 的扇区号
    #[inline]
    pub fn find(&self, name: &str) -> Option<usize> {
        self.entry(name).map(DirEntry::sector)
    }

    pub fn entry(&self, name: &str) -> Option<&DirEntry> {
        self.find_index(name).map(|i| &self.table[i])
    }

    /// 以 `path` 的最后一项为名添加目录项，占用第一个空槽位。
    ///
    /// 同名项已存在、目录表已满时失败，目录表保持原样。
    pub fn add(&mut self, path: &str, sector: usize, kind: EntryKind) -> Result<()> {
        let name = path.file_name();
        if name.is_empty() {
            return Err(Error::InvalidPath);
        }
        if name.len() > NAME_MAX_LEN {
            return Err(Error::NameTooLong);
        }
        if self.find_index(name).is_some() {
            return Err(Error::AlreadyExists);
        }

        let slot = self
            .table
            .iter_mut()
            .find(|entry| !entry.is_in_use())
            .ok_or(Error::DirectoryFull)?;
        *slot = DirEntry::new(name, path.trim_start_matches('/'), sector, kind);

        log::debug!("added {name:?} -> sector {sector}");
        Ok(())
    }

    /// 删除目录项，不负责回收其所指的 inode
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let index = self.find_index(name).ok_or(Error::NotFound)?;
        self.table[index].set_unused();
        log::debug!("removed {name:?}");
        Ok(())
    }

    pub fn entries(&self) -> impl Iterator<Item = &DirEntry> {
        self.table.iter().filter(|entry| entry.is_in_use())
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }

    pub fn has_free_slot(&self) -> bool {
        self.table.iter().any(|entry| !entry.is_in_use())
    }

    /// 递归列出整棵目录树：名字、扇区、类型、路径与三个时间
    pub fn list(&self, disk: &SynchDisk, out: &mut dyn fmt::Write) -> fmt::Result {
        self.walk(disk, out, 0, &mut |_, inode, indent, out| {
            writeln!(out, "{indent}Create time: {}", inode.created())?;
            writeln!(out, "{indent}Last visited time: {}", inode.accessed())?;
            writeln!(out, "{indent}Last modified time: {}", inode.modified())
        })
    }

    /// 递归打印整棵目录树，文件还打印其扇区索引与内容
    pub fn print(&self, disk: &SynchDisk, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "Directory contents:")?;
        self.walk(disk, out, 0, &mut |entry, inode, _, out| {
            if entry.is_dir() {
                Ok(())
            } else {
                inode.dump(disk, out)
            }
        })
    }

    /// 从根目录出发，沿 `path` 除最后一项之外的各项逐级打开目录，
    /// 返回最后一级目录（即 `path` 的父目录）的 inode 扇区
    pub fn resolve_parent_sector(disk: &SynchDisk, path: &str) -> Result<usize> {
        let cmps = path.components()?;
        let mut sector = DIRECTORY_SECTOR;

        for &cmp in &cmps[..cmps.len() - 1] {
            let dir = Self::load(disk, sector);
            let entry = dir.entry(cmp).ok_or(Error::NotFound)?;
            if !entry.is_dir() {
                log::warn!("middle segment {cmp:?} isn't directory");
                return Err(Error::NotADirectory);
            }
            sector = entry.sector();
        }

        Ok(sector)
    }
}

type Visit<'a> =
    dyn FnMut(&DirEntry, &DiskInode, &str, &mut dyn fmt::Write) -> fmt::Result + 'a;

impl Directory {
    fn walk(
        &self,
        disk: &SynchDisk,
        out: &mut dyn fmt::Write,
        depth: usize,
        visit: &mut Visit<'_>,
    ) -> fmt::Result {
        let indent = "  ".repeat(depth);
        for entry in self.entries() {
            let inode = DiskInode::fetch_from(disk, entry.sector());
            writeln!(
                out,
                "\n{indent}Name: {}, Sector: {}, Type: {}, Path: root/{}",
                entry.name(),
                entry.sector(),
                entry.kind().as_str(),
                entry.path()
            )?;
            visit(entry, &inode, &indent, out)?;

            if entry.is_dir() {
                let mut sub = Self::new(NUM_DIR_ENTRIES);
                sub.fetch_from(&inode, disk);
                sub.walk(disk, out, depth + 1, visit)?;
            }
        }
        Ok(())
    }
}
