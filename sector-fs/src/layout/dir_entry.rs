use std::{ptr, slice};

use crate::{NAME_MAX_LEN, PATH_MAX_LEN};

/// 目录表中的一项
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[repr(C)]
pub struct DirEntry {
    /// 所指 inode 的扇区号
    sector: u32,
    in_use: u8,
    kind: u8,
    // 最后一字节留给 \0
    name: [u8; NAME_MAX_LEN + 1],
    /// 创建时给出的完整路径，仅用于显示
    path: [u8; PATH_MAX_LEN + 1],
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryKind {
    #[default]
    File = 0,
    Directory = 1,
}

impl DirEntry {
    /// 目录项大小恒为48字节
    pub const SIZE: usize = 48;

    /// `name` 不得超过 [`NAME_MAX_LEN`] 字节；
    /// `path` 超过 [`PATH_MAX_LEN`] 字节的部分在字符边界处截断。
    pub fn new(name: &str, path: &str, sector: usize, kind: EntryKind) -> Self {
        assert!(name.len() <= NAME_MAX_LEN, "name {name:?} too long");

        Self {
            sector: sector as u32,
            in_use: 1,
            kind: kind as u8,
            name: padded(name),
            path: padded(truncate(path, PATH_MAX_LEN)),
        }
    }

    pub fn name(&self) -> &str {
        unpadded(&self.name)
    }

    pub fn path(&self) -> &str {
        unpadded(&self.path)
    }

    #[inline]
    pub fn sector(&self) -> usize {
        self.sector as usize
    }

    #[inline]
    pub fn kind(&self) -> EntryKind {
        match self.kind {
            1 => EntryKind::Directory,
            _ => EntryKind::File,
        }
    }

    #[inline]
    pub fn is_in_use(&self) -> bool {
        self.in_use != 0
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind() == EntryKind::Directory
    }

    #[inline]
    pub fn set_unused(&mut self) {
        self.in_use = 0;
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), Self::SIZE) }
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(ptr::from_mut(self).cast(), Self::SIZE) }
    }
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
        }
    }
}

const _: () = assert!(std::mem::size_of::<DirEntry>() == DirEntry::SIZE);

fn padded<const N: usize>(s: &str) -> [u8; N] {
    let bytes = s.as_bytes();
    let mut raw = [0; N];
    raw[..bytes.len()].copy_from_slice(bytes);
    raw
}

fn unpadded(raw: &[u8]) -> &str {
    let len = raw.iter().position(|&c| c == 0).unwrap_or(raw.len());
    core::str::from_utf8(&raw[..len]).unwrap_or_default()
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
