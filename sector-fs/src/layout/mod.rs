//! # 磁盘数据结构层
//!
//! 格式化后的磁盘布局：
//! 扇区0 位图文件 inode | 扇区1 根目录 inode | 扇区2 位图数据 | 扇区3..=6 根目录表 | 数据
//!
//! 磁盘上的整数一律为小端 `u32`。
//! inode 按 `repr(C)` 原样读写，只能在小端机器上编译。

#[cfg(not(target_endian = "little"))]
compile_error!("sector-fs reads inodes in place and requires a little-endian target");

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::DiskInode;

/// 目录项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::{DirEntry, EntryKind};

mod timestamp;
pub use timestamp::Timestamp;
