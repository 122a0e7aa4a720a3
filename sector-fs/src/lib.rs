/* sector-fs 的整体架构，自上而下 */

// 文件系统层：格式化、挂载，按路径创建、打开、删除文件与目录
mod fs;
pub use fs::{FileSystem, Stat, StatKind};

// 打开文件层：带读写位置的文件句柄
mod open_file;
pub use open_file::OpenFile;

// 目录层：定长目录表与路径解析
mod directory;
pub use directory::Directory;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
pub mod layout;

// 同步磁盘层：在异步磁盘上提供同步读写、扇区缓存与扇区读写控制
mod synch_disk;
pub use synch_disk::SynchDisk;

// 同步原语：信号量与会睡眠的互斥锁
pub mod sync;

mod error;
pub use error::{Error, Result};

mod path;

pub use block_dev::SECTOR_SIZE;

/// 一个格式化后的磁盘上的扇区数：32 道，每道 32 扇区
pub const NUM_SECTORS: usize = 32 * 32;
/// 扇区缓存的行数
pub const CACHE_SIZE: usize = 4;

/// inode 中的直接索引个数，最后一个在需要时改作间接索引块的扇区号
pub const NUM_DIRECT: usize = 10;
/// 间接索引块可容纳的扇区号个数
pub const INDIRECT_COUNT: usize = SECTOR_SIZE / 4;
/// 单个文件最多占用的数据扇区数
pub const MAX_FILE_SECTORS: usize = NUM_DIRECT - 1 + INDIRECT_COUNT;
pub const MAX_FILE_SIZE: usize = MAX_FILE_SECTORS * SECTOR_SIZE;

/// 每个目录表的项数
pub const NUM_DIR_ENTRIES: usize = 10;
/// 文件名的最大字节数
pub const NAME_MAX_LEN: usize = 9;
/// 目录项中保存的路径的最大字节数
pub const PATH_MAX_LEN: usize = 31;

/// 空闲位图文件的 inode 所在扇区
pub const FREE_MAP_SECTOR: usize = 0;
/// 根目录的 inode 所在扇区
pub const DIRECTORY_SECTOR: usize = 1;

type SectorBuf = [u8; SECTOR_SIZE];
