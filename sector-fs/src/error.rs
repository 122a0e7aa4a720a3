use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 空闲扇区不足
    NoSpace,
    /// 超出单个文件的索引容量
    FileTooLarge,
    /// 目录表已满，且目录表不会扩容
    DirectoryFull,
    AlreadyExists,
    NotFound,
    NotADirectory,
    IsADirectory,
    DirectoryNotEmpty,
    NameTooLong,
    InvalidPath,
    /// 文件仍被打开
    Busy,
    /// 磁盘上没有本文件系统的位图文件
    NotFormatted,
}

pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::NoSpace => "not enough free sectors",
            Self::FileTooLarge => "file too large",
            Self::DirectoryFull => "directory full",
            Self::AlreadyExists => "already exists",
            Self::NotFound => "not found",
            Self::NotADirectory => "not a directory",
            Self::IsADirectory => "is a directory",
            Self::DirectoryNotEmpty => "directory not empty",
            Self::NameTooLong => "name too long",
            Self::InvalidPath => "invalid path",
            Self::Busy => "file is open",
            Self::NotFormatted => "disk is not formatted",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for Error {}
