use block_dev::BlockError;
use derive_more::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Error {
    #[display(fmt = "bad magic number {:#x}", _0)]
    BadMagic(u32),
    #[display(fmt = "invalid partition layout")]
    InvalidLayout,
    #[display(fmt = "no space left on device")]
    NoSpace,
    #[display(fmt = "inode {} out of range", _0)]
    OutOfRange(u32),
    #[display(fmt = "bad inode {}", _0)]
    BadInode(u32),
    #[display(fmt = "file name too long")]
    NameTooLong,
    #[display(fmt = "invalid file name")]
    InvalidName,
    /// 目录块的槽位已满，即 "too many links"
    #[display(fmt = "too many links")]
    DirFull,
    #[display(fmt = "no such file or directory")]
    NotFound,
    #[display(fmt = "file exists")]
    AlreadyExists,
    #[display(fmt = "not a directory")]
    NotADirectory,
    #[display(fmt = "is a directory")]
    IsADirectory,
    #[display(fmt = "directory not empty")]
    DirectoryNotEmpty,
    #[display(fmt = "file too large")]
    FileTooBig,
    /// 释放了未分配的单元
    #[display(fmt = "unit {} is already free", _0)]
    AlreadyFree(u32),
    #[display(fmt = "I/O error: {}", _0)]
    Io(BlockError),
}

impl core::error::Error for Error {}

impl From<BlockError> for Error {
    #[inline]
    fn from(err: BlockError) -> Self {
        Self::Io(err)
    }
}

pub type Result<T> = core::result::Result<T, Error>;

pub type FormatError = Error;
pub type MountError = Error;
pub type LookupError = Error;
pub type CreateError = Error;
pub type UnlinkError = Error;
pub type WriteError = Error;
