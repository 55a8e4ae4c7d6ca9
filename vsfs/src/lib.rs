#![no_std]

extern crate alloc;
#[cfg(test)]
extern crate std;

/* vsfs 的整体架构，自上而下 */

// 会话层：挂载后的文件系统实例，对外提供目录、文件操作
mod session;

// 文件系统层：位图、inode 表、块缓存的持有者，负责格式化、挂载与同步
mod fs;

// inode 表：inode 编号与磁盘位置的换算
mod inode_table;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
pub mod layout;

// 块缓存层：内存上的磁盘块数据缓存
mod block_cache;

mod codec;
mod config;
mod error;

pub use block_dev::{BlockDevice, BlockError};

pub use self::{
    config::{BitmapKind, MountOptions, Profile},
    error::{CreateError, Error, FormatError, LookupError, MountError, Result, UnlinkError, WriteError},
    layout::{FileKind, Layout, Permission},
    session::{FsStat, ReadDir, Session, format, format_with, mount},
};

pub const MAGIC: u32 = 0x1234_5678;
/// 根目录的 inode 编号
pub const ROOT_INO: u32 = 2;
/// 首个可分配的 inode 编号，0 与 1 保留
pub const FIRST_INO: u32 = 3;
/// 每个 inode 至多拥有的直接索引数
pub const MAX_DIRECT_POINTERS: usize = 12;
