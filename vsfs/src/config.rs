//! 格式参数与挂载参数
//!
//! 不同的磁盘格式只在直接索引数、inode 大小与位图形式上有差别，
//! 统一由 [`Profile`] 描述，格式化时写入超级块，挂载时从超级块还原。

use crate::error::{Error, Result};
use crate::layout::INODE_FIXED_BYTES;
use crate::{FIRST_INO, MAX_DIRECT_POINTERS};

/// 位图的存储形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BitmapKind {
    /// 单个64位字，最多记录64个单元
    Word = 0,
    /// 一到多个整块
    Blocks = 1,
}

impl BitmapKind {
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Word),
            1 => Some(Self::Blocks),
            _ => None,
        }
    }

    /// 位图所能记录的单元数上限
    pub const fn max_units(self) -> u32 {
        match self {
            Self::Word => u64::BITS,
            Self::Blocks => u32::MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    /// 块大小（字节）
    pub block_size: u32,
    /// 每个 inode 的直接索引数
    pub direct_pointers: u32,
    /// inode 记录的大小（字节），含填充
    pub inode_size: u32,
    /// 文件名的最大长度（字节）
    pub name_len: u32,
    /// inode 表占用的块数
    pub inode_table_blocks: u32,
    pub bitmap: BitmapKind,
}

impl Profile {
    /// 最小格式：4 KiB 块、单个直接索引、256 字节的 inode，
    /// 每个目录 64 项，位图均为单个64位字。
    pub const fn minimal() -> Self {
        Self {
            block_size: 4096,
            direct_pointers: 1,
            inode_size: 256,
            name_len: 60,
            inode_table_blocks: 4,
            bitmap: BitmapKind::Word,
        }
    }

    /// 扩展格式：12 个直接索引、128 字节的 inode，位图按整块存放。
    pub const fn extended(block_size: u32) -> Self {
        Self {
            block_size,
            direct_pointers: MAX_DIRECT_POINTERS as u32,
            inode_size: 128,
            name_len: 28,
            inode_table_blocks: 4,
            bitmap: BitmapKind::Blocks,
        }
    }

    #[inline]
    pub const fn inodes_per_block(&self) -> u32 {
        self.block_size / self.inode_size
    }

    #[inline]
    pub const fn bits_per_block(&self) -> u32 {
        self.block_size * 8
    }

    /// 目录项大小：inode 编号 + 定长文件名
    #[inline]
    pub const fn dir_entry_size(&self) -> u32 {
        4 + self.name_len
    }

    /// 单个目录块能容纳的目录项数
    #[inline]
    pub const fn dir_capacity(&self) -> u32 {
        self.block_size / self.dir_entry_size()
    }

    /// inode 总数；来自磁盘的参数可能溢出
    #[inline]
    pub const fn inode_count(&self) -> Option<u32> {
        self.inode_table_blocks.checked_mul(self.inodes_per_block())
    }

    #[inline]
    pub const fn max_file_size(&self) -> u64 {
        self.direct_pointers as u64 * self.block_size as u64
    }

    pub fn validate(&self) -> Result<()> {
        let Self {
            block_size,
            direct_pointers,
            inode_size,
            name_len,
            inode_table_blocks,
            bitmap: _,
        } = *self;

        let ok = block_size.is_power_of_two()
            && (512..=65536).contains(&block_size)
            && (1..=MAX_DIRECT_POINTERS as u32).contains(&direct_pointers)
            && inode_size % 4 == 0
            && inode_size >= INODE_FIXED_BYTES + 4 * direct_pointers
            && block_size % inode_size == 0
            && (2..block_size).contains(&name_len)
            // "." 与 ".." 之外至少还要有一个槽位
            && self.dir_capacity() > 2
            && inode_table_blocks > 0
            && self.inode_count().is_some_and(|count| count > FIRST_INO);

        if ok {
            Ok(())
        } else {
            log::warn!("rejected profile {self:?}");
            Err(Error::InvalidLayout)
        }
    }
}

/// 挂载参数
#[derive(Debug, Clone, Copy)]
pub struct MountOptions {
    /// 新建 inode 的属主
    pub uid: u32,
    pub gid: u32,
    /// 时间戳来源（秒）
    pub clock: fn() -> u32,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            uid: 0,
            gid: 0,
            clock: || 0,
        }
    }
}

impl MountOptions {
    #[inline]
    pub fn now(&self) -> u32 {
        (self.clock)()
    }
}
