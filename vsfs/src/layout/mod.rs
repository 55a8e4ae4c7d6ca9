//! # 磁盘数据结构层
//!
//! vsfs 的磁盘布局，各区域均按块对齐：
//! 超级块 | 索引节点位图 | 数据块位图 | 索引节点表 | 数据块区域
//!
//! 格式化与挂载都经由 [`Layout::compute`] 推算区域，
//! 挂载时再与超级块中记录的块数逐一核对。

mod super_block;
pub use super_block::SuperBlock;

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::{DiskInode, FileKind, INODE_FIXED_BYTES, Permission};

/// 目录项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::{DirEntry, DirLayout};

use core::ops::Range;

use crate::config::Profile;
use crate::error::{Error, Result};

/// 一段连续的块
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub start: u32,
    pub blocks: u32,
}

impl Region {
    #[inline]
    pub const fn end(&self) -> u32 {
        self.start + self.blocks
    }

    #[inline]
    pub fn range(&self) -> Range<u32> {
        self.start..self.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub profile: Profile,
    pub total_blocks: u32,
    pub inode_count: u32,
    pub inode_bitmap: Region,
    pub data_bitmap: Region,
    pub inode_table: Region,
    /// 数据区，直到设备末尾
    pub data: Region,
}

impl Layout {
    /// 超级块所在的块
    pub const SUPER_BLOCK: u32 = 0;

    /// 由总块数与格式参数推算各区域
    pub fn compute(total_blocks: u32, profile: Profile) -> Result<Self> {
        profile.validate()?;

        let inode_count = profile.inode_count().ok_or(Error::InvalidLayout)?;
        let max_units = profile.bitmap.max_units();
        if inode_count > max_units || total_blocks > max_units {
            log::warn!(
                "{inode_count} inodes / {total_blocks} blocks exceed a {:?} bitmap",
                profile.bitmap
            );
            return Err(Error::InvalidLayout);
        }

        let bits_per_block = profile.bits_per_block();
        let inode_bitmap = Region {
            start: Self::SUPER_BLOCK + 1,
            blocks: inode_count.div_ceil(bits_per_block),
        };
        let data_bitmap = Region {
            start: inode_bitmap.end(),
            blocks: total_blocks.div_ceil(bits_per_block),
        };
        let inode_table = Region {
            start: data_bitmap.end(),
            blocks: inode_count.div_ceil(profile.inodes_per_block()),
        };

        // 数据区至少要放得下根目录块
        let data_start = inode_table
            .start
            .checked_add(inode_table.blocks)
            .ok_or(Error::InvalidLayout)?;
        if total_blocks <= data_start {
            log::warn!(
                "{total_blocks} blocks is smaller than the minimum {}",
                data_start.saturating_add(1)
            );
            return Err(Error::InvalidLayout);
        }
        let data = Region {
            start: data_start,
            blocks: total_blocks - data_start,
        };

        Ok(Self {
            profile,
            total_blocks,
            inode_count,
            inode_bitmap,
            data_bitmap,
            inode_table,
            data,
        })
    }

    /// 重新推算布局，并与超级块中记录的区域核对
    pub fn from_super_block(sb: &SuperBlock) -> Result<Self> {
        let layout = Self::compute(sb.total_blocks, sb.profile)?;
        if layout.inode_count != sb.inode_count
            || layout.inode_bitmap.blocks != sb.inode_bitmap_blocks
            || layout.data_bitmap.blocks != sb.data_bitmap_blocks
            || layout.inode_table.blocks != sb.inode_table_blocks
        {
            log::warn!("super block disagrees with computed layout {layout:?}");
            return Err(Error::InvalidLayout);
        }
        Ok(layout)
    }

    /// 数据区之前的块（超级块、位图、inode 表），格式化时即标记为已用
    #[inline]
    pub const fn metadata_blocks(&self) -> u32 {
        self.data.start
    }

    #[inline]
    pub const fn block_size(&self) -> usize {
        self.profile.block_size as usize
    }

    #[inline]
    pub fn dir_layout(&self) -> DirLayout {
        DirLayout::new(&self.profile)
    }

    /// 布局所允许的最小块数
    pub fn minimum_blocks(profile: Profile) -> Result<u32> {
        profile.validate()?;
        let bits_per_block = profile.bits_per_block();
        let inode_count = profile.inode_count().ok_or(Error::InvalidLayout)?;
        // 超级块 + inode 位图 + inode 表 + 根目录块
        let fixed = (2 + inode_count.div_ceil(bits_per_block))
            .checked_add(inode_count.div_ceil(profile.inodes_per_block()))
            .ok_or(Error::InvalidLayout)?;

        // 数据位图的块数随总块数增长
        let mut data_bitmap_blocks = 1u32;
        let total = loop {
            let total = fixed
                .checked_add(data_bitmap_blocks)
                .ok_or(Error::InvalidLayout)?;
            if total.div_ceil(bits_per_block) <= data_bitmap_blocks {
                break total;
            }
            data_bitmap_blocks += 1;
        };
        Self::compute(total, profile).map(|_| total)
    }
}
