//! inode 编号与磁盘位置的换算，以及 inode 记录的读写
//!
//! 只负责寻址与编解码，是否已分配由位图决定。

use crate::block_cache::BlockCache;
use crate::error::{Error, Result};
use crate::layout::{DiskInode, Layout};

#[derive(Debug, Clone, Copy)]
pub struct InodeTable {
    /// inode 表的起始块
    start: u32,
    count: u32,
    inode_size: usize,
    inodes_per_block: u32,
    pointers: u32,
}

impl InodeTable {
    pub fn new(layout: &Layout) -> Self {
        Self {
            start: layout.inode_table.start,
            count: layout.inode_count,
            inode_size: layout.profile.inode_size as usize,
            inodes_per_block: layout.profile.inodes_per_block(),
            pointers: layout.profile.direct_pointers,
        }
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// 每个 inode 的直接索引数
    #[inline]
    pub fn pointers(&self) -> u32 {
        self.pointers
    }

    /// 通过编号获取 inode 在磁盘上的位置：**块ID**以及**块内偏移**
    pub fn pos(&self, ino: u32) -> Result<(u32, usize)> {
        if ino >= self.count {
            return Err(Error::OutOfRange(ino));
        }
        let block_id = self.start + ino / self.inodes_per_block;
        let block_offset = (ino % self.inodes_per_block) as usize * self.inode_size;
        Ok((block_id, block_offset))
    }

    pub fn read(&self, cache: &mut BlockCache, ino: u32) -> Result<DiskInode> {
        let (block_id, offset) = self.pos(ino)?;
        cache.map(block_id, |data| {
            DiskInode::decode(&data[offset..offset + self.inode_size], self.pointers)
        })
    }

    pub fn write(&self, cache: &mut BlockCache, ino: u32, inode: &DiskInode) -> Result<()> {
        let (block_id, offset) = self.pos(ino)?;
        cache.map_mut(block_id, |data| {
            inode.encode(&mut data[offset..offset + self.inode_size], self.pointers)
        })
    }
}
