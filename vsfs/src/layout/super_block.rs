use crate::MAGIC;
use crate::ROOT_INO;
use crate::codec::{Reader, Writer};
use crate::config::{BitmapKind, Profile};
use crate::error::{Error, Result};
use crate::layout::Layout;

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 定位其它连续区域；
/// - 记录空闲 inode 与空闲块的计数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    /// 魔数：用于校验文件系统合法性
    magic: u32,
    /// 文件系统占据块数
    pub total_blocks: u32,
    pub inode_count: u32,
    pub free_inodes: u32,
    pub free_blocks: u32,
    pub inode_bitmap_blocks: u32,
    pub data_bitmap_blocks: u32,
    pub inode_table_blocks: u32,
    pub root_ino: u32,
    /// 格式参数，挂载时据此还原布局
    pub profile: Profile,
}

impl SuperBlock {
    /// 磁盘上的字节数，块内其余部分填0
    pub const SIZE: usize = 14 * 4;

    /// 刚格式化时的超级块：只有保留 inode、根目录以及元数据块被占用
    pub fn new(layout: &Layout) -> Self {
        Self {
            magic: MAGIC,
            total_blocks: layout.total_blocks,
            inode_count: layout.inode_count,
            free_inodes: layout.inode_count - (ROOT_INO + 1),
            free_blocks: layout.total_blocks - layout.metadata_blocks() - 1,
            inode_bitmap_blocks: layout.inode_bitmap.blocks,
            data_bitmap_blocks: layout.data_bitmap.blocks,
            inode_table_blocks: layout.inode_table.blocks,
            root_ino: ROOT_INO,
            profile: layout.profile,
        }
    }

    /// 先校验魔数，再解释其余字段
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(buf);
        let magic = reader.u32();
        if magic != MAGIC {
            return Err(Error::BadMagic(magic));
        }

        let total_blocks = reader.u32();
        let inode_count = reader.u32();
        let free_inodes = reader.u32();
        let free_blocks = reader.u32();
        let inode_bitmap_blocks = reader.u32();
        let data_bitmap_blocks = reader.u32();
        let inode_table_blocks = reader.u32();
        let block_size = reader.u32();
        let direct_pointers = reader.u32();
        let inode_size = reader.u32();
        let name_len = reader.u32();
        let bitmap = BitmapKind::from_raw(reader.u32()).ok_or(Error::InvalidLayout)?;
        let root_ino = reader.u32();
        if root_ino != ROOT_INO {
            return Err(Error::InvalidLayout);
        }

        Ok(Self {
            magic,
            total_blocks,
            inode_count,
            free_inodes,
            free_blocks,
            inode_bitmap_blocks,
            data_bitmap_blocks,
            inode_table_blocks,
            root_ino,
            profile: Profile {
                block_size,
                direct_pointers,
                inode_size,
                name_len,
                inode_table_blocks,
                bitmap,
            },
        })
    }

    pub fn encode(&self, buf: &mut [u8]) {
        let profile = &self.profile;
        Writer::new(buf)
            .u32(self.magic)
            .u32(self.total_blocks)
            .u32(self.inode_count)
            .u32(self.free_inodes)
            .u32(self.free_blocks)
            .u32(self.inode_bitmap_blocks)
            .u32(self.data_bitmap_blocks)
            .u32(self.inode_table_blocks)
            .u32(profile.block_size)
            .u32(profile.direct_pointers)
            .u32(profile.inode_size)
            .u32(profile.name_len)
            .u32(profile.bitmap as u32)
            .u32(self.root_ino)
            .zero_rest();
    }
}
