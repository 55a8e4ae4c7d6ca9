//! # 磁盘块管理器层
//!
//! 构建出磁盘的布局并使用：持有两张位图、inode 表与块缓存。
//!
//! 位图只在挂载时从磁盘读取一次，之后的分配与释放都只改动内存中的副本，
//! 直到 [`FileSystem::sync`] 才按 超级块、inode 位图、数据块位图 的顺序写回。

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use block_dev::BlockDevice;

use crate::block_cache::BlockCache;
use crate::config::{MountOptions, Profile};
use crate::error::{Error, Result};
use crate::inode_table::InodeTable;
use crate::layout::{Bitmap, DirLayout, DiskInode, FileKind, Layout, Region, SuperBlock};
use crate::{FIRST_INO, ROOT_INO};

pub struct FileSystem {
    layout: Layout,
    inode_bitmap: Bitmap,
    data_bitmap: Bitmap,
    inodes: InodeTable,
    cache: BlockCache,
    options: MountOptions,
    /// 位图或计数在上次同步后有改动
    dirty: bool,
}

impl FileSystem {
    /// 格式化设备的前 `total_blocks` 块，并返回挂载好的实例
    pub fn format(
        device: Arc<dyn BlockDevice>,
        total_blocks: u32,
        profile: Profile,
        options: MountOptions,
    ) -> Result<Self> {
        let layout = Layout::compute(total_blocks, profile)?;
        check_device(device.as_ref(), &layout)?;

        let mut fs = Self {
            inode_bitmap: Bitmap::with_reserved(layout.inode_count, FIRST_INO),
            data_bitmap: Bitmap::with_reserved(layout.total_blocks, layout.metadata_blocks()),
            inodes: InodeTable::new(&layout),
            cache: BlockCache::new(device, layout.block_size()),
            layout,
            options,
            dirty: true,
        };

        // 整张 inode 表清零，未分配的 inode 都是全0记录
        for block_id in layout.inode_table.range() {
            fs.cache.zeroize(block_id);
        }

        // 根目录：保留的 inode 编号 + 数据区的第一块
        let root_block = fs.alloc_data()?;
        let dir_layout = fs.dir_layout();
        fs.cache
            .map_mut(root_block, |block| dir_layout.init(block, ROOT_INO, ROOT_INO))?;

        let now = options.now();
        let kind = FileKind::Directory;
        let mut root = DiskInode::new(kind, kind.default_perm(), options.uid, options.gid, now);
        root.size = profile.block_size;
        root.map_block(0, root_block);
        fs.write_inode(ROOT_INO, &root)?;

        fs.sync()?;
        log::info!(
            "formatted {total_blocks} blocks: {} inodes, data region {:?}",
            layout.inode_count,
            layout.data
        );
        Ok(fs)
    }

    /// 读取超级块、校验魔数并载入两张位图
    pub fn open(device: Arc<dyn BlockDevice>, options: MountOptions) -> Result<Self> {
        if device.block_size() < SuperBlock::SIZE {
            return Err(Error::InvalidLayout);
        }
        let mut buf = vec![0; device.block_size()];
        device.read_block(Layout::SUPER_BLOCK as usize, &mut buf)?;
        let sb = SuperBlock::decode(&buf)?;
        let layout = Layout::from_super_block(&sb)?;
        check_device(device.as_ref(), &layout)?;

        let mut cache = BlockCache::new(device, layout.block_size());
        let inode_bitmap = Bitmap::load(
            &read_region(&mut cache, layout.inode_bitmap)?,
            layout.inode_count,
        );
        let data_bitmap = Bitmap::load(
            &read_region(&mut cache, layout.data_bitmap)?,
            layout.total_blocks,
        );

        // 保留的 inode 与元数据块必须已被标记，否则会被当作空闲单元分配出去
        if let Some(ino) = (0..FIRST_INO).find(|&ino| !inode_bitmap.is_allocated(ino)) {
            log::warn!("reserved inode {ino} is marked free");
            return Err(Error::BadInode(ino));
        }
        if let Some(block_id) =
            (0..layout.metadata_blocks()).find(|&block_id| !data_bitmap.is_allocated(block_id))
        {
            log::warn!("metadata block {block_id} is marked free");
            return Err(Error::InvalidLayout);
        }

        // 以位图为准
        let mut dirty = false;
        if sb.free_inodes != inode_bitmap.free() || sb.free_blocks != data_bitmap.free() {
            log::warn!(
                "super block counts {}/{} free inodes/blocks, bitmaps say {}/{}",
                sb.free_inodes,
                sb.free_blocks,
                inode_bitmap.free(),
                data_bitmap.free()
            );
            dirty = true;
        }

        let mut fs = Self {
            inodes: InodeTable::new(&layout),
            layout,
            inode_bitmap,
            data_bitmap,
            cache,
            options,
            dirty,
        };

        let root = fs.read_inode(ROOT_INO)?;
        let root_block = root.block_for(0, fs.pointers())?;
        let mapped = root_block.is_some_and(|block| fs.data_bitmap.is_allocated(block));
        if !root.is_dir() || !mapped {
            log::warn!("root inode is not a directory: {root:?}");
            return Err(Error::BadInode(ROOT_INO));
        }

        log::info!(
            "mounted {} blocks, {} free blocks, {} free inodes",
            layout.total_blocks,
            fs.data_bitmap.free(),
            fs.inode_bitmap.free()
        );
        Ok(fs)
    }

    #[inline]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    #[inline]
    pub fn options(&self) -> &MountOptions {
        &self.options
    }

    #[inline]
    pub fn dir_layout(&self) -> DirLayout {
        self.layout.dir_layout()
    }

    /// 每个 inode 的直接索引数
    #[inline]
    pub fn pointers(&self) -> u32 {
        self.inodes.pointers()
    }

    #[inline]
    pub fn free_inodes(&self) -> u32 {
        self.inode_bitmap.free()
    }

    #[inline]
    pub fn free_blocks(&self) -> u32 {
        self.data_bitmap.free()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty || self.cache.dirty_blocks() > 0
    }

    /// 分配新的 inode 并返回其编号
    pub fn alloc_inode(&mut self) -> Result<u32> {
        let ino = self.inode_bitmap.alloc().ok_or(Error::NoSpace)?;
        self.dirty = true;
        if ino < FIRST_INO {
            return Err(Error::BadInode(ino));
        }
        log::debug!("alloc inode {ino}");
        Ok(ino)
    }

    /// 释放 inode，并将其记录清零
    pub fn dealloc_inode(&mut self, ino: u32) -> Result<()> {
        if ino < FIRST_INO {
            return Err(Error::BadInode(ino));
        }
        self.inode_bitmap.dealloc(ino)?;
        self.dirty = true;
        self.inodes.write(&mut self.cache, ino, &DiskInode::default())?;
        log::debug!("dealloc inode {ino}");
        Ok(())
    }

    /// 分配新的数据块并返回其块号，块内容为0
    pub fn alloc_data(&mut self) -> Result<u32> {
        let block_id = self.data_bitmap.alloc().ok_or(Error::NoSpace)?;
        self.dirty = true;
        if !self.layout.data.range().contains(&block_id) {
            return Err(Error::OutOfRange(block_id));
        }
        self.cache.zeroize(block_id);
        log::debug!("alloc block {block_id}");
        Ok(block_id)
    }

    pub fn dealloc_data(&mut self, block_id: u32) -> Result<()> {
        if !self.layout.data.range().contains(&block_id) {
            return Err(Error::OutOfRange(block_id));
        }
        self.data_bitmap.dealloc(block_id)?;
        self.dirty = true;
        log::debug!("dealloc block {block_id}");
        Ok(())
    }

    /// 读取已分配的 inode
    pub fn read_inode(&mut self, ino: u32) -> Result<DiskInode> {
        if ino < FIRST_INO && ino != ROOT_INO {
            return Err(Error::BadInode(ino));
        }
        if ino >= self.inodes.count() {
            return Err(Error::OutOfRange(ino));
        }
        if !self.inode_bitmap.is_allocated(ino) {
            return Err(Error::BadInode(ino));
        }
        self.inodes.read(&mut self.cache, ino)
    }

    #[inline]
    pub fn write_inode(&mut self, ino: u32, inode: &DiskInode) -> Result<()> {
        self.inodes.write(&mut self.cache, ino, inode)
    }

    #[inline]
    pub fn read_block<V>(&mut self, block_id: u32, f: impl FnOnce(&[u8]) -> V) -> Result<V> {
        self.cache.map(block_id, f)
    }

    #[inline]
    pub fn modify_block<V>(&mut self, block_id: u32, f: impl FnOnce(&mut [u8]) -> V) -> Result<V> {
        self.cache.map_mut(block_id, f)
    }

    /// 写回超级块、两张位图以及所有脏块。
    /// 失败时内存状态不回滚，可以再次同步。
    pub fn sync(&mut self) -> Result<()> {
        let mut sb = SuperBlock::new(&self.layout);
        sb.free_inodes = self.inode_bitmap.free();
        sb.free_blocks = self.data_bitmap.free();
        self.cache.zeroize(Layout::SUPER_BLOCK);
        self.cache.map_mut(Layout::SUPER_BLOCK, |block| sb.encode(block))?;

        write_region(&mut self.cache, self.layout.inode_bitmap, &self.inode_bitmap)?;
        write_region(&mut self.cache, self.layout.data_bitmap, &self.data_bitmap)?;

        self.cache.flush()?;
        self.dirty = false;
        log::debug!(
            "synced: {} free inodes, {} free blocks",
            sb.free_inodes,
            sb.free_blocks
        );
        Ok(())
    }
}

/// 设备的块大小须与格式一致，且容得下整个文件系统
fn check_device(device: &dyn BlockDevice, layout: &Layout) -> Result<()> {
    if device.block_size() != layout.block_size() {
        log::warn!(
            "device block size {} differs from {}",
            device.block_size(),
            layout.block_size()
        );
        return Err(Error::InvalidLayout);
    }
    if device.num_blocks() < layout.total_blocks as usize {
        log::warn!(
            "device has {} blocks, file system needs {}",
            device.num_blocks(),
            layout.total_blocks
        );
        return Err(Error::InvalidLayout);
    }
    Ok(())
}

fn read_region(cache: &mut BlockCache, region: Region) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    for block_id in region.range() {
        cache.map(block_id, |block| bytes.extend_from_slice(block))?;
    }
    Ok(bytes)
}

fn write_region(cache: &mut BlockCache, region: Region, bitmap: &Bitmap) -> Result<()> {
    let block_size = cache.device().block_size();
    let mut bytes = vec![0; region.blocks as usize * block_size];
    bitmap.store(&mut bytes);
    for (block_id, chunk) in region.range().zip(bytes.chunks(block_size)) {
        cache.zeroize(block_id);
        cache.map_mut(block_id, |block| block.copy_from_slice(chunk))?;
    }
    Ok(())
}
