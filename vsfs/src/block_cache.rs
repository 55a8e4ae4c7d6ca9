//! # 块缓存层
//!
//! 块设备读写速度一般慢于内存读写速度，因此我们在内存中开辟缓冲区，
//! 把即将操作的块复制到内存中，提高对块设备的操作效率。
//!
//! 块缓存由挂载实例独占，不同实例之间互不影响。
//! 脏块只在 [`BlockCache::flush`] 时写回，两次同步之间设备不会被改动；
//! 因此只有干净的块会被踢出，缓存可能暂时超过容量上限。

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use block_dev::BlockDevice;

use crate::error::Result;

pub struct BlockCache {
    device: Arc<dyn BlockDevice>,
    block_size: usize,
    queue: Vec<CachedBlock>,
}

/// 内存中的块缓存
struct CachedBlock {
    /// 对应的块ID
    block_id: u32,
    /// 缓存的数据
    data: Box<[u8]>,
    /// 是否为脏块
    modified: bool,
}

impl BlockCache {
    /// 干净块缓存个数的上限
    pub const CAPACITY: usize = 16;

    pub fn new(device: Arc<dyn BlockDevice>, block_size: usize) -> Self {
        Self {
            device,
            block_size,
            queue: Vec::new(),
        }
    }

    #[inline]
    pub fn device(&self) -> &Arc<dyn BlockDevice> {
        &self.device
    }

    #[inline]
    pub fn map<V>(&mut self, block_id: u32, f: impl FnOnce(&[u8]) -> V) -> Result<V> {
        let cache = self.get(block_id)?;
        Ok(f(&cache.data))
    }

    #[inline]
    pub fn map_mut<V>(&mut self, block_id: u32, f: impl FnOnce(&mut [u8]) -> V) -> Result<V> {
        let cache = self.get(block_id)?;
        cache.modified = true;
        Ok(f(&mut cache.data))
    }

    /// 将块清零，不必先从设备读取
    pub fn zeroize(&mut self, block_id: u32) {
        match self.position(block_id) {
            Some(index) => {
                let cache = &mut self.queue[index];
                cache.data.fill(0);
                cache.modified = true;
            }
            None => {
                let data = vec![0; self.block_size].into_boxed_slice();
                self.push(CachedBlock {
                    block_id,
                    data,
                    modified: true,
                });
            }
        }
    }

    /// 按块号升序写回所有脏块。
    /// 写失败的块保持为脏，留待下次同步。
    pub fn flush(&mut self) -> Result<()> {
        let mut dirty: Vec<usize> = (0..self.queue.len())
            .filter(|&index| self.queue[index].modified)
            .collect();
        dirty.sort_unstable_by_key(|&index| self.queue[index].block_id);

        for index in dirty {
            let cache = &mut self.queue[index];
            log::trace!("write back block {}", cache.block_id);
            self.device.write_block(cache.block_id as usize, &cache.data)?;
            cache.modified = false;
        }

        self.evict();
        Ok(())
    }

    /// 尚未写回的块数
    pub fn dirty_blocks(&self) -> usize {
        self.queue.iter().filter(|cache| cache.modified).count()
    }
}

impl BlockCache {
    #[inline]
    fn position(&self, block_id: u32) -> Option<usize> {
        self.queue.iter().position(|cache| cache.block_id == block_id)
    }

    // 块缓存调度策略：踢走最早缓存的干净块
    fn get(&mut self, block_id: u32) -> Result<&mut CachedBlock> {
        // 尝试从缓冲区中读取块
        let index = match self.position(block_id) {
            Some(index) => index,
            None => {
                let mut data = vec![0; self.block_size].into_boxed_slice();
                log::trace!("read block {block_id}");
                self.device.read_block(block_id as usize, &mut data)?;
                self.push(CachedBlock {
                    block_id,
                    data,
                    modified: false,
                })
            }
        };
        Ok(&mut self.queue[index])
    }

    /// 缓存新块，返回其下标
    fn push(&mut self, cache: CachedBlock) -> usize {
        self.queue.push(cache);
        self.evict();
        self.queue.len() - 1
    }

    /// 超出上限时踢走干净块，但不会踢走队尾刚缓存的块
    fn evict(&mut self) {
        while self.queue.len() > Self::CAPACITY {
            let last = self.queue.len() - 1;
            let Some(index) = self.queue[..last].iter().position(|cache| !cache.modified) else {
                break;
            };
            self.queue.remove(index);
        }
    }
}
