use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use spin::Mutex;

use crate::{check_access, BlockDevice, BlockError};

/// 内存中的块设备
pub struct RamDisk {
    data: Mutex<Vec<u8>>,
    block_size: usize,
    num_blocks: usize,
}

impl RamDisk {
    pub fn new(num_blocks: usize, block_size: usize) -> Self {
        Self {
            data: Mutex::new(vec![0; num_blocks * block_size]),
            block_size,
            num_blocks,
        }
    }

    /// 整个设备的字节拷贝
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

impl fmt::Debug for RamDisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RamDisk")
            .field("block_size", &self.block_size)
            .field("num_blocks", &self.num_blocks)
            .finish()
    }
}

impl BlockDevice for RamDisk {
    #[inline]
    fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), BlockError> {
        check_access(self, block_id, buf.len())?;
        let start = block_id * self.block_size;
        buf.copy_from_slice(&self.data.lock()[start..start + self.block_size]);
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), BlockError> {
        check_access(self, block_id, buf.len())?;
        let start = block_id * self.block_size;
        self.data.lock()[start..start + self.block_size].copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_back() {
        let disk = RamDisk::new(4, 512);
        let block = [0xabu8; 512];
        disk.write_block(2, &block).unwrap();

        let mut buf = [0u8; 512];
        disk.read_block(2, &mut buf).unwrap();
        assert_eq!(buf, block);
        disk.read_block(1, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn rejects_bad_access() {
        let disk = RamDisk::new(4, 512);
        let mut buf = [0u8; 512];
        assert_eq!(
            disk.read_block(4, &mut buf),
            Err(BlockError::OutOfRange(4))
        );
        assert_eq!(
            disk.write_block(0, &buf[..100]),
            Err(BlockError::BadBuffer {
                expected: 512,
                actual: 100
            })
        );
    }
}
