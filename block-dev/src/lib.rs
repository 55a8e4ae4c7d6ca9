//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备，例如磁盘、光盘、U盘等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 块大小由设备自己决定，文件系统在挂载时核对。

#![no_std]

extern crate alloc;

mod ram_disk;

use core::any::Any;
use core::fmt::Debug;

use derive_more::Display;

pub use self::ram_disk::RamDisk;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any + Debug {
    /// 每块的字节数
    fn block_size(&self) -> usize;

    /// 设备的总块数
    fn num_blocks(&self) -> usize;

    /// `buf` 的长度必须等于 [`BlockDevice::block_size`]
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), BlockError>;

    /// `buf` 的长度必须等于 [`BlockDevice::block_size`]
    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), BlockError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BlockError {
    /// 块号超出设备范围
    #[display(fmt = "block {} out of range", _0)]
    OutOfRange(usize),
    /// 缓冲区长度与块大小不符
    #[display(fmt = "buffer of {} bytes, expected {}", actual, expected)]
    BadBuffer { expected: usize, actual: usize },
    /// 设备自身的读写故障
    #[display(fmt = "device failure")]
    Device,
}

impl core::error::Error for BlockError {}

/// 检查块号与缓冲区，供驱动实现复用
pub fn check_access(
    dev: &dyn BlockDevice,
    block_id: usize,
    buf_len: usize,
) -> Result<(), BlockError> {
    if block_id >= dev.num_blocks() {
        return Err(BlockError::OutOfRange(block_id));
    }
    if buf_len != dev.block_size() {
        return Err(BlockError::BadBuffer {
            expected: dev.block_size(),
            actual: buf_len,
        });
    }
    Ok(())
}
