//! 目录块：每个目录恰好一个数据块，块内是定长目录项数组
//!
//! 目录项 = inode 编号（小端序 `u32`）+ 定长文件名字段（未用字节填0）。
//! inode 编号为0的槽位未被使用；第0、1个槽位恒为 "." 与 ".."。
//! 删除时不做压缩，空出的槽位由下一次插入复用。

use alloc::string::String;

use crate::codec::{Reader, Writer};
use crate::config::Profile;
use crate::error::{Error, Result};

/// 文件系统项的元信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub inode: u32,
    pub name: String,
}

/// 目录块的几何参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirLayout {
    name_len: usize,
    capacity: usize,
}

impl DirLayout {
    /// "." 与 ".." 之后的首个槽位
    pub const FIRST_SLOT: usize = 2;

    pub fn new(profile: &Profile) -> Self {
        Self {
            name_len: profile.name_len as usize,
            capacity: profile.dir_capacity() as usize,
        }
    }

    #[inline]
    pub const fn entry_size(&self) -> usize {
        4 + self.name_len
    }

    /// 槽位总数，含 "." 与 ".."
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub const fn name_len(&self) -> usize {
        self.name_len
    }

    /// 清空目录块并写入 "." 与 ".."
    pub fn init(&self, block: &mut [u8], ino: u32, parent_ino: u32) {
        block.fill(0);
        self.write_slot(block, 0, ino, b".");
        self.write_slot(block, 1, parent_ino, b"..");
    }

    /// 读取槽位，未使用的槽位返回空
    pub fn slot(&self, block: &[u8], index: usize) -> Option<DirEntry> {
        let raw = self.raw_slot(block, index);
        let inode = Reader::new(raw).u32();
        if inode == 0 {
            return None;
        }

        let name = &raw[4..];
        let len = name.iter().position(|&c| c == 0).unwrap_or(name.len());
        Some(DirEntry {
            inode,
            name: String::from_utf8_lossy(&name[..len]).into_owned(),
        })
    }

    /// 按名字查找目录项的 inode 编号。
    /// 删除会留下空槽位，所以要扫描整个块。
    pub fn lookup(&self, block: &[u8], name: &str) -> Option<u32> {
        (0..self.capacity).find_map(|index| {
            let raw = self.raw_slot(block, index);
            let inode = Reader::new(raw).u32();
            (inode != 0 && Self::name_matches(&raw[4..], name.as_bytes())).then_some(inode)
        })
    }

    /// 在编号最小的空槽位写入目录项，返回槽位编号。
    /// 名字过长或目录已满时不修改目录块。
    pub fn insert(&self, block: &mut [u8], name: &str, ino: u32) -> Result<usize> {
        if name.len() > self.name_len {
            return Err(Error::NameTooLong);
        }
        let index = self.free_slot(block).ok_or(Error::DirFull)?;
        self.write_slot(block, index, ino, name.as_bytes());
        Ok(index)
    }

    /// 删除目录项并返回其 inode 编号，槽位清零
    pub fn remove(&self, block: &mut [u8], name: &str) -> Option<u32> {
        let index = (Self::FIRST_SLOT..self.capacity).find(|&index| {
            let raw = self.raw_slot(block, index);
            Reader::new(raw).u32() != 0 && Self::name_matches(&raw[4..], name.as_bytes())
        })?;
        let inode = Reader::new(self.raw_slot(block, index)).u32();
        self.raw_slot_mut(block, index).fill(0);
        Some(inode)
    }

    /// 编号最小的空槽位
    pub fn free_slot(&self, block: &[u8]) -> Option<usize> {
        (Self::FIRST_SLOT..self.capacity)
            .find(|&index| Reader::new(self.raw_slot(block, index)).u32() == 0)
    }

    /// 从 `start` 起依次产出已使用的槽位，跳过空槽位
    pub fn entries<'a>(
        &self,
        block: &'a [u8],
        start: usize,
    ) -> impl Iterator<Item = (usize, DirEntry)> + 'a {
        let layout = *self;
        (start..self.capacity)
            .filter_map(move |index| layout.slot(block, index).map(|entry| (index, entry)))
    }

    /// 除 "." 与 ".." 外没有任何目录项
    pub fn is_empty(&self, block: &[u8]) -> bool {
        self.entries(block, Self::FIRST_SLOT).next().is_none()
    }
}

impl DirLayout {
    #[inline]
    fn raw_slot<'a>(&self, block: &'a [u8], index: usize) -> &'a [u8] {
        let start = index * self.entry_size();
        &block[start..start + self.entry_size()]
    }

    #[inline]
    fn raw_slot_mut<'a>(&self, block: &'a mut [u8], index: usize) -> &'a mut [u8] {
        let start = index * self.entry_size();
        &mut block[start..start + self.entry_size()]
    }

    fn write_slot(&self, block: &mut [u8], index: usize, ino: u32, name: &[u8]) {
        let raw = self.raw_slot_mut(block, index);
        Writer::new(&mut raw[..4]).u32(ino);
        let field = &mut raw[4..];
        field.fill(0);
        field[..name.len()].copy_from_slice(name);
    }

    /// 名字字段以0结尾，恰好占满时没有结尾
    fn name_matches(field: &[u8], name: &[u8]) -> bool {
        field.starts_with(name) && field.get(name.len()).is_none_or(|&c| c == 0)
    }
}
