//! 磁盘上的 inode 记录
//!
//! 字段依次为 mode、uid、gid、size、ctime、atime、mtime、blocks、links，
//! 随后是 `direct_pointers` 个直接索引，均为小端序 `u32`，记录末尾填0。
//!
//! 文件只有直接索引，最大尺寸为 直接索引数 × 块大小；
//! 目录恰好占用一个数据块，即第0个直接索引指向的块。

use enumflags2::{BitFlags, bitflags};

use crate::MAX_DIRECT_POINTERS;
use crate::codec::{Reader, Writer};
use crate::error::{Error, Result};

/// 固定字段所占字节
pub const INODE_FIXED_BYTES: u32 = 9 * 4;

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFREG: u32 = 0o100000;
const PERM_MASK: u32 = 0o777;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
}

#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    OtherExec = 0o001,
    OtherWrite = 0o002,
    OtherRead = 0o004,
    GroupExec = 0o010,
    GroupWrite = 0o020,
    GroupRead = 0o040,
    OwnerExec = 0o100,
    OwnerWrite = 0o200,
    OwnerRead = 0o400,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiskInode {
    /// 类型 + 权限
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    // 不用usize是为了严控布局
    pub size: u32,
    pub ctime: u32,
    pub atime: u32,
    pub mtime: u32,
    /// 已映射的数据块数
    pub blocks: u32,
    /// 硬链接个数
    pub links: u32,
    /// 直接索引，0 表示未映射；只有前 `direct_pointers` 个落盘
    direct: [u32; MAX_DIRECT_POINTERS],
}

impl FileKind {
    #[inline]
    const fn mode_bits(self) -> u32 {
        match self {
            Self::File => S_IFREG,
            Self::Directory => S_IFDIR,
        }
    }

    /// 新建时的默认权限
    pub fn default_perm(self) -> BitFlags<Permission> {
        match self {
            Self::File => BitFlags::from_bits_truncate(0o644),
            Self::Directory => BitFlags::from_bits_truncate(0o755),
        }
    }
}

impl From<FileKind> for vfs::DirEntryType {
    #[inline]
    fn from(kind: FileKind) -> Self {
        match kind {
            FileKind::Directory => Self::Directory,
            FileKind::File => Self::Regular,
        }
    }
}

impl DiskInode {
    pub fn new(kind: FileKind, perm: BitFlags<Permission>, uid: u32, gid: u32, now: u32) -> Self {
        Self {
            mode: kind.mode_bits() | perm.bits(),
            uid,
            gid,
            ctime: now,
            atime: now,
            mtime: now,
            links: match kind {
                // "." 与父目录中的目录项
                FileKind::Directory => 2,
                FileKind::File => 1,
            },
            ..Default::default()
        }
    }

    /// 类型位无法识别时返回空
    pub fn kind(&self) -> Option<FileKind> {
        match self.mode & S_IFMT {
            S_IFDIR => Some(FileKind::Directory),
            S_IFREG => Some(FileKind::File),
            _ => None,
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind() == Some(FileKind::Directory)
    }

    #[inline]
    pub fn perm(&self) -> BitFlags<Permission> {
        BitFlags::from_bits_truncate(self.mode & PERM_MASK)
    }

    /// 逻辑块对应的物理块。
    /// 超出直接索引数时报 [`Error::FileTooBig`]，未映射时返回空。
    pub fn block_for(&self, logical_block: u32, pointers: u32) -> Result<Option<u32>> {
        if logical_block >= pointers {
            return Err(Error::FileTooBig);
        }
        let block = self.direct[logical_block as usize];
        Ok((block != 0).then_some(block))
    }

    /// 将逻辑块映射到物理块，调用者保证逻辑块在索引数以内
    pub fn map_block(&mut self, logical_block: u32, block: u32) {
        let slot = &mut self.direct[logical_block as usize];
        if *slot == 0 {
            self.blocks += 1;
        }
        *slot = block;
    }

    /// 清空所有索引，返回曾经映射的物理块
    pub fn take_blocks(&mut self, pointers: u32) -> impl Iterator<Item = u32> + use<> {
        let direct = self.direct;
        self.direct = Default::default();
        self.blocks = 0;
        self.size = 0;
        direct
            .into_iter()
            .take(pointers as usize)
            .filter(|&block| block != 0)
    }

    pub fn decode(buf: &[u8], pointers: u32) -> Self {
        let mut reader = Reader::new(buf);
        let mut inode = Self {
            mode: reader.u32(),
            uid: reader.u32(),
            gid: reader.u32(),
            size: reader.u32(),
            ctime: reader.u32(),
            atime: reader.u32(),
            mtime: reader.u32(),
            blocks: reader.u32(),
            links: reader.u32(),
            direct: Default::default(),
        };
        for slot in inode.direct.iter_mut().take(pointers as usize) {
            *slot = reader.u32();
        }
        inode
    }

    /// `buf` 恰为一条 inode 记录的大小
    pub fn encode(&self, buf: &mut [u8], pointers: u32) {
        let mut writer = Writer::new(buf);
        writer
            .u32(self.mode)
            .u32(self.uid)
            .u32(self.gid)
            .u32(self.size)
            .u32(self.ctime)
            .u32(self.atime)
            .u32(self.mtime)
            .u32(self.blocks)
            .u32(self.links);
        for &block in self.direct.iter().take(pointers as usize) {
            writer.u32(block);
        }
        writer.zero_rest();
    }
}
