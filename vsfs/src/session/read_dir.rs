use alloc::string::String;
use alloc::vec::Vec;

use vfs::{DirEntry, DirEntryType};

use super::Session;
use crate::error::Result;
use crate::layout::DirLayout;

/// 目录遍历器
///
/// 创建时复制一份目录块，之后逐项解码；第0、1项恒为 "." 与 ".."。
/// 位置与目录块的槽位一一对应，可以借 [`ReadDir::position`]
/// 与 [`Session::read_dir_from`] 从中途继续。
pub struct ReadDir<'a> {
    session: &'a Session,
    dir: u32,
    block: Vec<u8>,
    layout: DirLayout,
    pos: usize,
}

impl<'a> ReadDir<'a> {
    pub(super) fn new(
        session: &'a Session,
        dir: u32,
        block: Vec<u8>,
        layout: DirLayout,
        pos: usize,
    ) -> Self {
        Self {
            session,
            dir,
            block,
            layout,
            pos,
        }
    }

    /// 下一项的位置
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// 被遍历的目录
    #[inline]
    pub fn dir(&self) -> u32 {
        self.dir
    }
}

impl Iterator for ReadDir<'_> {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, entry) = match self.pos {
            0 => (0, dot(".", self.dir)),
            1 => {
                let parent = self.layout.slot(&self.block, 1).map_or(self.dir, |e| e.inode);
                (1, dot("..", parent))
            }
            pos => {
                let (index, entry) = self.layout.entries(&self.block, pos).next()?;
                let ty = match self.session.kind_of(entry.inode) {
                    Ok(kind) => kind.into(),
                    Err(err) => {
                        self.pos = index + 1;
                        return Some(Err(err));
                    }
                };
                let entry = DirEntry {
                    inode: entry.inode as u64,
                    ty,
                    name: entry.name,
                };
                (index, entry)
            }
        };
        self.pos = index + 1;
        Some(Ok(entry))
    }
}

#[inline]
fn dot(name: &str, ino: u32) -> DirEntry {
    DirEntry {
        inode: ino as u64,
        ty: DirEntryType::Directory,
        name: String::from(name),
    }
}
