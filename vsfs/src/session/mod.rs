//! # 会话层
//!
//! 挂载后的文件系统实例。每个 [`Session`] 独占自己的位图、块缓存与锁，
//! 所有操作都在这把锁内完成，查找与插入目录项之间不会被其它线程插足。

mod read_dir;
pub use read_dir::ReadDir;

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use block_dev::BlockDevice;
use spin::Mutex;

use crate::config::{MountOptions, Profile};
use crate::error::{Error, Result};
use crate::fs::FileSystem;
use crate::layout::{DirLayout, DiskInode, FileKind, Layout};
use crate::ROOT_INO;

pub struct Session {
    fs: Mutex<FileSystem>,
}

/// 文件系统的整体用量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStat {
    pub block_size: u32,
    pub total_blocks: u32,
    pub free_blocks: u32,
    pub total_inodes: u32,
    pub free_inodes: u32,
    /// 文件名的最大长度
    pub name_len: u32,
}

/// 以扩展格式格式化设备的前 `total_blocks` 块
pub fn format(device: Arc<dyn BlockDevice>, total_blocks: u32, block_size: u32) -> Result<()> {
    format_with(
        device,
        total_blocks,
        Profile::extended(block_size),
        MountOptions::default(),
    )
    .map(|_| ())
}

/// 按给定格式格式化设备，返回推算出的布局
pub fn format_with(
    device: Arc<dyn BlockDevice>,
    total_blocks: u32,
    profile: Profile,
    options: MountOptions,
) -> Result<Layout> {
    let fs = FileSystem::format(device, total_blocks, profile, options)?;
    Ok(*fs.layout())
}

#[inline]
pub fn mount(device: Arc<dyn BlockDevice>) -> Result<Session> {
    Session::mount_with(device, MountOptions::default())
}

impl Session {
    pub fn mount_with(device: Arc<dyn BlockDevice>, options: MountOptions) -> Result<Self> {
        let fs = FileSystem::open(device, options)?;
        Ok(Self { fs: Mutex::new(fs) })
    }

    #[inline]
    pub fn root(&self) -> u32 {
        ROOT_INO
    }

    pub fn layout(&self) -> Layout {
        *self.fs.lock().layout()
    }

    /// 根据文件名在目录中查找 inode 编号
    pub fn lookup(&self, dir: u32, name: &str) -> Result<u32> {
        let mut fs = self.fs.lock();
        let dir_layout = fs.dir_layout();
        check_lookup_name(name, &dir_layout)?;
        let block = dir_block(&mut fs, dir)?;
        fs.read_block(block, |data| dir_layout.lookup(data, name))?
            .ok_or(Error::NotFound)
    }

    /// 从根目录出发，逐级解析以 `/` 分隔的绝对路径
    pub fn resolve(&self, path: &str) -> Result<u32> {
        let relative = path.strip_prefix('/').ok_or(Error::InvalidName)?;
        relative
            .split('/')
            .filter(|name| !name.is_empty())
            .try_fold(ROOT_INO, |dir, name| self.lookup(dir, name))
    }

    /// 在目录下创建文件或子目录，返回新 inode 的编号。
    /// 任何一步失败都会释放已分配的 inode 与数据块。
    pub fn create(&self, dir: u32, name: &str, kind: FileKind) -> Result<u32> {
        let mut fs = self.fs.lock();
        let dir_layout = fs.dir_layout();
        check_new_name(name, &dir_layout)?;

        let mut parent = read_dir_inode(&mut fs, dir)?;
        let parent_block = block_of(&parent, dir, fs.pointers())?;
        let (existing, free_slot) = fs.read_block(parent_block, |data| {
            (dir_layout.lookup(data, name), dir_layout.free_slot(data))
        })?;
        // 确认没有已创建的同名项
        if existing.is_some() {
            return Err(Error::AlreadyExists);
        }
        if free_slot.is_none() {
            return Err(Error::DirFull);
        }

        let options = *fs.options();
        let now = options.now();
        let ino = fs.alloc_inode()?;
        let mut inode = DiskInode::new(kind, kind.default_perm(), options.uid, options.gid, now);

        if let Err(err) = link_child(&mut fs, dir, parent_block, name, ino, &mut inode) {
            release(&mut fs, ino, &mut inode);
            return Err(err);
        }

        if kind == FileKind::Directory {
            parent.links += 1;
        }
        parent.mtime = now;
        parent.ctime = now;
        fs.write_inode(dir, &parent)?;

        log::debug!("create {kind:?} {name:?} as inode {ino} under {dir}");
        Ok(ino)
    }

    #[inline]
    pub fn mkdir(&self, dir: u32, name: &str) -> Result<u32> {
        self.create(dir, name, FileKind::Directory)
    }

    /// 删除目录中的文件。
    /// 链接数归零时释放其全部数据块与 inode。
    pub fn unlink(&self, dir: u32, name: &str) -> Result<()> {
        let mut fs = self.fs.lock();
        let dir_layout = fs.dir_layout();
        check_new_name(name, &dir_layout)?;

        let mut parent = read_dir_inode(&mut fs, dir)?;
        let parent_block = block_of(&parent, dir, fs.pointers())?;
        let ino = fs
            .read_block(parent_block, |data| dir_layout.lookup(data, name))?
            .ok_or(Error::NotFound)?;
        let mut inode = fs.read_inode(ino)?;
        if inode.is_dir() {
            return Err(Error::IsADirectory);
        }

        fs.modify_block(parent_block, |data| dir_layout.remove(data, name))?;
        let now = fs.options().now();
        inode.links = inode.links.saturating_sub(1);
        if inode.links == 0 {
            free_inode(&mut fs, ino, &mut inode)?;
        } else {
            inode.ctime = now;
            fs.write_inode(ino, &inode)?;
        }

        parent.mtime = now;
        parent.ctime = now;
        fs.write_inode(dir, &parent)?;
        log::debug!("unlink {name:?} (inode {ino}) from {dir}");
        Ok(())
    }

    /// 删除空目录
    pub fn rmdir(&self, dir: u32, name: &str) -> Result<()> {
        let mut fs = self.fs.lock();
        let dir_layout = fs.dir_layout();
        check_new_name(name, &dir_layout)?;

        let mut parent = read_dir_inode(&mut fs, dir)?;
        let parent_block = block_of(&parent, dir, fs.pointers())?;
        let ino = fs
            .read_block(parent_block, |data| dir_layout.lookup(data, name))?
            .ok_or(Error::NotFound)?;
        let mut inode = read_dir_inode(&mut fs, ino)?;
        let block = block_of(&inode, ino, fs.pointers())?;
        if !fs.read_block(block, |data| dir_layout.is_empty(data))? {
            return Err(Error::DirectoryNotEmpty);
        }

        fs.modify_block(parent_block, |data| dir_layout.remove(data, name))?;
        free_inode(&mut fs, ino, &mut inode)?;

        let now = fs.options().now();
        parent.links = parent.links.saturating_sub(1);
        parent.mtime = now;
        parent.ctime = now;
        fs.write_inode(dir, &parent)?;
        log::debug!("rmdir {name:?} (inode {ino}) from {dir}");
        Ok(())
    }

    /// 遍历目录，"." 与 ".." 位于第0、1项
    #[inline]
    pub fn read_dir(&self, dir: u32) -> Result<ReadDir<'_>> {
        self.read_dir_from(dir, 0)
    }

    /// 从第 `pos` 项起遍历目录
    pub fn read_dir_from(&self, dir: u32, pos: usize) -> Result<ReadDir<'_>> {
        let mut fs = self.fs.lock();
        let dir_layout = fs.dir_layout();
        let block = dir_block(&mut fs, dir)?;
        let snapshot = fs.read_block(block, |data| data.to_vec())?;
        Ok(ReadDir::new(self, dir, snapshot, dir_layout, pos))
    }

    /// 读取文件 `[offset, offset + len)` 范围内的数据，超出文件尺寸的部分被截去。
    /// 未映射的块读出0。
    pub fn read_file(&self, ino: u32, offset: usize, len: usize) -> Result<Vec<u8>> {
        let mut fs = self.fs.lock();
        let inode = read_file_inode(&mut fs, ino)?;
        let size = inode.size as usize;
        let end = offset.saturating_add(len).min(size);
        if offset >= end {
            return Ok(Vec::new());
        }

        let block_size = fs.layout().block_size();
        let pointers = fs.pointers();
        let mut buf = vec![0; end - offset];
        let mut pos = offset;
        while pos < end {
            let logical = pos / block_size;
            let inblock = pos % block_size;
            let chunk = (block_size - inblock).min(end - pos);
            let dst = &mut buf[pos - offset..pos - offset + chunk];
            if let Some(block) = inode.block_for(logical as u32, pointers)? {
                fs.read_block(block, |data| dst.copy_from_slice(&data[inblock..inblock + chunk]))?;
            }
            pos += chunk;
        }
        Ok(buf)
    }

    /// 在 `offset` 处写入数据，返回写入的字节数。
    /// 先为尚未映射的块分配数据块；空间不足或读写出错时，
    /// 本次新分配的块全部退回，inode 不变。
    pub fn write_file(&self, ino: u32, offset: usize, bytes: &[u8]) -> Result<usize> {
        let mut fs = self.fs.lock();
        let mut inode = read_file_inode(&mut fs, ino)?;
        if bytes.is_empty() {
            return Ok(0);
        }
        let end = offset.checked_add(bytes.len()).ok_or(Error::FileTooBig)?;
        if end as u64 > fs.layout().profile.max_file_size() {
            return Err(Error::FileTooBig);
        }

        let block_size = fs.layout().block_size();
        let pointers = fs.pointers();
        let logical_blocks = (offset / block_size) as u32..end.div_ceil(block_size) as u32;

        let mut fresh = Vec::new();
        for logical in logical_blocks {
            if inode.block_for(logical, pointers)?.is_some() {
                continue;
            }
            match fs.alloc_data() {
                Ok(block) => {
                    inode.map_block(logical, block);
                    fresh.push(block);
                }
                Err(err) => {
                    release_blocks(&mut fs, &fresh);
                    return Err(err);
                }
            }
        }

        let written = copy_into(&mut fs, &inode, offset, bytes).and_then(|()| {
            let now = fs.options().now();
            inode.size = inode.size.max(end as u32);
            inode.mtime = now;
            inode.ctime = now;
            fs.write_inode(ino, &inode)
        });
        if let Err(err) = written {
            release_blocks(&mut fs, &fresh);
            return Err(err);
        }
        Ok(bytes.len())
    }

    pub fn stat(&self, ino: u32) -> Result<vfs::Stat> {
        let mut fs = self.fs.lock();
        let inode = fs.read_inode(ino)?;
        let kind = inode.kind().ok_or(Error::BadInode(ino))?;
        let block_size = fs.layout().block_size() as u64;
        Ok(vfs::Stat {
            inode: ino as u64,
            mode: kind.into(),
            perm: inode.perm().bits(),
            links: inode.links,
            uid: inode.uid,
            gid: inode.gid,
            size: inode.size as u64,
            block_size,
            blocks: inode.blocks as u64,
            atime: inode.atime,
            mtime: inode.mtime,
            ctime: inode.ctime,
        })
    }

    pub fn statfs(&self) -> FsStat {
        let fs = self.fs.lock();
        let layout = fs.layout();
        FsStat {
            block_size: layout.profile.block_size,
            total_blocks: layout.total_blocks,
            free_blocks: fs.free_blocks(),
            total_inodes: layout.inode_count,
            free_inodes: fs.free_inodes(),
            name_len: layout.profile.name_len,
        }
    }

    /// 是否有尚未写回的改动
    pub fn is_dirty(&self) -> bool {
        self.fs.lock().is_dirty()
    }

    /// 写回超级块、位图与所有脏块，可重复调用
    pub fn sync(&self) -> Result<()> {
        self.fs.lock().sync().inspect_err(|err| log::warn!("sync failed: {err}"))
    }

    /// 最后一次同步后卸载。
    /// 同步失败时交还会话，调用者可以重试。
    pub fn unmount(self) -> core::result::Result<(), (Self, Error)> {
        if let Err(err) = self.sync() {
            return Err((self, err));
        }
        log::info!("unmounted");
        Ok(())
    }
}

impl Session {
    /// 目录项的种类，供目录遍历使用
    fn kind_of(&self, ino: u32) -> Result<FileKind> {
        self.fs
            .lock()
            .read_inode(ino)?
            .kind()
            .ok_or(Error::BadInode(ino))
    }
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("layout", &self.layout())
            .finish()
    }
}

/// 读取目录 inode
fn read_dir_inode(fs: &mut FileSystem, ino: u32) -> Result<DiskInode> {
    let inode = fs.read_inode(ino)?;
    if !inode.is_dir() {
        return Err(Error::NotADirectory);
    }
    Ok(inode)
}

/// 读取普通文件 inode
fn read_file_inode(fs: &mut FileSystem, ino: u32) -> Result<DiskInode> {
    let inode = fs.read_inode(ino)?;
    match inode.kind() {
        Some(FileKind::File) => Ok(inode),
        Some(FileKind::Directory) => Err(Error::IsADirectory),
        None => Err(Error::BadInode(ino)),
    }
}

/// 目录唯一的数据块
fn block_of(inode: &DiskInode, ino: u32, pointers: u32) -> Result<u32> {
    inode.block_for(0, pointers)?.ok_or(Error::BadInode(ino))
}

fn dir_block(fs: &mut FileSystem, dir: u32) -> Result<u32> {
    let inode = read_dir_inode(fs, dir)?;
    block_of(&inode, dir, fs.pointers())
}

/// 查找时允许 "." 与 ".."
fn check_lookup_name(name: &str, dir_layout: &DirLayout) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\0']) {
        return Err(Error::InvalidName);
    }
    if name.len() > dir_layout.name_len() {
        return Err(Error::NameTooLong);
    }
    Ok(())
}

/// 新建与删除的目标不能是 "." 或 ".."
fn check_new_name(name: &str, dir_layout: &DirLayout) -> Result<()> {
    check_lookup_name(name, dir_layout)?;
    if name == "." || name == ".." {
        return Err(Error::InvalidName);
    }
    Ok(())
}

/// 为新 inode 准备数据并写入父目录块
fn link_child(
    fs: &mut FileSystem,
    dir: u32,
    parent_block: u32,
    name: &str,
    ino: u32,
    inode: &mut DiskInode,
) -> Result<()> {
    let dir_layout = fs.dir_layout();
    if inode.is_dir() {
        let block = fs.alloc_data()?;
        inode.map_block(0, block);
        inode.size = fs.layout().profile.block_size;
        fs.modify_block(block, |data| dir_layout.init(data, ino, dir))?;
    }
    fs.write_inode(ino, inode)?;
    fs.modify_block(parent_block, |data| dir_layout.insert(data, name, ino))??;
    Ok(())
}

/// 将 `bytes` 拷入文件已映射的各块
fn copy_into(fs: &mut FileSystem, inode: &DiskInode, offset: usize, bytes: &[u8]) -> Result<()> {
    let block_size = fs.layout().block_size();
    let pointers = fs.pointers();
    let end = offset + bytes.len();
    let mut pos = offset;
    while pos < end {
        let logical = pos / block_size;
        let inblock = pos % block_size;
        let chunk = (block_size - inblock).min(end - pos);
        let src = &bytes[pos - offset..pos - offset + chunk];
        if let Some(block) = inode.block_for(logical as u32, pointers)? {
            fs.modify_block(block, |data| data[inblock..inblock + chunk].copy_from_slice(src))?;
        }
        pos += chunk;
    }
    Ok(())
}

/// 退回写入失败前新分配的块，尽力而为
fn release_blocks(fs: &mut FileSystem, blocks: &[u32]) {
    for &block in blocks {
        if let Err(err) = fs.dealloc_data(block) {
            log::warn!("failed to release block {block}: {err}");
        }
    }
}

/// 释放 inode 及其全部数据块
fn free_inode(fs: &mut FileSystem, ino: u32, inode: &mut DiskInode) -> Result<()> {
    for block in inode.take_blocks(fs.pointers()) {
        fs.dealloc_data(block)?;
    }
    fs.dealloc_inode(ino)
}

/// 创建失败时的回收，尽力而为
fn release(fs: &mut FileSystem, ino: u32, inode: &mut DiskInode) {
    if let Err(err) = free_inode(fs, ino, inode) {
        log::warn!("failed to release inode {ino}: {err}");
    }
}
