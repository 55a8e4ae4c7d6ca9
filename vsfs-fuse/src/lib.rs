
use std::error::Error;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use block_dev::{BlockDevice, BlockError, check_access};
use vsfs::layout::SuperBlock;
use vsfs::{MountOptions, Session};

/// 以宿主文件为后端的块设备
pub struct BlockFile {
    file: Mutex<File>,
    block_size: usize,
    num_blocks: usize,
}

impl BlockFile {
    /// 创建或截断镜像文件，大小为 `num_blocks` 块
    pub fn create(path: &Path, num_blocks: usize, block_size: usize) -> io::Result<Self> {
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        fd.set_len((num_blocks * block_size) as u64)?;

        Ok(Self {
            file: Mutex::new(fd),
            block_size,
            num_blocks,
        })
    }

    /// 打开已有的镜像文件，块数由文件大小决定
    pub fn open(path: &Path, block_size: usize) -> io::Result<Self> {
        let fd = OpenOptions::new().read(true).write(true).open(path)?;
        let num_blocks = fd.metadata()?.len() as usize / block_size;

        Ok(Self {
            file: Mutex::new(fd),
            block_size,
            num_blocks,
        })
    }
}

impl fmt::Debug for BlockFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockFile")
            .field("block_size", &self.block_size)
            .field("num_blocks", &self.num_blocks)
            .finish()
    }
}

impl BlockDevice for BlockFile {
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
        let mut file = self.file.lock().map_err(|_| BlockError::Device)?;
        file.seek(SeekFrom::Start((block_id * self.block_size) as u64))
            .and_then(|_| file.read_exact(buf))
            .map_err(|err| {
                log::error!("reading block {block_id}: {err}");
                BlockError::Device
            })
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), BlockError> {
        check_access(self, block_id, buf.len())?;
        let mut file = self.file.lock().map_err(|_| BlockError::Device)?;
        file.seek(SeekFrom::Start((block_id * self.block_size) as u64))
            .and_then(|_| file.write_all(buf))
            .map_err(|err| {
                log::error!("writing block {block_id}: {err}");
                BlockError::Device
            })
    }
}

/// 当前时间（秒），供新建的 inode 盖时间戳
pub fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as u32)
}

#[inline]
pub fn mount_options() -> MountOptions {
    MountOptions {
        clock: unix_now,
        ..Default::default()
    }
}

/// 从镜像开头的超级块得知块大小，再挂载
pub fn mount_image(path: &Path) -> Result<Session, Box<dyn Error>> {
    let mut header = [0; SuperBlock::SIZE];
    File::open(path)?.read_exact(&mut header)?;
    let sb = SuperBlock::decode(&header)?;

    let block_file = BlockFile::open(path, sb.profile.block_size as usize)?;
    let session = Session::mount_with(Arc::new(block_file), mount_options())?;
    Ok(session)
}
