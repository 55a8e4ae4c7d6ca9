mod cli;

use std::error::Error;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use vfs::DirEntryType;
use vsfs::{FileKind, Layout, Profile, ROOT_INO, Session};
use vsfs_fuse::{BlockFile, mount_image, mount_options};

use self::cli::{Cli, Command, ProfileKind};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Mkfs {
            image,
            blocks,
            block_size,
            profile,
        } => mkfs(&image, blocks, block_size, profile),
        Command::Pack { image, source } => pack(&image, &source),
        Command::Ls { image, path } => ls(&mount_image(&image)?, &path),
        Command::Cat { image, path } => cat(&mount_image(&image)?, &path),
        Command::Stat { image, path } => stat(&mount_image(&image)?, &path),
    }
}

fn mkfs(image: &Path, blocks: u32, block_size: u32, kind: ProfileKind) -> Result<(), Box<dyn Error>> {
    let profile = match kind {
        ProfileKind::Minimal => Profile::minimal(),
        ProfileKind::Extended => Profile::extended(block_size),
    };
    let minimum = Layout::minimum_blocks(profile)?;
    if blocks < minimum {
        let msg = format!("{blocks} blocks is too small, the {kind:?} profile needs {minimum}");
        return Err(msg.into());
    }
    let block_file = BlockFile::create(image, blocks as usize, profile.block_size as usize)?;
    let layout = vsfs::format_with(Arc::new(block_file), blocks, profile, mount_options())?;

    println!(
        "{}: {} blocks of {} bytes, {} inodes, data starts at block {}",
        image.display(),
        layout.total_blocks,
        layout.block_size(),
        layout.inode_count,
        layout.data.start
    );
    Ok(())
}

fn pack(image: &Path, source: &Path) -> Result<(), Box<dyn Error>> {
    let session = mount_image(image)?;
    println!("source={source:?}\nimage={image:?}");

    for entry in fs::read_dir(source)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            log::warn!("skipping non UTF-8 name {:?}", entry.file_name());
            continue;
        };

        let mut data = Vec::new();
        File::open(entry.path())?.read_to_end(&mut data)?;
        let ino = session.create(ROOT_INO, &name, FileKind::File)?;
        session.write_file(ino, 0, &data)?;
        log::info!("packed {name:?} ({} bytes) as inode {ino}", data.len());
    }

    session.unmount().map_err(|(_, err)| err)?;
    Ok(())
}

fn ls(session: &Session, path: &str) -> Result<(), Box<dyn Error>> {
    let ino = session.resolve(path)?;
    for entry in session.read_dir(ino)? {
        let entry = entry?;
        let kind = match entry.ty {
            DirEntryType::Directory => 'd',
            DirEntryType::Regular => '-',
        };
        println!("{:>6} {kind} {}", entry.inode, entry.name);
    }
    Ok(())
}

fn cat(session: &Session, path: &str) -> Result<(), Box<dyn Error>> {
    let ino = session.resolve(path)?;
    let size = session.stat(ino)?.size as usize;
    let data = session.read_file(ino, 0, size)?;
    io::stdout().lock().write_all(&data)?;
    Ok(())
}

fn stat(session: &Session, path: &str) -> Result<(), Box<dyn Error>> {
    let ino = session.resolve(path)?;
    let stat = session.stat(ino)?;
    println!("  File: {path}");
    println!(
        "  Size: {:<10} Blocks: {:<6} IO Block: {:<6} {:?}",
        stat.size, stat.blocks, stat.block_size, stat.mode
    );
    println!("Inode: {:<10} Links: {}", stat.inode, stat.links);
    println!(
        "Access: {:04o}  Uid: {}  Gid: {}",
        stat.perm, stat.uid, stat.gid
    );
    println!("Access: {}\nModify: {}\nChange: {}", stat.atime, stat.mtime, stat.ctime);
    Ok(())
}
