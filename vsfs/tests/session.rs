use std::sync::Arc;

use block_dev::{BlockDevice, RamDisk};
use vfs::DirEntryType;
use vsfs::{Error, FileKind, MountOptions, Profile, ROOT_INO, Session};

fn names(session: &Session, dir: u32) -> Vec<String> {
    session
        .read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().name)
        .collect()
}

fn minimal() -> (Arc<RamDisk>, Session) {
    let disk = Arc::new(RamDisk::new(64, 4096));
    vsfs::format_with(disk.clone(), 64, Profile::minimal(), MountOptions::default()).unwrap();
    let session = vsfs::mount(disk.clone()).unwrap();
    (disk, session)
}

/// 512 字节的块：每个文件至多 12 块，即 6144 字节
fn small_blocks() -> (Arc<RamDisk>, Session) {
    let disk = Arc::new(RamDisk::new(256, 512));
    vsfs::format(disk.clone(), 256, 512).unwrap();
    let session = vsfs::mount(disk.clone()).unwrap();
    (disk, session)
}

#[test]
fn format_mount_create_remount() {
    let disk = Arc::new(RamDisk::new(64, 4096));
    vsfs::format(disk.clone(), 64, 4096).unwrap();

    let session = vsfs::mount(disk.clone()).unwrap();
    assert_eq!(names(&session, ROOT_INO), [".", ".."]);

    let ino = session.create(ROOT_INO, "a.txt", FileKind::File).unwrap();
    assert!(ino >= vsfs::FIRST_INO);
    assert_eq!(names(&session, ROOT_INO), [".", "..", "a.txt"]);
    session.sync().unwrap();
    session.unmount().unwrap();

    let session = vsfs::mount(disk).unwrap();
    assert_eq!(session.lookup(ROOT_INO, "a.txt"), Ok(ino));
    assert_eq!(session.lookup(ROOT_INO, "."), Ok(ROOT_INO));
    assert_eq!(session.lookup(ROOT_INO, ".."), Ok(ROOT_INO));
}

#[test]
fn super_block_matches_layout() {
    let disk = Arc::new(RamDisk::new(64, 4096));
    let layout =
        vsfs::format_with(disk.clone(), 64, Profile::minimal(), MountOptions::default()).unwrap();
    let session = vsfs::mount(disk).unwrap();
    assert_eq!(session.layout(), layout);

    let stat = session.statfs();
    assert_eq!(stat.total_blocks, 64);
    assert_eq!(stat.total_inodes, 64);
    assert_eq!(stat.free_inodes, 61);
    assert_eq!(stat.free_blocks, 64 - layout.metadata_blocks() - 1);
    assert_eq!(stat.name_len, 60);
}

#[test]
fn mutations_reach_the_device_only_on_sync() {
    let (disk, session) = minimal();
    let before = disk.snapshot();
    session.create(ROOT_INO, "x", FileKind::File).unwrap();
    session.mkdir(ROOT_INO, "d").unwrap();
    assert!(session.is_dirty());
    assert_eq!(disk.snapshot(), before);

    session.sync().unwrap();
    assert!(!session.is_dirty());
    assert_ne!(disk.snapshot(), before);
    // 重复同步不会再改动设备
    let after = disk.snapshot();
    session.sync().unwrap();
    assert_eq!(disk.snapshot(), after);
}

#[test]
fn unsynced_changes_are_lost() {
    let (disk, session) = minimal();
    session.create(ROOT_INO, "gone", FileKind::File).unwrap();
    drop(session);

    let session = vsfs::mount(disk).unwrap();
    assert_eq!(session.lookup(ROOT_INO, "gone"), Err(Error::NotFound));
    assert_eq!(session.statfs().free_inodes, 61);
}

#[test]
fn create_errors() {
    let (_, session) = minimal();
    let file = session.create(ROOT_INO, "f", FileKind::File).unwrap();

    assert_eq!(
        session.create(ROOT_INO, "f", FileKind::File),
        Err(Error::AlreadyExists)
    );
    assert_eq!(
        session.create(ROOT_INO, &"n".repeat(61), FileKind::File),
        Err(Error::NameTooLong)
    );
    assert!(session.create(ROOT_INO, &"n".repeat(60), FileKind::File).is_ok());
    for name in ["", ".", "..", "a/b"] {
        assert_eq!(
            session.create(ROOT_INO, name, FileKind::File),
            Err(Error::InvalidName),
            "{name:?}"
        );
    }
    assert_eq!(
        session.create(file, "child", FileKind::File),
        Err(Error::NotADirectory)
    );
    assert_eq!(
        session.create(0, "child", FileKind::File),
        Err(Error::BadInode(0))
    );
    assert_eq!(
        session.create(64, "child", FileKind::File),
        Err(Error::OutOfRange(64))
    );
}

#[test]
fn full_directory_leaks_nothing() {
    // 64 字节的目录项，每个目录 64 个槽位；inode 足够多
    let profile = Profile {
        name_len: 60,
        ..Profile::extended(4096)
    };
    let disk = Arc::new(RamDisk::new(64, 4096));
    vsfs::format_with(disk.clone(), 64, profile, MountOptions::default()).unwrap();
    let session = vsfs::mount(disk).unwrap();

    // 64 个槽位去掉 "." 与 ".."
    for i in 0..62 {
        session
            .create(ROOT_INO, &format!("{i}"), FileKind::File)
            .unwrap_or_else(|err| panic!("create #{i}: {err}"));
    }
    let before = session.statfs();
    assert_eq!(
        session.create(ROOT_INO, "overflow", FileKind::File),
        Err(Error::DirFull)
    );
    assert_eq!(
        session.mkdir(ROOT_INO, "overflow"),
        Err(Error::DirFull)
    );
    assert_eq!(session.statfs(), before);

    // 腾出一个槽位后即可再次创建
    session.unlink(ROOT_INO, "30").unwrap();
    assert!(session.create(ROOT_INO, "overflow", FileKind::File).is_ok());
}

#[test]
fn inode_exhaustion() {
    let (_, session) = minimal();
    let mut inos = Vec::new();
    for i in 0..61 {
        inos.push(session.create(ROOT_INO, &format!("f{i}"), FileKind::File).unwrap());
    }
    assert_eq!(session.statfs().free_inodes, 0);
    assert_eq!(
        session.create(ROOT_INO, "one-more", FileKind::File),
        Err(Error::NoSpace)
    );

    // 释放任意一个之后恰好能再分配一个，且复用同一编号
    session.unlink(ROOT_INO, "f17").unwrap();
    assert_eq!(session.create(ROOT_INO, "again", FileKind::File), Ok(inos[17]));
    assert_eq!(
        session.create(ROOT_INO, "and-again", FileKind::File),
        Err(Error::NoSpace)
    );

    let mut sorted = inos.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), 61);
    assert!(sorted.iter().all(|&ino| ino > ROOT_INO));
}

#[test]
fn block_exhaustion_rolls_back_the_inode() {
    let (_, session) = minimal();
    let free = session.statfs();
    assert_eq!(free.free_blocks, 56);
    for i in 0..56 {
        session.mkdir(ROOT_INO, &format!("d{i}")).unwrap();
    }

    let before = session.statfs();
    assert_eq!(before.free_blocks, 0);
    assert_eq!(before.free_inodes, 5);
    assert_eq!(session.mkdir(ROOT_INO, "d56"), Err(Error::NoSpace));
    assert_eq!(session.statfs(), before);
    assert_eq!(session.lookup(ROOT_INO, "d56"), Err(Error::NotFound));

    // 文件的数据块在写入时才分配
    let file = session.create(ROOT_INO, "lazy", FileKind::File).unwrap();
    assert_eq!(session.write_file(file, 0, b"data"), Err(Error::NoSpace));
    assert_eq!(session.stat(file).unwrap().size, 0);
}

#[test]
fn write_and_read() {
    let (_, session) = small_blocks();
    let ino = session.create(ROOT_INO, "data", FileKind::File).unwrap();
    let payload: Vec<u8> = (0..1500u32).map(|i| (i % 251) as u8).collect();

    assert_eq!(session.write_file(ino, 100, &payload), Ok(1500));
    let stat = session.stat(ino).unwrap();
    assert_eq!(stat.size, 1600);
    // [100, 1600) 横跨第 0 到 3 块
    assert_eq!(stat.blocks, 4);
    assert_eq!(stat.mode, DirEntryType::Regular);

    assert_eq!(session.read_file(ino, 100, 1500).unwrap(), payload);
    assert_eq!(session.read_file(ino, 0, 100).unwrap(), vec![0; 100]);
    // 读取截止于文件末尾
    assert_eq!(session.read_file(ino, 1590, 100).unwrap(), &payload[1490..]);
    assert!(session.read_file(ino, 5000, 10).unwrap().is_empty());

    // 覆盖写不改变尺寸与块数
    session.write_file(ino, 0, b"head").unwrap();
    assert_eq!(session.read_file(ino, 0, 4).unwrap(), b"head");
    assert_eq!(session.stat(ino).unwrap().size, 1600);
    assert_eq!(session.stat(ino).unwrap().blocks, 4);
}

#[test]
fn sparse_writes_and_size_limit() {
    let (_, session) = small_blocks();
    let ino = session.create(ROOT_INO, "sparse", FileKind::File).unwrap();
    let free = session.statfs().free_blocks;

    session.write_file(ino, 5000, b"tail").unwrap();
    let stat = session.stat(ino).unwrap();
    assert_eq!(stat.size, 5004);
    assert_eq!(stat.blocks, 1);
    assert_eq!(session.statfs().free_blocks, free - 1);
    assert_eq!(session.read_file(ino, 4998, 10).unwrap(), b"\0\0tail");

    // 12 个直接索引 × 512 字节
    assert_eq!(session.write_file(ino, 6144, b"x"), Err(Error::FileTooBig));
    assert_eq!(session.write_file(ino, 6000, &[1; 200]), Err(Error::FileTooBig));
    assert_eq!(session.write_file(ino, 6143, b"x"), Ok(1));
    assert_eq!(session.stat(ino).unwrap().size, 6144);
}

#[test]
fn single_pointer_profile_holds_one_block() {
    let (_, session) = minimal();
    let ino = session.create(ROOT_INO, "f", FileKind::File).unwrap();
    assert_eq!(session.write_file(ino, 0, &[7; 4096]), Ok(4096));
    assert_eq!(session.write_file(ino, 4096, b"x"), Err(Error::FileTooBig));
    assert_eq!(session.read_file(ino, 4000, 200).unwrap(), vec![7; 96]);
}

#[test]
fn unlink_frees_everything() {
    let (_, session) = small_blocks();
    let before = session.statfs();
    let ino = session.create(ROOT_INO, "big", FileKind::File).unwrap();
    session.write_file(ino, 0, &[1; 3000]).unwrap();
    assert_eq!(session.statfs().free_blocks, before.free_blocks - 6);

    session.unlink(ROOT_INO, "big").unwrap();
    assert_eq!(session.statfs(), before);
    assert_eq!(session.lookup(ROOT_INO, "big"), Err(Error::NotFound));
    assert_eq!(session.stat(ino), Err(Error::BadInode(ino)));
    assert_eq!(session.unlink(ROOT_INO, "big"), Err(Error::NotFound));

    // 复用的 inode 是干净的
    let again = session.create(ROOT_INO, "again", FileKind::File).unwrap();
    assert_eq!(again, ino);
    assert_eq!(session.stat(again).unwrap().size, 0);
    assert_eq!(session.read_file(again, 0, 10).unwrap(), b"");
}

#[test]
fn directories() {
    let (_, session) = minimal();
    let docs = session.mkdir(ROOT_INO, "docs").unwrap();
    assert_eq!(session.stat(ROOT_INO).unwrap().links, 3);

    let stat = session.stat(docs).unwrap();
    assert_eq!(stat.mode, DirEntryType::Directory);
    assert_eq!(stat.links, 2);
    assert_eq!(stat.size, 4096);
    assert_eq!(stat.blocks, 1);
    assert_eq!(stat.perm, 0o755);
    assert_eq!(session.lookup(docs, ".."), Ok(ROOT_INO));
    assert_eq!(session.lookup(docs, "."), Ok(docs));

    let note = session.create(docs, "note", FileKind::File).unwrap();
    assert_eq!(session.resolve("/docs/note"), Ok(note));
    assert_eq!(session.resolve("/docs//note/"), Ok(note));
    assert_eq!(session.resolve("/"), Ok(ROOT_INO));
    assert_eq!(session.resolve("/docs/../docs"), Ok(docs));
    assert_eq!(session.resolve("docs"), Err(Error::InvalidName));
    assert_eq!(session.resolve("/docs/note/x"), Err(Error::NotADirectory));
    assert_eq!(session.resolve("/nope"), Err(Error::NotFound));

    assert_eq!(session.unlink(ROOT_INO, "docs"), Err(Error::IsADirectory));
    assert_eq!(session.rmdir(docs, "note"), Err(Error::NotADirectory));
    assert_eq!(session.rmdir(ROOT_INO, "docs"), Err(Error::DirectoryNotEmpty));
    assert_eq!(session.read_file(docs, 0, 1), Err(Error::IsADirectory));
    assert_eq!(session.write_file(docs, 0, b"x"), Err(Error::IsADirectory));

    let before = session.statfs();
    session.unlink(docs, "note").unwrap();
    session.rmdir(ROOT_INO, "docs").unwrap();
    assert_eq!(session.stat(ROOT_INO).unwrap().links, 2);
    assert_eq!(session.statfs().free_inodes, before.free_inodes + 2);
    assert_eq!(session.statfs().free_blocks, before.free_blocks + 1);
    assert_eq!(names(&session, ROOT_INO), [".", ".."]);
}

#[test]
fn read_dir_reports_kinds_and_skips_holes() {
    let (_, session) = minimal();
    let a = session.create(ROOT_INO, "a", FileKind::File).unwrap();
    session.create(ROOT_INO, "b", FileKind::File).unwrap();
    let c = session.mkdir(ROOT_INO, "c").unwrap();
    session.unlink(ROOT_INO, "b").unwrap();

    let entries: Vec<_> = session
        .read_dir(ROOT_INO)
        .unwrap()
        .map(Result::unwrap)
        .collect();
    let summary: Vec<_> = entries
        .iter()
        .map(|entry| (entry.name.as_str(), entry.inode, entry.ty))
        .collect();
    assert_eq!(
        summary,
        [
            (".", ROOT_INO as u64, DirEntryType::Directory),
            ("..", ROOT_INO as u64, DirEntryType::Directory),
            ("a", a as u64, DirEntryType::Regular),
            ("c", c as u64, DirEntryType::Directory),
        ]
    );

    // 删除留下的空洞由下一次创建填上
    session.create(ROOT_INO, "d", FileKind::File).unwrap();
    assert_eq!(names(&session, ROOT_INO), [".", "..", "a", "d", "c"]);
}

#[test]
fn read_dir_restarts_from_position() {
    let (_, session) = minimal();
    for name in ["a", "b", "c", "d"] {
        session.create(ROOT_INO, name, FileKind::File).unwrap();
    }

    let mut iter = session.read_dir(ROOT_INO).unwrap();
    let first: Vec<_> = iter.by_ref().take(3).map(|e| e.unwrap().name).collect();
    assert_eq!(first, [".", "..", "a"]);
    let pos = iter.position();
    drop(iter);

    let rest: Vec<_> = session
        .read_dir_from(ROOT_INO, pos)
        .unwrap()
        .map(|e| e.unwrap().name)
        .collect();
    assert_eq!(rest, ["b", "c", "d"]);

    let tail: Vec<_> = session
        .read_dir_from(ROOT_INO, 1)
        .unwrap()
        .map(|e| e.unwrap().name)
        .collect();
    assert_eq!(tail, ["..", "a", "b", "c", "d"]);
    assert_eq!(session.read_dir_from(ROOT_INO, 1000).unwrap().count(), 0);
}

#[test]
fn timestamps_and_owner() {
    let disk = Arc::new(RamDisk::new(64, 4096));
    let options = MountOptions {
        uid: 1000,
        gid: 100,
        clock: || 1_700_000_000,
    };
    vsfs::format_with(disk.clone(), 64, Profile::minimal(), options).unwrap();
    let session = Session::mount_with(disk, options).unwrap();

    let ino = session.create(ROOT_INO, "f", FileKind::File).unwrap();
    let stat = session.stat(ino).unwrap();
    assert_eq!((stat.uid, stat.gid), (1000, 100));
    assert_eq!(stat.perm, 0o644);
    assert_eq!(stat.links, 1);
    assert_eq!(stat.ctime, 1_700_000_000);
    assert_eq!(stat.atime, 1_700_000_000);
    assert_eq!(stat.mtime, 1_700_000_000);
    assert_eq!(session.stat(ROOT_INO).unwrap().mtime, 1_700_000_000);
    assert_eq!(stat.block_size, 4096);
}

#[test]
fn mount_rejects_foreign_images() {
    let blank = Arc::new(RamDisk::new(64, 4096));
    assert!(matches!(vsfs::mount(blank), Err(Error::BadMagic(0))));

    let garbage = Arc::new(RamDisk::new(64, 4096));
    garbage.write_block(0, &[0xab; 4096]).unwrap();
    assert!(matches!(
        vsfs::mount(garbage),
        Err(Error::BadMagic(0xabab_abab))
    ));

    // 魔数正确但布局被篡改
    let disk = Arc::new(RamDisk::new(64, 4096));
    vsfs::format(disk.clone(), 64, 4096).unwrap();
    let mut block = vec![0; 4096];
    disk.read_block(0, &mut block).unwrap();
    block[28..32].copy_from_slice(&9u32.to_le_bytes());
    disk.write_block(0, &block).unwrap();
    assert!(matches!(vsfs::mount(disk), Err(Error::InvalidLayout)));
}

#[test]
fn format_rejects_small_devices() {
    let disk = Arc::new(RamDisk::new(64, 4096));
    assert_eq!(
        vsfs::format_with(disk.clone(), 7, Profile::minimal(), MountOptions::default()),
        Err(Error::InvalidLayout)
    );
    // 设备本身比声称的块数小
    assert_eq!(vsfs::format(disk.clone(), 128, 4096), Err(Error::InvalidLayout));
    // 块大小与设备不符
    assert_eq!(vsfs::format(disk, 64, 512), Err(Error::InvalidLayout));
}

#[test]
fn independent_sessions() {
    let (_, one) = minimal();
    let (_, two) = minimal();
    let a = one.create(ROOT_INO, "a", FileKind::File).unwrap();
    let b = two.create(ROOT_INO, "b", FileKind::File).unwrap();
    // 两个实例的分配器互不影响
    assert_eq!(a, b);
    assert_eq!(one.statfs().free_inodes, two.statfs().free_inodes);
    assert_eq!(one.lookup(ROOT_INO, "b"), Err(Error::NotFound));
}

/// 改写设备上某一块的内容
fn patch(disk: &RamDisk, block_id: usize, f: impl FnOnce(&mut [u8])) {
    let mut block = vec![0; 4096];
    disk.read_block(block_id, &mut block).unwrap();
    f(&mut block);
    disk.write_block(block_id, &block).unwrap();
}

fn formatted() -> Arc<RamDisk> {
    let disk = Arc::new(RamDisk::new(64, 4096));
    vsfs::format(disk.clone(), 64, 4096).unwrap();
    disk
}

#[test]
fn mount_rejects_corrupt_images() {
    // inode 表块数大到相乘溢出
    let disk = formatted();
    patch(&disk, 0, |block| block[28..32].copy_from_slice(&u32::MAX.to_le_bytes()));
    assert!(matches!(vsfs::mount(disk), Err(Error::InvalidLayout)));

    // 文件名长度超过块大小
    let disk = formatted();
    patch(&disk, 0, |block| block[44..48].copy_from_slice(&u32::MAX.to_le_bytes()));
    assert!(matches!(vsfs::mount(disk), Err(Error::InvalidLayout)));

    // 保留的 inode 0、1 被标记为空闲
    let disk = formatted();
    patch(&disk, 1, |block| block[0] = 0b100);
    assert!(matches!(vsfs::mount(disk), Err(Error::BadInode(0))));

    // 超级块与位图所在的块被标记为空闲
    let disk = formatted();
    patch(&disk, 2, |block| block[0] = 0b1000_0000);
    assert!(matches!(vsfs::mount(disk), Err(Error::InvalidLayout)));

    // 根目录块被标记为空闲
    let disk = formatted();
    patch(&disk, 2, |block| block[0] = 0b0111_1111);
    assert!(matches!(vsfs::mount(disk), Err(Error::BadInode(ROOT_INO))));
}
