//! 文件系统与宿主之间交换的数据结构

#![no_std]

extern crate alloc;

mod dirent;
mod stat;

pub use self::{
    dirent::{DirEntry, DirEntryType},
    stat::Stat,
};
