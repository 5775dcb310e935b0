//! flatfs：建立在定长块设备上的单目录文件系统。
//!
//! 自底向上分为块设备（`disk`）、位图与 inode 表、字节区间读写（`fs::FileSystem`），
//! 以及带硬链接和文件描述符的 `fs::vfs::Vfs`。

pub mod disk;
pub mod fs;
pub mod utils;

pub use disk::{BlockDevice, FileDisk, MemoryDisk};
pub use fs::{
    error::{FileSystemError, Result},
    open_file::{Fd, Whence},
    vfs::{FileStat, Vfs, VfsUsage},
    FileSystem, FsUsage,
};
