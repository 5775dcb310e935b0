//! 面向命令行的一层：根目录、硬链接计数和文件描述符。
//!
//! `Vfs` 是唯一的上下文对象，持有 `FileSystem`、`Directory` 和 `OpenFileTable`，
//! 命令循环的每条命令对应这里的一个方法。

use log::{debug, info};

use crate::{
    disk::BlockDevice,
    fs::{
        directory::Directory,
        error::{FileSystemError, Result},
        inode_table::{Inode, InodeKind},
        open_file::{Fd, OpenFileTable, Whence},
        super_block::SuperBlock,
        FileSystem, FsUsage,
    },
};

/// stat 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub inode_id: u32,
    pub kind: InodeKind,
    pub size: u64,
    pub link_count: u32,
    pub blocks_used: u32,
    pub created: i64,
    pub modified: i64,
}

impl FileStat {
    fn new(inode_id: u32, inode: &Inode) -> Self {
        Self {
            inode_id,
            kind: inode.kind,
            size: inode.size,
            link_count: inode.link_count,
            blocks_used: inode.blocks_used,
            created: inode.created,
            modified: inode.modified,
        }
    }
}

/// df 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VfsUsage {
    pub fs: FsUsage,
    pub files: usize,
    pub open_descriptors: usize,
}

#[derive(Debug)]
pub struct Vfs {
    fs: FileSystem,
    directory: Directory,
    open_files: OpenFileTable,
}

impl Vfs {
    /// 在磁盘上创建新的文件系统，原有内容全部丢弃
    pub fn mkfs(disk: Box<dyn BlockDevice>, max_inodes: u32) -> Result<Self> {
        let mut fs = FileSystem::format(disk, max_inodes)?;
        let directory = Directory::new(fs.super_block());
        fs.sync_directory(&directory)?;

        Ok(Self {
            fs,
            directory,
            open_files: OpenFileTable::new(),
        })
    }

    /// 挂载磁盘上已有的文件系统，元数据不一致时报告 Corrupted
    pub fn mount(disk: Box<dyn BlockDevice>) -> Result<Self> {
        let fs = FileSystem::mount(disk)?;
        let directory = fs.load_directory()?;

        let vfs = Self {
            fs,
            directory,
            open_files: OpenFileTable::new(),
        };
        vfs.check()?;

        info!("directory holds {} names", vfs.directory.len());
        Ok(vfs)
    }

    /// 关闭所有描述符并交还磁盘，已无名字的文件会在下次挂载时回收
    pub fn into_disk(self) -> Box<dyn BlockDevice> {
        self.fs.into_disk()
    }

    pub fn super_block(&self) -> &SuperBlock {
        self.fs.super_block()
    }

    pub fn device_blocks(&self) -> u64 {
        self.fs.device_blocks()
    }

    pub fn create(&mut self, name: &str) -> Result<u32> {
        self.directory.check_insert(name)?;

        let id = self.fs.alloc_inode()?;
        self.fs.inc_link(id)?;
        self.directory.add(name, id)?;
        self.fs.sync_directory(&self.directory)?;

        debug!("created {} as inode {}", name, id);
        Ok(id)
    }

    pub fn link(&mut self, existing: &str, new_name: &str) -> Result<()> {
        let id = self.directory.find(existing)?;
        self.directory.check_insert(new_name)?;

        self.fs.inc_link(id)?;
        self.directory.add(new_name, id)?;
        self.fs.sync_directory(&self.directory)?;

        debug!("linked {} -> inode {}", new_name, id);
        Ok(())
    }

    /// 删除一个名字。最后一个名字消失且没有打开的描述符时立即释放 inode，
    /// 否则推迟到最后一次 close
    pub fn unlink(&mut self, name: &str) -> Result<()> {
        let id = self.directory.remove(name)?;
        self.fs.sync_directory(&self.directory)?;

        let links = self.fs.dec_link(id)?;
        if links == 0 {
            if self.open_files.is_open(id) {
                debug!("inode {} unlinked while open, freeing on last close", id);
            } else {
                self.fs.free_inode(id)?;
            }
        }
        Ok(())
    }

    pub fn stat(&self, name: &str) -> Result<FileStat> {
        let id = self.directory.find(name)?;
        Ok(FileStat::new(id, self.fs.inode(id)?))
    }

    pub fn fstat(&self, fd: Fd) -> Result<FileStat> {
        let id = self.open_files.get(fd)?.inode_id;
        Ok(FileStat::new(id, self.fs.inode(id)?))
    }

    pub fn list(&self) -> Vec<String> {
        self.directory.list_sorted()
    }

    pub fn open(&mut self, name: &str) -> Result<Fd> {
        let id = self.directory.find(name)?;
        Ok(self.open_files.open(id))
    }

    pub fn close(&mut self, fd: Fd) -> Result<()> {
        let file = self.open_files.close(fd)?;
        let id = file.inode_id;

        if !self.open_files.is_open(id) && self.fs.inode(id)?.link_count == 0 {
            debug!("last descriptor of unlinked inode {} closed", id);
            self.fs.free_inode(id)?;
        }
        Ok(())
    }

    pub fn read(&mut self, fd: Fd, len: usize) -> Result<Vec<u8>> {
        let file = *self.open_files.get(fd)?;
        let data = self.fs.read(file.inode_id, file.cursor, len)?;
        self.open_files.get_mut(fd)?.cursor += data.len() as u64;
        Ok(data)
    }

    /// 在游标处写入；失败时游标保持不动
    pub fn write(&mut self, fd: Fd, data: &[u8]) -> Result<usize> {
        let file = *self.open_files.get(fd)?;
        let written = self.fs.write(file.inode_id, file.cursor, data)?;
        self.open_files.get_mut(fd)?.cursor += written as u64;
        Ok(written)
    }

    pub fn seek(&mut self, fd: Fd, position: i64, whence: Whence) -> Result<u64> {
        let id = self.open_files.get(fd)?.inode_id;
        let size = self.fs.inode(id)?.size;
        self.open_files.seek(fd, position, whence, size)
    }

    pub fn truncate(&mut self, name: &str, size: u64) -> Result<()> {
        let id = self.directory.find(name)?;
        self.fs.truncate(id, size)
    }

    pub fn usage(&self) -> VfsUsage {
        VfsUsage {
            fs: self.fs.usage(),
            files: self.directory.len(),
            open_descriptors: self.open_files.len(),
        }
    }

    /// 完整的一致性检查：位图与 inode 表，以及链接数与目录项
    pub fn check(&self) -> Result<()> {
        self.fs.check()?;

        for (name, id) in self.directory.iter() {
            self.fs.inode(id).map_err(|_| {
                FileSystemError::Corrupted(format!("{} points at free inode {}", name, id))
            })?;
        }

        for (id, inode) in self.fs.inodes() {
            let references = self.directory.references(id);
            if inode.link_count != references {
                return Err(FileSystemError::Corrupted(format!(
                    "inode {} has link count {} but {} names",
                    id, inode.link_count, references
                )));
            }
            if references == 0 && !self.open_files.is_open(id) {
                return Err(FileSystemError::Corrupted(format!(
                    "inode {} is neither named nor open",
                    id
                )));
            }
        }
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.fs.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::{MemoryDisk, DEFAULT_TOTAL_BLOCKS};

    fn new_vfs(max_inodes: u32) -> Vfs {
        Vfs::mkfs(Box::new(MemoryDisk::new(DEFAULT_TOTAL_BLOCKS)), max_inodes).unwrap()
    }

    #[test]
    fn hello_world_scenario() {
        let mut vfs = new_vfs(10);
        vfs.create("test.txt").unwrap();
        let fd = vfs.open("test.txt").unwrap();
        assert_eq!(fd, 0);
        assert_eq!(vfs.write(fd, b"Hello, World!").unwrap(), 13);
        assert_eq!(vfs.seek(fd, 0, Whence::Start).unwrap(), 0);
        assert_eq!(vfs.read(fd, 13).unwrap(), b"Hello, World!");

        let stat = vfs.stat("test.txt").unwrap();
        assert_eq!(stat.link_count, 1);
        assert_eq!(stat.size, 13);
        assert_eq!(stat.blocks_used, 1);
        vfs.check().unwrap();
    }

    #[test]
    fn create_rejects_duplicates_and_bad_names() {
        let mut vfs = new_vfs(4);
        vfs.create("a").unwrap();
        assert!(matches!(
            vfs.create("a"),
            Err(FileSystemError::AlreadyExists(_))
        ));
        assert!(matches!(
            vfs.create(""),
            Err(FileSystemError::InvalidName(_))
        ));
        // 失败的 create 不能消耗 inode
        assert_eq!(vfs.usage().fs.free_inodes, 3);
    }

    #[test]
    fn hard_links_share_content_and_count() {
        let mut vfs = new_vfs(4);
        let id = vfs.create("a").unwrap();
        vfs.link("a", "b").unwrap();
        assert_eq!(vfs.stat("a").unwrap().link_count, 2);
        assert_eq!(vfs.stat("b").unwrap().inode_id, id);

        let fd = vfs.open("b").unwrap();
        vfs.write(fd, b"shared").unwrap();
        vfs.close(fd).unwrap();
        assert_eq!(vfs.stat("a").unwrap().size, 6);

        vfs.unlink("a").unwrap();
        assert_eq!(vfs.stat("b").unwrap().link_count, 1);
        assert!(matches!(vfs.stat("a"), Err(FileSystemError::NotFound(_))));
        vfs.check().unwrap();

        assert!(matches!(
            vfs.link("missing", "c"),
            Err(FileSystemError::NotFound(_))
        ));
        vfs.create("c").unwrap();
        assert!(matches!(
            vfs.link("b", "c"),
            Err(FileSystemError::AlreadyExists(_))
        ));
    }

    #[test]
    fn unlink_frees_immediately_when_closed() {
        let mut vfs = new_vfs(4);
        vfs.create("f").unwrap();
        let fd = vfs.open("f").unwrap();
        vfs.write(fd, &[7u8; 5000]).unwrap();
        vfs.close(fd).unwrap();

        vfs.unlink("f").unwrap();
        let usage = vfs.usage().fs;
        assert_eq!(usage.free_inodes, 4);
        assert_eq!(usage.free_blocks, usage.data_blocks);
    }

    #[test]
    fn unlink_while_open_defers_free_until_last_close() {
        let mut vfs = new_vfs(4);
        let id = vfs.create("temp.txt").unwrap();
        let fd1 = vfs.open("temp.txt").unwrap();
        let fd2 = vfs.open("temp.txt").unwrap();
        vfs.write(fd1, b"Temporary data").unwrap();

        vfs.unlink("temp.txt").unwrap();
        assert!(!vfs.list().contains(&"temp.txt".to_string()));
        vfs.check().unwrap();

        // 通过描述符仍然可以读写
        vfs.seek(fd1, 0, Whence::Start).unwrap();
        assert_eq!(vfs.read(fd1, 20).unwrap(), b"Temporary data");
        assert_eq!(vfs.fstat(fd2).unwrap().link_count, 0);

        vfs.close(fd1).unwrap();
        assert_eq!(vfs.fstat(fd2).unwrap().inode_id, id);
        assert_eq!(vfs.usage().fs.free_inodes, 3);

        vfs.close(fd2).unwrap();
        let usage = vfs.usage().fs;
        assert_eq!(usage.free_inodes, 4);
        assert_eq!(usage.free_blocks, usage.data_blocks);
        vfs.check().unwrap();
    }

    #[test]
    fn cursor_moves_with_reads_and_writes() {
        let mut vfs = new_vfs(4);
        vfs.create("f").unwrap();
        let fd = vfs.open("f").unwrap();
        vfs.write(fd, b"1234567890").unwrap();

        vfs.seek(fd, 5, Whence::Start).unwrap();
        assert_eq!(vfs.read(fd, 10).unwrap(), b"67890");
        // 已到末尾
        assert!(vfs.read(fd, 100).unwrap().is_empty());

        assert_eq!(vfs.seek(fd, -3, Whence::End).unwrap(), 7);
        assert_eq!(vfs.read(fd, 2).unwrap(), b"89");
        assert_eq!(vfs.seek(fd, 0, Whence::Current).unwrap(), 9);
        assert!(matches!(
            vfs.seek(fd, -100, Whence::Current),
            Err(FileSystemError::InvalidOffset(_))
        ));
    }

    #[test]
    fn failed_write_keeps_cursor() {
        let mut vfs = new_vfs(4);
        vfs.create("f").unwrap();
        let fd = vfs.open("f").unwrap();
        let limit = crate::fs::config::MAX_FILE_SIZE as i64;
        vfs.seek(fd, limit - 1, Whence::Start).unwrap();

        assert!(matches!(
            vfs.write(fd, b"xy"),
            Err(FileSystemError::FileTooLarge { .. })
        ));
        assert_eq!(vfs.seek(fd, 0, Whence::Current).unwrap(), limit as u64 - 1);
        assert_eq!(vfs.write(fd, b"x").unwrap(), 1);
        assert_eq!(vfs.stat("f").unwrap().size, limit as u64);
    }

    #[test]
    fn descriptors_are_validated() {
        let mut vfs = new_vfs(4);
        assert!(matches!(vfs.read(9, 1), Err(FileSystemError::BadDescriptor(9))));
        assert!(matches!(vfs.write(9, b"x"), Err(FileSystemError::BadDescriptor(9))));
        assert!(matches!(
            vfs.seek(9, 0, Whence::Start),
            Err(FileSystemError::BadDescriptor(9))
        ));
        assert!(matches!(vfs.close(9), Err(FileSystemError::BadDescriptor(9))));
        assert!(matches!(vfs.open("nope"), Err(FileSystemError::NotFound(_))));
        assert!(matches!(
            vfs.truncate("nope", 1),
            Err(FileSystemError::NotFound(_))
        ));
    }

    #[test]
    fn remount_keeps_names_and_data() {
        let mut vfs = new_vfs(8);
        vfs.create("a").unwrap();
        vfs.link("a", "b").unwrap();
        let fd = vfs.open("a").unwrap();
        vfs.write(fd, b"persisted").unwrap();

        let mut vfs = Vfs::mount(vfs.into_disk()).unwrap();
        assert_eq!(vfs.list(), vec!["a", "b"]);
        assert_eq!(vfs.stat("b").unwrap().link_count, 2);
        let fd = vfs.open("b").unwrap();
        assert_eq!(fd, 0);
        assert_eq!(vfs.read(fd, 100).unwrap(), b"persisted");
        vfs.check().unwrap();
    }

    #[test]
    fn remount_reclaims_unlinked_open_file() {
        let mut vfs = new_vfs(8);
        vfs.create("gone").unwrap();
        let fd = vfs.open("gone").unwrap();
        vfs.write(fd, &[1u8; 9000]).unwrap();
        vfs.unlink("gone").unwrap();
        assert_eq!(vfs.usage().fs.free_inodes, 7);

        let vfs = Vfs::mount(vfs.into_disk()).unwrap();
        let usage = vfs.usage().fs;
        assert_eq!(usage.free_inodes, 8);
        assert_eq!(usage.free_blocks, usage.data_blocks);
        vfs.check().unwrap();
    }
}
