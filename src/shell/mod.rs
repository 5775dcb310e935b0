pub mod command;
pub mod parse;

use std::path::{Path, PathBuf};

use colored::*;
use dialoguer::Confirm;
use flatfs::{fs::super_block::SuperBlock, BlockDevice, FileDisk, FileSystemError, Vfs};
use log::debug;
use reedline::{DefaultCompleter, DefaultPrompt, DefaultPromptSegment, FileBackedHistory, Reedline, Signal};

use crate::shell::{command::execute_command, parse::parse_command};

const NOT_MOUNTED: &str = "no file system is mounted, run `mkfs <n>` first";

/// 命令循环的全部状态：磁盘镜像位置和（可能还没有的）已挂载卷
pub struct Session {
    image: PathBuf,
    total_blocks: u64,
    vfs: Option<Vfs>,
}

impl Session {
    pub fn new(image: PathBuf, total_blocks: u64) -> Self {
        Self {
            image,
            total_blocks,
            vfs: None,
        }
    }

    pub fn image(&self) -> &Path {
        &self.image
    }

    /// 镜像存在且带有文件系统时挂载它
    pub fn mount_existing(&mut self) {
        if !self.image.exists() {
            println!(
                "{} {}",
                "No file system found at".yellow(),
                self.image.display()
            );
            return;
        }

        match FileDisk::open(&self.image).and_then(|disk| Vfs::mount(Box::new(disk))) {
            Ok(vfs) => {
                println!(
                    "{} {}",
                    "📁 Loaded file system from".green(),
                    self.image.display()
                );
                self.vfs = Some(vfs);
            }
            Err(FileSystemError::NotFormatted) => println!(
                "{} {}",
                "No file system found at".yellow(),
                self.image.display()
            ),
            Err(e) => println!("{} {}", "❌ Failed to mount:".red().bold(), e),
        }
    }

    pub fn vfs(&self) -> Result<&Vfs, String> {
        self.vfs.as_ref().ok_or_else(|| NOT_MOUNTED.to_string())
    }

    pub fn vfs_mut(&mut self) -> Result<&mut Vfs, String> {
        self.vfs.as_mut().ok_or_else(|| NOT_MOUNTED.to_string())
    }

    /// 已挂载的卷格式化前需要用户确认
    pub fn confirm_reformat(&self) -> Result<bool, dialoguer::Error> {
        if self.vfs.is_none() {
            return Ok(true);
        }
        Confirm::new()
            .with_prompt("This erases every file on the volume. Continue?")
            .default(false)
            .interact()
    }

    /// 在镜像上重新建立文件系统，复用已经打开的磁盘。
    /// 参数不合法时当前挂载的卷保持不变
    pub fn mkfs(&mut self, max_inodes: u32) -> Result<(), FileSystemError> {
        let device_blocks = match &self.vfs {
            Some(vfs) => vfs.device_blocks(),
            None if self.image.exists() => FileDisk::open(&self.image)?.total_blocks(),
            None => self.total_blocks,
        };
        SuperBlock::new(device_blocks, max_inodes)?;

        let disk: Box<dyn BlockDevice> = match self.vfs.take() {
            Some(vfs) => vfs.into_disk(),
            None if self.image.exists() => Box::new(FileDisk::open(&self.image)?),
            None => Box::new(FileDisk::create(&self.image, self.total_blocks)?),
        };
        self.vfs = Some(Vfs::mkfs(disk, max_inodes)?);
        Ok(())
    }

    pub fn shutdown(&mut self) {
        if let Some(vfs) = self.vfs.as_mut() {
            if let Err(e) = vfs.sync() {
                println!("{} {}", "❌ Failed to flush the disk image:".red().bold(), e);
            }
        }
    }
}

pub fn start_shell(mut session: Session) {
    let username = whoami::username();
    let hostname = whoami::fallible::hostname().unwrap_or_else(|_| String::from("localhost"));

    println!("{}", "Welcome to flatfs".cyan().bold());
    println!(
        "{}",
        "Type 'help' for available commands. Use ↑↓ for history.\n".bright_black()
    );

    // 初始化 reedline
    let history_path = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".flatfs_history");

    let mut line_editor = Reedline::create();
    match FileBackedHistory::with_file(100, history_path) {
        Ok(history) => line_editor = line_editor.with_history(Box::new(history)),
        Err(e) => debug!("shell history disabled: {}", e),
    }

    // 命令补全
    let commands: Vec<String> = [
        "help", "mkfs", "create", "open", "close", "seek", "read", "write", "link", "unlink",
        "truncate", "stat", "ls", "df", "check", "exit",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let completer = DefaultCompleter::new_with_wordlen(commands, 2);
    line_editor = line_editor.with_completer(Box::new(completer));

    loop {
        let prompt = DefaultPrompt::new(
            DefaultPromptSegment::Basic(format!("{}@{}", username, hostname)),
            DefaultPromptSegment::Basic(session.image().display().to_string()),
        );

        match line_editor.read_line(&prompt) {
            Ok(Signal::Success(buffer)) => match parse_command(&buffer) {
                Ok(None) => continue,
                Ok(Some(cmd)) => {
                    if let Err(e) = execute_command(&cmd, &mut session) {
                        println!("{} {}", "❌ Error:".red().bold(), e);
                    }
                    if matches!(cmd, command::Command::Exit) {
                        break;
                    }
                }
                Err(msg) => println!(
                    "{} {}. Type 'help' for command list.",
                    "⚠️ ".yellow(),
                    msg.yellow()
                ),
            },
            Ok(Signal::CtrlC) => {
                println!();
                continue;
            }
            Ok(Signal::CtrlD) => break,
            Ok(_) => continue,
            Err(e) => {
                println!("Error reading line: {}", e);
                break;
            }
        }
    }

    session.shutdown();
    println!("{}", "👋 Bye!".bright_yellow());
}
