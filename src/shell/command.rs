use std::error::Error;

use colored::*;
use dialoguer::Input;
use flatfs::{
    utils::{format_timestamp, render_bytes},
    Fd, Whence,
};

use crate::shell::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Ls,
    Df,
    Check,
    Mkfs(u32),
    Create(String),
    Open(String),
    Close(Fd),
    Seek(Fd, i64, Whence),
    Read(Fd, usize),
    Write(Fd, Option<String>),
    Link(String, String),
    Unlink(String),
    Truncate(String, u64),
    Stat(String),
    Exit,
}

pub fn execute_command(cmd: &Command, session: &mut Session) -> Result<(), Box<dyn Error>> {
    match cmd {
        Command::Help => print_help(),
        Command::Exit => {}
        Command::Mkfs(n) => {
            if !session.confirm_reformat()? {
                println!("{}", "Format cancelled.".yellow());
                return Ok(());
            }
            session.mkfs(*n)?;
            println!("✅ File system created with {} inodes", n.to_string().green());
        }
        Command::Ls => {
            let names = session.vfs()?.list();
            if names.is_empty() {
                println!("{}", "(empty directory)".bright_black());
            }
            for name in names {
                let stat = session.vfs()?.stat(&name)?;
                println!(
                    "📄  {:<24} {} {}",
                    name,
                    format!("inode {}", stat.inode_id).cyan(),
                    format!("{} bytes", stat.size).bright_black()
                );
            }
        }
        Command::Df => {
            let usage = session.vfs()?.usage();
            println!("{}", "💾 Volume usage".bright_yellow().bold());
            println!(
                "{}: {} / {} free",
                "Data blocks".blue(),
                usage.fs.free_blocks,
                usage.fs.data_blocks
            );
            println!(
                "{}: {} / {} free",
                "Inodes".blue(),
                usage.fs.free_inodes,
                usage.fs.max_inodes
            );
            println!("{}: {}", "Names".blue(), usage.files);
            println!("{}: {}", "Open descriptors".blue(), usage.open_descriptors);
        }
        Command::Check => {
            session.vfs()?.check()?;
            println!("✅ {}", "File system is consistent".green());
        }
        Command::Create(name) => {
            let id = session.vfs_mut()?.create(name)?;
            println!("📝 Created file: {} (inode {})", name.green(), id);
        }
        Command::Open(name) => {
            let fd = session.vfs_mut()?.open(name)?;
            println!("📂 fd = {}", fd.to_string().green().bold());
        }
        Command::Close(fd) => {
            session.vfs_mut()?.close(*fd)?;
            println!("🔒 Closed fd {}", fd);
        }
        Command::Seek(fd, offset, whence) => {
            let pos = session.vfs_mut()?.seek(*fd, *offset, *whence)?;
            println!("📍 fd {} is now at offset {}", fd, pos.to_string().cyan());
        }
        Command::Read(fd, size) => {
            let data = session.vfs_mut()?.read(*fd, *size)?;
            println!("📖 Read {} bytes:", data.len().to_string().cyan());
            println!("{}", render_bytes(&data));
        }
        Command::Write(fd, text) => {
            // 先确认描述符有效，再提示输入
            session.vfs()?.fstat(*fd)?;
            let text = match text {
                Some(text) => text.clone(),
                None => Input::<String>::new()
                    .with_prompt("Text to write")
                    .allow_empty(true)
                    .interact_text()?,
            };
            let written = session.vfs_mut()?.write(*fd, text.as_bytes())?;
            println!("✏️  Wrote {} bytes", written.to_string().green());
        }
        Command::Link(existing, new_name) => {
            session.vfs_mut()?.link(existing, new_name)?;
            println!("🔗 Linked {} -> {}", new_name.green(), existing);
        }
        Command::Unlink(name) => {
            session.vfs_mut()?.unlink(name)?;
            println!("❌ Removed name: {}", name.red());
        }
        Command::Truncate(name, size) => {
            session.vfs_mut()?.truncate(name, *size)?;
            println!("✂️  {} is now {} bytes", name.cyan(), size);
        }
        Command::Stat(name) => {
            let stat = session.vfs()?.stat(name)?;
            println!(
                "{}\n{}: {}\n{}: {}\n{}: {:?}\n{}: {}\n{}: {} bytes\n{}: {}\n{}: {}\n{}: {}",
                "📊 File Info".bright_yellow().bold(),
                "Name".blue(),
                name,
                "Inode".blue(),
                stat.inode_id,
                "Type".blue(),
                stat.kind,
                "Links".blue(),
                stat.link_count,
                "Size".blue(),
                stat.size,
                "Blocks".blue(),
                stat.blocks_used,
                "Created".blue(),
                format_timestamp(stat.created),
                "Modified".blue(),
                format_timestamp(stat.modified),
            );
        }
    }

    Ok(())
}

fn print_help() {
    println!("{}", "📘 flatfs Commands".bright_cyan().bold());
    println!(
        "{}",
        "
  mkfs <n>                    Format the volume with n inodes
  create <name>               Create an empty file
  open <name>                 Open a file, prints its fd
  close <fd>                  Close a descriptor
  seek <fd> <off> [set|cur|end]  Move the cursor of a descriptor
  read <fd> <n>               Read up to n bytes at the cursor
  write <fd> [text]           Write text at the cursor (prompts if omitted)
  link <name> <new>           Add a hard link
  unlink <name>               Remove a name
  truncate <name> <size>      Resize a file
  stat <name>                 Show file info
  ls                          List files
  df                          Show free blocks and inodes
  check                       Verify file system consistency
  help                        Show this help message
  exit                        Quit the shell
"
        .bright_black()
    );
}
