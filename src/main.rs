use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use colored::*;
use flatfs::disk::{BLOCK_SIZE, DEFAULT_TOTAL_BLOCKS};

use crate::shell::{start_shell, Session};

mod shell;

// 镜像最大 1 TiB
const MAX_IMAGE_BLOCKS: u64 = (1 << 40) / BLOCK_SIZE as u64;

/// 单目录文件系统的交互式命令行
#[derive(Debug, Parser)]
#[command(name = "flatfs", version, about)]
struct Cli {
    /// 存放文件系统的磁盘镜像
    #[arg(short, long, default_value = "storage.bin")]
    file: PathBuf,

    /// 用 N 个 inode 格式化镜像后直接退出
    #[arg(long, value_name = "N")]
    mkfs: Option<u32>,

    /// 新建镜像时的块数（每块 4KB）
    #[arg(
        long,
        default_value_t = DEFAULT_TOTAL_BLOCKS,
        value_parser = clap::value_parser!(u64).range(1..=MAX_IMAGE_BLOCKS)
    )]
    blocks: u64,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let mut session = Session::new(cli.file, cli.blocks);

    if let Some(max_inodes) = cli.mkfs {
        return match session.mkfs(max_inodes) {
            Ok(()) => {
                println!(
                    "✅ Formatted {} with {} inodes",
                    session.image().display().to_string().cyan(),
                    max_inodes
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{} {}", "❌ Error:".red().bold(), e);
                ExitCode::FAILURE
            }
        };
    }

    session.mount_existing();
    start_shell(session);
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_count_is_bounded() {
        let cli = Cli::try_parse_from(["flatfs"]).unwrap();
        assert_eq!(cli.blocks, DEFAULT_TOTAL_BLOCKS);

        assert!(Cli::try_parse_from(["flatfs", "--blocks", "0"]).is_err());
        let too_many = (MAX_IMAGE_BLOCKS + 1).to_string();
        assert!(Cli::try_parse_from(["flatfs", "--blocks", too_many.as_str()]).is_err());
        assert!(Cli::try_parse_from(["flatfs", "--blocks", "18446744073709551615"]).is_err());
    }
}
