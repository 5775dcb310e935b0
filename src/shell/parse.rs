use std::str::FromStr;

use flatfs::{Fd, Whence};

use crate::shell::command::Command;

fn number<T: FromStr>(arg: Option<&&str>, what: &str) -> Result<T, String> {
    let arg = arg.ok_or_else(|| format!("missing {}", what))?;
    arg.parse()
        .map_err(|_| format!("invalid {}: {}", what, arg))
}

fn name(arg: Option<&&str>, what: &str) -> Result<String, String> {
    arg.map(|s| s.to_string())
        .ok_or_else(|| format!("missing {}", what))
}

fn whence(arg: Option<&&str>) -> Result<Whence, String> {
    match arg.copied() {
        None | Some("set") | Some("start") => Ok(Whence::Start),
        Some("cur") | Some("current") => Ok(Whence::Current),
        Some("end") => Ok(Whence::End),
        Some(other) => Err(format!("invalid whence: {} (use set, cur or end)", other)),
    }
}

/// 把一行输入解析成命令；`Ok(None)` 表示空行
pub fn parse_command(input: &str) -> Result<Option<Command>, String> {
    let tokens: Vec<&str> = input.trim().split_ascii_whitespace().collect();
    if tokens.is_empty() {
        return Ok(None);
    }

    let cmd = tokens[0].to_ascii_lowercase();
    let args = &tokens[1..];

    let command = match cmd.as_str() {
        "help" => Command::Help,
        "ls" => Command::Ls,
        "df" => Command::Df,
        "check" => Command::Check,
        "mkfs" => {
            let n: u32 = number(args.first(), "inode count")?;
            if n == 0 {
                return Err("inode count must be greater than 0".to_string());
            }
            Command::Mkfs(n)
        }
        "create" => Command::Create(name(args.first(), "file name")?),
        "open" => Command::Open(name(args.first(), "file name")?),
        "close" => Command::Close(number::<Fd>(args.first(), "fd")?),
        "seek" => Command::Seek(
            number::<Fd>(args.first(), "fd")?,
            number(args.get(1), "offset")?,
            whence(args.get(2))?,
        ),
        "read" => Command::Read(
            number::<Fd>(args.first(), "fd")?,
            number(args.get(1), "size")?,
        ),
        "write" => {
            let fd = number::<Fd>(args.first(), "fd")?;
            // 文本保留单词之间的单个空格；不给文本时进入交互输入
            let text = (args.len() >= 2).then(|| args[1..].join(" "));
            Command::Write(fd, text)
        }
        "link" => Command::Link(
            name(args.first(), "existing name")?,
            name(args.get(1), "new name")?,
        ),
        "unlink" | "rm" => Command::Unlink(name(args.first(), "file name")?),
        "truncate" => Command::Truncate(
            name(args.first(), "file name")?,
            number(args.get(1), "size")?,
        ),
        "stat" => Command::Stat(name(args.first(), "file name")?),
        "exit" | "quit" => Command::Exit,
        other => return Err(format!("unknown command: {}", other)),
    };

    Ok(Some(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_command() {
        assert_eq!(parse_command("mkfs 10"), Ok(Some(Command::Mkfs(10))));
        assert_eq!(
            parse_command("  create test.txt "),
            Ok(Some(Command::Create("test.txt".into())))
        );
        assert_eq!(
            parse_command("seek 0 -5 end"),
            Ok(Some(Command::Seek(0, -5, Whence::End)))
        );
        assert_eq!(
            parse_command("seek 1 20"),
            Ok(Some(Command::Seek(1, 20, Whence::Start)))
        );
        assert_eq!(parse_command("read 0 13"), Ok(Some(Command::Read(0, 13))));
        assert_eq!(
            parse_command("write 0 Hello,   World!"),
            Ok(Some(Command::Write(0, Some("Hello, World!".into()))))
        );
        assert_eq!(parse_command("write 2"), Ok(Some(Command::Write(2, None))));
        assert_eq!(
            parse_command("link a b"),
            Ok(Some(Command::Link("a".into(), "b".into())))
        );
        assert_eq!(
            parse_command("truncate a 100"),
            Ok(Some(Command::Truncate("a".into(), 100)))
        );
        assert_eq!(parse_command("QUIT"), Ok(Some(Command::Exit)));
        assert_eq!(parse_command("   "), Ok(None));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse_command("mkfs").is_err());
        assert!(parse_command("mkfs 0").is_err());
        assert!(parse_command("mkfs ten").is_err());
        assert!(parse_command("close -1").is_err());
        assert!(parse_command("seek 0 1 sideways").is_err());
        assert!(parse_command("truncate a -1").is_err());
        assert!(parse_command("link a").is_err());
        assert!(parse_command("format").is_err());
    }
}
