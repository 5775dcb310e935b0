use chrono::{DateTime, Local, Utc};

pub fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// 把 unix 秒格式化成本地时间，用于 stat 输出
pub fn format_timestamp(secs: i64) -> String {
    match DateTime::from_timestamp(secs, 0) {
        Some(time) => time
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => "-".to_string(),
    }
}

/// 能按 UTF-8 解码就显示文本，否则显示十六进制
pub fn render_bytes(data: &[u8]) -> String {
    match std::str::from_utf8(data) {
        Ok(text) => format!("'{}'", text),
        Err(_) => data.iter().map(|b| format!("{:02x}", b)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_text_or_hex() {
        assert_eq!(render_bytes(b"Hello"), "'Hello'");
        assert_eq!(render_bytes(&[0xff, 0x00, 0x1a]), "ff001a");
    }

    #[test]
    fn epoch_formats() {
        assert!(!format_timestamp(0).is_empty());
        assert!(current_timestamp() > 0);
    }
}
