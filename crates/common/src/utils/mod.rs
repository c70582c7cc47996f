/// 工具函数集合

use rand::{distributions::Alphanumeric, Rng};
use uuid::Uuid;

/// API 令牌长度
const TOKEN_LENGTH: usize = 45;

/// 生成唯一 ID
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// 生成随机 API 令牌
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// 验证主机名格式
///
/// 规则: 以字母开头，仅允许字母、数字和连字符，长度小于 65
pub fn is_valid_hostname(hostname: &str) -> bool {
    if hostname.is_empty() || hostname.len() > 64 {
        return false;
    }

    let mut chars = hostname.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id() {
        let id1 = generate_id();
        let id2 = generate_id();
        assert_ne!(id1, id2);
        assert_eq!(id1.len(), 36); // UUID v4 格式
    }

    #[test]
    fn test_generate_token() {
        let token = generate_token();
        assert_eq!(token.len(), 45);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn test_is_valid_hostname() {
        assert!(is_valid_hostname("node1"));
        assert!(is_valid_hostname("jump-host"));
        assert!(is_valid_hostname("a"));

        // 不能以数字或连字符开头
        assert!(!is_valid_hostname("1node"));
        assert!(!is_valid_hostname("-node"));

        // 只允许字母数字和连字符
        assert!(!is_valid_hostname("node_1"));
        assert!(!is_valid_hostname("node.lab"));
        assert!(!is_valid_hostname(""));

        // 长度必须小于 65
        let long_name = format!("a{}", "b".repeat(64));
        assert!(!is_valid_hostname(&long_name));
        let ok_name = format!("a{}", "b".repeat(63));
        assert!(is_valid_hostname(&ok_name));
    }
}
