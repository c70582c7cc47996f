/// cloud-init 用户数据生成
///
/// 基础 cloud-config 与预约相关片段（主机名、授权 SSH 公钥）深合并成
/// 一份 YAML 文档: 映射按键合并，序列拼接，标量取覆盖值

use serde_yaml::Value as YamlValue;

/// 递归深合并，overlay 优先
pub fn deep_merge(base: YamlValue, overlay: YamlValue) -> YamlValue {
    match (base, overlay) {
        (YamlValue::Mapping(mut base_map), YamlValue::Mapping(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            YamlValue::Mapping(base_map)
        }
        (YamlValue::Sequence(mut base_seq), YamlValue::Sequence(overlay_seq)) => {
            base_seq.extend(overlay_seq);
            YamlValue::Sequence(base_seq)
        }
        (_, overlay) => overlay,
    }
}

/// 基础 cloud-config
fn base_config() -> YamlValue {
    serde_yaml::from_str(
        r#"
package_update: true
packages:
  - openssh-server
"#,
    )
    .unwrap_or(YamlValue::Null)
}

/// 为一台主机生成完整的 cloud-config 文档
pub fn render_userdata(hostname: &str, ssh_keys: &[String]) -> anyhow::Result<String> {
    let fragment = serde_yaml::to_value(serde_yaml::Mapping::from_iter([
        (
            YamlValue::from("hostname"),
            YamlValue::from(hostname),
        ),
        (
            YamlValue::from("ssh_authorized_keys"),
            YamlValue::Sequence(ssh_keys.iter().map(|k| YamlValue::from(k.as_str())).collect()),
        ),
    ]))?;

    let merged = deep_merge(base_config(), fragment);
    let body = serde_yaml::to_string(&merged)?;
    Ok(format!("#cloud-config\n{}", body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> YamlValue {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn test_deep_merge_maps_merge_keywise() {
        let base = yaml("a: 1\nb:\n  c: 2");
        let overlay = yaml("b:\n  d: 3\ne: 4");
        let merged = deep_merge(base, overlay);

        assert_eq!(merged["a"], yaml("1"));
        assert_eq!(merged["b"]["c"], yaml("2"));
        assert_eq!(merged["b"]["d"], yaml("3"));
        assert_eq!(merged["e"], yaml("4"));
    }

    #[test]
    fn test_deep_merge_sequences_concat() {
        let base = yaml("packages:\n  - vim");
        let overlay = yaml("packages:\n  - git");
        let merged = deep_merge(base, overlay);

        let packages = merged["packages"].as_sequence().unwrap();
        assert_eq!(packages.len(), 2);
    }

    #[test]
    fn test_deep_merge_scalar_overrides() {
        let base = yaml("hostname: old");
        let overlay = yaml("hostname: new");
        let merged = deep_merge(base, overlay);
        assert_eq!(merged["hostname"], yaml("new"));
    }

    #[test]
    fn test_render_userdata() {
        let keys = vec!["ssh-ed25519 AAAA user@host".to_string()];
        let doc = render_userdata("node1", &keys).unwrap();

        assert!(doc.starts_with("#cloud-config\n"));
        assert!(doc.contains("hostname: node1"));
        assert!(doc.contains("ssh-ed25519 AAAA user@host"));
        // 基础配置保留
        assert!(doc.contains("openssh-server"));
    }
}
