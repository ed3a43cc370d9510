//! 字节格式识别与解码

use std::path::Path;

use serde_json::Value as JsonValue;

use crate::error::{ConfigError, Result};

/// 支持的配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
    Toml,
}

impl Format {
    /// 按文件扩展名识别格式
    ///
    /// 扩展名检查在任何 IO 之前进行，未知扩展名返回 Format 错误。
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        match ext {
            "json" => Ok(Format::Json),
            "yaml" | "yml" => Ok(Format::Yaml),
            "toml" => Ok(Format::Toml),
            _ => Err(ConfigError::Format(path.display().to_string())),
        }
    }

    /// 解码字节数据为通用嵌套值
    pub fn decode(&self, data: &[u8]) -> Result<JsonValue> {
        match self {
            Format::Json => serde_json::from_slice(data)
                .map_err(|e| ConfigError::Value(e.to_string())),
            Format::Yaml => serde_yaml::from_slice(data)
                .map_err(|e| ConfigError::Value(e.to_string())),
            Format::Toml => {
                let text = std::str::from_utf8(data)
                    .map_err(|e| ConfigError::Value(e.to_string()))?;
                toml::from_str(text).map_err(|e| ConfigError::Value(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path() {
        assert_eq!(Format::from_path("app.json").unwrap(), Format::Json);
        assert_eq!(Format::from_path("/etc/app.yaml").unwrap(), Format::Yaml);
        assert_eq!(Format::from_path("app.yml").unwrap(), Format::Yaml);
        assert_eq!(Format::from_path("app.toml").unwrap(), Format::Toml);
    }

    #[test]
    fn test_from_path_unknown_extension() {
        assert!(matches!(
            Format::from_path("app.xml"),
            Err(ConfigError::Format(_))
        ));
        assert!(matches!(
            Format::from_path("noext"),
            Err(ConfigError::Format(_))
        ));
    }

    #[test]
    fn test_decode_json() {
        let value = Format::Json.decode(br#"{"foo": 1}"#).unwrap();
        assert_eq!(value["foo"], 1);
    }

    #[test]
    fn test_decode_yaml() {
        let value = Format::Yaml.decode(b"foo: bar\nsub:\n  flag: true\n").unwrap();
        assert_eq!(value["foo"], "bar");
        assert_eq!(value["sub"]["flag"], true);
    }

    #[test]
    fn test_decode_toml() {
        let value = Format::Toml
            .decode(b"foo = \"bar\"\n[sub]\nflag = true\n")
            .unwrap();
        assert_eq!(value["foo"], "bar");
        assert_eq!(value["sub"]["flag"], true);
    }

    #[test]
    fn test_decode_invalid() {
        assert!(matches!(
            Format::Json.decode(b"{broken"),
            Err(ConfigError::Value(_))
        ));
        assert!(matches!(
            Format::Toml.decode(&[0xff, 0xfe]),
            Err(ConfigError::Value(_))
        ));
    }
}
