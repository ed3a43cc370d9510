//! 配置来源
//!
//! 本地文件（notify 监听）、HTTP 地址（定时轮询）、环境变量（定时轮询），
//! 以及按地址形态分发的 read 入口。

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{ConfigError, Result};
use crate::format::Format;

impl Config {
    /// 从文件读入配置
    ///
    /// 扩展名检查在任何 IO 之前进行。watch 为 true 时先注册文件监听再
    /// 读取，文件变化后自动重新读入（重新读入失败只记录日志，保留当前
    /// 配置）；此时文件不存在不算错误，等它出现再读。watch 为 false 时
    /// 文件不存在返回 IO 错误。
    pub fn read_file<P: AsRef<Path>>(self: &Arc<Self>, path: P, watch: bool) -> Result<()> {
        let path = path.as_ref();
        let format = Format::from_path(path)?;

        if watch {
            self.watch_file(path)?;
        }

        match std::fs::read(path) {
            Ok(data) => self.read_bytes(format, &data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && watch => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// 从 HTTP 地址读入配置
    ///
    /// 地址必须带已知扩展名、http/https 协议、非空主机和对象路径，
    /// 这些检查在任何网络请求之前完成。interval 非零时启动轮询定时器
    /// （以地址为标识），此时首次拉取失败只记录日志，等下一轮重试；
    /// interval 为零时拉取失败直接返回。
    pub fn read_url(self: &Arc<Self>, url: &str, interval: Duration) -> Result<()> {
        let format = Format::from_path(url)?;
        check_url(url)?;

        if !interval.is_zero() {
            let url_owned = url.to_string();
            self.spawn_timer(url, interval, move |cfg| {
                let result = fetch_url(&url_owned)
                    .and_then(|data| cfg.read_bytes(format, &data));
                match result {
                    Ok(()) => log::info!("reload config from {}", url_owned),
                    Err(e) => log::warn!("failed to reload config from {}: {}", url_owned, e),
                }
            });
        }

        match fetch_url(url) {
            Ok(data) => self.read_bytes(format, &data),
            Err(e) if !interval.is_zero() => {
                log::warn!("failed to fetch config from {}: {}", url, e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// 读入所有环境变量，作为非 strict 字符串存储
    ///
    /// interval 非零时启动轮询定时器，标识为 "env"。
    pub fn load_env(self: &Arc<Self>, interval: Duration) -> Result<()> {
        self.load_env_once();

        if !interval.is_zero() {
            self.spawn_timer("env", interval, |cfg| cfg.load_env_once());
        }

        Ok(())
    }

    fn load_env_once(&self) {
        for (key, value) in std::env::vars() {
            self.set(key.as_str(), value.as_str(), false);
        }
    }

    /// 按地址形态分发读入
    ///
    /// "env" 读环境变量，http/https 地址走网络拉取，其余按文件路径处理。
    /// 轮询来源使用当前配置的监听间隔；文件在间隔非零时启用监听。
    pub fn read(self: &Arc<Self>, path: &str) -> Result<()> {
        let interval = self.watch_interval();
        match path {
            "env" => self.load_env(interval),
            _ if path.starts_with("http://") || path.starts_with("https://") => {
                self.read_url(path, interval)
            }
            _ => self.read_file(path, !interval.is_zero()),
        }
    }
}

/// 校验远端配置地址：协议、主机、对象路径
fn check_url(url: &str) -> Result<()> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .ok_or_else(|| ConfigError::Format(format!("不支持的协议: {}", url)))?;

    let (host, path) = rest
        .split_once('/')
        .ok_or_else(|| ConfigError::Format(format!("地址中缺少对象路径: {}", url)))?;
    if host.is_empty() || path.is_empty() {
        return Err(ConfigError::Format(format!("不合法的地址: {}", url)));
    }

    Ok(())
}

/// 拉取远端配置内容
fn fetch_url(url: &str) -> Result<Vec<u8>> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| ConfigError::Network(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .map_err(|e| ConfigError::Network(e.to_string()))?;
    if !response.status().is_success() {
        return Err(ConfigError::Network(format!(
            "{} 返回状态码 {}",
            url,
            response.status()
        )));
    }

    response
        .bytes()
        .map(|b| b.to_vec())
        .map_err(|e| ConfigError::Network(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use std::fs;
    use std::thread;
    use tempfile::TempDir;

    fn config(name: &str) -> Arc<Config> {
        Registry::new().get_config(name)
    }

    #[test]
    fn test_read_file_json() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("app.json");
        fs::write(&path, r#"{"server": {"host": "localhost", "port": 3306}}"#)?;

        let cfg = config("source_test.json");
        cfg.read_file(&path, false)?;

        assert_eq!(
            cfg.must_get("server.host")?.as_string(),
            Some("localhost".to_string())
        );
        assert_eq!(cfg.must_get("server.port")?.as_int(), Some(3306));

        Ok(())
    }

    #[test]
    fn test_read_file_yaml() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("app.yaml");
        fs::write(&path, "server:\n  host: localhost\n  port: 3306\n")?;

        let cfg = config("source_test.yaml");
        cfg.read_file(&path, false)?;

        assert_eq!(cfg.must_get("server.port")?.as_int(), Some(3306));

        Ok(())
    }

    #[test]
    fn test_read_file_unknown_extension() {
        let cfg = config("source_test.ext");
        // 扩展名检查先于 IO，文件是否存在无关紧要
        assert!(matches!(
            cfg.read_file("/nonexistent/app.xml", false),
            Err(ConfigError::Format(_))
        ));
    }

    #[test]
    fn test_read_file_missing() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("missing.json");

        let cfg = config("source_test.missing");
        assert!(matches!(
            cfg.read_file(&path, false),
            Err(ConfigError::Io(_))
        ));

        // 启用监听时允许文件暂不存在
        cfg.read_file(&path, true)?;

        Ok(())
    }

    #[test]
    fn test_read_file_watch_creates_parent_dir() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("nested").join("deep").join("app.json");

        let cfg = config("source_test.nested");
        cfg.read_file(&path, true)?;

        // 监听的是父目录，文件本身不会被创建
        assert!(path.parent().unwrap().is_dir());
        assert!(!path.exists());

        cfg.close_watcher();
        Ok(())
    }

    #[test]
    fn test_read_file_watch_observes_later_creation() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("late.json");

        let cfg = config("source_test.late");
        cfg.read_file(&path, true)?;
        assert!(cfg.get("version").is_none());

        thread::sleep(Duration::from_millis(100));
        fs::write(&path, r#"{"version": 7}"#)?;
        thread::sleep(Duration::from_millis(500));

        assert_eq!(cfg.must_get("version")?.as_int(), Some(7));

        cfg.close_watcher();
        Ok(())
    }

    #[test]
    fn test_read_file_watch_reload() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("watch.json");
        fs::write(&path, r#"{"version": 1}"#)?;

        let cfg = config("source_test.watch");
        cfg.read_file(&path, true)?;
        assert_eq!(cfg.must_get("version")?.as_int(), Some(1));

        thread::sleep(Duration::from_millis(100));
        fs::write(&path, r#"{"version": 2}"#)?;
        thread::sleep(Duration::from_millis(500));

        assert_eq!(cfg.must_get("version")?.as_int(), Some(2));

        cfg.close_watcher();
        Ok(())
    }

    #[test]
    fn test_read_file_watch_keeps_state_on_broken_reload() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("broken.json");
        fs::write(&path, r#"{"version": 1}"#)?;

        let cfg = config("source_test.broken");
        cfg.read_file(&path, true)?;

        thread::sleep(Duration::from_millis(100));
        fs::write(&path, r#"{"version": "#)?;
        thread::sleep(Duration::from_millis(500));

        // 解析失败只记录日志，保留之前的值
        assert_eq!(cfg.must_get("version")?.as_int(), Some(1));

        cfg.close_watcher();
        Ok(())
    }

    #[test]
    fn test_read_url() -> anyhow::Result<()> {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/remote/app.json")
            .with_status(200)
            .with_body(r#"{"feature": {"enabled": true}}"#)
            .create();

        let cfg = config("source_test.url");
        let url = format!("{}/remote/app.json", server.url());
        cfg.read_url(&url, Duration::ZERO)?;

        mock.assert();
        assert_eq!(cfg.must_get("feature.enabled")?.as_bool(), Some(true));

        Ok(())
    }

    #[test]
    fn test_read_url_bad_address() {
        let cfg = config("source_test.badurl");

        // 未知扩展名
        assert!(matches!(
            cfg.read_url("http://example.com/app.xml", Duration::ZERO),
            Err(ConfigError::Format(_))
        ));
        // 不支持的协议
        assert!(matches!(
            cfg.read_url("ftp://example.com/app.json", Duration::ZERO),
            Err(ConfigError::Format(_))
        ));
        // 缺少对象路径
        assert!(matches!(
            cfg.read_url("http://example.com", Duration::ZERO),
            Err(ConfigError::Format(_))
        ));
    }

    #[test]
    fn test_read_url_fetch_error() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/remote/app.json")
            .with_status(500)
            .create();
        let url = format!("{}/remote/app.json", server.url());

        // 不监听时拉取失败直接返回
        let cfg = config("source_test.urlerr");
        assert!(matches!(
            cfg.read_url(&url, Duration::ZERO),
            Err(ConfigError::Network(_))
        ));

        // 监听时失败被吞掉，等下一轮重试
        cfg.read_url(&url, Duration::from_secs(3600)).unwrap();
        cfg.close_watcher();
    }

    #[test]
    fn test_read_url_poll_reload() -> anyhow::Result<()> {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/remote/app.json")
            .with_status(200)
            .with_body(r#"{"version": 1}"#)
            .create();
        let url = format!("{}/remote/app.json", server.url());

        let cfg = config("source_test.poll");
        cfg.read_url(&url, Duration::from_millis(100))?;
        assert_eq!(cfg.must_get("version")?.as_int(), Some(1));

        server
            .mock("GET", "/remote/app.json")
            .with_status(200)
            .with_body(r#"{"version": 2}"#)
            .create();
        thread::sleep(Duration::from_millis(400));

        assert_eq!(cfg.must_get("version")?.as_int(), Some(2));

        cfg.close_watcher();
        Ok(())
    }

    #[test]
    #[serial_test::serial]
    fn test_load_env() -> anyhow::Result<()> {
        std::env::set_var("CFGX_SOURCE_TEST_KEY", "8080");

        let cfg = config("source_test.env");
        cfg.load_env(Duration::ZERO)?;

        let value = cfg.must_get("CFGX_SOURCE_TEST_KEY")?;
        assert_eq!(value.as_string(), Some("8080".to_string()));
        // 环境变量是非 strict 字符串，可以按数字取
        assert_eq!(value.as_int(), Some(8080));

        std::env::remove_var("CFGX_SOURCE_TEST_KEY");
        Ok(())
    }

    #[test]
    #[serial_test::serial]
    fn test_read_dispatch() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("app.toml");
        fs::write(&path, "port = 8080\n")?;

        let cfg = config("source_test.dispatch");
        // 间隔为零时文件读入不启用监听
        cfg.set_watch_interval(Duration::ZERO);
        cfg.read(path.to_str().unwrap())?;
        assert_eq!(cfg.must_get("port")?.as_int(), Some(8080));

        std::env::set_var("CFGX_DISPATCH_TEST_KEY", "on");
        cfg.read("env")?;
        assert_eq!(
            cfg.must_get("CFGX_DISPATCH_TEST_KEY")?.as_string(),
            Some("on".to_string())
        );

        std::env::remove_var("CFGX_DISPATCH_TEST_KEY");
        Ok(())
    }
}
