//! 配置节点注册表
//!
//! 同名节点在同一个注册表中只有一个实例，点分键赋值时创建的子节点也
//! 注册在这里，因此可以直接按全名获取任意深度的子树。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::config::Config;

/// 全局默认注册表
static GLOBAL: Lazy<Registry> = Lazy::new(Registry::new);

/// 匿名节点计数器，保证匿名节点名称互不冲突
static ANONYMOUS_SEQ: AtomicU64 = AtomicU64::new(0);

/// 名称到节点的注册表
///
/// 句柄可以克隆，克隆共享同一张表。注册过的节点与注册表同生共死。
#[derive(Clone)]
pub struct Registry {
    configs: Arc<RwLock<HashMap<String, Arc<Config>>>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            configs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 按名称获取节点，不存在时创建
    ///
    /// 查找与插入在同一把写锁下完成，并发调用同一名称返回同一个实例。
    /// 空名称每次返回一个新的匿名节点，匿名节点不进入注册表，由调用方
    /// 自行持有。
    pub fn get_config(&self, name: &str) -> Arc<Config> {
        if name.is_empty() {
            let id = ANONYMOUS_SEQ.fetch_add(1, Ordering::Relaxed);
            return Config::new(&format!("<anonymous-{}>", id), self.clone());
        }

        let registry = self.clone();
        self.configs
            .write()
            .unwrap()
            .entry(name.to_string())
            .or_insert_with(|| Config::new(name, registry))
            .clone()
    }
}

/// 从全局默认注册表获取节点
///
/// # 示例
/// ```
/// let cfg = cfgx::get_config("app");
/// cfg.set("server.port", 8080, true);
/// ```
pub fn get_config(name: &str) -> Arc<Config> {
    GLOBAL.get_config(name)
}
