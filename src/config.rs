//! 配置树节点
//!
//! `Config` 是一个命名的层级键值命名空间。带点的键按第一个 `.` 拆分后
//! 路由到子节点，子节点按 `父节点名.段名` 注册到同一个 Registry 中。
//! 每次成功的值替换最多触发一个钩子（自底向上，就近优先）。

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::{ConfigError, Result};
use crate::format::Format;
use crate::registry::Registry;
use crate::value::{RawValue, Value};
use crate::watch::WatchState;

/// 配置变更事件
#[derive(Debug, Clone)]
pub struct Event {
    /// 变更键，包含触发钩子的节点的完整名称（点分）
    pub key: String,
    /// 变更前的值，键不存在时为空值
    pub old: Value,
    /// 变更后的值
    pub new: Value,
}

/// 钩子回调
pub(crate) type Hook = Arc<dyn Fn(Event) + Send + Sync>;

/// 配置节点
///
/// 每个节点只守护自己本地的键值表和钩子表，不存在全局大锁；
/// 对同一节点的写入由该节点的锁串行化，跨节点没有全局顺序保证。
///
/// # 示例
/// ```
/// use cfgx::Registry;
///
/// let registry = Registry::new();
/// let cfg = registry.get_config("app");
/// cfg.set("server.port", 8080, true);
/// assert_eq!(cfg.get("server.port").unwrap().as_int(), Some(8080));
/// ```
pub struct Config {
    /// 节点名称，子节点名称包含父节点名称（点分）
    name: String,

    /// 本地键值表，键不含点
    entries: RwLock<HashMap<String, Value>>,

    /// 钩子表：键模式 -> 回调，空模式为通配
    hooks: RwLock<HashMap<String, Hook>>,

    /// 后台监听状态（文件监听、轮询定时器）
    pub(crate) watch: Mutex<WatchState>,

    /// 所属注册表，点分键赋值时用于创建/查找子节点
    registry: Registry,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config").field("name", &self.name).finish()
    }
}

impl serde::Serialize for Config {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        JsonValue::Object(self.to_map()).serialize(serializer)
    }
}

impl Config {
    pub(crate) fn new(name: &str, registry: Registry) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            entries: RwLock::new(HashMap::new()),
            hooks: RwLock::new(HashMap::new()),
            watch: Mutex::new(WatchState::default()),
            registry,
        })
    }

    /// 节点名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 按键读取值
    ///
    /// 键按第一个 `.` 拆分：无点直接查本地表；有点时查第一段，若其值为
    /// 子树则携带剩余部分递归。每层只持有本节点的读锁，值克隆后即释放，
    /// 递归进入子节点时不再持有父节点的锁。
    pub fn get(&self, key: &str) -> Option<Value> {
        match key.split_once('.') {
            None => self.entries.read().unwrap().get(key).cloned(),
            Some((head, rest)) => {
                let v = self.entries.read().unwrap().get(head).cloned()?;
                v.as_config()?.get(rest)
            }
        }
    }

    /// 按键读取值，键不存在返回 Key 错误
    pub fn must_get(&self, key: &str) -> Result<Value> {
        self.get(key)
            .ok_or_else(|| ConfigError::Key(key.to_string()))
    }

    /// 按键读取值，键不存在时返回包装默认值的 strict Value
    pub fn get_default<V: Into<RawValue>>(&self, key: &str, default: V) -> Value {
        self.get(key)
            .unwrap_or_else(|| Value::new(default.into(), true))
    }

    /// 设置键值
    ///
    /// 新载荷与现有载荷相同时为空操作（重复设置不会重复触发钩子）。
    /// 带点的键确保第一段存在子树（必要时创建，非子树条目会被覆盖），
    /// 剩余部分委托给子节点。整条链路上最多触发一个钩子，子节点已触发
    /// 时祖先节点不再解析。
    ///
    /// 返回是否有钩子被触发。
    pub fn set<V: Into<RawValue>>(&self, key: &str, value: V, strict: bool) -> bool {
        self.set_raw(key, value.into(), strict)
    }

    pub(crate) fn set_raw(&self, key: &str, raw: RawValue, strict: bool) -> bool {
        let old = self.get(key);
        if let Some(prev) = &old {
            if *prev.raw() == raw {
                return false;
            }
        }

        let fired = match key.split_once('.') {
            None => {
                self.entries
                    .write()
                    .unwrap()
                    .insert(key.to_string(), Value::new(raw.clone(), strict));
                false
            }
            Some((head, rest)) => {
                let child = self.ensure_child(head, strict);
                child.set_raw(rest, raw.clone(), strict)
            }
        };

        if fired {
            return true;
        }

        // 钩子在释放本节点写锁之后触发，回调中可以重新进入本节点
        if let Some(hook) = self.resolve_hook(key) {
            hook(Event {
                key: format!("{}.{}", self.name, key),
                old: old.unwrap_or_else(Value::nil),
                new: Value::new(raw, strict),
            });
            return true;
        }

        false
    }

    /// 确保指定段存在子树，必要时创建并覆盖非子树条目
    fn ensure_child(&self, segment: &str, strict: bool) -> Arc<Config> {
        let mut entries = self.entries.write().unwrap();
        if let Some(v) = entries.get(segment) {
            if let Some(child) = v.as_config() {
                return child;
            }
        }

        let child = self
            .registry
            .get_config(&format!("{}.{}", self.name, segment));
        entries.insert(
            segment.to_string(),
            Value::new(RawValue::Config(child.clone()), strict),
        );
        child
    }

    /// 注册钩子
    ///
    /// 同一模式重复注册会覆盖之前的回调。空模式匹配本节点及以下的所有键。
    ///
    /// 钩子按以下优先级触发：
    ///
    /// 1. 同一个键被多个节点的钩子覆盖时，离该键最近的节点的钩子触发
    ///    （解析自底向上，子节点触发后短路）。
    /// 2. 同一节点内多个模式匹配时，模式字符串最长的触发，空模式只在
    ///    没有其他匹配时触发。
    ///
    /// 一次变更只触发一个钩子。
    pub fn add_hook<F>(&self, pattern: &str, hook: F)
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.hooks
            .write()
            .unwrap()
            .insert(pattern.to_string(), Arc::new(hook));
    }

    /// 解析本节点内匹配 key 的钩子：最长模式优先，空模式垫底
    fn resolve_hook(&self, key: &str) -> Option<Hook> {
        let hooks = self.hooks.read().unwrap();
        let mut best: Option<(&str, &Hook)> = None;
        for (pattern, hook) in hooks.iter() {
            let matched = pattern.is_empty()
                || key == pattern
                || (key.len() > pattern.len()
                    && key.starts_with(pattern.as_str())
                    && key.as_bytes()[pattern.len()] == b'.');
            if !matched {
                continue;
            }

            match best {
                Some((p, _)) if p.len() >= pattern.len() => {}
                _ => best = Some((pattern, hook)),
            }
        }

        best.map(|(_, hook)| hook.clone())
    }

    /// 从通用嵌套映射读入配置
    ///
    /// 值为对象的条目递归读入子节点，子树条目本身以 strict 方式存储；
    /// 其余条目按本次读入的 strict 策略存储（结构化格式为 true，仅产生
    /// 字符串的来源为 false）。整个映射在任何键应用之前已完成解码，
    /// 因此一次读入要么全部生效要么完全不生效。
    pub fn read_map(&self, map: &JsonMap<String, JsonValue>, strict: bool) -> Result<()> {
        for (key, value) in map {
            match value {
                JsonValue::Object(obj) => {
                    let child = self
                        .registry
                        .get_config(&format!("{}.{}", self.name, key));
                    child.read_map(obj, strict)?;
                    self.set(key.as_str(), child, true);
                }
                other => {
                    self.set_raw(key, self.json_to_raw(other, strict)?, strict);
                }
            }
        }

        Ok(())
    }

    /// JSON 值转换为载荷，数组内的对象转换为匿名子配置
    fn json_to_raw(&self, value: &JsonValue, strict: bool) -> Result<RawValue> {
        Ok(match value {
            JsonValue::Null => RawValue::Nil,
            JsonValue::Bool(b) => RawValue::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => RawValue::Int(i),
                None => RawValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => RawValue::String(s.clone()),
            JsonValue::Array(items) => RawValue::Array(
                items
                    .iter()
                    .map(|item| self.json_to_raw(item, strict))
                    .collect::<Result<Vec<_>>>()?,
            ),
            JsonValue::Object(obj) => {
                let child = self.registry.get_config("");
                child.read_map(obj, strict)?;
                RawValue::Config(child)
            }
        })
    }

    /// 按指定格式解码字节数据并读入
    ///
    /// 解码失败返回 Value 错误且不应用任何键。所有字节格式都是结构化
    /// 格式，读入策略为 strict。
    pub fn read_bytes(&self, format: Format, data: &[u8]) -> Result<()> {
        let value = format.decode(data)?;
        let map = value
            .as_object()
            .ok_or_else(|| ConfigError::Value("顶层配置必须是键值映射".to_string()))?;
        self.read_map(map, true)
    }

    /// 渲染为通用嵌套映射，子树递归展开
    ///
    /// 只保证单键原子性：与并发写入交错时可能观察到新旧值的混合。
    pub fn to_map(&self) -> JsonMap<String, JsonValue> {
        let entries = self.entries.read().unwrap();
        let mut result = JsonMap::new();
        for (key, value) in entries.iter() {
            result.insert(key.clone(), value.raw().to_json());
        }
        result
    }
}
