//! 配置值类型
//!
//! `RawValue` 是配置树中实际存储的载荷，`Value` 在其上附加 strict 标志，
//! 提供带类型转换能力的读取接口。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::config::Config;
use crate::error::{ConfigError, Result};

/// 配置载荷的封闭变体
///
/// 子树以 `Arc<Config>` 形式引用，相等性按节点身份比较。
#[derive(Debug, Clone)]
pub enum RawValue {
    Nil,
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Array(Vec<RawValue>),
    Config(Arc<Config>),
}

impl PartialEq for RawValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RawValue::Nil, RawValue::Nil) => true,
            (RawValue::Int(a), RawValue::Int(b)) => a == b,
            (RawValue::Float(a), RawValue::Float(b)) => a == b,
            (RawValue::Bool(a), RawValue::Bool(b)) => a == b,
            (RawValue::String(a), RawValue::String(b)) => a == b,
            (RawValue::Array(a), RawValue::Array(b)) => a == b,
            (RawValue::Config(a), RawValue::Config(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl RawValue {
    /// 载荷的类型名，用于错误信息
    pub fn type_name(&self) -> &'static str {
        match self {
            RawValue::Nil => "nil",
            RawValue::Int(_) => "int",
            RawValue::Float(_) => "float",
            RawValue::Bool(_) => "bool",
            RawValue::String(_) => "string",
            RawValue::Array(_) => "array",
            RawValue::Config(_) => "config",
        }
    }

    /// 渲染为 serde_json::Value，子树递归展开
    pub fn to_json(&self) -> JsonValue {
        match self {
            RawValue::Nil => JsonValue::Null,
            RawValue::Int(i) => JsonValue::from(*i),
            RawValue::Float(f) => JsonValue::from(*f),
            RawValue::Bool(b) => JsonValue::from(*b),
            RawValue::String(s) => JsonValue::from(s.clone()),
            RawValue::Array(items) => {
                JsonValue::Array(items.iter().map(RawValue::to_json).collect())
            }
            RawValue::Config(cfg) => JsonValue::Object(cfg.to_map()),
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Nil => write!(f, "nil"),
            RawValue::Int(i) => write!(f, "{}", i),
            RawValue::Float(v) => write!(f, "{}", v),
            RawValue::Bool(b) => write!(f, "{}", b),
            RawValue::String(s) => write!(f, "{}", s),
            RawValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            RawValue::Config(cfg) => write!(f, "<config {}>", cfg.name()),
        }
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        RawValue::Int(v)
    }
}

impl From<i32> for RawValue {
    fn from(v: i32) -> Self {
        RawValue::Int(v as i64)
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Float(v)
    }
}

impl From<bool> for RawValue {
    fn from(v: bool) -> Self {
        RawValue::Bool(v)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::String(v.to_string())
    }
}

impl From<String> for RawValue {
    fn from(v: String) -> Self {
        RawValue::String(v)
    }
}

impl From<Vec<RawValue>> for RawValue {
    fn from(v: Vec<RawValue>) -> Self {
        RawValue::Array(v)
    }
}

impl From<Arc<Config>> for RawValue {
    fn from(v: Arc<Config>) -> Self {
        RawValue::Config(v)
    }
}

/// 配置值
///
/// 包装一个 `RawValue` 和创建时固定的 strict 标志。strict 为 false 时，
/// 字符串载荷在读取时允许转换为其他类型（如 `"3"` 读取为整数 3）；
/// strict 为 true 时只允许数值拓宽（int→float）。
///
/// Value 构造后不可变，配置的"变更"表现为替换键上存储的 Value。
///
/// # 示例
/// ```
/// use cfgx::{RawValue, Value};
///
/// let v = Value::new(RawValue::String("42".to_string()), false);
/// assert_eq!(v.as_int(), Some(42));
///
/// let strict = Value::new(RawValue::String("42".to_string()), true);
/// assert_eq!(strict.as_int(), None);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    raw: RawValue,
    strict: bool,
}

impl Value {
    /// 创建配置值
    pub fn new(raw: RawValue, strict: bool) -> Self {
        Self { raw, strict }
    }

    /// 空值（非 strict）
    pub fn nil() -> Self {
        Self {
            raw: RawValue::Nil,
            strict: false,
        }
    }

    /// 内部载荷引用
    pub fn raw(&self) -> &RawValue {
        &self.raw
    }

    /// strict 标志
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// 载荷是否为空：Nil，或非 strict 模式下的空字符串
    pub fn is_nil(&self) -> bool {
        match &self.raw {
            RawValue::Nil => true,
            RawValue::String(s) => s.is_empty() && !self.strict,
            _ => false,
        }
    }

    /// 读取为整数
    ///
    /// 浮点数仅在无小数部分时接受；非 strict 模式下字符串按十进制解析。
    pub fn as_int(&self) -> Option<i64> {
        match &self.raw {
            RawValue::Int(i) => Some(*i),
            RawValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            RawValue::String(s) if !self.strict => s.parse::<i64>().ok(),
            _ => None,
        }
    }

    /// 读取为整数，失败返回 Cast 错误
    pub fn must_int(&self) -> Result<i64> {
        self.as_int().ok_or_else(|| self.cast_error("int"))
    }

    /// 读取为浮点数，整数总是允许拓宽
    pub fn as_float(&self) -> Option<f64> {
        match &self.raw {
            RawValue::Float(f) => Some(*f),
            RawValue::Int(i) => Some(*i as f64),
            RawValue::String(s) if !self.strict => s.parse::<f64>().ok(),
            _ => None,
        }
    }

    /// 读取为浮点数，失败返回 Cast 错误
    pub fn must_float(&self) -> Result<f64> {
        self.as_float().ok_or_else(|| self.cast_error("float"))
    }

    /// 读取为布尔值
    ///
    /// 非 strict 模式下接受 `1/0/t/f/true/false`（不区分大小写）；
    /// 数值等其他类型永远不转换为布尔值。
    pub fn as_bool(&self) -> Option<bool> {
        match &self.raw {
            RawValue::Bool(b) => Some(*b),
            RawValue::String(s) if !self.strict => match s.to_ascii_lowercase().as_str() {
                "1" | "t" | "true" => Some(true),
                "0" | "f" | "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// 读取为布尔值，失败返回 Cast 错误
    pub fn must_bool(&self) -> Result<bool> {
        self.as_bool().ok_or_else(|| self.cast_error("bool"))
    }

    /// 读取为字符串
    ///
    /// strict 模式下只有字符串载荷成功；非 strict 模式下任意载荷渲染为
    /// 默认字符串表示。
    pub fn as_string(&self) -> Option<String> {
        match &self.raw {
            RawValue::String(s) => Some(s.clone()),
            other if !self.strict => Some(other.to_string()),
            _ => None,
        }
    }

    /// 读取为字符串，失败返回 Cast 错误
    pub fn must_string(&self) -> Result<String> {
        self.as_string().ok_or_else(|| self.cast_error("string"))
    }

    /// 读取为时长
    ///
    /// 整数按秒解释；字符串支持 `s/m/h/d/w` 后缀（d 为 24 小时，w 为
    /// 7×24 小时），无后缀的纯数字字符串默认为秒。与 strict 标志无关。
    ///
    /// # 示例
    /// ```
    /// use std::time::Duration;
    /// use cfgx::{RawValue, Value};
    ///
    /// let v = Value::new(RawValue::String("1d".to_string()), true);
    /// assert_eq!(v.as_duration(), Some(Duration::from_secs(24 * 3600)));
    /// ```
    pub fn as_duration(&self) -> Option<Duration> {
        match &self.raw {
            RawValue::Int(i) if *i >= 0 => Some(Duration::from_secs(*i as u64)),
            RawValue::String(s) => parse_duration(s),
            _ => None,
        }
    }

    /// 读取为时长，失败返回 Cast 错误
    pub fn must_duration(&self) -> Result<Duration> {
        self.as_duration().ok_or_else(|| self.cast_error("duration"))
    }

    /// 读取为数组
    ///
    /// 原生数组按元素转换，元素为 strict 值；非 strict 模式下字符串按
    /// 逗号分割（去除两侧空白）为非 strict 字符串元素。strict 模式下
    /// 字符串载荷不满足数组访问。
    pub fn as_array(&self) -> Option<Vec<Value>> {
        match &self.raw {
            RawValue::Array(items) => Some(
                items
                    .iter()
                    .map(|raw| Value::new(raw.clone(), true))
                    .collect(),
            ),
            RawValue::String(s) if !self.strict => Some(
                s.trim()
                    .split(',')
                    .map(|e| Value::new(RawValue::String(e.trim().to_string()), false))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// 读取为数组，失败返回 Cast 错误
    pub fn must_array(&self) -> Result<Vec<Value>> {
        self.as_array().ok_or_else(|| self.cast_error("array"))
    }

    /// 读取为子配置树，只有子树载荷成功
    pub fn as_config(&self) -> Option<Arc<Config>> {
        match &self.raw {
            RawValue::Config(cfg) => Some(cfg.clone()),
            _ => None,
        }
    }

    /// 读取为子配置树，失败返回 Cast 错误
    pub fn must_config(&self) -> Result<Arc<Config>> {
        self.as_config().ok_or_else(|| self.cast_error("config"))
    }

    fn cast_error(&self, expected: &'static str) -> ConfigError {
        ConfigError::Cast {
            actual: self.raw.type_name(),
            expected,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// 解析带后缀的时长字符串
fn parse_duration(s: &str) -> Option<Duration> {
    if s.is_empty() {
        return None;
    }

    let multiplier = match s.as_bytes()[s.len() - 1] {
        b's' => 1,
        b'm' => 60,
        b'h' => 3600,
        b'd' => 24 * 3600,
        b'w' => 7 * 24 * 3600,
        // 无后缀：整个字符串按秒数解析
        _ => return s.parse::<u64>().ok().map(Duration::from_secs),
    };

    let n = s[..s.len() - 1].parse::<u64>().ok()?;
    n.checked_mul(multiplier).map(Duration::from_secs)
}
