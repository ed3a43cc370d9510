//! 配置库统一错误类型

use thiserror::Error;

/// 配置相关错误
///
/// 错误分类约定：
/// - 格式/地址错误在任何 IO 发生之前返回
/// - 解析错误表示原始数据无法按指定格式解码
/// - 键错误和转换错误只由 `must_*` 系列方法返回
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 不支持的格式、扩展名或不合法的地址
    #[error("不支持的格式: {0}")]
    Format(String),

    /// 原始数据无法按指定格式解析
    #[error("解析配置失败: {0}")]
    Value(String),

    /// 底层 IO 失败（读取文件等）
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 网络请求失败（拉取远端配置）
    #[error("网络错误: {0}")]
    Network(String),

    /// 配置管理错误（监听注册、内部状态等）
    #[error("配置错误: {0}")]
    Config(String),

    /// 键不存在
    #[error("未知的配置键: {0}")]
    Key(String),

    /// 值无法转换为目标类型
    #[error("类型转换失败: {actual} 无法转换为 {expected}")]
    Cast {
        actual: &'static str,
        expected: &'static str,
    },
}

/// 配置库统一 Result 类型
pub type Result<T> = std::result::Result<T, ConfigError>;
