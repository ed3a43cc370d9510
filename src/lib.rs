//! 分层配置管理库
//!
//! 提供线程安全的分层键值配置：
//! - 点分键寻址，子配置按需创建并注册到全局
//! - 值携带 strict 标记，支持按目标类型转换（int/float/bool/string/
//!   duration/array/子配置）
//! - 变更钩子：一次变更最多触发一个钩子，就近优先、最长模式优先
//! - 多来源读入：JSON/YAML/TOML 文件、HTTP 地址、环境变量
//! - 热更新：文件变化自动重载，轮询来源定时重载
//!
//! # 示例
//!
//! ```
//! let cfg = cfgx::get_config("app");
//!
//! cfg.add_hook("server", |event| {
//!     println!("{}: {} -> {}", event.key, event.old, event.new);
//! });
//!
//! cfg.set("server.port", 8080, true);
//! assert_eq!(cfg.get("server.port").unwrap().as_int(), Some(8080));
//! ```
//!
//! 从文件读入并监听变化：
//!
//! ```no_run
//! # fn main() -> cfgx::Result<()> {
//! let cfg = cfgx::get_config("app");
//! cfg.read_file("config/app.yaml", true)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod registry;
pub mod value;

mod source;
mod watch;

pub use config::{Config, Event};
pub use error::{ConfigError, Result};
pub use format::Format;
pub use registry::{get_config, Registry};
pub use value::{RawValue, Value};
