//! 后台监听
//!
//! 每个节点最多一个文件监听线程（notify 事件经 crossbeam 通道转发），
//! 每个轮询来源一个定时器线程。线程只持有节点的弱引用，节点不再被外部
//! 引用时线程自行退出；停止句柄 drop 时发送停止信号并等待线程结束。

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{bounded, unbounded, RecvTimeoutError, Sender};
use notify::{recommended_watcher, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::Config;
use crate::error::{ConfigError, Result};

/// Read 系列方法的默认监听间隔
const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// 节点的监听状态
pub(crate) struct WatchState {
    /// 文件监听线程，按需创建，整个节点共用一个
    file_watch: Option<FileWatch>,

    /// 轮询定时器：来源标识 -> 停止句柄
    timers: HashMap<String, TimerWatch>,

    /// 曾经注册过的来源标识，用于区分"从未监听"和"已停止"
    registered: HashSet<String>,

    /// Read 方法使用的监听间隔
    interval: Duration,
}

impl Default for WatchState {
    fn default() -> Self {
        Self {
            file_watch: None,
            timers: HashMap::new(),
            registered: HashSet::new(),
            interval: DEFAULT_WATCH_INTERVAL,
        }
    }
}

/// 文件监听句柄：notify watcher + 事件消费线程
struct FileWatch {
    watcher: RecommendedWatcher,
    /// 已注册的文件路径。尚不存在的文件通过监听父目录观察，事件线程
    /// 据此过滤掉目录监听带来的无关路径。
    paths: Arc<Mutex<HashSet<PathBuf>>>,
    stop_tx: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FileWatch {
    /// 创建 notify watcher 并启动事件消费线程
    ///
    /// 线程只持有节点的弱引用，升级失败即退出。
    fn spawn(config: Weak<Config>) -> Result<Self> {
        let (event_tx, event_rx) = unbounded();
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let paths = Arc::new(Mutex::new(HashSet::new()));

        let watcher = recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = event_tx.send(event);
            }
        })
        .map_err(|e| ConfigError::Config(format!("创建文件监听器失败: {}", e)))?;

        let watched = paths.clone();
        let handle = thread::spawn(move || {
            loop {
                crossbeam::select! {
                    recv(stop_rx) -> _ => break,
                    recv(event_rx) -> event => {
                        let Ok(event) = event else { break };
                        if !event.kind.is_modify() && !event.kind.is_create() {
                            continue;
                        }

                        let Some(cfg) = config.upgrade() else { break };
                        for path in &event.paths {
                            if !watched.lock().unwrap().contains(path.as_path()) {
                                continue;
                            }
                            match cfg.read_file(path, false) {
                                Ok(()) => {
                                    log::info!("reload config file {}", path.display());
                                }
                                Err(e) => {
                                    log::warn!(
                                        "failed to reload config file {}: {}",
                                        path.display(),
                                        e
                                    );
                                }
                            }
                        }
                    }
                }
            }
        });

        Ok(Self {
            watcher,
            paths,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }
}

impl Drop for FileWatch {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        // 最后一个 Arc 可能在监听线程自身的回调中释放，此时不能 join 自己
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

/// 轮询定时器句柄
struct TimerWatch {
    stop_tx: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Drop for TimerWatch {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Config {
    /// 注册文件监听
    ///
    /// 文件不存在时创建父目录并监听父目录本身，等文件出现时创建事件
    /// 按注册路径过滤后触发读入。直接删除再注册占位文件不可行：inotify
    /// 在被监听文件删除时丢弃监听，之后的创建无法被观察到。
    pub(crate) fn watch_file(self: &Arc<Self>, path: &Path) -> Result<()> {
        let mut state = self.watch.lock().unwrap();

        if state.file_watch.is_none() {
            state.file_watch = Some(FileWatch::spawn(Arc::downgrade(self))?);
        }
        let Some(fw) = state.file_watch.as_mut() else {
            return Err(ConfigError::Config("文件监听器未初始化".to_string()));
        };

        let target = if path.exists() {
            path.to_path_buf()
        } else {
            let parent = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            };
            fs::create_dir_all(&parent)?;
            parent
        };

        fw.watcher
            .watch(&target, RecursiveMode::NonRecursive)
            .map_err(|e| ConfigError::Config(format!("监听文件失败: {}", e)))?;
        fw.paths.lock().unwrap().insert(path.to_path_buf());

        state.registered.insert(path.display().to_string());
        Ok(())
    }

    /// 为轮询来源启动定时器线程
    ///
    /// 同一标识重复注册会替换（并停止）之前的定时器。reload 回调在
    /// 定时器线程中执行；句柄总是在锁外 drop，因此回调中可以调用
    /// un_watch 等监听接口。
    pub(crate) fn spawn_timer<F>(self: &Arc<Self>, id: &str, interval: Duration, reload: F)
    where
        F: Fn(&Arc<Config>) + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let weak = Arc::downgrade(self);

        let handle = thread::spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    let Some(cfg) = weak.upgrade() else { break };
                    reload(&cfg);
                }
            }
        });

        let mut state = self.watch.lock().unwrap();
        state.registered.insert(id.to_string());
        let previous = state.timers.insert(
            id.to_string(),
            TimerWatch {
                stop_tx: Some(stop_tx),
                handle: Some(handle),
            },
        );
        drop(state);

        // 被替换的定时器在锁外停止，它的回调可能正在访问监听状态
        drop(previous);
    }

    /// 停止对指定来源的监听
    ///
    /// 标识为文件路径、URL 或 "env"。对注册过的标识幂等；从未注册过的
    /// 标识返回 Config 错误。
    pub fn un_watch(&self, id: &str) -> Result<()> {
        let mut state = self.watch.lock().unwrap();

        if !state.registered.contains(id) {
            return Err(ConfigError::Config(format!("{} 未被监听过", id)));
        }

        let timer = state.timers.remove(id);
        if timer.is_none() {
            if let Some(fw) = state.file_watch.as_mut() {
                fw.paths.lock().unwrap().remove(Path::new(id));
                // 文件可能已被删除或监听的是父目录，失败不影响幂等语义
                let _ = fw.watcher.unwatch(Path::new(id));
            }
        }
        drop(state);

        // 句柄在锁外 drop：drop 会 join 后台线程，而线程中的钩子回调
        // 可能正在等待监听状态的锁
        drop(timer);
        Ok(())
    }

    /// 停止本节点的所有监听，幂等
    pub fn close_watcher(&self) {
        let mut state = self.watch.lock().unwrap();
        let file_watch = state.file_watch.take();
        let timers = std::mem::take(&mut state.timers);
        drop(state);

        drop(file_watch);
        drop(timers);
    }

    /// 设置 Read 方法的监听间隔，设为零则 Read 不启用监听
    pub fn set_watch_interval(&self, interval: Duration) {
        self.watch.lock().unwrap().interval = interval;
    }

    pub(crate) fn watch_interval(&self) -> Duration {
        self.watch.lock().unwrap().interval
    }
}
