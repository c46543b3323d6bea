//! Модуль polling-наблюдения за директорией.
//!
//! Отвечает за:
//! - периодический scan-проход по корневой директории (и поддереву в
//!   recursive-режиме)
//! - поддержание in-memory дерева снапшотов и diff с прошлым проходом
//! - обнаружение удалений (delete detector)
//! - публикацию событий через [`EventBus`]
//! - graceful shutdown
//!
//! Никакого inotify: обнаружение изменений — исключительно poll-and-diff
//! по метаданным. Консистентность — "eventually correct в пределах одного
//! интервала опроса", не атомарный снимок.

pub mod events;
pub mod snapshot;
mod tree;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::error::DirpollError;
use crate::logging::LogContext;
use crate::watcher::events::{EventBus, WatchEvent, WatchEventKind};
use crate::watcher::snapshot::{compare, FileDetail};
use crate::watcher::tree::{DirectoryTree, TreeNode};

/// Один scan-проход: чтение ФС, мутация дерева, эмиссия событий.
///
/// На suppressed-проходе (baseline) дерево мутируется молча, без публичных
/// событий. Флаг подавления передаётся параметром через весь проход, а не
/// висит на инстансе.
struct Scanner {
    root: PathBuf,
    recursive: bool,
    bus: Arc<EventBus>,
}

impl Scanner {
    fn run_pass(&self, tree: &mut DirectoryTree, suppress: bool) -> Result<(), DirpollError> {
        self.scan_dir(tree, &self.root, suppress)
    }

    /// Проход по одной директории (и рекурсивно по её поддиректориям).
    ///
    /// Падение listing'а фатально для этого вызова: без списка записей
    /// baseline по поддереву не установить. Падение stat'а отдельной записи —
    /// гонка с удалением, запись просто пропускается до следующего прохода.
    fn scan_dir(
        &self,
        tree: &mut DirectoryTree,
        dir: &Path,
        suppress: bool,
    ) -> Result<(), DirpollError> {
        let listing = fs::read_dir(dir).map_err(|source| DirpollError::Listing {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut subdirs = Vec::new();
        for entry in listing {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    debug!("Entry under {} unavailable mid-listing: {err}", dir.display());
                    continue;
                }
            };
            let path = entry.path();
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(err) => {
                    // Запись исчезла между listing и stat; delete detector
                    // согласует её на одном из следующих проходов.
                    debug!("Cannot stat {}: {err}", path.display());
                    continue;
                }
            };

            if metadata.is_file() {
                self.record_file(tree, &path, &metadata, suppress);
            } else if metadata.is_dir() && self.recursive {
                self.record_folder(tree, &path, suppress);
                subdirs.push(path);
            }
        }

        // Каждый рекурсивный вызов — полноценный проход по поддиректории.
        // Его падение не валит проход по соседям: следующее срабатывание
        // таймера попробует поддерево снова.
        for sub in subdirs {
            if let Err(err) = self.scan_dir(tree, &sub, suppress) {
                warn!("Subtree scan failed: {err}");
            }
        }

        self.detect_deletes(tree, dir, suppress);

        if !suppress {
            self.bus.emit(&WatchEvent::ScannedDirectory {
                dir_path: dir.to_path_buf(),
            });
        }
        Ok(())
    }

    /// Материализовать узел папки в дереве (только recursive-режим).
    fn record_folder(&self, tree: &mut DirectoryTree, path: &Path, suppress: bool) {
        let _ = tree.ensure_dir(path, |created| {
            if !suppress {
                self.bus.emit(&WatchEvent::FolderAdded {
                    full_path: created.to_path_buf(),
                });
            }
        });
    }

    /// Вставить или заменить снапшот файла, эмитя `fileAdded`/`fileChanged`.
    fn record_file(
        &self,
        tree: &mut DirectoryTree,
        path: &Path,
        metadata: &fs::Metadata,
        suppress: bool,
    ) {
        // Ключ в дереве — сырое имя из listing'а, не lossy-представление:
        // иначе не-UTF8 имя невозможно найти на диске повторно.
        let Some(name) = path.file_name() else {
            return;
        };
        let detail = FileDetail::from_metadata(path, metadata);

        let Some(entries) = tree.ensure_dir(&detail.parent_dir, |created| {
            if !suppress {
                self.bus.emit(&WatchEvent::FolderAdded {
                    full_path: created.to_path_buf(),
                });
            }
        }) else {
            return;
        };

        // Узел-директория на месте файла означает смену типа пути с прошлого
        // прохода: узел заменяется целиком, файл считается добавленным.
        let existing_diff = match entries.get(name) {
            Some(TreeNode::File(existing)) => Some(compare(existing, &detail)),
            Some(TreeNode::Dir(_)) | None => None,
        };

        match existing_diff {
            Some(diff) if diff.has_differences() => {
                entries.insert(name.to_os_string(), TreeNode::File(detail.clone()));
                if !suppress {
                    self.bus.emit(&WatchEvent::FileChanged {
                        detail,
                        differences: diff.differences,
                    });
                }
            }
            Some(_) => {} // снапшот совпал, ничего не делаем
            None => {
                entries.insert(name.to_os_string(), TreeNode::File(detail.clone()));
                if !suppress {
                    self.bus.emit(&WatchEvent::FileAdded(detail));
                }
            }
        }
    }

    /// Проверить ранее известные записи директории на существование.
    ///
    /// Исчезнувшая папка отбрасывается вместе со всем поддеревом одним
    /// `folderRemoved`, без событий по потомкам. Это осознанное огрубление,
    /// а не баг: см. DESIGN.md.
    fn detect_deletes(&self, tree: &mut DirectoryTree, dir: &Path, suppress: bool) {
        let Some(entries) = tree.dir_entries_mut(dir) else {
            return;
        };

        let mut removed_files = Vec::new();
        let mut removed_folders = Vec::new();
        entries.retain(|name, node| {
            match node {
                // Файл проверяется по пути из его же снапшота: это тот самый
                // путь, который наблюдался при записи в дерево.
                TreeNode::File(detail) => {
                    if detail.full_path.exists() {
                        true
                    } else {
                        removed_files.push(detail.full_path.clone());
                        false
                    }
                }
                TreeNode::Dir(_) => {
                    let full_path = dir.join(name);
                    if full_path.is_dir() {
                        true
                    } else {
                        removed_folders.push(full_path);
                        false
                    }
                }
            }
        });

        if suppress {
            return;
        }
        for full_path in removed_files {
            self.bus.emit(&WatchEvent::FileRemoved { full_path });
        }
        for full_path in removed_folders {
            self.bus.emit(&WatchEvent::FolderRemoved { full_path });
        }
    }
}

struct Worker {
    stop_tx: mpsc::Sender<()>,
    join: thread::JoinHandle<()>,
}

/// Polling-наблюдатель за директорией.
///
/// Конструируется инертным: ни одного обращения к ФС до [`start`] или
/// [`scan_once`]. Дерево снапшотов принадлежит инстансу и наружу не
/// отдаётся; `stop` его не очищает.
///
/// [`start`]: DirectoryWatcher::start
/// [`scan_once`]: DirectoryWatcher::scan_once
pub struct DirectoryWatcher {
    scanner: Arc<Scanner>,
    tree: Arc<Mutex<DirectoryTree>>,
    suppress_initial: bool,
    worker: Option<Worker>,
}

impl DirectoryWatcher {
    /// Создать инертный watcher.
    ///
    /// `root` должен быть непустым абсолютным путём; наблюдение не начинается
    /// до вызова [`start`](Self::start).
    pub fn new(root: impl Into<PathBuf>, recursive: bool) -> Result<Self, DirpollError> {
        crate::logging::init_logging();

        let root = root.into();
        if root.as_os_str().is_empty() {
            return Err(DirpollError::InvalidPath("empty root path".to_string()));
        }
        if !root.is_absolute() {
            return Err(DirpollError::InvalidPath(format!(
                "root path must be absolute: {}",
                root.display()
            )));
        }

        Ok(Self {
            scanner: Arc::new(Scanner {
                root: root.clone(),
                recursive,
                bus: Arc::new(EventBus::new()),
            }),
            tree: Arc::new(Mutex::new(DirectoryTree::new(root))),
            suppress_initial: true,
            worker: None,
        })
    }

    /// Подавлять ли события первого прохода после `start` (default: да).
    ///
    /// Suppressed baseline-проход наполняет дерево молча, чтобы
    /// предсуществующее содержимое не породило синтетических `fileAdded`.
    pub fn suppress_initial(mut self, suppress: bool) -> Self {
        self.suppress_initial = suppress;
        self
    }

    pub fn root(&self) -> &Path {
        &self.scanner.root
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Подписать handler на один вид события.
    pub fn subscribe(
        &self,
        kind: WatchEventKind,
        handler: impl Fn(&WatchEvent) + Send + Sync + 'static,
    ) {
        self.scanner.bus.subscribe(kind, handler);
    }

    /// Подписать handler на все виды событий.
    pub fn subscribe_all(&self, handler: impl Fn(&WatchEvent) + Send + Sync + 'static) {
        self.scanner.bus.subscribe_all(handler);
    }

    /// Выполнить один scan-проход синхронно, без подавления событий.
    ///
    /// Работает и при остановленном, и при запущенном scheduler'е: с
    /// периодическими проходами сериализуется через lock дерева.
    pub fn scan_once(&self) -> Result<(), DirpollError> {
        let mut tree = self
            .tree
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.scanner.run_pass(&mut tree, false)
    }

    /// Запустить периодические scan-проходы.
    ///
    /// До первого срабатывания таймера выполняется немедленный проход с
    /// настройкой [`suppress_initial`](Self::suppress_initial); последующие
    /// проходы эмитят события как обычно. `interval_ms == 0` эквивалентен
    /// [`stop`](Self::stop).
    pub fn start(&mut self, interval_ms: u64) -> Result<(), DirpollError> {
        if interval_ms == 0 {
            return self.stop();
        }
        if self.worker.is_some() {
            return Err(DirpollError::WatcherAlreadyRunning);
        }

        info!(
            "Starting watcher for: {} (interval: {interval_ms} ms, recursive: {})",
            self.scanner.root.display(),
            self.scanner.recursive
        );

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let scanner = Arc::clone(&self.scanner);
        let tree = Arc::clone(&self.tree);
        let interval = Duration::from_millis(interval_ms);
        let mut suppress = self.suppress_initial;

        let join = thread::spawn(move || {
            loop {
                let ctx = LogContext::with_operation("scan_pass");
                debug!(
                    "[{}] scan pass started (suppress: {suppress})",
                    ctx.correlation_id
                );
                {
                    let mut tree = tree.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                    if let Err(err) = scanner.run_pass(&mut tree, suppress) {
                        // Нет автоматического retry: следующий тик попробует снова.
                        warn!("[{}] scan pass failed: {err}", ctx.correlation_id);
                    }
                }
                suppress = false;

                match stop_rx.recv_timeout(interval) {
                    Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                        info!("Watcher shutdown requested");
                        break;
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        // тик
                    }
                }
            }
            info!("Watcher thread finished");
        });

        self.worker = Some(Worker { stop_tx, join });
        Ok(())
    }

    /// Остановить периодические проходы (graceful shutdown).
    ///
    /// Сигналит рабочему треду и дожидается его завершения: после возврата
    /// эмиссий больше не будет. Повторный `stop` — no-op. Накопленное дерево
    /// не очищается.
    pub fn stop(&mut self) -> Result<(), DirpollError> {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            let _ = worker.join.join();
        }
        Ok(())
    }
}
