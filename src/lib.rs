//! Dirpoll Core
//!
//! Этот crate реализует polling-наблюдение за директорией: периодическое
//! сканирование дерева файлов, сравнение с in-memory снапшотом и публикация
//! дискретных событий (файл добавлен/изменён/удалён, папка добавлена/удалена,
//! директория просканирована).
//!
//! Никаких OS-уровневых подписок на события ФС (inotify и т.п.) — только
//! poll-and-diff по метаданным.

pub mod error;
pub mod logging;
pub mod watcher;

pub use error::DirpollError;
pub use watcher::events::{EventBus, WatchEvent, WatchEventKind};
pub use watcher::snapshot::{DiffResult, FieldChange, FileDetail};
pub use watcher::DirectoryWatcher;
