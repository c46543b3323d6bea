//! События watcher'а и typed publish/subscribe.
//!
//! Вместо duck-typed emitter'а — перечисление видов событий и подписка по
//! виду: payload каждого события проверяется компилятором. Handlers
//! вызываются синхронно внутри scan-прохода, в порядке подписки.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::watcher::snapshot::{FieldChange, FileDetail};

/// Публичное событие watcher'а.
#[derive(Clone, Debug)]
pub enum WatchEvent {
    /// Новый файл обнаружен на неподавленном проходе.
    FileAdded(FileDetail),
    /// Метаданные файла разошлись со снапшотом в дереве.
    FileChanged {
        detail: FileDetail,
        differences: BTreeMap<&'static str, FieldChange>,
    },
    /// Ранее известный файл больше не существует.
    FileRemoved { full_path: PathBuf },
    /// Новая папка материализовалась в дереве (только recursive-режим).
    FolderAdded { full_path: PathBuf },
    /// Ранее известная папка больше не существует (поддерево отброшено).
    FolderRemoved { full_path: PathBuf },
    /// Все записи одной директории обработаны в этом проходе.
    ScannedDirectory { dir_path: PathBuf },
}

/// Вид события — ключ подписки.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    FileAdded,
    FileChanged,
    FileRemoved,
    FolderAdded,
    FolderRemoved,
    ScannedDirectory,
}

impl WatchEvent {
    pub fn kind(&self) -> WatchEventKind {
        match self {
            WatchEvent::FileAdded(_) => WatchEventKind::FileAdded,
            WatchEvent::FileChanged { .. } => WatchEventKind::FileChanged,
            WatchEvent::FileRemoved { .. } => WatchEventKind::FileRemoved,
            WatchEvent::FolderAdded { .. } => WatchEventKind::FolderAdded,
            WatchEvent::FolderRemoved { .. } => WatchEventKind::FolderRemoved,
            WatchEvent::ScannedDirectory { .. } => WatchEventKind::ScannedDirectory,
        }
    }
}

type Handler = Arc<dyn Fn(&WatchEvent) + Send + Sync>;

/// Шина событий: ноль и более handlers на каждый вид события.
///
/// Эмиссия идёт из scan-треда; подписка возможна из любого треда. Handlers
/// вызываются вне внутренних lock'ов, поэтому handler может подписывать и
/// эмитить на этой же шине.
#[derive(Default)]
pub struct EventBus {
    by_kind: Mutex<HashMap<WatchEventKind, Vec<Handler>>>,
    all: Mutex<Vec<Handler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Подписать handler на один вид события.
    pub fn subscribe(
        &self,
        kind: WatchEventKind,
        handler: impl Fn(&WatchEvent) + Send + Sync + 'static,
    ) {
        // Примечание: recover from poisoned mutex - если предыдущий поток
        // паниковал, мы всё равно можем безопасно продолжить работу.
        self.by_kind
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Подписать handler на все виды событий сразу.
    pub fn subscribe_all(&self, handler: impl Fn(&WatchEvent) + Send + Sync + 'static) {
        self.all
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(Arc::new(handler));
    }

    /// Синхронно раздать событие подписчикам его вида, затем all-подписчикам.
    ///
    /// Список handlers снимается под lock'ом, вызовы идут уже без него.
    pub fn emit(&self, event: &WatchEvent) {
        let kind_handlers: Vec<Handler> = self
            .by_kind
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&event.kind())
            .cloned()
            .unwrap_or_default();
        for handler in &kind_handlers {
            handler(event);
        }

        let all_handlers: Vec<Handler> = self
            .all
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        for handler in &all_handlers {
            handler(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn scanned(dir: &str) -> WatchEvent {
        WatchEvent::ScannedDirectory {
            dir_path: PathBuf::from(dir),
        }
    }

    #[test]
    fn test_handlers_receive_only_their_kind() {
        let bus = EventBus::new();
        let scanned_count = Arc::new(AtomicUsize::new(0));
        let removed_count = Arc::new(AtomicUsize::new(0));

        let c = scanned_count.clone();
        bus.subscribe(WatchEventKind::ScannedDirectory, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let c = removed_count.clone();
        bus.subscribe(WatchEventKind::FileRemoved, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&scanned("/watch"));
        assert_eq!(scanned_count.load(Ordering::SeqCst), 1);
        assert_eq!(removed_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        bus.subscribe(WatchEventKind::ScannedDirectory, move |_| {
            o.lock().unwrap().push("first");
        });
        let o = order.clone();
        bus.subscribe(WatchEventKind::ScannedDirectory, move |_| {
            o.lock().unwrap().push("second");
        });

        bus.emit(&scanned("/watch"));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_handler_may_use_the_bus_during_emit() {
        let bus = Arc::new(EventBus::new());
        let late_count = Arc::new(AtomicUsize::new(0));

        // Handler, подписывающий нового подписчика прямо из dispatch'а:
        // не должен deadlock'нуться на внутренних lock'ах шины.
        let reentrant_bus = Arc::clone(&bus);
        let c = late_count.clone();
        bus.subscribe(WatchEventKind::ScannedDirectory, move |_| {
            let c = c.clone();
            reentrant_bus.subscribe(WatchEventKind::FileRemoved, move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            });
        });

        bus.emit(&scanned("/watch"));
        bus.emit(&WatchEvent::FileRemoved {
            full_path: PathBuf::from("/watch/a.txt"),
        });
        assert_eq!(late_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribe_all_sees_every_kind() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        bus.subscribe_all(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&scanned("/watch"));
        bus.emit(&WatchEvent::FileRemoved {
            full_path: PathBuf::from("/watch/a.txt"),
        });
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
