//! In-memory дерево наблюдаемой директории.
//!
//! Узел — tagged variant: либо снапшот файла (лист), либо вложенная
//! директория (map по имени сегмента). Дерево отражает объединение всего,
//! что видели завершённые scan-проходы, минус подтверждённые удаления.
//! Владеет деревом исключительно watcher; наружу оно не отдаётся.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::watcher::snapshot::FileDetail;

/// Узел дерева: файл или директория.
#[derive(Clone, Debug)]
pub enum TreeNode {
    File(FileDetail),
    Dir(BTreeMap<OsString, TreeNode>),
}

/// Дерево, укоренённое в наблюдаемой директории.
///
/// Ключи — сырые `OsString`-сегменты, как их отдаёт ФС: пути, собранные
/// обратно из ключей, совпадают с реально наблюдавшимися (в том числе для
/// не-UTF8 имён, легальных на Linux).
#[derive(Debug)]
pub struct DirectoryTree {
    root_path: PathBuf,
    entries: BTreeMap<OsString, TreeNode>,
}

impl DirectoryTree {
    pub fn new(root_path: PathBuf) -> Self {
        Self {
            root_path,
            entries: BTreeMap::new(),
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Сегменты пути относительно корня дерева.
    ///
    /// `None`, если путь лежит вне корня.
    fn relative_segments(&self, path: &Path) -> Option<Vec<OsString>> {
        let relative = path.strip_prefix(&self.root_path).ok()?;
        Some(
            relative
                .components()
                .map(|c| c.as_os_str().to_os_string())
                .collect(),
        )
    }

    /// Содержимое узла-директории, если такой узел уже есть в дереве.
    pub fn dir_entries_mut(&mut self, dir: &Path) -> Option<&mut BTreeMap<OsString, TreeNode>> {
        let segments = self.relative_segments(dir)?;
        let mut current = &mut self.entries;
        for seg in segments {
            match current.get_mut(&seg) {
                Some(TreeNode::Dir(children)) => current = children,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Найти или создать узел-директорию, материализуя недостающие сегменты.
    ///
    /// `on_created` вызывается для каждого нового сегмента с его полным путём
    /// (в порядке от корня к листу). Узел-файл на месте директории заменяется
    /// целиком: с прошлого прохода путь сменил тип.
    pub fn ensure_dir(
        &mut self,
        dir: &Path,
        mut on_created: impl FnMut(&Path),
    ) -> Option<&mut BTreeMap<OsString, TreeNode>> {
        let segments = self.relative_segments(dir)?;
        let mut current = &mut self.entries;
        let mut full = self.root_path.clone();
        for seg in segments {
            full.push(&seg);

            let mut materialized = false;
            let node = current
                .entry(seg)
                .and_modify(|node| {
                    if matches!(node, TreeNode::File(_)) {
                        *node = TreeNode::Dir(BTreeMap::new());
                        materialized = true;
                    }
                })
                .or_insert_with(|| {
                    materialized = true;
                    TreeNode::Dir(BTreeMap::new())
                });
            if materialized {
                on_created(&full);
            }

            let TreeNode::Dir(children) = node else {
                return None;
            };
            current = children;
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(path: &str) -> FileDetail {
        let full_path = PathBuf::from(path);
        FileDetail {
            parent_dir: full_path.parent().unwrap().to_path_buf(),
            file_name: full_path
                .file_name()
                .unwrap()
                .to_string_lossy()
                .to_string(),
            full_path,
            size: 1,
            extension: Some("txt".to_string()),
            accessed_at_ms: None,
            modified_at_ms: None,
            created_at_ms: None,
        }
    }

    #[test]
    fn test_root_entries_are_reachable_without_creation() {
        let mut tree = DirectoryTree::new(PathBuf::from("/watch"));
        let mut created = Vec::new();
        let entries = tree
            .ensure_dir(Path::new("/watch"), |p| created.push(p.to_path_buf()))
            .unwrap();
        entries.insert(
            OsString::from("a.txt"),
            TreeNode::File(detail("/watch/a.txt")),
        );
        assert!(created.is_empty());
        assert_eq!(tree.dir_entries_mut(Path::new("/watch")).unwrap().len(), 1);
    }

    #[test]
    fn test_ensure_dir_materializes_missing_segments_in_order() {
        let mut tree = DirectoryTree::new(PathBuf::from("/watch"));
        let mut created = Vec::new();
        tree.ensure_dir(Path::new("/watch/a/b"), |p| created.push(p.to_path_buf()))
            .unwrap();
        assert_eq!(
            created,
            vec![PathBuf::from("/watch/a"), PathBuf::from("/watch/a/b")]
        );

        // Повторный вызов ничего не создаёт
        let mut created_again = Vec::new();
        tree.ensure_dir(Path::new("/watch/a/b"), |p| {
            created_again.push(p.to_path_buf());
        })
        .unwrap();
        assert!(created_again.is_empty());
    }

    #[test]
    fn test_dir_entries_mut_is_none_for_unknown_or_file_node() {
        let mut tree = DirectoryTree::new(PathBuf::from("/watch"));
        tree.ensure_dir(Path::new("/watch"), |_| {})
            .unwrap()
            .insert(
                OsString::from("a.txt"),
                TreeNode::File(detail("/watch/a.txt")),
            );

        assert!(tree.dir_entries_mut(Path::new("/watch/missing")).is_none());
        assert!(tree.dir_entries_mut(Path::new("/watch/a.txt")).is_none());
        assert!(tree.dir_entries_mut(Path::new("/elsewhere")).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_segments_preserve_non_utf8_names() {
        use std::os::unix::ffi::OsStrExt;

        let mut tree = DirectoryTree::new(PathBuf::from("/watch"));
        let raw_name = std::ffi::OsStr::from_bytes(b"f\xFF");
        let dir = Path::new("/watch").join(raw_name);

        let mut created = Vec::new();
        tree.ensure_dir(&dir, |p| created.push(p.to_path_buf())).unwrap();

        // Путь, собранный из ключей, байт-в-байт равен наблюдавшемуся
        assert_eq!(created, vec![dir.clone()]);
        assert!(tree.dir_entries_mut(&dir).is_some());
    }

    #[test]
    fn test_file_node_is_replaced_when_path_becomes_directory() {
        let mut tree = DirectoryTree::new(PathBuf::from("/watch"));
        tree.ensure_dir(Path::new("/watch"), |_| {})
            .unwrap()
            .insert(OsString::from("sub"), TreeNode::File(detail("/watch/sub")));

        let mut created = Vec::new();
        tree.ensure_dir(Path::new("/watch/sub"), |p| created.push(p.to_path_buf()))
            .unwrap();
        assert_eq!(created, vec![PathBuf::from("/watch/sub")]);
        assert!(tree.dir_entries_mut(Path::new("/watch/sub")).is_some());
    }
}
