//! Снапшот метаданных файла и сравнение двух снапшотов.
//!
//! `FileDetail` создаётся заново при каждом наблюдении файла и далее не
//! мутируется: при любом расхождении он заменяется целиком новым снапшотом.

use std::collections::BTreeMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Снапшот метаданных одного файла на момент scan-прохода.
///
/// Идентичность — полный путь. Timestamps нормализованы в Unix-миллисекунды,
/// чтобы сравнение шло по абсолютному значению, а не по представлению.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDetail {
    /// Директория, в которой лежит файл.
    pub parent_dir: PathBuf,
    /// Полный путь к файлу.
    pub full_path: PathBuf,
    /// Имя файла (lossy-представление, для payload и отображения; точная
    /// идентичность — `full_path`).
    pub file_name: String,
    /// Размер в байтах.
    pub size: u64,
    /// Расширение (без точки), если есть.
    pub extension: Option<String>,
    /// Последний доступ (Unix ms), если ФС его отдаёт.
    pub accessed_at_ms: Option<i64>,
    /// Последняя модификация (Unix ms), если ФС её отдаёт.
    pub modified_at_ms: Option<i64>,
    /// Время создания (Unix ms), если ФС его отдаёт.
    pub created_at_ms: Option<i64>,
}

impl FileDetail {
    /// Построить снапшот из уже полученных метаданных.
    pub fn from_metadata(path: &Path, metadata: &Metadata) -> Self {
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let parent_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let extension = path
            .extension()
            .map(|s| s.to_string_lossy().to_string());

        Self {
            parent_dir,
            full_path: path.to_path_buf(),
            file_name,
            size: metadata.len(),
            extension,
            accessed_at_ms: metadata.accessed().ok().map(system_time_to_ms),
            modified_at_ms: metadata.modified().ok().map(system_time_to_ms),
            created_at_ms: metadata.created().ok().map(system_time_to_ms),
        }
    }
}

fn system_time_to_ms(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Изменение одного поля: старое и новое значение.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldChange {
    pub base_value: String,
    pub compared_value: String,
}

/// Результат сравнения двух снапшотов одного пути.
///
/// Не хранится: потребляется сразу шагом эмиссии `fileChanged`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiffResult {
    /// Имя изменившегося поля → {старое, новое}.
    pub differences: BTreeMap<&'static str, FieldChange>,
}

impl DiffResult {
    pub fn has_differences(&self) -> bool {
        !self.differences.is_empty()
    }
}

/// Пополевое сравнение двух снапшотов, считающихся одним и тем же путём.
///
/// Чистая функция без side effects. Идентичность (одно и то же имя файла)
/// устанавливает вызывающая сторона через lookup в дереве; сюда не попадают
/// снапшоты разных файлов.
pub fn compare(base: &FileDetail, compared: &FileDetail) -> DiffResult {
    let mut diff = DiffResult::default();

    if base.size != compared.size {
        diff.differences.insert(
            "size",
            FieldChange {
                base_value: base.size.to_string(),
                compared_value: compared.size.to_string(),
            },
        );
    }
    if base.extension != compared.extension {
        diff.differences.insert(
            "extension",
            FieldChange {
                base_value: fmt_opt_str(base.extension.as_deref()),
                compared_value: fmt_opt_str(compared.extension.as_deref()),
            },
        );
    }
    if base.accessed_at_ms != compared.accessed_at_ms {
        diff.differences.insert(
            "accessed_at",
            FieldChange {
                base_value: fmt_opt_ms(base.accessed_at_ms),
                compared_value: fmt_opt_ms(compared.accessed_at_ms),
            },
        );
    }
    if base.modified_at_ms != compared.modified_at_ms {
        diff.differences.insert(
            "modified_at",
            FieldChange {
                base_value: fmt_opt_ms(base.modified_at_ms),
                compared_value: fmt_opt_ms(compared.modified_at_ms),
            },
        );
    }
    if base.created_at_ms != compared.created_at_ms {
        diff.differences.insert(
            "created_at",
            FieldChange {
                base_value: fmt_opt_ms(base.created_at_ms),
                compared_value: fmt_opt_ms(compared.created_at_ms),
            },
        );
    }

    diff
}

fn fmt_opt_str(value: Option<&str>) -> String {
    value.unwrap_or("none").to_string()
}

fn fmt_opt_ms(value: Option<i64>) -> String {
    value.map_or_else(|| "none".to_string(), |ms| ms.to_string())
}
