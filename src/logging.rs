//! Нормализованное логирование для Dirpoll Core.
//!
//! ## Уровни логов
//! - `ERROR`: критические ошибки, требующие внимания
//! - `WARN`:  предупреждения, некритичные проблемы
//! - `INFO`:  важные события жизненного цикла (start, stop, завершение треда)
//! - `DEBUG`: детальная информация для отладки (отдельные scan-проходы)
//! - `TRACE`: максимально детальный вывод (включая данные)
//!
//! ## Корреляция событий
//! Каждый scan-проход получает свой `LogContext` с `correlation_id`, чтобы
//! строки одного прохода можно было отличить от соседних.
//!
//! ## Использование
//! ```ignore
//! use dirpoll::logging::{init_logging, LogContext};
//!
//! init_logging(); // вызывается один раз при старте
//!
//! let ctx = LogContext::with_operation("scan_pass");
//! log::debug!("[{}] scan pass started", ctx.correlation_id);
//! ```

use std::sync::Once;

use log::{Level, LevelFilter};
use std::io::Write;

static INIT: Once = Once::new();

/// Инициализировать логирование (idempotent).
///
/// Управление уровнем логов: переменная окружения `RUST_LOG`.
/// Примеры:
/// - `RUST_LOG=info` — только INFO и выше
/// - `RUST_LOG=dirpoll=debug` — DEBUG для нашего crate
/// - `RUST_LOG=trace` — максимально детальный вывод
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::Builder::from_env("RUST_LOG")
            .format(|buf, record| {
                let level = match record.level() {
                    Level::Error => "E",
                    Level::Warn => "W",
                    Level::Info => "I",
                    Level::Debug => "D",
                    Level::Trace => "T",
                };

                let timestamp = chrono_timestamp();
                let target = record.target();

                // Формат: [timestamp] [LEVEL] [target] message
                writeln!(
                    buf,
                    "[{}] [{}] [{}] {}",
                    timestamp,
                    level,
                    target,
                    record.args()
                )
            })
            .filter_module("dirpoll", LevelFilter::Info)
            .try_init();
    });
}

/// Генерирует timestamp в ISO 8601 формате с миллисекундами.
fn chrono_timestamp() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    let secs = now.as_secs();
    let millis = now.subsec_millis();

    // Простая конвертация в читаемый формат без зависимости от chrono
    let hours = (secs / 3600) % 24;
    let minutes = (secs / 60) % 60;
    let seconds = secs % 60;

    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
}

/// Контекст логирования с корреляционным ID.
///
/// Используется для привязки строк лога к конкретному scan-проходу.
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Уникальный идентификатор для корреляции событий.
    pub correlation_id: String,
    /// Опциональный контекст операции.
    pub operation: Option<String>,
}

impl LogContext {
    /// Создать новый контекст с уникальным correlation_id.
    pub fn new() -> Self {
        Self {
            correlation_id: generate_correlation_id(),
            operation: None,
        }
    }

    /// Создать контекст с указанным operation name.
    pub fn with_operation(operation: impl Into<String>) -> Self {
        Self {
            correlation_id: generate_correlation_id(),
            operation: Some(operation.into()),
        }
    }

    /// Установить operation name.
    pub fn operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }
}

impl Default for LogContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Генерирует уникальный correlation ID.
///
/// Формат: `corr_<timestamp_ms>_<counter>`
fn generate_correlation_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();

    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);

    format!("corr_{}_{}", timestamp, counter % 10000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context_has_correlation_id() {
        let ctx = LogContext::new();
        assert!(ctx.correlation_id.starts_with("corr_"));
    }

    #[test]
    fn test_log_context_with_operation() {
        let ctx = LogContext::with_operation("scan_pass");
        assert!(ctx.correlation_id.starts_with("corr_"));
        assert_eq!(ctx.operation, Some("scan_pass".to_string()));
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        let ctx1 = LogContext::new();
        let ctx2 = LogContext::new();
        assert_ne!(ctx1.correlation_id, ctx2.correlation_id);
    }
}
