//! Per-invocation diagnostic capture.
//!
//! Each node attempt opens a [`CaptureScope`]. While it is open, output
//! written through [`Diagnostics`] and records passing through
//! [`CaptureLogger`] land in the scope's buffer, which the exception hook
//! receives when the attempt fails. Scopes nest per thread and are released
//! on drop, so a panicking implementation never leaks its buffer into the
//! next call.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

thread_local! {
    static SCOPES: RefCell<Vec<Diagnostics>> = const { RefCell::new(Vec::new()) };
}

/// Handle to a capture buffer.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    buffer: Arc<Mutex<String>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_line(&self, line: impl AsRef<str>) {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.push_str(line.as_ref());
        buffer.push('\n');
    }

    /// Append a `LEVEL: message` line.
    pub fn log(&self, level: log::Level, message: impl std::fmt::Display) {
        self.write_line(format!("{level}: {message}"));
    }

    pub fn contents(&self) -> String {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }
}

/// The innermost open scope on this thread, if any.
pub fn current() -> Option<Diagnostics> {
    SCOPES.with(|scopes| scopes.borrow().last().cloned())
}

/// An open capture scope. Not `Send`: it belongs to the thread that opened it.
#[derive(Debug)]
pub struct CaptureScope {
    diagnostics: Diagnostics,
    _thread_bound: PhantomData<*const ()>,
}

impl CaptureScope {
    pub fn begin() -> Self {
        let diagnostics = Diagnostics::new();
        SCOPES.with(|scopes| scopes.borrow_mut().push(diagnostics.clone()));
        Self {
            diagnostics,
            _thread_bound: PhantomData,
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Close the scope and return everything it captured.
    pub fn finish(self) -> String {
        self.diagnostics.contents()
    }
}

impl Drop for CaptureScope {
    fn drop(&mut self) {
        SCOPES.with(|scopes| {
            let mut scopes = scopes.borrow_mut();
            if let Some(pos) = scopes
                .iter()
                .rposition(|d| Arc::ptr_eq(&d.buffer, &self.diagnostics.buffer))
            {
                scopes.remove(pos);
            }
        });
    }
}

/// A `log` backend that copies records into the current capture scope and
/// forwards them to an optional inner logger.
pub struct CaptureLogger {
    inner: Option<Box<dyn Log>>,
    level: LevelFilter,
}

impl CaptureLogger {
    pub fn new(level: LevelFilter) -> Self {
        Self { inner: None, level }
    }

    /// Also forward every record to `inner`.
    pub fn tee(inner: Box<dyn Log>, level: LevelFilter) -> Self {
        Self {
            inner: Some(inner),
            level,
        }
    }

    /// Install as the global logger.
    pub fn install(self) -> Result<(), SetLoggerError> {
        log::set_max_level(self.level);
        log::set_boxed_logger(Box::new(self))
    }
}

impl Log for CaptureLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(diagnostics) = current() {
            diagnostics.log(record.level(), record.args());
        }
        if let Some(inner) = &self.inner {
            inner.log(record);
        }
    }

    fn flush(&self) {
        if let Some(inner) = &self.inner {
            inner.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scopes_nest_and_release() {
        assert!(current().is_none());
        let outer = CaptureScope::begin();
        outer.diagnostics().write_line("outer");
        {
            let inner = CaptureScope::begin();
            current().unwrap().write_line("inner");
            assert_eq!(inner.finish(), "inner\n");
        }
        current().unwrap().log(log::Level::Warn, "again");
        assert_eq!(outer.finish(), "outer\nWARN: again\n");
        assert!(current().is_none());
    }

    #[test]
    fn test_scope_released_on_panic() {
        let result = std::panic::catch_unwind(|| {
            let _scope = CaptureScope::begin();
            panic!("boom");
        });
        assert!(result.is_err());
        assert!(current().is_none());
    }

    #[test]
    fn test_logger_writes_into_scope() {
        let logger = CaptureLogger::new(LevelFilter::Info);
        let scope = CaptureScope::begin();
        logger.log(
            &Record::builder()
                .level(log::Level::Info)
                .args(format_args!("loaded {} items", 3))
                .build(),
        );
        logger.log(
            &Record::builder()
                .level(log::Level::Debug)
                .args(format_args!("filtered"))
                .build(),
        );
        assert_eq!(scope.finish(), "INFO: loaded 3 items\n");
    }
}
