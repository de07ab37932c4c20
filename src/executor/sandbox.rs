//! Isolated execution of user supplied parser code.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use rustpython_vm::signal::UserSignalSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    Result, ScrapeError,
    executor::code::{JavascriptExecutor, PythonExecutor},
    model::CodeLanguage,
};

const INTERRUPT_INTERVAL: Duration = Duration::from_millis(20);

/// Runs parser code against one input value.
///
/// Exceptions, timeouts and a missing parser function are all
/// [`ScrapeError::ParserError`] with a single `ExceptionType: message` line.
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn run(
        &self,
        language: CodeLanguage,
        code: &str,
        input: Value,
        timeout: Duration,
    ) -> Result<Value>;
}

/// Default [`Sandbox`]: rustpython for Python, QuickJS for JavaScript.
///
/// Each run gets a fresh interpreter on the blocking pool. QuickJS stops itself
/// at the deadline, a Python run past it is interrupted with `TimeoutError`.
#[derive(Debug, Clone, Default)]
pub struct ScriptSandbox {
    memory_limit_bytes: usize,
}

impl ScriptSandbox {
    pub fn new(memory_limit_bytes: usize) -> Self {
        Self {
            memory_limit_bytes,
        }
    }
}

#[async_trait]
impl Sandbox for ScriptSandbox {
    async fn run(
        &self,
        language: CodeLanguage,
        code: &str,
        input: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let code = code.to_string();
        let memory_limit = self.memory_limit_bytes;
        let deadline = Instant::now() + timeout;
        let (interrupt, signals) = rustpython_vm::signal::user_signal_channel();

        let mut handle = tokio::task::spawn_blocking(move || match language {
            CodeLanguage::Javascript => JavascriptExecutor::execute(&code, input, deadline, memory_limit),
            CodeLanguage::Python3 => PythonExecutor::execute_interruptible(&code, input, signals),
        });

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(ScrapeError::ParserError(format!("RuntimeError: {}", e))),
            Err(_) => {
                warn!("sandbox::run({}) timed out after {} ms", language.as_ref(), timeout.as_millis());
                if language == CodeLanguage::Python3 {
                    tokio::spawn(interrupt_until_exit(interrupt, handle));
                }
                Err(ScrapeError::ParserError(format!("TimeoutError: parser code timed out after {} ms", timeout.as_millis())))
            }
        }
    }
}

/// Keep interrupting a Python run until its blocking thread has returned.
///
/// The wakeup flag of rustpython is process wide, so a concurrent interpreter
/// can swallow one send; resending is required.
async fn interrupt_until_exit(
    interrupt: UserSignalSender,
    mut handle: JoinHandle<Result<Value>>,
) {
    loop {
        if interrupt.send(PythonExecutor::interrupt()).is_err() {
            break;
        }
        tokio::select! {
            _ = &mut handle => break,
            _ = tokio::time::sleep(INTERRUPT_INTERVAL) => {}
        }
    }
    debug!("sandbox::interrupt_until_exit() python run stopped");
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_sandbox_runs_both_languages() {
        let sandbox = ScriptSandbox::new(16 * 1024 * 1024);
        let js = sandbox.run(CodeLanguage::Javascript, "function parse(d) { return d.v * 2; }", json!({"v": 21}), Duration::from_secs(5)).await.unwrap();
        assert_eq!(js, json!(42));

        let py = sandbox.run(CodeLanguage::Python3, "def parse(d):\n    return d['v'] + 1\n", json!({"v": 41}), Duration::from_secs(5)).await.unwrap();
        assert_eq!(py, json!(42));
    }

    #[tokio::test]
    async fn test_sandbox_timeout() {
        let sandbox = ScriptSandbox::default();
        let err = sandbox.run(CodeLanguage::Javascript, "function parse(d) { for (;;) {} }", json!(null), Duration::from_millis(200)).await.unwrap_err();
        assert!(matches!(err, ScrapeError::ParserError(_)));
    }

    const ENDLESS_PY: &str = "def parse(d):\n    while True:\n        pass\n";

    #[tokio::test]
    async fn test_python_timeout() {
        let sandbox = ScriptSandbox::default();
        let started = Instant::now();
        let err = sandbox.run(CodeLanguage::Python3, ENDLESS_PY, json!(null), Duration::from_millis(200)).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(2));
        let ScrapeError::ParserError(message) = err else {
            panic!("expected a parser error");
        };
        assert!(message.starts_with("TimeoutError"), "{}", message);
    }

    #[tokio::test]
    async fn test_timed_out_python_thread_returns() {
        let (interrupt, signals) = rustpython_vm::signal::user_signal_channel();
        let handle = tokio::task::spawn_blocking(move || PythonExecutor::execute_interruptible(ENDLESS_PY, json!(null), signals));
        tokio::time::sleep(Duration::from_millis(100)).await;

        tokio::time::timeout(Duration::from_secs(5), interrupt_until_exit(interrupt, handle)).await.unwrap();
    }
}
