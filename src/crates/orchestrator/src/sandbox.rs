//! The sandbox contract: the isolated execution environment a `RunGroup`
//! operates against. Implementations are provided by the host application;
//! this crate only defines the port and a fake for tests.

use async_trait::async_trait;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// The only handle a node has on the filesystem and shell a group's fix is
/// applied against. Implementations need not be `Send + Sync`-safe across
/// threads beyond what a single group's sequential use requires — the
/// supervisor never shares one `Sandbox` between two concurrently running
/// groups. Teardown still runs exactly once per sandbox regardless.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Opaque identifier for logging and metrics, stable for this sandbox's
    /// lifetime.
    fn id(&self) -> &str;

    /// The sandbox's working directory, as seen from inside the sandbox.
    fn work_dir(&self) -> &str;

    async fn run_command(&self, command: &str) -> Result<CommandOutput>;

    async fn read_file(&self, path: &str) -> Result<String>;

    async fn write_file(&self, path: &str, contents: &str) -> Result<()>;

    /// Tears the sandbox down and releases its underlying resources.
    /// Called exactly once per sandbox, on every exit path including
    /// panics — callers drive this through a guard, not by calling it
    /// directly from node logic.
    async fn teardown(&self) -> Result<()>;
}

/// Ensures `Sandbox::teardown` runs exactly once regardless of how the
/// owning scope exits. Node handlers borrow the sandbox through this guard
/// rather than holding the raw trait object.
pub struct SandboxGuard<S: Sandbox> {
    inner: Option<S>,
}

impl<S: Sandbox> SandboxGuard<S> {
    pub fn new(sandbox: S) -> Self {
        Self {
            inner: Some(sandbox),
        }
    }

    pub fn get(&self) -> &S {
        self.inner
            .as_ref()
            .expect("sandbox used after teardown")
    }

    /// Tears down the sandbox, consuming the guard. Double-teardown is
    /// impossible by construction: the `Sandbox` is taken out of `inner`
    /// and a second call has nothing left to act on.
    pub async fn teardown(mut self) -> Result<()> {
        if let Some(sandbox) = self.inner.take() {
            sandbox.teardown().await?;
        }
        Ok(())
    }
}

impl<S: Sandbox> Drop for SandboxGuard<S> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            tracing::warn!("sandbox guard dropped without an explicit teardown");
        }
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory `Sandbox` for node/coordinator tests: commands are
    /// answered from a canned queue, files live in a `HashMap`.
    pub struct FakeSandbox {
        id: String,
        work_dir: String,
        commands: Mutex<Vec<CommandOutput>>,
        files: Mutex<std::collections::HashMap<String, String>>,
        teardown_count: AtomicUsize,
    }

    impl FakeSandbox {
        pub fn new(id: impl Into<String>) -> Self {
            Self {
                id: id.into(),
                work_dir: "/workspace".into(),
                commands: Mutex::new(Vec::new()),
                files: Mutex::new(std::collections::HashMap::new()),
                teardown_count: AtomicUsize::new(0),
            }
        }

        pub fn with_file(self, path: impl Into<String>, contents: impl Into<String>) -> Self {
            self.files
                .lock()
                .unwrap()
                .insert(path.into(), contents.into());
            self
        }

        pub fn push_command_result(&self, output: CommandOutput) {
            self.commands.lock().unwrap().push(output);
        }

        pub fn teardown_count(&self) -> usize {
            self.teardown_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Sandbox for FakeSandbox {
        fn id(&self) -> &str {
            &self.id
        }

        fn work_dir(&self) -> &str {
            &self.work_dir
        }

        async fn run_command(&self, _command: &str) -> Result<CommandOutput> {
            let mut queue = self.commands.lock().unwrap();
            if queue.is_empty() {
                Ok(CommandOutput {
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: 0,
                })
            } else {
                Ok(queue.remove(0))
            }
        }

        async fn read_file(&self, path: &str) -> Result<String> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| crate::error::OrchestratorError::SandboxError(format!(
                    "no such file: {path}"
                )))
        }

        async fn write_file(&self, path: &str, contents: &str) -> Result<()> {
            self.files
                .lock()
                .unwrap()
                .insert(path.to_string(), contents.to_string());
            Ok(())
        }

        async fn teardown(&self) -> Result<()> {
            self.teardown_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
