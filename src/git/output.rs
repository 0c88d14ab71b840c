/// Per-invocation accumulator filled by the executor.
///
/// Three append-only line buffers (stdout, stderr, and the `[command]` /
/// diagnostic lines) plus a write-once exit code. Nothing is interpreted
/// here; operations decide what a given exit code or output shape means.
#[derive(Debug, Default, Clone)]
pub struct GitExecOutput {
    exit_code: Option<i32>,
    stdout: Vec<String>,
    stderr: Vec<String>,
    debug: Vec<String>,
}

impl GitExecOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stdout_line(&mut self, line: impl Into<String>) {
        self.stdout.push(line.into());
    }

    pub fn add_stderr_line(&mut self, line: impl Into<String>) {
        self.stderr.push(line.into());
    }

    pub fn add_debug_line(&mut self, line: impl Into<String>) {
        self.debug.push(line.into());
    }

    /// Records the exit code. Returns `false` and keeps the original value
    /// if one was already recorded.
    pub fn set_exit_code(&mut self, code: i32) -> bool {
        if self.exit_code.is_some() {
            return false;
        }
        self.exit_code = Some(code);
        true
    }

    /// Exit code of the process, or `-1` if it never reported one.
    pub fn exit_code(&self) -> i32 {
        self.exit_code.unwrap_or(-1)
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout(&self) -> String {
        self.stdout.join("\n")
    }

    pub fn stderr(&self) -> String {
        self.stderr.join("\n")
    }

    pub fn debug(&self) -> String {
        self.debug.join("\n")
    }

    pub fn stdout_lines(&self) -> &[String] {
        &self.stdout
    }

    pub fn stderr_lines(&self) -> &[String] {
        &self.stderr
    }

    /// Non-empty stdout lines.
    pub fn lines(&self) -> Vec<&str> {
        self.stdout
            .iter()
            .map(String::as_str)
            .filter(|l| !l.is_empty())
            .collect()
    }

    /// Stdout with leading/trailing whitespace removed.
    pub fn trimmed(&self) -> String {
        self.stdout().trim().to_string()
    }
}

/// Extra observer for a single invocation.
///
/// Callbacks fire in addition to the executor's own accumulation into
/// [`GitExecOutput`]; they cannot suppress or replace it. Every method has
/// a no-op default so implementors only override the channels they need.
pub trait OutputListener: Send {
    fn on_stdout(&mut self, _line: &str) {}
    fn on_stderr(&mut self, _line: &str) {}
    fn on_debug(&mut self, _line: &str) {}
    fn on_exit(&mut self, _code: i32) {}
}
