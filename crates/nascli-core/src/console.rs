use async_trait::async_trait;

use crate::error::ShellError;

/// The interactive stream used by `print`, `echo` and `readline`.
#[async_trait]
pub trait Console: Send {
    fn write_line(&mut self, line: &str);

    /// Read one line without its terminator. `Ok(None)` means the stream
    /// closed.
    async fn read_line(&mut self, prompt: &str) -> Result<Option<String>, ShellError>;
}
