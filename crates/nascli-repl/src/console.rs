use std::io::Write;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use nascli_core::console::Console;
use nascli_core::error::ShellError;

/// Console over the process's stdin and stdout.
///
/// The interactive loop and `readline` share this reader, so buffered input
/// is never lost between them.
pub struct StdConsole {
    lines: Lines<BufReader<Stdin>>,
}

impl Default for StdConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl StdConsole {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

#[async_trait]
impl Console for StdConsole {
    fn write_line(&mut self, line: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{}", line);
        let _ = stdout.flush();
    }

    async fn read_line(&mut self, prompt: &str) -> Result<Option<String>, ShellError> {
        if !prompt.is_empty() {
            let mut stdout = std::io::stdout().lock();
            let _ = write!(stdout, "{}", prompt);
            let _ = stdout.flush();
        }
        Ok(self.lines.next_line().await?)
    }
}
