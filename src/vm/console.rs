//! Output devices for `printf`.

use std::io::Write;

use slog::{info, o, Discard, Logger};

/// Receives the text printed by a running program.
pub trait Console {
    fn print(&mut self, text: &str);
}

impl<C: Console + ?Sized> Console for &mut C {
    fn print(&mut self, text: &str) {
        (**self).print(text)
    }
}

impl<C: Console + ?Sized> Console for Box<C> {
    fn print(&mut self, text: &str) {
        (**self).print(text)
    }
}

/// Writes printed text into a log. This is the default console of a [Vm](super::Vm).
#[derive(Debug, Clone)]
pub struct LogConsole {
    logger: Logger,
}

impl LogConsole {
    pub fn new<L: Into<Option<Logger>>>(logger: L) -> LogConsole {
        let logger = logger
            .into()
            .unwrap_or(Logger::root(Discard, o!()))
            .new(o!("device" => "console"));

        LogConsole { logger }
    }
}

impl Default for LogConsole {
    fn default() -> LogConsole {
        LogConsole::new(None)
    }
}

impl Console for LogConsole {
    fn print(&mut self, text: &str) {
        info!(self.logger, "{}", text);
    }
}

/// Writes printed text to the standard output.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdConsole;

impl Console for StdConsole {
    fn print(&mut self, text: &str) {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let _ = lock.write_all(text.as_bytes());
        let _ = lock.flush();
    }
}

/// Collects printed text in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferConsole {
    pub output: String,
}

impl BufferConsole {
    pub fn new() -> BufferConsole {
        BufferConsole::default()
    }
}

impl Console for BufferConsole {
    fn print(&mut self, text: &str) {
        self.output.push_str(text);
    }
}

/// Adapts a closure into a [Console].
pub struct Callback<F>(pub F);

impl<F> Console for Callback<F>
where
    F: FnMut(&str),
{
    fn print(&mut self, text: &str) {
        (self.0)(text)
    }
}

#[test]
fn test_console_adapters() {
    let mut buffer = BufferConsole::new();
    (&mut buffer).print("a");
    buffer.print("b");
    assert_eq!(buffer.output, "ab");

    let mut lines = Vec::new();
    Callback(|text: &str| lines.push(text.to_string())).print("c");
    assert_eq!(lines, vec!["c".to_string()]);

    let mut boxed: Box<dyn Console> = Box::new(BufferConsole::new());
    boxed.print("d");
}
