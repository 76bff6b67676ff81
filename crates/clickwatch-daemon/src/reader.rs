//! Line-oriented reader over a worker output pipe

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use clickwatch_core::prelude::*;

/// Lazy, finite sequence of lines read from an async byte stream.
///
/// Lines come back without their `\n` / `\r\n` terminator. A last line with
/// no terminator is still produced. Bytes that are not valid UTF-8 are
/// replaced rather than ending the stream, since the worker's output is not
/// under our control.
///
/// End of input and read errors both end the sequence; once `next_line`
/// returns `None` it always does. Create a new instance per process.
///
/// `next_line` is cancel-safe: partial data stays in the internal buffer, so
/// it can sit in a `tokio::select!` next to another stream.
#[derive(Debug)]
pub struct LineStream<R> {
    reader: R,
    buf: Vec<u8>,
    finished: bool,
}

impl<R: AsyncBufRead + Unpin> LineStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            finished: false,
        }
    }

    /// Read the next line, or `None` once the stream has ended.
    pub async fn next_line(&mut self) -> Option<String> {
        if self.finished {
            return None;
        }

        match self.reader.read_until(b'\n', &mut self.buf).await {
            Ok(0) => {
                // EOF; flush whatever a cancelled call left behind
                self.finished = true;
                if self.buf.is_empty() {
                    None
                } else {
                    Some(self.take_line())
                }
            }
            Ok(_) => Some(self.take_line()),
            Err(e) => {
                warn!("Read error on worker output, treating as end of stream: {}", e);
                self.finished = true;
                None
            }
        }
    }

    /// Whether the stream has ended
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn take_line(&mut self) -> String {
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        line
    }
}
