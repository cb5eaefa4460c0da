use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

/// In-memory sink for `print` output.
///
/// Clones share one buffer, so a clone can be handed to the VM while the
/// original is kept for reading.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer(Rc<RefCell<Vec<u8>>>);

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl Write for OutputBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
