use crate::errors::{ClientError, Result};

/// Destination for "copy this code" actions.
pub trait Clipboard {
    fn copy(&mut self, text: &str) -> Result<()>;
}

/// The desktop clipboard. Opened per copy, since a held handle can block
/// other applications on some platforms.
#[derive(Debug, Default)]
pub struct SystemClipboard;

impl Clipboard for SystemClipboard {
    fn copy(&mut self, text: &str) -> Result<()> {
        let mut board =
            arboard::Clipboard::new().map_err(|err| ClientError::Clipboard(err.to_string()))?;
        board
            .set_text(text.to_string())
            .map_err(|err| ClientError::Clipboard(err.to_string()))
    }
}

/// Keeps copied texts in memory; used when no desktop clipboard exists.
#[derive(Debug, Default, Clone)]
pub struct MemoryClipboard {
    pub copied: Vec<String>,
}

impl Clipboard for MemoryClipboard {
    fn copy(&mut self, text: &str) -> Result<()> {
        self.copied.push(text.to_string());
        Ok(())
    }
}
