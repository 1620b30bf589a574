use crate::error::{ExpandoError, Result};

/// Text access to the system clipboard.
pub trait Clipboard {
    fn get(&mut self) -> Result<String>;
    fn set(&mut self, text: &str) -> Result<()>;
}

/// [`Clipboard`] backed by arboard.
///
/// The handle is kept open between calls: on X11 the pasted text is served
/// by this process and disappears when the handle is dropped.
#[derive(Default)]
pub struct SystemClipboard {
    inner: Option<arboard::Clipboard>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&mut self) -> Result<&mut arboard::Clipboard> {
        if self.inner.is_none() {
            let clipboard =
                arboard::Clipboard::new().map_err(|e| ExpandoError::Clipboard(e.to_string()))?;
            self.inner = Some(clipboard);
        }
        self.inner
            .as_mut()
            .ok_or_else(|| ExpandoError::Clipboard("clipboard unavailable".to_string()))
    }
}

impl Clipboard for SystemClipboard {
    /// An empty or non-text clipboard reads as an empty string.
    fn get(&mut self) -> Result<String> {
        match self.handle()?.get_text() {
            Ok(text) => Ok(text),
            Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
            Err(e) => Err(ExpandoError::Clipboard(e.to_string())),
        }
    }

    fn set(&mut self, text: &str) -> Result<()> {
        self.handle()?
            .set_text(text)
            .map_err(|e| ExpandoError::Clipboard(e.to_string()))
    }
}
