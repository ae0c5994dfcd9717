// WHY: Models report char offsets, Rust slices by byte. Document keeps the
// char -> byte boundary table so window slicing never splits a code point

use crate::chunker::Window;

/// Immutable input text addressed in Unicode scalar (char) positions
#[derive(Debug, Clone)]
pub struct Document {
    text: String,
    /// Byte offset of every char boundary, including the final `text.len()`
    boundaries: Vec<usize>,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        boundaries.push(text.len());
        Self { text, boundaries }
    }

    /// Length in chars
    pub fn len(&self) -> usize {
        self.boundaries.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Text of the char range `[start, end)`, clamped to the document
    pub fn slice(&self, start: usize, end: usize) -> &str {
        let end = end.min(self.len());
        let start = start.min(end);
        &self.text[self.boundaries[start]..self.boundaries[end]]
    }

    /// Text covered by a window
    pub fn window_text(&self, window: &Window) -> &str {
        self.slice(window.start, window.end)
    }
}

impl From<&str> for Document {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Document {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}
