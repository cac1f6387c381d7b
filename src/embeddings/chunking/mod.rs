
use serde::{Deserialize, Serialize};

/// A window of source text ready for embedding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Passage<'a> {
    /// Position of this passage within its source text
    pub index: usize,
    /// Offset of the first character, counted in chars
    pub start: usize,
    /// The passage text, borrowed from the source
    pub text: &'a str,
}

impl Passage<'_> {
    /// Length in characters
    #[inline]
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Configuration for fixed-size passage segmentation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum passage length in characters
    pub window_size: usize,
    /// Characters shared by consecutive passages
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            window_size: 800,
            overlap: 100,
        }
    }
}

impl ChunkingConfig {
    /// Distance in characters between the starts of consecutive passages
    #[inline]
    pub fn stride(&self) -> usize {
        self.window_size.saturating_sub(self.overlap).max(1)
    }
}

/// Lazy iterator over the passages of one text
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    text: &'a str,
    /// Byte offset of every char boundary, plus the end of the text
    boundaries: Vec<usize>,
    window_size: usize,
    stride: usize,
    next_start: usize,
    next_index: usize,
    finished: bool,
}

/// Split text into overlapping fixed-size character windows
///
/// Passage `i` starts at char `i * (window - overlap)` and spans at most
/// `window` chars. Text no longer than the window yields one passage and
/// empty text yields none.
#[inline]
pub fn segment<'a>(text: &'a str, config: &ChunkingConfig) -> Segments<'a> {
    let mut boundaries: Vec<usize> = text.char_indices().map(|(offset, _)| offset).collect();
    boundaries.push(text.len());

    Segments {
        text,
        boundaries,
        window_size: config.window_size.max(1),
        stride: config.stride(),
        next_start: 0,
        next_index: 0,
        finished: text.is_empty(),
    }
}

/// Number of passages [`segment`] produces for a text of `char_len` chars
#[inline]
pub fn passage_count(char_len: usize, config: &ChunkingConfig) -> usize {
    let window = config.window_size.max(1);
    if char_len == 0 {
        0
    } else if char_len <= window {
        1
    } else {
        char_len
            .saturating_sub(config.overlap)
            .div_ceil(config.stride())
    }
}

impl Segments<'_> {
    fn char_len(&self) -> usize {
        self.boundaries.len() - 1
    }

    /// Rewind to the first passage
    #[inline]
    pub fn restart(&mut self) {
        self.next_start = 0;
        self.next_index = 0;
        self.finished = self.text.is_empty();
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = Passage<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let total = self.char_len();
        let start = self.next_start;
        let end = (start + self.window_size).min(total);

        let text = self
            .text
            .get(self.boundaries[start]..self.boundaries[end])
            .unwrap_or_default();

        let passage = Passage {
            index: self.next_index,
            start,
            text,
        };

        if end == total {
            self.finished = true;
        } else {
            self.next_start += self.stride;
            self.next_index += 1;
        }

        Some(passage)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            return (0, Some(0));
        }
        let remaining_chars = self.char_len() - self.next_start;
        let remaining = passage_count(
            remaining_chars,
            &ChunkingConfig {
                window_size: self.window_size,
                overlap: self.window_size - self.stride,
            },
        );
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Segments<'_> {}

impl std::iter::FusedIterator for Segments<'_> {}
