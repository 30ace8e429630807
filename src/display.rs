// src/display.rs
//
// Text display buffer for incoming serial data.
//
// Bytes are decoded as UTF-8 incrementally: a multi-byte character split
// across two reads is held back until it completes. Invalid sequences
// become U+FFFD. A carriage return ends a line, and a "\n" directly after
// one is swallowed, so CR, LF and CRLF devices all render one line per line
// even when the pair is split across reads.

/// Default cap on retained text (1 MiB)
pub const DEFAULT_SCROLLBACK_BYTES: usize = 1 << 20;

#[derive(Clone, Debug)]
pub struct DisplayBuffer {
    text: String,
    /// Trailing bytes of an incomplete UTF-8 sequence
    partial: Vec<u8>,
    /// Last decoded char was '\r'
    after_cr: bool,
    limit: usize,
    newlines: usize,
    follow: bool,
    /// Lines scrolled up from the tail while not following
    scroll_back: usize,
    total_bytes: u64,
}

impl Default for DisplayBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_SCROLLBACK_BYTES)
    }
}

impl DisplayBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            partial: Vec::new(),
            after_cr: false,
            limit: limit.max(1),
            newlines: 0,
            follow: true,
            scroll_back: 0,
            total_bytes: 0,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn line_count(&self) -> usize {
        self.newlines + 1
    }

    pub fn is_following(&self) -> bool {
        self.follow
    }

    /// Decode and append a chunk of received bytes
    pub fn append(&mut self, bytes: &[u8]) {
        self.total_bytes += bytes.len() as u64;
        self.partial.extend_from_slice(bytes);
        let lines_before = self.newlines;

        let mut start = 0;
        while start < self.partial.len() {
            match std::str::from_utf8(&self.partial[start..]) {
                Ok(s) => {
                    push_text(&mut self.text, &mut self.newlines, &mut self.after_cr, s);
                    start = self.partial.len();
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    let (good, _) = self.partial[start..].split_at(valid);
                    // valid_up_to guarantees this prefix is UTF-8
                    if let Ok(s) = std::str::from_utf8(good) {
                        push_text(&mut self.text, &mut self.newlines, &mut self.after_cr, s);
                    }
                    match e.error_len() {
                        Some(n) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            self.after_cr = false;
                            start += valid + n;
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more bytes
                            start += valid;
                            break;
                        }
                    }
                }
            }
        }
        self.partial.drain(..start);

        // Keep a scrolled-back view pinned to the same lines
        if !self.follow {
            self.scroll_back += self.newlines - lines_before;
        }
        self.trim();
    }

    /// Drop all text and any held partial character
    pub fn clear(&mut self) {
        self.text.clear();
        self.partial.clear();
        self.after_cr = false;
        self.newlines = 0;
        self.scroll_back = 0;
        self.follow = true;
    }

    pub fn scroll_up(&mut self, lines: usize) {
        let max = self.newlines;
        self.scroll_back = (self.scroll_back + lines).min(max);
        if self.scroll_back > 0 {
            self.follow = false;
        }
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_back = self.scroll_back.saturating_sub(lines);
        if self.scroll_back == 0 {
            self.follow = true;
        }
    }

    /// Jump to the newest data and keep following it
    pub fn follow_tail(&mut self) {
        self.scroll_back = 0;
        self.follow = true;
    }

    /// First line to show in a view `height` lines tall
    pub fn scroll_offset(&self, height: usize) -> usize {
        let tail_top = self.line_count().saturating_sub(height);
        if self.follow {
            tail_top
        } else {
            tail_top.saturating_sub(self.scroll_back)
        }
    }

    fn trim(&mut self) {
        if self.text.len() <= self.limit {
            return;
        }
        let mut cut = self.text.len() - self.limit;
        while !self.text.is_char_boundary(cut) {
            cut += 1;
        }
        let removed = self.text[..cut].matches('\n').count();
        self.text.drain(..cut);
        self.newlines -= removed;
        self.scroll_back = self.scroll_back.min(self.newlines);
    }
}

fn push_text(text: &mut String, newlines: &mut usize, after_cr: &mut bool, s: &str) {
    for c in s.chars() {
        let was_cr = std::mem::replace(after_cr, c == '\r');
        match c {
            '\n' if was_cr => {}
            '\r' | '\n' => {
                *newlines += 1;
                text.push('\n');
            }
            _ => text.push(c),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
