// src/protocol/decoder.rs - Incoming line framing and validation
//
// Chunks written by the host are split on line terminators; an unterminated
// tail is held until the next write completes it. Each complete line is then
// checked for a `*checksum` suffix and an `N<line>` prefix before the bare
// command text is handed on.

/// Ctrl-X, Marlin's emergency cancel byte.
pub const EMERGENCY_CANCEL: char = '\u{18}';

/// Outcome of decoding one complete line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A lone Ctrl-X: acknowledge and do nothing else.
    EmergencyCancel,
    /// Validated command text with line number, checksum and comments removed.
    Command(String),
    /// Line refused; the response lines ask the host to resend.
    Rejected(Vec<String>),
}

/// Running XOR of every character before `*`.
pub fn checksum(line: &str) -> u8 {
    line.bytes().fold(0u8, |acc, b| acc ^ b)
}

/// Remove `(...)` and `;...` comments.
pub fn strip_comments(line: &str) -> String {
    let without_semicolon = match line.find(';') {
        Some(idx) => &line[..idx],
        None => line,
    };
    let mut out = String::with_capacity(without_semicolon.len());
    let mut depth = 0usize;
    for c in without_semicolon.chars() {
        match c {
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

/// Parse a leading `N<digits>` token. Returns the number and the byte offset
/// where the command text starts.
fn parse_line_number(line: &str) -> Option<(u32, usize)> {
    let rest = line.strip_prefix('N')?;
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let after = &rest[digits..];
    if !after.is_empty() && !after.starts_with(char::is_whitespace) {
        return None;
    }
    let number = rest[..digits].parse().ok()?;
    Some((number, 1 + digits))
}

/// Byte-stream framer plus Marlin line-number bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct LineDecoder {
    pending: String,
    current_line: u32,
    expected_line: Option<u32>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split a raw chunk into complete, non-empty lines.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(chunk));
        let mut lines = Vec::new();
        while let Some(idx) = self.pending.find(['\n', '\r']) {
            let line: String = self.pending.drain(..=idx).collect();
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        // A cancel byte acts at once and drops whatever partial line precedes it
        if self.pending.ends_with(EMERGENCY_CANCEL) {
            self.pending.clear();
            lines.push(EMERGENCY_CANCEL.to_string());
        }
        lines
    }

    /// Validate one complete line.
    ///
    /// Rejected lines leave the expected line number untouched.
    pub fn decode(&mut self, raw: &str) -> Decoded {
        let raw = raw.trim();
        if raw.len() == 1 && raw.starts_with(EMERGENCY_CANCEL) {
            return Decoded::EmergencyCancel;
        }

        let (body, provided) = match raw.split_once('*') {
            Some((prefix, suffix)) => (prefix, suffix.trim().parse::<u32>().ok()),
            None => (raw, None),
        };
        let numbered = parse_line_number(body);

        if let Some(provided) = provided {
            let computed = checksum(body);
            if u32::from(computed) != provided {
                tracing::warn!(
                    "Checksum mismatch: got={} computed={} line={:?}",
                    provided,
                    computed,
                    raw
                );
                let mut lines = vec!["Error:checksum mismatch".to_string()];
                if let Some((number, _)) = numbered {
                    lines.push(format!("Resend:{}", number));
                }
                return Decoded::Rejected(lines);
            }
        }

        if let Some((number, _)) = numbered {
            let expected = *self.expected_line.get_or_insert(number);
            if number != expected {
                tracing::warn!("Line number {} out of sequence, expected {}", number, expected);
                return Decoded::Rejected(vec![
                    "Error:Line Number is not Last Line Number+1".to_string(),
                    format!("Resend:{}", expected),
                ]);
            }
        }

        let command = match numbered {
            Some((number, offset)) => {
                self.current_line = number;
                self.expected_line = Some(number.wrapping_add(1));
                &body[offset..]
            }
            None => body,
        };
        Decoded::Command(strip_comments(command))
    }

    /// `M110`: the given number is the last line; the next one must follow it.
    pub fn reset_line_number(&mut self, line: u32) {
        self.current_line = line;
        self.expected_line = Some(line.wrapping_add(1));
    }

    pub fn current_line(&self) -> u32 {
        self.current_line
    }

    pub fn expected_line(&self) -> Option<u32> {
        self.expected_line
    }

    /// Drop any partial input and forget line numbering.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.current_line = 0;
        self.expected_line = None;
    }
}
