//! Incremental text segmentation.

use atlas_foundation::SegmentConfig;

/// Splits buffered text into speakable segments.
///
/// Boundaries in decreasing priority: terminal sentence punctuation followed
/// by whitespace or end of buffer, then clause punctuation, then a hard
/// length cap with a preferred break at the last whitespace past a minimum
/// offset. Lossless: concatenating the returned segments and remainder
/// reproduces the input, so the remainder can be re-buffered and re-flushed
/// on the next call.
#[derive(Debug, Clone)]
pub struct SegmentSplitter {
    max_chars: usize,
    min_break_offset: usize,
}

impl SegmentSplitter {
    pub fn new(config: &SegmentConfig) -> Self {
        Self {
            max_chars: config.max_chars.max(1),
            min_break_offset: config.min_break_offset.min(config.max_chars),
        }
    }

    /// Extract every available segment; leftover text with no boundary comes
    /// back as the remainder.
    pub fn flush(&self, buffered: &str) -> (Vec<String>, String) {
        let mut segments = Vec::new();
        let mut rest = buffered;
        while let Some(end) = self.next_boundary(rest) {
            segments.push(rest[..end].to_string());
            rest = &rest[end..];
        }
        (segments, rest.to_string())
    }

    /// Byte offset one past the next boundary, or `None` when the text has
    /// no boundary yet.
    fn next_boundary(&self, text: &str) -> Option<usize> {
        let chars: Vec<(usize, char)> = text.char_indices().collect();
        if chars.is_empty() {
            return None;
        }

        // Sentence end wins regardless of earlier clause punctuation.
        for (i, (offset, c)) in chars.iter().enumerate() {
            if matches!(c, '.' | '!' | '?') {
                let followed = match chars.get(i + 1) {
                    Some((_, next)) => next.is_whitespace(),
                    None => true,
                };
                if followed {
                    return Some(offset + c.len_utf8());
                }
            }
        }

        for (offset, c) in &chars {
            if matches!(c, ';' | ',') {
                return Some(offset + c.len_utf8());
            }
        }

        if chars.len() >= self.max_chars {
            let window = &chars[..self.max_chars];
            // Prefer not to cut mid-word: break after the last whitespace
            // that is far enough in.
            let preferred = window
                .iter()
                .enumerate()
                .rev()
                .find(|(i, (_, c))| c.is_whitespace() && *i >= self.min_break_offset);
            let (offset, c) = match preferred {
                Some((_, pair)) => pair,
                None => &window[self.max_chars - 1],
            };
            return Some(offset + c.len_utf8());
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter() -> SegmentSplitter {
        SegmentSplitter::new(&SegmentConfig::default())
    }

    fn rejoin(segments: &[String], remainder: &str) -> String {
        let mut out: String = segments.concat();
        out.push_str(remainder);
        out
    }

    #[test]
    fn sentence_boundary_takes_priority_over_clause() {
        let (segments, remainder) = splitter().flush("Hello, world.");
        assert_eq!(segments, vec!["Hello, world."]);
        assert_eq!(remainder, "");
    }

    #[test]
    fn splits_each_sentence() {
        let (segments, remainder) = splitter().flush("One. Two! Three? Four");
        assert_eq!(segments, vec!["One.", " Two!", " Three?"]);
        assert_eq!(remainder, " Four");
    }

    #[test]
    fn clause_punctuation_when_no_sentence_end() {
        let (segments, remainder) = splitter().flush("first part; second part");
        assert_eq!(segments, vec!["first part;"]);
        assert_eq!(remainder, " second part");
    }

    #[test]
    fn period_inside_token_is_not_a_boundary() {
        let (segments, remainder) = splitter().flush("version 1.5 is out");
        assert!(segments.is_empty());
        assert_eq!(remainder, "version 1.5 is out");
    }

    #[test]
    fn long_text_breaks_at_last_whitespace_under_cap() {
        let word = "abcde ";
        let text: String = word.repeat(50); // 300 chars, no punctuation
        let (segments, remainder) = splitter().flush(&text);
        assert!(!segments.is_empty());
        for segment in &segments {
            assert!(segment.chars().count() <= 200);
            assert!(segment.ends_with(' '), "break should land on whitespace");
        }
        assert_eq!(rejoin(&segments, &remainder), text);
    }

    #[test]
    fn unbroken_text_is_hard_capped() {
        let text = "x".repeat(450);
        let (segments, remainder) = splitter().flush(&text);
        assert_eq!(segments, vec!["x".repeat(200), "x".repeat(200)]);
        assert_eq!(remainder, "x".repeat(50));
    }

    #[test]
    fn flush_is_lossless() {
        let inputs = [
            "",
            "no boundary here",
            "Tail whitespace. ",
            "Mixed: one, two; three. And four! Done? trailing",
            "Unicode 🙂 works. Ünïcödé, too.",
        ];
        let s = splitter();
        for input in inputs {
            let (segments, remainder) = s.flush(input);
            assert_eq!(rejoin(&segments, &remainder), input, "input: {input:?}");
        }
    }

    #[test]
    fn remainder_can_be_reflushed() {
        let s = splitter();
        let (segments, remainder) = s.flush("Partial sent");
        assert!(segments.is_empty());
        let (segments, remainder) = s.flush(&format!("{remainder}ence."));
        assert_eq!(segments, vec!["Partial sentence."]);
        assert_eq!(remainder, "");
    }
}
