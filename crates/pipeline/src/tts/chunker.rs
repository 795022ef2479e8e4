//! Size-capped text splitting for synthesis requests

/// Split text into pieces of at most `max_chars` characters
///
/// Sentences are packed together while they fit. A sentence longer than the
/// cap is broken on word boundaries, and a single word longer than the cap is
/// hard-wrapped.
pub fn split_text_for_tts(text: &str, max_chars: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let max_chars = max_chars.max(1);

    let mut out = Vec::new();
    let mut buf = String::new();

    for sentence in split_sentences(text) {
        if char_len(sentence) > max_chars {
            flush(&mut buf, &mut out);
            split_words(sentence, max_chars, &mut out);
            continue;
        }

        if buf.is_empty() {
            buf.push_str(sentence);
        } else if char_len(&buf) + 1 + char_len(sentence) <= max_chars {
            buf.push(' ');
            buf.push_str(sentence);
        } else {
            flush(&mut buf, &mut out);
            buf.push_str(sentence);
        }
    }

    flush(&mut buf, &mut out);
    out
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn flush(buf: &mut String, out: &mut Vec<String>) {
    let piece = buf.trim();
    if !piece.is_empty() {
        out.push(piece.to_string());
    }
    buf.clear();
}

/// Sentences end at `.`, `!` or `?` followed by whitespace
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(next_i, next)) = chars.peek() {
                if next.is_whitespace() {
                    let sentence = text[start..next_i].trim();
                    if !sentence.is_empty() {
                        sentences.push(sentence);
                    }
                    start = next_i;
                }
            }
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

fn split_words(sentence: &str, max_chars: usize, out: &mut Vec<String>) {
    let mut buf = String::new();
    for word in sentence.split_whitespace() {
        let word_len = char_len(word);
        if word_len > max_chars {
            flush(&mut buf, out);
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                out.push(piece.iter().collect());
            }
            continue;
        }

        if buf.is_empty() {
            buf.push_str(word);
        } else if char_len(&buf) + 1 + word_len <= max_chars {
            buf.push(' ');
            buf.push_str(word);
        } else {
            flush(&mut buf, out);
            buf.push_str(word);
        }
    }
    flush(&mut buf, out);
}
