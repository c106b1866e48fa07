/// Formatter
///
/// Pure functions turning a token list into display "lines", either
/// sentence-segmented or speaker-grouped (§4.6), plus the memoized
/// `H:MM:SS` time formatter and the Simplified→Traditional post-conversion
/// applied once at the emission boundary (§4.7, §9).
use crate::domain::{AsrToken, Line};
use opencc_rust::{DefaultConfig, OpenCC};
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

const TIME_CACHE_CAP: usize = 3600;

fn time_cache() -> &'static Mutex<HashMap<i64, String>> {
    static CACHE: OnceLock<Mutex<HashMap<i64, String>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Formats `total_seconds` as `H:MM:SS`, memoizing up to 3600 distinct
/// values (R1).
pub fn format_time(total_seconds: i64) -> String {
    let cache = time_cache();
    if let Some(cached) = cache.lock().unwrap().get(&total_seconds) {
        return cached.clone();
    }
    let seconds = total_seconds.max(0);
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    let formatted = format!("{h}:{m:02}:{s:02}");
    let mut guard = cache.lock().unwrap();
    if guard.len() < TIME_CACHE_CAP {
        guard.insert(total_seconds, formatted.clone());
    }
    formatted
}

fn opencc() -> &'static OpenCC {
    static CONVERTER: OnceLock<OpenCC> = OnceLock::new();
    CONVERTER.get_or_init(|| OpenCC::new(DefaultConfig::S2HK).expect("opencc config loads"))
}

/// Simplified→Traditional (Hong Kong) conversion, applied only at the
/// emission boundary (§9 Design Notes).
pub fn to_traditional(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    opencc().convert(text)
}

/// Splits `text` on runs of `.`, `!`, `?`, dropping the punctuation, the way
/// `re.split(r'[.!?]+', text)` does in the source this crate supplements
/// (§4.6 fallback path).
fn split_on_sentence_punctuation(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            while matches!(chars.peek(), Some('.') | Some('!') | Some('?')) {
                chars.next();
            }
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        } else {
            current.push(c);
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}

fn mode_speaker(speakers: &[i32], fallback: i32) -> i32 {
    let valid: Vec<i32> = speakers.iter().copied().filter(|&s| s >= 0).collect();
    if valid.is_empty() {
        return fallback;
    }
    let mut counts: HashMap<i32, usize> = HashMap::new();
    for s in &valid {
        *counts.entry(*s).or_insert(0) += 1;
    }
    let mut best = valid[0];
    let mut best_count = 0;
    for (speaker, count) in counts {
        if count > best_count {
            best = speaker;
            best_count = count;
        }
    }
    best
}

/// Sentence mode (§4.6): greedily assigns tokens to successive sentences by
/// accumulated character count.
fn format_sentence_mode(tokens: &[AsrToken], sep: char, split_sentences: Option<Vec<String>>) -> Vec<Line> {
    let non_empty: Vec<&AsrToken> = tokens.iter().filter(|t| !t.text.is_empty()).collect();
    if non_empty.is_empty() {
        return Vec::new();
    }
    let joined = non_empty
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(&sep.to_string());
    let sentences = split_sentences.unwrap_or_else(|| split_on_sentence_punctuation(&joined));
    if sentences.is_empty() {
        return Vec::new();
    }

    let mut lines = Vec::new();
    let mut token_idx = 0;
    let mut last_diarized_end = 0.0_f64;

    for sentence in &sentences {
        let target_len = sentence.chars().count();
        if target_len == 0 {
            continue;
        }
        let start_idx = token_idx;
        let mut acc_len = 0usize;
        while token_idx < non_empty.len() && acc_len < target_len {
            acc_len += non_empty[token_idx].text.chars().count() + 1;
            token_idx += 1;
        }
        if token_idx == start_idx {
            continue;
        }
        let group = &non_empty[start_idx..token_idx];
        let speakers: Vec<i32> = group.iter().map(|t| t.speaker).collect();
        let speaker = mode_speaker(&speakers, group[0].speaker);
        let beg = group[0].start_sec;
        let end = group.last().unwrap().end_sec;
        lines.push(Line {
            speaker,
            text: sentence.clone(),
            beg: format_time(beg as i64),
            end: format_time(end as i64),
            diff: ((end - last_diarized_end) * 100.0).round() / 100.0,
        });
        last_diarized_end = end;
    }
    lines
}

/// Speaker mode (§4.6): groups consecutive tokens by speaker, applying the
/// inheritance and unattributed-surfacing rules.
fn format_speaker_mode(tokens: &[AsrToken], end_attributed_speaker_sec: f64) -> Vec<Line> {
    let mut lines: Vec<Line> = Vec::new();
    let mut current_speaker: Option<i32> = None;
    let mut current_text = String::new();
    let mut current_beg = 0.0_f64;
    let mut current_end = 0.0_f64;
    let mut last_diarized_end = 0.0_f64;
    let mut prior_speaker = 0;

    let mut flush = |lines: &mut Vec<Line>,
                      speaker: i32,
                      text: &str,
                      beg: f64,
                      end: f64,
                      last_diarized_end: &mut f64| {
        if text.is_empty() {
            return;
        }
        lines.push(Line {
            speaker,
            text: text.to_string(),
            beg: format_time(beg as i64),
            end: format_time(end as i64),
            diff: ((end - *last_diarized_end) * 100.0).round() / 100.0,
        });
        *last_diarized_end = end;
    };

    for token in tokens {
        if token.text.is_empty() {
            continue;
        }
        let effective_speaker = if token.speaker >= 0 {
            prior_speaker = token.speaker;
            token.speaker
        } else if token.end_sec < end_attributed_speaker_sec {
            prior_speaker
        } else {
            0
        };

        match current_speaker {
            Some(s) if s == effective_speaker => {
                current_text.push(' ');
                current_text.push_str(&token.text);
                current_end = token.end_sec;
            }
            _ => {
                if let Some(s) = current_speaker {
                    flush(&mut lines, s, &current_text, current_beg, current_end, &mut last_diarized_end);
                }
                current_speaker = Some(effective_speaker);
                current_text = token.text.clone();
                current_beg = token.start_sec;
                current_end = token.end_sec;
            }
        }
    }
    if let Some(s) = current_speaker {
        flush(&mut lines, s, &current_text, current_beg, current_end, &mut last_diarized_end);
    }
    lines
}

/// Recomputes the text of tokens that remain unattributed
/// (`end_sec >= end_attributed_speaker_sec`), the authoritative source for
/// `buffer_diarization` on every tick (§3 supplement).
pub fn unattributed_tail_text(tokens: &[AsrToken], end_attributed_speaker_sec: f64) -> String {
    let mut text = String::new();
    for token in tokens {
        if token.speaker < 0 && token.end_sec >= end_attributed_speaker_sec && !token.text.is_empty() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(&token.text);
        }
    }
    text
}

/// Entry point used by the emitter: selects sentence mode when a splitter
/// produced sentences, otherwise falls back to speaker mode.
pub fn format_lines(
    tokens: &[AsrToken],
    sep: char,
    end_attributed_speaker_sec: f64,
    split_sentences: Option<Vec<String>>,
    sentence_mode_available: bool,
) -> Vec<Line> {
    if sentence_mode_available {
        format_sentence_mode(tokens, sep, split_sentences)
    } else {
        format_speaker_mode(tokens, end_attributed_speaker_sec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_time_is_memoized_and_stable() {
        assert_eq!(format_time(3661), "1:01:01");
        assert_eq!(format_time(3661), "1:01:01");
        assert_eq!(format_time(59), "0:00:59");
    }

    #[test]
    fn speaker_mode_groups_consecutive_same_speaker_tokens() {
        let mut t1 = AsrToken::new(0.0, 0.5, "hello");
        t1.speaker = 0;
        let mut t2 = AsrToken::new(0.5, 1.0, "world");
        t2.speaker = 0;
        let lines = format_speaker_mode(&[t1, t2], 10.0);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "hello world");
        assert_eq!(lines[0].end, "0:00:01");
    }

    #[test]
    fn speaker_mode_starts_new_line_on_speaker_change() {
        let mut t1 = AsrToken::new(0.0, 0.5, "hello");
        t1.speaker = 0;
        let mut t2 = AsrToken::new(0.5, 1.0, "world");
        t2.speaker = 1;
        let lines = format_speaker_mode(&[t1, t2], 10.0);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].speaker, 1);
    }

    #[test]
    fn unattributed_tokens_past_watermark_default_to_speaker_zero() {
        let token = AsrToken::new(0.0, 5.0, "hi");
        let lines = format_speaker_mode(&[token], 1.0);
        assert_eq!(lines[0].speaker, 0);
    }

    #[test]
    fn sentence_mode_splits_on_punctuation_fallback() {
        let tokens = vec![
            AsrToken::new(0.0, 1.0, "hello"),
            AsrToken::new(1.0, 2.0, "world."),
            AsrToken::new(2.0, 3.0, "bye"),
        ];
        let lines = format_sentence_mode(&tokens, ' ', None);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "hello world");
        assert_eq!(lines[1].text, "bye");
    }

    #[test]
    fn unattributed_tail_text_collects_only_unwatermarked_tokens() {
        let mut attributed = AsrToken::new(0.0, 1.0, "done");
        attributed.speaker = 0;
        let pending = AsrToken::new(1.0, 2.0, "pending");
        let text = unattributed_tail_text(&[attributed, pending], 1.5);
        assert_eq!(text, "pending");
    }
}
