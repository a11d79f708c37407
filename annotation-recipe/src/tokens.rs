use common::{error::AppError, storage::types::annotation_task::{AnnotationTask, Token}};

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

// Apostrophes stay inside words ("baker's"), separators inside numbers ("3.5").
fn joins_word(prev: Option<char>, c: char, next: Option<char>) -> bool {
    match c {
        '\'' | '\u{2019}' => {
            prev.is_some_and(char::is_alphabetic) && next.is_some_and(char::is_alphabetic)
        }
        '.' | ',' => {
            prev.is_some_and(|p| p.is_ascii_digit()) && next.is_some_and(|n| n.is_ascii_digit())
        }
        _ => false,
    }
}

/// Splits `text` into word and punctuation tokens with character offsets.
///
/// Hyphens are tokens of their own, so "oat-cake" yields `oat`, `-`, `cake`.
pub fn tokenize(text: &str) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let at = |idx: usize| chars.get(idx).copied();

    let mut tokens = Vec::new();
    let mut pos = 0usize;
    while let Some(c) = at(pos) {
        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        let start = pos;
        pos += 1;
        if is_word_char(c) {
            while let Some(next) = at(pos) {
                let prev = pos.checked_sub(1).and_then(at);
                if is_word_char(next) || joins_word(prev, next, at(pos + 1)) {
                    pos += 1;
                } else {
                    break;
                }
            }
        }

        tokens.push(Token {
            text: chars.get(start..pos).unwrap_or_default().iter().collect(),
            start,
            end: pos,
            id: tokens.len(),
            ws: at(pos).is_some_and(char::is_whitespace),
        });
    }

    tokens
}

/// Fills in `tokens` for every record that does not carry them yet.
pub fn add_tokens<I>(stream: I) -> impl Iterator<Item = Result<AnnotationTask, AppError>>
where
    I: IntoIterator<Item = Result<AnnotationTask, AppError>>,
{
    stream.into_iter().map(|item| {
        let mut task = item?;
        if task.tokens.is_empty() {
            task.tokens = tokenize(&task.text);
        }
        Ok(task)
    })
}
