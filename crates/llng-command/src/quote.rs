//! POSIX shell quoting.
//!
//! Every token is wrapped in single quotes. An embedded single quote is
//! written as `'\''`: close the quoted run, emit an escaped quote, reopen.
//! This holds for any content, including the empty string.

use crate::error::{CommandError, Result};

/// Quote one token for a POSIX shell.
#[must_use]
pub fn shell_quote(token: &str) -> String {
    let mut quoted = String::with_capacity(token.len() + 2);
    quoted.push('\'');
    for c in token.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

/// Quote every token and join them with single spaces.
#[must_use]
pub fn shell_join<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(|t| shell_quote(t.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a command line the way a POSIX shell would tokenize it.
///
/// Supports single quotes, double quotes (with `\"`, `\\`, `` \` `` and `\$`
/// escapes) and backslash escapes outside quotes. No expansion is performed.
///
/// # Errors
///
/// Returns an error on an unterminated quote or a trailing backslash.
pub fn shell_split(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(inner) => current.push(inner),
                        None => return Err(unterminated("single quote")),
                    }
                }
            }
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(esc @ ('"' | '\\' | '$' | '`')) => current.push(esc),
                            Some(other) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => return Err(unterminated("double quote")),
                        },
                        Some(inner) => current.push(inner),
                        None => return Err(unterminated("double quote")),
                    }
                }
            }
            '\\' => {
                in_token = true;
                match chars.next() {
                    Some(esc) => current.push(esc),
                    None => return Err(unterminated("escape")),
                }
            }
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                in_token = true;
                current.push(c);
            }
        }
    }

    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

fn unterminated(what: &str) -> CommandError {
    CommandError::validation("command line", format!("unterminated {what}"))
}
