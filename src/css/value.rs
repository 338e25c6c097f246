//! Helpers for working inside declaration values
//!
//! Values are kept as text in the tree. These helpers find function calls
//! and split argument lists while respecting strings and nested brackets.
//! All indices are byte offsets that fall on ASCII characters.

/// A function call found in a value: `name(args)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionCall {
    /// Offset of the first character of the name
    pub start: usize,
    /// Offset just after `(`
    pub args_start: usize,
    /// Offset of the closing `)`
    pub args_end: usize,
}

impl FunctionCall {
    /// Offset just after the closing `)`
    pub fn end(&self) -> usize {
        self.args_end + 1
    }

    pub fn args<'a>(&self, value: &'a str) -> &'a str {
        &value[self.args_start..self.args_end]
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

/// Finds the next call to `name(...)` at or after `from`, case-insensitively
///
/// Returns `None` when there is no call or its parentheses never close.
pub fn find_function(value: &str, name: &str, from: usize) -> Option<FunctionCall> {
    let bytes = value.as_bytes();
    let needle = name.as_bytes();
    let mut i = from;
    let mut quote: Option<u8> = None;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        if b == b'"' || b == b'\'' {
            quote = Some(b);
            i += 1;
            continue;
        }

        let boundary = i == 0 || !is_ident_byte(bytes[i - 1]);
        let open = i + needle.len();
        if boundary
            && open < bytes.len()
            && bytes[open] == b'('
            && bytes[i..open].eq_ignore_ascii_case(needle)
        {
            let close = matching_paren(bytes, open)?;
            return Some(FunctionCall {
                start: i,
                args_start: open + 1,
                args_end: close,
            });
        }

        i += 1;
    }

    None
}

/// Offset of the `)` matching the `(` at `open`
fn matching_paren(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
        } else {
            match b {
                b'"' | b'\'' => quote = Some(b),
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }

    None
}

/// Splits on `sep` where it appears outside brackets and strings
pub fn split_top_level(value: &str, sep: char) -> Vec<&str> {
    split_with(value, |c| c == sep)
}

/// Splits on whitespace outside brackets and strings, dropping empty parts
pub fn split_whitespace_top_level(value: &str) -> Vec<&str> {
    split_with(value, char::is_whitespace)
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect()
}

fn split_with<F>(value: &str, is_sep: F) -> Vec<&str>
where
    F: Fn(char) -> bool,
{
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if let Some(q) = quote {
            if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 && is_sep(c) => {
                parts.push(&value[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts
}

/// Replaces every call to `name(...)` using `replace`, innermost text untouched
///
/// The callback receives the argument text and returns the replacement for
/// the whole call, or `Ok(None)` to leave that call as it is.
pub fn replace_functions<F, E>(value: &str, name: &str, mut replace: F) -> Result<String, E>
where
    F: FnMut(&str) -> Result<Option<String>, E>,
{
    let mut out = String::with_capacity(value.len());
    let mut cursor = 0;

    while let Some(call) = find_function(value, name, cursor) {
        out.push_str(&value[cursor..call.start]);
        match replace(call.args(value))? {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(&value[call.start..call.end()]),
        }
        cursor = call.end();
    }
    out.push_str(&value[cursor..]);

    Ok(out)
}
