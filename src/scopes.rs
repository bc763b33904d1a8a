//! Scope-string tokenizer.
//!
//! Access tokens carry their scopes as one space-joined string, e.g.
//! `applied-permissions/user applied-permissions/groups:"test group 1"`.
//! Group names may contain spaces, in which case they are double-quoted.

/// Split a space-delimited scope string into tokens.
///
/// A space is a delimiter only when the number of `"` characters before it
/// is even. Quotes are not required to nest, so parity is enough.
/// Consecutive spaces are not collapsed; each produces an empty token.
pub fn split_scopes(scopes: &str) -> Vec<String> {
    if scopes.is_empty() {
        return Vec::new();
    }

    let mut tokens = Vec::new();
    let mut quotes = 0usize;
    let mut start = 0usize;

    for (i, c) in scopes.char_indices() {
        match c {
            '"' => quotes += 1,
            ' ' if quotes % 2 == 0 => {
                tokens.push(scopes[start..i].to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    tokens.push(scopes[start..].to_string());
    tokens
}

/// Join scope tokens with a single space, the inverse of [`split_scopes`].
pub fn join_scopes<S: AsRef<str>>(scopes: &[S]) -> String {
    scopes
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" ")
}
