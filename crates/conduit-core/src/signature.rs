//! Dependency keys from a textual handler signature.
//!
//! Handlers normally declare their dependencies with
//! [`Endpoint::with_dependencies`](crate::Endpoint::with_dependencies). For
//! handlers described by a script-style parameter list, the keys can instead
//! be read from the third parameter when it is written as a destructured
//! object:
//!
//! ```
//! use conduit_core::keys_from_signature;
//!
//! assert_eq!(
//!     keys_from_signature("async (req, res, { db, cache = new Cache({ ttl: 60 }) }) => {}"),
//!     vec!["db", "cache"],
//! );
//! assert!(keys_from_signature("(req, res, deps)").is_empty());
//! ```
//!
//! The extraction is purely lexical. Commas inside nested braces, brackets,
//! parentheses and string literals never split parameters, default values are
//! skipped, and for renamed bindings (`{ user: account }`) the property name
//! is the key.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'s> {
    Ident(&'s str),
    Open,
    Close,
    Comma,
    Colon,
    Equals,
    Literal,
    Other,
}

fn tokenize(src: &str) -> Vec<Token<'_>> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let ch = bytes[i];
        match ch {
            b if b.is_ascii_whitespace() => i += 1,
            b'{' | b'[' | b'(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            b'}' | b']' | b')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            b',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            b':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            b'=' => {
                tokens.push(Token::Equals);
                i += 1;
            }
            b'"' | b'\'' | b'`' => {
                i = skip_string(bytes, i);
                tokens.push(Token::Literal);
            }
            b if b.is_ascii_digit() => {
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                tokens.push(Token::Literal);
            }
            b if is_ident_byte(b) => {
                let start = i;
                while i < bytes.len() && is_ident_byte(bytes[i]) {
                    i += 1;
                }
                tokens.push(Token::Ident(&src[start..i]));
            }
            _ => {
                // Skip the whole UTF-8 sequence so slicing stays on char boundaries.
                i += src[i..].chars().next().map_or(1, char::len_utf8);
                tokens.push(Token::Other);
            }
        }
    }

    tokens
}

const fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Returns the index just past the closing quote (or the end of input).
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Returns the text between the first `(` and its matching `)`.
///
/// Input without parentheses is treated as a bare parameter list.
fn parameter_list(src: &str) -> &str {
    let bytes = src.as_bytes();
    let Some(open) = bytes.iter().position(|&b| b == b'(') else {
        return src;
    };

    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' | b'`' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return &src[open + 1..i];
                }
            }
            _ => {}
        }
        i += 1;
    }
    &src[open + 1..]
}

/// Extracts dependency keys from the third parameter of a signature.
///
/// Returns an empty list when there is no third parameter or it is not a
/// destructured object pattern.
#[must_use]
pub fn keys_from_signature(signature: &str) -> Vec<String> {
    let tokens = tokenize(parameter_list(signature));

    let mut depth = 0usize;
    let mut arg_index = 0usize;
    let mut third = Vec::new();
    for token in tokens {
        match token {
            Token::Comma if depth == 0 => {
                arg_index += 1;
                continue;
            }
            Token::Open => depth += 1,
            Token::Close => depth = depth.saturating_sub(1),
            _ => {}
        }
        if arg_index == 2 {
            third.push(token);
        }
    }

    if third.first() != Some(&Token::Open) {
        return Vec::new();
    }

    let mut keys = Vec::new();
    let mut nested = 0usize;
    let mut expecting_key = true;
    for token in &third[1..] {
        match token {
            Token::Open => {
                nested += 1;
                expecting_key = false;
            }
            Token::Close if nested == 0 => break,
            Token::Close => nested -= 1,
            Token::Comma if nested == 0 => expecting_key = true,
            Token::Ident(name) if nested == 0 && expecting_key => {
                keys.push((*name).to_string());
                expecting_key = false;
            }
            Token::Colon | Token::Equals | Token::Literal | Token::Other | Token::Ident(_) => {
                if nested == 0 {
                    expecting_key = false;
                }
            }
            Token::Comma => {}
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_simple_destructuring() {
        assert_eq!(keys_from_signature("(req, res, { db, logger })"), vec!["db", "logger"]);
    }

    #[test]
    fn test_function_declaration() {
        assert_eq!(
            keys_from_signature("async function handler(req, res, { userRepo }) { return 1; }"),
            vec!["userRepo"]
        );
    }

    #[test]
    fn test_bare_parameter_list() {
        assert_eq!(keys_from_signature("req, res, { a, b }"), vec!["a", "b"]);
    }

    #[test]
    fn test_missing_or_plain_third_parameter() {
        assert!(keys_from_signature("(req, res)").is_empty());
        assert!(keys_from_signature("(req, res, deps)").is_empty());
        assert!(keys_from_signature("()").is_empty());
        assert!(keys_from_signature("").is_empty());
    }

    #[test]
    fn test_defaults_with_nested_commas() {
        let sig = "(req, res, { cache = new Cache({ ttl: 60, max: [1, 2] }), clock = now(a, b), db })";
        assert_eq!(keys_from_signature(sig), vec!["cache", "clock", "db"]);
    }

    #[test]
    fn test_string_literals_do_not_split() {
        let sig = r#"(req, res, { greeting = "a, b", other = 'c}' , mode })"#;
        assert_eq!(keys_from_signature(sig), vec!["greeting", "other", "mode"]);
    }

    #[test]
    fn test_renamed_and_nested_patterns() {
        let sig = "(req, res, { user: account, settings: { theme }, repo })";
        assert_eq!(keys_from_signature(sig), vec!["user", "settings", "repo"]);
    }

    #[test]
    fn test_rest_element_is_ignored() {
        assert_eq!(keys_from_signature("(req, res, { a, ...rest })"), vec!["a"]);
    }

    #[test]
    fn test_earlier_parameters_with_parens() {
        let sig = "(req = make(1, 2), res, { db })";
        assert_eq!(keys_from_signature(sig), vec!["db"]);
    }

    #[test]
    fn test_fourth_parameter_ignored() {
        assert_eq!(keys_from_signature("(req, res, { a }, { b })"), vec!["a"]);
    }

    #[test]
    fn test_unicode_does_not_panic() {
        assert_eq!(keys_from_signature("(req, res, { é, db })"), vec!["db"]);
    }

    proptest! {
        #[test]
        fn prop_declared_keys_are_extracted(keys in prop::collection::vec("[a-z][a-zA-Z0-9_]{0,8}", 1..6)) {
            let sig = format!("(req, res, {{ {} }})", keys.join(", "));
            prop_assert_eq!(keys_from_signature(&sig), keys);
        }

        #[test]
        fn prop_never_panics(input in ".{0,64}") {
            let _ = keys_from_signature(&input);
        }
    }
}
