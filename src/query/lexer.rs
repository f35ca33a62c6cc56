//! Tokenizer for filter expressions.

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Star,
    Comma,
    Dot,
    LParen,
    RParen,
    Eq,
    NotEq,
    RegexMatch,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Eof,
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Ident(s) => format!("identifier '{s}'"),
            Self::Str(s) => format!("string {s:?}"),
            Self::Int(v) => format!("number {v}"),
            Self::Float(v) => format!("number {v}"),
            Self::Star => "'*'".to_string(),
            Self::Comma => "','".to_string(),
            Self::Dot => "'.'".to_string(),
            Self::LParen => "'('".to_string(),
            Self::RParen => "')'".to_string(),
            Self::Eq => "'='".to_string(),
            Self::NotEq => "'!='".to_string(),
            Self::RegexMatch => "'=~'".to_string(),
            Self::Lt => "'<'".to_string(),
            Self::LtEq => "'<='".to_string(),
            Self::Gt => "'>'".to_string(),
            Self::GtEq => "'>='".to_string(),
            Self::Eof => "end of input".to_string(),
        }
    }

    /// True if this is the keyword `kw`, compared case-insensitively.
    pub(crate) fn is_keyword(&self, kw: &str) -> bool {
        matches!(self, Self::Ident(s) if s.eq_ignore_ascii_case(kw))
    }
}

/// Words that cannot be used as identifiers.
const RESERVED: &[&str] = &[
    "SELECT", "FROM", "WHERE", "LIMIT", "AS", "AND", "OR", "NOT", "TRUE", "FALSE", "NULL",
];

/// True if `s` lexes as a single non-reserved identifier token.
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut bytes = s.bytes();
    let Some(first) = bytes.next() else {
        return false;
    };
    (first == b'_' || first.is_ascii_alphabetic())
        && bytes.all(|b| b == b'_' || b.is_ascii_alphanumeric())
        && !is_reserved(s)
}

pub(crate) fn is_reserved(s: &str) -> bool {
    RESERVED.iter().any(|kw| s.eq_ignore_ascii_case(kw))
}

/// A token and the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub pos: usize,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>, ParseError> {
    let bytes = input.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let token = match c {
            b'*' => {
                i += 1;
                Token::Star
            }
            b',' => {
                i += 1;
                Token::Comma
            }
            b'.' => {
                i += 1;
                Token::Dot
            }
            b'(' => {
                i += 1;
                Token::LParen
            }
            b')' => {
                i += 1;
                Token::RParen
            }
            b'=' => {
                if bytes.get(i + 1) == Some(&b'~') {
                    i += 2;
                    Token::RegexMatch
                } else {
                    i += 1;
                    Token::Eq
                }
            }
            b'!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    Token::NotEq
                } else {
                    return Err(ParseError::new(start, "expected '=' after '!'"));
                }
            }
            b'<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    Token::LtEq
                } else {
                    i += 1;
                    Token::Lt
                }
            }
            b'>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    Token::GtEq
                } else {
                    i += 1;
                    Token::Gt
                }
            }
            b'\'' | b'"' => {
                let (s, next) = lex_string(input, i)?;
                i = next;
                Token::Str(s)
            }
            b'0'..=b'9' | b'-' => {
                let (tok, next) = lex_number(input, i)?;
                i = next;
                tok
            }
            c if c == b'_' || c.is_ascii_alphabetic() => {
                while i < bytes.len() && (bytes[i] == b'_' || bytes[i].is_ascii_alphanumeric()) {
                    i += 1;
                }
                Token::Ident(input[start..i].to_string())
            }
            _ => {
                let ch = input[start..].chars().next().unwrap_or('?');
                return Err(ParseError::new(start, format!("unexpected character {ch:?}")));
            }
        };

        out.push(Spanned { token, pos: start });
    }

    out.push(Spanned {
        token: Token::Eof,
        pos: input.len(),
    });
    Ok(out)
}

fn lex_string(input: &str, start: usize) -> Result<(String, usize), ParseError> {
    let quote = input.as_bytes()[start] as char;
    let mut out = String::new();
    let mut chars = input[start + 1..].char_indices();

    while let Some((off, ch)) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, esc)) => out.push(esc),
                None => break,
            },
            c if c == quote => return Ok((out, start + 1 + off + c.len_utf8())),
            c => out.push(c),
        }
    }

    Err(ParseError::new(start, "unterminated string literal"))
}

fn lex_number(input: &str, start: usize) -> Result<(Token, usize), ParseError> {
    let bytes = input.as_bytes();
    let mut i = start;
    if bytes[i] == b'-' {
        i += 1;
    }
    let digits_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == digits_start {
        return Err(ParseError::new(start, "expected digits after '-'"));
    }

    let mut is_float = false;
    if i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1].is_ascii_digit() {
        is_float = true;
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }

    // Exponent, e.g. `1e300` or `2.5E-7`.
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_digits = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_digits {
            is_float = true;
            i = j;
        }
    }

    let text = &input[start..i];
    let token = if is_float {
        text.parse::<f64>()
            .map(Token::Float)
            .map_err(|e| ParseError::new(start, format!("invalid number '{text}': {e}")))?
    } else {
        text.parse::<i64>()
            .map(Token::Int)
            .map_err(|e| ParseError::new(start, format!("invalid number '{text}': {e}")))?
    };
    Ok((token, i))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn lexes_operators() {
        assert_eq!(
            tokens("= =~ != < <= > >="),
            vec![
                Token::Eq,
                Token::RegexMatch,
                Token::NotEq,
                Token::Lt,
                Token::LtEq,
                Token::Gt,
                Token::GtEq,
                Token::Eof
            ]
        );
    }

    #[test]
    fn lexes_strings_with_both_quotes_and_escapes() {
        assert_eq!(
            tokens(r#"'a\'b' "c""#),
            vec![Token::Str("a'b".into()), Token::Str("c".into()), Token::Eof]
        );
    }

    #[test]
    fn lexes_numbers() {
        assert_eq!(
            tokens("42 -7 3.5"),
            vec![Token::Int(42), Token::Int(-7), Token::Float(3.5), Token::Eof]
        );
    }

    #[test]
    fn lexes_exponent_floats() {
        assert_eq!(
            tokens("1e300 2.5E-7 -4e+2"),
            vec![Token::Float(1e300), Token::Float(2.5e-7), Token::Float(-400.0), Token::Eof]
        );
    }

    #[test]
    fn bare_e_after_number_is_an_identifier() {
        assert_eq!(
            tokens("1e"),
            vec![Token::Int(1), Token::Ident("e".into()), Token::Eof]
        );
    }

    #[test]
    fn identifier_check_rejects_reserved_and_punctuation() {
        assert!(is_identifier("artifact_name"));
        assert!(is_identifier("_x9"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("9x"));
        assert!(!is_identifier("a = 1 OR TRUE"));
        assert!(!is_identifier("where"));
        assert!(!is_identifier("Null"));
    }

    #[test]
    fn path_dots_are_separate_tokens() {
        assert_eq!(
            tokens("Flow.artifacts_with_results"),
            vec![
                Token::Ident("Flow".into()),
                Token::Dot,
                Token::Ident("artifacts_with_results".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn records_positions() {
        let spanned = tokenize("SELECT  *").unwrap();
        assert_eq!(spanned[0].pos, 0);
        assert_eq!(spanned[1].pos, 8);
        assert_eq!(spanned[2].pos, 9);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = tokenize("WHERE x = 'abc").unwrap_err();
        assert_eq!(err.position, 10);
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn stray_character_is_an_error() {
        let err = tokenize("SELECT # FROM").unwrap_err();
        assert_eq!(err.position, 7);
    }
}
