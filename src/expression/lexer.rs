//! Tokenizer for the code inside `{{ … }}` expression segments.
//!
//! Only the tokens needed to recognise data references are distinguished;
//! everything else becomes `Other` and is skipped by the parser.

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `$json`, `$input`, `$binary`, `$node`, or a bare `$` (as in `$('Name')`).
    Dollar(String),
    Ident(String),
    Number(String),
    Str(String),
    Dot,
    OptionalDot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Other(char),
}

pub fn tokenize(src: &str) -> Vec<Token> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '$' => {
                let (name, next) = read_ident(&chars, i + 1);
                tokens.push(Token::Dollar(name));
                i = next;
            }
            c if is_ident_start(c) => {
                let (name, next) = read_ident(&chars, i);
                tokens.push(Token::Ident(name));
                i = next;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            '"' | '\'' | '`' => {
                let (text, next) = read_string(&chars, i + 1, c);
                tokens.push(Token::Str(text));
                i = next;
            }
            '?' if chars.get(i + 1) == Some(&'.') => {
                tokens.push(Token::OptionalDot);
                i += 2;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            other => {
                tokens.push(Token::Other(other));
                i += 1;
            }
        }
    }

    tokens
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn read_ident(chars: &[char], mut i: usize) -> (String, usize) {
    let start = i;
    while i < chars.len() && is_ident_char(chars[i]) {
        i += 1;
    }
    (chars[start..i].iter().collect(), i)
}

/// Read a quoted literal starting after the opening quote. An unterminated
/// literal runs to the end of input.
fn read_string(chars: &[char], mut i: usize, quote: char) -> (String, usize) {
    let mut text = String::new();
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                text.push(chars[i + 1]);
                i += 2;
            }
            c if c == quote => return (text, i + 1),
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    (text, i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dollar_forms() {
        assert_eq!(
            tokenize("$json.a"),
            vec![Token::Dollar("json".into()), Token::Dot, Token::Ident("a".into())]
        );
        assert_eq!(
            tokenize("$('My Node')"),
            vec![
                Token::Dollar(String::new()),
                Token::LParen,
                Token::Str("My Node".into()),
                Token::RParen
            ]
        );
    }

    #[test]
    fn optional_chaining_and_brackets() {
        assert_eq!(
            tokenize("$json?.a[0]['b c']"),
            vec![
                Token::Dollar("json".into()),
                Token::OptionalDot,
                Token::Ident("a".into()),
                Token::LBracket,
                Token::Number("0".into()),
                Token::RBracket,
                Token::LBracket,
                Token::Str("b c".into()),
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn escaped_quotes_and_operators() {
        let tokens = tokenize(r#""it\"s" + 1"#);
        assert_eq!(tokens[0], Token::Str("it\"s".into()));
        assert_eq!(tokens[1], Token::Other('+'));
        assert_eq!(tokens[2], Token::Number("1".into()));
    }
}
