//! Data references inside expressions.
//!
//! Parsing produces one [`Reference`] per recognised access chain. Method
//! calls are kept as `called` segments by the parser and removed afterwards
//! by [`strip_method_calls`].

use std::fmt;

use super::lexer::Token;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// `$json.x`, `$input.item.json.x`: output of the immediate predecessor(s).
    Upstream,
    /// `$('Name').item.json.x`, `$node["Name"].json.x`: output of a named node.
    Named(String),
    /// `$binary.x`, `$input.item.binary.x`: attached binary data.
    Binary,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SegmentKey {
    Field(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    pub key: SegmentKey,
    /// Immediately followed by `(…)`.
    pub called: bool,
}

impl Segment {
    fn field(name: impl Into<String>) -> Self {
        Segment {
            key: SegmentKey::Field(name.into()),
            called: false,
        }
    }

    fn index(i: usize) -> Self {
        Segment {
            key: SegmentKey::Index(i),
            called: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub segments: Vec<Segment>,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ReferenceKind::Upstream => write!(f, "$json")?,
            ReferenceKind::Named(name) => write!(f, "$('{name}').item.json")?,
            ReferenceKind::Binary => write!(f, "$binary")?,
        }
        write!(f, "{}", render_path(&self.segments))
    }
}

/// `.a.b[0]["c d"]`
pub fn render_path(segments: &[Segment]) -> String {
    let mut out = String::new();
    for seg in segments {
        match &seg.key {
            SegmentKey::Field(name) if is_plain_ident(name) => {
                out.push('.');
                out.push_str(name);
            }
            SegmentKey::Field(name) => out.push_str(&format!("[\"{name}\"]")),
            SegmentKey::Index(i) => out.push_str(&format!("[{i}]")),
        }
    }
    out
}

fn is_plain_ident(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Recognise every reference chain in a token stream.
pub fn parse(tokens: &[Token]) -> Vec<Reference> {
    let mut refs = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let parsed = match &tokens[i] {
            Token::Dollar(name) => match name.as_str() {
                "json" => Some(chain(tokens, i + 1, ReferenceKind::Upstream)),
                "binary" => Some(chain(tokens, i + 1, ReferenceKind::Binary)),
                "input" => input_ref(tokens, i + 1),
                "node" => node_ref(tokens, i + 1),
                "" => call_ref(tokens, i + 1),
                _ => None,
            },
            _ => None,
        };

        match parsed {
            Some((reference, next)) => {
                refs.push(reference);
                i = next.max(i + 1);
            }
            None => i += 1,
        }
    }

    refs
}

/// Drop a trailing method-call segment: `$json.name.toUpperCase()` reads `name`.
pub fn strip_method_calls(mut reference: Reference) -> Reference {
    while reference.segments.last().is_some_and(|s| s.called) {
        reference.segments.pop();
    }
    reference
}

/// `$input.item.json…`, `$input.first().binary…`
fn input_ref(tokens: &[Token], pos: usize) -> Option<(Reference, usize)> {
    let pos = item_accessor(tokens, pos)?;
    payload(tokens, pos, ReferenceKind::Upstream)
}

/// `$('Name').item.json…`
fn call_ref(tokens: &[Token], pos: usize) -> Option<(Reference, usize)> {
    let (name, pos) = match (tokens.get(pos), tokens.get(pos + 1), tokens.get(pos + 2)) {
        (Some(Token::LParen), Some(Token::Str(name)), Some(Token::RParen)) => {
            (name.clone(), pos + 3)
        }
        _ => return None,
    };
    let pos = item_accessor(tokens, pos).unwrap_or(pos);
    payload(tokens, pos, ReferenceKind::Named(name))
}

/// `$node["Name"].json…`, `$node.Name.json…`
fn node_ref(tokens: &[Token], pos: usize) -> Option<(Reference, usize)> {
    let (name, pos) = match (tokens.get(pos), tokens.get(pos + 1), tokens.get(pos + 2)) {
        (Some(Token::LBracket), Some(Token::Str(name)), Some(Token::RBracket)) => {
            (name.clone(), pos + 3)
        }
        (Some(Token::Dot), Some(Token::Ident(name)), _) => (name.clone(), pos + 2),
        _ => return None,
    };
    payload(tokens, pos, ReferenceKind::Named(name))
}

/// `.json…` yields `kind`, `.binary…` yields a binary reference. A named
/// node's binary data is not tracked.
fn payload(tokens: &[Token], pos: usize, kind: ReferenceKind) -> Option<(Reference, usize)> {
    match (tokens.get(pos), tokens.get(pos + 1)) {
        (Some(Token::Dot | Token::OptionalDot), Some(Token::Ident(p))) if p == "json" => {
            Some(chain(tokens, pos + 2, kind))
        }
        (Some(Token::Dot | Token::OptionalDot), Some(Token::Ident(p)))
            if p == "binary" && kind == ReferenceKind::Upstream =>
        {
            Some(chain(tokens, pos + 2, ReferenceKind::Binary))
        }
        _ => None,
    }
}

/// `.item`, `.first()`, `.last()`, `.all()[n]`, `.itemMatching(n)`
fn item_accessor(tokens: &[Token], pos: usize) -> Option<usize> {
    let (Some(Token::Dot | Token::OptionalDot), Some(Token::Ident(name))) =
        (tokens.get(pos), tokens.get(pos + 1))
    else {
        return None;
    };
    let after = pos + 2;
    match name.as_str() {
        "item" => Some(after),
        "first" | "last" | "itemMatching" => skip_call(tokens, after),
        "all" => {
            let next = skip_call(tokens, after)?;
            match (tokens.get(next), tokens.get(next + 1), tokens.get(next + 2)) {
                (Some(Token::LBracket), Some(Token::Number(_)), Some(Token::RBracket)) => {
                    Some(next + 3)
                }
                _ => Some(next),
            }
        }
        _ => None,
    }
}

/// Skip a balanced `( … )` starting at `pos`.
fn skip_call(tokens: &[Token], pos: usize) -> Option<usize> {
    if tokens.get(pos) != Some(&Token::LParen) {
        return None;
    }
    let mut depth = 0usize;
    for (offset, token) in tokens[pos..].iter().enumerate() {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Some(pos + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Collect accessor segments until the chain ends. A call ends the chain and
/// marks its segment as `called`.
fn chain(tokens: &[Token], mut pos: usize, kind: ReferenceKind) -> (Reference, usize) {
    let mut segments = Vec::new();

    loop {
        match (tokens.get(pos), tokens.get(pos + 1), tokens.get(pos + 2)) {
            (Some(Token::Dot | Token::OptionalDot), Some(Token::Ident(name)), next) => {
                let mut seg = Segment::field(name.clone());
                pos += 2;
                if next == Some(&Token::LParen) {
                    seg.called = true;
                    segments.push(seg);
                    pos = skip_call(tokens, pos).unwrap_or(tokens.len());
                    break;
                }
                segments.push(seg);
            }
            (Some(Token::OptionalDot), Some(Token::LBracket), _) => pos += 1,
            (Some(Token::LBracket), Some(Token::Str(name)), Some(Token::RBracket)) => {
                segments.push(Segment::field(name.clone()));
                pos += 3;
            }
            (Some(Token::LBracket), Some(Token::Number(n)), Some(Token::RBracket)) => {
                match n.parse::<usize>() {
                    Ok(i) => segments.push(Segment::index(i)),
                    Err(_) => break,
                }
                pos += 3;
            }
            _ => break,
        }
    }

    (Reference { kind, segments }, pos)
}
