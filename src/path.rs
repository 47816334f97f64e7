// Path grammar for read locations and write targets
//
//   root(.key | [n] | [*] | [])*
//
// A trailing `[]` or `[*]` is the iteration/append marker and a trailing
// `[n]` addresses one element; both live in `PathSpec::index`. Everything
// between the root and the trailing marker is the field path.

use std::fmt;

use thiserror::Error;

/// Path parse errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathError {
    #[error("empty path segment")]
    EmptySegment,

    #[error("unterminated bracket")]
    UnterminatedBracket,

    #[error("unterminated quoted key")]
    UnterminatedQuote,

    #[error("invalid index: {0}")]
    InvalidIndex(String),

    #[error("append marker [] is only allowed at the end of a path")]
    MidPathAppend,

    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
}

/// One step of a field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
    /// `[*]` in the middle of a path: project the rest over every element.
    Wildcard,
}

/// The trailing marker of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexSpec {
    #[default]
    None,
    At(usize),
    /// `[]` / `[*]`: iterate when reading, append when writing.
    Wildcard,
}

/// A parsed read location or write target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PathSpec {
    /// Variable, parameter, `$root` or field name; empty for the whole value.
    pub root: String,
    pub field: Vec<Segment>,
    pub index: IndexSpec,
    /// Resolve against the output under construction instead of the input.
    pub dest: bool,
}

enum Raw {
    Key(String),
    Index(usize),
    Wildcard,
    Append,
}

impl PathSpec {
    /// The whole-value path (`$this` / `.`).
    pub fn whole() -> Self {
        PathSpec::default()
    }

    pub fn parse(text: &str) -> Result<PathSpec, PathError> {
        let text = text.trim();
        if text.is_empty() || text == "." {
            return Ok(PathSpec::whole());
        }

        let chars: Vec<char> = text.chars().collect();
        let mut pos = 0;
        let root = read_key(&chars, &mut pos)?;
        let mut raw = Vec::new();

        while pos < chars.len() {
            match chars[pos] {
                '.' => {
                    pos += 1;
                    raw.push(Raw::Key(read_key(&chars, &mut pos)?));
                }
                '[' => {
                    pos += 1;
                    let start = pos;
                    while pos < chars.len() && chars[pos] != ']' {
                        pos += 1;
                    }
                    if pos >= chars.len() {
                        return Err(PathError::UnterminatedBracket);
                    }
                    let inner: String = chars[start..pos].iter().collect();
                    pos += 1;
                    raw.push(match inner.trim() {
                        "" => Raw::Append,
                        "*" => Raw::Wildcard,
                        digits => Raw::Index(
                            digits
                                .parse::<usize>()
                                .map_err(|_| PathError::InvalidIndex(digits.to_string()))?,
                        ),
                    });
                }
                c => return Err(PathError::UnexpectedChar(c)),
            }
        }

        let index = match raw.last() {
            Some(Raw::Append) | Some(Raw::Wildcard) => {
                raw.pop();
                IndexSpec::Wildcard
            }
            Some(Raw::Index(n)) => {
                let n = *n;
                raw.pop();
                IndexSpec::At(n)
            }
            _ => IndexSpec::None,
        };

        let mut field = Vec::with_capacity(raw.len());
        for r in raw {
            field.push(match r {
                Raw::Key(k) => Segment::Key(k),
                Raw::Index(n) => Segment::Index(n),
                Raw::Wildcard => Segment::Wildcard,
                Raw::Append => return Err(PathError::MidPathAppend),
            });
        }

        Ok(PathSpec {
            root,
            field,
            index,
            dest: false,
        })
    }

    pub fn with_dest(mut self, dest: bool) -> Self {
        self.dest = dest;
        self
    }

    pub fn is_whole(&self) -> bool {
        self.root.is_empty() && self.field.is_empty() && self.index == IndexSpec::None
    }

    pub fn iterates(&self) -> bool {
        self.index == IndexSpec::Wildcard
    }

    /// Field path below the root, with a trailing `[n]` folded in.
    pub fn relative(&self) -> Vec<Segment> {
        let mut segs = self.field.clone();
        if let IndexSpec::At(n) = self.index {
            segs.push(Segment::Index(n));
        }
        segs
    }

    /// Full path including the root as the first key.
    pub fn absolute(&self) -> Vec<Segment> {
        let mut segs = Vec::with_capacity(self.field.len() + 2);
        if !self.root.is_empty() {
            segs.push(Segment::Key(self.root.clone()));
        }
        segs.extend(self.relative());
        segs
    }

    /// Textual form without the trailing iteration/append marker.
    pub fn target_key(&self) -> String {
        let mut plain = self.clone();
        if plain.index == IndexSpec::Wildcard {
            plain.index = IndexSpec::None;
        }
        plain.dest = false;
        plain.to_string()
    }
}

fn read_key(chars: &[char], pos: &mut usize) -> Result<String, PathError> {
    if *pos < chars.len() && chars[*pos] == '\'' {
        *pos += 1;
        let start = *pos;
        while *pos < chars.len() && chars[*pos] != '\'' {
            *pos += 1;
        }
        if *pos >= chars.len() {
            return Err(PathError::UnterminatedQuote);
        }
        let key: String = chars[start..*pos].iter().collect();
        *pos += 1;
        return Ok(key);
    }

    let start = *pos;
    while *pos < chars.len() && chars[*pos] != '.' && chars[*pos] != '[' {
        if chars[*pos].is_whitespace() {
            return Err(PathError::UnexpectedChar(chars[*pos]));
        }
        *pos += 1;
    }
    if start == *pos {
        return Err(PathError::EmptySegment);
    }
    Ok(chars[start..*pos].iter().collect())
}

fn write_key(f: &mut fmt::Formatter<'_>, key: &str) -> fmt::Result {
    if key.contains(&['.', '[', ']', ' '][..]) {
        write!(f, "'{}'", key)
    } else {
        f.write_str(key)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => {
                f.write_str(".")?;
                write_key(f, k)
            }
            Segment::Index(n) => write!(f, "[{}]", n),
            Segment::Wildcard => f.write_str("[*]"),
        }
    }
}

impl fmt::Display for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dest {
            f.write_str("dest ")?;
        }
        if self.root.is_empty() {
            f.write_str("$this")?;
        } else {
            write_key(f, &self.root)?;
        }
        for seg in &self.field {
            write!(f, "{}", seg)?;
        }
        match self.index {
            IndexSpec::None => Ok(()),
            IndexSpec::At(n) => write!(f, "[{}]", n),
            IndexSpec::Wildcard => f.write_str("[]"),
        }
    }
}

/// Render a bare segment list, e.g. for error messages.
pub fn render_segments(segments: &[Segment]) -> String {
    let mut out = String::new();
    for seg in segments {
        match seg {
            Segment::Key(k) if out.is_empty() => out.push_str(k),
            other => out.push_str(&other.to_string()),
        }
    }
    out
}
