// Token model operations: path lookup and assignment, merge, structural hash

use sha2::{Digest, Sha256};

use crate::error::EngineError;
use crate::path::{render_segments, Segment};
use crate::value::{Container, Kind, Token};

/// Resolve `path` inside `token`.
///
/// A missing final key yields `Null`; a missing intermediate key is
/// `FieldNotFound`. `Null` met along the way propagates as `Null`. A
/// wildcard segment maps the remainder of the path over an array.
pub fn get_field(token: &Token, path: &[Segment]) -> Result<Token, EngineError> {
    get_field_at(token, path, 0)
}

fn get_field_at(token: &Token, path: &[Segment], depth: usize) -> Result<Token, EngineError> {
    let Some((seg, rest)) = path.split_first() else {
        return Ok(token.clone());
    };
    if token.is_null() {
        return Ok(Token::Null);
    }

    match (seg, token) {
        (Segment::Key(key), Token::Container(map)) => match map.get(key) {
            Some(next) => get_field_at(next, rest, depth + 1),
            None if rest.is_empty() => Ok(Token::Null),
            None => Err(EngineError::FieldNotFound(render_segments(&path[..1]))),
        },
        (Segment::Index(i), Token::Array(arr)) => match arr.get(*i) {
            Some(next) => get_field_at(next, rest, depth + 1),
            None => Err(EngineError::IndexOutOfRange {
                index: *i,
                len: arr.len(),
            }),
        },
        (Segment::Wildcard, Token::Array(arr)) => {
            let mut out = Vec::with_capacity(arr.len());
            for item in arr.iter() {
                out.push(get_field_at(item, rest, depth + 1)?);
            }
            Ok(Token::array(out))
        }
        (seg, other) => Err(EngineError::mismatch(format!(
            "cannot apply {} to {} at depth {}",
            describe(seg),
            other.kind(),
            depth
        ))),
    }
}

fn describe(seg: &Segment) -> String {
    match seg {
        Segment::Key(k) => format!("key {:?}", k),
        Segment::Index(i) => format!("index [{}]", i),
        Segment::Wildcard => "wildcard [*]".to_string(),
    }
}

/// Return a mutable slot at `path`, creating containers and arrays on the
/// way. Indexing past the end of an array pads it with `Null`.
pub fn field_mut<'a>(token: &'a mut Token, path: &[Segment]) -> Result<&'a mut Token, EngineError> {
    let Some((seg, rest)) = path.split_first() else {
        return Ok(token);
    };

    match seg {
        Segment::Key(key) => {
            if token.is_null() {
                *token = Token::empty_container();
            }
            let kind = token.kind();
            let map = token.as_container_mut().ok_or_else(|| {
                EngineError::mismatch(format!("cannot write key {:?} into {}", key, kind))
            })?;
            let slot = map.entry(key.clone()).or_insert(Token::Null);
            field_mut(slot, rest)
        }
        Segment::Index(i) => {
            if token.is_null() {
                *token = Token::array(Vec::new());
            }
            let kind = token.kind();
            let arr = token.as_array_mut().ok_or_else(|| {
                EngineError::mismatch(format!("cannot write index [{}] into {}", i, kind))
            })?;
            if arr.len() <= *i {
                arr.resize(*i + 1, Token::Null);
            }
            field_mut(&mut arr[*i], rest)
        }
        Segment::Wildcard => Err(EngineError::invalid("cannot write through a wildcard path")),
    }
}

/// Merge `src` into `dst`.
///
/// Containers merge key by key, scalars are overwritten by `src`, arrays are
/// concatenated (`dst ++ src`) unless `overwrite_arrays` is set. A `Null`
/// source leaves `dst` untouched; a `Null` destination takes `src`.
pub fn merge(src: &Token, dst: &mut Token, overwrite_arrays: bool) -> Result<(), EngineError> {
    if src.is_null() {
        return Ok(());
    }
    if dst.is_null() {
        *dst = src.clone();
        return Ok(());
    }

    match (src, dst.kind()) {
        (Token::Container(src_map), Kind::Container) => {
            let Some(dst_map) = dst.as_container_mut() else {
                return Ok(());
            };
            for (key, value) in src_map.iter() {
                match dst_map.get_mut(key) {
                    Some(existing) => merge(value, existing, overwrite_arrays).map_err(|e| match e {
                        EngineError::TypeMismatch(msg) => {
                            EngineError::TypeMismatch(format!("{}: {}", key, msg))
                        }
                        other => other,
                    })?,
                    None => {
                        dst_map.insert(key.clone(), value.clone());
                    }
                }
            }
            Ok(())
        }
        (Token::Array(src_arr), Kind::Array) => {
            if overwrite_arrays {
                *dst = src.clone();
            } else if let Some(dst_arr) = dst.as_array_mut() {
                dst_arr.extend(src_arr.iter().cloned());
            }
            Ok(())
        }
        (s, d) if s.is_scalar() && d != Kind::Array && d != Kind::Container => {
            *dst = src.clone();
            Ok(())
        }
        (s, d) => Err(EngineError::mismatch(format!("cannot merge {} into {}", s.kind(), d))),
    }
}

/// Deep copy: the result shares no mutable substructure with `token`.
pub fn deep_copy(token: &Token) -> Token {
    match token {
        Token::Array(arr) => Token::array(arr.iter().map(deep_copy).collect()),
        Token::Container(map) => Token::container(
            map.iter()
                .map(|(k, v)| (k.clone(), deep_copy(v)))
                .collect::<Container>(),
        ),
        Token::String(s) => Token::string(s.as_ref()),
        other => other.clone(),
    }
}

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_NUMBER: u8 = 2;
const TAG_STRING: u8 = 3;
const TAG_ARRAY: u8 = 4;
const TAG_CONTAINER: u8 = 5;

/// Structural SHA-256 digest of a token.
///
/// Arrays digest the ordered concatenation of element digests. Containers
/// digest their `(key, value)` pairs sorted by key, unless
/// `order_sensitive_containers` is set, in which case insertion order is
/// kept. Not for security purposes.
pub fn hash(token: &Token, order_sensitive_containers: bool) -> Vec<u8> {
    let mut hasher = Sha256::new();
    match token {
        Token::Null => hasher.update([TAG_NULL]),
        Token::Bool(b) => hasher.update([TAG_BOOL, *b as u8]),
        Token::Number(n) => {
            let canonical = if *n == 0.0 { 0.0f64 } else { *n };
            hasher.update([TAG_NUMBER]);
            hasher.update(canonical.to_bits().to_be_bytes());
        }
        Token::String(s) => {
            hasher.update([TAG_STRING]);
            hasher.update(s.as_bytes());
        }
        Token::Array(arr) => {
            hasher.update([TAG_ARRAY]);
            for item in arr.iter() {
                hasher.update(hash(item, order_sensitive_containers));
            }
        }
        Token::Container(map) => {
            hasher.update([TAG_CONTAINER]);
            let mut entries: Vec<(&String, &Token)> = map.iter().collect();
            if !order_sensitive_containers {
                entries.sort_by(|a, b| a.0.cmp(b.0));
            }
            for (key, value) in entries {
                hasher.update(Sha256::digest(key.as_bytes()));
                hasher.update(hash(value, order_sensitive_containers));
            }
        }
    }
    hasher.finalize().to_vec()
}

/// Hex-encoded, container-order-insensitive [`hash`].
pub fn hash_hex(token: &Token) -> String {
    hex::encode(hash(token, false))
}

/// Depth-first flatten of nested arrays. Never returns an absent value.
pub fn flatten(arr: &[Token]) -> Vec<Token> {
    let mut result = Vec::new();
    for item in arr {
        if let Token::Array(inner) = item {
            result.extend(flatten(inner));
        } else {
            result.push(item.clone());
        }
    }
    result
}

/// `Null`, or an empty string, array or container.
pub fn is_nil(token: &Token) -> bool {
    match token {
        Token::Null => true,
        Token::String(s) => s.is_empty(),
        Token::Array(a) => a.is_empty(),
        Token::Container(c) => c.is_empty(),
        _ => false,
    }
}

/// Guard truthiness: nil values and `false` are falsy.
pub fn is_truthy(token: &Token) -> bool {
    match token {
        Token::Bool(b) => *b,
        other => !is_nil(other),
    }
}
