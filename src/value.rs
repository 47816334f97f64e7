// Token: Arc-wrapped JSON-like value shared by the transpiler, evaluator and built-ins

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// Ordered key/value storage backing [`Token::Container`].
pub type Container = IndexMap<String, Token>;

/// A JSON-like value with O(1) clone semantics via Arc-wrapping.
///
/// Strings, arrays and containers are shared; mutation goes through
/// `Arc::make_mut`, so a write never leaks into another holder of the same
/// value. `Arc` (rather than `Rc`) keeps compiled constants `Send + Sync`.
#[derive(Clone, Debug, Default)]
pub enum Token {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Array(Arc<Vec<Token>>),
    Container(Arc<Container>),
}

/// Shape of a token, used for coercion errors and target shape tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Container,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Null => "null",
            Kind::Bool => "boolean",
            Kind::Number => "number",
            Kind::String => "string",
            Kind::Array => "array",
            Kind::Container => "container",
        };
        f.write_str(name)
    }
}

// ── Type checks ──────────────────────────────────────────────────────────────

impl Token {
    #[inline]
    pub fn kind(&self) -> Kind {
        match self {
            Token::Null => Kind::Null,
            Token::Bool(_) => Kind::Bool,
            Token::Number(_) => Kind::Number,
            Token::String(_) => Kind::String,
            Token::Array(_) => Kind::Array,
            Token::Container(_) => Kind::Container,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Token::Null)
    }

    #[inline]
    pub fn is_bool(&self) -> bool {
        matches!(self, Token::Bool(_))
    }

    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, Token::Number(_))
    }

    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, Token::String(_))
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, Token::Array(_))
    }

    #[inline]
    pub fn is_container(&self) -> bool {
        matches!(self, Token::Container(_))
    }

    /// Scalars are everything that is neither an array nor a container.
    #[inline]
    pub fn is_scalar(&self) -> bool {
        !self.is_array() && !self.is_container()
    }
}

// ── Extraction ───────────────────────────────────────────────────────────────

impl Token {
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Token::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Token::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Token::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_array(&self) -> Option<&Vec<Token>> {
        match self {
            Token::Array(arr) => Some(arr),
            _ => None,
        }
    }

    #[inline]
    pub fn as_container(&self) -> Option<&Container> {
        match self {
            Token::Container(map) => Some(map),
            _ => None,
        }
    }

    /// Get a mutable reference to the inner Vec, cloning if shared.
    #[inline]
    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Token>> {
        match self {
            Token::Array(arr) => Some(Arc::make_mut(arr)),
            _ => None,
        }
    }

    /// Get a mutable reference to the inner map, cloning if shared.
    #[inline]
    pub fn as_container_mut(&mut self) -> Option<&mut Container> {
        match self {
            Token::Container(map) => Some(Arc::make_mut(map)),
            _ => None,
        }
    }

    /// Index into a container by key.
    #[inline]
    pub fn get(&self, key: &str) -> Option<&Token> {
        match self {
            Token::Container(map) => map.get(key),
            _ => None,
        }
    }

    /// Index into an array by position.
    #[inline]
    pub fn get_index(&self, index: usize) -> Option<&Token> {
        match self {
            Token::Array(arr) => arr.get(index),
            _ => None,
        }
    }

    /// Plain rendering: strings without quotes, everything else as JSON.
    pub fn render(&self) -> String {
        match self {
            Token::String(s) => s.to_string(),
            other => other.to_string(),
        }
    }
}

// ── Constructors ─────────────────────────────────────────────────────────────

impl Token {
    #[inline]
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Token::String(s.into())
    }

    #[inline]
    pub fn array(v: Vec<Token>) -> Self {
        Token::Array(Arc::new(v))
    }

    #[inline]
    pub fn container(m: Container) -> Self {
        Token::Container(Arc::new(m))
    }

    #[inline]
    pub fn empty_container() -> Self {
        Token::Container(Arc::new(IndexMap::new()))
    }
}

// ── From impls ───────────────────────────────────────────────────────────────

impl From<bool> for Token {
    #[inline]
    fn from(b: bool) -> Self {
        Token::Bool(b)
    }
}

impl From<i64> for Token {
    #[inline]
    fn from(n: i64) -> Self {
        Token::Number(n as f64)
    }
}

impl From<i32> for Token {
    #[inline]
    fn from(n: i32) -> Self {
        Token::Number(n as f64)
    }
}

impl From<usize> for Token {
    #[inline]
    fn from(n: usize) -> Self {
        Token::Number(n as f64)
    }
}

impl From<f64> for Token {
    #[inline]
    fn from(n: f64) -> Self {
        Token::Number(n)
    }
}

impl From<&str> for Token {
    #[inline]
    fn from(s: &str) -> Self {
        Token::String(s.into())
    }
}

impl From<String> for Token {
    #[inline]
    fn from(s: String) -> Self {
        Token::String(s.into())
    }
}

impl From<Vec<Token>> for Token {
    #[inline]
    fn from(v: Vec<Token>) -> Self {
        Token::Array(Arc::new(v))
    }
}

impl From<Container> for Token {
    #[inline]
    fn from(m: Container) -> Self {
        Token::Container(Arc::new(m))
    }
}

// ── PartialEq ────────────────────────────────────────────────────────────────

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Token::Null, Token::Null) => true,
            (Token::Bool(a), Token::Bool(b)) => a == b,
            (Token::Number(a), Token::Number(b)) => a == b,
            (Token::String(a), Token::String(b)) => a == b,
            (Token::Array(a), Token::Array(b)) => a == b,
            // IndexMap equality ignores insertion order.
            (Token::Container(a), Token::Container(b)) => a == b,
            _ => false,
        }
    }
}

// ── Display ──────────────────────────────────────────────────────────────────

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Null => write!(f, "null"),
            Token::Bool(b) => write!(f, "{}", b),
            Token::Number(n) => format_number(*n, f),
            Token::String(s) => write!(f, "\"{}\"", escape_json_string(s)),
            Token::Array(arr) => {
                write!(f, "[")?;
                for (i, v) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Token::Container(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "\"{}\":{}", escape_json_string(k), v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn escape_json_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c < '\x20' => {
                result.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => result.push(c),
        }
    }
    result
}

/// `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive.
fn fits_i64(n: f64) -> bool {
    n >= i64::MIN as f64 && n < i64::MAX as f64
}

fn format_number(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if !n.is_finite() {
        // NaN and +/-Infinity have no JSON form
        write!(f, "null")
    } else if n.fract() == 0.0 && fits_i64(n) {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{}", n)
    }
}

// ── Serialization ────────────────────────────────────────────────────────────

impl Serialize for Token {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Token::Null => serializer.serialize_none(),
            Token::Bool(b) => serializer.serialize_bool(*b),
            Token::Number(n) => {
                if n.is_nan() || n.is_infinite() {
                    serializer.serialize_none()
                } else if n.fract() == 0.0 && fits_i64(*n) {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            Token::String(s) => serializer.serialize_str(s),
            Token::Array(arr) => {
                let mut seq = serializer.serialize_seq(Some(arr.len()))?;
                for v in arr.iter() {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            Token::Container(map) => {
                let mut m = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map.iter() {
                    m.serialize_entry(k, v)?;
                }
                m.end()
            }
        }
    }
}

// ── Deserialization (single-pass JSON→Token) ─────────────────────────────────

impl<'de> serde::Deserialize<'de> for Token {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(TokenVisitor)
    }
}

struct TokenVisitor;

impl<'de> Visitor<'de> for TokenVisitor {
    type Value = Token;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "any valid JSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Token, E> {
        Ok(Token::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Token, E> {
        Ok(Token::Number(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Token, E> {
        Ok(Token::Number(v as f64))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Token, E> {
        Ok(Token::Number(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Token, E> {
        Ok(Token::string(v))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Token, E> {
        Ok(Token::String(v.into()))
    }

    fn visit_none<E: de::Error>(self) -> Result<Token, E> {
        Ok(Token::Null)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Token, E> {
        Ok(Token::Null)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Token, A::Error> {
        let mut vec = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(elem) = seq.next_element()? {
            vec.push(elem);
        }
        Ok(Token::array(vec))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Token, A::Error> {
        let mut m = IndexMap::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((k, v)) = map.next_entry()? {
            m.insert(k, v);
        }
        Ok(Token::container(m))
    }
}

// ── JSON string I/O ──────────────────────────────────────────────────────────

impl Token {
    /// Serialize to a JSON string.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a JSON string into a Token without an intermediate `serde_json::Value`.
    pub fn from_json_str(s: &str) -> Result<Token, serde_json::Error> {
        serde_json::from_str(s)
    }
}

// ── Conversion from / to serde_json::Value ───────────────────────────────────

impl From<serde_json::Value> for Token {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Token::Null,
            serde_json::Value::Bool(b) => Token::Bool(b),
            serde_json::Value::Number(n) => Token::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Token::String(s.into()),
            serde_json::Value::Array(arr) => {
                Token::Array(Arc::new(arr.into_iter().map(Token::from).collect()))
            }
            serde_json::Value::Object(map) => {
                let m: Container = map.into_iter().map(|(k, v)| (k, Token::from(v))).collect();
                Token::Container(Arc::new(m))
            }
        }
    }
}

impl From<&Token> for serde_json::Value {
    fn from(v: &Token) -> Self {
        match v {
            Token::Null => serde_json::Value::Null,
            Token::Bool(b) => serde_json::Value::Bool(*b),
            Token::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Token::String(s) => serde_json::Value::String(s.to_string()),
            Token::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(serde_json::Value::from).collect())
            }
            Token::Container(map) => {
                let m: serde_json::Map<String, serde_json::Value> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
                    .collect();
                serde_json::Value::Object(m)
            }
        }
    }
}

// ── token! macro ─────────────────────────────────────────────────────────────

/// Macro for constructing Token literals, similar to `serde_json::json!`.
///
/// Usage:
///   token!(null)           → Token::Null
///   token!(true)           → Token::Bool(true)
///   token!(42)             → Token::Number(42.0)
///   token!("hello")        → Token::String(..)
///   token!([1, 2, 3])      → Token::Array(..)
///   token!({"k": v, ...})  → Token::Container(..)
///   token!(expr)           → Token::from(expr)
#[macro_export]
macro_rules! token {
    (null) => {
        $crate::value::Token::Null
    };

    (true) => {
        $crate::value::Token::Bool(true)
    };

    (false) => {
        $crate::value::Token::Bool(false)
    };

    ([ $($elem:tt),* $(,)? ]) => {
        $crate::value::Token::array(vec![ $( $crate::token!($elem) ),* ])
    };

    ({ $($key:tt : $val:tt),* $(,)? }) => {
        {
            #[allow(unused_mut)]
            let mut map = $crate::value::Container::new();
            $(
                map.insert(($key).to_string(), $crate::token!($val));
            )*
            $crate::value::Token::container(map)
        }
    };

    ($other:expr) => {
        $crate::value::Token::from($other)
    };
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_is_cheap() {
        let arr = Token::array(vec![Token::from(1i64), Token::from(2i64)]);
        let arr2 = arr.clone();
        if let (Token::Array(a), Token::Array(b)) = (&arr, &arr2) {
            assert!(Arc::ptr_eq(a, b));
        } else {
            panic!("expected arrays");
        }

        let obj = token!({"x": 1i64});
        let obj2 = obj.clone();
        if let (Token::Container(a), Token::Container(b)) = (&obj, &obj2) {
            assert!(Arc::ptr_eq(a, b));
        } else {
            panic!("expected containers");
        }
    }

    #[test]
    fn test_kinds() {
        assert_eq!(Token::Null.kind(), Kind::Null);
        assert_eq!(token!(true).kind(), Kind::Bool);
        assert_eq!(token!(1.5).kind(), Kind::Number);
        assert_eq!(token!("a").kind(), Kind::String);
        assert_eq!(token!([1i64]).kind(), Kind::Array);
        assert_eq!(token!({"a": 1i64}).kind(), Kind::Container);
        assert!(token!("a").is_scalar());
        assert!(!token!([]).is_scalar());
    }

    #[test]
    fn test_container_equality_ignores_order() {
        let a = token!({"a": 1i64, "b": 2i64});
        let b = token!({"b": 2i64, "a": 1i64});
        assert_eq!(a, b);
        assert_ne!(token!([1i64, 2i64]), token!([2i64, 1i64]));
    }

    #[test]
    fn test_serialization_keeps_insertion_order() {
        let v = token!({"z": 1i64, "a": [true, null], "m": "x"});
        assert_eq!(v.to_json_string().unwrap(), r#"{"z":1,"a":[true,null],"m":"x"}"#);
    }

    #[test]
    fn test_serde_roundtrip() {
        let v = token!({"name": "Alice", "scores": [1i64, 2.5, 3i64], "active": true});
        let parsed = Token::from_json_str(&v.to_json_string().unwrap()).unwrap();
        assert_eq!(v, parsed);
    }

    #[test]
    fn test_render() {
        assert_eq!(token!("plain").render(), "plain");
        assert_eq!(token!(3i64).render(), "3");
        assert_eq!(token!(2.5).render(), "2.5");
        assert_eq!(token!({"k": "v"}).render(), r#"{"k":"v"}"#);
    }

    #[test]
    fn test_large_integral_numbers_do_not_saturate() {
        assert_eq!(token!(1e19).render(), "10000000000000000000");
        assert_eq!(token!(-1e19).to_string(), "-10000000000000000000");
        assert_eq!(token!(9007199254740993i64).render(), "9007199254740992");

        let json = token!(1e19).to_json_string().unwrap();
        assert_eq!(json.parse::<f64>().unwrap(), 1e19);
        assert_ne!(json, "9223372036854775807");
    }

    #[test]
    fn test_make_mut_copies_on_write() {
        let mut arr = Token::array(vec![Token::from(1i64)]);
        let shared = arr.clone();
        arr.as_array_mut().unwrap().push(Token::from(2i64));
        assert_eq!(arr.as_array().unwrap().len(), 2);
        assert_eq!(shared.as_array().unwrap().len(), 1);
    }
}
