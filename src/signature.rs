// Projector signatures: parameter kinds, arity checks and argument coercion

use std::fmt;

use crate::error::EngineError;
use crate::value::{Container, Token};

/// Declared kind of a projector parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Number,
    String,
    Boolean,
    Array,
    Container,
    Any,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamType::Number => "number",
            ParamType::String => "string",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Container => "container",
            ParamType::Any => "any",
        };
        f.write_str(name)
    }
}

/// Accepted argument count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{}", n),
            Arity::AtLeast(n) => write!(f, "at least {}", n),
        }
    }
}

/// Fixed parameters, optionally followed by one variadic parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub params: Vec<ParamType>,
    pub variadic: Option<ParamType>,
}

impl Signature {
    pub fn new(params: Vec<ParamType>, variadic: Option<ParamType>) -> Self {
        Signature { params, variadic }
    }

    pub fn arity(&self) -> Arity {
        match self.variadic {
            Some(_) => Arity::AtLeast(self.params.len()),
            None => Arity::Exact(self.params.len()),
        }
    }

    /// Exact match for fixed arity, `>=` fixed count when variadic.
    pub fn check_arity(&self, name: &str, actual: usize) -> Result<(), EngineError> {
        let ok = match self.arity() {
            Arity::Exact(n) => actual == n,
            Arity::AtLeast(n) => actual >= n,
        };
        if ok {
            Ok(())
        } else {
            Err(EngineError::ArityMismatch {
                name: name.to_string(),
                expected: self.arity(),
                actual,
            })
        }
    }
}

fn coercion_error(index: usize, expected: ParamType, found: &Token) -> EngineError {
    EngineError::mismatch(format!(
        "argument {} expected {}, got {}",
        index,
        expected,
        found.kind()
    ))
}

/// Coerce an argument token into a native parameter.
///
/// `Null` coerces to the kind's zero value.
pub trait FromToken: Sized {
    const KIND: ParamType;

    fn from_token(token: &Token, index: usize) -> Result<Self, EngineError>;
}

impl FromToken for f64 {
    const KIND: ParamType = ParamType::Number;

    fn from_token(token: &Token, index: usize) -> Result<Self, EngineError> {
        match token {
            Token::Number(n) => Ok(*n),
            Token::Null => Ok(0.0),
            other => Err(coercion_error(index, Self::KIND, other)),
        }
    }
}

impl FromToken for String {
    const KIND: ParamType = ParamType::String;

    fn from_token(token: &Token, index: usize) -> Result<Self, EngineError> {
        match token {
            Token::String(s) => Ok(s.to_string()),
            Token::Null => Ok(String::new()),
            other => Err(coercion_error(index, Self::KIND, other)),
        }
    }
}

impl FromToken for bool {
    const KIND: ParamType = ParamType::Boolean;

    fn from_token(token: &Token, index: usize) -> Result<Self, EngineError> {
        match token {
            Token::Bool(b) => Ok(*b),
            Token::Null => Ok(false),
            other => Err(coercion_error(index, Self::KIND, other)),
        }
    }
}

impl FromToken for Vec<Token> {
    const KIND: ParamType = ParamType::Array;

    fn from_token(token: &Token, index: usize) -> Result<Self, EngineError> {
        match token {
            Token::Array(arr) => Ok(arr.as_ref().clone()),
            Token::Null => Ok(Vec::new()),
            other => Err(coercion_error(index, Self::KIND, other)),
        }
    }
}

impl FromToken for Container {
    const KIND: ParamType = ParamType::Container;

    fn from_token(token: &Token, index: usize) -> Result<Self, EngineError> {
        match token {
            Token::Container(map) => Ok(map.as_ref().clone()),
            Token::Null => Ok(Container::new()),
            other => Err(coercion_error(index, Self::KIND, other)),
        }
    }
}

impl FromToken for Token {
    const KIND: ParamType = ParamType::Any;

    fn from_token(token: &Token, _index: usize) -> Result<Self, EngineError> {
        Ok(token.clone())
    }
}

/// Convert a native return value back into a token.
pub trait IntoToken {
    fn into_token(self) -> Token;
}

impl IntoToken for Token {
    fn into_token(self) -> Token {
        self
    }
}

impl IntoToken for f64 {
    fn into_token(self) -> Token {
        Token::Number(self)
    }
}

impl IntoToken for bool {
    fn into_token(self) -> Token {
        Token::Bool(self)
    }
}

impl IntoToken for String {
    fn into_token(self) -> Token {
        Token::from(self)
    }
}

impl IntoToken for Vec<Token> {
    fn into_token(self) -> Token {
        Token::array(self)
    }
}

impl IntoToken for Container {
    fn into_token(self) -> Token {
        Token::container(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token;

    #[test]
    fn test_fixed_arity() {
        let sig = Signature::new(vec![ParamType::Number, ParamType::Number], None);
        assert!(sig.check_arity("$Div", 2).is_ok());
        assert!(matches!(
            sig.check_arity("$Div", 1),
            Err(EngineError::ArityMismatch { actual: 1, .. })
        ));
        assert!(sig.check_arity("$Div", 3).is_err());
    }

    #[test]
    fn test_variadic_arity() {
        let sig = Signature::new(vec![ParamType::String], Some(ParamType::Any));
        assert_eq!(sig.arity(), Arity::AtLeast(1));
        assert!(sig.check_arity("$StrJoin", 1).is_ok());
        assert!(sig.check_arity("$StrJoin", 5).is_ok());
        assert!(sig.check_arity("$StrJoin", 0).is_err());
    }

    #[test]
    fn test_coercion() {
        assert_eq!(f64::from_token(&token!(2.5), 0).unwrap(), 2.5);
        assert_eq!(String::from_token(&Token::Null, 0).unwrap(), "");
        assert_eq!(Vec::<Token>::from_token(&token!([1i64]), 0).unwrap().len(), 1);

        let err = f64::from_token(&token!("x"), 1).unwrap_err();
        assert_eq!(
            err,
            EngineError::TypeMismatch("argument 1 expected number, got string".into())
        );
        assert!(bool::from_token(&token!(1i64), 0).is_err());
        assert!(Container::from_token(&token!([]), 0).is_err());
    }
}
