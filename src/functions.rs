// Built-in projector library
// Pure functions over tokens, grouped by category and bound into a registry
// by `register_all`.

use crate::error::EngineError;
use crate::native;
use crate::registry::Registry;
use crate::value::{Container, Token};

/// Arithmetic over numbers, with float semantics throughout.
pub mod arithmetic {
    use super::*;

    /// $Div(l, r)
    pub fn div(l: f64, r: f64) -> Result<f64, EngineError> {
        Ok(l / r)
    }

    /// $Mod(l, r) - fails instead of returning NaN (e.g. for a zero divisor)
    pub fn modulo(l: f64, r: f64) -> Result<f64, EngineError> {
        let m = l % r;
        if m.is_nan() {
            return Err(EngineError::invalid(format!(
                "$Mod: {} mod {} is not a number",
                l, r
            )));
        }
        Ok(m)
    }

    /// $Mul(...) - the empty product is 0
    pub fn mul(operands: &[f64]) -> Result<f64, EngineError> {
        if operands.is_empty() {
            return Ok(0.0);
        }
        Ok(operands.iter().product())
    }

    /// $Sub(l, r)
    pub fn sub(l: f64, r: f64) -> Result<f64, EngineError> {
        Ok(l - r)
    }

    /// $Sum(...)
    pub fn sum(operands: &[f64]) -> Result<f64, EngineError> {
        Ok(operands.iter().sum())
    }
}

/// Array construction, selection and reshaping.
pub mod collections {
    use std::collections::BTreeMap;

    use super::*;
    use crate::path::PathSpec;
    use crate::utils::{self, get_field, hash_hex};

    fn key_path(key: &str) -> Result<Vec<crate::path::Segment>, EngineError> {
        PathSpec::parse(key)
            .map(|p| p.absolute())
            .map_err(|e| EngineError::invalid(format!("bad key {:?}: {}", key, e)))
    }

    /// $Flatten(array) - depth first; always an array
    pub fn flatten(array: &[Token]) -> Result<Vec<Token>, EngineError> {
        Ok(utils::flatten(array))
    }

    /// $ListCat(...)
    pub fn list_cat(arrays: Vec<Vec<Token>>) -> Result<Vec<Token>, EngineError> {
        Ok(arrays.into_iter().flatten().collect())
    }

    /// $ListLen(array)
    pub fn list_len(array: &[Token]) -> Result<f64, EngineError> {
        Ok(array.len() as f64)
    }

    /// $ListOf(...)
    pub fn list_of(items: Vec<Token>) -> Result<Vec<Token>, EngineError> {
        Ok(items)
    }

    /// Sort key for `$SortAndTakeTop`; a missing or null key renders as
    /// `<nil>`, ahead of letters and behind digits.
    fn sort_key(value: &Token) -> String {
        match value {
            Token::Null => "<nil>".to_string(),
            other => other.render(),
        }
    }

    /// $SortAndTakeTop(array, key, desc)
    ///
    /// Compares the rendered value at `key` lexicographically and returns the
    /// smallest (or largest with `desc`). Ties go to the earliest element.
    pub fn sort_and_take_top(array: &[Token], key: &str, desc: bool) -> Result<Token, EngineError> {
        let path = key_path(key)?;
        let mut best: Option<(String, &Token)> = None;
        for item in array {
            let rendered = sort_key(&get_field(item, &path)?);
            let better = match &best {
                None => true,
                Some((current, _)) if desc => rendered > *current,
                Some((current, _)) => rendered < *current,
            };
            if better {
                best = Some((rendered, item));
            }
        }
        Ok(best.map(|(_, item)| item.clone()).unwrap_or_default())
    }

    /// Dedup key for `$UnionBy`: the hex hashes of each key's value, joined
    /// with no delimiter.
    pub(crate) fn composite_key(item: &Token, keys: &[String]) -> Result<String, EngineError> {
        let mut composite = String::new();
        for key in keys {
            let value = get_field(item, &key_path(key)?)?;
            composite.push_str(&hash_hex(&value));
        }
        Ok(composite)
    }

    /// $UnionBy(array, keys...)
    ///
    /// Keeps the first item for each composite key; output is ordered by
    /// ascending composite key, so it does not depend on input order.
    pub fn union_by(items: &[Token], keys: &[String]) -> Result<Vec<Token>, EngineError> {
        let mut seen: BTreeMap<String, Token> = BTreeMap::new();
        for item in items {
            let key = composite_key(item, keys)?;
            seen.entry(key).or_insert_with(|| item.clone());
        }
        Ok(seen.into_values().collect())
    }

    /// $UnnestArrays(container)
    ///
    /// `{"a": [1, 2], "b": 3}` becomes
    /// `[{"k": "a", "v": 1}, {"k": "a", "v": 2}, {"k": "b", "v": 3}]`.
    pub fn unnest_arrays(container: &Container) -> Result<Vec<Token>, EngineError> {
        let mut keys: Vec<&String> = container.keys().collect();
        keys.sort();

        let entry = |k: &str, v: &Token| {
            let mut kv = Container::new();
            kv.insert("k".to_string(), Token::from(k));
            kv.insert("v".to_string(), v.clone());
            Token::container(kv)
        };

        let mut out = Vec::new();
        for key in keys {
            match &container[key.as_str()] {
                Token::Array(items) => out.extend(items.iter().map(|v| entry(key.as_str(), v))),
                other => out.push(entry(key.as_str(), other)),
            }
        }
        Ok(out)
    }
}

/// Hashing, nil checks, merging and other whole-token operations.
pub mod data {
    use super::*;
    use crate::utils::{self, deep_copy, hash_hex};

    /// $Hash(x) - hex SHA-256 structural hash, container key order ignored
    pub fn hash(token: &Token) -> Result<String, EngineError> {
        Ok(hash_hex(token))
    }

    /// $IsNil(x)
    pub fn is_nil(token: &Token) -> Result<bool, EngineError> {
        Ok(utils::is_nil(token))
    }

    /// $IsNotNil(x)
    pub fn is_not_nil(token: &Token) -> Result<bool, EngineError> {
        Ok(!utils::is_nil(token))
    }

    /// $MergeJSON(array, overwriteArrays) - merges left to right into a copy
    /// of the first element
    pub fn merge_json(array: &[Token], overwrite_arrays: bool) -> Result<Token, EngineError> {
        let mut out = Token::Null;
        for token in array {
            if out.is_null() {
                out = deep_copy(token);
                continue;
            }
            utils::merge(token, &mut out, overwrite_arrays)?;
        }
        Ok(out)
    }

    /// $UUID()
    pub fn uuid() -> Result<String, EngineError> {
        Ok(::uuid::Uuid::new_v4().to_string())
    }

    /// $DebugString(x)
    pub fn debug_string(token: &Token) -> Result<String, EngineError> {
        Ok(token.to_string())
    }
}

/// Boolean logic and comparisons.
pub mod logic {
    use std::collections::HashSet;

    use super::*;
    use crate::utils::hash_hex;

    /// $And(...) - false for no arguments
    pub fn and(args: &[bool]) -> Result<bool, EngineError> {
        Ok(!args.is_empty() && args.iter().all(|b| *b))
    }

    /// $Or(...)
    pub fn or(args: &[bool]) -> Result<bool, EngineError> {
        Ok(args.iter().any(|b| *b))
    }

    /// $Not(b)
    pub fn not(b: bool) -> Result<bool, EngineError> {
        Ok(!b)
    }

    /// $Eq(...) - all arguments structurally equal
    pub fn eq(args: &[Token]) -> Result<bool, EngineError> {
        match args.split_first() {
            Some((first, rest)) => Ok(rest.iter().all(|t| t == first)),
            None => Ok(true),
        }
    }

    /// $NEq(...) - all arguments pairwise distinct
    pub fn neq(args: &[Token]) -> Result<bool, EngineError> {
        let mut seen = HashSet::with_capacity(args.len());
        Ok(args.iter().all(|t| seen.insert(hash_hex(t))))
    }

    pub fn gt(l: f64, r: f64) -> Result<bool, EngineError> {
        Ok(l > r)
    }

    pub fn gt_eq(l: f64, r: f64) -> Result<bool, EngineError> {
        Ok(l >= r)
    }

    pub fn lt(l: f64, r: f64) -> Result<bool, EngineError> {
        Ok(l < r)
    }

    pub fn lt_eq(l: f64, r: f64) -> Result<bool, EngineError> {
        Ok(l <= r)
    }
}

/// String parsing, joining, splitting and formatting.
pub mod strings {
    use super::*;

    /// $ParseFloat(s)
    pub fn parse_float(s: &str) -> Result<f64, EngineError> {
        s.parse::<f64>()
            .map_err(|_| EngineError::invalid(format!("$ParseFloat: cannot parse {:?}", s)))
    }

    /// $ParseInt(s)
    pub fn parse_int(s: &str) -> Result<f64, EngineError> {
        s.parse::<i64>()
            .map(|i| i as f64)
            .map_err(|_| EngineError::invalid(format!("$ParseInt: cannot parse {:?}", s)))
    }

    /// $StrJoin(sep, ...) - null arguments are skipped
    pub fn join(sep: &str, args: &[Token]) -> Result<String, EngineError> {
        let parts: Vec<String> = args
            .iter()
            .filter(|t| !t.is_null())
            .map(Token::render)
            .collect();
        Ok(parts.join(sep))
    }

    /// $StrCat(...)
    pub fn cat(args: &[Token]) -> Result<String, EngineError> {
        join("", args)
    }

    /// $StrSplit(s, sep) - segments are trimmed, blank ones dropped
    pub fn split(s: &str, sep: &str) -> Result<Vec<Token>, EngineError> {
        Ok(s.split(sep)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(Token::from)
            .collect())
    }

    /// $ToLower(s)
    pub fn to_lower(s: &str) -> Result<String, EngineError> {
        Ok(s.to_lowercase())
    }

    /// $ToUpper(s)
    pub fn to_upper(s: &str) -> Result<String, EngineError> {
        Ok(s.to_uppercase())
    }

    /// $StrFmt(format, item)
    ///
    /// printf-style: `%[flags][width][.precision]verb` with flags `-+ #0`.
    /// Numbers under an integer verb (`b c d o q x X U`) are truncated to
    /// integers; under any other verb they render as floats. `%%` is a
    /// literal percent sign. A format may hold at most one directive.
    pub fn fmt(format: &str, item: &Token) -> Result<String, EngineError> {
        let mut out = String::with_capacity(format.len() + 8);
        let mut chars = format.chars().peekable();
        let mut used = false;

        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            if chars.peek() == Some(&'%') {
                chars.next();
                out.push('%');
                continue;
            }

            let mut spec = Directive::default();
            while let Some(&f) = chars.peek() {
                match f {
                    '-' => spec.minus = true,
                    '+' => spec.plus = true,
                    ' ' => spec.space = true,
                    '#' => spec.sharp = true,
                    '0' => spec.zero = true,
                    _ => break,
                }
                chars.next();
            }
            spec.width = read_number(&mut chars);
            if chars.peek() == Some(&'.') {
                chars.next();
                spec.precision = Some(read_number(&mut chars).unwrap_or(0));
            }
            let verb = chars
                .next()
                .ok_or_else(|| EngineError::invalid(format!("$StrFmt: {:?} ends mid-directive", format)))?;
            if used {
                return Err(EngineError::invalid(format!(
                    "$StrFmt: {:?} has more directives than arguments",
                    format
                )));
            }
            used = true;
            spec.verb = verb;
            out.push_str(&spec.render(item)?);
        }
        Ok(out)
    }

    fn read_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<usize> {
        let mut n: Option<usize> = None;
        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            n = Some(n.unwrap_or(0) * 10 + d as usize);
            chars.next();
        }
        n
    }

    const INTEGER_VERBS: &str = "bcdoqxXU";

    #[derive(Debug, Default)]
    struct Directive {
        minus: bool,
        plus: bool,
        space: bool,
        sharp: bool,
        zero: bool,
        width: Option<usize>,
        precision: Option<usize>,
        verb: char,
    }

    impl Directive {
        fn render(&self, item: &Token) -> Result<String, EngineError> {
            match item {
                Token::Number(n) if INTEGER_VERBS.contains(self.verb) => self.integer(n.trunc() as i64),
                Token::Number(n) => self.float(*n),
                other => self.text(other),
            }
        }

        fn unsupported(&self, item: &Token) -> EngineError {
            EngineError::invalid(format!(
                "$StrFmt: verb %{} does not apply to {}",
                self.verb,
                item.kind()
            ))
        }

        fn integer(&self, i: i64) -> Result<String, EngineError> {
            let magnitude = i.unsigned_abs();
            let (prefix, digits) = match self.verb {
                'd' => ("", magnitude.to_string()),
                'b' => (if self.sharp { "0b" } else { "" }, format!("{:b}", magnitude)),
                'o' => (if self.sharp { "0" } else { "" }, format!("{:o}", magnitude)),
                'x' => (if self.sharp { "0x" } else { "" }, format!("{:x}", magnitude)),
                'X' => (if self.sharp { "0X" } else { "" }, format!("{:X}", magnitude)),
                'c' | 'q' => {
                    let ch = u32::try_from(i)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| EngineError::invalid(format!("$StrFmt: {} is not a character", i)))?;
                    let body = if self.verb == 'c' {
                        ch.to_string()
                    } else {
                        format!("{:?}", ch)
                    };
                    return Ok(self.pad(body));
                }
                'U' => {
                    let code = u32::try_from(i)
                        .map_err(|_| EngineError::invalid(format!("$StrFmt: {} is not a code point", i)))?;
                    return Ok(self.pad(format!("U+{:04X}", code)));
                }
                _ => return Err(self.unsupported(&Token::Number(i as f64))),
            };
            let digits = match self.precision {
                Some(p) if digits.len() < p => format!("{}{}", "0".repeat(p - digits.len()), digits),
                _ => digits,
            };
            Ok(self.pad_number(i < 0, prefix, digits))
        }

        fn float(&self, n: f64) -> Result<String, EngineError> {
            if !n.is_finite() {
                return Ok(self.pad(format_non_finite(n)));
            }
            let body = match self.verb {
                'f' | 'F' => format!("{:.*}", self.precision.unwrap_or(6), n.abs()),
                'e' => exponent(n.abs(), self.precision.unwrap_or(6)),
                'E' => exponent(n.abs(), self.precision.unwrap_or(6)).to_uppercase(),
                'g' | 'v' | 's' | 't' => general(n.abs(), self.precision),
                'G' => general(n.abs(), self.precision).to_uppercase(),
                _ => return Err(self.unsupported(&Token::Number(n))),
            };
            Ok(self.pad_number(n.is_sign_negative() && n != 0.0, "", body))
        }

        fn text(&self, item: &Token) -> Result<String, EngineError> {
            let body = match (self.verb, item) {
                ('s' | 'v', other) => {
                    let rendered = other.render();
                    match self.precision {
                        Some(p) => rendered.chars().take(p).collect(),
                        None => rendered,
                    }
                }
                ('q', Token::String(s)) => format!("{:?}", s.as_ref()),
                ('q', other) => format!("{:?}", other.to_string()),
                ('t', Token::Bool(b)) => b.to_string(),
                ('x', Token::String(s)) => hex::encode(s.as_bytes()),
                ('X', Token::String(s)) => hex::encode_upper(s.as_bytes()),
                (_, other) => return Err(self.unsupported(other)),
            };
            Ok(self.pad(body))
        }

        fn pad_number(&self, negative: bool, prefix: &str, digits: String) -> String {
            let sign = if negative {
                "-"
            } else if self.plus {
                "+"
            } else if self.space {
                " "
            } else {
                ""
            };
            let head = format!("{}{}", sign, prefix);
            let len = head.chars().count() + digits.chars().count();
            match self.width {
                Some(w) if w > len && self.zero && !self.minus => {
                    format!("{}{}{}", head, "0".repeat(w - len), digits)
                }
                _ => self.pad(format!("{}{}", head, digits)),
            }
        }

        fn pad(&self, body: String) -> String {
            let len = body.chars().count();
            match self.width {
                Some(w) if w > len && self.minus => format!("{}{}", body, " ".repeat(w - len)),
                Some(w) if w > len => format!("{}{}", " ".repeat(w - len), body),
                _ => body,
            }
        }
    }

    fn format_non_finite(n: f64) -> String {
        if n.is_nan() {
            "NaN".to_string()
        } else if n > 0.0 {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    }

    /// `1.234500e+03` style: signed exponent with at least two digits.
    fn exponent(n: f64, precision: usize) -> String {
        let raw = format!("{:.*e}", precision, n);
        match raw.split_once('e') {
            Some((mantissa, exp)) => {
                let exp: i32 = exp.parse().unwrap_or(0);
                let sign = if exp < 0 { '-' } else { '+' };
                format!("{}e{}{:02}", mantissa, sign, exp.abs())
            }
            None => raw,
        }
    }

    /// Shortest representation, switching to exponent form for very large or
    /// very small magnitudes.
    fn general(n: f64, precision: Option<usize>) -> String {
        if n == 0.0 {
            return "0".to_string();
        }
        let exp = n.abs().log10().floor() as i32;
        match precision {
            None if !(-4..21).contains(&exp) => {
                let shortest = format!("{:e}", n);
                match shortest.split_once('e') {
                    Some((mantissa, e)) => {
                        let e: i32 = e.parse().unwrap_or(0);
                        let sign = if e < 0 { '-' } else { '+' };
                        format!("{}e{}{:02}", mantissa, sign, e.abs())
                    }
                    None => shortest,
                }
            }
            None => format!("{}", n),
            Some(p) => {
                let p = p.max(1);
                if exp < -4 || exp >= p as i32 {
                    trim_zeros_exp(&exponent(n, p - 1))
                } else {
                    let decimals = (p as i32 - 1 - exp).max(0) as usize;
                    trim_zeros(&format!("{:.*}", decimals, n))
                }
            }
        }
    }

    fn trim_zeros(s: &str) -> String {
        if s.contains('.') {
            s.trim_end_matches('0').trim_end_matches('.').to_string()
        } else {
            s.to_string()
        }
    }

    fn trim_zeros_exp(s: &str) -> String {
        match s.split_once('e') {
            Some((mantissa, exp)) => format!("{}e{}", trim_zeros(mantissa), exp),
            None => s.to_string(),
        }
    }
}

/// Bind every built-in except the time functions (see [`crate::datetime`]).
pub fn register_all(registry: &mut Registry) -> Result<(), EngineError> {
    let natives = [
        // arithmetic
        native!("$Div", (l: f64, r: f64) => arithmetic::div(l, r)),
        native!("$Mod", (l: f64, r: f64) => arithmetic::modulo(l, r)),
        native!("$Mul", (; operands: f64) => arithmetic::mul(&operands)),
        native!("$Sub", (l: f64, r: f64) => arithmetic::sub(l, r)),
        native!("$Sum", (; operands: f64) => arithmetic::sum(&operands)),
        // collections
        native!("$Flatten", (array: Vec<Token>) => collections::flatten(&array)),
        native!("$ListCat", (; arrays: Vec<Token>) => collections::list_cat(arrays)),
        native!("$ListLen", (array: Vec<Token>) => collections::list_len(&array)),
        native!("$ListOf", (; items: Token) => collections::list_of(items)),
        native!("$SortAndTakeTop", (array: Vec<Token>, key: String, desc: bool) =>
            collections::sort_and_take_top(&array, &key, desc)),
        native!("$UnionBy", (items: Vec<Token>; keys: String) =>
            collections::union_by(&items, &keys)),
        native!("$UnnestArrays", (container: Container) =>
            collections::unnest_arrays(&container)),
        // data
        native!("$Hash", (token: Token) => data::hash(&token)),
        native!("$IsNil", (token: Token) => data::is_nil(&token)),
        native!("$IsNotNil", (token: Token) => data::is_not_nil(&token)),
        native!("$MergeJSON", (array: Vec<Token>, overwrite_arrays: bool) =>
            data::merge_json(&array, overwrite_arrays)),
        native!("$UUID", () => data::uuid()),
        native!("$DebugString", (token: Token) => data::debug_string(&token)),
        native!("$Void", (; _ignored: Token) => Ok::<Token, EngineError>(Token::Null)),
        // logic
        native!("$And", (; args: bool) => logic::and(&args)),
        native!("$Eq", (; args: Token) => logic::eq(&args)),
        native!("$Gt", (l: f64, r: f64) => logic::gt(l, r)),
        native!("$GtEq", (l: f64, r: f64) => logic::gt_eq(l, r)),
        native!("$Lt", (l: f64, r: f64) => logic::lt(l, r)),
        native!("$LtEq", (l: f64, r: f64) => logic::lt_eq(l, r)),
        native!("$NEq", (; args: Token) => logic::neq(&args)),
        native!("$Not", (b: bool) => logic::not(b)),
        native!("$Or", (; args: bool) => logic::or(&args)),
        // strings
        native!("$ParseFloat", (s: String) => strings::parse_float(&s)),
        native!("$ParseInt", (s: String) => strings::parse_int(&s)),
        native!("$StrCat", (; args: Token) => strings::cat(&args)),
        native!("$StrFmt", (format: String, item: Token) => strings::fmt(&format, &item)),
        native!("$StrJoin", (sep: String; args: Token) => strings::join(&sep, &args)),
        native!("$StrSplit", (s: String, sep: String) => strings::split(&s, &sep)),
        native!("$ToLower", (s: String) => strings::to_lower(&s)),
        native!("$ToUpper", (s: String) => strings::to_upper(&s)),
    ];
    for projector in natives {
        registry.register_native(projector)?;
    }
    Ok(())
}
