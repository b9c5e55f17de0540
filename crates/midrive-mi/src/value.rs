//! MI value tree
//!
//! The structured part of every result and async record parses into a [`Value`]:
//!
//! - [`Value::Const`] - a quoted string, kept in its textual form
//! - [`Value::Tuple`] - `{name=value,...}`, names unique
//! - [`Value::List`] - `[value,...]` or `[name=value,...]`
//!
//! Numbers stay textual. Coercion is explicit through [`parse_addr`],
//! [`parse_uint`] and the `find_*` helpers of [`Lookup`].
//!
//! Lookups never fall back to defaults: a missing name is
//! [`ValueError::NotFound`], a name that resolves to the wrong kind of value
//! (or a lookup on a value that has no names) is [`ValueError::WrongShape`].

use std::fmt;
use thiserror::Error;

/// Failure to project a value out of a parsed tree
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("Field '{name}' not found")]
    NotFound { name: String },

    #[error("Field '{name}' has the wrong shape: expected {expected}, found {found}")]
    WrongShape {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid number '{text}': {reason}")]
    InvalidNumber { text: String, reason: &'static str },
}

impl ValueError {
    fn not_found(name: &str) -> Self {
        ValueError::NotFound {
            name: name.to_string(),
        }
    }

    fn wrong_shape(name: &str, expected: &'static str, found: &'static str) -> Self {
        ValueError::WrongShape {
            name: name.to_string(),
            expected,
            found,
        }
    }
}

/// A parsed MI value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Const(String),
    Tuple(Tuple),
    List(List),
}

/// Ordered `name=value` entries with unique names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tuple {
    entries: Vec<(String, Value)>,
}

/// An MI list
///
/// `Values` and `Results` stay distinct so `[frame={..},frame={..}]` can be
/// told apart from `[{..},{..}]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum List {
    /// `[value,value,...]`; `[]` parses as an empty `Values`
    Values(Vec<Value>),
    /// `[name=value,...]`, names may repeat
    Results(Vec<(String, Value)>),
}

impl Value {
    pub fn shape(&self) -> &'static str {
        match self {
            Value::Const(_) => "const",
            Value::Tuple(_) => "tuple",
            Value::List(List::Values(_)) => "value list",
            Value::List(List::Results(_)) => "result list",
        }
    }

    pub fn as_const(&self) -> Option<&str> {
        match self {
            Value::Const(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&Tuple> {
        match self {
            Value::Tuple(t) => Some(t),
            _ => None,
        }
    }

    /// The tuple this value is, or `WrongShape` naming it `name`
    pub fn require_tuple(&self, name: &str) -> Result<&Tuple, ValueError> {
        self.as_tuple()
            .ok_or_else(|| ValueError::wrong_shape(name, "tuple", self.shape()))
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Interpret this value as an unsigned number (`0x` hex or decimal)
    pub fn to_u32(&self) -> Result<u32, ValueError> {
        match self {
            Value::Const(s) => parse_uint(s),
            other => Err(ValueError::wrong_shape("<value>", "const", other.shape())),
        }
    }
}

impl Tuple {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tuple from parsed entries, collapsing repeated names.
    ///
    /// A name seen more than once becomes a `List::Results` of every
    /// `(name, value)` pair in arrival order, at the position of its first
    /// occurrence. That is the shape the same pairs have inside `[...]`.
    pub fn from_entries(entries: Vec<(String, Value)>) -> Self {
        let mut tuple = Tuple::new();
        let mut collapsed: Vec<String> = Vec::new();
        for (name, value) in entries {
            let Some(index) = tuple.entries.iter().position(|(n, _)| *n == name) else {
                tuple.entries.push((name, value));
                continue;
            };
            let existing = &mut tuple.entries[index].1;
            if !collapsed.contains(&name) {
                let first = std::mem::replace(existing, Value::List(List::Results(Vec::new())));
                if let Value::List(List::Results(pairs)) = existing {
                    pairs.push((name.clone(), first));
                }
                collapsed.push(name.clone());
            }
            if let Value::List(List::Results(pairs)) = existing {
                pairs.push((name, value));
            }
        }
        tuple
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Every value stored under `name`. A collapsed repeat yields each
    /// item; any other value, lists included, is yielded as itself.
    pub fn find_all(&self, name: &str) -> Vec<&Value> {
        match self.try_find(name) {
            Some(Value::List(list)) if list.is_repeat_of(name) => list.find_all(name),
            Some(v) => vec![v],
            None => Vec::new(),
        }
    }

    /// Copy of this tuple restricted to `required` (all must be present)
    /// plus whichever of `optional` are present
    pub fn subset(&self, required: &[&str], optional: &[&str]) -> Result<Tuple, ValueError> {
        let mut entries = Vec::with_capacity(required.len() + optional.len());
        for name in required {
            entries.push((name.to_string(), self.find(name)?.clone()));
        }
        for name in optional {
            if let Some(v) = self.try_find(name) {
                entries.push((name.to_string(), v.clone()));
            }
        }
        Ok(Tuple { entries })
    }
}

impl List {
    pub fn len(&self) -> usize {
        match self {
            List::Values(v) => v.len(),
            List::Results(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A result list whose entries all carry `name`, as produced by
    /// collapsing `name=..,name=..`
    fn is_repeat_of(&self, name: &str) -> bool {
        match self {
            List::Results(pairs) => pairs.len() > 1 && pairs.iter().all(|(n, _)| n == name),
            List::Values(_) => false,
        }
    }

    /// The items, ignoring names on a result list
    pub fn values(&self) -> Vec<&Value> {
        match self {
            List::Values(v) => v.iter().collect(),
            List::Results(r) => r.iter().map(|(_, v)| v).collect(),
        }
    }

    /// Every value named `name`. An empty `Values` list yields nothing;
    /// a non-empty `Values` list has no names and yields nothing.
    pub fn find_all(&self, name: &str) -> Vec<&Value> {
        match self {
            List::Values(_) => Vec::new(),
            List::Results(r) => r.iter().filter(|(n, _)| n == name).map(|(_, v)| v).collect(),
        }
    }

    /// Every item as a string constant
    pub fn as_strings(&self) -> Result<Vec<&str>, ValueError> {
        self.values()
            .into_iter()
            .map(|v| {
                v.as_const()
                    .ok_or_else(|| ValueError::wrong_shape("<item>", "const", v.shape()))
            })
            .collect()
    }
}

/// Named lookups over anything that holds `name=value` entries.
///
/// Implementors only say how to resolve one name; the typed helpers are shared.
pub trait Lookup {
    /// `Ok(None)` when the name is absent, `Err(WrongShape)` when this value
    /// cannot hold names at all
    fn lookup(&self, name: &str) -> Result<Option<&Value>, ValueError>;

    fn find(&self, name: &str) -> Result<&Value, ValueError> {
        self.lookup(name)?.ok_or_else(|| ValueError::not_found(name))
    }

    fn try_find(&self, name: &str) -> Option<&Value> {
        self.lookup(name).ok().flatten()
    }

    fn contains(&self, name: &str) -> bool {
        self.try_find(name).is_some()
    }

    /// The constant under `name`
    fn find_const(&self, name: &str) -> Result<&str, ValueError> {
        let v = self.find(name)?;
        v.as_const()
            .ok_or_else(|| ValueError::wrong_shape(name, "const", v.shape()))
    }

    fn find_str(&self, name: &str) -> Result<String, ValueError> {
        self.find_const(name).map(str::to_string)
    }

    fn try_find_str(&self, name: &str) -> Option<String> {
        self.try_find(name)
            .and_then(Value::as_const)
            .map(str::to_string)
    }

    fn find_tuple(&self, name: &str) -> Result<&Tuple, ValueError> {
        let v = self.find(name)?;
        v.as_tuple()
            .ok_or_else(|| ValueError::wrong_shape(name, "tuple", v.shape()))
    }

    fn find_list(&self, name: &str) -> Result<&List, ValueError> {
        let v = self.find(name)?;
        v.as_list()
            .ok_or_else(|| ValueError::wrong_shape(name, "list", v.shape()))
    }

    fn find_u32(&self, name: &str) -> Result<u32, ValueError> {
        parse_uint(self.find_const(name)?)
    }

    /// `None` when absent, not a constant, or not a valid u32
    fn try_find_u32(&self, name: &str) -> Option<u32> {
        self.try_find(name)
            .and_then(Value::as_const)
            .and_then(|s| parse_uint(s).ok())
    }

    fn find_i32(&self, name: &str) -> Result<i32, ValueError> {
        let text = self.find_const(name)?;
        text.trim().parse::<i32>().map_err(|_| ValueError::InvalidNumber {
            text: text.to_string(),
            reason: "not a signed 32-bit integer",
        })
    }

    fn find_addr(&self, name: &str) -> Result<u64, ValueError> {
        parse_addr(self.find_const(name)?)
    }

    fn try_find_addr(&self, name: &str) -> Option<u64> {
        self.try_find(name)
            .and_then(Value::as_const)
            .and_then(|s| parse_addr(s).ok())
    }
}

impl Lookup for Tuple {
    fn lookup(&self, name: &str) -> Result<Option<&Value>, ValueError> {
        Ok(self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v))
    }
}

impl Lookup for List {
    fn lookup(&self, name: &str) -> Result<Option<&Value>, ValueError> {
        match self {
            List::Results(r) => Ok(r.iter().find(|(n, _)| n == name).map(|(_, v)| v)),
            // `[]` is ambiguous; treat it as an empty result list
            List::Values(v) if v.is_empty() => Ok(None),
            List::Values(_) => Err(ValueError::wrong_shape(name, "tuple or result list", "value list")),
        }
    }
}

impl Lookup for Value {
    fn lookup(&self, name: &str) -> Result<Option<&Value>, ValueError> {
        match self {
            Value::Tuple(t) => t.lookup(name),
            Value::List(l) => l.lookup(name),
            Value::Const(_) => Err(ValueError::wrong_shape(name, "tuple or result list", "const")),
        }
    }
}

// ============================================================================
// Numeric coercion
// ============================================================================

/// Parse an address: `0x`-prefixed hex, otherwise decimal
pub fn parse_addr(text: &str) -> Result<u64, ValueError> {
    let trimmed = text.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse::<u64>(),
    };
    parsed.map_err(|_| ValueError::InvalidNumber {
        text: text.to_string(),
        reason: "not a 64-bit address",
    })
}

/// Parse an unsigned 32-bit value (`0x` hex or decimal), failing on overflow
pub fn parse_uint(text: &str) -> Result<u32, ValueError> {
    let wide = parse_addr(text).map_err(|_| ValueError::InvalidNumber {
        text: text.to_string(),
        reason: "not an unsigned integer",
    })?;
    u32::try_from(wide).map_err(|_| ValueError::InvalidNumber {
        text: text.to_string(),
        reason: "overflows u32",
    })
}

/// Split a leading `0x...` address off console text.
///
/// Returns the address and the remainder of the line after the hex digits.
pub fn span_next_addr(line: &str) -> Option<(u64, &str)> {
    let start = line.find("0x")?;
    let digits = &line[start + 2..];
    let len = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_hexdigit())
        .map(|(i, _)| i)
        .unwrap_or(digits.len());
    if len == 0 {
        return None;
    }
    let addr = u64::from_str_radix(&digits[..len], 16).ok()?;
    Some((addr, &digits[len..]))
}

// ============================================================================
// Rendering
// ============================================================================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Const(s) => write!(f, "\"{}\"", crate::parser::escape_c_string(s)),
            Value::Tuple(t) => write!(f, "{}", t),
            Value::List(l) => write!(f, "{}", l),
        }
    }
}

fn write_results(f: &mut fmt::Formatter<'_>, entries: &[(String, Value)]) -> fmt::Result {
    for (i, (name, value)) in entries.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{}={}", name, value)?;
    }
    Ok(())
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match value {
                // collapsed repeats go back out as repeats
                Value::List(list @ List::Results(pairs)) if list.is_repeat_of(name) => {
                    write_results(f, pairs)?
                }
                _ => write!(f, "{}={}", name, value)?,
            }
        }
        f.write_str("}")
    }
}

impl fmt::Display for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        match self {
            List::Values(items) => {
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", v)?;
                }
            }
            List::Results(entries) => write_results(f, entries)?,
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(s: &str) -> Value {
        Value::Const(s.to_string())
    }

    #[test]
    fn test_duplicate_names_collapse_into_list() {
        let tuple = Tuple::from_entries(vec![
            ("bkpt".to_string(), c("1")),
            ("thread".to_string(), c("3")),
            ("bkpt".to_string(), c("2")),
            ("bkpt".to_string(), c("3")),
        ]);
        assert_eq!(tuple.len(), 2);
        assert_eq!(tuple.names().collect::<Vec<_>>(), vec!["bkpt", "thread"]);
        assert_eq!(tuple.find("bkpt").unwrap().shape(), "result list");
        let all: Vec<_> = tuple.find_all("bkpt").into_iter().filter_map(Value::as_const).collect();
        assert_eq!(all, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_find_all_returns_a_real_list_whole() {
        let names = Value::List(List::Values(vec![c("a"), c("b")]));
        let tuple = Tuple::from_entries(vec![("names".to_string(), names.clone())]);
        assert_eq!(tuple.find_all("names"), vec![&names]);

        let nested = Value::List(List::Results(vec![("names".to_string(), c("a"))]));
        let tuple = Tuple::from_entries(vec![("names".to_string(), nested.clone())]);
        assert_eq!(tuple.find_all("names"), vec![&nested]);
    }

    #[test]
    fn test_collapsed_repeats_render_as_repeats() {
        let tuple = Tuple::from_entries(vec![
            ("frame".to_string(), c("0")),
            ("frame".to_string(), c("1")),
        ]);
        assert_eq!(tuple.to_string(), r#"{frame="0",frame="1"}"#);
    }

    #[test]
    fn test_not_found_vs_wrong_shape() {
        let tuple = Tuple::from_entries(vec![("addr".to_string(), c("0x10"))]);
        assert_eq!(
            tuple.find("line").unwrap_err(),
            ValueError::NotFound { name: "line".to_string() }
        );
        assert!(matches!(
            tuple.find_tuple("addr").unwrap_err(),
            ValueError::WrongShape { expected: "tuple", found: "const", .. }
        ));
        assert!(matches!(
            c("x").find("y").unwrap_err(),
            ValueError::WrongShape { .. }
        ));
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(parse_addr("0x7fff0010").unwrap(), 0x7fff_0010);
        assert_eq!(parse_addr("4096").unwrap(), 4096);
        assert_eq!(parse_uint("0xffffffff").unwrap(), u32::MAX);
        assert!(matches!(
            parse_uint("0x100000000"),
            Err(ValueError::InvalidNumber { reason: "overflows u32", .. })
        ));
        assert!(parse_addr("main+4").is_err());
    }

    #[test]
    fn test_try_find_u32_is_none_on_garbage() {
        let tuple = Tuple::from_entries(vec![
            ("id".to_string(), c("12")),
            ("level".to_string(), c("twelve")),
        ]);
        assert_eq!(tuple.try_find_u32("id"), Some(12));
        assert_eq!(tuple.try_find_u32("level"), None);
        assert_eq!(tuple.try_find_u32("missing"), None);
        assert!(tuple.find_u32("level").is_err());
    }

    #[test]
    fn test_subset() {
        let tuple = Tuple::from_entries(vec![
            ("level".to_string(), c("0")),
            ("addr".to_string(), c("0x1")),
            ("func".to_string(), c("main")),
        ]);
        let sub = tuple.subset(&["level", "func"], &["file"]).unwrap();
        assert_eq!(sub.len(), 2);
        assert!(tuple.subset(&["file"], &[]).is_err());
    }

    #[test]
    fn test_span_next_addr() {
        let (addr, rest) =
            span_next_addr("Line 12 of \"a.c\" starts at address 0x401136 <main+4> and ends").unwrap();
        assert_eq!(addr, 0x401136);
        assert_eq!(rest, " <main+4> and ends");
        assert!(span_next_addr("no address here").is_none());
    }

    #[test]
    fn test_display_renders_mi_text() {
        let tuple = Tuple::from_entries(vec![
            ("name".to_string(), c("a\"b")),
            (
                "children".to_string(),
                Value::List(List::Results(vec![("child".to_string(), c("1"))])),
            ),
        ]);
        assert_eq!(tuple.to_string(), r#"{name="a\"b",children=[child="1"]}"#);
    }

    #[test]
    fn test_empty_list_lookup() {
        let empty = List::Values(Vec::new());
        assert!(empty.find_all("frame").is_empty());
        assert_eq!(
            empty.find("frame").unwrap_err(),
            ValueError::NotFound { name: "frame".to_string() }
        );
    }
}
