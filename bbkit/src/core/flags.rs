//! Ordered task flags passed to the wrapped executable.

use std::fmt;

/// A flag value: a single token group or a (possibly nested) list.
#[derive(Debug, Clone, PartialEq)]
pub enum FlagValue {
    Scalar(String),
    List(Vec<FlagValue>),
}

impl FlagValue {
    pub fn scalar(value: impl Into<String>) -> Self {
        Self::Scalar(value.into())
    }

    pub fn list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(values.into_iter().map(|v| Self::Scalar(v.into())).collect())
    }

    /// Flatten nested lists into their scalar values, in order.
    pub fn flatten(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Scalar(value) => out.push(value.as_str()),
            Self::List(values) => {
                for value in values {
                    value.flatten_into(out);
                }
            }
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.flatten().join(" "))
    }
}

/// Named flags in declaration order.
///
/// Declared defaults keep their position when a caller assigns a new value;
/// names that were never declared are appended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagSet {
    entries: Vec<(String, FlagValue)>,
}

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a flag with its default value.
    pub fn declare(&mut self, name: &str, default: FlagValue) {
        self.assign(name, default);
    }

    /// Override a declared flag in place, or append a new one.
    pub fn assign(&mut self, name: &str, value: FlagValue) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FlagValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Positional values, lists flattened, ready to append to the command.
    pub fn values(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(|(_, value)| value.flatten())
            .map(str::to_string)
            .collect()
    }
}
