//! Structured filter graphs.
//!
//! Graphs are assembled from typed chains and filters and serialized once,
//! when an [`EncoderJob`](crate::encoder::EncoderJob) is turned into
//! arguments. [`FilterGraph::validate`] catches malformed labels and
//! dangling references before the encoder ever sees them.

use std::collections::HashSet;
use std::fmt;

use storyreel_common::{StoryreelError, StoryreelResult};

#[derive(Debug, Clone, PartialEq)]
enum FilterArg {
    Positional(String),
    Named(String, String),
    /// Always single-quoted (expressions).
    Expr(String, String),
}

/// A single filter such as `xfade=transition=fade:duration=1.000`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    name: String,
    args: Vec<FilterArg>,
}

impl Filter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: vec![],
        }
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl fmt::Display) -> Self {
        self.args.push(FilterArg::Positional(value.to_string()));
        self
    }

    /// Append a `key=value` argument.
    pub fn opt(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.args.push(FilterArg::Named(key.into(), value.to_string()));
        self
    }

    /// Append a `key='expr'` argument whose value is always quoted.
    pub fn expr(mut self, key: impl Into<String>, expr: impl fmt::Display) -> Self {
        self.args.push(FilterArg::Expr(key.into(), expr.to_string()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            f.write_str(if i == 0 { "=" } else { ":" })?;
            match arg {
                FilterArg::Positional(v) => f.write_str(&quote_if_needed(v))?,
                FilterArg::Named(k, v) => write!(f, "{k}={}", quote_if_needed(v))?,
                FilterArg::Expr(k, v) => write!(f, "{k}={}", quote(v))?,
            }
        }
        Ok(())
    }
}

/// Filters applied in sequence between input and output pads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterChain {
    inputs: Vec<String>,
    filters: Vec<Filter>,
    outputs: Vec<String>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a pad: either a label produced by an earlier chain or an
    /// input stream specifier like `0:v`.
    pub fn input(mut self, label: impl Into<String>) -> Self {
        self.inputs.push(label.into());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn output(mut self, label: impl Into<String>) -> Self {
        self.outputs.push(label.into());
        self
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }
}

impl fmt::Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for label in &self.inputs {
            write!(f, "[{label}]")?;
        }
        for (i, filter) in self.filters.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{filter}")?;
        }
        for label in &self.outputs {
            write!(f, "[{label}]")?;
        }
        Ok(())
    }
}

/// An ordered list of filter chains, serialized with `;` separators.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterGraph {
    chains: Vec<FilterChain>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chain(mut self, chain: FilterChain) -> Self {
        self.chains.push(chain);
        self
    }

    pub fn push(&mut self, chain: FilterChain) {
        self.chains.push(chain);
    }

    pub fn chains(&self) -> &[FilterChain] {
        &self.chains
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Check that the graph is well formed.
    ///
    /// Rejects empty graphs and chains, malformed filter names and pad
    /// labels, labels produced twice or consumed twice, and references to
    /// labels that no earlier chain produced.
    pub fn validate(&self) -> StoryreelResult<()> {
        let invalid = |msg: String| StoryreelError::render(format!("invalid filter graph: {msg}"));

        if self.chains.is_empty() {
            return Err(invalid("graph has no chains".into()));
        }

        let mut produced: HashSet<&str> = HashSet::new();
        let mut consumed: HashSet<&str> = HashSet::new();

        for (i, chain) in self.chains.iter().enumerate() {
            if chain.filters.is_empty() {
                return Err(invalid(format!("chain {i} has no filters")));
            }
            for filter in &chain.filters {
                if !is_valid_filter_name(&filter.name) {
                    return Err(invalid(format!("bad filter name {:?}", filter.name)));
                }
            }
            for label in &chain.inputs {
                if is_stream_specifier(label) {
                    continue;
                }
                if !is_valid_label(label) {
                    return Err(invalid(format!("bad input label {label:?}")));
                }
                if !produced.contains(label.as_str()) {
                    return Err(invalid(format!("chain {i} reads undefined label [{label}]")));
                }
                if !consumed.insert(label.as_str()) {
                    return Err(invalid(format!("label [{label}] consumed twice")));
                }
            }
            for label in &chain.outputs {
                if !is_valid_label(label) {
                    return Err(invalid(format!("bad output label {label:?}")));
                }
                if !produced.insert(label.as_str()) {
                    return Err(invalid(format!("label [{label}] produced twice")));
                }
            }
        }

        Ok(())
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, chain) in self.chains.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{chain}")?;
        }
        Ok(())
    }
}

fn needs_quoting(value: &str) -> bool {
    value.is_empty()
        || value
            .chars()
            .any(|c| matches!(c, ',' | ':' | ';' | '[' | ']' | '\'') || c.is_whitespace())
}

fn quote_if_needed(value: &str) -> String {
    if needs_quoting(value) {
        quote(value)
    } else {
        value.to_string()
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn is_valid_filter_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `N`, `N:v`, `N:a`, `N:v:M` and similar.
fn is_stream_specifier(label: &str) -> bool {
    let mut parts = label.split(':');
    let Some(index) = parts.next() else {
        return false;
    };
    if index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    parts.all(|p| {
        matches!(p, "v" | "a" | "s") || (!p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
    })
}
