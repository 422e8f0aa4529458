//! Connection mapping between preprocessing outputs and base inputs

use crate::proto::{GraphProto, ValueInfoProto};
use crate::{ComposerError, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One edge of the splice: a preprocessing output feeding a base input
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    /// Output name on the preprocessing graph
    pub from: String,
    /// Input name on the base graph
    pub to: String,
}

impl Connection {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

impl std::str::FromStr for Connection {
    type Err = ComposerError;

    /// Parse `FROM=TO`
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('=') {
            Some((from, to)) if !from.trim().is_empty() && !to.trim().is_empty() => {
                Ok(Connection::new(from.trim(), to.trim()))
            }
            _ => Err(ComposerError::ConfigError(format!(
                "Invalid connection '{}'. Expected format: 'FROM=TO'",
                s
            ))),
        }
    }
}

/// Lower-cased name → original name, in first-seen order
///
/// A later name that lower-cases to an existing key replaces the stored
/// original name but keeps the key's original position.
fn lowercase_index(values: &[ValueInfoProto]) -> Vec<(String, String)> {
    let mut entries: Vec<(String, String)> = Vec::with_capacity(values.len());
    let mut position: FxHashMap<String, usize> = FxHashMap::default();

    for value in values {
        let key = value.name.to_lowercase();
        match position.get(&key) {
            Some(&idx) => entries[idx].1 = value.name.clone(),
            None => {
                position.insert(key.clone(), entries.len());
                entries.push((key, value.name.clone()));
            }
        }
    }

    entries
}

/// Pair preprocessing outputs with base inputs whose names match ignoring case
///
/// Order follows the preprocessing graph's output declaration order.
pub fn match_by_name(preprocessing: &GraphProto, base: &GraphProto) -> Vec<Connection> {
    let outputs = lowercase_index(&preprocessing.output);
    let inputs: FxHashMap<String, String> = lowercase_index(&base.input).into_iter().collect();

    outputs
        .into_iter()
        .filter_map(|(key, from)| inputs.get(&key).map(|to| Connection::new(from, to.clone())))
        .collect()
}

/// Validate a caller-supplied connection table against both graphs
pub fn validate_explicit(
    connections: &[Connection],
    preprocessing: &GraphProto,
    base: &GraphProto,
) -> Result<()> {
    let outputs: FxHashSet<&str> = preprocessing.output.iter().map(|o| o.name.as_str()).collect();
    let inputs: FxHashSet<&str> = base.input.iter().map(|i| i.name.as_str()).collect();
    let mut targets = FxHashSet::default();

    for conn in connections {
        if !outputs.contains(conn.from.as_str()) {
            return Err(ComposerError::UnknownConnectionEndpoint(format!(
                "'{}' is not an output of the preprocessing graph",
                conn.from
            )));
        }
        if !inputs.contains(conn.to.as_str()) {
            return Err(ComposerError::UnknownConnectionEndpoint(format!(
                "'{}' is not an input of the base graph",
                conn.to
            )));
        }
        if !targets.insert(conn.to.as_str()) {
            return Err(ComposerError::DuplicateConnectionTarget(conn.to.clone()));
        }
    }

    Ok(())
}

/// Resolve the connections used for the merge
///
/// An explicit table wins; otherwise names are matched. An empty result is
/// [`ComposerError::NoConnections`].
pub fn resolve_connections(
    explicit: &[Connection],
    preprocessing: &GraphProto,
    base: &GraphProto,
) -> Result<Vec<Connection>> {
    let connections = if explicit.is_empty() {
        match_by_name(preprocessing, base)
    } else {
        validate_explicit(explicit, preprocessing, base)?;
        explicit.to_vec()
    };

    if connections.is_empty() {
        return Err(ComposerError::NoConnections {
            outputs: preprocessing.output.iter().map(|o| o.name.clone()).collect(),
            inputs: base.input.iter().map(|i| i.name.clone()).collect(),
        });
    }

    for conn in &connections {
        tracing::debug!("Connection: {}", conn);
    }

    Ok(connections)
}
