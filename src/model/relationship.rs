//! Relationship (edge) in the property graph.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

use super::{NodeId, PropertyMap, Value};
use crate::Error;

/// Opaque relationship identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelId(pub u64);

impl fmt::Display for RelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a relationship as seen from one of its nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

impl Direction {
    pub fn reverse(self) -> Self {
        match self {
            Direction::Outgoing => Direction::Incoming,
            Direction::Incoming => Direction::Outgoing,
            Direction::Both => Direction::Both,
        }
    }

    /// The concrete directions this one stands for. `Both` is never cached.
    pub fn split(self) -> SmallVec<[Direction; 2]> {
        match self {
            Direction::Both => smallvec![Direction::Outgoing, Direction::Incoming],
            d => smallvec![d],
        }
    }

    /// Does a relationship seen in `concrete` direction satisfy `self`?
    pub fn matches(self, concrete: Direction) -> bool {
        self == Direction::Both || self == concrete
    }

    /// Directions under which `rel` is seen from `pov`.
    ///
    /// A self-loop is seen both ways; a relationship not touching `pov`
    /// yields nothing.
    pub fn resolve(rel: &Relationship, pov: NodeId) -> SmallVec<[Direction; 2]> {
        let mut dirs = SmallVec::new();
        if rel.src == pov {
            dirs.push(Direction::Outgoing);
        }
        if rel.dst == pov {
            dirs.push(Direction::Incoming);
        }
        dirs
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Outgoing => "OUTGOING",
            Direction::Incoming => "INCOMING",
            Direction::Both => "BOTH",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OUTGOING" => Ok(Direction::Outgoing),
            "INCOMING" => Ok(Direction::Incoming),
            "BOTH" => Ok(Direction::Both),
            other => Err(Error::Decode(format!("unknown direction '{other}'"))),
        }
    }
}

/// A relationship (directed edge) in the property graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelId,
    pub src: NodeId,
    pub dst: NodeId,
    pub rel_type: String,
    pub properties: PropertyMap,
}

impl Relationship {
    pub fn new(id: RelId, src: NodeId, dst: NodeId, rel_type: impl Into<String>) -> Self {
        Self {
            id,
            src,
            dst,
            rel_type: rel_type.into(),
            properties: PropertyMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// The "other" end of the relationship from the given node.
    pub fn other_node(&self, from: NodeId) -> Option<NodeId> {
        if from == self.src { Some(self.dst) }
        else if from == self.dst { Some(self.src) }
        else { None }
    }

    pub fn is_loop(&self) -> bool {
        self.src == self.dst
    }
}
