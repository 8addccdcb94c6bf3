//! Marketplace vocabulary exposed by the API.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Kind of agent a task requires, as stored on-chain (`uint8`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentType {
    /// Finds relevant information and data.
    Searcher = 0,
    /// Analyzes data and provides insights.
    Analyst = 1,
    /// Generates content and documentation.
    Writer = 2,
}

/// Neither a known agent type id nor name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown agent type {0:?}")]
pub struct UnknownAgentType(pub String);

impl AgentType {
    /// Every agent type, in id order.
    pub const ALL: [Self; 3] = [Self::Searcher, Self::Analyst, Self::Writer];

    /// On-chain id.
    #[must_use]
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Searcher => "Searcher",
            Self::Analyst => "Analyst",
            Self::Writer => "Writer",
        }
    }

    /// One-line description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Searcher => "Finds relevant information and data",
            Self::Analyst => "Analyzes data and provides insights",
            Self::Writer => "Generates content and documentation",
        }
    }
}

impl TryFrom<u64> for AgentType {
    type Error = UnknownAgentType;

    fn try_from(id: u64) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|agent| u64::from(agent.id()) == id)
            .ok_or_else(|| UnknownAgentType(id.to_string()))
    }
}

impl FromStr for AgentType {
    type Err = UnknownAgentType;

    /// Accepts an id (`"1"`) or a case-insensitive name (`"analyst"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = s.parse::<u64>() {
            return Self::try_from(id);
        }
        Self::ALL
            .into_iter()
            .find(|agent| agent.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownAgentType(s.to_owned()))
    }
}

impl Display for AgentType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for AgentType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for AgentType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AgentTypeVisitor;

        impl Visitor<'_> for AgentTypeVisitor {
            type Value = AgentType;

            fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str("an agent type id (0-2) or name")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                AgentType::try_from(v).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v)
                    .map_err(|_| E::custom(UnknownAgentType(v.to_string())))
                    .and_then(|v| self.visit_u64(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(AgentTypeVisitor)
    }
}

/// Entry of the agent type catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AgentTypeInfo {
    /// On-chain id.
    pub id: u8,
    /// Display name.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
}

impl From<AgentType> for AgentTypeInfo {
    fn from(agent: AgentType) -> Self {
        Self {
            id: agent.id(),
            name: agent.name(),
            description: agent.description(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_type_accepts_ids_and_names() {
        assert_eq!(
            serde_json::from_str::<AgentType>("1").unwrap(),
            AgentType::Analyst
        );
        assert_eq!(
            serde_json::from_str::<AgentType>("\"writer\"").unwrap(),
            AgentType::Writer
        );
        assert_eq!("0".parse::<AgentType>().unwrap(), AgentType::Searcher);
        assert!(serde_json::from_str::<AgentType>("3").is_err());
        assert!(serde_json::from_str::<AgentType>("-1").is_err());
        assert!("Painter".parse::<AgentType>().is_err());
    }

    #[test]
    fn test_agent_type_serializes_as_name() {
        assert_eq!(
            serde_json::to_string(&AgentType::Searcher).unwrap(),
            "\"Searcher\""
        );
        let info = AgentTypeInfo::from(AgentType::Writer);
        assert_eq!(info.id, 2);
    }
}
