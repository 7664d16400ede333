//! Per-query policy decision.
//!
//! [`PolicyEngine::evaluate`] answers "is this name listed?" against whatever
//! index is current. [`PolicyMode`] then says what the pipeline does with the
//! answer: the blocking variant substitutes a response, the warning variant
//! always lets the query through.

use crate::config::SourceConfig;
use crate::engine::{DomainName, IndexReader, DEFAULT_ANCESTOR_FLOOR};
use crate::error::SetupError;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Allow,
    Flag,
}

/// Terminal answer used by the blocking variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockResponse {
    /// REFUSED response code.
    #[default]
    Refused,
    /// NXDOMAIN response code.
    NxDomain,
    /// `0.0.0.0` for A, `::` for AAAA, NXDOMAIN for anything else.
    NullAddress,
}

impl FromStr for BlockResponse {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "refused" => Ok(BlockResponse::Refused),
            "nxdomain" => Ok(BlockResponse::NxDomain),
            "null" => Ok(BlockResponse::NullAddress),
            _ => Err(SetupError::UnknownBlockResponse(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyMode {
    /// Withhold resolution for listed names.
    Block(BlockResponse),
    /// Always forward, record a notice for listed names.
    Warn,
}

/// What the pipeline should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Respond(BlockResponse),
}

impl PolicyMode {
    pub fn verdict(&self, outcome: Outcome) -> Verdict {
        match (self, outcome) {
            (PolicyMode::Block(response), Outcome::Flag) => Verdict::Respond(*response),
            _ => Verdict::Continue,
        }
    }
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyMode::Block(_) => f.write_str("block"),
            PolicyMode::Warn => f.write_str("warn"),
        }
    }
}

#[derive(Clone)]
pub struct PolicyEngine {
    reader: IndexReader,
    match_subdomains: bool,
    ancestor_floor: usize,
}

impl PolicyEngine {
    pub fn new(reader: IndexReader, config: &SourceConfig) -> Self {
        Self {
            reader,
            match_subdomains: config.match_subdomains,
            ancestor_floor: config.ancestor_floor(),
        }
    }

    pub fn with_options(reader: IndexReader, match_subdomains: bool) -> Self {
        Self {
            reader,
            match_subdomains,
            ancestor_floor: DEFAULT_ANCESTOR_FLOOR,
        }
    }

    /// Unparseable names fail open.
    pub fn evaluate(&self, name: &str) -> Outcome {
        let Some(name) = DomainName::parse(name) else {
            return Outcome::Allow;
        };

        let snapshot = self.reader.load();
        let listed = if self.match_subdomains {
            snapshot.contains_with_ancestors(&name, self.ancestor_floor)
        } else {
            snapshot.contains(name.as_str())
        };

        if listed {
            Outcome::Flag
        } else {
            Outcome::Allow
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DomainIndex;

    fn engine(match_subdomains: bool) -> PolicyEngine {
        let index = DomainIndex::build(["totally.cool", "example.org"]).unwrap();
        PolicyEngine::with_options(IndexReader::fixed(index), match_subdomains)
    }

    #[test]
    fn test_evaluate_scenario() {
        let engine = engine(true);
        assert_eq!(engine.evaluate("example.org"), Outcome::Flag);
        assert_eq!(engine.evaluate("Example.ORG."), Outcome::Flag);
        assert_eq!(engine.evaluate("other.org"), Outcome::Allow);
        assert_eq!(engine.evaluate("a.b.totally.cool"), Outcome::Flag);
    }

    #[test]
    fn test_evaluate_exact_only() {
        let engine = engine(false);
        assert_eq!(engine.evaluate("example.org"), Outcome::Flag);
        assert_eq!(engine.evaluate("sub.example.org"), Outcome::Allow);
        assert_eq!(engine.evaluate("a.b.totally.cool"), Outcome::Allow);
    }

    #[test]
    fn test_malformed_name_is_allowed() {
        let engine = engine(true);
        assert_eq!(engine.evaluate(""), Outcome::Allow);
        assert_eq!(engine.evaluate("bad..example.org"), Outcome::Allow);
    }

    #[test]
    fn test_verdicts() {
        let block = PolicyMode::Block(BlockResponse::NxDomain);
        assert_eq!(
            block.verdict(Outcome::Flag),
            Verdict::Respond(BlockResponse::NxDomain)
        );
        assert_eq!(block.verdict(Outcome::Allow), Verdict::Continue);
        assert_eq!(PolicyMode::Warn.verdict(Outcome::Flag), Verdict::Continue);
        assert_eq!(PolicyMode::Warn.verdict(Outcome::Allow), Verdict::Continue);
    }

    #[test]
    fn test_block_response_from_str() {
        assert_eq!("REFUSED".parse::<BlockResponse>().unwrap(), BlockResponse::Refused);
        assert_eq!("nxdomain".parse::<BlockResponse>().unwrap(), BlockResponse::NxDomain);
        assert_eq!("null".parse::<BlockResponse>().unwrap(), BlockResponse::NullAddress);
        assert!("drop".parse::<BlockResponse>().is_err());
    }
}
