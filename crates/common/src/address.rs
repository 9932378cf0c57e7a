//! Numeric addressing of tests
//!
//! An address names a test by position: the spec's index in its suite, the
//! chain of subtopic indices below the spec's root topic, and the test's index
//! within its topic. Addresses are the only test identity that survives an
//! isolation boundary.

use crate::error::{Error, Result};
use crate::model::{Spec, TestRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SuiteAddress {
    #[serde(rename = "spec")]
    pub spec_index: usize,
    #[serde(rename = "topic")]
    pub topic_path: Vec<usize>,
    #[serde(rename = "test")]
    pub test_index: usize,
}

impl SuiteAddress {
    pub fn new(spec_index: usize, topic_path: Vec<usize>, test_index: usize) -> Self {
        Self {
            spec_index,
            topic_path,
            test_index,
        }
    }

    /// JSON form, as carried in launch parameters.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(encoded: &str) -> Result<Self> {
        Ok(serde_json::from_str(encoded)?)
    }
}

impl fmt::Display for SuiteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.spec_index)?;
        for index in &self.topic_path {
            write!(f, "/{}", index)?;
        }
        write!(f, "#{}", self.test_index)
    }
}

/// Parses either the JSON wire form or the display form `spec/topic/...#test`.
impl FromStr for SuiteAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.starts_with('{') {
            return Self::decode(s);
        }
        let invalid = || Error::InvalidAddress(s.to_string());
        let (path, test) = s.split_once('#').ok_or_else(invalid)?;
        let mut indices = path.split('/').map(|part| part.parse::<usize>().map_err(|_| invalid()));
        let spec_index = indices.next().ok_or_else(invalid)??;
        let topic_path = indices.collect::<Result<Vec<_>>>()?;
        let test_index = test.parse().map_err(|_| invalid())?;
        Ok(Self::new(spec_index, topic_path, test_index))
    }
}

impl Spec {
    /// Resolve an address within this spec. The spec index is not consulted.
    pub fn get_test_by_address(&self, address: &SuiteAddress) -> Option<TestRef<'_>> {
        let mut topic = self.root()?;
        for index in &address.topic_path {
            topic = topic.topics().nth(*index)?;
        }
        topic.tests().nth(address.test_index)
    }

    /// Address of a test of this spec, given the spec's index in its suite.
    ///
    /// Fails with [`Error::ForeignTest`] for a test owned by another spec.
    pub fn address_for(&self, test: TestRef<'_>, spec_index: usize) -> Result<SuiteAddress> {
        if !std::ptr::eq(self, test.spec()) {
            return Err(Error::ForeignTest);
        }
        let mut topic_path = Vec::new();
        let mut topic = test.topic();
        while let Some(parent) = topic.parent() {
            topic_path.push(topic.index());
            topic = parent;
        }
        topic_path.reverse();
        Ok(SuiteAddress {
            spec_index,
            topic_path,
            test_index: test.index(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_wire_keys_are_short() {
        let address = SuiteAddress::new(1, vec![0, 2], 3);
        assert_eq!(address.encode().unwrap(), r#"{"spec":1,"topic":[0,2],"test":3}"#);
        assert_eq!(SuiteAddress::decode(&address.encode().unwrap()).unwrap(), address);
    }

    #[test_case(SuiteAddress::new(0, vec![], 0), "0#0" ; "root test")]
    #[test_case(SuiteAddress::new(2, vec![1, 0], 4), "2/1/0#4" ; "nested test")]
    fn test_display(address: SuiteAddress, expected: &str) {
        assert_eq!(address.to_string(), expected);
    }

    #[test_case("0#0", SuiteAddress::new(0, vec![], 0) ; "root test")]
    #[test_case("2/1/0#4", SuiteAddress::new(2, vec![1, 0], 4) ; "nested test")]
    #[test_case(r#"{"spec":1,"topic":[3],"test":0}"#, SuiteAddress::new(1, vec![3], 0) ; "json form")]
    fn test_parse(input: &str, expected: SuiteAddress) {
        assert_eq!(input.parse::<SuiteAddress>().unwrap(), expected);
    }

    #[test_case("" ; "empty")]
    #[test_case("1/2" ; "missing test index")]
    #[test_case("a#0" ; "non numeric spec")]
    #[test_case("0//1#0" ; "empty topic index")]
    fn test_parse_rejects(input: &str) {
        assert!(matches!(input.parse::<SuiteAddress>(), Err(Error::InvalidAddress(_))));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(SuiteAddress::decode("{\"spec\":"), Err(Error::Serialization(_))));
    }

    #[test]
    fn test_unresolvable_address_yields_none() {
        let mut spec = Spec::new();
        spec.describe("a", |s| s.it("t", |_| async { anyhow::Ok(()) }));
        assert!(spec.get_test_by_address(&SuiteAddress::new(0, vec![3], 0)).is_none());
        assert!(spec.get_test_by_address(&SuiteAddress::new(0, vec![], 1)).is_none());
        assert!(spec.get_test_by_address(&SuiteAddress::new(0, vec![], 0)).is_some());
    }

    #[test]
    fn test_address_of_foreign_test_is_rejected() {
        let mut first = Spec::new();
        first.describe("a", |s| s.it("t", |_| async { anyhow::Ok(()) }));
        let second = Spec::new();
        let test = first.tests().next().unwrap();
        assert!(matches!(second.address_for(test, 0), Err(Error::ForeignTest)));
    }
}
