use serde::{Deserialize, Serialize};

use super::field;

/// A checksum-verified sentence, stored without start marker or `*HH` trailer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    body: String,
}

impl Sentence {
    pub(crate) fn new(body: &str) -> Self {
        Sentence {
            body: body.to_string(),
        }
    }

    /// Text between the start marker and `*`.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Address field, e.g. `GPRMC` or `PGENV`.
    pub fn address(&self) -> &str {
        field::field(&self.body, 0)
    }

    /// Sentence type: the last three letters of the address.
    pub fn kind(&self) -> &str {
        let address = self.address();
        if address.len() >= 3 {
            &address[address.len() - 3..]
        } else {
            address
        }
    }

    /// Talker id, or `P` for vendor-proprietary sentences.
    pub fn talker(&self) -> &str {
        let address = self.address();
        if address.starts_with('P') {
            "P"
        } else if address.len() >= 5 {
            &address[..address.len() - 3]
        } else {
            ""
        }
    }

    pub fn is_proprietary(&self) -> bool {
        self.address().starts_with('P')
    }

    /// 1-based data field, `""` when absent.
    pub fn field(&self, index: usize) -> &str {
        field::field(&self.body, index)
    }

    pub fn number(&self, index: usize) -> Option<f64> {
        field::number(&self.body, index)
    }

    pub fn integer(&self, index: usize) -> Option<i64> {
        field::integer(&self.body, index)
    }

    pub fn letter(&self, index: usize) -> Option<char> {
        field::letter(&self.body, index)
    }

    pub fn field_count(&self) -> usize {
        field::field_count(&self.body)
    }
}

impl std::fmt::Display for Sentence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${}", self.body)
    }
}
