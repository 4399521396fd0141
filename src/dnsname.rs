//! Fully-qualified domain name parsing.
//!
//! Only lengths are checked: DNS labels are not limited to the hostname
//! character set, so anything between dots is accepted as a label. Only
//! labels terminated by a dot are checked; the final label never is, so
//! `a..` parses as two labels and `a.<64 bytes>` is accepted.

use std::fmt;

/// Longest name, including the trailing dot
const MAX_NAME_LENGTH: usize = 253;

const MAX_LABEL_LENGTH: usize = 63;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DnsNameError {
    #[error("{0:?} is too long to be a DNS name")]
    TooLong(String),

    #[error("{0:?} is not a valid DNS label")]
    InvalidLabel(String),
}

/// An absolute domain name, always stored with a trailing dot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fqdn(String);

impl Fqdn {
    /// Parses `s` into its absolute form. The empty string and `"."` are the root.
    pub fn parse(s: &str) -> Result<Self, DnsNameError> {
        if s.is_empty() || s == "." {
            return Ok(Self(".".to_string()));
        }

        let s = s.strip_prefix('.').unwrap_or(s);
        let (name, total_len) = match s.strip_suffix('.') {
            Some(name) => (name, s.len()),
            None => (s, s.len() + 1),
        };
        if total_len > MAX_NAME_LENGTH {
            return Err(DnsNameError::TooLong(name.to_string()));
        }

        let mut labels = name.split('.');
        labels.next_back();
        for label in labels {
            if label.is_empty() || label.len() > MAX_LABEL_LENGTH {
                return Err(DnsNameError::InvalidLabel(label.to_string()));
            }
        }

        Ok(Self(format!("{name}.")))
    }

    pub fn num_labels(&self) -> usize {
        if self.0 == "." {
            return 0;
        }
        self.0.matches('.').count()
    }

    pub fn without_trailing_dot(&self) -> &str {
        self.0.strip_suffix('.').unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fqdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reports whether `host` names something more specific than a single label.
///
/// Malformed names are treated as not fully qualified.
pub fn is_fully_qualified(host: &str) -> bool {
    Fqdn::parse(host)
        .map(|fqdn| fqdn.num_labels() > 1)
        .unwrap_or(false)
}
