use std::fmt;

const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Default floor for the ancestor walk: stop before a bare TLD.
pub const DEFAULT_ANCESTOR_FLOOR: usize = 2;

/// A normalized domain name: lowercase, no trailing dot, non-empty labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomainName {
    name: Box<str>,
    labels: usize,
}

impl DomainName {
    /// Normalizes `raw` and returns `None` if nothing usable is left.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);
        if trimmed.is_empty() || trimmed.len() > MAX_NAME_LEN {
            return None;
        }

        let name = trimmed.to_lowercase();
        let mut labels = 0;
        for label in name.split('.') {
            if label.is_empty()
                || label.len() > MAX_LABEL_LEN
                || label.chars().any(is_forbidden)
            {
                return None;
            }
            labels += 1;
        }

        Some(Self {
            name: name.into_boxed_str(),
            labels,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn label_count(&self) -> usize {
        self.labels
    }

    /// Labels from most to least specific.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.name.split('.')
    }

    /// The name itself followed by each parent domain, stopping once fewer
    /// than `floor` labels would remain. The name itself is always yielded.
    pub fn ancestors(&self, floor: usize) -> Ancestors<'_> {
        Ancestors {
            next: Some(&self.name),
            labels: self.labels,
            floor: floor.max(1),
        }
    }
}

impl AsRef<str> for DomainName {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// U+FFFD marks bytes that were not valid UTF-8 in the source list.
fn is_forbidden(c: char) -> bool {
    c.is_whitespace() || c.is_control() || c == char::REPLACEMENT_CHARACTER
}

pub struct Ancestors<'a> {
    next: Option<&'a str>,
    labels: usize,
    floor: usize,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let current = self.next.take()?;
        if self.labels > self.floor {
            if let Some(idx) = current.find('.') {
                self.next = Some(&current[idx + 1..]);
                self.labels -= 1;
            }
        }
        Some(current)
    }
}
