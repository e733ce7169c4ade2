// Per-project ignore patterns. Some tasks are generated with unique names and never
// recur, so tracking their history only wastes space.

use regex::Regex;

#[derive(Debug, Clone, Default)]
pub struct IgnoreMatcher {
    patterns: Vec<Regex>,
}

impl IgnoreMatcher {
    /// Trims each pattern and skips blanks. The first invalid pattern fails the whole set.
    pub fn compile<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut compiled = Vec::new();
        for raw in patterns {
            let pattern = raw.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            match Regex::new(pattern) {
                Ok(re) => compiled.push(re),
                Err(e) => {
                    tracing::warn!(pattern = %pattern, "could not compile ignore pattern");
                    return Err(e);
                }
            }
        }
        Ok(Self { patterns: compiled })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(name))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
