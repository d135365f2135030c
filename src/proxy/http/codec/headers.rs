use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLine {
    pub name: String,
    pub value: String,
}

/// Request headers in arrival order. Names are kept exactly as received and
/// compared case-sensitively, so a repeated name replaces the earlier value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    lines: Vec<HeaderLine>,
}

impl RequestHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one `Name: Value` line. Lines without a colon are ignored and
    /// reported by returning false.
    pub fn push_line(&mut self, line: &str) -> bool {
        let Some((name, value)) = line.split_once(':') else {
            return false;
        };
        self.insert(name.trim(), value.trim());
        true
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.lines.iter_mut().find(|line| line.name == name) {
            Some(existing) => existing.value = value,
            None => self.lines.push(HeaderLine { name, value }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.lines
            .iter()
            .find(|line| line.name == name)
            .map(|line| line.value.as_str())
    }

    /// Last value whose name matches `name` ignoring ASCII case.
    pub fn get_ignore_case(&self, name: &str) -> Option<&str> {
        self.lines
            .iter()
            .rev()
            .find(|line| line.name.eq_ignore_ascii_case(name))
            .map(|line| line.value.as_str())
    }

    pub fn host(&self) -> Option<&str> {
        self.get_ignore_case("host").filter(|host| !host.is_empty())
    }

    pub fn content_length_raw(&self) -> Option<&str> {
        self.get_ignore_case("content-length")
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderLine> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Snapshot stored alongside a cache entry.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.lines
            .iter()
            .map(|line| (line.name.clone(), line.value.clone()))
            .collect()
    }
}
