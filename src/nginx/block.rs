//! nginx config tree and serializer.
//!
//! A tree is an ordered list of `(key, value)` entries where a value is either
//! one or more leaf values or a nested block. Leaves render as aligned
//! `key value;` statements, keys starting with `#` render as comments, and
//! blocks render with braces. A fixed set of blank-line rules is applied to
//! the output so generated files are stable byte for byte.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::AccessRules;

const INDENT: &str = "    ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Leaf(Vec<String>),
    Block(NginxConf),
}

/// An ordered nginx directive tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NginxConf {
    entries: Vec<(String, Value)>,
}

impl NginxConf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a `key value;` statement.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.push((key.into(), Value::Leaf(vec![value.into()])));
        self
    }

    /// Append one statement per value under the same key.
    pub fn add_values<I, S>(&mut self, key: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        if !values.is_empty() {
            self.entries.push((key.into(), Value::Leaf(values)));
        }
        self
    }

    /// Append a `name { ... }` block.
    pub fn add_block(&mut self, name: impl Into<String>, block: NginxConf) -> &mut Self {
        self.entries.push((name.into(), Value::Block(block)));
        self
    }

    /// Append a `# text` line.
    pub fn comment(&mut self, text: &str) -> &mut Self {
        self.entries.push((format!("# {}", text), Value::Leaf(vec![String::new()])));
        self
    }

    pub fn deny(&mut self, source: impl Into<String>) -> &mut Self {
        self.add("deny", source)
    }

    pub fn allow(&mut self, source: impl Into<String>) -> &mut Self {
        self.add("allow", source)
    }

    /// Deny blocked sources, allow allowed sources, then deny everyone else
    /// when an allow list exists.
    pub fn access_rules(&mut self, rules: &AccessRules) -> &mut Self {
        for source in &rules.blocked_ips {
            self.deny(source.as_str());
        }
        if !rules.allowed_ips.is_empty() {
            for source in &rules.allowed_ips {
                self.allow(source.as_str());
            }
            self.deny("all");
        }
        self
    }

    /// Wrap this tree as the body of `name { ... }`.
    pub fn wrap(self, name: impl Into<String>) -> NginxConf {
        let mut outer = NginxConf::new();
        outer.add_block(name, self);
        outer
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        render_entries(&self.entries, 0, &mut out);
        cleanup(out)
    }
}

/// Longest non-comment leaf key before the first block.
fn longest_key(entries: &[(String, Value)]) -> usize {
    let mut longest = 0;
    for (key, value) in entries {
        if matches!(value, Value::Block(_)) {
            return longest;
        }
        if !key.starts_with('#') && key.len() > longest {
            longest = key.len();
        }
    }
    longest
}

fn render_entries(entries: &[(String, Value)], depth: usize, out: &mut String) {
    let indent = INDENT.repeat(depth);
    let mut longest = longest_key(entries);
    let mut previous_block = false;

    for (i, (key, value)) in entries.iter().enumerate() {
        match value {
            Value::Block(block) => {
                out.push('\n');
                out.push_str(&indent);
                out.push_str(key);
                out.push_str(" {\n");
                render_entries(&block.entries, depth + 1, out);
                out.push_str(&indent);
                out.push_str("}\n\n");
                previous_block = true;
            }
            Value::Leaf(values) => {
                // alignment restarts after each block
                if previous_block {
                    longest = longest_key(&entries[i..]);
                    previous_block = false;
                }
                let padding = " ".repeat((longest + 1).saturating_sub(key.len()));
                let terminator = if key.starts_with('#') { "" } else { ";" };
                for value in values {
                    let line = format!("{}{}{}", key, padding, value);
                    out.push_str(&indent);
                    out.push_str(line.trim());
                    out.push_str(terminator);
                    out.push('\n');
                }
            }
        }
    }
}

struct Cleanup {
    pattern: Regex,
    replacement: &'static str,
}

static CLEANUP: LazyLock<Vec<Cleanup>> = LazyLock::new(|| {
    [
        // blank line before a comment that follows a statement
        (r"(?m)^([^\S\r\n]*[^#\s].*[^\n])\n([^\S\r\n]*)#", "${1}\n\n${2}#"),
        // comment sits directly on top of the block it labels
        (r"(?m)^([^\S\r\n]*#.*)(?:\n[^\S\r\n]*)+\n([^\S\r\n]*.*\{)", "${1}\n${2}"),
        // blank line after two stacked comments
        (r"(?m)^([^\S\r\n]*#.*\n[^\S\r\n]*#.*\n)([^\S\r\n]*[^#\s])", "${1}\n${2}"),
        // empty blocks on one line
        (r"(?m)^([^\S\r\n]*.*\{)\n[^\S\r\n]*(\})", "${1}${2}"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| Cleanup {
        pattern: Regex::new(pattern).expect("cleanup pattern is valid"),
        replacement,
    })
    .collect()
});

static STACKED_CLOSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([^\S\r\n]*\})(?:\n[^\S\r\n]*)+\n([^\S\r\n]*\})")
        .expect("close pattern is valid")
});

fn cleanup(rendered: String) -> String {
    let mut conf = rendered.replace("\n\n\n", "\n\n");
    for rule in CLEANUP.iter() {
        conf = rule.pattern.replace_all(&conf, rule.replacement).into_owned();
    }
    // matches overlap, so collapse one pair at a time
    while STACKED_CLOSE.is_match(&conf) {
        conf = STACKED_CLOSE.replace(&conf, "${1}\n${2}").into_owned();
    }
    conf.trim().to_string()
}

/// File stem for a location path: `/` → `__main`, `/a/b` → `a-b`.
pub fn location_slug(path: &str) -> String {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        "__main".to_string()
    } else {
        trimmed.replace('/', "-")
    }
}

/// Display path for a location file stem. Lossy when the path contained `-`.
pub fn location_path(slug: &str) -> String {
    if slug == "__main" {
        "/".to_string()
    } else {
        format!("/{}", slug.replace('-', "/"))
    }
}
