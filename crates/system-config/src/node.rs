use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// One element of a configuration document: a tag name, its attributes in document order,
/// and its child elements.
#[derive(Clone, Debug, Default)]
pub struct ConfigNode {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<ConfigNode>,
    path: String,
    source: Option<Arc<Path>>,
}

impl PartialEq for ConfigNode {
    // Location bookkeeping does not take part in equality
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.attributes == other.attributes
            && self.children == other.children
    }
}

impl ConfigNode {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let path = format!("/{name}");
        Self {
            name,
            path,
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_child(mut self, child: ConfigNode) -> Self {
        self.children.push(child);
        let path = self.path.clone();
        self.reindex(path);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attr(&self, key: &str) -> bool {
        self.attr(key).is_some()
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub(crate) fn attributes_mut(&mut self) -> impl Iterator<Item = &mut (String, String)> {
        self.attributes.iter_mut()
    }

    pub fn children(&self) -> &[ConfigNode] {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<ConfigNode> {
        &mut self.children
    }

    /// First child element named `name`.
    pub fn child(&self, name: &str) -> Option<&ConfigNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ConfigNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Select a node with a small XPath subset.
    ///
    /// `/Root/A/B` is absolute and must start at this node's name, `A/B` walks down from
    /// this node's children, and `//Name` finds the first element with that name in
    /// document order, this node included.
    pub fn select(&self, xpath: &str) -> Option<&ConfigNode> {
        if let Some(name) = xpath.strip_prefix("//") {
            return self.find_descendant(name);
        }
        if let Some(abs) = xpath.strip_prefix('/') {
            let mut parts = abs.split('/').filter(|p| !p.is_empty());
            let root = parts.next()?;
            if root != self.name {
                return None;
            }
            return parts.try_fold(self, |node, part| node.child(part));
        }
        xpath
            .split('/')
            .filter(|p| !p.is_empty())
            .try_fold(self, |node, part| node.child(part))
    }

    fn find_descendant(&self, name: &str) -> Option<&ConfigNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_descendant(name))
    }

    /// Element path within its document, e.g. `/System/Settings/Card[2]`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// File the element was read from, if it came from disk.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Path prefixed by the source file for diagnostics.
    pub fn location(&self) -> String {
        match &self.source {
            Some(src) => format!("{}:{}", src.display(), self.path),
            None => self.path.clone(),
        }
    }

    pub(crate) fn set_source(&mut self, source: &Arc<Path>) {
        self.source = Some(Arc::clone(source));
        for c in &mut self.children {
            c.set_source(source);
        }
    }

    /// Recompute element paths below this node, which now lives at `path`.
    pub(crate) fn reindex(&mut self, path: String) {
        let mut totals: HashMap<String, usize> = HashMap::new();
        for c in &self.children {
            *totals.entry(c.name.clone()).or_default() += 1;
        }
        let mut seen: HashMap<String, usize> = HashMap::new();
        for c in &mut self.children {
            let n = seen.entry(c.name.clone()).or_default();
            *n += 1;
            let child_path = if totals.get(&c.name).copied().unwrap_or(0) > 1 {
                format!("{path}/{}[{n}]", c.name)
            } else {
                format!("{path}/{}", c.name)
            };
            c.reindex(child_path);
        }
        self.path = path;
    }
}
