use std::path::{Path, PathBuf, MAIN_SEPARATOR_STR};

use crate::{ConfigError, ConfigNode, DocumentLoader, Result, XmlFileLoader};

/// Attribute recording which file a spliced `Include`/`Import` came from.
pub const IMPORT_SOURCE_ATTR: &str = "_import_src";
/// Include chains deeper than this are rejected.
pub const MAX_INCLUDE_DEPTH: usize = 32;

const PATH_TOKEN: &str = "$PATH:";

/// Expands `$PATH:`/`$$` tokens and `Include`/`Import` elements.
///
/// Variables are substituted first, against the directory of the document being
/// processed; includes are then loaded, preprocessed against their own directory, and
/// spliced in place of the directive element.
pub struct Preprocessor<L> {
    loader: L,
    max_depth: usize,
}

impl<L: DocumentLoader> Preprocessor<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            max_depth: MAX_INCLUDE_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn preprocess(&self, root: ConfigNode, base: &Path) -> Result<ConfigNode> {
        self.run(root, base, 0)
    }

    /// Load `path` and preprocess it against its own directory.
    pub fn open(&self, path: &Path) -> Result<ConfigNode> {
        let root = self.loader.load(path)?;
        self.preprocess(root, &file_dir(path))
    }

    fn run(&self, mut root: ConfigNode, base: &Path, depth: usize) -> Result<ConfigNode> {
        substitute_variables(&mut root, base)?;
        self.expand_includes(&mut root, base, depth)?;
        let path = root.path().to_string();
        root.reindex(path);
        Ok(root)
    }

    fn expand_includes(&self, node: &mut ConfigNode, base: &Path, depth: usize) -> Result<()> {
        for child in node.children_mut().iter_mut() {
            let is_import = match child.name() {
                "Include" => false,
                "Import" => true,
                _ => {
                    self.expand_includes(child, base, depth)?;
                    continue;
                }
            };
            let href = child
                .attr("href")
                .ok_or_else(|| ConfigError::missing(child, "href"))?;
            let file = join_config_path(base, href);
            if depth >= self.max_depth {
                return Err(ConfigError::IncludeDepth {
                    depth: self.max_depth,
                    file,
                });
            }
            tracing::debug!(file = %file.display(), depth, "expanding include");
            let doc = self.loader.load(&file)?;
            let doc = self.run(doc, &file_dir(&file), depth + 1)?;
            let mut spliced = if is_import {
                let xpath = child
                    .attr("xpath")
                    .ok_or_else(|| ConfigError::missing(child, "xpath"))?;
                doc.select(xpath)
                    .cloned()
                    .ok_or_else(|| ConfigError::missing(&doc, format!("node matching {xpath}")))?
            } else {
                doc
            };
            spliced.set_attr(IMPORT_SOURCE_ATTR, file.to_string_lossy());
            *child = spliced;
        }
        Ok(())
    }
}

/// Load and fully preprocess a configuration file from disk.
pub fn open_xml(path: impl AsRef<Path>) -> Result<ConfigNode> {
    Preprocessor::new(XmlFileLoader).open(path.as_ref())
}

fn substitute_variables(node: &mut ConfigNode, base: &Path) -> Result<()> {
    let mut bad: Option<(String, String)> = None;
    for (key, value) in node.attributes_mut() {
        if !value.starts_with('$') {
            continue;
        }
        if let Some(rest) = value.strip_prefix(PATH_TOKEN).filter(|r| !r.is_empty()) {
            *value = join_config_path(base, rest).to_string_lossy().into_owned();
        } else if value.starts_with("$$") {
            value.remove(0);
        } else {
            bad = Some((key.clone(), value.clone()));
            break;
        }
    }
    if let Some((key, value)) = bad {
        return Err(ConfigError::malformed(node, key, value));
    }
    for child in node.children_mut().iter_mut() {
        substitute_variables(child, base)?;
    }
    Ok(())
}

/// Join a `/`-separated configuration path onto `base` using the platform separator.
fn join_config_path(base: &Path, rel: &str) -> PathBuf {
    base.join(rel.replace('/', MAIN_SEPARATOR_STR))
}

fn file_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
