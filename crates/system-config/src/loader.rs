use std::fs;
use std::path::Path;
use std::sync::Arc;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::{ConfigError, ConfigNode, Result};

/// Source of configuration documents.
pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<ConfigNode>;
}

/// Reads documents from the filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct XmlFileLoader;

impl DocumentLoader for XmlFileLoader {
    fn load(&self, path: &Path) -> Result<ConfigNode> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        parse_xml(&text, Some(path))
    }
}

/// Parse an XML document into its root element. Text content, comments and processing
/// instructions are dropped; configuration lives in attributes.
pub fn parse_xml(text: &str, source: Option<&Path>) -> Result<ConfigNode> {
    let file = source
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<memory>".to_string());
    let xml_err = |message: String| ConfigError::Xml {
        file: file.clone(),
        message,
    };

    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<ConfigNode> = Vec::new();
    let mut root: Option<ConfigNode> = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(element(&e).map_err(&xml_err)?),
            Ok(Event::Empty(e)) => {
                let node = element(&e).map_err(&xml_err)?;
                attach(&mut stack, &mut root, node).map_err(&xml_err)?;
            }
            Ok(Event::End(_)) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| xml_err("unbalanced closing tag".to_string()))?;
                attach(&mut stack, &mut root, node).map_err(&xml_err)?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(xml_err(format!(
                    "at byte {}: {e}",
                    reader.error_position()
                )))
            }
        }
    }
    if let Some(open) = stack.last() {
        return Err(xml_err(format!("element <{}> is never closed", open.name())));
    }
    let mut root = root.ok_or_else(|| xml_err("document has no root element".to_string()))?;
    let path = format!("/{}", root.name());
    root.reindex(path);
    if let Some(src) = source {
        let src: Arc<Path> = Arc::from(src);
        root.set_source(&src);
    }
    Ok(root)
}

fn element(e: &BytesStart<'_>) -> Result<ConfigNode, String> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut node = ConfigNode::new(name);
    for attr in e.attributes() {
        let attr = attr.map_err(|err| err.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|err| err.to_string())?;
        node.set_attr(key, value.into_owned());
    }
    Ok(node)
}

fn attach(
    stack: &mut [ConfigNode],
    root: &mut Option<ConfigNode>,
    node: ConfigNode,
) -> Result<(), String> {
    if let Some(parent) = stack.last_mut() {
        parent.children_mut().push(node);
        return Ok(());
    }
    if root.is_some() {
        return Err("more than one root element".to_string());
    }
    *root = Some(node);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_and_attributes() {
        let xml = r#"<?xml version="1.0"?>
            <System>
              <!-- two cards -->
              <Settings>
                <Card slot="1" type="16"/>
                <Card slot="2" type="0x11" static="1">
                  <CustomConfig><StageParameters/></CustomConfig>
                </Card>
              </Settings>
            </System>"#;
        let root = parse_xml(xml, None).unwrap();
        assert_eq!(root.name(), "System");
        let settings = root.child("Settings").unwrap();
        let cards: Vec<&ConfigNode> = settings.children_named("Card").collect();
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[1].attr("type"), Some("0x11"));
        assert_eq!(cards[1].path(), "/System/Settings/Card[2]");
        assert!(cards[1].select("CustomConfig/StageParameters").is_some());
    }

    #[test]
    fn unescapes_entities() {
        let root = parse_xml(r#"<Port><Name value="A &amp; B"/></Port>"#, None).unwrap();
        assert_eq!(root.child("Name").unwrap().attr("value"), Some("A & B"));
    }

    #[test]
    fn rejects_broken_documents() {
        assert!(matches!(
            parse_xml("<System><Settings></System>", None),
            Err(ConfigError::Xml { .. })
        ));
        assert!(matches!(parse_xml("", None), Err(ConfigError::Xml { .. })));
        assert!(matches!(
            parse_xml("<A/><B/>", None),
            Err(ConfigError::Xml { .. })
        ));
    }
}
