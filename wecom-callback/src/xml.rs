//! Flat XML document reader.
//!
//! WeCom wraps every payload in a single `<xml>` root whose children are
//! simple text or CDATA elements. Both the encrypted envelope and the
//! decrypted message use this shape, so one reader serves both.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Errors produced while reading a flat XML document.
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("invalid xml: {0}")]
    Syntax(#[from] quick_xml::Error),

    #[error("document has no root element")]
    NoRoot,

    #[error("document ended inside an open element")]
    Unclosed,
}

/// Read the direct children of the root element into a name → text map.
///
/// Text and CDATA sections inside a child are concatenated. Elements nested
/// deeper than one level are skipped. A child that appears more than once
/// keeps its first value.
pub fn read_fields(xml: &str) -> Result<HashMap<String, String>, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut fields: HashMap<String, String> = HashMap::new();
    let mut depth = 0usize;
    let mut saw_root = false;
    let mut current: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                if depth == 1 {
                    saw_root = true;
                } else if depth == 2 {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    if fields.contains_key(&name) {
                        current = None;
                    } else {
                        fields.insert(name.clone(), String::new());
                        current = Some(name);
                    }
                }
            }
            Event::Empty(e) => {
                if depth == 0 {
                    saw_root = true;
                } else if depth == 1 {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    fields.entry(name).or_default();
                }
            }
            Event::Text(e) => {
                if depth == 2 {
                    if let Some(value) = current.as_ref().and_then(|name| fields.get_mut(name)) {
                        value.push_str(&e.unescape()?);
                    }
                }
            }
            Event::CData(e) => {
                if depth == 2 {
                    if let Some(value) = current.as_ref().and_then(|name| fields.get_mut(name)) {
                        value.push_str(&String::from_utf8_lossy(&e));
                    }
                }
            }
            Event::End(_) => {
                if depth == 2 {
                    current = None;
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        return Err(XmlError::Unclosed);
    }
    if !saw_root {
        return Err(XmlError::NoRoot);
    }

    Ok(fields)
}
