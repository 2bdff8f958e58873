//! Flat tag→text XML scan
//!
//! AWS replies of interest here are shallow documents: `<Error>` bodies with
//! `Code`/`Message` children and `LocationConstraint` responses. A flat map of
//! element name to text content is enough; nesting and attributes are ignored.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;

/// Scans `xml` and returns element-name → text-content pairs. Elements without
/// text (including the enclosing `<Error>`) are present with an empty value,
/// so callers can test for their presence. Malformed trailing input yields the
/// pairs read up to that point.
pub(crate) fn tag_text(xml: &[u8]) -> HashMap<String, String> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text_start = true;
    reader.config_mut().trim_text_end = true;

    let mut components = HashMap::new();
    let mut current = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                current = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                components.insert(current.clone(), String::new());
            }
            Ok(Event::Text(e)) => {
                if let Ok(text) = e.unescape() {
                    components.insert(current.clone(), text.into_owned());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!(error = %e, "stopping xml scan on parse error");
                break;
            }
            _ => {}
        }
    }

    components
}
