//! The streaming element/character-data event source the descriptor loader
//! is driven by. The loader itself never touches an XML library directly —
//! it only consumes [`XmlEvent`]s from anything implementing
//! [`XmlEventSource`], matching the spec's abstraction boundary at the
//! parser itself. [`QuickXmlEventSource`] is the default implementation,
//! backed by `quick-xml`.

use std::io::BufRead;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    ElementStart {
        name: String,
        attributes: Vec<(String, String)>,
    },
    ElementEnd {
        name: String,
    },
    CharacterData(String),
}

pub trait XmlEventSource {
    /// Returns the next event, or `Ok(None)` once the stream is exhausted.
    fn next_event(&mut self) -> std::io::Result<Option<XmlEvent>>;
}

pub struct QuickXmlEventSource<R: BufRead> {
    reader: quick_xml::Reader<R>,
    buf: Vec<u8>,
    pending: Option<XmlEvent>,
}

impl<R: BufRead> QuickXmlEventSource<R> {
    pub fn new(inner: R) -> Self {
        let mut reader = quick_xml::Reader::from_reader(inner);
        reader.config_mut().trim_text(false);
        Self {
            reader,
            buf: Vec::new(),
            pending: None,
        }
    }

    fn attributes_of(e: &quick_xml::events::BytesStart<'_>) -> Vec<(String, String)> {
        e.attributes()
            .flatten()
            .map(|attr| {
                let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                let value = attr
                    .unescape_value()
                    .map(|v| v.into_owned())
                    .unwrap_or_default();
                (key, value)
            })
            .collect()
    }
}

impl<R: BufRead> XmlEventSource for QuickXmlEventSource<R> {
    fn next_event(&mut self) -> std::io::Result<Option<XmlEvent>> {
        use quick_xml::events::Event;

        if let Some(ev) = self.pending.take() {
            return Ok(Some(ev));
        }

        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    let attributes = Self::attributes_of(&e);
                    return Ok(Some(XmlEvent::ElementStart { name, attributes }));
                }
                Ok(Event::Empty(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    let attributes = Self::attributes_of(&e);
                    self.pending = Some(XmlEvent::ElementEnd { name: name.clone() });
                    return Ok(Some(XmlEvent::ElementStart { name, attributes }));
                }
                Ok(Event::End(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    return Ok(Some(XmlEvent::ElementEnd { name }));
                }
                Ok(Event::Text(e)) => {
                    let text = e
                        .unescape()
                        .map(|v| v.into_owned())
                        .unwrap_or_default();
                    return Ok(Some(XmlEvent::CharacterData(text)));
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                    return Ok(Some(XmlEvent::CharacterData(text)));
                }
                Ok(Event::Eof) => return Ok(None),
                Ok(_) => continue,
                Err(err) => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        err.to_string(),
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn events_of(xml: &str) -> Vec<XmlEvent> {
        let mut src = QuickXmlEventSource::new(Cursor::new(xml.as_bytes()));
        let mut out = Vec::new();
        while let Some(ev) = src.next_event().unwrap() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn self_closing_element_emits_start_and_end() {
        let events = events_of(r#"<plugin id="a"><requires><import plugin="b"/></requires></plugin>"#);
        assert!(events.iter().any(|e| matches!(e,
            XmlEvent::ElementStart { name, .. } if name == "import")));
        assert!(events.iter().any(|e| matches!(e,
            XmlEvent::ElementEnd { name } if name == "import")));
    }

    #[test]
    fn character_data_is_preserved() {
        let events = events_of("<a>  hello  </a>");
        assert!(events
            .iter()
            .any(|e| matches!(e, XmlEvent::CharacterData(s) if s.contains("hello"))));
    }
}
