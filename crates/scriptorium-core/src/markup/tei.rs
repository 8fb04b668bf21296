use super::{LocatedEvent, Location, MarkupEvent, SourceAdapter};
use crate::error::AdapterError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

/// Elements whose whole subtree never contributes citable text.
const SKIPPED_ELEMENTS: &[&str] = &["teiHeader", "note", "head", "bibl", "del", "gap", "app"];

/// Elements that become citation boundaries when they carry `@n`.
const BOUNDARY_ELEMENTS: &[&str] = &["div", "l", "lg", "p", "seg", "ab"];

/// `div/@type` values that mark the text of a work.
const WORK_DIV_TYPES: &[&str] = &["edition", "translation"];

/// Adapter for TEI-style XML.
///
/// - `<div type="edition" n="work.id">` (or `translation`) delimits a work.
/// - Inside a work, `div`, `l`, `lg`, `p`, `seg` and `ab` elements that carry
///   `@n` are citation boundaries. The level comes from `@subtype`, then from
///   a `div`'s `@type` (unless it is the generic `textpart`), then from the
///   element (`l` is a line, `p` a paragraph, `lg` a stanza, `seg` a
///   section). A `div` with neither names no level and opens the next one.
/// - `<w lemma="…" ana="…">` is an annotated word (`@msd` and `@pos` are
///   accepted in place of `@ana`).
/// - `teiHeader`, `note`, `head`, `bibl`, `del`, `gap` and `app` subtrees
///   are dropped; empty elements (`<lb/>`, `<milestone/>`) are ignored.
///
/// An XML syntax error ends reading with a `Skipped` event. Everything read
/// before it is kept and open structures are closed.
#[derive(Debug, Clone, Default)]
pub struct TeiAdapter;

impl TeiAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug)]
enum Frame {
    Work,
    Boundary,
    Word,
    Transparent,
}

#[derive(Debug)]
struct PendingWord {
    surface: String,
    lemma: Option<String>,
    morphology: Option<String>,
    location: Location,
}

/// Maps byte offsets to line numbers while the reader moves forward.
struct LineTracker<'a> {
    content: &'a str,
    offset: usize,
    line: usize,
}

impl<'a> LineTracker<'a> {
    fn new(content: &'a str) -> Self {
        Self {
            content,
            offset: 0,
            line: 1,
        }
    }

    fn locate(&mut self, offset: usize) -> Location {
        let offset = offset.min(self.content.len());
        if offset > self.offset {
            self.line += self.content.as_bytes()[self.offset..offset]
                .iter()
                .filter(|b| **b == b'\n')
                .count();
            self.offset = offset;
        }
        Location {
            offset,
            line: self.line,
        }
    }
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.attributes().flatten().find_map(|attr| {
        if attr.key.local_name().as_ref() == key.as_bytes() {
            attr.unescape_value().ok().map(|v| v.trim().to_string())
        } else {
            None
        }
    })
}

fn level_for(name: &str, e: &BytesStart<'_>) -> Option<String> {
    if let Some(subtype) = attribute(e, "subtype").filter(|s| !s.is_empty()) {
        return Some(subtype);
    }
    if name == "div" {
        return attribute(e, "type").filter(|t| !t.is_empty() && t != "textpart");
    }
    match name {
        "l" => Some("line".to_string()),
        "lg" => Some("stanza".to_string()),
        "p" => Some("paragraph".to_string()),
        "seg" => Some("section".to_string()),
        _ => attribute(e, "type"),
    }
}

struct TeiReader {
    events: Vec<LocatedEvent>,
    stack: Vec<Frame>,
    skip_depth: usize,
    word: Option<PendingWord>,
}

impl TeiReader {
    fn in_work(&self) -> bool {
        self.stack.iter().any(|f| matches!(f, Frame::Work))
    }

    fn push_event(&mut self, event: MarkupEvent, location: Location) {
        self.events.push(LocatedEvent::new(event, location));
    }

    fn start(&mut self, e: &BytesStart<'_>, location: Location) {
        if self.skip_depth > 0 {
            self.skip_depth += 1;
            return;
        }

        let name = element_name(e);
        if SKIPPED_ELEMENTS.contains(&name.as_str()) {
            self.skip_depth = 1;
            return;
        }

        if self.word.is_some() {
            self.stack.push(Frame::Transparent);
            return;
        }

        let is_work_div = name == "div"
            && attribute(e, "type").is_some_and(|t| WORK_DIV_TYPES.contains(&t.as_str()));

        if is_work_div {
            if self.in_work() {
                self.push_event(
                    MarkupEvent::Skipped {
                        reason: "work division nested inside another work".to_string(),
                    },
                    location,
                );
                self.skip_depth = 1;
                return;
            }
            match attribute(e, "n").filter(|n| !n.is_empty()) {
                Some(work_id) => {
                    self.push_event(MarkupEvent::WorkStart { work_id }, location);
                    self.stack.push(Frame::Work);
                }
                None => {
                    self.push_event(
                        MarkupEvent::Skipped {
                            reason: "work division without @n".to_string(),
                        },
                        location,
                    );
                    self.skip_depth = 1;
                }
            }
            return;
        }

        if !self.in_work() {
            self.stack.push(Frame::Transparent);
            return;
        }

        if name == "w" {
            self.word = Some(PendingWord {
                surface: String::new(),
                lemma: attribute(e, "lemma").filter(|l| !l.is_empty()),
                morphology: attribute(e, "ana")
                    .or_else(|| attribute(e, "msd"))
                    .or_else(|| attribute(e, "pos"))
                    .filter(|m| !m.is_empty()),
                location,
            });
            self.stack.push(Frame::Word);
            return;
        }

        if BOUNDARY_ELEMENTS.contains(&name.as_str()) {
            if let Some(locator) = attribute(e, "n") {
                let level = level_for(&name, e);
                self.push_event(MarkupEvent::BoundaryOpen { level, locator }, location);
                self.stack.push(Frame::Boundary);
                return;
            }
        }

        self.stack.push(Frame::Transparent);
    }

    fn end(&mut self, location: Location) {
        if self.skip_depth > 0 {
            self.skip_depth -= 1;
            return;
        }
        match self.stack.pop() {
            Some(Frame::Work) => self.push_event(MarkupEvent::WorkEnd, location),
            Some(Frame::Boundary) => self.push_event(MarkupEvent::BoundaryClose, location),
            Some(Frame::Word) => self.finish_word(),
            Some(Frame::Transparent) | None => {}
        }
    }

    fn finish_word(&mut self) {
        if let Some(word) = self.word.take() {
            let surface = word.surface.trim().to_string();
            if surface.is_empty() {
                return;
            }
            self.push_event(
                MarkupEvent::Annotation {
                    surface,
                    lemma: word.lemma,
                    morphology: word.morphology,
                },
                word.location,
            );
        }
    }

    fn text(&mut self, text: &str, location: Location) {
        if self.skip_depth > 0 {
            return;
        }
        if let Some(word) = self.word.as_mut() {
            word.surface.push_str(text);
        } else if self.in_work() {
            self.push_event(MarkupEvent::Text(text.to_string()), location);
        }
    }

    /// Closes whatever is still open so the event stream balances.
    fn close_all(&mut self, location: Location) {
        self.word = None;
        while let Some(frame) = self.stack.pop() {
            match frame {
                Frame::Work => self.push_event(MarkupEvent::WorkEnd, location),
                Frame::Boundary => self.push_event(MarkupEvent::BoundaryClose, location),
                Frame::Word | Frame::Transparent => {}
            }
        }
    }
}

impl SourceAdapter for TeiAdapter {
    fn name(&self) -> &str {
        "tei"
    }

    fn events(&self, content: &str) -> Result<Vec<LocatedEvent>, AdapterError> {
        if !content.trim_start().starts_with('<') {
            return Err(AdapterError::Unsupported(
                "document does not start with an XML element".to_string(),
            ));
        }

        let mut reader = Reader::from_str(content);
        let mut lines = LineTracker::new(content);
        let mut state = TeiReader {
            events: Vec::new(),
            stack: Vec::new(),
            skip_depth: 0,
            word: None,
        };

        loop {
            let location = lines.locate(reader.buffer_position());
            match reader.read_event() {
                Ok(Event::Start(ref e)) => state.start(e, location),
                Ok(Event::End(_)) => state.end(location),
                Ok(Event::Text(e)) => match e.unescape() {
                    Ok(text) => state.text(&text, location),
                    Err(err) => state.push_event(
                        MarkupEvent::Skipped {
                            reason: format!("unreadable text: {}", err),
                        },
                        location,
                    ),
                },
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    state.text(&text, location);
                }
                Ok(Event::Eof) => {
                    if !state.stack.is_empty() || state.skip_depth > 0 {
                        state.push_event(
                            MarkupEvent::Skipped {
                                reason: "document ended with unclosed elements".to_string(),
                            },
                            location,
                        );
                    }
                    state.close_all(location);
                    break;
                }
                Err(err) => {
                    let location = lines.locate(reader.buffer_position());
                    debug!("TEI parse stopped at {}: {}", location, err);
                    state.push_event(
                        MarkupEvent::Skipped {
                            reason: format!("XML syntax error: {}", err),
                        },
                        location,
                    );
                    state.close_all(location);
                    break;
                }
                // Empty elements, comments, processing instructions, doctype
                Ok(_) => {}
            }
        }

        Ok(state.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(xml: &str) -> Vec<MarkupEvent> {
        TeiAdapter::new()
            .events(xml)
            .unwrap()
            .into_iter()
            .map(|e| e.event)
            .collect()
    }

    fn text_of(events: &[MarkupEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                MarkupEvent::Text(t) => Some(t.as_str()),
                MarkupEvent::Annotation { surface, .. } => Some(surface.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("|")
    }

    const ILIAD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<TEI xmlns="http://www.tei-c.org/ns/1.0">
  <teiHeader><title>Iliad</title></teiHeader>
  <text><body>
    <div type="edition" n="iliad">
      <div type="textpart" subtype="book" n="1">
        <head>Book One</head>
        <l n="1">μῆνιν <w lemma="ἀείδω" ana="v2spma---">ἄειδε</w> θεὰ</l>
        <l n="2">οὐλομένην<note>a note</note></l>
      </div>
    </div>
  </body></text>
</TEI>"#;

    #[test]
    fn test_work_and_boundaries() {
        let events = events(ILIAD);
        assert_eq!(
            events[0],
            MarkupEvent::WorkStart {
                work_id: "iliad".to_string()
            }
        );
        assert!(events.contains(&MarkupEvent::BoundaryOpen {
            level: Some("book".to_string()),
            locator: "1".to_string()
        }));
        assert!(events.contains(&MarkupEvent::BoundaryOpen {
            level: Some("line".to_string()),
            locator: "2".to_string()
        }));
        assert_eq!(events.last(), Some(&MarkupEvent::WorkEnd));

        let opens = events
            .iter()
            .filter(|e| matches!(e, MarkupEvent::BoundaryOpen { .. }))
            .count();
        let closes = events
            .iter()
            .filter(|e| matches!(e, MarkupEvent::BoundaryClose))
            .count();
        assert_eq!(opens, closes);
    }

    #[test]
    fn test_header_note_and_head_are_dropped() {
        let text = text_of(&events(ILIAD));
        assert!(!text.contains("Iliad"));
        assert!(!text.contains("a note"));
        assert!(!text.contains("Book One"));
        assert!(text.contains("οὐλομένην"));
    }

    #[test]
    fn test_inline_annotation() {
        let events = events(ILIAD);
        assert!(events.contains(&MarkupEvent::Annotation {
            surface: "ἄειδε".to_string(),
            lemma: Some("ἀείδω".to_string()),
            morphology: Some("v2spma---".to_string()),
        }));
    }

    #[test]
    fn test_div_without_level_opens_next_level() {
        let xml = r#"<body><div type="edition" n="w"><div n="3"><p>text</p></div></div></body>"#;
        let events = events(xml);
        assert_eq!(
            events[1],
            MarkupEvent::BoundaryOpen {
                level: None,
                locator: "3".to_string()
            }
        );
        assert_eq!(events[2], MarkupEvent::Text("text".to_string()));
    }

    #[test]
    fn test_text_outside_work_is_ignored() {
        let xml = r#"<body><p n="1">front matter</p><div type="edition" n="w"><l n="1">x</l></div></body>"#;
        let text = text_of(&events(xml));
        assert_eq!(text, "x");
    }

    #[test]
    fn test_syntax_error_keeps_prefix_and_balances() {
        let xml = r#"<body><div type="edition" n="w"><l n="1">kept</l><l n="2">lost</x></div></body>"#;
        let events = events(xml);
        assert!(events.contains(&MarkupEvent::Text("kept".to_string())));
        assert!(events
            .iter()
            .any(|e| matches!(e, MarkupEvent::Skipped { reason } if reason.contains("XML"))));
        assert_eq!(events.last(), Some(&MarkupEvent::WorkEnd));
    }

    #[test]
    fn test_edition_without_id_is_skipped() {
        let xml = r#"<body><div type="edition"><l n="1">x</l></div></body>"#;
        let events = events(xml);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], MarkupEvent::Skipped { .. }));
    }

    #[test]
    fn test_entities_are_unescaped() {
        let xml = r#"<body><div type="edition" n="w"><l n="1">a &amp; b</l></div></body>"#;
        assert_eq!(text_of(&events(xml)), "a & b");
    }

    #[test]
    fn test_locations_track_lines() {
        let located = TeiAdapter::new().events(ILIAD).unwrap();
        let work = located
            .iter()
            .find(|e| matches!(e.event, MarkupEvent::WorkStart { .. }))
            .unwrap();
        assert_eq!(work.location.line, 5);
    }

    #[test]
    fn test_non_xml_rejected() {
        assert!(TeiAdapter::new().events("1.1\tplain text").is_err());
    }
}
