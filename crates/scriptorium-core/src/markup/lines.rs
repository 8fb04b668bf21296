use super::{LocatedEvent, Location, MarkupEvent, SourceAdapter};
use crate::citation::DEFAULT_SEPARATOR;
use crate::error::AdapterError;

/// Plain-text adapter: one cited segment per line.
///
/// ```text
/// #work homer.iliad
/// 1.1<TAB>μῆνιν ἄειδε θεὰ Πηληϊάδεω Ἀχιλῆος
/// 1.2<TAB>οὐλομένην, ἣ μυρί᾽ Ἀχαιοῖς ἄλγε᾽ ἔθηκε,
/// ```
///
/// `#work <id>` starts a work and ends the previous one. Other lines starting
/// with `#` are comments, blank lines are ignored. Each citation component
/// opens the next level of the work's schema.
#[derive(Debug, Clone)]
pub struct CitedLinesAdapter {
    separator: char,
}

impl Default for CitedLinesAdapter {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR,
        }
    }
}

impl CitedLinesAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Citation separator used in the document (default `.`).
    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }
}

impl SourceAdapter for CitedLinesAdapter {
    fn name(&self) -> &str {
        "lines"
    }

    fn events(&self, content: &str) -> Result<Vec<LocatedEvent>, AdapterError> {
        if content.contains('\0') {
            return Err(AdapterError::Unsupported(
                "content contains NUL bytes; not a text document".to_string(),
            ));
        }

        let mut events = Vec::new();
        let mut in_work = false;
        let mut offset = 0;

        for (index, raw_line) in content.split_inclusive('\n').enumerate() {
            let location = Location {
                offset,
                line: index + 1,
            };
            offset += raw_line.len();

            let line = raw_line.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                continue;
            }

            if let Some(directive) = line.strip_prefix('#') {
                if let Some(work_id) = work_directive(directive) {
                    let work_id = work_id.trim();
                    if in_work {
                        events.push(LocatedEvent::new(MarkupEvent::WorkEnd, location));
                    }
                    if work_id.is_empty() {
                        in_work = false;
                        events.push(LocatedEvent::new(
                            MarkupEvent::Skipped {
                                reason: "#work directive without a work id".to_string(),
                            },
                            location,
                        ));
                    } else {
                        in_work = true;
                        events.push(LocatedEvent::new(
                            MarkupEvent::WorkStart {
                                work_id: work_id.to_string(),
                            },
                            location,
                        ));
                    }
                }
                continue;
            }

            let Some((citation, text)) = line.split_once('\t') else {
                events.push(LocatedEvent::new(
                    MarkupEvent::Skipped {
                        reason: "expected '<citation>\\t<text>'".to_string(),
                    },
                    location,
                ));
                continue;
            };

            if !in_work {
                events.push(LocatedEvent::new(
                    MarkupEvent::Skipped {
                        reason: format!("line '{}' precedes any #work directive", citation),
                    },
                    location,
                ));
                continue;
            }

            let locators: Vec<&str> = citation.trim().split(self.separator).collect();
            for locator in &locators {
                events.push(LocatedEvent::new(
                    MarkupEvent::BoundaryOpen {
                        level: None,
                        locator: locator.to_string(),
                    },
                    location,
                ));
            }
            events.push(LocatedEvent::new(
                MarkupEvent::Text(text.to_string()),
                location,
            ));
            for _ in &locators {
                events.push(LocatedEvent::new(MarkupEvent::BoundaryClose, location));
            }
        }

        if in_work {
            events.push(LocatedEvent::new(
                MarkupEvent::WorkEnd,
                Location::at(content, content.len()),
            ));
        }

        Ok(events)
    }
}

/// The argument of a `#work` directive; `#workshop` is a comment.
fn work_directive(directive: &str) -> Option<&str> {
    let rest = directive.strip_prefix("work")?;
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() => Some(rest),
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(events: &[LocatedEvent]) -> Vec<String> {
        events
            .iter()
            .map(|e| match &e.event {
                MarkupEvent::WorkStart { work_id } => format!("work:{}", work_id),
                MarkupEvent::WorkEnd => "/work".to_string(),
                MarkupEvent::BoundaryOpen { locator, .. } => format!("open:{}", locator),
                MarkupEvent::BoundaryClose => "close".to_string(),
                MarkupEvent::Text(t) => format!("text:{}", t),
                MarkupEvent::Annotation { surface, .. } => format!("w:{}", surface),
                MarkupEvent::Skipped { .. } => "skipped".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_basic_lines() {
        let content = "#work w1\n1.1\tarma virumque\n1.2\tcano\n";
        let events = CitedLinesAdapter::new().events(content).unwrap();
        assert_eq!(
            kinds(&events),
            vec![
                "work:w1",
                "open:1",
                "open:1",
                "text:arma virumque",
                "close",
                "close",
                "open:1",
                "open:2",
                "text:cano",
                "close",
                "close",
                "/work"
            ]
        );
        assert_eq!(events[1].location.line, 2);
        assert_eq!(events[6].location.line, 3);
    }

    #[test]
    fn test_comments_blank_and_malformed_lines() {
        let content = "# a comment\n\n#work w1\nno tab here\n1\tok\r\n";
        let events = CitedLinesAdapter::new().events(content).unwrap();
        assert_eq!(
            kinds(&events),
            vec!["work:w1", "skipped", "open:1", "text:ok", "close", "/work"]
        );
        assert_eq!(events[1].location.line, 4);
    }

    #[test]
    fn test_directive_needs_whitespace_after_work() {
        let content = "#work w1\n#workshop notes\n1\tok\n#work\tw2\n1\tmore\n";
        let events = CitedLinesAdapter::new().events(content).unwrap();
        assert_eq!(
            kinds(&events),
            vec![
                "work:w1",
                "open:1",
                "text:ok",
                "close",
                "/work",
                "work:w2",
                "open:1",
                "text:more",
                "close",
                "/work"
            ]
        );
    }

    #[test]
    fn test_text_before_work_is_skipped() {
        let events = CitedLinesAdapter::new().events("1.1\ttext\n").unwrap();
        assert_eq!(kinds(&events), vec!["skipped"]);
    }

    #[test]
    fn test_custom_separator() {
        let events = CitedLinesAdapter::new()
            .with_separator(':')
            .events("#work w\n3:4\tx\n")
            .unwrap();
        assert_eq!(
            kinds(&events),
            vec!["work:w", "open:3", "open:4", "text:x", "close", "close", "/work"]
        );
    }

    #[test]
    fn test_binary_content_rejected() {
        assert!(CitedLinesAdapter::new().events("a\0b").is_err());
    }
}
