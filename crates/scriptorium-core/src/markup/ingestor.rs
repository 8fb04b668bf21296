use super::{DiagnosticKind, IngestionDiagnostic, LocatedEvent, Location, MarkupEvent};
use crate::citation::CitationPath;
use crate::config::RuleSet;
use crate::corpus::{CorpusSnapshot, Segment, Work};
use crate::text::{tokenize, AnnotationSource, Token};
use std::collections::{BTreeSet, HashMap};
use std::ops::Range;
use std::sync::Arc;
use tracing::debug;

/// Segments and diagnostics produced from one document.
#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    /// Grouped by work in first-seen order, ordinal order within a work
    pub segments: Vec<Segment>,
    pub diagnostics: Vec<IngestionDiagnostic>,
    /// Works the document contributed text to
    pub works: BTreeSet<String>,
}

/// Turns an adapter's event stream into segments.
///
/// Reads registered works and their owners from a snapshot. Text is attached
/// to the innermost open citation; every boundary event ends the current text
/// run, so a run never spans two citations. Whitespace is collapsed to single
/// spaces and trimmed. Anything that cannot be placed (unknown level, invalid
/// locator, duplicate or out-of-order citation, text outside any citation) is
/// reported as a diagnostic and skipped, together with its subtree.
pub struct MarkupIngestor<'a> {
    snapshot: &'a CorpusSnapshot,
    rules: &'a RuleSet,
}

impl<'a> MarkupIngestor<'a> {
    pub fn new(snapshot: &'a CorpusSnapshot, rules: &'a RuleSet) -> Self {
        Self { snapshot, rules }
    }

    pub fn ingest(&self, document_id: &str, events: Vec<LocatedEvent>) -> IngestOutcome {
        let mut run = IngestRun {
            ingestor: self,
            document_id,
            current: None,
            skipping_work: 0,
            skip_depth: 0,
            pending: TextBuffer::default(),
            progress: HashMap::new(),
            order: Vec::new(),
            diagnostics: Vec::new(),
        };

        let event_count = events.len();
        for located in events {
            run.handle(located);
        }
        if let Some(active) = run.current.take() {
            run.flush(&active);
        }

        let mut outcome = IngestOutcome {
            diagnostics: run.diagnostics,
            ..Default::default()
        };
        for work_id in run.order {
            if let Some(progress) = run.progress.remove(&work_id) {
                if !progress.segments.is_empty() {
                    outcome.works.insert(work_id);
                    outcome.segments.extend(progress.segments);
                }
            }
        }

        debug!(
            "Ingested document '{}': {} events, {} segments, {} diagnostics",
            document_id,
            event_count,
            outcome.segments.len(),
            outcome.diagnostics.len()
        );
        outcome
    }
}

/// The work whose text is currently being read, and the open citation.
struct ActiveWork {
    work: Arc<Work>,
    path: CitationPath,
}

#[derive(Default)]
struct WorkProgress {
    last_path: Option<CitationPath>,
    segments: Vec<Segment>,
}

struct InlineAnnotation {
    range: Range<usize>,
    lemma: Option<String>,
    morphology: Option<String>,
}

/// Whitespace-collapsing accumulator for the current text run.
#[derive(Default)]
struct TextBuffer {
    text: String,
    pending_space: bool,
    annotations: Vec<InlineAnnotation>,
    location: Option<Location>,
}

impl TextBuffer {
    /// Appends `text`, returning the byte range of its non-whitespace content
    /// in the buffer.
    fn append(&mut self, text: &str, location: Location) -> Option<Range<usize>> {
        let mut start = None;
        for c in text.chars() {
            if c.is_whitespace() {
                self.pending_space = true;
                continue;
            }
            if self.pending_space && !self.text.is_empty() {
                self.text.push(' ');
            }
            self.pending_space = false;
            if start.is_none() {
                start = Some(self.text.len());
                self.location.get_or_insert(location);
            }
            self.text.push(c);
        }
        start.map(|s| s..self.text.len())
    }

    fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn take(&mut self) -> TextBuffer {
        std::mem::take(self)
    }
}

struct IngestRun<'r, 'a> {
    ingestor: &'r MarkupIngestor<'a>,
    document_id: &'r str,
    current: Option<ActiveWork>,
    /// Nesting depth inside a work that is being ignored
    skipping_work: usize,
    /// Nesting depth inside a boundary subtree that is being ignored
    skip_depth: usize,
    pending: TextBuffer,
    progress: HashMap<String, WorkProgress>,
    order: Vec<String>,
    diagnostics: Vec<IngestionDiagnostic>,
}

impl IngestRun<'_, '_> {
    fn diagnose(&mut self, kind: DiagnosticKind, message: String, location: Location) {
        let work_id = self.current.as_ref().map(|a| a.work.id.clone());
        self.diagnostics.push(IngestionDiagnostic {
            kind,
            message,
            location,
            work_id,
        });
    }

    fn handle(&mut self, located: LocatedEvent) {
        let location = located.location;
        match located.event {
            MarkupEvent::Skipped { reason } => {
                self.diagnose(DiagnosticKind::MalformedMarkup, reason, location);
            }
            MarkupEvent::WorkStart { work_id } => self.work_start(work_id, location),
            MarkupEvent::WorkEnd => self.work_end(),
            MarkupEvent::BoundaryOpen { level, locator } => {
                self.boundary_open(level, locator, location)
            }
            MarkupEvent::BoundaryClose => self.boundary_close(),
            MarkupEvent::Text(text) => {
                if self.accepts_text(&text, location) {
                    self.pending.append(&text, location);
                }
            }
            MarkupEvent::Annotation {
                surface,
                lemma,
                morphology,
            } => {
                if self.accepts_text(&surface, location) {
                    if let Some(range) = self.pending.append(&surface, location) {
                        self.pending.annotations.push(InlineAnnotation {
                            range,
                            lemma,
                            morphology,
                        });
                    }
                }
            }
        }
    }

    fn accepts_text(&mut self, text: &str, location: Location) -> bool {
        if self.skipping_work > 0 || self.skip_depth > 0 {
            return false;
        }
        if self.current.is_none() {
            if !text.trim().is_empty() {
                self.diagnose(
                    DiagnosticKind::TextOutsideCitation,
                    "text outside any work".to_string(),
                    location,
                );
            }
            return false;
        }
        true
    }

    fn work_start(&mut self, work_id: String, location: Location) {
        if self.skipping_work > 0 {
            self.skipping_work += 1;
            return;
        }

        if let Some(active) = self.current.take() {
            self.flush(&active);
            self.diagnose(
                DiagnosticKind::UnexpectedNesting,
                format!("work '{}' starts inside work '{}'", work_id, active.work.id),
                location,
            );
            self.current = Some(active);
            self.skipping_work = 1;
            return;
        }

        let snapshot = self.ingestor.snapshot;
        let Some(entry) = snapshot.work(&work_id) else {
            self.diagnose(
                DiagnosticKind::UnknownWork,
                format!("work '{}' is not registered", work_id),
                location,
            );
            self.skipping_work = 1;
            return;
        };

        if let Some(owner) = entry.owner.as_deref() {
            if owner != self.document_id {
                self.diagnose(
                    DiagnosticKind::WorkOwnedElsewhere,
                    format!(
                        "text of work '{}' already comes from document '{}'",
                        work_id, owner
                    ),
                    location,
                );
                self.skipping_work = 1;
                return;
            }
        }

        if !self.progress.contains_key(&work_id) {
            self.order.push(work_id.clone());
            self.progress.insert(work_id, WorkProgress::default());
        }
        self.skip_depth = 0;
        self.current = Some(ActiveWork {
            work: Arc::clone(&entry.work),
            path: CitationPath::default(),
        });
    }

    fn work_end(&mut self) {
        if self.skipping_work > 0 {
            self.skipping_work -= 1;
            return;
        }
        if let Some(active) = self.current.take() {
            self.flush(&active);
        }
        self.skip_depth = 0;
    }

    fn boundary_open(&mut self, level: Option<String>, locator: String, location: Location) {
        if self.skipping_work > 0 {
            return;
        }
        if self.skip_depth > 0 {
            self.skip_depth += 1;
            return;
        }

        let Some(mut active) = self.current.take() else {
            self.diagnose(
                DiagnosticKind::UnexpectedNesting,
                format!("citation boundary '{}' outside any work", locator),
                location,
            );
            self.skip_depth = 1;
            return;
        };
        self.flush(&active);

        let result = self.place_boundary(&active, level.as_deref(), locator.trim());
        match result {
            Ok(next) => active.path.push(next),
            Err((kind, message)) => {
                self.current = Some(active);
                self.diagnose(kind, message, location);
                self.skip_depth = 1;
                return;
            }
        }
        self.current = Some(active);
    }

    fn place_boundary(
        &self,
        active: &ActiveWork,
        level: Option<&str>,
        locator: &str,
    ) -> Result<crate::citation::Locator, (DiagnosticKind, String)> {
        let schema = &active.work.schema;
        let depth = active.path.len();

        if let Some(name) = level {
            match schema.level_index(name) {
                None => {
                    return Err((
                        DiagnosticKind::UnknownLevel,
                        format!(
                            "level '{}' is not part of schema {}",
                            name,
                            schema.describe()
                        ),
                    ))
                }
                Some(index) if index != depth => {
                    return Err((
                        DiagnosticKind::UnexpectedNesting,
                        format!(
                            "level '{}' opened at depth {} of schema {}",
                            name,
                            depth + 1,
                            schema.describe()
                        ),
                    ))
                }
                Some(_) => {}
            }
        } else if depth >= schema.depth() {
            return Err((
                DiagnosticKind::UnexpectedNesting,
                format!(
                    "boundary '{}' is deeper than schema {}",
                    locator,
                    schema.describe()
                ),
            ));
        }

        schema
            .parse_locator(depth, locator)
            .map_err(|reason| (DiagnosticKind::InvalidLocator, reason))
    }

    fn boundary_close(&mut self) {
        if self.skipping_work > 0 {
            return;
        }
        if self.skip_depth > 0 {
            self.skip_depth -= 1;
            return;
        }
        if let Some(mut active) = self.current.take() {
            self.flush(&active);
            active.path.pop();
            self.current = Some(active);
        }
    }

    /// Emits the pending text run as a segment at the current path.
    fn flush(&mut self, active: &ActiveWork) {
        let buffer = self.pending.take();
        if buffer.is_empty() {
            return;
        }
        let location = buffer.location.unwrap_or_default();
        let work = &active.work;
        let schema = &work.schema;

        if active.path.is_empty() {
            self.diagnostics.push(IngestionDiagnostic {
                kind: DiagnosticKind::TextOutsideCitation,
                message: format!("text in work '{}' outside any citation", work.id),
                location,
                work_id: Some(work.id.clone()),
            });
            return;
        }

        let citation = schema.format(&active.path);
        let progress = self.progress.entry(work.id.clone()).or_default();
        if let Some(last) = &progress.last_path {
            let problem = if *last == active.path {
                Some((
                    DiagnosticKind::DuplicateCitation,
                    format!("citation {} already has text", citation),
                ))
            } else if *last > active.path {
                Some((
                    DiagnosticKind::OutOfOrderCitation,
                    format!(
                        "citation {} follows {}",
                        citation,
                        schema.format(last)
                    ),
                ))
            } else {
                None
            };
            if let Some((kind, message)) = problem {
                self.diagnostics.push(IngestionDiagnostic {
                    kind,
                    message,
                    location,
                    work_id: Some(work.id.clone()),
                });
                return;
            }
        }

        let rules = self.ingestor.rules.get(work.language);
        let mut tokens = tokenize(&buffer.text, rules);
        apply_inline_annotations(&mut tokens, &buffer.annotations);

        progress.last_path = Some(active.path.clone());
        let ordinal = progress.segments.len() as u64;
        progress.segments.push(Segment {
            work_id: work.id.clone(),
            path: active.path.clone(),
            citation,
            ordinal,
            text: buffer.text,
            tokens,
            document_id: self.document_id.to_string(),
        });
    }
}

/// Copies inline lemma and morphology onto the word tokens each annotation
/// covers.
fn apply_inline_annotations(tokens: &mut [Token], annotations: &[InlineAnnotation]) {
    for annotation in annotations {
        for token in tokens.iter_mut().filter(|t| t.is_word()) {
            let span = token.span();
            if span.start < annotation.range.start || span.end > annotation.range.end {
                continue;
            }
            if let Some(lemma) = &annotation.lemma {
                token.lemma = Some(lemma.clone());
                token.annotation = Some(AnnotationSource::Inline);
            }
            if let Some(morphology) = &annotation.morphology {
                token.morphology = Some(morphology.clone());
                token.annotation = Some(AnnotationSource::Inline);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citation::{CitationLevel, CitationSchema, LevelKind};
    use crate::corpus::WorkEntry;
    use crate::markup::{CitedLinesAdapter, SourceAdapter, TeiAdapter};
    use crate::text::Language;

    fn snapshot_with(works: Vec<Work>) -> CorpusSnapshot {
        let mut snapshot = CorpusSnapshot::default();
        for work in works {
            snapshot
                .works
                .insert(work.id.clone(), Arc::new(WorkEntry::empty(Arc::new(work))));
        }
        snapshot
    }

    fn iliad() -> Work {
        Work::new(
            "iliad",
            "Homer",
            "Iliad",
            Language::Greek,
            CitationSchema::numeric(&["book", "line"]),
        )
    }

    fn ingest_lines(snapshot: &CorpusSnapshot, content: &str) -> IngestOutcome {
        let rules = RuleSet::default();
        let events = CitedLinesAdapter::new().events(content).unwrap();
        MarkupIngestor::new(snapshot, &rules).ingest("doc", events)
    }

    fn ingest_tei(snapshot: &CorpusSnapshot, content: &str) -> IngestOutcome {
        let rules = RuleSet::default();
        let events = TeiAdapter::new().events(content).unwrap();
        MarkupIngestor::new(snapshot, &rules).ingest("doc", events)
    }

    fn kinds(outcome: &IngestOutcome) -> Vec<DiagnosticKind> {
        outcome.diagnostics.iter().map(|d| d.kind).collect()
    }

    #[test]
    fn test_lines_become_segments() {
        let snapshot = snapshot_with(vec![iliad()]);
        let outcome = ingest_lines(
            &snapshot,
            "#work iliad\n1.1\tμῆνιν ἄειδε θεὰ\n1.2\tοὐλομένην, ἣ μυρί᾽\n1.3\tπολλὰς δ᾽ ἰφθίμους\n",
        );
        assert!(outcome.diagnostics.is_empty());
        let citations: Vec<_> = outcome.segments.iter().map(|s| s.citation.as_str()).collect();
        assert_eq!(citations, vec!["1.1", "1.2", "1.3"]);
        let ordinals: Vec<_> = outcome.segments.iter().map(|s| s.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
        assert_eq!(outcome.segments[1].text, "οὐλομένην, ἣ μυρί᾽");
        assert_eq!(outcome.works.len(), 1);
    }

    #[test]
    fn test_whitespace_collapsed_and_tokens_reconstruct() {
        let snapshot = snapshot_with(vec![iliad()]);
        let outcome = ingest_tei(
            &snapshot,
            r#"<body><div type="edition" n="iliad"><div subtype="book" n="1">
                <l n="1">  μῆνιν
                   ἄειδε   θεὰ </l></div></div></body>"#,
        );
        let segment = &outcome.segments[0];
        assert_eq!(segment.text, "μῆνιν ἄειδε θεὰ");
        assert_eq!(segment.reconstruct(), segment.text);
    }

    #[test]
    fn test_inline_annotation_attaches_to_word() {
        let snapshot = snapshot_with(vec![iliad()]);
        let outcome = ingest_tei(
            &snapshot,
            r#"<body><div type="edition" n="iliad"><div subtype="book" n="1"><l n="1">μῆνιν <w lemma="ἀείδω" ana="v2spma---">ἄειδε</w> θεὰ</l></div></div></body>"#,
        );
        let tokens = &outcome.segments[0].tokens;
        assert_eq!(tokens[0].lemma, None);
        assert_eq!(tokens[1].lemma.as_deref(), Some("ἀείδω"));
        assert_eq!(tokens[1].morphology.as_deref(), Some("v2spma---"));
        assert_eq!(tokens[1].annotation, Some(AnnotationSource::Inline));
        assert_eq!(tokens[2].lemma, None);
    }

    #[test]
    fn test_inline_morphology_without_lemma_is_inline() {
        let snapshot = snapshot_with(vec![iliad()]);
        let outcome = ingest_tei(
            &snapshot,
            r#"<body><div type="edition" n="iliad"><div subtype="book" n="1"><l n="1"><w ana="v3siia---">ἔθηκε</w></l></div></div></body>"#,
        );
        let token = &outcome.segments[0].tokens[0];
        assert_eq!(token.lemma, None);
        assert_eq!(token.morphology.as_deref(), Some("v3siia---"));
        assert_eq!(token.annotation, Some(AnnotationSource::Inline));
    }

    #[test]
    fn test_text_split_at_boundaries() {
        let snapshot = snapshot_with(vec![iliad()]);
        let outcome = ingest_tei(
            &snapshot,
            r#"<body><div type="edition" n="iliad"><div subtype="book" n="1"><l n="1">one</l><l n="2">two</l></div><div subtype="book" n="2"><l n="1">three</l></div></div></body>"#,
        );
        let texts: Vec<_> = outcome
            .segments
            .iter()
            .map(|s| (s.citation.as_str(), s.text.as_str()))
            .collect();
        assert_eq!(texts, vec![("1.1", "one"), ("1.2", "two"), ("2.1", "three")]);
    }

    #[test]
    fn test_empty_boundary_yields_no_segment() {
        let snapshot = snapshot_with(vec![iliad()]);
        let outcome = ingest_lines(&snapshot, "#work iliad\n1.1\t   \n1.2\ttext\n");
        assert_eq!(outcome.segments.len(), 1);
        assert_eq!(outcome.segments[0].citation, "1.2");
        assert_eq!(outcome.segments[0].ordinal, 0);
    }

    #[test]
    fn test_prefix_level_segment() {
        let snapshot = snapshot_with(vec![iliad()]);
        let outcome = ingest_tei(
            &snapshot,
            r#"<body><div type="edition" n="iliad"><div subtype="book" n="1"><l n="1">line</l></div><div subtype="book" n="2">a fragment without lines</div></div></body>"#,
        );
        assert!(outcome.diagnostics.is_empty());
        assert_eq!(outcome.segments[1].citation, "2");
        assert_eq!(outcome.segments[1].path.len(), 1);
    }

    #[test]
    fn test_unknown_level_skips_subtree() {
        let snapshot = snapshot_with(vec![iliad()]);
        let outcome = ingest_tei(
            &snapshot,
            r#"<body><div type="edition" n="iliad"><div subtype="book" n="1"><l n="1">kept</l><div subtype="chapter" n="9"><l n="2">dropped</l></div><l n="3">also kept</l></div></div></body>"#,
        );
        assert_eq!(kinds(&outcome), vec![DiagnosticKind::UnknownLevel]);
        let citations: Vec<_> = outcome.segments.iter().map(|s| s.citation.as_str()).collect();
        assert_eq!(citations, vec!["1.1", "1.3"]);
        assert_eq!(outcome.diagnostics[0].work_id.as_deref(), Some("iliad"));
    }

    #[test]
    fn test_invalid_locator() {
        let snapshot = snapshot_with(vec![iliad()]);
        let outcome = ingest_lines(&snapshot, "#work iliad\n1.x\tbad\n1.2\tgood\n");
        assert_eq!(kinds(&outcome), vec![DiagnosticKind::InvalidLocator]);
        assert_eq!(outcome.segments.len(), 1);
        assert_eq!(outcome.diagnostics[0].location.line, 2);
    }

    #[test]
    fn test_too_deep() {
        let snapshot = snapshot_with(vec![iliad()]);
        let outcome = ingest_lines(&snapshot, "#work iliad\n1.2.3\tdeep\n");
        assert_eq!(kinds(&outcome), vec![DiagnosticKind::UnexpectedNesting]);
        assert!(outcome.segments.is_empty());
    }

    #[test]
    fn test_duplicate_and_out_of_order() {
        let snapshot = snapshot_with(vec![iliad()]);
        let outcome = ingest_lines(
            &snapshot,
            "#work iliad\n1.2\ta\n1.2\tb\n1.1\tc\n1.3\td\n",
        );
        assert_eq!(
            kinds(&outcome),
            vec![
                DiagnosticKind::DuplicateCitation,
                DiagnosticKind::OutOfOrderCitation
            ]
        );
        let texts: Vec<_> = outcome.segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "d"]);
        assert_eq!(outcome.segments[1].ordinal, 1);
    }

    #[test]
    fn test_unknown_work_skipped() {
        let snapshot = snapshot_with(vec![iliad()]);
        let outcome = ingest_lines(
            &snapshot,
            "#work odyssey\n1.1\tἄνδρα μοι ἔννεπε\n#work iliad\n1.1\tμῆνιν\n",
        );
        assert_eq!(kinds(&outcome), vec![DiagnosticKind::UnknownWork]);
        assert_eq!(outcome.segments.len(), 1);
        assert_eq!(outcome.segments[0].work_id, "iliad");
    }

    #[test]
    fn test_work_owned_elsewhere() {
        let mut snapshot = snapshot_with(vec![]);
        let mut entry = WorkEntry::empty(Arc::new(iliad()));
        entry.owner = Some("other-doc".to_string());
        snapshot.works.insert("iliad".to_string(), Arc::new(entry));

        let outcome = ingest_lines(&snapshot, "#work iliad\n1.1\tμῆνιν\n");
        assert_eq!(kinds(&outcome), vec![DiagnosticKind::WorkOwnedElsewhere]);
        assert!(outcome.segments.is_empty());
    }

    #[test]
    fn test_text_directly_in_work() {
        let snapshot = snapshot_with(vec![iliad()]);
        let outcome = ingest_tei(
            &snapshot,
            r#"<body><div type="edition" n="iliad">stray<div subtype="book" n="1"><l n="1">x</l></div></div></body>"#,
        );
        assert_eq!(kinds(&outcome), vec![DiagnosticKind::TextOutsideCitation]);
        assert_eq!(outcome.segments.len(), 1);
    }

    #[test]
    fn test_malformed_markup_keeps_prefix() {
        let snapshot = snapshot_with(vec![iliad()]);
        let outcome = ingest_tei(
            &snapshot,
            r#"<body><div type="edition" n="iliad"><div subtype="book" n="1"><l n="1">kept</l><l n="2">cut</oops></div></div></body>"#,
        );
        assert_eq!(outcome.segments[0].text, "kept");
        assert!(kinds(&outcome).contains(&DiagnosticKind::MalformedMarkup));
    }

    #[test]
    fn test_alphanumeric_schema() {
        let republic = Work::new(
            "republic",
            "Plato",
            "Republic",
            Language::Greek,
            CitationSchema::new(vec![CitationLevel::new("page", LevelKind::Alphanumeric)]),
        );
        let snapshot = snapshot_with(vec![republic]);
        let outcome = ingest_lines(
            &snapshot,
            "#work republic\n327a\tκατέβην χθὲς εἰς Πειραιᾶ\n327b\tπροσευξόμενός τε τῇ θεῷ\n",
        );
        let citations: Vec<_> = outcome.segments.iter().map(|s| s.citation.as_str()).collect();
        assert_eq!(citations, vec!["327a", "327b"]);
    }
}
