//! Output formatting.
//!
//! Supports both human-readable terminal output and JSON for scripting.

use scriptorium_core::corpus::{CorpusStats, Work};
use scriptorium_core::search::{MatchSpan, RankedResult, SearchHit};
use scriptorium_core::xref::TokenCrossReferences;
use scriptorium_core::{IngestReport, SegmentView};
use serde::Serialize;

/// Maximum characters to show in a text snippet
const SNIPPET_MAX_LEN: usize = 200;

/// JSON output structure for search results
#[derive(Serialize)]
pub struct JsonSearchOutput<'a> {
    pub query: &'a str,
    pub terms: &'a [String],
    pub total_candidates: usize,
    pub results: Vec<JsonHit<'a>>,
}

/// One search hit in JSON format
#[derive(Serialize)]
pub struct JsonHit<'a> {
    pub work_id: &'a str,
    pub citation: &'a str,
    pub score: f32,
    pub lexical_score: f32,
    pub similarity: Option<f32>,
    pub surface_matches: usize,
    pub lemma_matches: usize,
    pub text: &'a str,
    pub matches: &'a [MatchSpan],
    pub cross_refs: &'a [TokenCrossReferences],
}

impl<'a> From<&'a SearchHit> for JsonHit<'a> {
    fn from(hit: &'a SearchHit) -> Self {
        Self {
            work_id: &hit.segment.work_id,
            citation: &hit.segment.citation,
            score: hit.score,
            lexical_score: hit.lexical_score,
            similarity: hit.similarity,
            surface_matches: hit.surface_matches,
            lemma_matches: hit.lemma_matches,
            text: &hit.segment.text,
            matches: &hit.spans,
            cross_refs: &hit.cross_refs,
        }
    }
}

/// Segment lookup in JSON format
#[derive(Serialize)]
pub struct JsonSegment<'a> {
    pub work_id: &'a str,
    pub citation: &'a str,
    pub ordinal: u64,
    pub document_id: &'a str,
    pub text: &'a str,
    pub tokens: Vec<JsonToken<'a>>,
    pub cross_refs: &'a [TokenCrossReferences],
}

#[derive(Serialize)]
pub struct JsonToken<'a> {
    pub surface: &'a str,
    pub lemma: Option<&'a str>,
    pub morphology: Option<&'a str>,
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// Formats search results as JSON.
pub fn format_search_json(query: &str, result: &RankedResult) -> String {
    to_json(&JsonSearchOutput {
        query,
        terms: &result.terms,
        total_candidates: result.total_candidates,
        results: result.hits.iter().map(JsonHit::from).collect(),
    })
}

/// Formats search results for human-readable terminal output.
pub fn format_search_human(query: &str, result: &RankedResult) -> String {
    if result.is_empty() {
        return format!("No results found for \"{}\"", query);
    }

    let mut output = String::new();
    output.push_str(&format!(
        "Found {} segment{} for \"{}\"",
        result.total_candidates,
        if result.total_candidates == 1 { "" } else { "s" },
        query
    ));
    if result.len() < result.total_candidates {
        output.push_str(&format!(" (showing {})", result.len()));
    }
    output.push_str(":\n\n");

    for (i, hit) in result.hits.iter().enumerate() {
        output.push_str(&format!(
            "{}. {} {} (score: {:.2})\n",
            i + 1,
            hit.segment.work_id,
            hit.segment.citation,
            hit.score
        ));

        let mut score_parts = vec![format!("lexical: {:.2}", hit.lexical_score)];
        if let Some(similarity) = hit.similarity {
            score_parts.push(format!("similarity: {:.2}", similarity));
        }
        score_parts.push(format!(
            "{} surface, {} lemma",
            hit.surface_matches, hit.lemma_matches
        ));
        output.push_str(&format!("   [{}]\n", score_parts.join(", ")));
        output.push_str(&format!(
            "   {}\n",
            truncate_text(&highlight(&hit.segment.text, &hit.spans), SNIPPET_MAX_LEN)
        ));

        for refs in &hit.cross_refs {
            output.push_str(&format_cross_refs(hit, refs));
        }
        output.push('\n');
    }

    output.trim_end().to_string()
}

fn format_cross_refs(hit: &SearchHit, refs: &TokenCrossReferences) -> String {
    let surface = hit
        .segment
        .tokens
        .get(refs.token_index)
        .map(|t| t.surface.as_str())
        .unwrap_or("?");
    let mut parts: Vec<String> = refs
        .lexicon
        .iter()
        .map(|e| format!("{}: {}", e.headword.as_deref().unwrap_or(&e.lemma), e.definition))
        .collect();
    parts.extend(refs.grammar.iter().map(|g| match &g.section {
        Some(section) => format!("{} ({})", g.title, section),
        None => g.title.clone(),
    }));
    format!("   > {}: {}\n", surface, parts.join("; "))
}

/// Wraps matched spans in `[...]`.
fn highlight(text: &str, spans: &[MatchSpan]) -> String {
    let mut out = String::with_capacity(text.len() + spans.len() * 2);
    let mut cursor = 0;
    for span in spans {
        if span.start < cursor || span.end > text.len() {
            continue;
        }
        out.push_str(&text[cursor..span.start]);
        out.push('[');
        out.push_str(&text[span.start..span.end]);
        out.push(']');
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Formats a segment lookup.
pub fn format_segment(view: &SegmentView, json: bool) -> String {
    let segment = &view.segment;
    if json {
        return to_json(&JsonSegment {
            work_id: &segment.work_id,
            citation: &segment.citation,
            ordinal: segment.ordinal,
            document_id: &segment.document_id,
            text: &segment.text,
            tokens: segment
                .tokens
                .iter()
                .filter(|t| t.is_word())
                .map(|t| JsonToken {
                    surface: &t.surface,
                    lemma: t.lemma.as_deref(),
                    morphology: t.morphology.as_deref(),
                })
                .collect(),
            cross_refs: &view.cross_refs,
        });
    }

    let mut output = format!("{} {}\n{}\n", segment.work_id, segment.citation, segment.text);
    let annotated: Vec<String> = segment
        .tokens
        .iter()
        .filter_map(|t| {
            t.lemma.as_ref().map(|lemma| match &t.morphology {
                Some(tag) => format!("  {} → {} ({})", t.surface, lemma, tag),
                None => format!("  {} → {}", t.surface, lemma),
            })
        })
        .collect();
    if !annotated.is_empty() {
        output.push('\n');
        output.push_str(&annotated.join("\n"));
        output.push('\n');
    }
    output.trim_end().to_string()
}

/// Formats an ingest report.
pub fn format_report(report: &IngestReport, json: bool) -> String {
    if json {
        return to_json(report);
    }
    let mut output = format!(
        "{}: {:?}, {} segment{} in {}",
        report.document_id,
        report.status,
        report.segments,
        if report.segments == 1 { "" } else { "s" },
        if report.works.is_empty() {
            "no works".to_string()
        } else {
            report.works.join(", ")
        }
    );
    if report.annotation.annotated() + report.annotation.unresolved > 0 {
        output.push_str(&format!(
            "\n  tokens: {} inline, {} lemmatized, {} unresolved",
            report.annotation.inline, report.annotation.lemmatized, report.annotation.unresolved
        ));
    }
    if !report.diagnostics.is_empty() {
        output.push_str(&format!("\n  {} diagnostics:", report.diagnostics.len()));
        for diagnostic in &report.diagnostics {
            output.push_str(&format!("\n    {}", diagnostic));
        }
    }
    output
}

/// Formats the list of registered works.
pub fn format_works(works: &[Work], json: bool) -> String {
    if json {
        return to_json(&works);
    }
    if works.is_empty() {
        return "No works registered".to_string();
    }
    works
        .iter()
        .map(|w| {
            format!(
                "{}\t{}\t{}\t{}",
                w.id,
                w.language,
                w.schema.describe(),
                if w.author.is_empty() {
                    w.title.clone()
                } else {
                    format!("{}, {}", w.author, w.title)
                }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Formats corpus statistics.
pub fn format_stats(stats: &CorpusStats, json: bool) -> String {
    if json {
        return to_json(stats);
    }
    format!(
        "works: {}\ndocuments: {}\nsegments: {}\ntokens: {}",
        stats.works, stats.documents, stats.segments, stats.tokens
    )
}

/// Truncates text to a maximum length, adding ellipsis if needed.
fn truncate_text(text: &str, max_len: usize) -> String {
    let text = text.trim();
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let truncated = &text[..end];
    match truncated.rfind(' ') {
        Some(last_space) => format!("{}...", &truncated[..last_space]),
        None => format!("{}...", truncated),
    }
}
