//! Subcommand implementations.
//!
//! Every command opens the redb corpus in the data directory, wires in the
//! reference tables named by the config file, and runs one engine operation.

use crate::config::{self, CliConfig};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use scriptorium_core::annotation::{LemmaAnalysis, Lemmatizer, TableLemmatizer};
use scriptorium_core::citation::{CitationLevel, CitationSchema, LevelKind, DEFAULT_SEPARATOR};
use scriptorium_core::corpus::{CorpusStats, Work};
use scriptorium_core::error::UpstreamError;
use scriptorium_core::markup::{CitedLinesAdapter, SourceAdapter, TeiAdapter};
use scriptorium_core::search::{Query, RankedResult};
use scriptorium_core::storage::RedbBackend;
use scriptorium_core::text::Language;
use scriptorium_core::xref::CrossReferenceResolver;
use scriptorium_core::{CorpusEngine, IngestReport, SegmentView};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub type Engine = CorpusEngine<RedbBackend>;

/// Lemma tables for several languages behind one lemmatizer.
struct LemmaTables(Vec<TableLemmatizer>);

#[async_trait]
impl Lemmatizer for LemmaTables {
    async fn lemmatize(
        &self,
        surface: &str,
        language: Language,
    ) -> Result<Option<LemmaAnalysis>, UpstreamError> {
        for table in &self.0 {
            if let Some(analysis) = table.lemmatize(surface, language).await? {
                return Ok(Some(analysis));
            }
        }
        Ok(None)
    }
}

/// Opens the corpus and attaches the configured reference tables.
pub async fn open_engine(data_dir: Option<&PathBuf>, config: &CliConfig) -> Result<Engine> {
    let db_path = config::database_path(data_dir)?;
    info!("Opening database: {}", db_path.display());
    let backend = RedbBackend::open(&db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

    let mut engine = CorpusEngine::open(backend, config.engine.clone())
        .await
        .context("Failed to open corpus")?;

    if !config.lemma_tables.is_empty() {
        let mut tables = Vec::new();
        for table in &config.lemma_tables {
            let content = config::read_reference(&table.path)?;
            let lemmatizer = TableLemmatizer::from_tsv(&content, table.language)
                .with_context(|| format!("Invalid lemma table: {}", table.path.display()))?;
            info!(
                "Loaded {} lemmata for {} from {}",
                lemmatizer.len(),
                table.language,
                table.path.display()
            );
            tables.push(lemmatizer);
        }
        engine = engine.with_lemmatizer(Arc::new(LemmaTables(tables)));
    }

    if config.lexicon.is_some() || config.grammar.is_some() {
        let lexicon = match &config.lexicon {
            Some(path) => config::read_reference(path)?,
            None => "[]".to_string(),
        };
        let grammar = match &config.grammar {
            Some(path) => config::read_reference(path)?,
            None => "[]".to_string(),
        };
        let resolver = CrossReferenceResolver::from_json(&lexicon, &grammar)
            .context("Invalid reference tables")?;
        info!(
            "Loaded {} lexicon entries and {} grammar references",
            resolver.lexicon_size(),
            resolver.grammar_size()
        );
        engine = engine.with_cross_references(resolver);
    }

    Ok(engine)
}

/// Arguments of `work add`.
pub struct NewWork {
    pub id: String,
    pub language: String,
    pub levels: Vec<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub separator: Option<char>,
}

impl NewWork {
    fn into_work(self) -> Result<Work> {
        if self.levels.is_empty() {
            return Err(anyhow!("At least one citation level is required"));
        }
        let language = parse_language(&self.language)?;
        let levels = self
            .levels
            .iter()
            .map(|level| parse_level(level))
            .collect::<Result<Vec<_>>>()?;
        let schema = CitationSchema::new(levels)
            .with_separator(self.separator.unwrap_or(DEFAULT_SEPARATOR));
        Ok(Work::new(
            self.id.clone(),
            self.author.unwrap_or_default(),
            self.title.unwrap_or(self.id),
            language,
            schema,
        ))
    }
}

/// Parses `name` or `name:kind`, where kind is `numeric` (default),
/// `alphabetic` or `alphanumeric`.
fn parse_level(level: &str) -> Result<CitationLevel> {
    let (name, kind) = match level.split_once(':') {
        Some((name, kind)) => (name.trim(), kind.trim()),
        None => (level.trim(), "numeric"),
    };
    if name.is_empty() {
        return Err(anyhow!("Citation level '{}' has no name", level));
    }
    let kind = match kind.to_ascii_lowercase().as_str() {
        "numeric" | "num" => LevelKind::numeric(),
        "alphabetic" | "alpha" => LevelKind::Alphabetic,
        "alphanumeric" | "alnum" => LevelKind::Alphanumeric,
        other => {
            return Err(anyhow!(
                "Unknown kind '{}' for level '{}' (expected numeric, alphabetic or alphanumeric)",
                other,
                name
            ))
        }
    };
    Ok(CitationLevel::new(name, kind))
}

fn parse_language(code: &str) -> Result<Language> {
    Language::parse_code(code).ok_or_else(|| {
        anyhow!(
            "Unknown language '{}' (expected grc, la or generic)",
            code.trim()
        )
    })
}

pub async fn add_work(engine: &Engine, new_work: NewWork) -> Result<Work> {
    let work = new_work.into_work()?;
    engine
        .register_work(work.clone())
        .await
        .with_context(|| format!("Failed to register work '{}'", work.id))?;
    Ok(work)
}

pub fn list_works(engine: &Engine) -> Result<Vec<Work>> {
    Ok(engine.works()?)
}

/// Markup format of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SourceFormat {
    Tei,
    Lines,
}

impl SourceFormat {
    /// `.xml` files are TEI, everything else cited lines.
    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("xml") => SourceFormat::Tei,
            _ => SourceFormat::Lines,
        }
    }

    fn adapter(self) -> Box<dyn SourceAdapter> {
        match self {
            SourceFormat::Tei => Box::new(TeiAdapter::new()),
            SourceFormat::Lines => Box::new(CitedLinesAdapter::new()),
        }
    }
}

pub async fn ingest(
    engine: &Engine,
    path: &Path,
    document_id: Option<String>,
    format: Option<SourceFormat>,
) -> Result<IngestReport> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let document_id = document_id.unwrap_or_else(|| path.display().to_string());
    let adapter = format.unwrap_or_else(|| SourceFormat::detect(path)).adapter();
    let report = engine
        .ingest(&document_id, &content, adapter.as_ref())
        .await
        .with_context(|| format!("Failed to ingest {}", path.display()))?;
    Ok(report)
}

pub async fn retract(engine: &Engine, document_id: &str) -> Result<bool> {
    Ok(engine.retract(document_id).await?.is_some())
}

pub fn get(engine: &Engine, work_id: &str, citation: &str) -> Result<SegmentView> {
    engine
        .get_segment(work_id, citation)?
        .ok_or_else(|| anyhow!("No text at {} {}", work_id, citation))
}

pub async fn search(
    engine: &Engine,
    text: &str,
    limit: usize,
    work: Option<String>,
    language: Option<String>,
) -> Result<RankedResult> {
    let language = language.as_deref().map(parse_language).transpose()?;
    let query = Query {
        text: text.to_string(),
        language,
        limit: Some(limit),
        work_id: work,
    };
    Ok(engine.search(&query).await?)
}

pub fn stats(engine: &Engine) -> Result<CorpusStats> {
    Ok(engine.stats()?)
}
