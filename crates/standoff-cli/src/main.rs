//! Standoff CLI - Command-line interface
//!
//! Usage:
//!   standoff stats <corpus>
//!   standoff validate <corpus> [--strip]
//!   standoff merge <first> <second> <output> [--policy "*=ALL,Gene=EXACT"]
//!   standoff crop <file.ann> <start> <end> <output>
//!   standoff relations <corpus> --pair Protein:Entity [--negatives auto]
//!   standoff labels <corpus> [--scheme bio] [--lines]

use std::collections::HashMap;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use standoff_core::{
    AnnotationKind, DistanceThreshold, Document, KitConfig, LabelScheme, LoggingConfig,
    MergePolicy, NegativeSampling, RelationOptions, RelationRow, Span,
};
use standoff_corpus::{save_documents, CorpusReader};
use standoff_extractor::{LabelSequenceGenerator, LineSplitter};

#[derive(Parser)]
#[command(name = "standoff")]
#[command(about = "Standoff annotation corpus toolkit")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (overrides configuration)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CorpusArgs {
    /// Corpus directory
    path: PathBuf,

    /// Also read sub-directories
    #[arg(long)]
    recursive: bool,

    /// Skip documents that fail to read
    #[arg(long)]
    skip_errors: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Count documents and annotations per kind
    Stats {
        #[command(flatten)]
        corpus: CorpusArgs,
    },
    /// Check entity contents against document texts
    Validate {
        #[command(flatten)]
        corpus: CorpusArgs,

        /// Ignore surrounding whitespace
        #[arg(long)]
        strip: bool,
    },
    /// Merge two annotation layers of the same texts
    Merge {
        /// Corpus with the first layer
        first: PathBuf,
        /// Corpus with the second layer
        second: PathBuf,
        /// Output directory (emptied first)
        output: PathBuf,

        /// Merge entities only, per type, e.g. "*=ALL,Gene=EXACT"
        #[arg(long)]
        policy: Option<String>,
    },
    /// Cut a document down to a char range
    Crop {
        /// Annotation file
        file: PathBuf,
        start: usize,
        end: usize,
        /// Output directory
        output: PathBuf,
    },
    /// Emit entity-pair relation rows as JSON lines
    Relations {
        #[command(flatten)]
        corpus: CorpusArgs,

        /// Entity type pair FIRST:SECOND (repeatable)
        #[arg(long = "pair", required = true, value_parser = parse_pair)]
        pairs: Vec<(String, String)>,

        /// Negative rows: all, auto or a count
        #[arg(long, value_parser = parse_negatives)]
        negatives: Option<NegativeSampling>,

        /// Drop negative pairs spanning more chars than this
        #[arg(long)]
        max_distance: Option<usize>,

        /// Sampling seed
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Emit token label sequences in two-column format
    Labels {
        #[command(flatten)]
        corpus: CorpusArgs,

        /// Label scheme: plain or bio
        #[arg(long)]
        scheme: Option<String>,

        /// Use lines instead of sentences as blocks
        #[arg(long)]
        lines: bool,

        /// Only label these entity types (repeatable)
        #[arg(long = "filter")]
        filter_labels: Vec<String>,
    },
}

fn parse_pair(value: &str) -> Result<(String, String), String> {
    match value.split_once(':') {
        Some((first, second)) if !first.is_empty() && !second.is_empty() => {
            Ok((first.to_string(), second.to_string()))
        }
        _ => Err(format!("expected FIRST:SECOND, got '{value}'")),
    }
}

fn parse_negatives(value: &str) -> Result<NegativeSampling, String> {
    value.parse().map_err(|e: standoff_core::StandoffError| e.to_string())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    init_tracing(&config.logging);

    match cli.command {
        Commands::Stats { corpus } => stats(&corpus_reader(&corpus, &config)),
        Commands::Validate { corpus, strip } => {
            let reader = corpus_reader(&corpus, &config);
            let checked = reader.validate(strip || config.corpus.strip_content)?;
            println!("{checked} documents valid");
            Ok(())
        }
        Commands::Merge {
            first,
            second,
            output,
            policy,
        } => {
            let policy = policy.as_deref().map(MergePolicy::parse).transpose()?;
            merge(&first, &second, &output, policy.as_ref(), &config)
        }
        Commands::Crop {
            file,
            start,
            end,
            output,
        } => crop(&file, start, end, &output),
        Commands::Relations {
            corpus,
            pairs,
            negatives,
            max_distance,
            seed,
        } => {
            let mut options = RelationOptions::from_config(pairs, &config.relations);
            if let Some(negatives) = negatives {
                options = options.with_negatives(negatives);
            }
            if let Some(distance) = max_distance {
                options = options.with_distance_threshold(DistanceThreshold::Uniform(distance));
            }
            if let Some(seed) = seed {
                options = options.with_seed(seed);
            }
            relations(&corpus_reader(&corpus, &config), &options)
        }
        Commands::Labels {
            corpus,
            scheme,
            lines,
            filter_labels,
        } => {
            if let Some(scheme) = scheme {
                config.labeling.scheme = scheme.parse::<LabelScheme>()?;
            }
            if !filter_labels.is_empty() {
                config.labeling.filter_labels = Some(filter_labels);
            }
            let mut generator = LabelSequenceGenerator::from_config(&config.labeling);
            if lines {
                generator = generator.with_splitter(LineSplitter);
            }
            labels(&corpus_reader(&corpus, &config), &generator)
        }
    }
}

// ============================================================================
// Setup
// ============================================================================

fn load_config(path: Option<&Path>) -> anyhow::Result<KitConfig> {
    let config = match path {
        Some(path) => KitConfig::from_file(path)?.with_env_override()?,
        None => KitConfig::from_env()?,
    };
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn corpus_reader(args: &CorpusArgs, config: &KitConfig) -> CorpusReader {
    CorpusReader::new(&args.path)
        .recursive(args.recursive || config.corpus.recursive)
        .skip_errors(args.skip_errors || config.corpus.skip_errors)
}

fn progress_bar(len: usize) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?;
    pb.set_style(style.progress_chars("#>-"));
    Ok(pb)
}

// ============================================================================
// Commands
// ============================================================================

fn stats(reader: &CorpusReader) -> anyhow::Result<()> {
    let mut documents = 0;
    let mut counts: HashMap<AnnotationKind, usize> = HashMap::new();

    for doc in reader.iter_documents()? {
        let doc = doc?;
        documents += 1;
        for kind in AnnotationKind::ALL {
            *counts.entry(kind).or_default() += doc.count(kind);
        }
    }

    println!("documents\t{documents}");
    for kind in AnnotationKind::ALL {
        println!("{}\t{}", kind.plural(), counts.get(&kind).copied().unwrap_or(0));
    }
    Ok(())
}

fn merge(
    first: &Path,
    second: &Path,
    output: &Path,
    policy: Option<&MergePolicy>,
    config: &KitConfig,
) -> anyhow::Result<()> {
    let read = |path: &Path| CorpusReader::from_config(path, &config.corpus).documents();
    let first_docs = read(first).with_context(|| format!("reading {}", first.display()))?;
    let mut second_docs: HashMap<String, Document> = read(second)
        .with_context(|| format!("reading {}", second.display()))?
        .into_iter()
        .map(|doc| (doc.uid.clone(), doc))
        .collect();

    let mut merged = Vec::with_capacity(first_docs.len());
    for doc in &first_docs {
        let Some(other) = second_docs.remove(&doc.uid) else {
            tracing::warn!("No second layer for {}, skipping", doc.uid);
            continue;
        };
        let combined = match policy {
            Some(policy) => Document::merge_entity_layers(doc, &other, policy)?,
            None => Document::from_pair(doc, &other)?,
        };
        merged.push(combined);
    }
    for uid in second_docs.keys() {
        tracing::warn!("No first layer for {}, skipping", uid);
    }

    let written = save_documents(&merged, output)?;
    println!("{written} documents merged into {}", output.display());
    Ok(())
}

fn crop(file: &Path, start: usize, end: usize, output: &Path) -> anyhow::Result<()> {
    let Some(span) = Span::checked(start, end) else {
        bail!("crop start {start} exceeds end {end}");
    };
    let root = file.parent().unwrap_or_else(|| Path::new("."));
    let doc = CorpusReader::new(root).read_document(file)?;
    let cropped = doc.crop(span);

    std::fs::create_dir_all(output).with_context(|| format!("creating {}", output.display()))?;
    cropped.save(output.join(&cropped.uid))?;
    println!(
        "{} annotations of {} kept in {}",
        cropped.len(),
        doc.len(),
        cropped.uid
    );
    Ok(())
}

#[derive(Serialize)]
struct RelationLine<'a> {
    document: &'a str,
    #[serde(flatten)]
    row: &'a RelationRow,
}

fn relations(reader: &CorpusReader, options: &RelationOptions) -> anyhow::Result<()> {
    let documents = reader.iter_documents()?;
    let pb = progress_bar(documents.remaining())?;
    let mut out = BufWriter::new(io::stdout().lock());
    let mut total = 0;

    for doc in documents {
        let doc = doc?;
        pb.set_message(doc.uid.clone());
        for row in doc.relation_rows(options)? {
            let line = RelationLine {
                document: &doc.uid,
                row: &row,
            };
            writeln!(out, "{}", serde_json::to_string(&line)?)?;
            total += 1;
        }
        pb.inc(1);
    }

    out.flush()?;
    pb.finish_and_clear();
    tracing::info!("Wrote {} relation rows", total);
    Ok(())
}

fn labels(reader: &CorpusReader, generator: &LabelSequenceGenerator) -> anyhow::Result<()> {
    let documents = reader.documents()?;
    let pb = progress_bar(documents.len())?;
    let mut out = BufWriter::new(io::stdout().lock());

    let mut misaligned = 0;
    for labels in generator.transform_documents_with_progress(&documents, |done| pb.set_position(done as u64)) {
        misaligned += labels.blocks.iter().map(|b| b.misaligned.len()).sum::<usize>();
        writeln!(out, "# {}", labels.uid)?;
        write!(out, "{}", labels.to_conll())?;
    }

    out.flush()?;
    pb.finish_and_clear();
    if misaligned > 0 {
        tracing::warn!("{} entities were not aligned with token boundaries", misaligned);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pair() {
        assert_eq!(
            parse_pair("Protein:Entity").unwrap(),
            ("Protein".to_string(), "Entity".to_string())
        );
        assert!(parse_pair("Protein").is_err());
        assert!(parse_pair(":Entity").is_err());
    }

    #[test]
    fn test_parse_negatives() {
        assert_eq!(parse_negatives("auto").unwrap(), NegativeSampling::Auto);
        assert_eq!(parse_negatives("3").unwrap(), NegativeSampling::Limit(3));
        assert!(parse_negatives("many").is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "standoff",
            "relations",
            "corpus",
            "--pair",
            "Protein:Entity",
            "--pair",
            "Entity:Protein",
            "--negatives",
            "auto",
            "--seed",
            "4",
        ])
        .unwrap();
        match cli.command {
            Commands::Relations {
                corpus,
                pairs,
                negatives,
                seed,
                ..
            } => {
                assert_eq!(corpus.path, PathBuf::from("corpus"));
                assert_eq!(pairs.len(), 2);
                assert_eq!(negatives, Some(NegativeSampling::Auto));
                assert_eq!(seed, Some(4));
            }
            _ => panic!("expected relations command"),
        }

        assert!(Cli::try_parse_from(["standoff", "relations", "corpus"]).is_err());
    }
}
