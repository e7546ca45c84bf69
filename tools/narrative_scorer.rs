//! Narrative Scorer — scores narratives against their cue dictionaries and a
//! mismatch baseline from the other cues.
//!
//! Usage: narrative_scorer --embeddings <vectors.txt> --narratives <narratives.ron>
//!        [--config <config.ron>] [--stopwords <file>] [--lemmas <file>]
//!        [--cache <cache.ron>] [--output <scores.tsv>] [--dictionaries <dictionaries.tsv>]
use schema_scorer::core::export::{save_dictionary_table, save_score_table};
use schema_scorer::core::pipeline::SchemaPipeline;
use schema_scorer::core::processor::{load_lemma_table, load_word_list, TableProcessor};
use schema_scorer::schema::narrative::{load_records_from_ron, normalize_cue, Corpus};
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: narrative_scorer --embeddings <vectors.txt> --narratives <narratives.ron> \
[--config <config.ron>] [--stopwords <file>] [--lemmas <file>] [--cache <cache.ron>] \
[--output <scores.tsv>] [--dictionaries <dictionaries.tsv>]";

#[derive(Default)]
struct Args {
    embeddings: Option<String>,
    narratives: Option<String>,
    config: Option<String>,
    stopwords: Option<String>,
    lemmas: Option<String>,
    cache: Option<String>,
    output: Option<String>,
    dictionaries: Option<String>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        if flag == "--help" || flag == "-h" {
            println!("{}", USAGE);
            process::exit(0);
        }
        let value = args.get(i + 1).cloned().unwrap_or_else(|| {
            eprintln!("Error: {} needs a value", flag);
            process::exit(1);
        });
        let slot = match flag {
            "--embeddings" => &mut parsed.embeddings,
            "--narratives" => &mut parsed.narratives,
            "--config" => &mut parsed.config,
            "--stopwords" => &mut parsed.stopwords,
            "--lemmas" => &mut parsed.lemmas,
            "--cache" => &mut parsed.cache,
            "--output" => &mut parsed.output,
            "--dictionaries" => &mut parsed.dictionaries,
            other => {
                eprintln!("Unknown argument: {}", other);
                process::exit(1);
            }
        };
        *slot = Some(value);
        i += 2;
    }
    parsed
}

fn fail(message: String) -> ! {
    eprintln!("Error: {}", message);
    process::exit(1);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = parse_args();
    let embeddings = args.embeddings.clone().unwrap_or_else(|| {
        eprintln!("{}", USAGE);
        fail("--embeddings is required".to_string())
    });
    let narratives_path = args.narratives.clone().unwrap_or_else(|| {
        eprintln!("{}", USAGE);
        fail("--narratives is required".to_string())
    });
    let output = args.output.clone().unwrap_or_else(|| "scores.tsv".to_string());

    let mut builder = SchemaPipeline::builder().embeddings_path(&embeddings);
    if let Some(ref path) = args.config {
        builder = builder.config_path(path);
    }
    if let Some(ref path) = args.cache {
        builder = builder.dictionary_cache_path(path);
    }
    let pipeline = builder.build().unwrap_or_else(|e| fail(e.to_string()));

    let records = load_records_from_ron(Path::new(&narratives_path))
        .unwrap_or_else(|e| fail(format!("reading '{}': {}", narratives_path, e)));

    let mut processor = TableProcessor::new();
    if let Some(ref path) = args.stopwords {
        let words = load_word_list(Path::new(path))
            .unwrap_or_else(|e| fail(format!("reading stopwords '{}': {}", path, e)));
        processor = processor.with_stopwords(words);
    }
    if let Some(ref path) = args.lemmas {
        let pairs = load_lemma_table(Path::new(path))
            .unwrap_or_else(|e| fail(format!("reading lemmas '{}': {}", path, e)));
        processor = processor.with_lemmas(pairs);
    }
    if pipeline.config().filter_cue_words {
        processor = processor.with_cue_words(records.iter().map(|r| normalize_cue(&r.cue)));
    }

    let corpus = Corpus::from_records(&records, &processor);
    println!(
        "Scoring {} narratives over {} cues...",
        corpus.len(),
        corpus.cues().len()
    );

    let report = pipeline.run(&corpus).unwrap_or_else(|e| fail(e.to_string()));

    let scores = report.records(&corpus);
    if let Err(e) = save_score_table(&scores, Path::new(&output)) {
        fail(format!("writing scores to '{}': {}", output, e));
    }
    println!("Wrote {} score rows to '{}'", scores.len(), output);

    if let Some(ref path) = args.dictionaries {
        let rows = pipeline.config().num_similar_words;
        if let Err(e) = save_dictionary_table(&report.dictionaries, rows, Path::new(path)) {
            fail(format!("writing dictionaries to '{}': {}", path, e));
        }
        println!("Wrote dictionaries to '{}'", path);
    }

    if let Some(ref path) = args.cache {
        if report.newly_built > 0 || !Path::new(path).exists() {
            if let Err(e) = report.dictionaries.save_ron(Path::new(path)) {
                fail(format!("saving cache to '{}': {}", path, e));
            }
            println!(
                "Cache saved to '{}' ({} new dictionaries)",
                path, report.newly_built
            );
        }
    }

    for failure in &report.cue_failures {
        eprintln!("ERROR: cue '{}': {}", failure.cue, failure.error);
    }
    let failed = report.failed_narratives().count();
    if failed > 0 {
        eprintln!("{} narrative(s) could not be scored", failed);
        process::exit(2);
    }
}
