//! Dictionary Builder — ranks the vocabulary against each cue and exports the
//! per-cue dictionaries for inspection.
//!
//! Usage: dictionary_builder --embeddings <vectors.txt> --cues <cue,cue,...|cues.txt>
//!        [--config <config.ron>] [--output <dictionaries.tsv>] [--cache <cache.ron>]
use schema_scorer::core::export::save_dictionary_table;
use schema_scorer::core::pipeline::SchemaPipeline;
use schema_scorer::core::processor::load_word_list;
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: dictionary_builder --embeddings <vectors.txt> --cues <cue,cue,...|cues.txt> \
[--config <config.ron>] [--output <dictionaries.tsv>] [--cache <cache.ron>]";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut embeddings = None;
    let mut cues_arg = None;
    let mut config = None;
    let mut output = "dictionaries.tsv".to_string();
    let mut cache = None;

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
        match flag {
            "--embeddings" => embeddings = Some(value),
            "--cues" => cues_arg = Some(value),
            "--config" => config = Some(value),
            "--output" => output = value,
            "--cache" => cache = Some(value),
            other => {
                eprintln!("Unknown argument: {}", other);
                process::exit(1);
            }
        }
        i += 2;
    }

    let embeddings = embeddings.unwrap_or_else(|| {
        eprintln!("Error: --embeddings is required");
        eprintln!("{}", USAGE);
        process::exit(1);
    });
    let cues_arg = cues_arg.unwrap_or_else(|| {
        eprintln!("Error: --cues is required");
        eprintln!("{}", USAGE);
        process::exit(1);
    });

    let cues: Vec<String> = if Path::new(&cues_arg).is_file() {
        load_word_list(Path::new(&cues_arg)).unwrap_or_else(|e| {
            eprintln!("Error reading cue file '{}': {}", cues_arg, e);
            process::exit(1);
        })
    } else {
        cues_arg
            .split(',')
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect()
    };

    let mut builder = SchemaPipeline::builder().embeddings_path(&embeddings);
    if let Some(ref path) = config {
        builder = builder.config_path(path);
    }
    if let Some(ref path) = cache {
        builder = builder.dictionary_cache_path(path);
    }
    let pipeline = builder.build().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        process::exit(1);
    });

    println!("Building dictionaries for {} cues...", cues.len());
    let (dictionaries, failures) = pipeline.build_dictionaries(&cues).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        process::exit(1);
    });

    let rows = pipeline.config().num_similar_words;
    if let Err(e) = save_dictionary_table(&dictionaries, rows, Path::new(&output)) {
        eprintln!("Error writing dictionaries to '{}': {}", output, e);
        process::exit(1);
    }
    println!("Wrote {} dictionaries to '{}'", dictionaries.len(), output);

    if let Some(ref path) = cache {
        if let Err(e) = dictionaries.save_ron(Path::new(path)) {
            eprintln!("Error saving cache to '{}': {}", path, e);
            process::exit(1);
        }
        println!("Cache saved to '{}'", path);
    }

    if !failures.is_empty() {
        for failure in &failures {
            eprintln!("ERROR: cue '{}': {}", failure.cue, failure.error);
        }
        eprintln!("{} cue(s) need a different word choice", failures.len());
        process::exit(2);
    }
}
