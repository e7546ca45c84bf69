//! Tab-separated exports for dictionary inspection and narrative scores.

use std::io::Write;
use std::path::Path;
use thiserror::Error;

use crate::core::dictionary::DictionaryCache;
use crate::schema::score::ScoreRecord;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub const SCORE_HEADER: [&str; 7] = [
    "Subject",
    "Trial",
    "Cue",
    "nonStopwordWordCount",
    "schemaWordsCount",
    "schemaWordsIdentified",
    "schemaMismatchCount",
];

fn tsv_writer<W: Write>(out: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .flexible(false)
        .from_writer(out)
}

/// One column per cue (sorted), ranked words down the rows, at most `rows`
/// deep. Shorter columns are padded with empty cells.
pub fn write_dictionary_table<W: Write>(
    cache: &DictionaryCache,
    rows: usize,
    out: W,
) -> Result<(), ExportError> {
    let mut writer = tsv_writer(out);
    let columns: Vec<Vec<&str>> = cache
        .dictionaries()
        .map(|d| d.truncate(rows).iter().map(|e| e.word.as_str()).collect())
        .collect();

    writer.write_record(cache.cues())?;

    let depth = columns.iter().map(Vec::len).max().unwrap_or(0);
    for row in 0..depth {
        writer.write_record(
            columns
                .iter()
                .map(|column| column.get(row).copied().unwrap_or("")),
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Unscored rows leave the count and word cells empty and write `NaN`.
pub fn write_score_table<W: Write>(records: &[ScoreRecord], out: W) -> Result<(), ExportError> {
    let mut writer = tsv_writer(out);
    writer.write_record(SCORE_HEADER)?;
    for record in records {
        writer.write_record([
            record.subject.to_string(),
            record.trial.to_string(),
            record.cue.clone(),
            record.non_stopword_word_count.to_string(),
            record
                .schema_words_count
                .map(|count| count.to_string())
                .unwrap_or_default(),
            record.schema_words_identified.clone(),
            format_mismatch(record.schema_mismatch_count),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn format_mismatch(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else {
        value.to_string()
    }
}

pub fn save_dictionary_table(
    cache: &DictionaryCache,
    rows: usize,
    path: &Path,
) -> Result<(), ExportError> {
    let file = std::fs::File::create(path)?;
    write_dictionary_table(cache, rows, std::io::BufWriter::new(file))
}

pub fn save_score_table(records: &[ScoreRecord], path: &Path) -> Result<(), ExportError> {
    let file = std::fs::File::create(path)?;
    write_score_table(records, std::io::BufWriter::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dictionary::DictionaryCacheBuilder;
    use crate::core::embedding::EmbeddingStore;
    use crate::core::ranker::SimilarityRanker;

    #[test]
    fn dictionary_table_has_one_column_per_cue() {
        let store = EmbeddingStore::from_entries(vec![
            ("beach", vec![1.0, 0.0]),
            ("forest", vec![0.0, 1.0]),
            ("sand", vec![0.9, 0.2]),
        ])
        .unwrap();
        let mut builder = DictionaryCacheBuilder::new(SimilarityRanker::new(&store), 2);
        builder.build_all(["forest", "beach"]).unwrap();
        let (cache, _) = builder.finish();

        let mut buf = Vec::new();
        write_dictionary_table(&cache, 2, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["beach\tforest", "beach\tforest", "sand\tsand"]);
    }

    #[test]
    fn score_table_writes_nan_sentinel() {
        let records = vec![ScoreRecord {
            subject: 3,
            trial: 1,
            cue: "beach".to_string(),
            non_stopword_word_count: 4,
            schema_words_count: Some(3),
            schema_words_identified: "sand wave sand".to_string(),
            schema_mismatch_count: f64::NAN,
        }];

        let mut buf = Vec::new();
        write_score_table(&records, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], SCORE_HEADER.join("\t"));
        assert_eq!(lines[1], "3\t1\tbeach\t4\t3\tsand wave sand\tNaN");
    }

    #[test]
    fn unscored_rows_have_empty_score_cells() {
        let records = vec![ScoreRecord {
            subject: 8,
            trial: 2,
            cue: "volcano".to_string(),
            non_stopword_word_count: 2,
            schema_words_count: None,
            schema_words_identified: String::new(),
            schema_mismatch_count: f64::NAN,
        }];

        let mut buf = Vec::new();
        write_score_table(&records, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().nth(1).unwrap(), "8\t2\tvolcano\t2\t\t\tNaN");
    }
}
