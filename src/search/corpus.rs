use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

use crate::error::Result;
use crate::types::ReviewRecord;

/// Records parsed from a JSONL file, plus how many lines were unusable.
#[derive(Debug, Default)]
pub struct Corpus {
    pub records: Vec<ReviewRecord>,
    pub malformed_lines: usize,
}

/// Read merged review JSONL. Blank lines are ignored; lines that fail to
/// parse are logged and skipped. Invalid UTF-8 is decoded lossily so one
/// bad byte cannot end the read.
pub fn load_jsonl(path: &Path) -> Result<Corpus> {
    let reader = BufReader::new(File::open(path)?);
    let mut corpus = Corpus::default();

    for (idx, bytes) in reader.split(b'\n').enumerate() {
        let bytes = bytes?;
        let line = match std::str::from_utf8(&bytes) {
            Ok(text) => Cow::Borrowed(text),
            Err(_) => {
                warn!(
                    line = idx + 1,
                    file = %path.display(),
                    "line is not valid UTF-8, replacing bad bytes"
                );
                String::from_utf8_lossy(&bytes)
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<ReviewRecord>(trimmed) {
            Ok(record) => corpus.records.push(record),
            Err(e) => {
                corpus.malformed_lines += 1;
                warn!(
                    line = idx + 1,
                    file = %path.display(),
                    error = %e,
                    "skipping malformed JSON line"
                );
            }
        }
    }

    info!(
        records = corpus.records.len(),
        malformed = corpus.malformed_lines,
        file = %path.display(),
        "loaded review corpus"
    );
    Ok(corpus)
}

/// Optionally shuffle, then truncate to `limit`. A seed makes the shuffle
/// reproducible.
pub fn sample(
    mut records: Vec<ReviewRecord>,
    limit: Option<usize>,
    shuffle: bool,
    seed: Option<u64>,
) -> Vec<ReviewRecord> {
    if shuffle {
        match seed {
            Some(seed) => records.shuffle(&mut StdRng::seed_from_u64(seed)),
            None => records.shuffle(&mut rand::rng()),
        }
    }
    if let Some(limit) = limit.filter(|l| *l > 0) {
        records.truncate(limit);
    }
    records
}
