use std::{fs, path::Path};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FastaError {
    #[error("Failed to read the sequence input")]
    Unreadable(#[from] std::io::Error),
    #[error("Sequence data before the first header")]
    MissingHeader,
}

/// Minimal FASTA reader for the input boundary. Returns (name, sequence)
/// pairs in file order; the name is the first whitespace-delimited token of
/// the header since names double as directory names later on.
pub fn read_fasta(path: &Path) -> Result<Vec<(String, String)>, FastaError> {
    parse_fasta(&fs::read_to_string(path)?)
}

pub fn parse_fasta(input: &str) -> Result<Vec<(String, String)>, FastaError> {
    let mut pairs: Vec<(String, String)> = Vec::new();

    for line in input.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(header) = line.strip_prefix('>') {
            let name = header.split_whitespace().next().unwrap_or("").to_owned();
            pairs.push((name, String::new()));
        } else {
            match pairs.last_mut() {
                Some((_, sequence)) => sequence.push_str(line),
                None => return Err(FastaError::MissingHeader),
            }
        }
    }

    Ok(pairs)
}
