use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{CoreError, Result};
use crate::types::{Sentence, Token};

/// Number of tab-separated columns per token line.
pub const NUM_FIELDS: usize = 10;

/// Reads sentences in the ten-column treebank format.
///
/// Blank lines end a sentence (runs of blank lines collapse) and lines
/// starting with `#` are skipped.
pub fn read_conll<R: BufRead>(reader: R) -> Result<Vec<Sentence>> {
    let mut sentences = Vec::new();
    let mut current = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end_matches(['\r', '\n']);

        if line.trim().is_empty() {
            if !current.is_empty() {
                sentences.push(Sentence::new(std::mem::take(&mut current)));
            }
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        current.push(parse_token(line, idx + 1)?);
    }

    if !current.is_empty() {
        sentences.push(Sentence::new(current));
    }

    Ok(sentences)
}

/// Decodes sentences from a string. See [`read_conll`].
pub fn decode(text: &str) -> Result<Vec<Sentence>> {
    read_conll(text.as_bytes())
}

/// Reads every sentence of a treebank file.
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Vec<Sentence>> {
    let file = File::open(path)?;
    read_conll(BufReader::new(file))
}

fn parse_token(line: &str, line_no: usize) -> Result<Token> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != NUM_FIELDS {
        return Err(CoreError::Conll {
            line: line_no,
            message: format!("expected {NUM_FIELDS} fields, found {}", fields.len()),
        });
    }

    let number = |field: &str, name: &str| {
        field.parse::<usize>().map_err(|_| CoreError::Conll {
            line: line_no,
            message: format!("{name} is not an integer: {field:?}"),
        })
    };

    Ok(Token {
        id: number(fields[0], "id")?,
        form: fields[1].to_string(),
        lemma: fields[2].to_string(),
        cpostag: fields[3].to_string(),
        postag: fields[4].to_string(),
        feats: fields[5].to_string(),
        head: number(fields[6], "head")?,
        deprel: fields[7].to_string(),
        phead: fields[8].to_string(),
        pdeprel: fields[9].to_string(),
    })
}
