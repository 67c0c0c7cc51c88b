use std::io::{self, Write};

use crate::types::Sentence;

/// Writes sentences in the ten-column treebank format.
///
/// When `heads` / `deprels` are given, they replace the tokens' own
/// `head` / `deprel` columns (system output). Otherwise the intrinsic
/// values are written (gold reference). Every sentence, including the last,
/// is followed by one blank line.
///
/// # Panics
///
/// Panics if an override is shorter than the sentences it overrides. Callers
/// validate lengths before writing.
pub fn write_conll<W: Write>(
    writer: &mut W,
    sentences: &[Sentence],
    heads: Option<&[Vec<usize>]>,
    deprels: Option<&[Vec<String>]>,
) -> io::Result<()> {
    for (i, sentence) in sentences.iter().enumerate() {
        for (j, token) in sentence.iter().enumerate() {
            let head = heads.map_or(token.head, |h| h[i][j]);
            let deprel = deprels.map_or(token.deprel.as_str(), |d| d[i][j].as_str());
            writeln!(
                writer,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                token.id,
                token.form,
                token.lemma,
                token.cpostag,
                token.postag,
                token.feats,
                head,
                deprel,
                token.phead,
                token.pdeprel,
            )?;
        }
        writeln!(writer)?;
    }
    writer.flush()
}

/// Encodes sentences into a string. See [`write_conll`].
#[must_use]
pub fn encode(
    sentences: &[Sentence],
    heads: Option<&[Vec<usize>]>,
    deprels: Option<&[Vec<String>]>,
) -> String {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_conll(&mut buf, sentences, heads, deprels);
    String::from_utf8(buf).unwrap_or_default()
}
