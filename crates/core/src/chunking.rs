use crate::error::IngestError;
use crate::models::IngestionOptions;

/// Break points tried in order: paragraph, line, sentence, word.
const BOUNDARY_LEVELS: [&[&str]; 4] = [&["\n\n"], &["\n"], &[". ", "! ", "? "], &[" ", "\t"]];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl ChunkingConfig {
    pub fn new(max_chars: usize, overlap_chars: usize) -> Result<Self, IngestError> {
        if max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be > 0".to_string(),
            ));
        }
        if overlap_chars >= max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {overlap_chars} must be smaller than max_chars {max_chars}"
            )));
        }
        Ok(Self {
            max_chars,
            overlap_chars,
        })
    }
}

impl TryFrom<&IngestionOptions> for ChunkingConfig {
    type Error = IngestError;

    fn try_from(value: &IngestionOptions) -> Result<Self, Self::Error> {
        Self::new(value.chunk_max_chars, value.chunk_overlap_chars)
    }
}

/// Splits `text` into chunks of at most `max_chars` characters.
///
/// Each chunk after the first starts exactly `overlap_chars` characters
/// before the previous one ended, so dropping that prefix from every chunk
/// but the first and concatenating gives back the input unchanged. Cuts land
/// after the largest structural separator found in the window and fall back
/// to a hard cut at `max_chars`.
pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let limit = start + config.max_chars;
        if limit >= chars.len() {
            chunks.push(chars[start..].iter().collect());
            break;
        }

        // end must leave room for forward progress once the overlap is rewound
        let end = find_break(&chars, start + config.overlap_chars, limit);
        chunks.push(chars[start..end].iter().collect());
        start = end - config.overlap_chars;
    }

    chunks
}

/// Joins the first `count` chunks and truncates to `char_budget` characters.
pub fn summary_excerpt(chunks: &[String], count: usize, char_budget: usize) -> String {
    let joined = chunks
        .iter()
        .take(count)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");
    joined.chars().take(char_budget).collect()
}

fn find_break(chars: &[char], floor: usize, limit: usize) -> usize {
    for level in BOUNDARY_LEVELS {
        let best = level
            .iter()
            .filter_map(|separator| last_separator_end(chars, floor, limit, separator))
            .max();
        if let Some(end) = best {
            return end;
        }
    }
    limit
}

fn last_separator_end(chars: &[char], floor: usize, limit: usize, separator: &str) -> Option<usize> {
    let separator: Vec<char> = separator.chars().collect();
    (floor + 1..=limit)
        .rev()
        .find(|&end| end >= separator.len() && chars[end - separator.len()..end] == separator[..])
}
