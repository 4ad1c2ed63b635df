use crate::error::IngestError;

/// Sliding-window chunking parameters. Offsets and sizes are measured in
/// characters, not bytes, so multi-byte text never splits inside a code point.
#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            overlap: 200,
        }
    }
}

impl ChunkerConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be > 0".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk_size {}",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Character range `[start, end)` of one page within the full extracted text.
#[derive(Debug, Clone, Copy)]
pub struct PageBoundary {
    pub number: u32,
    pub start: usize,
    pub end: usize,
}

/// One window of the extracted text. `page` is `None` when no page
/// boundaries were available; callers must not conflate that with page 0.
#[derive(Debug, Clone)]
pub struct ChunkSlice {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub page: Option<u32>,
    pub text: String,
}

/// Splits `full_text` into overlapping fixed-size windows.
///
/// Windows are `[start, start + chunk_size)` advancing by
/// `chunk_size - overlap`, so consecutive chunks share `overlap` characters
/// and no boundary-straddling passage is lost. Each chunk is attributed to
/// the page whose range contains its midpoint offset. Identical input and
/// parameters always produce byte-identical output; idempotent re-ingestion
/// depends on this.
pub fn chunk(
    full_text: &str,
    pages: &[PageBoundary],
    config: ChunkerConfig,
) -> Result<Vec<ChunkSlice>, IngestError> {
    config.validate()?;

    if full_text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = full_text.chars().collect();
    let step = config.chunk_size - config.overlap;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0usize;

    while start < chars.len() {
        let end = (start + config.chunk_size).min(chars.len());
        let text: String = chars[start..end].iter().collect();
        let midpoint = start + (end - start) / 2;

        chunks.push(ChunkSlice {
            index,
            start,
            end,
            page: page_for_offset(pages, midpoint),
            text,
        });

        if end == chars.len() {
            break;
        }
        start += step;
        index += 1;
    }

    Ok(chunks)
}

fn page_for_offset(pages: &[PageBoundary], offset: usize) -> Option<u32> {
    if let Some(page) = pages.iter().find(|p| p.start <= offset && offset < p.end) {
        return Some(page.number);
    }
    // Offsets past the final boundary (separator padding) attach to the last page.
    pages
        .last()
        .filter(|last| offset >= last.end)
        .map(|last| last.number)
}

/// Expected chunk count for a text of `len` characters: `ceil((L-O)/(C-O))`
/// when `L > C`, exactly 1 when `0 < L <= C`, 0 when empty.
pub fn expected_chunk_count(len: usize, config: ChunkerConfig) -> usize {
    if len == 0 {
        return 0;
    }
    if len <= config.chunk_size {
        return 1;
    }
    let step = config.chunk_size - config.overlap;
    (len - config.overlap).div_ceil(step)
}
