//! Partitioning of normalized rows into bounded chunks

use super::normalizer::SourceRow;
use super::schema::Field;

/// An ordered, non-empty run of rows staged and applied as one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 1-based position in the job
    pub sequence: u32,
    rows: Vec<SourceRow>,
}

impl Chunk {
    pub fn rows(&self) -> &[SourceRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Source line range covered by this chunk, for re-submission of a failed slice
    pub fn line_span(&self) -> Option<(u64, u64)> {
        Some((self.rows.first()?.line, self.rows.last()?.line))
    }

    /// Render as a standalone CSV document: canonical header, then rows
    pub fn to_csv(&self) -> std::io::Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::with_capacity(self.rows.len() * 128));

        writer.write_record(Field::ALL.iter().map(|f| f.name()))?;
        for row in &self.rows {
            writer.write_record(row.values())?;
        }

        writer.into_inner().map_err(|e| e.into_error())
    }
}

/// Split `rows` into chunks of at most `ceiling` rows, preserving order
///
/// Zero rows yield zero chunks. A `ceiling` of zero is treated as one.
pub fn partition(rows: Vec<SourceRow>, ceiling: usize) -> Vec<Chunk> {
    let ceiling = ceiling.max(1);
    let mut chunks = Vec::with_capacity(rows.len().div_ceil(ceiling));
    let mut remaining = rows.into_iter().peekable();
    let mut sequence = 0u32;

    while remaining.peek().is_some() {
        sequence += 1;
        chunks.push(Chunk {
            sequence,
            rows: remaining.by_ref().take(ceiling).collect(),
        });
    }

    chunks
}
