//! Encoding and header normalization
//!
//! Raw exports arrive in the producer's locale code page most of the time and
//! in UTF-8 the rest of the time. Decoding tries each candidate encoding
//! strictly and keeps the first one that yields no malformed sequences. The
//! header line is then swapped for the canonical header, so nothing downstream
//! ever looks at producer column names.

use encoding_rs::Encoding;
use tracing::{debug, info, warn};

use super::error::IngestError;
use super::schema::{canonical_header, Field, FIELD_COUNT};

/// Default candidate list: source locale first, universal fallback last
pub const DEFAULT_ENCODINGS: [&str; 2] = ["shift_jis", "utf-8"];

/// Raw bytes of one submitted file
#[derive(Debug, Clone)]
pub struct RawInput {
    bytes: Vec<u8>,
    declared_encoding: Option<String>,
}

impl RawInput {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            declared_encoding: None,
        }
    }

    /// Encoding label supplied by the caller; tried before the configured list
    pub fn with_declared_encoding(mut self, label: impl Into<String>) -> Self {
        self.declared_encoding = Some(label.into());
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Ordered list of encodings to attempt
#[derive(Debug, Clone)]
pub struct EncodingPolicy {
    candidates: Vec<&'static Encoding>,
}

impl EncodingPolicy {
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Result<Self, IngestError> {
        let candidates = labels
            .iter()
            .map(|label| resolve_label(label.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        if candidates.is_empty() {
            return Err(IngestError::InvalidOption(
                "at least one text encoding must be configured".to_string(),
            ));
        }

        Ok(Self { candidates })
    }

    pub fn candidates(&self) -> &[&'static Encoding] {
        &self.candidates
    }

    fn for_input(&self, raw: &RawInput) -> Result<Vec<&'static Encoding>, IngestError> {
        let mut order = Vec::with_capacity(self.candidates.len() + 1);
        if let Some(label) = &raw.declared_encoding {
            order.push(resolve_label(label)?);
        }
        for encoding in &self.candidates {
            if !order.contains(encoding) {
                order.push(*encoding);
            }
        }
        Ok(order)
    }
}

impl Default for EncodingPolicy {
    fn default() -> Self {
        Self {
            candidates: vec![encoding_rs::SHIFT_JIS, encoding_rs::UTF_8],
        }
    }
}

fn resolve_label(label: &str) -> Result<&'static Encoding, IngestError> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| IngestError::UnknownEncoding(label.to_string()))
}

/// Decoded text whose first line is the canonical header
#[derive(Debug, Clone)]
pub struct NormalizedText {
    text: String,
    encoding: &'static Encoding,
    lossy: bool,
}

impl NormalizedText {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Name of the encoding actually used
    pub fn encoding(&self) -> &'static str {
        self.encoding.name()
    }

    /// True when no candidate decoded cleanly and replacement characters were inserted
    pub fn is_lossy(&self) -> bool {
        self.lossy
    }

    /// Parse the data lines into fixed-width rows
    ///
    /// Columns are taken by position: surplus columns are dropped and missing
    /// trailing columns are left empty. Empty lines are skipped; a line of bare
    /// delimiters is a row with every field empty.
    pub fn rows(&self) -> Result<Vec<SourceRow>, IngestError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(self.text.as_bytes());

        let mut rows = Vec::new();
        let mut width_mismatches = 0usize;

        for record in reader.records() {
            let record = record?;
            if record.len() != FIELD_COUNT {
                width_mismatches += 1;
            }

            let line = record.position().map(|p| p.line()).unwrap_or_default();
            let mut fields: Vec<String> = record
                .iter()
                .take(FIELD_COUNT)
                .map(str::to_string)
                .collect();
            fields.resize(FIELD_COUNT, String::new());

            rows.push(SourceRow { line, fields });
        }

        if width_mismatches > 0 {
            warn!(
                width_mismatches,
                expected = FIELD_COUNT,
                "Rows with unexpected column count were padded or truncated"
            );
        }

        debug!(rows = rows.len(), "Parsed normalized rows");
        Ok(rows)
    }
}

/// One data row addressed by canonical field, before type coercion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    /// Line number of the row in the submitted file (header is line 1)
    pub line: u64,
    fields: Vec<String>,
}

impl SourceRow {
    pub fn new(line: u64, values: &[&str]) -> Self {
        let mut fields: Vec<String> = values
            .iter()
            .take(FIELD_COUNT)
            .map(|v| v.to_string())
            .collect();
        fields.resize(FIELD_COUNT, String::new());
        Self { line, fields }
    }

    pub fn get(&self, field: Field) -> &str {
        &self.fields[field.index()]
    }

    pub fn values(&self) -> &[String] {
        &self.fields
    }

    /// Business key as submitted; `None` when blank
    pub fn business_key(&self) -> Option<&str> {
        let key = self.get(super::schema::BUSINESS_KEY).trim();
        (!key.is_empty()).then_some(key)
    }
}

/// Decode `raw` and replace its first line with the canonical header
pub fn normalize(raw: &RawInput, policy: &EncodingPolicy) -> Result<NormalizedText, IngestError> {
    if raw.is_empty() {
        return Err(IngestError::EmptyInput);
    }

    let (decoded, encoding, lossy) = decode(&raw.bytes, &policy.for_input(raw)?);

    if decoded.trim().is_empty() {
        return Err(IngestError::EmptyInput);
    }

    let text = replace_header(&decoded);
    info!(
        encoding = encoding.name(),
        lossy,
        bytes = raw.len(),
        "Normalized submitted file"
    );

    Ok(NormalizedText {
        text,
        encoding,
        lossy,
    })
}

fn decode(bytes: &[u8], candidates: &[&'static Encoding]) -> (String, &'static Encoding, bool) {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let body = &bytes[bom_len..];
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(body) {
            return (text.into_owned(), encoding, false);
        }
        let (text, _) = encoding.decode_without_bom_handling(body);
        warn!(encoding = encoding.name(), "Byte order mark present but body is malformed");
        return (text.into_owned(), encoding, true);
    }

    for &encoding in candidates {
        match encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            Some(text) => return (text.into_owned(), encoding, false),
            None => debug!(encoding = encoding.name(), "Strict decode failed, trying next"),
        }
    }

    // Candidates are never empty; UTF-8 only guards a hand-built policy
    let last = candidates.last().copied().unwrap_or(encoding_rs::UTF_8);
    let (text, _) = last.decode_without_bom_handling(bytes);
    warn!(
        encoding = last.name(),
        "No candidate encoding decoded cleanly; using last candidate with replacement characters"
    );
    (text.into_owned(), last, true)
}

fn replace_header(decoded: &str) -> String {
    let header = canonical_header();
    match decoded.find('\n') {
        Some(end) => {
            let terminator = if decoded[..end].ends_with('\r') { "\r\n" } else { "\n" };
            let mut text = String::with_capacity(decoded.len() + header.len());
            text.push_str(&header);
            text.push_str(terminator);
            text.push_str(&decoded[end + 1..]);
            text
        },
        None => header,
    }
}
