//! Incremental GeoJSON encoding of database cursors.
//!
//! Rows are pulled one at a time and written to a [`FeatureSink`] as soon as
//! they are encoded; memory use is bounded by one encoded row. Nothing is
//! written before the first row has been read successfully, so a failure on
//! the first row can still be reported as a clean error. A failure after that
//! leaves the output truncated: bytes already handed to the sink are never
//! revisited.

use crate::error::{QueryError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::str::FromStr;

/// Wire shape of an encoded result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// `{"type":"FeatureCollection","features":[...]}` (`fc`).
    #[default]
    Collection,
    /// A bare JSON array of features (`fa`).
    Array,
    /// Newline-delimited features with no enclosing array (`fs`).
    Stream,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Collection => "fc",
            OutputFormat::Array => "fa",
            OutputFormat::Stream => "fs",
        }
    }

    /// Content type of the encoded document.
    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Stream => "application/x-ndjson",
            _ => "application/json",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" | "fc" => Ok(OutputFormat::Collection),
            "fa" => Ok(OutputFormat::Array),
            "fs" => Ok(OutputFormat::Stream),
            other => Err(QueryError::invalid_input(format!(
                "unknown format '{other}', expected fc, fa or fs"
            ))),
        }
    }
}

const COLLECTION_OPEN: &str = r#"{"type":"FeatureCollection","features":["#;
const COLLECTION_CLOSE: &str = "]}";
const ARRAY_OPEN: &str = "[";
const ARRAY_CLOSE: &str = "]";

/// A row that can be written as a GeoJSON feature.
pub trait FeatureRecord {
    /// Append the GeoJSON geometry object.
    fn write_geometry(&self, out: &mut String) -> Result<()>;

    /// Append the properties object, braces included.
    fn write_properties(&self, out: &mut String) -> Result<()>;
}

/// Append `{"type":"Feature","geometry":...,"properties":...}`.
pub fn write_feature<R: FeatureRecord>(record: &R, out: &mut String) -> Result<()> {
    out.push_str(r#"{"type":"Feature","geometry":"#);
    record.write_geometry(out)?;
    out.push_str(r#","properties":"#);
    record.write_properties(out)?;
    out.push('}');
    Ok(())
}

/// Destination of encoded bytes.
#[async_trait]
pub trait FeatureSink: Send {
    async fn write(&mut self, chunk: Bytes) -> Result<()>;

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl FeatureSink for Vec<u8> {
    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        self.extend_from_slice(&chunk);
        Ok(())
    }
}

/// Encode every row of `cursor` to `sink` in `format`.
///
/// Returns the number of features written. Rows are emitted in cursor order.
pub async fn encode<S, R, E, K>(cursor: S, format: OutputFormat, sink: &mut K) -> Result<u64>
where
    S: Stream<Item = std::result::Result<R, E>> + Send,
    R: FeatureRecord,
    QueryError: From<E>,
    K: FeatureSink + ?Sized,
{
    futures::pin_mut!(cursor);

    let (open, close) = match format {
        OutputFormat::Collection => (COLLECTION_OPEN, COLLECTION_CLOSE),
        OutputFormat::Array => (ARRAY_OPEN, ARRAY_CLOSE),
        OutputFormat::Stream => ("", ""),
    };
    let separated = format != OutputFormat::Stream;

    let mut buf = String::with_capacity(1024);
    buf.push_str(open);
    let mut count: u64 = 0;

    while let Some(row) = cursor.next().await {
        let row = row.map_err(QueryError::from)?;
        if count > 0 && separated {
            buf.push(',');
        }
        write_feature(&row, &mut buf)?;
        buf.push('\n');
        sink.write(Bytes::from(std::mem::take(&mut buf))).await?;
        count += 1;
    }

    buf.push_str(close);
    if !buf.is_empty() {
        sink.write(Bytes::from(buf)).await?;
    }
    sink.flush().await?;
    tracing::debug!(format = format.as_str(), features = count, "encoded features");
    Ok(count)
}
