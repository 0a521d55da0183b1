//! Incremental decoding of result bodies, one line at a time.

use crate::errors::{Error, ProtocolError};
use crate::transport::ByteStream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::io::StreamReader;

/// Lines of a response body, without their terminators.
pub type LineStream = BoxStream<'static, Result<String, ProtocolError>>;

/// Per-row transform applied by a decoder.
pub type Parser<'p, I, T> = Box<dyn FnMut(I) -> Result<T, Error> + Send + 'p>;

/// Split a response body into lines as it arrives.
pub fn lines(body: ByteStream) -> LineStream {
    let body = body.map_err(|e| std::io::Error::new(std::io::ErrorKind::ConnectionAborted, e));
    FramedRead::new(StreamReader::new(body), LinesCodec::new())
        .map_err(|e| match e {
            LinesCodecError::Io(e) => ProtocolError::Read(e),
            LinesCodecError::MaxLineLengthExceeded => ProtocolError::Read(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "maximum line length exceeded",
            )),
        })
        .boxed()
}

/// Something producing parsed rows from an open connection.
#[async_trait]
pub trait RowDecoder: Send {
    type Row: Send;

    /// The next row, or `None` once the results are exhausted. Once `None`
    /// has been returned (or an error), every later call returns `None`.
    async fn next_row(&mut self) -> Result<Option<Self::Row>, Error>;
}

/// Decoder for flat-file formats (TSV, CSV, count).
pub struct FlatFileIterator<'p, T> {
    lines: LineStream,
    parser: Parser<'p, String, T>,
    finished: bool,
}

impl<'p, T> FlatFileIterator<'p, T> {
    pub fn new(lines: LineStream, parser: Parser<'p, String, T>) -> Self {
        Self {
            lines,
            parser,
            finished: false,
        }
    }
}

#[async_trait]
impl<'p, T: Send> RowDecoder for FlatFileIterator<'p, T> {
    type Row = T;

    async fn next_row(&mut self) -> Result<Option<T>, Error> {
        if self.finished {
            return Ok(None);
        }
        let line = match self.lines.try_next().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                self.finished = true;
                return Ok(None);
            }
            Err(e) => {
                self.finished = true;
                return Err(e.into());
            }
        };
        let line = line.trim();
        if line.starts_with("[ERROR]") {
            self.finished = true;
            return Err(ProtocolError::Inline(line.to_string()).into());
        }
        (self.parser)(line.to_string()).map(Some)
    }
}

/// The parts of a JSON result envelope checked once the rows are done.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Footer {
    was_successful: bool,
    status_code: Option<u16>,
    error: Option<String>,
}

/// Decoder for the streamed JSON envelope, where the `results` array holds
/// one row per line.
pub struct JsonIterator<'p, T> {
    lines: LineStream,
    parser: Parser<'p, Value, T>,
    header: String,
    finished: bool,
}

const RESULTS_MARKER: &str = "\"results\":[";

impl<'p, T> JsonIterator<'p, T> {
    /// Read the envelope header, up to the opening of the `results` array.
    pub async fn open(mut lines: LineStream, parser: Parser<'p, Value, T>) -> Result<Self, Error> {
        let mut header = String::new();
        loop {
            match lines.try_next().await? {
                Some(line) => {
                    let line = line.trim();
                    header.push_str(line);
                    if line.ends_with(RESULTS_MARKER) {
                        break;
                    }
                }
                None => return Err(ProtocolError::BadHeader(header).into()),
            }
        }
        log::debug!("results header: {}", header);
        Ok(Self {
            lines,
            parser,
            header,
            finished: false,
        })
    }

    fn check_return_status(&self, footer: &str) -> Result<(), ProtocolError> {
        let container = format!("{}{}", self.header, footer);
        let info: Footer = serde_json::from_str(&container)
            .map_err(|source| ProtocolError::BadContainer { container, source })?;
        if info.was_successful {
            Ok(())
        } else {
            Err(ProtocolError::Unsuccessful {
                status_code: info.status_code,
                message: info.error.unwrap_or_default(),
            })
        }
    }

    async fn read_row(&mut self) -> Result<Option<T>, Error> {
        loop {
            let Some(line) = self.lines.try_next().await? else {
                return Err(ProtocolError::Interrupted.into());
            };
            if line.trim_start().starts_with(']') {
                let mut footer = line;
                while let Some(more) = self.lines.try_next().await? {
                    footer.push_str(&more);
                }
                self.check_return_status(&footer)?;
                return Ok(None);
            }
            let row = line.trim().trim_matches(',');
            if row.is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(row).map_err(|source| ProtocolError::BadRow {
                line: row.to_string(),
                source,
            })?;
            return (self.parser)(value).map(Some);
        }
    }
}

#[async_trait]
impl<'p, T: Send> RowDecoder for JsonIterator<'p, T> {
    type Row = T;

    async fn next_row(&mut self) -> Result<Option<T>, Error> {
        if self.finished {
            return Ok(None);
        }
        let row = self.read_row().await;
        if !matches!(row, Ok(Some(_))) {
            self.finished = true;
        }
        row
    }
}
