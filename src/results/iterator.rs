use super::decoder::{lines, FlatFileIterator, JsonIterator, Parser, RowDecoder};
use super::format::{FormatFamily, RowFormat};
use super::object::{ObjectFetcher, ResultObject};
use super::row::{CellStyle, ResultRow};
use crate::constants::JSON_ROWS_VERSION;
use crate::errors::{Error, ServiceError};
use crate::model::ClassDescriptor;
use crate::types::View;
use crate::Service;
use async_stream::try_stream;
use futures::{pin_mut, Stream, TryStreamExt};
use serde_json::{Map, Value};
use std::sync::Arc;

/// One result, in the shape its [RowFormat] asks for.
#[derive(Debug)]
pub enum Row<'s> {
    /// A line of a flat-file format.
    Text(String),
    /// A row left as JSON.
    Json(Value),
    Result(ResultRow),
    List(Vec<Value>),
    Dict(Map<String, Value>),
    Object(ResultObject<'s>),
}

/// A request for results. Nothing is sent until [ResultIterator::stream] is
/// polled, and every call to it makes a fresh request.
pub struct ResultIterator<'s> {
    service: &'s Service,
    url: String,
    form: String,
    format: RowFormat,
    view: Arc<View>,
    class: Option<&'s ClassDescriptor>,
}

impl<'s> ResultIterator<'s> {
    /// `class` describes the root of the results, and is required for
    /// [RowFormat::JsonObjects].
    pub fn new(
        service: &'s Service,
        path: &str,
        mut params: Vec<(String, String)>,
        format: RowFormat,
        view: View,
        class: Option<&'s ClassDescriptor>,
    ) -> Result<Self, Error> {
        if format.family() == FormatFamily::Objects && class.is_none() {
            return Err(ServiceError::InvalidArgument(format!(
                "{} results need the class of the objects",
                format
            ))
            .into());
        }
        params.retain(|(k, _)| k != "format");
        params.push((
            "format".to_string(),
            format.wire_format(service.version()).to_string(),
        ));
        let form = serde_urlencoded::to_string(&params)
            .map_err(|e| ServiceError::InvalidArgument(e.to_string()))?;
        Ok(Self {
            service,
            url: service.url(path),
            form,
            format,
            view: Arc::new(view),
            class,
        })
    }

    pub fn format(&self) -> RowFormat {
        self.format
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Urlencoded request parameters, including the wire format.
    pub fn form(&self) -> &str {
        &self.form
    }

    fn cell_style(&self) -> CellStyle {
        if self.service.version() >= JSON_ROWS_VERSION {
            CellStyle::Bare
        } else {
            CellStyle::Wrapped
        }
    }

    async fn open_decoder(&self) -> Result<Box<dyn RowDecoder<Row = Row<'s>> + 's>, Error> {
        let body = self
            .service
            .opener()
            .open(&self.url, Some(self.form.clone()))
            .await?;
        let lines = lines(body);
        let decoder: Box<dyn RowDecoder<Row = Row<'s>> + 's> = match self.format.family() {
            FormatFamily::Flat => {
                let parser: Parser<'s, String, Row<'s>> = Box::new(|line| Ok(Row::Text(line)));
                Box::new(FlatFileIterator::new(lines, parser))
            }
            FormatFamily::Json => {
                let parser: Parser<'s, Value, Row<'s>> = Box::new(|v| Ok(Row::Json(v)));
                Box::new(JsonIterator::open(lines, parser).await?)
            }
            FormatFamily::Parsed => {
                let view = self.view.clone();
                let style = self.cell_style();
                let format = self.format;
                let parser: Parser<'s, Value, Row<'s>> = Box::new(move |v| {
                    let row = ResultRow::new(v, view.clone(), style)?;
                    Ok(match format {
                        RowFormat::List => Row::List(row.to_list()),
                        RowFormat::Dict => Row::Dict(row.to_dict()),
                        _ => Row::Result(row),
                    })
                });
                Box::new(JsonIterator::open(lines, parser).await?)
            }
            FormatFamily::Objects => {
                let class = self.class.ok_or_else(|| {
                    ServiceError::InvalidArgument("no class for object results".to_string())
                })?;
                let model = self.service.model().await?;
                let fetcher: &'s dyn ObjectFetcher = self.service;
                let view = self.view.clone();
                let parser: Parser<'s, Value, Row<'s>> = Box::new(move |v| {
                    let object = ResultObject::new(v, class, model, fetcher, &view)?;
                    Ok(Row::Object(object))
                });
                Box::new(JsonIterator::open(lines, parser).await?)
            }
        };
        Ok(decoder)
    }

    /// Stream the results over a new connection. The connection is released
    /// when the stream ends, fails, or is dropped.
    pub fn stream(&self) -> impl Stream<Item = Result<Row<'s>, Error>> + '_ {
        try_stream! {
            let mut decoder = self.open_decoder().await?;
            while let Some(row) = decoder.next_row().await? {
                yield row;
            }
        }
    }

    /// Number of results, found by reading all of them.
    pub async fn count(&self) -> Result<usize, Error> {
        self.stream().try_fold(0, |n, _| async move { Ok(n + 1) }).await
    }

    pub async fn first(&self) -> Result<Option<Row<'s>>, Error> {
        let stream = self.stream();
        pin_mut!(stream);
        stream.try_next().await
    }
}
