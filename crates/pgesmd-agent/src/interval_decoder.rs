// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Streaming decoder for ESPI (Green Button) usage documents.
//!
//! The reading type of a document (`powerOfTenMultiplier`, `commodity`, `flowDirection`) appears
//! before its interval blocks and applies to every reading that follows until a later reading
//! type overwrites it. Readings are produced one at a time while the document is read, so large
//! backfill documents are never held in memory as a whole.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;

use crate::errors::DecodeError;

pub const ESPI_NAMESPACE: &[u8] = b"http://naesb.org/espi";

/// `time_of_use` value of readings whose document omits `tou`.
pub const TIME_OF_USE_UNSPECIFIED: i32 = -1;

/// One normalized usage record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalReading {
    /// UTC epoch seconds
    pub start_epoch_seconds: i64,
    pub duration_seconds: i64,
    pub commodity: i32,
    pub flow_direction: i32,
    pub time_of_use: i32,
    pub watt_hours: f64,
}

/// Largest `powerOfTenMultiplier` magnitude accepted in a document.
pub const MAX_POWER_OF_TEN_MULTIPLIER: i32 = 18;

/// Scales a raw interval value by `10^multiplier`, rounded to 3 decimals with ties to even.
///
/// Negative multipliers are applied in integer arithmetic so the rounding sees the exact decimal
/// value rather than its nearest `f64`.
pub fn scale_watt_hours(value: i64, multiplier: i32) -> f64 {
    if multiplier >= 0 {
        return value as f64 * 10f64.powi(multiplier);
    }
    let shift = multiplier.unsigned_abs();
    let value = i128::from(value);
    let thousandths = if shift <= 3 {
        value * 10i128.pow(3 - shift)
    } else {
        let Some(divisor) = 10i128.checked_pow(shift - 3) else {
            return 0.0;
        };
        let quotient = value / divisor;
        let twice_remainder = 2 * (value % divisor).abs();
        if twice_remainder > divisor || (twice_remainder == divisor && quotient % 2 != 0) {
            quotient + value.signum()
        } else {
            quotient
        }
    };
    thousandths as f64 / 1000.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Element {
    PowerOfTenMultiplier,
    Commodity,
    FlowDirection,
    IntervalBlock,
    IntervalReading,
    TimePeriod,
    Duration,
    Start,
    Value,
    Tou,
    Other,
}

impl Element {
    fn classify(resolve: &ResolveResult, local_name: &[u8]) -> Element {
        if !matches!(resolve, ResolveResult::Bound(Namespace(ns)) if *ns == ESPI_NAMESPACE) {
            return Element::Other;
        }
        match local_name {
            b"powerOfTenMultiplier" => Element::PowerOfTenMultiplier,
            b"commodity" => Element::Commodity,
            b"flowDirection" => Element::FlowDirection,
            b"IntervalBlock" => Element::IntervalBlock,
            b"IntervalReading" => Element::IntervalReading,
            b"timePeriod" => Element::TimePeriod,
            b"duration" => Element::Duration,
            b"start" => Element::Start,
            b"value" => Element::Value,
            b"tou" => Element::Tou,
            _ => Element::Other,
        }
    }

    fn has_numeric_text(self) -> bool {
        matches!(
            self,
            Element::PowerOfTenMultiplier
                | Element::Commodity
                | Element::FlowDirection
                | Element::Duration
                | Element::Start
                | Element::Value
                | Element::Tou
        )
    }
}

/// Owned view of a parser event, detached from the reader's buffers.
enum Token {
    Open(Element),
    Empty(Element),
    Close,
    /// `None` when the text belongs to an element whose content is not needed
    Text(Option<String>),
    Eof,
    Skip,
}

fn tokenize(resolve: ResolveResult, event: Event, wants_text: bool) -> Result<Token, DecodeError> {
    let token = match event {
        Event::Start(start) => Token::Open(Element::classify(
            &resolve,
            start.local_name().into_inner(),
        )),
        Event::Empty(start) => Token::Empty(Element::classify(
            &resolve,
            start.local_name().into_inner(),
        )),
        Event::End(_) => Token::Close,
        Event::Text(text) if wants_text => Token::Text(Some(text.unescape()?.into_owned())),
        Event::CData(data) if wants_text => Token::Text(Some(
            data.decode().map_err(quick_xml::Error::from)?.into_owned(),
        )),
        Event::Text(_) | Event::CData(_) => Token::Text(None),
        Event::Eof => Token::Eof,
        _ => Token::Skip,
    };
    Ok(token)
}

fn parse_number<T: FromStr>(field: &'static str, text: &str) -> Result<T, DecodeError> {
    text.trim()
        .parse::<T>()
        .map_err(|_| DecodeError::InvalidNumber {
            field,
            value: text.to_string(),
        })
}

#[derive(Debug, Default)]
struct PendingReading {
    has_time_period: bool,
    duration: Option<i64>,
    start: Option<i64>,
    value: Option<i64>,
    tou: Option<i32>,
}

/// Lazy sequence of [`IntervalReading`]s decoded from one document.
///
/// The sequence ends after the first error. Decoding the same bytes again requires a new decoder.
pub struct IntervalDecoder<R: BufRead> {
    reader: NsReader<R>,
    buf: Vec<u8>,
    stack: Vec<Element>,
    text: String,
    seen_root: bool,
    finished: bool,
    multiplier: Option<i32>,
    commodity: Option<i32>,
    flow_direction: Option<i32>,
    pending: Option<PendingReading>,
}

impl<'a> IntervalDecoder<&'a [u8]> {
    pub fn from_bytes(bytes: &'a [u8]) -> Self {
        IntervalDecoder::new(bytes)
    }
}

impl IntervalDecoder<BufReader<File>> {
    /// Decodes a document saved on disk.
    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::open(path)?;
        Ok(IntervalDecoder::new(BufReader::new(file)))
    }
}

impl<R: BufRead> IntervalDecoder<R> {
    pub fn new(source: R) -> Self {
        let mut reader = NsReader::from_reader(source);
        reader.config_mut().trim_text(true);
        IntervalDecoder {
            reader,
            buf: Vec::new(),
            stack: Vec::new(),
            text: String::new(),
            seen_root: false,
            finished: false,
            multiplier: None,
            commodity: None,
            flow_direction: None,
            pending: None,
        }
    }

    fn wants_text(&self) -> bool {
        self.stack
            .last()
            .is_some_and(|element| element.has_numeric_text())
    }

    fn advance(&mut self) -> Result<Option<IntervalReading>, DecodeError> {
        loop {
            let wants_text = self.wants_text();
            self.buf.clear();
            let token = {
                let (resolve, event) = self.reader.read_resolved_event_into(&mut self.buf)?;
                tokenize(resolve, event, wants_text)?
            };

            match token {
                Token::Open(element) => self.open(element)?,
                Token::Empty(element) => {
                    self.open(element)?;
                    if let Some(reading) = self.close()? {
                        return Ok(Some(reading));
                    }
                }
                Token::Close => {
                    if let Some(reading) = self.close()? {
                        return Ok(Some(reading));
                    }
                }
                Token::Text(text) => {
                    if self.stack.is_empty() {
                        return Err(DecodeError::TextOutsideRoot);
                    }
                    if let Some(text) = text {
                        self.text.push_str(&text);
                    }
                }
                Token::Eof => {
                    if !self.stack.is_empty() {
                        return Err(DecodeError::UnexpectedEof);
                    }
                    if !self.seen_root {
                        return Err(DecodeError::EmptyDocument);
                    }
                    return Ok(None);
                }
                Token::Skip => {}
            }
        }
    }

    fn open(&mut self, element: Element) -> Result<(), DecodeError> {
        if self.stack.is_empty() {
            if self.seen_root {
                return Err(DecodeError::MultipleRoots);
            }
            self.seen_root = true;
        }

        let parent = self.stack.last().copied();
        match element {
            Element::IntervalBlock => {
                if self.multiplier.is_none()
                    || self.commodity.is_none()
                    || self.flow_direction.is_none()
                {
                    return Err(DecodeError::MissingReadingType);
                }
            }
            Element::IntervalReading if parent == Some(Element::IntervalBlock) => {
                self.pending = Some(PendingReading::default());
            }
            Element::TimePeriod if parent == Some(Element::IntervalReading) => {
                if let Some(pending) = self.pending.as_mut() {
                    pending.has_time_period = true;
                }
            }
            _ => {}
        }

        self.text.clear();
        self.stack.push(element);
        Ok(())
    }

    fn close(&mut self) -> Result<Option<IntervalReading>, DecodeError> {
        let Some(element) = self.stack.pop() else {
            return Ok(None);
        };
        let parent = self.stack.last().copied();
        let grandparent = self
            .stack
            .len()
            .checked_sub(2)
            .and_then(|index| self.stack.get(index))
            .copied();
        let in_time_period = parent == Some(Element::TimePeriod)
            && grandparent == Some(Element::IntervalReading);
        let in_reading = parent == Some(Element::IntervalReading);
        let text = std::mem::take(&mut self.text);

        match element {
            Element::PowerOfTenMultiplier => {
                let multiplier: i32 = parse_number("powerOfTenMultiplier", &text)?;
                if multiplier.unsigned_abs() > MAX_POWER_OF_TEN_MULTIPLIER.unsigned_abs() {
                    return Err(DecodeError::InvalidNumber {
                        field: "powerOfTenMultiplier",
                        value: text,
                    });
                }
                self.multiplier = Some(multiplier);
            }
            Element::Commodity => {
                self.commodity = Some(parse_number("commodity", &text)?);
            }
            Element::FlowDirection => {
                self.flow_direction = Some(parse_number("flowDirection", &text)?);
            }
            Element::Duration if in_time_period => {
                if let Some(pending) = self.pending.as_mut() {
                    pending.duration = Some(parse_number("duration", &text)?);
                }
            }
            Element::Start if in_time_period => {
                if let Some(pending) = self.pending.as_mut() {
                    pending.start = Some(parse_number("start", &text)?);
                }
            }
            Element::Value if in_reading => {
                if let Some(pending) = self.pending.as_mut() {
                    pending.value = Some(parse_number("value", &text)?);
                }
            }
            Element::Tou if in_reading => {
                if let Some(pending) = self.pending.as_mut() {
                    pending.tou = Some(parse_number("tou", &text)?);
                }
            }
            Element::IntervalReading if parent == Some(Element::IntervalBlock) => {
                if let Some(pending) = self.pending.take() {
                    return self.finish_reading(pending).map(Some);
                }
            }
            _ => {}
        }
        Ok(None)
    }

    fn finish_reading(&self, pending: PendingReading) -> Result<IntervalReading, DecodeError> {
        let (Some(multiplier), Some(commodity), Some(flow_direction)) =
            (self.multiplier, self.commodity, self.flow_direction)
        else {
            return Err(DecodeError::MissingReadingType);
        };
        if !pending.has_time_period {
            return Err(DecodeError::MissingField("timePeriod"));
        }
        let duration_seconds = pending.duration.ok_or(DecodeError::MissingField("duration"))?;
        let start_epoch_seconds = pending.start.ok_or(DecodeError::MissingField("start"))?;
        let value = pending.value.ok_or(DecodeError::MissingField("value"))?;

        Ok(IntervalReading {
            start_epoch_seconds,
            duration_seconds,
            commodity,
            flow_direction,
            time_of_use: pending.tou.unwrap_or(TIME_OF_USE_UNSPECIFIED),
            watt_hours: scale_watt_hours(value, multiplier),
        })
    }
}

impl<R: BufRead> Iterator for IntervalDecoder<R> {
    type Item = Result<IntervalReading, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.advance() {
            Ok(Some(reading)) => Some(Ok(reading)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

impl<R: BufRead> std::iter::FusedIterator for IntervalDecoder<R> {}
