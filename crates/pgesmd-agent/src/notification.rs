// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::errors::DecodeError;

/// A webhook payload announcing new usage data.
///
/// The body is a single root element whose direct children each carry one resource URI as text:
///
/// ```xml
/// <ns3:BatchList xmlns:ns3="http://naesb.org/espi">
///   <ns3:resources>https://api.utility.example/GreenButtonConnect/espi/1_1/resource/Batch/Bulk/1</ns3:resources>
/// </ns3:BatchList>
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Notification {
    /// in document order, duplicates kept
    pub resource_uris: Vec<String>,
}

impl Notification {
    pub fn len(&self) -> usize {
        self.resource_uris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resource_uris.is_empty()
    }
}

/// Extracts the resource URIs of a notification body.
///
/// Only the text directly inside each child of the root, up to its first nested element, is used.
/// A child without text yields an empty URI, which the ingest worker later rejects like any other
/// foreign URI.
pub fn decode_notification(body: &[u8]) -> Result<Notification, DecodeError> {
    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut seen_root = false;
    let mut current: Option<String> = None;
    // cleared once the current child opens an element of its own
    let mut collecting = false;
    let mut resource_uris = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(_) => {
                if depth == 0 {
                    if seen_root {
                        return Err(DecodeError::MultipleRoots);
                    }
                    seen_root = true;
                }
                if depth == 2 {
                    collecting = false;
                }
                depth += 1;
                if depth == 2 {
                    current = Some(String::new());
                    collecting = true;
                }
            }
            Event::Empty(_) => match depth {
                0 if seen_root => return Err(DecodeError::MultipleRoots),
                0 => seen_root = true,
                1 => resource_uris.push(String::new()),
                2 => collecting = false,
                _ => {}
            },
            Event::End(_) => {
                if depth == 2 {
                    if let Some(uri) = current.take() {
                        resource_uris.push(uri);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Text(text) => match depth {
                0 => return Err(DecodeError::TextOutsideRoot),
                2 if collecting => {
                    if let Some(uri) = current.as_mut() {
                        uri.push_str(&text.unescape()?);
                    }
                }
                _ => {}
            },
            Event::CData(data) => match depth {
                0 => return Err(DecodeError::TextOutsideRoot),
                2 if collecting => {
                    if let Some(uri) = current.as_mut() {
                        uri.push_str(&data.decode().map_err(quick_xml::Error::from)?);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            // declarations, comments, processing instructions and doctypes carry no URIs
            _ => {}
        }
        buf.clear();
    }

    if depth != 0 {
        return Err(DecodeError::UnexpectedEof);
    }
    if !seen_root {
        return Err(DecodeError::EmptyDocument);
    }
    Ok(Notification { resource_uris })
}
