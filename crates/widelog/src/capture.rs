// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Deterministic capture of the initial event fields from an inbound request.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use http::{HeaderMap, Request, header};

use crate::{config::WideEventConfig, event::WideEvent};

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";

/// Builds the initial [`WideEvent`] for a request.
///
/// The request id is taken from the configured header when present and
/// non-empty, otherwise generated. The client ip comes from the first
/// `x-forwarded-for` entry, falling back to `x-real-ip`; there is deliberately
/// no fallback to the transport peer address, so the field is absent for
/// direct connections. Header name matching is case-insensitive by
/// construction of [`http::HeaderMap`].
pub(crate) fn capture<B>(req: &Request<B>, config: &WideEventConfig) -> WideEvent {
    let headers = req.headers();
    WideEvent {
        request_id:          request_id(headers, config),
        timestamp:           Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        method:              req.method().to_string(),
        path:                req.uri().path().to_string(),
        query_params:        query_params(req.uri().query()),
        status_code:         None,
        duration_ms:         None,
        client_ip:           client_ip(headers),
        user_agent:          header_string(headers, header::USER_AGENT.as_str()),
        content_type:        header_string(headers, header::CONTENT_TYPE.as_str()),
        request_size_bytes:  content_length(headers),
        response_size_bytes: None,
        user:                None,
        business:            None,
        infra:               None,
        service:             None,
        error:               None,
    }
}

fn request_id(headers: &HeaderMap, config: &WideEventConfig) -> String {
    header_string(headers, config.header_name.as_str())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| (config.id_generator)())
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = header_string(headers, FORWARDED_FOR) {
        return forwarded
            .split(',')
            .next()
            .map(|ip| ip.trim().to_string());
    }
    header_string(headers, REAL_IP)
}

/// Decodes the query string into a flat map. Duplicate keys: last value wins.
fn query_params(query: Option<&str>) -> BTreeMap<String, String> {
    let Some(query) = query else {
        return BTreeMap::new();
    };
    match serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
        Ok(pairs) => pairs.into_iter().collect(),
        Err(error) => {
            tracing::warn!(%error, "undecodable query string, capturing no params");
            BTreeMap::new()
        }
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
}

pub(crate) fn content_length(headers: &HeaderMap) -> Option<u64> {
    header_string(headers, header::CONTENT_LENGTH.as_str())
        .and_then(|value| value.parse().ok())
}
