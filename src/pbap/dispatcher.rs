// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! OBEX server callbacks for one PBAP session.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::address::{resolve_address, set_path, ContentAddress, ContentType, RequestType};
use super::app_params::{RequestParameters, ResponseParameters, SearchAttribute, SortOrder};
use super::filter::{VCardFilter, VCardSelector};
use super::listing::build_listing_xml;
use super::selector::{ContentSelector, PullOptions, CALL_LOG_BATCH_LIMIT};
use super::version::VersionState;
use super::AbortFlag;
use crate::error::PbapError;
use crate::obex::{Header, HeaderSet, Response, ResponseCode, SetPathFlags};
use crate::storage::ContactOrder;

/// Target UUID a PBAP client connects to.
pub const PBAP_TARGET: [u8; 16] = [
    0x79, 0x61, 0x35, 0xf0, 0xf0, 0xc5, 0x11, 0xd8, 0x09, 0x66, 0x08, 0x00, 0x20, 0x0c, 0x9a, 0x66,
];

/// Length of the ".vcf" suffix plus at least one character.
const VCARD_NAME_MIN_LENGTH: usize = 5;

/// Output side of a GET.
///
/// `send_headers` is called at most once and always before the first body
/// chunk.
pub trait GetResponder {
    fn send_headers(&mut self, app_params: Vec<u8>) -> Result<(), PbapError>;

    fn write_body(&mut self, chunk: &[u8]) -> Result<(), PbapError>;
}

/// Responder that keeps the whole response in memory.
#[derive(Debug, Default)]
pub struct CollectedResponse {
    pub app_params: Option<Vec<u8>>,
    pub body: Vec<u8>,
}

impl CollectedResponse {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl GetResponder for CollectedResponse {
    fn send_headers(&mut self, app_params: Vec<u8>) -> Result<(), PbapError> {
        self.app_params = Some(app_params);
        Ok(())
    }

    fn write_body(&mut self, chunk: &[u8]) -> Result<(), PbapError> {
        self.body.extend_from_slice(chunk);
        Ok(())
    }
}

/// Per-session request dispatcher.
pub struct ObexDispatcher {
    selector: Arc<ContentSelector>,
    versions: Arc<VersionState>,
    current_path: String,
    /// Order of the last listing; single pulls address entries in it.
    order: ContactOrder,
    /// Parameters sent with Connect, for the peer's supported features.
    peer: RequestParameters,
    connection_id: u32,
    abort: AbortFlag,
}

impl ObexDispatcher {
    pub fn new(selector: Arc<ContentSelector>, versions: Arc<VersionState>) -> Self {
        Self {
            selector,
            versions,
            current_path: String::new(),
            order: ContactOrder::Indexed,
            peer: RequestParameters::default(),
            connection_id: 1,
            abort: AbortFlag::new(),
        }
    }

    pub fn current_path(&self) -> &str {
        &self.current_path
    }

    /// Flag the connection task raises when the peer aborts a GET.
    pub fn abort_flag(&self) -> AbortFlag {
        self.abort.clone()
    }

    pub fn on_connect(&mut self, headers: &HeaderSet) -> Response {
        let target = match headers.target() {
            Some(target) if target == PBAP_TARGET => target.to_vec(),
            Some(target) => {
                warn!("Connect with wrong target {}", hex::encode(target));
                return Response::connect(ResponseCode::NotAcceptable, HeaderSet::new());
            }
            None => {
                warn!("Connect without target");
                return Response::connect(ResponseCode::NotAcceptable, HeaderSet::new());
            }
        };

        if let Some(bytes) = headers.app_params() {
            match RequestParameters::decode(bytes) {
                Ok(params) => {
                    debug!("Peer features: {:?}", params.supported_features);
                    self.peer = params;
                }
                Err(e) => {
                    warn!("Bad connect parameters: {}", e);
                    return Response::connect(ResponseCode::BadRequest, HeaderSet::new());
                }
            }
        }

        let mut reply = HeaderSet::new()
            .with(Header::Who(target))
            .with(Header::ConnectionId(self.connection_id));
        if let Some(who) = headers.who() {
            reply.add(Header::Target(who.to_vec()));
        }

        self.current_path.clear();
        info!("OBEX session connected");
        Response::connect(ResponseCode::Success, reply)
    }

    pub fn on_set_path(&mut self, flags: SetPathFlags, headers: &HeaderSet) -> ResponseCode {
        match set_path(&self.current_path, headers.name(), flags.backup, flags.create) {
            Ok(path) => {
                debug!("Path '{}' -> '{}'", self.current_path, path);
                self.current_path = path;
                ResponseCode::Success
            }
            Err(e) => {
                warn!("SetPath rejected: {}", e);
                e.response_code()
            }
        }
    }

    /// Answer a GET. The response is written to `out`; the returned code
    /// ends the exchange.
    pub fn on_get(&mut self, headers: &HeaderSet, out: &mut dyn GetResponder) -> ResponseCode {
        match self.handle_get(headers, out) {
            Ok(code) => {
                debug!("GET answered with {}", code);
                code
            }
            Err(e) => {
                warn!("GET failed: {}", e);
                e.response_code()
            }
        }
    }

    pub fn on_put(&mut self) -> ResponseCode {
        warn!("PUT is not supported by a phonebook server");
        ResponseCode::BadRequest
    }

    pub fn on_abort(&mut self) -> ResponseCode {
        info!("Peer aborted the current operation");
        self.abort.raise();
        ResponseCode::Success
    }

    pub fn on_disconnect(&mut self) -> ResponseCode {
        info!("OBEX session disconnected");
        self.current_path.clear();
        ResponseCode::Success
    }

    fn handle_get(
        &mut self,
        headers: &HeaderSet,
        out: &mut dyn GetResponder,
    ) -> Result<ResponseCode, PbapError> {
        self.abort.clear();

        let mime = headers.mime_type().ok_or(PbapError::MissingType)?;
        let request_type = RequestType::parse(mime)
            .ok_or_else(|| PbapError::InvalidType(mime.to_string()))?;

        let params = match headers.app_params() {
            Some(bytes) => RequestParameters::decode(bytes)?,
            None => RequestParameters::default(),
        };

        let name = headers.name();
        let address = resolve_address(request_type, name, &self.current_path)?;
        info!(
            "GET {} name={:?} path='{}' -> {:?}",
            request_type.as_str(),
            name,
            self.current_path,
            address.content
        );

        match request_type {
            RequestType::Listing => self.pull_listing(&address, &params, out),
            RequestType::VCard => self.pull_entry(&address, name.unwrap_or(""), &params, out),
            RequestType::Phonebook => self.pull_phonebook(&address, name, &params, out),
        }
    }

    fn options(params: &RequestParameters) -> PullOptions {
        PullOptions {
            version: params.format,
            filter: VCardFilter::from_selector(params.property_selector),
            selector: VCardSelector::from_mask(params.vcard_selector, params.selector_operator),
        }
    }

    /// Send the application parameters of the response.
    ///
    /// Returns `true` when the request only asked for the size.
    fn send_response_params(
        &self,
        address: &ContentAddress,
        params: &RequestParameters,
        size: usize,
        out: &mut dyn GetResponder,
    ) -> Result<bool, PbapError> {
        let mut reply = ResponseParameters::new();
        if params.size_only {
            reply.phonebook_size(u16::try_from(size).unwrap_or(u16::MAX));
        }
        if address.needs_new_missed_calls() {
            reply.new_missed_calls(self.selector.new_missed_calls()?);
        }

        if params.size_only {
            self.versions.on_size_only_response(
                address.content,
                &self.peer,
                self.selector.calls(),
                &mut reply,
            )?;
        } else {
            self.versions.append_database_identifier(&self.peer, &mut reply);
            match address.content {
                ContentType::Phonebook => {
                    self.versions.on_phonebook_headers(&self.peer, &mut reply)
                }
                other => self.versions.on_call_history_headers(
                    other,
                    &self.peer,
                    self.selector.calls(),
                    &mut reply,
                )?,
            }
        }

        if !reply.is_empty() {
            out.send_headers(reply.into_bytes())?;
        }
        if params.size_only {
            info!("Size-only response for {:?}: {}", address.content, size);
        }
        Ok(params.size_only)
    }

    fn mark_call_log_fetched(&self, content: ContentType) {
        if content.is_call_history() {
            self.versions
                .mark_call_log_fetched(chrono::Utc::now().timestamp_millis());
        }
    }

    fn pull_listing(
        &mut self,
        address: &ContentAddress,
        params: &RequestParameters,
        out: &mut dyn GetResponder,
    ) -> Result<ResponseCode, PbapError> {
        let attribute = match params.search_attribute.unwrap_or(SearchAttribute::Name) {
            attr @ (SearchAttribute::Name | SearchAttribute::Number) => attr,
            SearchAttribute::Sound => {
                return Err(PbapError::NotImplemented("search by sound".to_string()))
            }
            SearchAttribute::Reserved(v) => {
                return Err(PbapError::PreconditionFailed(format!(
                    "search attribute {}",
                    v
                )))
            }
        };

        let opts = Self::options(params);
        let size = self.selector.size(address.content, &opts)?;
        if self.send_response_params(address, params, size, out)? {
            return Ok(ResponseCode::Success);
        }
        if size == 0 {
            debug!("{:?} is empty", address.content);
            return Ok(ResponseCode::Success);
        }

        self.order = match params.order.unwrap_or(SortOrder::Indexed) {
            SortOrder::Indexed => ContactOrder::Indexed,
            SortOrder::Alphabetical => ContactOrder::Alphabetical,
            SortOrder::Phonetical => {
                return Err(PbapError::NotImplemented("phonetical order".to_string()))
            }
            SortOrder::Reserved(v) => {
                return Err(PbapError::PreconditionFailed(format!("order {}", v)))
            }
        };

        let offset = usize::from(params.list_start_offset);
        let max = usize::from(params.max_list_count).min(size);
        let entries = match address.content {
            ContentType::Phonebook => self.selector.list_phonebook(
                self.order,
                attribute,
                &params.search_value,
                offset,
                max,
                &opts,
            )?,
            other => self.selector.list_call_history(other, offset, max, &opts)?,
        };

        out.write_body(build_listing_xml(&entries).as_bytes())?;
        self.mark_call_log_fetched(address.content);
        info!("Listed {} entries of {:?}", entries.len(), address.content);
        Ok(ResponseCode::Success)
    }

    fn pull_entry(
        &mut self,
        address: &ContentAddress,
        name: &str,
        params: &RequestParameters,
        out: &mut dyn GetResponder,
    ) -> Result<ResponseCode, PbapError> {
        let handle = parse_handle(name)?;

        let opts = Self::options(params).unselected();
        let size = self.selector.size(address.content, &opts)?;
        if self.send_response_params(address, params, size, out)? {
            return Ok(ResponseCode::Success);
        }
        if size == 0 {
            return Err(PbapError::NotFound(format!("{:?} is empty", address.content)));
        }

        let card = self
            .selector
            .pull_single(address.content, handle, self.order, &opts)?;
        out.write_body(card.as_bytes())?;
        self.mark_call_log_fetched(address.content);
        Ok(ResponseCode::Success)
    }

    fn pull_phonebook(
        &mut self,
        address: &ContentAddress,
        name: Option<&str>,
        params: &RequestParameters,
        out: &mut dyn GetResponder,
    ) -> Result<ResponseCode, PbapError> {
        if let Some((_, extension)) = name.and_then(|n| n.split_once('.')) {
            if !extension.starts_with("vcf") {
                return Err(PbapError::NotAcceptable(format!(
                    "not a vcf object: {:?}",
                    name
                )));
            }
        }

        let opts = Self::options(params);
        let reported = self.selector.size(address.content, &opts)?;
        if self.send_response_params(address, params, reported, out)? {
            return Ok(ResponseCode::Success);
        }

        // Handles address unselected positions.
        let total = if opts.selector.is_some() {
            self.selector.size(address.content, &opts.unselected())?
        } else {
            reported
        };
        let Some((start, end)) = pull_window(address.content, total, params) else {
            return Ok(ResponseCode::Success);
        };

        let (first, last) = match address.content {
            ContentType::Phonebook => (start, end),
            _ => (start + 1, end + 1),
        };
        debug!("Pulling {:?} handles {}..={}", address.content, first, last);

        let emitted = self.selector.pull_range(
            address.content,
            first,
            last,
            self.order,
            &opts,
            &self.abort,
            &mut |card: &str| out.write_body(card.as_bytes()),
        )?;
        self.mark_call_log_fetched(address.content);
        info!("Sent {} vCards of {:?}", emitted, address.content);
        Ok(ResponseCode::Success)
    }
}

/// Handle number of a `N.vcf` name.
fn parse_handle(name: &str) -> Result<usize, PbapError> {
    if name.chars().count() < VCARD_NAME_MIN_LENGTH {
        return Err(PbapError::NotAcceptable(format!("bad vCard name {:?}", name)));
    }
    let cut = name
        .char_indices()
        .rev()
        .nth(3)
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    let index = name[..cut].trim();
    if index.is_empty() {
        return Ok(0);
    }
    index
        .parse()
        .map_err(|_| PbapError::NotAcceptable(format!("bad vCard name {:?}", name)))
}

/// Zero-based positions `start..=end` a range pull covers, or `None` for an empty body.
fn pull_window(
    content: ContentType,
    size: usize,
    params: &RequestParameters,
) -> Option<(usize, usize)> {
    if size == 0 {
        return None;
    }
    let start = usize::from(params.list_start_offset);
    if start >= size {
        warn!("List start offset {} is past the end ({})", start, size);
        return None;
    }
    let mut count = usize::from(params.max_list_count).min(size);
    if content.is_call_history() {
        count = count.min(CALL_LOG_BATCH_LIMIT);
    }
    if count == 0 {
        return None;
    }
    Some((start, (start + count - 1).min(size - 1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pbap::app_params::tag;
    use crate::storage::{
        CallKind, CallRecord, Contact, OwnerCard, PhoneKind, SqlitePhonebook, TextComposer,
    };

    fn dispatcher(store: Arc<SqlitePhonebook>) -> ObexDispatcher {
        let selector = ContentSelector::new(
            store.clone(),
            store,
            Arc::new(TextComposer),
            OwnerCard {
                name: "Owner".into(),
                number: "+15550000000".into(),
            },
            false,
        );
        ObexDispatcher::new(Arc::new(selector), VersionState::new())
    }

    fn connected(store: Arc<SqlitePhonebook>, path: &str) -> ObexDispatcher {
        let mut d = dispatcher(store);
        let reply = d.on_connect(&HeaderSet::new().with(Header::Target(PBAP_TARGET.to_vec())));
        assert_eq!(reply.code, ResponseCode::Success);
        d.current_path = path.to_string();
        d
    }

    fn get(
        d: &mut ObexDispatcher,
        mime: &str,
        name: Option<&str>,
        params: Option<Vec<u8>>,
    ) -> (ResponseCode, CollectedResponse) {
        let mut headers = HeaderSet::new().with(Header::Type(mime.to_string()));
        if let Some(name) = name {
            headers.add(Header::Name(name.to_string()));
        }
        if let Some(params) = params {
            headers.add(Header::ApplicationParameters(params));
        }
        let mut out = CollectedResponse::default();
        let code = d.on_get(&headers, &mut out);
        (code, out)
    }

    fn store_with_contacts(n: usize) -> Arc<SqlitePhonebook> {
        let store = Arc::new(SqlitePhonebook::open_in_memory().unwrap());
        for i in 0..n {
            let contact = Contact::new(&format!("Contact {}", i))
                .with_phone(&format!("+4930{:07}", i), PhoneKind::Cell);
            store.add_contact(&contact).unwrap();
        }
        store
    }

    #[test]
    fn test_connect_checks_target() {
        let mut d = dispatcher(store_with_contacts(0));
        let reply = d.on_connect(&HeaderSet::new());
        assert_eq!(reply.code, ResponseCode::NotAcceptable);

        let reply = d.on_connect(&HeaderSet::new().with(Header::Target(vec![0; 16])));
        assert_eq!(reply.code, ResponseCode::NotAcceptable);

        let reply = d.on_connect(
            &HeaderSet::new()
                .with(Header::Target(PBAP_TARGET.to_vec()))
                .with(Header::Who(vec![1, 2, 3])),
        );
        assert_eq!(reply.code, ResponseCode::Success);
        assert_eq!(reply.headers.who(), Some(&PBAP_TARGET[..]));
        assert_eq!(reply.headers.target(), Some(&[1u8, 2, 3][..]));
        assert_eq!(reply.headers.connection_id(), Some(1));
    }

    #[test]
    fn test_connect_rejects_bad_params() {
        let mut d = dispatcher(store_with_contacts(0));
        let reply = d.on_connect(
            &HeaderSet::new()
                .with(Header::Target(PBAP_TARGET.to_vec()))
                .with(Header::ApplicationParameters(vec![0x10, 0x02, 0, 0])),
        );
        assert_eq!(reply.code, ResponseCode::BadRequest);
    }

    #[test]
    fn test_set_path() {
        let mut d = dispatcher(store_with_contacts(0));
        let forward = SetPathFlags { backup: false, create: false };
        let named = |n: &str| HeaderSet::new().with(Header::Name(n.to_string()));

        assert_eq!(d.on_set_path(forward, &named("telecom")), ResponseCode::Success);
        assert_eq!(d.on_set_path(forward, &named("pb")), ResponseCode::Success);
        assert_eq!(d.current_path(), "/telecom/pb");

        assert_eq!(d.on_set_path(forward, &named("nope")), ResponseCode::NotFound);
        assert_eq!(d.current_path(), "/telecom/pb");

        let create = SetPathFlags { backup: false, create: true };
        assert_eq!(d.on_set_path(create, &named("nope")), ResponseCode::Forbidden);

        let backup = SetPathFlags { backup: true, create: false };
        assert_eq!(d.on_set_path(backup, &HeaderSet::new()), ResponseCode::Success);
        assert_eq!(d.current_path(), "/telecom");

        assert_eq!(d.on_set_path(forward, &HeaderSet::new()), ResponseCode::Success);
        assert_eq!(d.current_path(), "");
    }

    #[test]
    fn test_get_requires_known_type() {
        let mut d = connected(store_with_contacts(1), "/telecom/pb");
        let mut out = CollectedResponse::default();
        assert_eq!(d.on_get(&HeaderSet::new(), &mut out), ResponseCode::BadRequest);

        let (code, _) = get(&mut d, "text/plain", None, None);
        assert_eq!(code, ResponseCode::BadRequest);

        let (code, _) = get(&mut d, "X-BT/VCARD-LISTING", None, None);
        assert_eq!(code, ResponseCode::Success);
    }

    #[test]
    fn test_get_rejects_bad_params() {
        let mut d = connected(store_with_contacts(1), "/telecom/pb");
        let (code, _) = get(&mut d, "x-bt/vcard-listing", None, Some(vec![0x42, 0x01, 0x00]));
        assert_eq!(code, ResponseCode::BadRequest);
    }

    #[test]
    fn test_listing_search_attribute_checks() {
        let mut d = connected(store_with_contacts(1), "/telecom/pb");
        let cases = [
            (tag::SEARCH_ATTRIBUTE, 2, ResponseCode::NotImplemented),
            (tag::SEARCH_ATTRIBUTE, 7, ResponseCode::PreconditionFailed),
            (tag::ORDER, 2, ResponseCode::NotImplemented),
            (tag::ORDER, 9, ResponseCode::PreconditionFailed),
        ];
        for (tag_id, value, expected) in cases {
            let (code, _) = get(&mut d, "x-bt/vcard-listing", None, Some(vec![tag_id, 1, value]));
            assert_eq!(code, expected);
        }
    }

    #[test]
    fn test_listing_order_is_remembered() {
        let store = Arc::new(SqlitePhonebook::open_in_memory().unwrap());
        store.add_contact(&Contact::new("Zed")).unwrap();
        store.add_contact(&Contact::new("Amy")).unwrap();
        let mut d = connected(store, "/telecom/pb");

        let (_, out) = get(&mut d, "x-bt/vcard", Some("1.vcf"), None);
        assert!(out.body_text().contains("FN:Zed"));

        let (code, out) = get(&mut d, "x-bt/vcard-listing", None, Some(vec![tag::ORDER, 1, 1]));
        assert_eq!(code, ResponseCode::Success);
        assert!(out.body_text().contains("<card handle=\"1.vcf\" name=\"Amy\"/>"));

        let (_, out) = get(&mut d, "x-bt/vcard", Some("1.vcf"), None);
        assert!(out.body_text().contains("FN:Amy"));
    }

    #[test]
    fn test_single_pull_names() {
        let mut d = connected(store_with_contacts(2), "/telecom/pb");
        let (code, _) = get(&mut d, "x-bt/vcard", Some(".vcf"), None);
        assert_eq!(code, ResponseCode::NotAcceptable);
        let (code, _) = get(&mut d, "x-bt/vcard", Some("ab.vcf"), None);
        assert_eq!(code, ResponseCode::NotAcceptable);
        let (code, out) = get(&mut d, "x-bt/vcard", Some(" .vcf"), None);
        assert_eq!(code, ResponseCode::Success);
        assert!(out.body_text().contains("FN:Owner"));
        let (code, _) = get(&mut d, "x-bt/vcard", Some("3.vcf"), None);
        assert_eq!(code, ResponseCode::NotFound);
    }

    #[test]
    fn test_single_pull_at_telecom_root() {
        let mut d = connected(store_with_contacts(2), "/telecom");
        let (code, _) = get(&mut d, "x-bt/vcard", Some("1.vcf"), None);
        assert_eq!(code, ResponseCode::NotAcceptable);
    }

    #[test]
    fn test_phonebook_pull_checks_extension() {
        let mut d = connected(store_with_contacts(2), "");
        let (code, _) = get(&mut d, "x-bt/phonebook", Some("telecom/pb/list.txt"), None);
        assert_eq!(code, ResponseCode::NotAcceptable);
        let (code, out) = get(&mut d, "x-bt/phonebook", Some("telecom/pb.vcf"), None);
        assert_eq!(code, ResponseCode::Success);
        assert_eq!(out.body_text().matches("BEGIN:VCARD").count(), 3);
    }

    #[test]
    fn test_call_history_batch_limit() {
        let store = Arc::new(SqlitePhonebook::open_in_memory().unwrap());
        let now = chrono::Utc::now();
        for i in 0..60 {
            store
                .add_call(&CallRecord::new(
                    &format!("+1555{:07}", i),
                    CallKind::Incoming,
                    now - chrono::Duration::seconds(i),
                ))
                .unwrap();
        }
        let mut d = connected(store, "");
        let (code, out) = get(&mut d, "x-bt/phonebook", Some("telecom/ich.vcf"), None);
        assert_eq!(code, ResponseCode::Success);
        assert_eq!(out.body_text().matches("BEGIN:VCARD").count(), CALL_LOG_BATCH_LIMIT);
    }

    #[test]
    fn test_offset_past_end_has_no_body() {
        let mut d = connected(store_with_contacts(2), "");
        let (code, out) = get(
            &mut d,
            "x-bt/phonebook",
            Some("telecom/pb.vcf"),
            Some(vec![tag::LIST_START_OFFSET, 2, 0, 9]),
        );
        assert_eq!(code, ResponseCode::Success);
        assert!(out.body.is_empty());
    }

    #[test]
    fn test_missed_calls_header() {
        let store = Arc::new(SqlitePhonebook::open_in_memory().unwrap());
        store
            .add_call(&CallRecord::new("+15550100000", CallKind::Missed, chrono::Utc::now()))
            .unwrap();
        let mut d = connected(store, "/telecom/mch");
        let (code, out) = get(&mut d, "x-bt/vcard-listing", None, None);
        assert_eq!(code, ResponseCode::Success);
        assert_eq!(out.app_params, Some(vec![tag::NEW_MISSED_CALLS, 1, 1]));
        assert!(out.body_text().contains("<card handle=\"1.vcf\""));
    }

    #[test]
    fn test_abort_and_disconnect() {
        let mut d = connected(store_with_contacts(0), "");
        let flag = d.abort_flag();
        assert_eq!(d.on_abort(), ResponseCode::Success);
        assert!(flag.is_raised());

        // The next GET starts with a cleared flag.
        let (_, _) = get(&mut d, "x-bt/vcard-listing", Some("telecom/pb.vcf"), None);
        assert!(!flag.is_raised());

        assert_eq!(d.on_put(), ResponseCode::BadRequest);
        assert_eq!(d.on_disconnect(), ResponseCode::Success);
    }

    #[test]
    fn test_parse_handle() {
        assert_eq!(parse_handle("12.vcf").unwrap(), 12);
        assert_eq!(parse_handle("0.vcf").unwrap(), 0);
        assert!(parse_handle("x.vcf").is_err());
        assert!(parse_handle("vcf").is_err());
    }
}
