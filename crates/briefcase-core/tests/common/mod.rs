//! Scripted server and fixtures shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use briefcase_core::mirror::MirrorLayout;
use briefcase_core::retry::RetryConfig;
use briefcase_core::storage::MemoryBlobStore;
use briefcase_core::sync::{submission_query, CancelToken, SyncClient};
use briefcase_core::transport::{
    HttpMethod, ServerEndpoints, Transport, TransportRequest, TransportResponse,
};
use briefcase_core::{Error, Result};

pub const BASE: &str = "https://agg.example.com/";

/// What the fake server does for one request.
#[derive(Debug, Clone)]
pub enum Reply {
    Respond(TransportResponse),
    ConnectionError,
}

/// In-memory server answering from scripted routes and logging every request.
///
/// A route holding several replies serves them in order and then keeps
/// repeating the last one. Unknown routes answer 404.
#[derive(Default)]
pub struct FakeServer {
    routes: Mutex<HashMap<(HttpMethod, String), VecDeque<Reply>>>,
    requests: Mutex<Vec<TransportRequest>>,
    cancel_on: Mutex<Option<(String, CancelToken)>>,
}

pub fn key(url: &str) -> String {
    url::Url::parse(url).unwrap().to_string()
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, method: HttpMethod, url: &str, replies: Vec<Reply>) {
        self.routes
            .lock()
            .unwrap()
            .insert((method, key(url)), replies.into());
    }

    pub fn get(&self, url: &str, status: u16, body: &str) {
        self.route(
            HttpMethod::Get,
            url,
            vec![Reply::Respond(TransportResponse::new(status, body))],
        );
    }

    pub fn get_sequence(&self, url: &str, bodies: &[&str]) {
        self.route(
            HttpMethod::Get,
            url,
            bodies
                .iter()
                .map(|body| Reply::Respond(TransportResponse::new(200, *body)))
                .collect(),
        );
    }

    pub fn head(&self, url: &str, response: TransportResponse) {
        self.route(HttpMethod::Head, url, vec![Reply::Respond(response)]);
    }

    /// Media file served by `GET` after a plain `200` to `HEAD`.
    pub fn media(&self, url: &str, body: &str) {
        self.head(url, TransportResponse::new(200, ""));
        self.get(url, 200, body);
    }

    /// Cancel `token` while answering the request for `url`.
    pub fn cancel_when_requested(&self, url: &str, token: CancelToken) {
        *self.cancel_on.lock().unwrap() = Some((key(url), token));
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    /// Resolved URLs of every request with `method`, in order.
    pub fn urls(&self, method: HttpMethod) -> Vec<String> {
        self.requests()
            .iter()
            .filter(|request| request.method == method)
            .map(|request| request.resolved_url().unwrap().to_string())
            .collect()
    }

    pub fn count(&self, method: HttpMethod, url: &str) -> usize {
        let wanted = key(url);
        self.urls(method).iter().filter(|url| **url == wanted).count()
    }

    pub fn count_prefix(&self, method: HttpMethod, prefix: &str) -> usize {
        self.urls(method)
            .iter()
            .filter(|url| url.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl Transport for FakeServer {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let url = request.resolved_url()?.to_string();
        let method = request.method;
        self.requests.lock().unwrap().push(request);

        if let Some((cancel_url, token)) = self.cancel_on.lock().unwrap().as_ref() {
            if *cancel_url == url {
                token.cancel();
            }
        }

        let reply = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(&(method, url.clone())) {
                Some(replies) if replies.len() > 1 => replies.pop_front(),
                Some(replies) => replies.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::ConnectionError) => {
                Err(Error::Transport(format!("connection refused: {url}")))
            }
            None => Ok(TransportResponse::new(404, "not found")),
        }
    }
}

pub fn form_list_url() -> String {
    format!("{BASE}formList")
}

pub fn download_url(form_id: &str) -> String {
    format!("{BASE}formXml?formId={form_id}")
}

pub fn manifest_url(form_id: &str) -> String {
    format!("{BASE}xformsManifest?formId={form_id}")
}

pub fn submission_list_url(form_id: &str, cursor: &str) -> String {
    TransportRequest::get(format!("{BASE}view/submissionList"))
        .query("formId", form_id)
        .query("numEntries", 100)
        .query("cursor", cursor)
        .resolved_url()
        .unwrap()
        .to_string()
}

pub fn submission_url(form_id: &str, submission_id: &str) -> String {
    TransportRequest::get(format!("{BASE}view/downloadSubmission"))
        .query("formId", submission_query(form_id, submission_id))
        .resolved_url()
        .unwrap()
        .to_string()
}

pub fn xform_entry(form_id: &str, name: &str, with_manifest: bool) -> String {
    let manifest = if with_manifest {
        format!("<manifestUrl>{}</manifestUrl>", manifest_url(form_id))
    } else {
        String::new()
    };
    format!(
        "<xform><formID>{form_id}</formID><name>{name}</name><version/>\
         <downloadUrl>{}</downloadUrl>{manifest}</xform>",
        download_url(form_id)
    )
}

pub fn form_list(entries: &[String]) -> String {
    format!(
        "<xforms xmlns=\"http://openrosa.org/xforms/xformsList\">{}</xforms>",
        entries.concat()
    )
}

pub fn form_definition(form_id: &str, title: &str) -> String {
    format!(
        "\n  <h:html xmlns:h=\"http://www.w3.org/1999/xhtml\" xmlns=\"http://www.w3.org/2002/xforms\">\
         <h:head><h:title>{title}</h:title><model><instance>\
         <{form_id} id=\"{form_id}\"><name/><photo/></{form_id}>\
         </instance></model></h:head><h:body/></h:html>\n"
    )
}

/// Manifest listing `(filename, url)` pairs.
pub fn manifest(files: &[(&str, &str)]) -> String {
    let entries: String = files
        .iter()
        .map(|(name, url)| {
            format!(
                "<mediaFile><filename>{name}</filename><hash>md5:0</hash>\
                 <downloadUrl>{url}</downloadUrl></mediaFile>"
            )
        })
        .collect();
    format!("<manifest xmlns=\"http://openrosa.org/xforms/xformsManifest\">{entries}</manifest>")
}

pub fn id_chunk(ids: &[&str], cursor: Option<&str>) -> String {
    let ids: String = ids.iter().map(|id| format!("<id>{id}</id>")).collect();
    let cursor = cursor
        .map(|cursor| format!("<resumptionCursor>{cursor}</resumptionCursor>"))
        .unwrap_or_default();
    format!(
        "<idChunk xmlns=\"http://opendatakit.org/submissions\"><idList>{ids}</idList>{cursor}</idChunk>"
    )
}

/// Submission document wrapping one instance of `form_id`.
pub fn submission(form_id: &str, instance_id: &str, name: &str, media: &[(&str, &str)]) -> String {
    let media: String = media
        .iter()
        .map(|(file, url)| {
            format!(
                "<mediaFile><filename>{file}</filename><hash>md5:0</hash>\
                 <downloadUrl>{url}</downloadUrl></mediaFile>"
            )
        })
        .collect();
    format!(
        "  <submission xmlns=\"http://opendatakit.org/submissions\">\
         <data><{form_id} id=\"{form_id}\" instanceID=\"{instance_id}\"><name>{name}</name></{form_id}></data>\
         {media}</submission>\n"
    )
}

pub fn fast_retry() -> RetryConfig {
    RetryConfig::new(2, Duration::from_secs(1), 2.0).unwrap()
}

pub fn layout() -> MirrorLayout {
    MirrorLayout::for_user("alice").unwrap()
}

pub fn client(server: &Arc<FakeServer>, blobs: &Arc<MemoryBlobStore>) -> SyncClient {
    SyncClient::new(
        server.clone(),
        blobs.clone(),
        layout(),
        ServerEndpoints::new(BASE).unwrap(),
    )
    .with_retry(fast_retry())
}

pub async fn read_blob(blobs: &MemoryBlobStore, path: &str) -> String {
    use briefcase_core::storage::BlobStore;

    let bytes = blobs.read(std::path::Path::new(path)).await.unwrap();
    String::from_utf8(bytes).unwrap()
}
