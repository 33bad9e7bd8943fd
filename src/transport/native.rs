//! Native transport backed by `reqwest::blocking`.

use std::time::Duration;

use log::debug;
use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_TYPE, COOKIE};
use reqwest::redirect::Policy;

use super::{
    Body, Connector, Handle, Method, Transfer, TransferInfo, TransferOptions, TransportErrorKind,
    TransportFailure,
};
use crate::http::Origin;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Opens [`NativeHandle`]s.
#[derive(Debug, Clone, Default)]
pub struct NativeConnector;

impl Connector for NativeConnector {
    #[tracing::instrument(skip(self))]
    fn open(&self, origin: &Origin) -> Box<dyn Handle> {
        debug!("Opening transport handle for {}", origin);
        Box::new(NativeHandle::new())
    }
}

/// Client-level settings; a change forces the handle to rebuild its client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ClientSettings {
    connect_timeout: Option<Duration>,
    follow_redirects: bool,
    max_redirects: usize,
    compression: bool,
    verbose: bool,
}

impl ClientSettings {
    fn from_options(options: &TransferOptions) -> Self {
        Self {
            connect_timeout: options.timeout.duration(),
            follow_redirects: options.follow_redirects,
            max_redirects: options.max_redirects,
            compression: options.compression,
            verbose: options.verbose,
        }
    }

    fn build(&self) -> reqwest::Result<Client> {
        let redirect = if self.follow_redirects {
            Policy::limited(self.max_redirects)
        } else {
            Policy::none()
        };

        Client::builder()
            .user_agent(concat!("reqkit/", env!("CARGO_PKG_VERSION")))
            .redirect(redirect)
            .gzip(self.compression)
            .connection_verbose(self.verbose)
            .connect_timeout(self.connect_timeout)
            .timeout(None::<Duration>)
            .build()
    }
}

/// A reusable reqwest session. Connections to the origin are kept alive in
/// the inner client between transfers.
pub struct NativeHandle {
    client: Option<(ClientSettings, Client)>,
}

impl NativeHandle {
    pub fn new() -> Self {
        Self { client: None }
    }

    fn client_for(&mut self, settings: ClientSettings) -> reqwest::Result<Client> {
        match &self.client {
            Some((current, client)) if *current == settings => Ok(client.clone()),
            _ => {
                let client = settings.build()?;
                self.client = Some((settings, client.clone()));
                Ok(client)
            }
        }
    }
}

impl Default for NativeHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl Handle for NativeHandle {
    #[tracing::instrument(skip(self, options), fields(method = %options.method, url = %options.url))]
    fn perform(&mut self, options: &TransferOptions) -> Transfer {
        let client = match self.client_for(ClientSettings::from_options(options)) {
            Ok(client) => client,
            Err(e) => {
                return Transfer::failed(
                    &options.url,
                    0,
                    TransportFailure::new(TransportErrorKind::FailedInit, error_chain(&e)),
                );
            }
        };

        let method = match options.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };

        if options.verbose {
            debug!("> {} {}", options.method, options.url);
            for line in options.header_lines() {
                debug!("> {}", line);
            }
        }

        let mut request = client.request(method, &options.url);
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(cookie) = &options.cookie {
            request = request.header(COOKIE, cookie.as_str());
        }
        if let Some(timeout) = options.timeout.duration() {
            request = request.timeout(timeout);
        }
        match &options.body {
            Some(Body::Text(text)) => {
                let has_content_type = options
                    .headers
                    .iter()
                    .any(|(name, _)| name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()));
                if !has_content_type {
                    request = request.header(CONTENT_TYPE, FORM_CONTENT_TYPE);
                }
                request = request.body(text.clone());
            }
            Some(Body::Form(pairs)) => {
                request = request.form(pairs);
            }
            None => {}
        }

        match request.send() {
            Ok(response) => read_response(response, options),
            Err(e) => {
                let url = e
                    .url()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| options.url.clone());
                let status = e.status().map(|s| s.as_u16()).unwrap_or(0);
                debug!("Transfer to {} failed: {}", url, error_chain(&e));
                Transfer::failed(url, status, classify(&e))
            }
        }
    }

    fn close(&mut self) {
        self.client = None;
    }
}

fn read_response(response: Response, options: &TransferOptions) -> Transfer {
    let url = response.url().to_string();
    let status = response.status();

    let header_block = if options.include_headers {
        raw_header_block(&response)
    } else {
        String::new()
    };

    if options.verbose {
        debug!("< {:?} {}", response.version(), status);
    }

    match response.bytes() {
        Ok(body) => {
            let header_size = header_block.len();
            let mut payload = header_block.into_bytes();
            payload.extend_from_slice(&body);
            Transfer::completed(
                payload,
                TransferInfo {
                    url,
                    status: status.as_u16(),
                    header_size,
                    error: None,
                },
            )
        }
        Err(e) => Transfer::failed(url, status.as_u16(), classify(&e)),
    }
}

/// Rebuilds the header block the way it appeared on the wire: status line,
/// one `Name: value` line per header, terminated by an empty line.
fn raw_header_block(response: &Response) -> String {
    let mut block = format!("{:?} {}\r\n", response.version(), response.status());
    for (name, value) in response.headers() {
        block.push_str(name.as_str());
        block.push_str(": ");
        block.push_str(&String::from_utf8_lossy(value.as_bytes()));
        block.push_str("\r\n");
    }
    block.push_str("\r\n");
    block
}

fn classify(error: &reqwest::Error) -> TransportFailure {
    let detail = error_chain(error);
    let kind = if error.is_timeout() {
        TransportErrorKind::OperationTimedOut
    } else if error.is_redirect() {
        TransportErrorKind::TooManyRedirects
    } else if error.is_builder() {
        TransportErrorKind::UrlMalformat
    } else if error.is_connect() {
        if detail.contains("dns error") {
            TransportErrorKind::CouldntResolveHost
        } else {
            TransportErrorKind::CouldntConnect
        }
    } else if error.is_decode() {
        TransportErrorKind::BadContentEncoding
    } else if error.is_body() {
        TransportErrorKind::RecvError
    } else if error.is_request() {
        TransportErrorKind::SendError
    } else {
        TransportErrorKind::Other
    };
    TransportFailure::new(kind, detail)
}

/// Formats an error with its source chain, `outer: inner: root`.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
