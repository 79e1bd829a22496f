// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP(S) client for the printer's ePOS-Print control service.
//
// The printer exposes a CGI endpoint that accepts a SOAP envelope and answers
// with `<response success="true|false" code="..." .../>`. A 2xx answer is
// only a delivery when the body carries no failure marker.
//
// # Certificates
//
// LAN printers ship self-signed certificates bound to no hostname we could
// verify. Whether those are accepted is the `accept_invalid_certs` setting;
// with it off, the standard webpki roots apply and most printers will fail
// the HTTPS candidates (the raw and HTTP candidates still run).

use std::net::SocketAddr;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use ordercast_core::error::{OrdercastError, Result};
use ordercast_core::types::{TransportErrorKind, TransportProtocol};

/// CGI path of the control service.
pub const EPOS_SERVICE_PATH: &str = "/cgi-bin/epos/service.cgi";

/// Device id of the printer's own print engine.
pub const EPOS_DEVICE_ID: &str = "local_printer";

/// Content type the service expects.
pub const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Raw HTTP answer from the control service.
#[derive(Debug, Clone)]
pub struct ControlResponse {
    pub status: u16,
    pub body: String,
}

/// Shared HTTP client for all control-service attempts.
#[derive(Debug, Clone)]
pub struct ControlServiceClient {
    http: reqwest::Client,
    accept_invalid_certs: bool,
}

impl ControlServiceClient {
    pub fn new(accept_invalid_certs: bool) -> Result<Self> {
        if accept_invalid_certs {
            warn!("printer HTTPS certificate verification is disabled");
        }
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(accept_invalid_certs)
            .no_proxy()
            .build()
            .map_err(|e| OrdercastError::Config(format!("build HTTP client: {e}")))?;
        Ok(Self {
            http,
            accept_invalid_certs,
        })
    }

    pub fn accepts_invalid_certs(&self) -> bool {
        self.accept_invalid_certs
    }

    /// Build the service URL for one printer endpoint.
    pub fn service_url(protocol: TransportProtocol, addr: SocketAddr, timeout: Duration) -> String {
        let scheme = match protocol {
            TransportProtocol::Https => "https",
            TransportProtocol::Http | TransportProtocol::Raw => "http",
        };
        format!(
            "{scheme}://{addr}{EPOS_SERVICE_PATH}?devid={EPOS_DEVICE_ID}&timeout={}",
            timeout.as_millis()
        )
    }

    /// POST an ePOS-Print document. Only network-level failures are errors
    /// here; judging the answer is [`evaluate_response`]'s job.
    pub async fn post_xml(
        &self,
        url: &str,
        xml: String,
        timeout: Duration,
        label: &str,
    ) -> Result<ControlResponse> {
        debug!(url, bytes = xml.len(), "posting ePOS document");
        let response = self
            .http
            .post(url)
            .timeout(timeout)
            .header(CONTENT_TYPE, XML_CONTENT_TYPE)
            .header("SOAPAction", "\"\"")
            .body(xml)
            .send()
            .await
            .map_err(|e| request_error(label, &e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| request_error(label, &e))?;
        Ok(ControlResponse { status, body })
    }
}

/// Decide whether a control-service answer means the receipt printed.
pub fn evaluate_response(response: &ControlResponse) -> std::result::Result<(), (TransportErrorKind, String)> {
    if !(200..300).contains(&response.status) {
        return Err((
            TransportErrorKind::HttpStatus,
            format!("HTTP {}", response.status),
        ));
    }
    match attribute(&response.body, "success") {
        Some("false") => {
            let code = attribute(&response.body, "code").filter(|c| !c.is_empty());
            Err((
                TransportErrorKind::PrinterRejected,
                match code {
                    Some(code) => format!("printer reported {code}"),
                    None => "printer reported failure".to_string(),
                },
            ))
        }
        _ => Ok(()),
    }
}

/// Value of the first `name="..."` attribute in `body`.
fn attribute<'a>(body: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("{name}=\"");
    let mut search = body;
    loop {
        let start = search.find(&needle)?;
        // Reject matches inside a longer attribute name (e.g. `xsuccess=`).
        let boundary = search[..start]
            .chars()
            .next_back()
            .is_none_or(|c| c.is_whitespace());
        let value_start = start + needle.len();
        if boundary {
            let len = search[value_start..].find('"')?;
            return Some(&search[value_start..value_start + len]);
        }
        search = &search[value_start..];
    }
}

fn request_error(label: &str, err: &reqwest::Error) -> OrdercastError {
    let detail = error_chain(err);
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else {
        TransportErrorKind::from_detail(&detail)
    };
    OrdercastError::Transport {
        transport: label.to_string(),
        kind,
        detail,
    }
}

/// reqwest's Display hides the interesting part (refused, TLS alert) in the
/// source chain.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const OK_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><response success="true" code="" status="251658262" battery="0" xmlns="http://www.epson-pos.com/schemas/2011/03/epos-print"></response></s:Body></s:Envelope>"#;
    const FAIL_BODY: &str = r#"<response success="false" code="EPTR_COVER_OPEN" status="8"/>"#;

    fn resp(status: u16, body: &str) -> ControlResponse {
        ControlResponse {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn success_marker_is_accepted() {
        assert!(evaluate_response(&resp(200, OK_BODY)).is_ok());
    }

    #[test]
    fn body_without_marker_is_accepted() {
        assert!(evaluate_response(&resp(200, "")).is_ok());
    }

    #[test]
    fn failure_marker_surfaces_code() {
        let (kind, detail) = evaluate_response(&resp(200, FAIL_BODY)).unwrap_err();
        assert_eq!(kind, TransportErrorKind::PrinterRejected);
        assert_eq!(detail, "printer reported EPTR_COVER_OPEN");
    }

    #[test]
    fn non_2xx_is_a_failure() {
        let (kind, detail) = evaluate_response(&resp(404, "Not Found")).unwrap_err();
        assert_eq!(kind, TransportErrorKind::HttpStatus);
        assert_eq!(detail, "HTTP 404");
    }

    #[test]
    fn attribute_lookup_respects_name_boundaries() {
        assert_eq!(attribute(r#"<r xsuccess="false" success="true"/>"#, "success"), Some("true"));
        assert_eq!(attribute("<r/>", "success"), None);
    }

    #[test]
    fn service_url_brackets_ipv6() {
        let v4: SocketAddr = "192.168.1.20:8043".parse().unwrap();
        let v6: SocketAddr = "[fe80::1]:80".parse().unwrap();
        assert_eq!(
            ControlServiceClient::service_url(TransportProtocol::Https, v4, Duration::from_secs(8)),
            "https://192.168.1.20:8043/cgi-bin/epos/service.cgi?devid=local_printer&timeout=8000"
        );
        assert!(
            ControlServiceClient::service_url(TransportProtocol::Http, v6, Duration::from_secs(1))
                .starts_with("http://[fe80::1]:80/")
        );
    }

    #[tokio::test]
    async fn posts_xml_with_expected_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(EPOS_SERVICE_PATH))
            .and(query_param("devid", EPOS_DEVICE_ID))
            .and(header("content-type", XML_CONTENT_TYPE))
            .and(body_string_contains("<epos-print"))
            .respond_with(ResponseTemplate::new(200).set_body_string(OK_BODY))
            .expect(1)
            .mount(&server)
            .await;

        let client = ControlServiceClient::new(false).unwrap();
        let addr = *server.address();
        let url = ControlServiceClient::service_url(TransportProtocol::Http, addr, Duration::from_secs(2));
        let answer = client
            .post_xml(&url, "<epos-print/>".into(), Duration::from_secs(2), "HTTP")
            .await
            .unwrap();
        assert_eq!(answer.status, 200);
        assert!(evaluate_response(&answer).is_ok());
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let client = ControlServiceClient::new(false).unwrap();
        let url = ControlServiceClient::service_url(
            TransportProtocol::Http,
            *server.address(),
            Duration::from_millis(100),
        );
        let err = client
            .post_xml(&url, "<epos-print/>".into(), Duration::from_millis(100), "HTTP:x")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrdercastError::Transport { kind: TransportErrorKind::Timeout, .. }
        ));
    }
}
