//! HTTP client construction and request decoration.

use reqwest::{Client, RequestBuilder};
use std::collections::HashMap;

use crate::options::TransportOptions;

/// Build a configured HTTP client from transport options.
///
/// This applies the optional timeout and proxy. An unparsable proxy URL is ignored.
pub fn build_http_client(transport_options: &TransportOptions) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder();

    if let Some(timeout) = transport_options.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(proxy_url) = &transport_options.proxy {
        match reqwest::Proxy::all(proxy_url) {
            Ok(proxy) => builder = builder.proxy(proxy),
            Err(e) => tracing::warn!(proxy = %proxy_url, error = %e, "ignoring invalid proxy"),
        }
    }

    builder.build()
}

/// Add extra headers to a request if specified in transport options.
pub fn add_extra_headers(
    mut request: RequestBuilder,
    extra_headers: &Option<HashMap<String, String>>,
) -> RequestBuilder {
    if let Some(headers) = extra_headers {
        for (key, value) in headers {
            request = request.header(key, value);
        }
    }
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_build_http_client() {
        let transport_options = TransportOptions::default().with_timeout(Duration::from_secs(30));
        assert!(build_http_client(&transport_options).is_ok());
    }

    #[test]
    fn test_build_http_client_with_proxy() {
        let transport_options =
            TransportOptions::default().with_proxy("http://proxy.example.com:8080".to_string());
        assert!(build_http_client(&transport_options).is_ok());
    }

    #[test]
    fn test_extra_headers_are_applied() {
        let transport_options =
            TransportOptions::default().with_header("X-Trace".to_string(), "abc".to_string());
        let client = build_http_client(&transport_options).unwrap();

        let request = add_extra_headers(
            client.post("http://localhost/stream"),
            &transport_options.extra_headers,
        )
        .build()
        .unwrap();

        assert_eq!(request.headers()["X-Trace"], "abc");
    }
}
