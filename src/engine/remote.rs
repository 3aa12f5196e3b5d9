//! Remote conversion service engine.
//!
//! The engine itself only assembles the request: the configured service
//! options plus the document. Transport belongs to a [`ConversionClient`],
//! resolved by name from the registry when the engine is created.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Options;
use crate::engine::{settings, RenderEngine, RenderJob};
use crate::error::{PdfError, Result};
use crate::registry::Registry;

/// Error type returned by conversion clients.
pub type ClientError = Box<dyn std::error::Error + Send + Sync>;

/// Sends a conversion request and returns the PDF bytes.
pub trait ConversionClient: Send + Sync {
    fn convert(&self, request: &Options) -> std::result::Result<Vec<u8>, ClientError>;
}

/// Posts the request as JSON to a conversion web service.
///
/// The response is either the raw PDF or a JSON object whose `document`
/// field holds the base64-encoded PDF.
#[derive(Debug, Clone)]
pub struct HttpConversionClient {
    client: reqwest::blocking::Client,
    service_url: String,
}

impl HttpConversionClient {
    pub const NAME: &'static str = "Http";

    pub fn new(service_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder()
            .user_agent(concat!("pdf-relay/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| PdfError::config(format!("cannot create http client: {e}")))?;
        Ok(Self {
            client,
            service_url: service_url.to_string(),
        })
    }

    pub fn service_url(&self) -> &str {
        &self.service_url
    }
}

#[derive(Debug, Deserialize)]
struct DocumentResponse {
    document: String,
}

impl ConversionClient for HttpConversionClient {
    fn convert(&self, request: &Options) -> std::result::Result<Vec<u8>, ClientError> {
        let response = self.client.post(&self.service_url).json(request).send()?;
        let status = response.status();
        let body = response.bytes()?;
        if !status.is_success() {
            return Err(format!("service answered with status {status}").into());
        }
        match serde_json::from_slice::<DocumentResponse>(&body) {
            Ok(json) => Ok(BASE64_STD.decode(json.document.trim())?),
            Err(_) => Ok(body.to_vec()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Settings {
    /// Client name, or `{className, serviceUrl}`.
    client: Value,
    service_url: Option<String>,
    /// Request timeout in milliseconds.
    timeout: Option<u64>,
    /// Service options sent along with the document.
    options: Options,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            client: Value::String(HttpConversionClient::NAME.to_string()),
            service_url: None,
            timeout: None,
            options: Options::new(),
        }
    }
}

/// Where a client comes from: a registry name and an optional endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSpec {
    pub class_name: String,
    pub service_url: Option<String>,
    pub timeout: Option<Duration>,
}

pub struct RemoteServiceEngine {
    settings: Settings,
    client: Arc<dyn ConversionClient>,
}

impl std::fmt::Debug for RemoteServiceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteServiceEngine")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl RemoteServiceEngine {
    pub const NAME: &'static str = "PdfReactor";

    /// Build the engine, resolving its client through `registry`.
    pub fn from_options(options: &Options, registry: &Registry) -> Result<Self> {
        let settings: Settings = settings(Self::NAME, options)?;
        let spec = client_spec(&settings)?;
        let client = registry.resolve_client(&spec)?;
        Ok(Self { settings, client })
    }

    /// Build the engine around an existing client.
    pub fn with_client(client: Arc<dyn ConversionClient>, service_options: Options) -> Self {
        Self {
            settings: Settings {
                options: service_options,
                ..Settings::default()
            },
            client,
        }
    }

    /// The request sent to the service for `job`.
    pub fn request(&self, job: &RenderJob<'_>) -> Options {
        let mut request = self.settings.options.clone();
        let document = if job.html.is_empty() {
            "<html />"
        } else {
            job.html
        };
        request.insert("document".into(), Value::String(document.to_string()));
        request
    }
}

fn client_spec(settings: &Settings) -> Result<ClientSpec> {
    let timeout = settings.timeout.map(Duration::from_millis);
    match &settings.client {
        Value::String(name) => Ok(ClientSpec {
            class_name: name.clone(),
            service_url: settings.service_url.clone(),
            timeout,
        }),
        Value::Object(map) => {
            let class_name = map
                .get("className")
                .and_then(Value::as_str)
                .ok_or_else(|| PdfError::config("PdfReactor client needs a \"className\""))?;
            let service_url = map
                .get("serviceUrl")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| settings.service_url.clone());
            Ok(ClientSpec {
                class_name: class_name.to_string(),
                service_url,
                timeout,
            })
        }
        other => Err(PdfError::config(format!(
            "PdfReactor client must be a name or a {{className, serviceUrl}} map, got {other}"
        ))),
    }
}

impl RenderEngine for RemoteServiceEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn output(&self, job: &RenderJob<'_>) -> Result<Vec<u8>> {
        let request = self.request(job);
        let pdf = self
            .client
            .convert(&request)
            .map_err(|e| PdfError::tool(Self::NAME, e.to_string()))?;
        if pdf.is_empty() {
            return Err(PdfError::EmptyOutput {
                tool: Self::NAME.to_string(),
            });
        }
        Ok(pdf)
    }

    fn fingerprint(&self) -> Value {
        serde_json::to_value(&self.settings).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Options>>,
    }

    impl ConversionClient for Recorder {
        fn convert(&self, request: &Options) -> std::result::Result<Vec<u8>, ClientError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(b"%PDF-1.4 remote".to_vec())
        }
    }

    struct Failing;

    impl ConversionClient for Failing {
        fn convert(&self, _: &Options) -> std::result::Result<Vec<u8>, ClientError> {
            Err("license expired".into())
        }
    }

    fn map(value: Value) -> Options {
        let Value::Object(map) = value else {
            unreachable!()
        };
        map
    }

    #[test]
    fn request_carries_options_and_document() {
        let recorder = Arc::new(Recorder::default());
        let engine = RemoteServiceEngine::with_client(
            recorder.clone(),
            map(json!({"addLinks": true, "javaScriptMode": "ENABLED"})),
        );
        let config = RenderConfig::default();

        let pdf = engine.output(&RenderJob::new("<p>hi</p>", &config)).unwrap();
        assert_eq!(pdf, b"%PDF-1.4 remote");
        engine.output(&RenderJob::new("", &config)).unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(
            Value::Object(seen[0].clone()),
            json!({"addLinks": true, "javaScriptMode": "ENABLED", "document": "<p>hi</p>"})
        );
        assert_eq!(seen[1]["document"], "<html />");
    }

    #[test]
    fn client_failures_are_external_tool_errors() {
        let engine = RemoteServiceEngine::with_client(Arc::new(Failing), Options::new());
        let err = engine
            .output(&RenderJob::new("<p/>", &RenderConfig::default()))
            .unwrap_err();
        assert_eq!(err.to_string(), "PdfReactor failed: license expired");
    }

    #[test]
    fn client_descriptor_shapes() {
        let settings: Settings =
            serde_json::from_value(json!({"client": {"className": "Http", "serviceUrl": "http://x"}}))
                .unwrap();
        let spec = client_spec(&settings).unwrap();
        assert_eq!(spec.class_name, "Http");
        assert_eq!(spec.service_url.as_deref(), Some("http://x"));

        let settings: Settings =
            serde_json::from_value(json!({"serviceUrl": "http://y", "timeout": 500})).unwrap();
        let spec = client_spec(&settings).unwrap();
        assert_eq!(spec.class_name, "Http");
        assert_eq!(spec.service_url.as_deref(), Some("http://y"));
        assert_eq!(spec.timeout, Some(Duration::from_millis(500)));

        let settings: Settings = serde_json::from_value(json!({"client": 7})).unwrap();
        assert!(matches!(
            client_spec(&settings),
            Err(PdfError::Configuration(_))
        ));
    }
}
