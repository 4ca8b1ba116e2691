use gerg_core::{PLANNER_SYSTEM_PROMPT, Plan, PlanError};
use reqwest::blocking::Client;
use serde_json::{Value, json};
use std::time::Duration;

pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 120;

/// How much of a response body to quote back in diagnostics.
const BODY_EXCERPT_LEN: usize = 400;

#[derive(thiserror::Error, Debug)]
pub enum PlannerError {
    #[error("planning service error: {0}")]
    Transport(String),
    #[error("planner response had no usable JSON content: {raw}")]
    MalformedResponse { raw: String },
    #[error(transparent)]
    Validation(#[from] PlanError),
}

pub trait PlannerClient {
    fn request_plan(&self, goal: &str) -> Result<Plan, PlannerError>;
}

/// Blocking client for the Ollama chat endpoint. One request per plan, no
/// retries; a failure surfaces immediately to the caller.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    temperature: f32,
    client: Client,
}

impl OllamaClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, PlannerError> {
        Self::with_options(
            base_url,
            model,
            DEFAULT_TEMPERATURE,
            Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        )
    }

    pub fn with_options(
        base_url: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, PlannerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| PlannerError::Transport(err.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            model: model.into(),
            temperature,
            client,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }

    fn build_payload(&self, goal: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": PLANNER_SYSTEM_PROMPT},
                {"role": "user", "content": goal},
            ],
            "format": "json",
            "stream": false,
            "options": {"temperature": self.temperature},
        })
    }
}

impl PlannerClient for OllamaClient {
    fn request_plan(&self, goal: &str) -> Result<Plan, PlannerError> {
        let url = self.chat_url();
        let response = self
            .client
            .post(&url)
            .json(&self.build_payload(goal))
            .send()
            .map_err(|err| PlannerError::Transport(format!("request to {url} failed: {err}")))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|err| PlannerError::Transport(format!("reading response body: {err}")))?;
        if !status.is_success() {
            return Err(PlannerError::Transport(format!(
                "{url} returned HTTP {status}: {}",
                excerpt(&body)
            )));
        }

        let envelope: Value =
            serde_json::from_str(&body).map_err(|_| PlannerError::MalformedResponse {
                raw: excerpt(&body).to_string(),
            })?;
        let content = extract_content(&envelope).ok_or_else(|| PlannerError::MalformedResponse {
            raw: excerpt(&body).to_string(),
        })?;

        let text = strip_code_fences(content);
        let value: Value =
            serde_json::from_str(text).map_err(|_| PlannerError::MalformedResponse {
                raw: content.to_string(),
            })?;
        Ok(Plan::from_value(value)?)
    }
}

/// Preferred shape nests content under `message`; some backends return the
/// content field at the top level instead.
fn extract_content(envelope: &Value) -> Option<&str> {
    envelope
        .pointer("/message/content")
        .and_then(Value::as_str)
        .or_else(|| envelope.get("content").and_then(Value::as_str))
}

/// Strip one optional Markdown code fence (with or without a language tag)
/// wrapped around the response text.
pub fn strip_code_fences(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = match rest.split_once('\n') {
            Some((_tag, body)) => body,
            None => "",
        };
        if let Some(body) = text.trim_end().strip_suffix("```") {
            text = body;
        }
    }
    text.trim()
}

fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    const PLAN_JSON: &str =
        r#"{"explanation":"greet","commands":["echo hi"],"require_confirmation":false}"#;

    #[test]
    fn strips_fences_with_and_without_language_tag() {
        let bare = r#"{"commands": []}"#;
        assert_eq!(strip_code_fences(bare), bare);
        assert_eq!(strip_code_fences("```json\n{\"commands\": []}\n```"), bare);
        assert_eq!(strip_code_fences("```\n{\"commands\": []}\n```"), bare);
        assert_eq!(strip_code_fences("  ```json\n{\"commands\": []}\n```  "), bare);
    }

    #[test]
    fn fenced_and_unfenced_content_validate_identically() {
        let fenced = format!("```json\n{PLAN_JSON}\n```");
        let from_fenced: Value = serde_json::from_str(strip_code_fences(&fenced)).expect("json");
        let from_bare: Value = serde_json::from_str(PLAN_JSON).expect("json");
        assert_eq!(from_fenced, from_bare);
    }

    #[test]
    fn content_is_found_in_both_envelope_shapes() {
        let nested = json!({"message": {"content": "inner"}, "done": true});
        assert_eq!(extract_content(&nested), Some("inner"));

        let flat = json!({"content": "outer"});
        assert_eq!(extract_content(&flat), Some("outer"));

        let neither = json!({"done": true});
        assert_eq!(extract_content(&neither), None);
    }

    #[test]
    fn payload_follows_the_wire_contract() {
        let client = OllamaClient::new("http://127.0.0.1:11434/", "phi3:latest").expect("client");
        assert_eq!(client.chat_url(), "http://127.0.0.1:11434/api/chat");

        let payload = client.build_payload("list my files");
        assert_eq!(payload["model"], "phi3:latest");
        assert_eq!(payload["format"], "json");
        assert_eq!(payload["stream"], false);
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][1]["content"], "list my files");
        assert!(payload["options"]["temperature"].as_f64().is_some());
    }

    /// Serve exactly one canned HTTP response on a local port.
    fn serve_once(status_line: &'static str, body: String) -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut buf = vec![0_u8; 16384];
            let _ = stream.read(&mut buf).expect("read request");
            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).expect("write response");
        });
        (format!("http://{addr}"), handle)
    }

    fn test_client(base_url: &str) -> OllamaClient {
        OllamaClient::with_options(base_url, "phi3:latest", 0.2, Duration::from_secs(5))
            .expect("client")
    }

    #[test]
    fn request_plan_parses_a_nested_envelope() {
        let body = json!({"message": {"content": PLAN_JSON}}).to_string();
        let (base_url, server) = serve_once("HTTP/1.1 200 OK", body);

        let plan = test_client(&base_url)
            .request_plan("say hi")
            .expect("plan");
        server.join().expect("server");
        assert_eq!(plan.commands, vec!["echo hi".to_string()]);
        assert!(!plan.require_confirmation);
    }

    #[test]
    fn non_success_status_is_a_transport_error() {
        let (base_url, server) = serve_once("HTTP/1.1 500 Internal Server Error", "boom".into());
        let err = test_client(&base_url).request_plan("say hi").unwrap_err();
        server.join().expect("server");
        assert!(matches!(err, PlannerError::Transport(_)));
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn junk_content_is_a_malformed_response() {
        let body = json!({"message": {"content": "not json at all"}}).to_string();
        let (base_url, server) = serve_once("HTTP/1.1 200 OK", body);
        let err = test_client(&base_url).request_plan("say hi").unwrap_err();
        server.join().expect("server");
        match err {
            PlannerError::MalformedResponse { raw } => assert!(raw.contains("not json")),
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
    }

    #[test]
    fn mistyped_plan_fields_surface_as_validation_errors() {
        let content = r#"{"explanation": 3, "commands": []}"#;
        let body = json!({"content": content}).to_string();
        let (base_url, server) = serve_once("HTTP/1.1 200 OK", body);
        let err = test_client(&base_url).request_plan("say hi").unwrap_err();
        server.join().expect("server");
        assert!(matches!(err, PlannerError::Validation(_)));
    }
}
