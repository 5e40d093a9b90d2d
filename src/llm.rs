use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::OnceCell;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::{Value, json};

const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Provider statuses treated as "model unavailable, try the next one".
const RETRYABLE_STATUSES: &[u16] = &[400, 404, 422];

static CLIENT: OnceCell<Client> = OnceCell::new();

fn http_client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build http client")
    })
}

/// Prompt-to-text seam. Agents depend on this trait so tests can swap in
/// a scripted generator instead of a live provider.
pub trait TextGenerator {
    fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gateway,
    Gemini,
    Ollama,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: Provider,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_embed_model: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub ollama_embed_model: String,
    pub gateway_api_key: String,
    pub gateway_base_url: String,
    pub gateway_models: Vec<String>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u64>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        let gemini_api_key = std::env::var("GEMINI_API_KEY").unwrap_or_default();
        let provider = match std::env::var("LLM_PROVIDER").ok().as_deref() {
            Some("gateway") => Provider::Gateway,
            Some("gemini") => Provider::Gemini,
            Some("ollama") => Provider::Ollama,
            _ if !gemini_api_key.is_empty() => Provider::Gemini,
            _ => Provider::Ollama,
        };
        let gateway_models = std::env::var("GATEWAY_CHAT_MODELS")
            .unwrap_or_else(|_| "gpt-4.1-mini,gpt-4o-mini".to_string())
            .split(',')
            .map(|model| model.trim().to_string())
            .filter(|model| !model.is_empty())
            .collect();
        Self {
            provider,
            gemini_api_key,
            gemini_model: std::env::var("GEMINI_CHAT_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
            gemini_embed_model: std::env::var("GEMINI_EMBED_MODEL")
                .unwrap_or_else(|_| "gemini-embedding-001".to_string()),
            ollama_url: std::env::var("OLLAMA_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            ollama_model: std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.1".to_string()),
            ollama_embed_model: std::env::var("OLLAMA_EMBED_MODEL")
                .unwrap_or_else(|_| "nomic-embed-text".to_string()),
            gateway_api_key: std::env::var("GATEWAY_API_KEY").unwrap_or_default(),
            gateway_base_url: std::env::var("GATEWAY_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            gateway_models,
            temperature: opt_f64_env("LLM_TEMPERATURE"),
            top_p: opt_f64_env("LLM_TOP_P"),
            max_tokens: opt_u64_env("LLM_MAX_TOKENS"),
        }
    }
}

fn opt_f64_env(key: &str) -> Option<f64> {
    std::env::var(key)
        .ok()
        .and_then(|val| val.parse::<f64>().ok())
        .filter(|val| val.is_finite())
}

fn opt_u64_env(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|val| val.parse::<u64>().ok())
}

/// Live provider client. One outbound JSON POST per prompt; the gateway
/// path walks the configured model list on retryable statuses.
pub struct ProviderClient {
    config: LlmConfig,
}

impl ProviderClient {
    pub fn new(config: LlmConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Self {
        Self::new(LlmConfig::from_env())
    }
}

impl TextGenerator for ProviderClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        match self.config.provider {
            Provider::Gateway => generate_gateway(&self.config, prompt),
            Provider::Gemini => generate_gemini(&self.config, prompt),
            Provider::Ollama => generate_ollama(&self.config, prompt),
        }
    }
}

/// Text-to-embedding seam for the vector index.
pub trait Embedder {
    fn embed(&self, text: &str) -> Result<Vec<f64>>;
}

impl Embedder for ProviderClient {
    fn embed(&self, text: &str) -> Result<Vec<f64>> {
        match self.config.provider {
            Provider::Gemini => embed_gemini(&self.config, text),
            Provider::Ollama => embed_ollama(&self.config, text),
            Provider::Gateway => Err(anyhow!("gateway provider has no embedding endpoint")),
        }
    }
}

fn embed_gemini(config: &LlmConfig, text: &str) -> Result<Vec<f64>> {
    if config.gemini_api_key.is_empty() {
        return Err(anyhow!("GEMINI_API_KEY is required for Gemini embeddings"));
    }
    let url = format!(
        "https://generativelanguage.googleapis.com/v1beta/models/{}:embedContent",
        config.gemini_embed_model
    );
    let resp = http_client()?
        .post(&url)
        .header("x-goog-api-key", &config.gemini_api_key)
        .json(&json!({ "content": { "parts": [{ "text": text }] } }))
        .send()
        .context("gemini embedding request failed")?;

    let status = resp.status();
    let raw = resp.text().context("failed reading gemini embedding body")?;
    if status != StatusCode::OK {
        return Err(anyhow!("embedding failed: {} {}", status.as_u16(), raw));
    }
    let data: Value = serde_json::from_str(&raw).context("decode gemini embedding body")?;
    let values = data
        .pointer("/embedding/values")
        .or_else(|| data.pointer("/embeddings/0/values"))
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("embedding response missing values"))?;
    Ok(values.iter().filter_map(Value::as_f64).collect())
}

fn embed_ollama(config: &LlmConfig, text: &str) -> Result<Vec<f64>> {
    let url = format!("{}/api/embeddings", config.ollama_url.trim_end_matches('/'));
    let resp = http_client()?
        .post(&url)
        .json(&json!({ "model": config.ollama_embed_model, "prompt": text }))
        .send()
        .context("ollama embedding request failed")?;

    let status = resp.status();
    let raw = resp.text().context("failed reading ollama embedding body")?;
    if status != StatusCode::OK {
        return Err(anyhow!("embedding failed: {} {}", status.as_u16(), raw));
    }
    let data: Value = serde_json::from_str(&raw).context("decode ollama embedding body")?;
    let values = data
        .get("embedding")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("embedding response missing values"))?;
    Ok(values.iter().filter_map(Value::as_f64).collect())
}

fn generate_gateway(config: &LlmConfig, prompt: &str) -> Result<String> {
    if config.gateway_api_key.is_empty() {
        return Err(anyhow!("GATEWAY_API_KEY is required for gateway generation"));
    }
    if config.gateway_models.is_empty() {
        return Err(anyhow!("no gateway models configured"));
    }

    let url = resolve_gateway_url(&config.gateway_base_url, "/chat/completions");
    let mut body = json!({
        "messages": [{ "role": "user", "content": prompt }],
        "stream": false,
    });
    if let Some(temperature) = config.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(top_p) = config.top_p {
        body["top_p"] = json!(top_p);
    }
    if let Some(max_tokens) = config.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }

    let client = http_client()?;
    let mut last_error: Option<anyhow::Error> = None;
    for model in &config.gateway_models {
        let mut attempt = body.clone();
        attempt["model"] = json!(model);
        let resp = client
            .post(&url)
            .bearer_auth(&config.gateway_api_key)
            .json(&attempt)
            .send()
            .context("gateway request failed")?;

        let status = resp.status();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let raw = resp.text().context("failed reading gateway body")?;

        if status.is_success() {
            let data = parse_gateway_body(&content_type, &raw)?;
            let text = data
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str)
                .or_else(|| data.pointer("/choices/0/text").and_then(Value::as_str))
                .unwrap_or_default();
            return Ok(text.trim().to_string());
        }

        let err = anyhow!("gateway generate failed: {} {}", status.as_u16(), raw);
        if !RETRYABLE_STATUSES.contains(&status.as_u16()) {
            return Err(err);
        }
        last_error = Some(err);
    }

    Err(last_error.unwrap_or_else(|| anyhow!("gateway generate failed: no available models")))
}

/// The gateway may answer a non-streaming request with an SSE body.
/// Reassemble `choices[0].delta.content` chunks, skipping malformed
/// payloads, stopping at the `[DONE]` sentinel.
fn parse_gateway_body(content_type: &str, raw: &str) -> Result<Value> {
    if !content_type.contains("text/event-stream") {
        return serde_json::from_str(raw).context("decode gateway json body");
    }

    let data_lines: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("data:"))
        .collect();
    if data_lines.is_empty() {
        return Err(anyhow!("gateway stream missing data payload"));
    }

    let mut chunks: Vec<String> = Vec::new();
    for line in data_lines {
        let payload = line.trim_start_matches("data:").trim();
        if payload == "[DONE]" {
            break;
        }
        let Ok(parsed) = serde_json::from_str::<Value>(payload) else {
            continue;
        };
        if let Some(delta) = parsed
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
        {
            chunks.push(delta.to_string());
        }
    }
    if chunks.is_empty() {
        return Ok(json!({}));
    }
    Ok(json!({
        "choices": [{ "message": { "content": chunks.concat() } }]
    }))
}

fn resolve_gateway_url(base: &str, endpoint: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with("/api") {
        format!("{base}{endpoint}")
    } else {
        format!("{base}/api{endpoint}")
    }
}

fn generate_gemini(config: &LlmConfig, prompt: &str) -> Result<String> {
    if config.gemini_api_key.is_empty() {
        return Err(anyhow!("GEMINI_API_KEY is required for Gemini generation"));
    }

    let mut generation_config = serde_json::Map::new();
    if let Some(temperature) = config.temperature {
        generation_config.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(top_p) = config.top_p {
        generation_config.insert("topP".to_string(), json!(top_p));
    }
    if let Some(max_tokens) = config.max_tokens {
        generation_config.insert("maxOutputTokens".to_string(), json!(max_tokens));
    }

    let url = format!(
        "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
        config.gemini_model
    );
    let resp = http_client()?
        .post(&url)
        .header("x-goog-api-key", &config.gemini_api_key)
        .json(&json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": Value::Object(generation_config),
        }))
        .send()
        .context("gemini request failed")?;

    let status = resp.status();
    let raw = resp.text().context("failed reading gemini body")?;
    if status != StatusCode::OK {
        return Err(anyhow!("gemini generate failed: {} {}", status.as_u16(), raw));
    }

    let data: Value = serde_json::from_str(&raw).context("decode gemini body")?;
    let text = data
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default();
    Ok(text.trim().to_string())
}

fn generate_ollama(config: &LlmConfig, prompt: &str) -> Result<String> {
    let mut options = serde_json::Map::new();
    if let Some(temperature) = config.temperature {
        options.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(top_p) = config.top_p {
        options.insert("top_p".to_string(), json!(top_p));
    }
    if let Some(max_tokens) = config.max_tokens {
        options.insert("num_predict".to_string(), json!(max_tokens));
    }

    let url = format!("{}/api/generate", config.ollama_url.trim_end_matches('/'));
    let resp = http_client()?
        .post(&url)
        .json(&json!({
            "model": config.ollama_model,
            "prompt": prompt,
            "stream": false,
            "options": Value::Object(options),
        }))
        .send()
        .context("ollama request failed")?;

    let status = resp.status();
    let raw = resp.text().context("failed reading ollama body")?;
    if status != StatusCode::OK {
        return Err(anyhow!("ollama generate failed: {} {}", status.as_u16(), raw));
    }

    let data: Value = serde_json::from_str(&raw).context("decode ollama body")?;
    let text = data.get("response").and_then(Value::as_str).unwrap_or_default();
    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::{parse_gateway_body, resolve_gateway_url};

    #[test]
    fn gateway_url_appends_api_once() {
        assert_eq!(
            resolve_gateway_url("https://gw.example.com", "/chat/completions"),
            "https://gw.example.com/api/chat/completions"
        );
        assert_eq!(
            resolve_gateway_url("https://gw.example.com/api/", "/chat/completions"),
            "https://gw.example.com/api/chat/completions"
        );
    }

    #[test]
    fn sse_body_reassembles_deltas() {
        let raw = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n",
            "data: not-json\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n",
            "data: [DONE]\n",
        );
        let value = parse_gateway_body("text/event-stream", raw).expect("stream should parse");
        assert_eq!(
            value
                .pointer("/choices/0/message/content")
                .and_then(serde_json::Value::as_str),
            Some("Hello")
        );
    }

    #[test]
    fn sse_body_without_data_lines_is_an_error() {
        assert!(parse_gateway_body("text/event-stream", "retry: 100\n").is_err());
    }
}
