use std::io::{BufRead, BufReader, Lines};
use std::time::Duration;

use ask_bridge_error::BridgeError;
use ask_bridge_tools::CompletionOracle;
use serde::{Deserialize, Serialize};

use crate::bridge::ChunkIter;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "mistral";

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Bound on a single non-streaming completion.
    pub request_timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.1,
            max_tokens: 512,
            request_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: GenerateOptions<'a>,
}

#[derive(Debug, Serialize)]
struct GenerateOptions<'a> {
    temperature: f32,
    num_predict: u32,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    stop: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Blocking client for an Ollama server's `/api/generate` endpoint.
///
/// Construct and drop it outside of async contexts: the underlying
/// `reqwest::blocking::Client` owns its own runtime.
#[derive(Debug)]
pub struct OllamaClient {
    http: reqwest::blocking::Client,
    config: OllamaConfig,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self, BridgeError> {
        let http = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(None)
            .build()
            .map_err(|err| BridgeError::upstream(format!("failed to build http client: {err}")))?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.config.base_url.trim_end_matches('/'))
    }

    fn send(
        &self,
        system: Option<&str>,
        prompt: &str,
        stop: &[&str],
        stream: bool,
    ) -> Result<reqwest::blocking::Response, BridgeError> {
        let body = GenerateRequest {
            model: &self.config.model,
            prompt,
            system,
            stream,
            options: GenerateOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
                stop,
            },
        };

        let mut request = self.http.post(self.endpoint()).json(&body);
        if !stream {
            request = request.timeout(self.config.request_timeout);
        }

        tracing::debug!(
            model = %self.config.model,
            prompt_len = prompt.len(),
            stream,
            "ollama generate"
        );
        let response = request
            .send()
            .map_err(|err| BridgeError::upstream(format!("ollama request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = error_body(response.text());
            tracing::warn!(status = %status, body = %text, "ollama returned an error status");
            return Err(BridgeError::upstream(format!(
                "ollama returned {status}: {}",
                error_message(&text)
            )));
        }
        Ok(response)
    }

    fn generate(&self, system: Option<&str>, prompt: &str, stop: &[&str]) -> Result<String, BridgeError> {
        let response = self.send(system, prompt, stop, false)?;
        let chunk: GenerateChunk = response
            .json()
            .map_err(|err| BridgeError::upstream(format!("invalid ollama response: {err}")))?;
        if let Some(error) = chunk.error {
            return Err(BridgeError::upstream(error));
        }
        Ok(chunk.response)
    }

    /// Streams the completion of `prompt` as it is generated.
    pub fn stream(&self, system: Option<&str>, prompt: &str) -> Result<ChunkIter, BridgeError> {
        let response = self.send(system, prompt, &[], true)?;
        Ok(Box::new(GenerateStream::new(BufReader::new(response))))
    }
}

impl CompletionOracle for OllamaClient {
    fn complete(&self, prompt: &str) -> Result<String, BridgeError> {
        self.generate(None, prompt, &[])
    }

    fn complete_with_stop(&self, prompt: &str, stop: &[&str]) -> Result<String, BridgeError> {
        let mut text = self.generate(None, prompt, stop)?;
        // Some models echo the stop marker before the server cuts them off.
        if let Some(index) = stop.iter().filter_map(|marker| text.find(marker)).min() {
            text.truncate(index);
        }
        Ok(text)
    }
}

/// Newline-delimited JSON stream of generate chunks.
struct GenerateStream<R> {
    lines: Lines<R>,
    finished: bool,
}

impl<R: BufRead> GenerateStream<R> {
    fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            finished: false,
        }
    }
}

impl<R: BufRead> Iterator for GenerateStream<R> {
    type Item = Result<String, BridgeError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => {
                    self.finished = true;
                    return Some(Err(BridgeError::stream_abort(format!(
                        "ollama stream interrupted: {err}"
                    ))));
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let chunk: GenerateChunk = match serde_json::from_str(&line) {
                Ok(chunk) => chunk,
                Err(err) => {
                    self.finished = true;
                    return Some(Err(BridgeError::stream_abort(format!(
                        "invalid ollama stream chunk: {err}"
                    ))));
                }
            };
            if let Some(error) = chunk.error {
                self.finished = true;
                return Some(Err(BridgeError::stream_abort(error)));
            }
            if chunk.done {
                self.finished = true;
            }
            if !chunk.response.is_empty() {
                return Some(Ok(chunk.response));
            }
        }
        None
    }
}

fn error_body<E: std::fmt::Display>(body: Result<String, E>) -> String {
    body.unwrap_or_else(|err| format!("<body unreadable: {err}>"))
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<GenerateChunk>(body)
        .ok()
        .and_then(|chunk| chunk.error)
        .unwrap_or_else(|| body.trim().to_string())
}
