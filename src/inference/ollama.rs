//! Inference over a local Ollama instance.
//!
//! `/generate` answers with newline delimited JSON objects; each object's
//! `response` field is one text chunk. Transport chunks do not respect line
//! boundaries, so lines are reassembled before parsing.

use super::{GenerateRequest, InferenceClient, TextStream};
use crate::error::InferenceError;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434/api";

const CONNECT_TIMEOUT_SECS: u64 = 5;

pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    models: Vec<ModelResponse>,
}

#[derive(Deserialize)]
struct ModelResponse {
    name: String,
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    images: [String; 1],
    options: GenerateOptions,
    stream: bool,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_ctx: u32,
    seed: i64,
}

#[derive(Deserialize)]
struct GenerateLine {
    #[serde(default)]
    response: String,
    error: Option<String>,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Result<Self, InferenceError> {
        // No overall timeout: a stalled generation runs until the user stops it.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, InferenceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(InferenceError::Status { status, message })
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn check_availability(&self) -> bool {
        match self.list_models().await {
            Ok(_) => {
                info!("Ollama is running at {}", self.base_url);
                true
            }
            Err(err) => {
                warn!("Ollama not reachable at {}: {err}", self.base_url);
                false
            }
        }
    }

    async fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        let response = self.client.get(self.url("tags")).send().await?;
        let response = error_for_status(response).await?;

        let list: ListResponse = response.json().await?;
        let models: Vec<String> = list.models.into_iter().map(|model| model.name).collect();
        debug!("Found {} models", models.len());

        Ok(models)
    }

    async fn generate(&self, request: GenerateRequest) -> Result<TextStream, InferenceError> {
        let image = request.image.to_base64();
        info!(
            "Generating with model '{}', image {} KB (base64)",
            request.model,
            image.len() / 1024
        );

        let body = GenerateBody {
            model: &request.model,
            prompt: &request.prompt,
            images: [image],
            options: GenerateOptions {
                temperature: request.parameters.temperature,
                num_ctx: request.parameters.context_length,
                seed: request.parameters.seed,
            },
            stream: true,
        };

        let response = self
            .client
            .post(self.url("generate"))
            .json(&body)
            .send()
            .await?;
        let response = error_for_status(response).await?;

        Ok(decode_lines(response.bytes_stream()))
    }
}

/// Reassembles newline delimited JSON out of arbitrarily split byte chunks.
#[derive(Default)]
struct LineDecoder {
    buffer: Vec<u8>,
    seen_response: bool,
}

impl LineDecoder {
    fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, InferenceError> {
        self.buffer.extend_from_slice(bytes);

        let mut chunks = vec![];
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            chunks.extend(self.parse_line(&line)?);
        }
        Ok(chunks)
    }

    fn finish(&mut self) -> Result<Vec<String>, InferenceError> {
        let rest = std::mem::take(&mut self.buffer);
        let chunks: Vec<String> = self.parse_line(&rest)?.into_iter().collect();

        if !self.seen_response {
            return Err(InferenceError::EmptyResponse);
        }
        Ok(chunks)
    }

    fn parse_line(&mut self, line: &[u8]) -> Result<Option<String>, InferenceError> {
        let text = String::from_utf8_lossy(line);
        let line = text.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let parsed: GenerateLine =
            serde_json::from_str(line).map_err(|source| InferenceError::MalformedStream {
                line: line.to_string(),
                source,
            })?;

        if let Some(error) = parsed.error {
            return Err(InferenceError::Endpoint(error));
        }

        self.seen_response = true;
        Ok(Some(parsed.response).filter(|response| !response.is_empty()))
    }
}

struct DecodeState<S> {
    body: Pin<Box<S>>,
    decoder: LineDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

fn decode_lines<S, B, E>(body: S) -> TextStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<InferenceError> + Send + 'static,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: LineDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(chunk) = state.pending.pop_front() {
                return Some((Ok(chunk), state));
            }
            if state.finished {
                return None;
            }

            let decoded = match state.body.next().await {
                Some(Ok(bytes)) => state.decoder.push(bytes.as_ref()),
                Some(Err(err)) => Err(err.into()),
                None => {
                    state.finished = true;
                    state.decoder.finish()
                }
            };

            match decoded {
                Ok(chunks) => state.pending.extend(chunks),
                Err(err) => {
                    state.finished = true;
                    state.pending.clear();
                    return Some((Err(err), state));
                }
            }
        }
    })
    .boxed()
}
