//! In-memory inference client replaying prepared answers, one script per call.

use super::{GenerateRequest, InferenceClient, TextStream};
use crate::error::InferenceError;
use async_trait::async_trait;
use futures::{StreamExt, stream};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) enum Script {
    /// Yields the chunks, then ends.
    Chunks(Vec<&'static str>),
    /// Yields the chunks, then never ends.
    Hang(Vec<&'static str>),
    /// Yields the chunks, then fails.
    FailAfter(Vec<&'static str>, &'static str),
    /// The call itself fails before any chunk.
    Reject(&'static str),
    /// The job task dies inside the call.
    Panic,
}

#[derive(Default)]
pub(crate) struct ScriptedClient {
    scripts: Mutex<VecDeque<Script>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    pub models: Vec<String>,
    pub available: bool,
}

impl ScriptedClient {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            available: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

fn chunks(items: Vec<&'static str>) -> impl futures::Stream<Item = Result<String, InferenceError>> {
    stream::iter(items.into_iter().map(|item| Ok(item.to_string())))
}

#[async_trait]
impl InferenceClient for ScriptedClient {
    async fn check_availability(&self) -> bool {
        self.available
    }

    async fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        if !self.available {
            return Err(InferenceError::Endpoint("connection refused".to_string()));
        }
        Ok(self.models.clone())
    }

    async fn generate(&self, request: GenerateRequest) -> Result<TextStream, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt);

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Chunks(vec![]));

        let stream: TextStream = match script {
            Script::Chunks(items) => chunks(items).boxed(),
            Script::Hang(items) => chunks(items).chain(stream::pending()).boxed(),
            Script::FailAfter(items, message) => chunks(items)
                .chain(stream::once(async move {
                    Err(InferenceError::Endpoint(message.to_string()))
                }))
                .boxed(),
            Script::Reject(message) => return Err(InferenceError::Endpoint(message.to_string())),
            Script::Panic => panic!("scripted task failure"),
        };
        Ok(stream)
    }
}
