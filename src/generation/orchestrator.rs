//! Runs one generation job: inputs strictly one after another, each streamed
//! into the shared cumulative text behind its `Region {n}:` marker.

use super::{
    GenerationInput, JobEvent, JobId, region_boundary, region_marker, stop_suffix,
};
use crate::error::{InferenceError, ValidationError};
use crate::inference::{GenerateRequest, GenerationParameters, InferenceClient};
use crate::shutdown::TASK_TRACKER;
use futures::{Stream, StreamExt};
use log::{debug, error, info};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams {
    pub model: String,
    pub prompt: String,
    pub parameters: GenerationParameters,
}

pub struct GenerationOrchestrator {
    client: Arc<dyn InferenceClient>,
}

/// Handle of one running job. Carries the job's own cancellation token and
/// yields its events; dropping the handle stops the job.
pub struct JobHandle {
    id: JobId,
    input_count: usize,
    cancel: CancellationToken,
    events: UnboundedReceiver<JobEvent>,
    finished: bool,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn input_count(&self) -> usize {
        self.input_count
    }

    /// Abort the in-flight call and skip the remaining inputs.
    pub fn cancel(&self) {
        info!("Stopping {}", self.id);
        self.cancel.cancel();
    }

    /// Next event if one is already queued, for frame driven consumers.
    pub fn try_next(&mut self) -> Option<JobEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(self.observe(event)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => self.closed(),
        }
    }

    fn observe(&mut self, event: JobEvent) -> JobEvent {
        self.finished |= event.is_terminal();
        event
    }

    /// A job task that went away without a terminal event still ends as failed.
    fn closed(&mut self) -> Option<JobEvent> {
        if self.finished {
            return None;
        }
        error!("{} ended without a result", self.id);
        self.finished = true;
        Some(JobEvent::Failed(InferenceError::Interrupted))
    }
}

impl Stream for JobHandle {
    type Item = JobEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<JobEvent>> {
        match self.events.poll_recv(cx) {
            Poll::Ready(Some(event)) => Poll::Ready(Some(self.observe(event))),
            Poll::Ready(None) => Poll::Ready(self.closed()),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl GenerationOrchestrator {
    pub fn new(client: Arc<dyn InferenceClient>) -> Self {
        Self { client }
    }

    pub fn validate(input_count: usize, params: &RequestParams) -> Result<(), ValidationError> {
        if params.model.trim().is_empty() {
            return Err(ValidationError::NoModelSelected);
        }
        if input_count == 0 {
            return Err(ValidationError::NoInput);
        }
        Ok(())
    }

    /// Spawn a job over `inputs`. Fails fast, without any network call, when
    /// there is nothing to process or no model selected.
    pub fn start(
        &self,
        inputs: Vec<GenerationInput>,
        params: RequestParams,
    ) -> Result<JobHandle, ValidationError> {
        Self::validate(inputs.len(), &params)?;

        let id = JobId::next();
        let cancel = CancellationToken::new();
        let (tx, events) = mpsc::unbounded_channel();
        let input_count = inputs.len();

        let run = JobRun {
            id,
            client: self.client.clone(),
            params,
            cancel: cancel.clone(),
            tx,
            wrote_any: false,
        };
        TASK_TRACKER.spawn(run.run(inputs));

        Ok(JobHandle {
            id,
            input_count,
            cancel,
            events,
            finished: false,
        })
    }
}

enum Step {
    Finished,
    Cancelled,
}

struct JobRun {
    id: JobId,
    client: Arc<dyn InferenceClient>,
    params: RequestParams,
    cancel: CancellationToken,
    tx: UnboundedSender<JobEvent>,
    wrote_any: bool,
}

impl JobRun {
    async fn run(mut self, inputs: Vec<GenerationInput>) {
        let count = inputs.len();
        info!("{} started with {count} inputs", self.id);

        for (index, input) in inputs.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                self.stop(index);
                return;
            }
            if index > 0 {
                self.append(index, region_boundary(index + 1));
            }

            debug!("{} processing input {}/{count}", self.id, index + 1);
            self.send(JobEvent::InputStarted { index });

            match self.process(index, input).await {
                Ok(Step::Finished) => self.send(JobEvent::InputFinished { index }),
                Ok(Step::Cancelled) => {
                    self.stop(index);
                    return;
                }
                Err(err) => {
                    error!("{} failed on input {}: {err}", self.id, index + 1);
                    self.send(JobEvent::Failed(err));
                    return;
                }
            }
        }

        info!("{} completed", self.id);
        self.send(JobEvent::Completed);
    }

    async fn process(&mut self, index: usize, input: GenerationInput) -> Result<Step, InferenceError> {
        let client = self.client.clone();
        let cancel = self.cancel.clone();
        let request = GenerateRequest {
            model: self.params.model.clone(),
            prompt: self.params.prompt.clone(),
            image: input.image,
            parameters: self.params.parameters,
        };

        let mut stream = tokio::select! {
            _ = cancel.cancelled() => return Ok(Step::Cancelled),
            stream = client.generate(request) => stream?,
        };

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Ok(Step::Cancelled),
                chunk = stream.next() => chunk,
            };

            match chunk {
                None => return Ok(Step::Finished),
                Some(chunk) => {
                    let chunk = chunk?;
                    if !chunk.is_empty() {
                        self.append_chunk(index, chunk);
                    }
                }
            }
        }
    }

    fn append_chunk(&mut self, index: usize, chunk: String) {
        let text = if index == 0 && !self.wrote_any {
            region_marker(1) + &chunk
        } else {
            chunk
        };
        self.append(index, text);
    }

    fn append(&mut self, index: usize, text: String) {
        self.wrote_any = true;
        self.send(JobEvent::Append { index, text });
    }

    fn stop(&mut self, index: usize) {
        info!("{} stopped by user during input {}", self.id, index + 1);
        self.append(index, stop_suffix());
        self.send(JobEvent::Cancelled);
    }

    fn send(&self, event: JobEvent) {
        if self.tx.send(event).is_err() {
            debug!("{} has no listener anymore", self.id);
        }
    }
}
