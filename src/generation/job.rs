use super::{InputState, JobEvent, JobId, StreamDemultiplexer};
use log::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

/// What changed after folding one event, used to notify the presentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobUpdate {
    pub text_changed: bool,
    pub states_changed: bool,
}

/// Consumer side state of one job, folded from its [`JobEvent`]s.
#[derive(Debug)]
pub struct GenerationJob {
    id: JobId,
    cumulative_text: String,
    demux: StreamDemultiplexer,
    /// Byte offset where each run of appends for one input begins.
    owners: Vec<(usize, usize)>,
    states: Vec<InputState>,
    outcome: Option<JobOutcome>,
}

/// Input that appended the byte at `offset`.
fn owner_at(owners: &[(usize, usize)], offset: usize) -> Option<usize> {
    owners
        .iter()
        .take_while(|(start, _)| *start <= offset)
        .last()
        .map(|(_, index)| *index)
}

impl GenerationJob {
    pub fn new(id: JobId, input_count: usize) -> Self {
        Self {
            id,
            cumulative_text: String::new(),
            demux: StreamDemultiplexer::new(input_count),
            owners: vec![],
            states: vec![InputState::Queued; input_count],
            outcome: None,
        }
    }

    pub fn apply(&mut self, event: JobEvent) -> JobUpdate {
        if self.is_complete() {
            warn!("{} ignores {event:?}, job already finished", self.id);
            return JobUpdate::default();
        }

        let before = self.states.clone();
        let mut text_changed = false;

        match event {
            JobEvent::InputStarted { index } => self.raise(index, InputState::Generating),
            JobEvent::Append { index, text } => {
                if self.owners.last().is_none_or(|(_, owner)| *owner != index) {
                    self.owners.push((self.cumulative_text.len(), index));
                }
                self.cumulative_text.push_str(&text);
                text_changed = true;

                // A real marker for input n is always written under index n - 1.
                let owners = &self.owners;
                let parsed = self
                    .demux
                    .update_by(&self.cumulative_text, &|order, start| {
                        owner_at(owners, start) == Some(order - 1)
                    })
                    .states();
                for (state, parsed) in self.states.iter_mut().zip(parsed) {
                    *state = (*state).max(parsed);
                }
                self.raise(index, InputState::Generating);
            }
            JobEvent::InputFinished { index } => self.raise(index, InputState::Complete),
            JobEvent::Cancelled => self.finish(JobOutcome::Cancelled),
            JobEvent::Failed(err) => self.finish(JobOutcome::Failed(err.to_string())),
            JobEvent::Completed => self.finish(JobOutcome::Completed),
        }

        JobUpdate {
            text_changed,
            states_changed: before != self.states,
        }
    }

    fn raise(&mut self, index: usize, state: InputState) {
        if let Some(current) = self.states.get_mut(index) {
            *current = (*current).max(state);
        }
    }

    fn finish(&mut self, outcome: JobOutcome) {
        self.outcome = Some(outcome);
        self.states.fill(InputState::Complete);
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn cumulative_text(&self) -> &str {
        &self.cumulative_text
    }

    pub fn states(&self) -> &[InputState] {
        &self.states
    }

    pub fn input_texts(&self) -> Vec<&str> {
        self.demux
            .current()
            .inputs
            .iter()
            .map(|input| input.text.as_str())
            .collect()
    }

    pub fn terminal_note(&self) -> Option<&str> {
        self.demux.current().terminal_note.as_deref()
    }

    pub fn outcome(&self) -> Option<&JobOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.outcome.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GenerationInput, GenerationOrchestrator, RequestParams, STOP_NOTE};
    use crate::inference::scripted::{Script, ScriptedClient};
    use crate::region::raster::rasterize_whole;
    use futures::StreamExt;
    use image::{DynamicImage, RgbImage};
    use std::sync::Arc;
    use InputState::{Complete, Generating, Queued};

    fn inputs(count: usize) -> Vec<GenerationInput> {
        let image = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
        vec![GenerationInput::from(rasterize_whole(Some(&image)).unwrap()); count]
    }

    async fn run(scripts: Vec<Script>, count: usize) -> GenerationJob {
        let orchestrator = GenerationOrchestrator::new(Arc::new(ScriptedClient::new(scripts)));
        let params = RequestParams {
            model: "m".to_string(),
            ..Default::default()
        };
        let mut handle = orchestrator.start(inputs(count), params).unwrap();

        let mut job = GenerationJob::new(handle.id(), count);
        while let Some(event) = handle.next().await {
            job.apply(event);
        }
        job
    }

    #[tokio::test]
    async fn two_regions_complete() {
        let job = run(
            vec![
                Script::Chunks(vec!["Hello", " world"]),
                Script::Chunks(vec!["Foo"]),
            ],
            2,
        )
        .await;

        assert_eq!(job.input_texts(), vec!["Hello world", "Foo"]);
        assert!(
            job.cumulative_text()
                .starts_with("Region 1:\nHello world\n\nRegion 2:\nFoo")
        );
        assert_eq!(job.states(), &[Complete, Complete]);
        assert_eq!(job.outcome(), Some(&JobOutcome::Completed));
    }

    #[tokio::test]
    async fn cancelled_job_forces_complete() {
        let orchestrator = GenerationOrchestrator::new(Arc::new(ScriptedClient::new(vec![
            Script::Chunks(vec!["one"]),
            Script::Hang(vec!["tw"]),
        ])));
        let params = RequestParams {
            model: "m".to_string(),
            ..Default::default()
        };
        let mut handle = orchestrator.start(inputs(2), params).unwrap();
        let mut job = GenerationJob::new(handle.id(), 2);

        while let Some(event) = handle.next().await {
            let second_streaming = matches!(&event, JobEvent::Append { index: 1, text } if text == "tw");
            job.apply(event);
            if second_streaming {
                assert_eq!(job.states(), &[Complete, Generating]);
                handle.cancel();
            }
        }

        assert_eq!(job.states(), &[Complete, Complete]);
        assert!(job.cumulative_text().ends_with(STOP_NOTE));
        assert_eq!(job.input_texts(), vec!["one", "tw"]);
        assert_eq!(job.terminal_note(), Some(STOP_NOTE));
        assert_eq!(job.outcome(), Some(&JobOutcome::Cancelled));
    }

    #[tokio::test]
    async fn failed_job_keeps_text() {
        let job = run(
            vec![
                Script::Chunks(vec!["kept"]),
                Script::Reject("status 500"),
                Script::Chunks(vec!["never"]),
            ],
            3,
        )
        .await;

        assert_eq!(job.input_texts(), vec!["kept", "", ""]);
        assert_eq!(job.states(), &[Complete, Complete, Complete]);
        assert!(matches!(job.outcome(), Some(JobOutcome::Failed(msg)) if msg.contains("status 500")));
    }

    #[test]
    fn marker_text_from_the_model_stays_in_its_region() {
        let mut job = GenerationJob::new(JobId::next(), 2);
        job.apply(JobEvent::InputStarted { index: 0 });
        job.apply(JobEvent::Append {
            index: 0,
            text: "Region 1:\nSee Region 2:".to_string(),
        });
        job.apply(JobEvent::Append {
            index: 0,
            text: " below".to_string(),
        });

        assert_eq!(job.states(), &[Generating, Queued]);
        assert_eq!(job.input_texts(), vec!["See Region 2: below", ""]);

        job.apply(JobEvent::InputFinished { index: 0 });
        job.apply(JobEvent::InputStarted { index: 1 });
        job.apply(JobEvent::Append {
            index: 1,
            text: crate::generation::region_boundary(2),
        });
        job.apply(JobEvent::Append {
            index: 1,
            text: "Foo".to_string(),
        });

        assert_eq!(job.states(), &[Complete, Generating]);
        assert_eq!(job.input_texts(), vec!["See Region 2: below", "Foo"]);
    }

    #[tokio::test]
    async fn streamed_marker_text_is_not_a_boundary() {
        let job = run(
            vec![
                Script::Chunks(vec!["See Region 2:", " below"]),
                Script::Chunks(vec!["Foo"]),
            ],
            2,
        )
        .await;

        assert_eq!(job.input_texts(), vec!["See Region 2: below", "Foo"]);
        assert_eq!(job.outcome(), Some(&JobOutcome::Completed));
    }

    #[test]
    fn structured_progress_before_first_chunk() {
        let mut job = GenerationJob::new(JobId::next(), 2);

        let update = job.apply(JobEvent::InputStarted { index: 0 });
        assert_eq!(job.states(), &[Generating, Queued]);
        assert!(update.states_changed && !update.text_changed);

        let update = job.apply(JobEvent::Append {
            index: 0,
            text: "Region 1:\nabc".to_string(),
        });
        assert!(update.text_changed && !update.states_changed);

        job.apply(JobEvent::Completed);
        assert!(job.is_complete());

        // events after the end are ignored
        let update = job.apply(JobEvent::Append {
            index: 1,
            text: "late".to_string(),
        });
        assert_eq!(update, JobUpdate::default());
        assert_eq!(job.cumulative_text(), "Region 1:\nabc");
    }
}
