//! Reconstructs per-input state from the single cumulative text stream.
//!
//! Inputs are delimited in-band by `Region {k}:` markers. The stream is
//! re-parsed in full on every update; [`StreamDemultiplexer`] folds the
//! successive parses so that states never regress and the text of a completed
//! input never changes once a later marker has appeared.

use super::{InputState, STOP_NOTE};
use regex::Regex;
use std::sync::LazyLock;

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Region (\d+):").expect("invalid marker pattern"));

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InputView {
    pub state: InputState,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Demultiplexed {
    pub inputs: Vec<InputView>,
    /// Stop note of a cancelled job, never part of any input's text.
    pub terminal_note: Option<String>,
}

impl Demultiplexed {
    pub fn states(&self) -> Vec<InputState> {
        self.inputs.iter().map(|input| input.state).collect()
    }

    /// Index of the input currently receiving text.
    pub fn generating(&self) -> Option<usize> {
        self.inputs
            .iter()
            .position(|input| input.state == InputState::Generating)
    }
}

struct Marker {
    order: usize,
    start: usize,
    end: usize,
}

/// Markers in document order. Only strictly increasing orders within
/// `1..=input_count` are accepted, stray numbers in model output are skipped.
/// `accept(order, start)` can veto a candidate at byte offset `start`.
fn scan_markers(
    text: &str,
    input_count: usize,
    accept: &dyn Fn(usize, usize) -> bool,
) -> Vec<Marker> {
    let mut markers: Vec<Marker> = vec![];
    for captures in MARKER.captures_iter(text) {
        let (Some(whole), Some(order)) = (
            captures.get(0),
            captures.get(1).and_then(|m| m.as_str().parse::<usize>().ok()),
        ) else {
            continue;
        };
        let last = markers.last().map_or(0, |marker| marker.order);
        if order <= last || order > input_count || !accept(order, whole.start()) {
            continue;
        }

        markers.push(Marker {
            order,
            start: whole.start(),
            end: whole.end(),
        });
    }
    markers
}

fn section_text(section: &str) -> String {
    let section = section.strip_prefix('\n').unwrap_or(section);
    section.trim_end().to_string()
}

/// Single stateless parse of `cumulative` for a job with `input_count` inputs.
pub fn demultiplex(cumulative: &str, input_count: usize) -> Demultiplexed {
    demultiplex_by(cumulative, input_count, &|_, _| true)
}

/// Like [`demultiplex`], but a marker only counts where `accept(order, start)` agrees.
pub fn demultiplex_by(
    cumulative: &str,
    input_count: usize,
    accept: &dyn Fn(usize, usize) -> bool,
) -> Demultiplexed {
    let (body, terminal_note) = match cumulative.strip_suffix(STOP_NOTE) {
        Some(rest) => (rest.trim_end(), Some(STOP_NOTE.to_string())),
        None => (cumulative, None),
    };

    let mut inputs = vec![InputView::default(); input_count];
    let markers = scan_markers(body, input_count, accept);

    let Some(current) = markers.last().map(|marker| marker.order) else {
        // A single input may stream without any marker.
        if let [only] = inputs.as_mut_slice() {
            only.text = section_text(body.trim_start());
            if !only.text.is_empty() {
                only.state = InputState::Generating;
            }
        }
        return Demultiplexed {
            inputs,
            terminal_note,
        };
    };

    for (order, input) in (1..).zip(inputs.iter_mut()) {
        input.state = match order.cmp(&current) {
            std::cmp::Ordering::Less => InputState::Complete,
            std::cmp::Ordering::Equal => InputState::Generating,
            std::cmp::Ordering::Greater => InputState::Queued,
        };
    }

    for (i, marker) in markers.iter().enumerate() {
        let end = markers.get(i + 1).map_or(body.len(), |next| next.start);
        inputs[marker.order - 1].text = section_text(&body[marker.end..end]);
    }

    Demultiplexed {
        inputs,
        terminal_note,
    }
}

/// Incremental demultiplexer over the growing prefix of one job's stream.
#[derive(Debug, Default)]
pub struct StreamDemultiplexer {
    frozen: Vec<Option<String>>,
    current: Demultiplexed,
}

impl StreamDemultiplexer {
    pub fn new(input_count: usize) -> Self {
        Self {
            frozen: vec![None; input_count],
            current: Demultiplexed {
                inputs: vec![InputView::default(); input_count],
                terminal_note: None,
            },
        }
    }

    pub fn update(&mut self, cumulative: &str) -> &Demultiplexed {
        self.update_by(cumulative, &|_, _| true)
    }

    pub fn update_by(
        &mut self,
        cumulative: &str,
        accept: &dyn Fn(usize, usize) -> bool,
    ) -> &Demultiplexed {
        let mut parsed = demultiplex_by(cumulative, self.frozen.len(), accept);

        for ((view, previous), frozen) in parsed
            .inputs
            .iter_mut()
            .zip(&self.current.inputs)
            .zip(self.frozen.iter_mut())
        {
            view.state = view.state.max(previous.state);
            if let Some(text) = frozen.as_ref() {
                view.text.clone_from(text);
            } else if view.state == InputState::Complete {
                *frozen = Some(view.text.clone());
            }
        }

        self.current = parsed;
        &self.current
    }

    pub fn current(&self) -> &Demultiplexed {
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{region_boundary, region_marker, stop_suffix};
    use InputState::{Complete, Generating, Queued};

    fn texts(d: &Demultiplexed) -> Vec<&str> {
        d.inputs.iter().map(|input| input.text.as_str()).collect()
    }

    #[test]
    fn two_regions() {
        let d = demultiplex("Region 1:\nHello world\n\nRegion 2:\nFoo", 2);
        assert_eq!(texts(&d), vec!["Hello world", "Foo"]);
        assert_eq!(d.states(), vec![Complete, Generating]);
        assert_eq!(d.terminal_note, None);
    }

    #[test]
    fn later_inputs_stay_queued() {
        let d = demultiplex("Region 1:\nabc", 3);
        assert_eq!(d.states(), vec![Generating, Queued, Queued]);
        assert_eq!(d.generating(), Some(0));
        assert_eq!(texts(&d), vec!["abc", "", ""]);
    }

    #[test]
    fn single_input_without_marker() {
        let d = demultiplex("XY", 1);
        assert_eq!(texts(&d), vec!["XY"]);
        assert_eq!(d.states(), vec![Generating]);

        let d = demultiplex("", 1);
        assert_eq!(d.states(), vec![Queued]);
    }

    #[test]
    fn text_before_first_marker_is_ignored_for_many_inputs() {
        let d = demultiplex("noise", 2);
        assert_eq!(d.states(), vec![Queued, Queued]);
        assert_eq!(texts(&d), vec!["", ""]);
    }

    #[test]
    fn split_marker_is_not_seen_until_complete() {
        let d = demultiplex("Region 1:\nabc\n\nRegion 2", 2);
        assert_eq!(d.states(), vec![Generating, Queued]);

        let d = demultiplex("Region 1:\nabc\n\nRegion 2:", 2);
        assert_eq!(d.states(), vec![Complete, Generating]);
        assert_eq!(texts(&d), vec!["abc", ""]);
    }

    #[test]
    fn first_input_without_output() {
        let d = demultiplex("\n\nRegion 2:\nonly second", 2);
        assert_eq!(d.states(), vec![Complete, Generating]);
        assert_eq!(texts(&d), vec!["", "only second"]);
    }

    #[test]
    fn stray_marker_numbers_are_skipped() {
        let d = demultiplex("Region 1:\nsee Region 9: below\n\nRegion 2:\nx", 2);
        assert_eq!(texts(&d), vec!["see Region 9: below", "x"]);

        // going backwards is never accepted
        let d = demultiplex("Region 1:\na\n\nRegion 2:\nRegion 1: b", 2);
        assert_eq!(texts(&d), vec!["a", "Region 1: b"]);
    }

    #[test]
    fn vetoed_marker_stays_in_text() {
        let text = "Region 1:\nSee Region 2: below\n\nRegion 2:\nFoo";
        let real_boundary = text.rfind("Region 2:").unwrap();
        let d = demultiplex_by(text, 2, &|order, start| order == 1 || start == real_boundary);

        assert_eq!(texts(&d), vec!["See Region 2: below", "Foo"]);
        assert_eq!(d.states(), vec![Complete, Generating]);
    }

    #[test]
    fn stop_note_is_separate() {
        let text = format!("Region 1:\ndone\n\nRegion 2:\npart{}", stop_suffix());
        let d = demultiplex(&text, 2);
        assert_eq!(texts(&d), vec!["done", "part"]);
        assert_eq!(d.terminal_note.as_deref(), Some(STOP_NOTE));
    }

    #[test]
    fn keeps_layout_indentation() {
        let d = demultiplex("Region 1:\n  Name:  Bob\n  Age:   3\n", 1);
        assert_eq!(texts(&d), vec!["  Name:  Bob\n  Age:   3"]);
    }

    #[test]
    fn completed_text_is_stable_across_prefixes() {
        let full = format!(
            "{}Hello world{}Foo bar{}Baz",
            region_marker(1),
            region_boundary(2),
            region_boundary(3)
        );
        let final_view = demultiplex(&full, 3);

        for end in (0..=full.len()).filter(|i| full.is_char_boundary(*i)) {
            let prefix = demultiplex(&full[..end], 3);
            for (i, input) in prefix.inputs.iter().enumerate() {
                if input.state == Complete {
                    assert_eq!(input.text, final_view.inputs[i].text, "prefix {end}");
                }
            }
        }
    }

    #[test]
    fn fold_never_regresses() {
        let mut demux = StreamDemultiplexer::new(2);
        let mut text = String::new();

        for (chunk, expected) in [
            ("Region 1:\n", vec![Generating, Queued]),
            ("Hello", vec![Generating, Queued]),
            (" world", vec![Generating, Queued]),
            ("\n\nRegion 2:\n", vec![Complete, Generating]),
            ("Foo", vec![Complete, Generating]),
        ] {
            text.push_str(chunk);
            assert_eq!(demux.update(&text).states(), expected);
        }
        assert_eq!(texts(demux.current()), vec!["Hello world", "Foo"]);

        // even if the stream is replaced by a shorter one, nothing goes back
        let d = demux.update("Region 1:\nHel");
        assert_eq!(d.states(), vec![Complete, Generating]);
        assert_eq!(d.inputs[0].text, "Hello world");
    }
}
