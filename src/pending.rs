//! Pending-decoration queues — ordered holding areas for elements that
//! precede, in document order, the note or chord they logically decorate.
//!
//! MusicXML writes dynamics, wedges, words and similar marks before the
//! note they apply to.  They wait here, one FIFO queue per kind, keyed by
//! voice — or unkeyed for the kinds that may occur before any voice
//! exists — until the next qualifying note materializes and drains them.

use std::collections::{BTreeMap, VecDeque};

use crate::msr::{Decorations, Direction, Figure, Harmony, Slur, Wedge};

/// The per-voice queue family.
#[derive(Debug, Default)]
struct VoiceQueues {
    dynamics: VecDeque<String>,
    wedges: VecDeque<Wedge>,
    slurs: VecDeque<Slur>,
    /// Words, pedals, octave shifts, scordaturas
    directions: VecDeque<Direction>,
}

impl VoiceQueues {
    fn is_empty(&self) -> bool {
        self.dynamics.is_empty()
            && self.wedges.is_empty()
            && self.slurs.is_empty()
            && self.directions.is_empty()
    }

    fn drain_into(&mut self, dest: &mut Decorations) {
        dest.dynamics.extend(self.dynamics.drain(..));
        dest.wedges.extend(self.wedges.drain(..));
        dest.slurs.extend(self.slurs.drain(..));
        dest.directions.extend(self.directions.drain(..));
    }
}

/// All pending queues of one translation run.
#[derive(Debug, Default)]
pub struct PendingQueues {
    voice: BTreeMap<i32, VoiceQueues>,
    /// Voice-independent kinds: rehearsal marks, tempi, line/page breaks,
    /// segno/coda/dal-segno.  Flushed onto the first note encountered.
    global: VecDeque<Direction>,
    /// Keyed to the position-in-measure of the next note, not to the note
    /// itself: their insertion point in the measure is that position,
    /// independent of which voice supplies the anchoring note.
    harmonies: VecDeque<Harmony>,
    figured_basses: VecDeque<Vec<Figure>>,
}

impl PendingQueues {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Enqueue (never fails) ───────────────────────────────────────

    pub fn enqueue_dynamic(&mut self, voice: i32, mark: String) {
        self.voice.entry(voice).or_default().dynamics.push_back(mark);
    }

    pub fn enqueue_wedge(&mut self, voice: i32, wedge: Wedge) {
        self.voice.entry(voice).or_default().wedges.push_back(wedge);
    }

    pub fn enqueue_slur(&mut self, voice: i32, slur: Slur) {
        self.voice.entry(voice).or_default().slurs.push_back(slur);
    }

    pub fn enqueue_direction(&mut self, voice: i32, direction: Direction) {
        self.voice
            .entry(voice)
            .or_default()
            .directions
            .push_back(direction);
    }

    pub fn enqueue_global(&mut self, direction: Direction) {
        self.global.push_back(direction);
    }

    pub fn enqueue_harmony(&mut self, harmony: Harmony) {
        self.harmonies.push_back(harmony);
    }

    pub fn enqueue_figured_bass(&mut self, figures: Vec<Figure>) {
        self.figured_basses.push_back(figures);
    }

    // ── Flush ───────────────────────────────────────────────────────

    /// Drain every queue for the note's voice, plus the voice-independent
    /// queue, into the note's decoration lists — FIFO order per kind.
    pub fn flush_onto(&mut self, voice: i32, dest: &mut Decorations) {
        if let Some(queues) = self.voice.get_mut(&voice) {
            queues.drain_into(dest);
        }
        dest.directions.extend(self.global.drain(..));
    }

    /// Pending harmonies, handed out for anchoring at the next note's
    /// position-in-measure.
    pub fn take_harmonies(&mut self) -> Vec<Harmony> {
        self.harmonies.drain(..).collect()
    }

    pub fn take_figured_basses(&mut self) -> Vec<Vec<Figure>> {
        self.figured_basses.drain(..).collect()
    }

    pub fn has_harmonies(&self) -> bool {
        !self.harmonies.is_empty() || !self.figured_basses.is_empty()
    }

    /// End-of-part flush: everything still pending lands on the part
    /// container.  Returns true if anything was drained, so the caller
    /// can raise the missing-anchor warning.
    pub fn drain_remaining_into(&mut self, dest: &mut Decorations) -> bool {
        let mut drained = false;
        for queues in self.voice.values_mut() {
            if !queues.is_empty() {
                drained = true;
                queues.drain_into(dest);
            }
        }
        if !self.global.is_empty() {
            drained = true;
            dest.directions.extend(self.global.drain(..));
        }
        drained
    }

    /// True when every queue is empty — the pending-flush-totality
    /// invariant after a completed translation.
    pub fn is_empty(&self) -> bool {
        self.voice.values().all(VoiceQueues::is_empty)
            && self.global.is_empty()
            && self.harmonies.is_empty()
            && self.figured_basses.is_empty()
    }
}
