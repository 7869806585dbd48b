//! Cursor & assignment tracker — the running position-in-measure, per
//! voice, plus each voice's current staff assignment.
//!
//! MusicXML moves one part-level insertion point through the measure
//! (notes advance it, `<backup>` rewinds it, `<forward>` skips it); each
//! voice additionally remembers where its own material ends so that gaps,
//! overlaps, and desynchronization can be detected per voice.

use std::collections::BTreeMap;

use crate::diagnostics::Diagnostics;
use crate::msr::{zero, Rational};

/// Per-voice cursor state.
#[derive(Debug, Clone)]
pub struct VoiceCursor {
    /// Position after this voice's last materialized element.
    pub position: Rational,
    /// Sum of durations actually materialized in this voice this measure.
    pub filled: Rational,
    /// Staff the voice is currently assigned to.
    pub staff: i32,
    /// Staff the voice first appeared on.
    pub home_staff: i32,
    /// Whether the voice received any content this measure.
    pub touched: bool,
}

/// Tracks the part-level insertion point and every voice's cursor for the
/// measure currently being translated.
#[derive(Debug)]
pub struct CursorTracker {
    /// Where the next event lands, measured from the start of the measure.
    position: Rational,
    declared_length: Rational,
    voices: BTreeMap<i32, VoiceCursor>,
}

impl Default for CursorTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CursorTracker {
    pub fn new() -> Self {
        Self {
            position: zero(),
            declared_length: zero(),
            voices: BTreeMap::new(),
        }
    }

    /// Reset for a new measure.  Staff assignments survive across
    /// measures; positions do not.
    pub fn begin_measure(&mut self, declared_length: Rational) {
        self.position = zero();
        self.declared_length = declared_length;
        for vc in self.voices.values_mut() {
            vc.position = zero();
            vc.filled = zero();
            vc.touched = false;
        }
    }

    /// The part-level insertion point: position-in-measure of the next event.
    pub fn insertion_point(&self) -> Rational {
        self.position
    }

    pub fn declared_length(&self) -> Rational {
        self.declared_length
    }

    /// Update the declared length mid-measure (a time signature inside
    /// the measure's attributes).
    pub fn set_declared_length(&mut self, declared_length: Rational) {
        self.declared_length = declared_length;
    }

    /// Advance after a note/chord/tuplet member materialized in `voice`.
    pub fn advance(&mut self, voice: i32, duration: Rational) {
        let onset = self.position;
        self.position = onset + duration;
        let vc = self.voice_entry(voice);
        vc.position = onset + duration;
        vc.filled = vc.filled + duration;
        vc.touched = true;
    }

    /// `<backup>`: move the insertion point backwards without creating a
    /// note.  Rewinding past the measure start is a structural error; the
    /// cursor clamps at zero.
    pub fn rewind(&mut self, duration: Rational, line: u32, diags: &mut Diagnostics) {
        if duration > self.position {
            diags.structural(
                line,
                format!(
                    "backup of {duration} before measure start (cursor at {}); clamping to zero",
                    self.position
                ),
            );
            self.position = zero();
        } else {
            self.position = self.position - duration;
        }
    }

    /// `<forward>`: move the insertion point forwards without creating a
    /// note.  A skip ending beyond the declared measure length returns the
    /// padding the caller must materialize — pad, never truncate.
    pub fn skip(&mut self, duration: Rational) -> Option<(Rational, Rational)> {
        let start = self.position;
        self.position = start + duration;
        if self.position > self.declared_length {
            Some((start, duration))
        } else {
            None
        }
    }

    /// Record that a padding note was materialized for `voice`.
    pub fn record_padding(&mut self, voice: i32, duration: Rational) {
        let end = self.position;
        let vc = self.voice_entry(voice);
        vc.position = end;
        vc.filled = vc.filled + duration;
        vc.touched = true;
    }

    /// Resolve the staff an incoming event assigns to its voice.  Returns
    /// `Some(staff)` when an explicit staff-change marker must be emitted
    /// before the next note — at most once per contiguous run of
    /// same-staff events.  The first event of a voice sets its home staff
    /// silently.
    pub fn resolve_staff_change(&mut self, voice: i32, staff: i32) -> Option<i32> {
        match self.voices.get_mut(&voice) {
            Some(vc) if vc.staff == staff => None,
            Some(vc) => {
                vc.staff = staff;
                Some(staff)
            }
            None => {
                self.voices.insert(
                    voice,
                    VoiceCursor {
                        position: zero(),
                        filled: zero(),
                        staff,
                        home_staff: staff,
                        touched: false,
                    },
                );
                None
            }
        }
    }

    /// Staff currently assigned to `voice`, if the voice has been seen.
    pub fn staff_of(&self, voice: i32) -> Option<i32> {
        self.voices.get(&voice).map(|vc| vc.staff)
    }

    /// Staff the voice first appeared on.
    pub fn home_staff_of(&self, voice: i32) -> Option<i32> {
        self.voices.get(&voice).map(|vc| vc.home_staff)
    }

    /// Voices that materialized content this measure, with their filled
    /// durations, in voice-number order.
    pub fn touched_voices(&self) -> Vec<(i32, Rational)> {
        self.voices
            .iter()
            .filter(|(_, vc)| vc.touched)
            .map(|(&v, vc)| (v, vc.filled))
            .collect()
    }

    /// End-of-measure check: every touched voice's cursor must sit at the
    /// declared measure length.  A mismatch is the `InconsistentPosition`
    /// warning; the cursor is forcibly resynchronized to the sum of
    /// materialized durations and translation continues.  Implicit
    /// (pickup) measures are exempt.
    pub fn end_measure(&mut self, implicit: bool, line: u32, diags: &mut Diagnostics) {
        if implicit {
            return;
        }
        let declared = self.declared_length;
        for (&voice, vc) in self.voices.iter_mut() {
            if vc.touched && vc.position != declared {
                diags.warning(
                    line,
                    format!(
                        "voice {voice} cursor at {} does not match declared measure length {declared}; resynchronizing",
                        vc.position
                    ),
                );
                vc.position = vc.filled;
            }
        }
    }
}

impl CursorTracker {
    fn voice_entry(&mut self, voice: i32) -> &mut VoiceCursor {
        self.voices.entry(voice).or_insert_with(|| VoiceCursor {
            position: zero(),
            filled: zero(),
            staff: 1,
            home_staff: 1,
            touched: false,
        })
    }
}
