//! Chord assembler — merges a run of consecutive notes marked simultaneous
//! (the `<chord/>` continuation flag on every note after the first) into a
//! single chord entity.
//!
//! A note without the flag is held provisionally; the next chord-marked
//! note in the same voice promotes it into a chord, and every further
//! chord-marked note extends the same chord.  Holding is per voice, so
//! interleaved voices cannot contaminate each other's chords.

use std::collections::BTreeMap;

use crate::diagnostics::Diagnostics;
use crate::msr::{Chord, Decorations, Note};

/// A finished element the assembler hands back for placement.
#[derive(Debug, Clone)]
pub enum Assembled {
    Note(Note),
    Chord(Chord),
}

impl Assembled {
    pub fn voice(&self) -> i32 {
        match self {
            Assembled::Note(n) => n.voice,
            Assembled::Chord(c) => c.voice,
        }
    }
}

/// Holds at most one provisional note or growing chord per voice.
#[derive(Debug, Default)]
pub struct ChordAssembler {
    held: BTreeMap<i32, Assembled>,
}

impl ChordAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next note of a voice.  Returns the element that became
    /// final because of this note — the previously held note or chord
    /// when `chord_marked` is false — which the caller must place before
    /// holding continues.
    pub fn push(
        &mut self,
        note: Note,
        chord_marked: bool,
        line: u32,
        diags: &mut Diagnostics,
    ) -> Option<Assembled> {
        let voice = note.voice;

        if !chord_marked {
            let committed = self.held.remove(&voice);
            self.held.insert(voice, Assembled::Note(note));
            return committed;
        }

        match self.held.remove(&voice) {
            Some(Assembled::Note(primary)) => {
                let chord = promote(primary, note);
                self.held.insert(voice, Assembled::Chord(chord));
                None
            }
            Some(Assembled::Chord(mut chord)) => {
                extend(&mut chord, note);
                self.held.insert(voice, Assembled::Chord(chord));
                None
            }
            None => {
                diags.warning(
                    line,
                    format!(
                        "chord continuation in voice {voice} with no preceding note; \
                         materializing standalone"
                    ),
                );
                self.held.insert(voice, Assembled::Note(note));
                None
            }
        }
    }

    /// Finalize the held element of one voice (end of voice, or an event
    /// boundary such as backup/forward).
    pub fn finalize(&mut self, voice: i32) -> Option<Assembled> {
        self.held.remove(&voice)
    }

    /// Finalize everything still held (measure boundary), in voice order.
    pub fn finalize_all(&mut self) -> Vec<Assembled> {
        let held = std::mem::take(&mut self.held);
        held.into_values().collect()
    }

    pub fn is_holding(&self, voice: i32) -> bool {
        self.held.contains_key(&voice)
    }

    /// Whether the held element of `voice` has already grown into a chord.
    pub fn is_holding_chord(&self, voice: i32) -> bool {
        matches!(self.held.get(&voice), Some(Assembled::Chord(_)))
    }
}

/// Promote a provisional standalone note into a two-note chord.  The first
/// note supplies duration, voice, staff and position, and its decorations
/// become the chord's; both members keep only pitch-level data.
fn promote(mut primary: Note, member: Note) -> Chord {
    let decorations = std::mem::take(&mut primary.decorations);
    let mut chord = Chord {
        sounding: primary.sounding,
        display: primary.display,
        position: primary.position,
        voice: primary.voice,
        staff: primary.staff,
        in_tuplet: primary.in_tuplet,
        decorations,
        notes: Vec::new(),
    };
    primary.in_chord = true;
    chord.notes.push(primary);
    extend(&mut chord, member);
    chord
}

/// Append one more member.  Per-chord attachments merge into the chord's
/// decoration set: the primary's entries win on conflict, the member's are
/// unioned in; the member itself keeps only accidental/notehead data.
fn extend(chord: &mut Chord, mut member: Note) {
    let member_decorations = std::mem::take(&mut member.decorations);
    merge_decorations(&mut chord.decorations, member_decorations);

    member.in_chord = true;
    member.in_tuplet = chord.in_tuplet;
    member.position = chord.position;
    chord.notes.push(member);
}

fn merge_decorations(dest: &mut Decorations, other: Decorations) {
    union_strings(&mut dest.articulations, other.articulations);
    union_strings(&mut dest.ornaments, other.ornaments);
    union_strings(&mut dest.technicals, other.technicals);
    union_strings(&mut dest.dynamics, other.dynamics);
    for wedge in other.wedges {
        if !dest.wedges.contains(&wedge) {
            dest.wedges.push(wedge);
        }
    }
    for slur in other.slurs {
        if !dest.slurs.contains(&slur) {
            dest.slurs.push(slur);
        }
    }
    dest.tie_start |= other.tie_start;
    dest.tie_stop |= other.tie_stop;
    dest.beams.extend(other.beams);
    dest.lyrics.extend(other.lyrics);
    dest.directions.extend(other.directions);
}

fn union_strings(dest: &mut Vec<String>, other: Vec<String>) {
    for item in other {
        if !dest.contains(&item) {
            dest.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msr::{zero, NoteKind, Pitch};
    use num_rational::Rational32;

    fn quarter(step: &str, voice: i32) -> Note {
        Note {
            kind: NoteKind::Pitched(Pitch {
                step: step.to_string(),
                octave: 4,
                alter: None,
            }),
            sounding: Rational32::new(1, 4),
            display: Rational32::new(1, 4),
            position: zero(),
            voice,
            staff: 1,
            dots: 0,
            grace: false,
            grace_slash: false,
            in_chord: false,
            in_tuplet: false,
            padding: false,
            accidental: None,
            stem: None,
            note_type: Some("quarter".to_string()),
            decorations: Decorations::default(),
        }
    }

    fn pitches(chord: &Chord) -> Vec<&str> {
        chord
            .notes
            .iter()
            .map(|n| match &n.kind {
                NoteKind::Pitched(p) => p.step.as_str(),
                _ => "?",
            })
            .collect()
    }

    #[test]
    fn unmarked_note_commits_the_previous_one() {
        let mut assembler = ChordAssembler::new();
        let mut diags = Diagnostics::new();

        assert!(assembler
            .push(quarter("C", 1), false, 0, &mut diags)
            .is_none());
        let committed = assembler.push(quarter("D", 1), false, 0, &mut diags);
        match committed {
            Some(Assembled::Note(n)) => match n.kind {
                NoteKind::Pitched(ref p) => assert_eq!(p.step, "C"),
                _ => panic!("expected pitched note"),
            },
            other => panic!("expected committed note, got {other:?}"),
        }
    }

    #[test]
    fn three_member_chord_assembles_from_continuations() {
        let mut assembler = ChordAssembler::new();
        let mut diags = Diagnostics::new();

        assembler.push(quarter("C", 1), false, 0, &mut diags);
        assert!(assembler.push(quarter("E", 1), true, 0, &mut diags).is_none());
        assert!(assembler.push(quarter("G", 1), true, 0, &mut diags).is_none());

        match assembler.finalize(1) {
            Some(Assembled::Chord(chord)) => {
                assert_eq!(pitches(&chord), ["C", "E", "G"]);
                assert_eq!(chord.sounding, Rational32::new(1, 4));
                assert!(chord.notes.iter().all(|n| n.in_chord));
            }
            other => panic!("expected chord, got {other:?}"),
        }
        assert!(diags.is_empty());
    }

    #[test]
    fn primary_decorations_become_chord_decorations() {
        let mut assembler = ChordAssembler::new();
        let mut diags = Diagnostics::new();

        let mut primary = quarter("C", 1);
        primary.decorations.dynamics.push("p".to_string());
        primary.decorations.articulations.push("accent".to_string());
        let mut member = quarter("E", 1);
        member.decorations.articulations.push("accent".to_string());
        member.decorations.articulations.push("staccato".to_string());
        member.accidental = Some("natural".to_string());

        assembler.push(primary, false, 0, &mut diags);
        assembler.push(member, true, 0, &mut diags);

        match assembler.finalize(1) {
            Some(Assembled::Chord(chord)) => {
                assert_eq!(chord.decorations.dynamics, ["p"]);
                // Unioned, first note's entries first, no duplicates.
                assert_eq!(chord.decorations.articulations, ["accent", "staccato"]);
                // Members keep only pitch-level data.
                assert!(chord.notes.iter().all(|n| n.decorations.is_empty()));
                assert_eq!(chord.notes[1].accidental.as_deref(), Some("natural"));
            }
            other => panic!("expected chord, got {other:?}"),
        }
    }

    #[test]
    fn orphan_continuation_is_recovered_standalone() {
        let mut assembler = ChordAssembler::new();
        let mut diags = Diagnostics::new();

        assert!(assembler.push(quarter("E", 1), true, 12, &mut diags).is_none());
        assert_eq!(diags.warning_count(), 1);
        assert!(diags.mentions("chord continuation"));

        match assembler.finalize(1) {
            Some(Assembled::Note(n)) => assert!(!n.in_chord),
            other => panic!("expected standalone note, got {other:?}"),
        }
    }

    #[test]
    fn voices_hold_independently() {
        let mut assembler = ChordAssembler::new();
        let mut diags = Diagnostics::new();

        assembler.push(quarter("C", 1), false, 0, &mut diags);
        assembler.push(quarter("A", 2), false, 0, &mut diags);
        // Chord continuation in voice 1 must not see voice 2's note.
        assembler.push(quarter("E", 1), true, 0, &mut diags);

        match assembler.finalize(1) {
            Some(Assembled::Chord(chord)) => assert_eq!(pitches(&chord), ["C", "E"]),
            other => panic!("expected chord in voice 1, got {other:?}"),
        }
        match assembler.finalize(2) {
            Some(Assembled::Note(_)) => {}
            other => panic!("expected note in voice 2, got {other:?}"),
        }
    }

    #[test]
    fn reassembling_chord_members_reproduces_the_chord() {
        let mut assembler = ChordAssembler::new();
        let mut diags = Diagnostics::new();

        let mut primary = quarter("C", 1);
        primary.decorations.dynamics.push("f".to_string());
        assembler.push(primary, false, 0, &mut diags);
        assembler.push(quarter("E", 1), true, 0, &mut diags);
        assembler.push(quarter("G", 1), true, 0, &mut diags);
        let chord = match assembler.finalize(1) {
            Some(Assembled::Chord(c)) => c,
            other => panic!("expected chord, got {other:?}"),
        };

        // Feed the members back in: first unmarked (with the chord's
        // decorations restored), the rest as continuations.
        let mut assembler = ChordAssembler::new();
        let mut members = chord.notes.clone().into_iter();
        let mut first = members.next().unwrap();
        first.in_chord = false;
        first.decorations = chord.decorations.clone();
        assembler.push(first, false, 0, &mut diags);
        for mut member in members {
            member.in_chord = false;
            assembler.push(member, true, 0, &mut diags);
        }

        let rebuilt = match assembler.finalize(1) {
            Some(Assembled::Chord(c)) => c,
            other => panic!("expected chord, got {other:?}"),
        };
        assert_eq!(pitches(&rebuilt), pitches(&chord));
        assert_eq!(rebuilt.sounding, chord.sounding);
        assert_eq!(rebuilt.decorations.dynamics, chord.decorations.dynamics);
        assert!(diags.is_empty());
    }
}
