//! MSR — the Music Score Representation tree produced by the translation
//! engine.
//!
//! Ownership is strictly hierarchical: Score → part-groups → parts →
//! staves → voices → measures → notes/chords/tuplets.  Context lookups go
//! through plain keys (part ID, staff number, voice number), never through
//! back-pointers, so the tree is plain owned data with no cycles.

use num_rational::Rational32;
use serde::{Deserialize, Serialize};

/// Exact musical durations and positions-in-measure, as fractions of a
/// whole note: a quarter note is 1/4, a 4/4 measure is 1/1.
pub type Rational = Rational32;

/// Zero duration / start-of-measure position.
pub fn zero() -> Rational {
    Rational32::from_integer(0)
}

// ─── Skeleton entities ───────────────────────────────────────────────

/// A complete score.  At most one per translation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Score {
    /// Title of the work, from `<work-title>` or `<credit type="title">`
    pub work_title: Option<String>,
    pub movement_title: Option<String>,
    pub composer: Option<String>,
    pub arranger: Option<String>,
    /// Software that created the file
    pub software: Option<String>,
    /// MusicXML version (e.g., "3.1", "4.0")
    pub version: Option<String>,
    /// Top-level part-groups in appearance order.  Parts declared outside
    /// any group live in an implicit group.
    pub part_groups: Vec<PartGroup>,
}

/// A group of parts sharing a bracket, possibly nested.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartGroup {
    /// Group number from the source (pairs start and stop markers)
    pub number: String,
    pub name: Option<String>,
    pub abbreviation: Option<String>,
    /// Bracket symbol: "brace", "bracket", "line", "square"
    pub symbol: Option<String>,
    /// Whether barlines are drawn through the whole group
    pub group_barline: bool,
    /// True for the synthesized group holding ungrouped parts
    pub implicit: bool,
    pub elements: Vec<PartGroupElement>,
}

/// Either a nested group or a part; the tree is never cyclic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PartGroupElement {
    Group(PartGroup),
    Part(Part),
}

/// A musical part (one instrument).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Part {
    /// Schema-supplied identifier (e.g., "P1")
    pub id: String,
    /// Display name (e.g., "Classical Guitar")
    pub name: String,
    pub abbreviation: Option<String>,
    /// Staves in appearance order, keyed by their 1-based number
    pub staves: Vec<Staff>,
    /// Decorations that arrived after the last note of the part and had
    /// nothing left to anchor to
    pub trailing: Decorations,
}

/// One staff of a part.  Carries the staff-level layout defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Staff {
    /// 1-based staff number within the part
    pub number: i32,
    pub clef: Option<Clef>,
    pub key: Option<Key>,
    pub time: Option<TimeSignature>,
    pub transpose: Option<Transpose>,
    /// Scordatura string tunings, if any
    pub tunings: Vec<StaffTuning>,
    /// Voices homed on this staff, keyed by voice number
    pub voices: Vec<Voice>,
}

/// One voice.  A voice is homed on the staff where it first appears but
/// may visit other staves; staff changes are recorded in its measures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Voice {
    /// Voice number within the part
    pub number: i32,
    pub measures: Vec<Measure>,
}

// ─── Content entities ────────────────────────────────────────────────

/// A single measure of one voice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measure {
    /// Measure number from the source — a string, not necessarily numeric
    pub number: String,
    /// Internal sequential number, counted from 1
    pub purist_number: u32,
    /// Nominal length from the time signature in effect
    pub declared_length: Rational,
    /// Total duration actually materialized in this voice
    pub filled_length: Rational,
    /// Segment elements in final document order
    pub elements: Vec<MeasureElement>,
    /// Harmonies keyed by position-in-measure, independent of voice
    pub harmonies: Vec<PositionedHarmony>,
    /// Figured basses keyed by position-in-measure
    pub figured_basses: Vec<PositionedFiguredBass>,
}

/// One element of a measure's segment list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MeasureElement {
    Note(Note),
    Chord(Chord),
    Tuplet(Tuplet),
    /// The voice moves to another staff before the next note
    StaffChange { staff: i32 },
    Barline(Barline),
}

/// What a note sounds as.  Chord/tuplet membership is carried as
/// capability flags on [`Note`], not as separate kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NoteKind {
    Pitched(Pitch),
    Rest {
        /// True for a whole-measure rest
        measure_rest: bool,
    },
    Unpitched {
        display_step: String,
        display_octave: i32,
    },
}

/// A single note or rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub kind: NoteKind,
    /// Sounding duration (tuplet scaling already applied by the source)
    pub sounding: Rational,
    /// Display duration from the note type and dots
    pub display: Rational,
    /// Position-in-measure at onset
    pub position: Rational,
    /// Voice this note originated in
    pub voice: i32,
    /// Staff this note sounds on
    pub staff: i32,
    /// Augmentation dots
    pub dots: u8,
    pub grace: bool,
    pub grace_slash: bool,
    /// True when this note is a member of a chord
    pub in_chord: bool,
    /// True when this note is a direct member of a tuplet
    pub in_tuplet: bool,
    /// True for the invisible padding inserted by a forward skip
    pub padding: bool,
    /// Accidental: "sharp", "flat", "natural", …
    pub accidental: Option<String>,
    /// Stem direction: "up" or "down"
    pub stem: Option<String>,
    /// Graphic note type: "whole", "half", "quarter", "eighth", …
    pub note_type: Option<String>,
    pub decorations: Decorations,
}

impl Note {
    /// An invisible rest covering a forward skip past the declared
    /// measure length.
    pub fn padding(duration: Rational, position: Rational, staff: i32, voice: i32) -> Self {
        Self {
            kind: NoteKind::Rest {
                measure_rest: false,
            },
            sounding: duration,
            display: duration,
            position,
            voice,
            staff,
            dots: 0,
            grace: false,
            grace_slash: false,
            in_chord: false,
            in_tuplet: false,
            padding: true,
            accidental: None,
            stem: None,
            note_type: None,
            decorations: Decorations::default(),
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self.kind, NoteKind::Rest { .. })
    }
}

/// Everything that can be attached to a note or chord.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Decorations {
    /// Articulation names: "staccato", "accent", "tenuto", …
    pub articulations: Vec<String>,
    /// Ornament names: "trill-mark", "turn", "mordent", …
    pub ornaments: Vec<String>,
    /// Technical marks: "up-bow", "harmonic", "fingering", …
    pub technicals: Vec<String>,
    /// Dynamic marks: "p", "ff", "sfz", …
    pub dynamics: Vec<String>,
    pub wedges: Vec<Wedge>,
    pub slurs: Vec<Slur>,
    pub tie_start: bool,
    pub tie_stop: bool,
    pub beams: Vec<Beam>,
    pub lyrics: Vec<Lyric>,
    /// Attached directions (words, tempi, marks, breaks, …)
    pub directions: Vec<Direction>,
}

impl Decorations {
    pub fn is_empty(&self) -> bool {
        self.articulations.is_empty()
            && self.ornaments.is_empty()
            && self.technicals.is_empty()
            && self.dynamics.is_empty()
            && self.wedges.is_empty()
            && self.slurs.is_empty()
            && !self.tie_start
            && !self.tie_stop
            && self.beams.is_empty()
            && self.lyrics.is_empty()
            && self.directions.is_empty()
    }
}

/// A chord: consecutive notes sharing one sounding onset.
///
/// The first note supplied duration, voice and position; decorations were
/// merged onto the chord itself, with the first note's attachments
/// authoritative.  Member notes keep only their pitch-level data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chord {
    /// Members in document order; the first is the primary note
    pub notes: Vec<Note>,
    pub sounding: Rational,
    pub display: Rational,
    pub position: Rational,
    pub voice: i32,
    pub staff: i32,
    pub in_tuplet: bool,
    pub decorations: Decorations,
}

/// A tuplet grouping, possibly nested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tuplet {
    /// Nesting number at creation (1 = outermost)
    pub nesting_number: i32,
    /// Actual note count of the ratio (the 3 in 3:2)
    pub actual: i32,
    /// Normal note count of the ratio (the 2 in 3:2)
    pub normal: i32,
    pub position: Rational,
    pub elements: Vec<TupletElement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TupletElement {
    Note(Note),
    Chord(Chord),
    Tuplet(Tuplet),
}

impl Tuplet {
    /// Total sounding duration of the tuplet's contents.
    pub fn sounding(&self) -> Rational {
        self.elements
            .iter()
            .map(|e| match e {
                TupletElement::Note(n) => {
                    if n.grace {
                        zero()
                    } else {
                        n.sounding
                    }
                }
                TupletElement::Chord(c) => c.sounding,
                TupletElement::Tuplet(t) => t.sounding(),
            })
            .fold(zero(), |acc, d| acc + d)
    }
}

// ─── Attributes ──────────────────────────────────────────────────────

/// Key signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    /// Number of sharps (positive) or flats (negative)
    pub fifths: i32,
    /// Mode (e.g., "major", "minor")
    pub mode: Option<String>,
}

/// Time signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub beats: i32,
    pub beat_type: i32,
}

impl TimeSignature {
    /// Nominal measure length as a fraction of a whole note.
    pub fn measure_length(&self) -> Rational {
        Rational32::new(self.beats, self.beat_type)
    }
}

/// Clef definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clef {
    /// Staff number this clef belongs to (1-based; defaults to 1)
    pub number: i32,
    /// Clef sign: "G" (treble), "F" (bass), "C" (alto/tenor)
    pub sign: String,
    /// Staff line the clef sits on
    pub line: i32,
    /// Octave transposition (e.g., -1 for guitar's octave-lower treble clef)
    pub octave_change: Option<i32>,
}

/// Transposition information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transpose {
    pub diatonic: i32,
    pub chromatic: i32,
    pub octave_change: Option<i32>,
}

/// One scordatura string tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffTuning {
    /// String line number
    pub line: i32,
    pub step: String,
    pub octave: i32,
    pub alter: Option<f64>,
}

// ─── Note-level attachments ──────────────────────────────────────────

/// Pitch of a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pitch {
    /// Note name: A, B, C, D, E, F, G
    pub step: String,
    /// Octave number (middle C = C4)
    pub octave: i32,
    /// Chromatic alteration: -1.0 = flat, 1.0 = sharp
    pub alter: Option<f64>,
}

impl Pitch {
    /// Convert pitch to MIDI note number.  Middle C (C4) = 60.
    pub fn to_midi(&self) -> i32 {
        let step_semitone = match self.step.as_str() {
            "C" => 0,
            "D" => 2,
            "E" => 4,
            "F" => 5,
            "G" => 7,
            "A" => 9,
            "B" => 11,
            _ => 0,
        };
        let alter = self.alter.unwrap_or(0.0) as i32;
        (self.octave + 1) * 12 + step_semitone + alter
    }
}

/// A hairpin crescendo/diminuendo segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wedge {
    /// "crescendo", "diminuendo", or "stop"
    pub kind: String,
    pub number: i32,
}

/// One slur start/stop/continue event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slur {
    /// "start", "stop", or "continue"
    pub kind: String,
    pub number: i32,
    pub placement: Option<String>,
}

/// Beam grouping information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beam {
    /// Beam level (1 = eighth-note beam, 2 = sixteenth-note beam, etc.)
    pub number: i32,
    /// Beam type: "begin", "continue", "end"
    pub beam_type: String,
}

/// One lyric syllable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lyric {
    /// Verse number
    pub number: i32,
    pub text: String,
    /// "single", "begin", "middle", "end"
    pub syllabic: Option<String>,
}

/// A direction-class attachment.  These arrive before the note they
/// decorate and are queued until a note materializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Direction {
    Words {
        text: String,
        placement: Option<String>,
    },
    Pedal {
        /// "start", "stop", "change"
        kind: String,
    },
    OctaveShift {
        /// "up", "down", "stop"
        kind: String,
        /// Shift size in diatonic steps plus one: 8, 15, …
        size: i32,
    },
    Segno,
    Coda,
    DaCapo,
    DalSegno,
    ToCoda,
    Fine,
    /// Plain tempo from `<sound tempo="…">`
    Tempo { quarter_bpm: f64 },
    Metronome {
        beat_unit: String,
        per_minute: f64,
        dotted: bool,
    },
    Rehearsal { text: String },
    LineBreak,
    PageBreak,
    Scordatura { tunings: Vec<StaffTuning> },
}

// ─── Harmonies and figured bass ──────────────────────────────────────

/// A chord symbol anchored at a position-in-measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionedHarmony {
    pub position: Rational,
    pub harmony: Harmony,
}

/// A chord symbol (harmony).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Harmony {
    pub root: HarmonyRoot,
    /// Chord quality: "major", "minor", "dominant", "diminished", etc.
    pub kind: String,
    /// Bass note (for slash chords)
    pub bass: Option<HarmonyRoot>,
}

/// Root or bass note of a harmony.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarmonyRoot {
    /// Note name: A–G
    pub step: String,
    /// Alteration: -1 = flat, 1 = sharp
    pub alter: Option<f64>,
}

/// A figured-bass group anchored at a position-in-measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionedFiguredBass {
    pub position: Rational,
    pub figures: Vec<Figure>,
}

/// One figure of a figured bass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Figure {
    pub number: Option<i32>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

// ─── Barlines ────────────────────────────────────────────────────────

/// A barline (may include repeat signs).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Barline {
    /// Location: "left", "right", "middle"
    pub location: String,
    /// Visual style: "regular", "light-light", "light-heavy", etc.
    pub bar_style: Option<String>,
    pub repeat: Option<Repeat>,
    pub ending: Option<Ending>,
}

/// A repeat sign on a barline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repeat {
    /// "forward" or "backward"
    pub direction: String,
}

/// A volta bracket (1st/2nd ending).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ending {
    /// Ending number(s), e.g., "1", "2", "1, 2"
    pub number: String,
    /// "start", "stop", or "discontinue"
    pub ending_type: String,
    pub text: Option<String>,
}

// ─── Tree access helpers ─────────────────────────────────────────────

impl Score {
    pub fn new() -> Self {
        Self::default()
    }

    /// All parts in appearance order, flattened across groups.
    pub fn parts(&self) -> Vec<&Part> {
        let mut out = Vec::new();
        for group in &self.part_groups {
            group.collect_parts(&mut out);
        }
        out
    }

    pub fn part(&self, id: &str) -> Option<&Part> {
        self.parts().into_iter().find(|p| p.id == id)
    }

    pub fn part_mut(&mut self, id: &str) -> Option<&mut Part> {
        for group in &mut self.part_groups {
            if let Some(p) = group.part_mut(id) {
                return Some(p);
            }
        }
        None
    }

    /// Number of measures in the first voice of the first part.
    pub fn measure_count(&self) -> usize {
        self.parts()
            .first()
            .and_then(|p| p.staves.first())
            .and_then(|s| s.voices.first())
            .map_or(0, |v| v.measures.len())
    }
}

impl PartGroup {
    fn collect_parts<'a>(&'a self, out: &mut Vec<&'a Part>) {
        for element in &self.elements {
            match element {
                PartGroupElement::Part(p) => out.push(p),
                PartGroupElement::Group(g) => g.collect_parts(out),
            }
        }
    }

    fn part_mut(&mut self, id: &str) -> Option<&mut Part> {
        for element in &mut self.elements {
            match element {
                PartGroupElement::Part(p) if p.id == id => return Some(p),
                PartGroupElement::Group(g) => {
                    if let Some(p) = g.part_mut(id) {
                        return Some(p);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

impl Part {
    pub fn staff(&self, number: i32) -> Option<&Staff> {
        self.staves.iter().find(|s| s.number == number)
    }

    pub fn staff_mut(&mut self, number: i32) -> Option<&mut Staff> {
        self.staves.iter_mut().find(|s| s.number == number)
    }

    /// Find a voice by number, searching every staff of the part.
    pub fn voice(&self, number: i32) -> Option<&Voice> {
        self.staves
            .iter()
            .flat_map(|s| s.voices.iter())
            .find(|v| v.number == number)
    }

    pub fn voice_mut(&mut self, number: i32) -> Option<&mut Voice> {
        self.staves
            .iter_mut()
            .flat_map(|s| s.voices.iter_mut())
            .find(|v| v.number == number)
    }
}

impl Measure {
    pub fn new(number: String, purist_number: u32, declared_length: Rational) -> Self {
        Self {
            number,
            purist_number,
            declared_length,
            filled_length: zero(),
            elements: Vec::new(),
            harmonies: Vec::new(),
            figured_basses: Vec::new(),
        }
    }

    /// Notes, chord members included, in document order.
    pub fn all_notes(&self) -> Vec<&Note> {
        let mut out = Vec::new();
        for element in &self.elements {
            collect_notes(element, &mut out);
        }
        out
    }
}

fn collect_notes<'a>(element: &'a MeasureElement, out: &mut Vec<&'a Note>) {
    match element {
        MeasureElement::Note(n) => out.push(n),
        MeasureElement::Chord(c) => out.extend(c.notes.iter()),
        MeasureElement::Tuplet(t) => collect_tuplet_notes(t, out),
        _ => {}
    }
}

fn collect_tuplet_notes<'a>(tuplet: &'a Tuplet, out: &mut Vec<&'a Note>) {
    for element in &tuplet.elements {
        match element {
            TupletElement::Note(n) => out.push(n),
            TupletElement::Chord(c) => out.extend(c.notes.iter()),
            TupletElement::Tuplet(t) => collect_tuplet_notes(t, out),
        }
    }
}
