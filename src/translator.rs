//! Translator — second phase of the translation engine.
//!
//! A single ordered traversal of the source tree's per-part, per-measure,
//! per-event structure populates the skeleton built by the first phase.
//! For every event the same fixed order applies: resolve staff and cursor,
//! enqueue decoration-only content, decide standalone-vs-chord, decide
//! standalone-vs-tuplet placement, flush pending decorations onto the
//! materialized note or chord, append it to the current measure, advance
//! the cursor.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use num_rational::Rational32;

use crate::chords::{Assembled, ChordAssembler};
use crate::cursor::CursorTracker;
use crate::diagnostics::{Diagnostics, TranslationError};
use crate::msr::{
    zero, Barline, Beam, Clef, Decorations, Direction, Ending, Figure, Harmony, HarmonyRoot,
    Key, Lyric, Measure, MeasureElement, Note, NoteKind, Part, Pitch, PositionedFiguredBass,
    PositionedHarmony, Rational, Repeat, Score, Slur, Staff, StaffTuning, TimeSignature,
    Transpose, TupletElement, Voice, Wedge,
};
use crate::mxsr::Element;
use crate::pending::PendingQueues;
use crate::skeleton;
use crate::tuplets::TupletStackManager;

const PASS_NAME: &str = "mxsr2msr";
const PASS_DESCRIPTION: &str = "build the MSR score from the MusicXML element tree";

/// Identity and timing of one completed pass.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub name: &'static str,
    pub description: &'static str,
    pub elapsed: Duration,
}

/// Everything a completed translation hands to the next pass.
#[derive(Debug)]
pub struct Translation {
    pub score: Score,
    pub diagnostics: Diagnostics,
    pub report: PassReport,
}

/// Translate a `score-partwise` source tree into an MSR score.
pub fn translate(root: &Element) -> Result<Translation, TranslationError> {
    let mut diagnostics = Diagnostics::new();
    let (score, report) = translate_with_sink(root, &mut diagnostics)?;
    Ok(Translation {
        score,
        diagnostics,
        report,
    })
}

/// Translate with a caller-owned diagnostics sink.
pub fn translate_with_sink(
    root: &Element,
    diags: &mut Diagnostics,
) -> Result<(Score, PassReport), TranslationError> {
    let start = Instant::now();

    let mut score = skeleton::build_skeleton(root, diags)?;

    for part_node in root.children_named("part") {
        translate_part(&mut score, part_node, diags)?;
    }

    let report = PassReport {
        name: PASS_NAME,
        description: PASS_DESCRIPTION,
        elapsed: start.elapsed(),
    };
    log::info!(
        "[msrlib] pass {}: {} — {} diagnostic(s), {:?}",
        report.name,
        report.description,
        diags.len(),
        report.elapsed
    );
    Ok((score, report))
}

// ─── Per-part translation state ──────────────────────────────────────

/// Per-voice translation states, surfaced in trace logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VoiceState {
    Idle,
    InMeasure,
    InChord,
    InTuplet,
    InChordInTuplet,
    MeasureClosed,
}

/// All mutable state of one part's traversal.  One value per run, threaded
/// explicitly — no ambient state, so independent runs never interfere.
struct PartContext {
    divisions: i32,
    time: Option<TimeSignature>,
    cursor: CursorTracker,
    pending: PendingQueues,
    chords: ChordAssembler,
    tuplets: TupletStackManager,
    /// Voice of the most recent note, the default for voiceless events.
    current_voice: i32,
    // Current-measure frame.
    number: String,
    purist_number: u32,
    declared: Rational,
    implicit: bool,
    measures: BTreeMap<i32, Measure>,
}

impl PartContext {
    fn new() -> Self {
        Self {
            divisions: 1,
            time: None,
            cursor: CursorTracker::new(),
            pending: PendingQueues::new(),
            chords: ChordAssembler::new(),
            tuplets: TupletStackManager::new(),
            current_voice: 1,
            number: String::new(),
            purist_number: 0,
            declared: Rational32::new(1, 1),
            implicit: false,
            measures: BTreeMap::new(),
        }
    }

    /// The current measure of a voice, materialized on first touch.
    fn measure_of(&mut self, voice: i32) -> &mut Measure {
        let number = &self.number;
        let purist_number = self.purist_number;
        let declared = self.declared;
        self.measures
            .entry(voice)
            .or_insert_with(|| Measure::new(number.clone(), purist_number, declared))
    }

    fn voice_state(&self, voice: i32) -> VoiceState {
        if !self.measures.contains_key(&voice) {
            return VoiceState::Idle;
        }
        match (
            self.chords.is_holding_chord(voice),
            self.tuplets.in_tuplet(voice),
        ) {
            (true, true) => VoiceState::InChordInTuplet,
            (true, false) => VoiceState::InChord,
            (false, true) => VoiceState::InTuplet,
            (false, false) => VoiceState::InMeasure,
        }
    }
}

fn translate_part(
    score: &mut Score,
    part_node: &Element,
    diags: &mut Diagnostics,
) -> Result<(), TranslationError> {
    let Some(id) = part_node.attribute("id") else {
        return Ok(()); // the skeleton builder already rejected this
    };
    if score.part(id).is_none() {
        return Ok(()); // undeclared part, already diagnosed
    }
    log::debug!("[msrlib] translating part '{id}'");

    let part = score.part_mut(id).expect("part existence checked above");
    let mut ctx = PartContext::new();

    for (index, measure_node) in part_node.children_named("measure").enumerate() {
        translate_measure(&mut ctx, part, measure_node, index, diags);
    }

    // End of part: anything still pending has no note left to anchor to.
    if ctx.pending.drain_remaining_into(&mut part.trailing) {
        diags.warning(
            part_node.line,
            format!("pending decorations at end of part '{id}' had no note to attach to"),
        );
    }
    if !ctx.tuplets.is_empty() {
        return Err(TranslationError::InternalInvariant(format!(
            "tuplet stack of part '{id}' not empty after its last measure"
        )));
    }
    diags.set_measure(None);
    Ok(())
}

fn translate_measure(
    ctx: &mut PartContext,
    part: &mut Part,
    node: &Element,
    index: usize,
    diags: &mut Diagnostics,
) {
    ctx.purist_number = index as u32 + 1;
    ctx.number = match node.attribute("number") {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => {
            diags.structural(
                node.line,
                format!(
                    "measure has no number; substituting sequential number {}",
                    ctx.purist_number
                ),
            );
            ctx.purist_number.to_string()
        }
    };
    diags.set_measure(Some(ctx.number.clone()));
    ctx.implicit = node.attribute("implicit") == Some("yes");
    ctx.declared = ctx
        .time
        .map(|t| t.measure_length())
        .unwrap_or_else(|| Rational32::new(1, 1));
    ctx.cursor.begin_measure(ctx.declared);

    for child in &node.children {
        match child.name.as_str() {
            "attributes" => handle_attributes(ctx, part, child, diags),
            "note" => handle_note(ctx, child, diags),
            "backup" => handle_backup(ctx, child, diags),
            "forward" => handle_forward(ctx, child, diags),
            "direction" => handle_direction(ctx, child),
            "harmony" => ctx.pending.enqueue_harmony(read_harmony(child)),
            "figured-bass" => ctx.pending.enqueue_figured_bass(read_figures(child)),
            "barline" => {
                // A barline is an event boundary: the held note commits
                // first so a right barline follows it in the measure.
                event_boundary_all(ctx, child.line, diags);
                let barline = read_barline(child);
                let voice = ctx.current_voice;
                ctx.measure_of(voice)
                    .elements
                    .push(MeasureElement::Barline(barline));
            }
            "sound" => {
                // <sound> can appear directly in <measure>, not only
                // inside <direction>.
                if let Some(tempo) = child.attribute("tempo").and_then(|t| t.parse().ok()) {
                    ctx.pending.enqueue_global(Direction::Tempo { quarter_bpm: tempo });
                }
            }
            "print" => {
                if child.attribute("new-system") == Some("yes")
                    || child.has_child("system-layout")
                {
                    ctx.pending.enqueue_global(Direction::LineBreak);
                }
                if child.attribute("new-page") == Some("yes") {
                    ctx.pending.enqueue_global(Direction::PageBreak);
                }
            }
            _ => {}
        }
    }

    close_measure(ctx, part, node.line, diags);
}

// ─── Event boundaries ────────────────────────────────────────────────

/// Commit the held note/chord of one voice and apply its scheduled tuplet
/// stops.  Runs before the next non-chord event of the voice — a stop
/// marker on a note (or its chord) pops only after that element landed
/// inside the tuplet.
fn event_boundary(ctx: &mut PartContext, voice: i32, line: u32, diags: &mut Diagnostics) {
    if let Some(assembled) = ctx.chords.finalize(voice) {
        place(ctx, assembled);
    }
    let closed = ctx.tuplets.apply_pending_stops(voice, line, diags);
    for tuplet in closed {
        ctx.measure_of(voice)
            .elements
            .push(MeasureElement::Tuplet(tuplet));
    }
}

/// Boundary for every voice: backup, forward, and the measure end.
fn event_boundary_all(ctx: &mut PartContext, line: u32, diags: &mut Diagnostics) {
    for assembled in ctx.chords.finalize_all() {
        place(ctx, assembled);
    }
    let closed = ctx.tuplets.apply_all_pending_stops(line, diags);
    for (voice, tuplet) in closed {
        ctx.measure_of(voice)
            .elements
            .push(MeasureElement::Tuplet(tuplet));
    }
}

/// Place a finished note or chord: into the enclosing open tuplet, or
/// directly into its voice's measure.
fn place(ctx: &mut PartContext, assembled: Assembled) {
    let voice = assembled.voice();
    let element = match assembled {
        Assembled::Note(n) => TupletElement::Note(n),
        Assembled::Chord(c) => TupletElement::Chord(c),
    };
    if let Some(returned) = ctx.tuplets.place(voice, element) {
        let element = match returned {
            TupletElement::Note(n) => MeasureElement::Note(n),
            TupletElement::Chord(c) => MeasureElement::Chord(c),
            TupletElement::Tuplet(t) => MeasureElement::Tuplet(t),
        };
        ctx.measure_of(voice).elements.push(element);
    }
}

fn close_measure(ctx: &mut PartContext, part: &mut Part, line: u32, diags: &mut Diagnostics) {
    event_boundary_all(ctx, line, diags);

    // Close before crossing the boundary: whatever is still open belongs
    // to this measure, never the next.
    let forced = ctx.tuplets.force_close_all(line, diags);
    for (voice, tuplet) in forced {
        ctx.measure_of(voice)
            .elements
            .push(MeasureElement::Tuplet(tuplet));
    }

    // Harmonies wait for the position of the next note; none arrived.
    if ctx.pending.has_harmonies() {
        diags.warning(
            line,
            "harmony with no following note; anchoring at the current position",
        );
        let position = ctx.cursor.insertion_point();
        let harmonies = ctx.pending.take_harmonies();
        let figured_basses = ctx.pending.take_figured_basses();
        let voice = ctx.current_voice;
        let measure = ctx.measure_of(voice);
        for harmony in harmonies {
            measure.harmonies.push(PositionedHarmony { position, harmony });
        }
        for figures in figured_basses {
            measure
                .figured_basses
                .push(PositionedFiguredBass { position, figures });
        }
    }

    ctx.cursor.end_measure(ctx.implicit, line, diags);

    // Keep every known voice's measure sequence aligned, content or not.
    let known: Vec<i32> = part
        .staves
        .iter()
        .flat_map(|s| s.voices.iter().map(|v| v.number))
        .collect();
    for voice in known {
        ctx.measure_of(voice);
    }

    for (voice, filled) in ctx.cursor.touched_voices() {
        if let Some(measure) = ctx.measures.get_mut(&voice) {
            measure.filled_length = filled;
        }
    }

    let measures = std::mem::take(&mut ctx.measures);
    for (voice, measure) in measures {
        let staff = ctx.cursor.home_staff_of(voice).unwrap_or(1);
        ensure_voice(part, voice, staff, line, diags)
            .measures
            .push(measure);
        log::trace!("voice {voice}: {:?}", VoiceState::MeasureClosed);
    }
}

/// Look up a voice, lazily creating it (and its staff) when the source
/// referenced one the declarations never named.
fn ensure_voice<'p>(
    part: &'p mut Part,
    voice: i32,
    staff: i32,
    line: u32,
    diags: &mut Diagnostics,
) -> &'p mut Voice {
    if part.voice(voice).is_none() {
        if part.staff(staff).is_none() {
            diags.warning(
                line,
                format!("staff {staff} referenced without a declaration; creating it"),
            );
            part.staves.push(Staff {
                number: staff,
                ..Default::default()
            });
        }
        log::debug!("[msrlib] creating voice {voice} on staff {staff}");
        part.staff_mut(staff)
            .expect("staff created above")
            .voices
            .push(Voice {
                number: voice,
                measures: Vec::new(),
            });
    }
    part.voice_mut(voice).expect("voice created above")
}

// ─── Attributes ──────────────────────────────────────────────────────

fn handle_attributes(
    ctx: &mut PartContext,
    part: &mut Part,
    node: &Element,
    diags: &mut Diagnostics,
) {
    for child in &node.children {
        match child.name.as_str() {
            "divisions" => {
                ctx.divisions = child.text_i32().unwrap_or(1).max(1);
            }
            "key" => {
                let key = Key {
                    fifths: child.child_i32("fifths").unwrap_or(0),
                    mode: child.child_text("mode").map(String::from),
                };
                for staff in &mut part.staves {
                    if staff.key.is_none() {
                        staff.key = Some(key.clone());
                    }
                }
            }
            "time" => {
                let time = TimeSignature {
                    beats: child.child_i32("beats").unwrap_or(4),
                    beat_type: child.child_i32("beat-type").unwrap_or(4),
                };
                ctx.time = Some(time);
                ctx.declared = time.measure_length();
                ctx.cursor.set_declared_length(ctx.declared);
                for measure in ctx.measures.values_mut() {
                    measure.declared_length = ctx.declared;
                }
                for staff in &mut part.staves {
                    if staff.time.is_none() {
                        staff.time = Some(time);
                    }
                }
            }
            "staves" => {
                // A later declaration may raise the staff count.
                let declared = child.text_i32().unwrap_or(1).max(1);
                for number in 1..=declared {
                    if part.staff(number).is_none() {
                        part.staves.push(Staff {
                            number,
                            ..Default::default()
                        });
                    }
                }
            }
            "clef" => {
                let number = child
                    .attribute("number")
                    .and_then(|n| n.parse().ok())
                    .unwrap_or(1);
                let clef = Clef {
                    number,
                    sign: child.child_text("sign").unwrap_or("G").to_string(),
                    line: child.child_i32("line").unwrap_or(2),
                    octave_change: child.child_i32("clef-octave-change"),
                };
                match part.staff_mut(number) {
                    Some(staff) => {
                        if staff.clef.is_none() {
                            staff.clef = Some(clef);
                        }
                    }
                    None => diags.structural(
                        child.line,
                        format!("clef for undeclared staff {number}; ignoring"),
                    ),
                }
            }
            "transpose" => {
                let transpose = Transpose {
                    diatonic: child.child_i32("diatonic").unwrap_or(0),
                    chromatic: child.child_i32("chromatic").unwrap_or(0),
                    octave_change: child.child_i32("octave-change"),
                };
                for staff in &mut part.staves {
                    if staff.transpose.is_none() {
                        staff.transpose = Some(transpose.clone());
                    }
                }
            }
            "staff-details" => {
                let number = child
                    .attribute("number")
                    .and_then(|n| n.parse().ok())
                    .unwrap_or(1);
                let tunings: Vec<StaffTuning> = child
                    .children_named("staff-tuning")
                    .map(read_staff_tuning)
                    .collect();
                if let Some(staff) = part.staff_mut(number) {
                    staff.tunings.extend(tunings);
                }
            }
            _ => {}
        }
    }
}

fn read_staff_tuning(node: &Element) -> StaffTuning {
    StaffTuning {
        line: node.attribute("line").and_then(|l| l.parse().ok()).unwrap_or(1),
        step: node.child_text("tuning-step").unwrap_or("C").to_string(),
        octave: node.child_i32("tuning-octave").unwrap_or(4),
        alter: node.child_f64("tuning-alter"),
    }
}

// ─── Notes ───────────────────────────────────────────────────────────

fn handle_note(ctx: &mut PartContext, node: &Element, diags: &mut Diagnostics) {
    let line = node.line;
    let grace_node = node.child("grace");
    let grace = grace_node.is_some();
    let chord_marked = node.has_child("chord");
    let voice = node.child_i32("voice").unwrap_or(ctx.current_voice);
    let staff = node
        .child_i32("staff")
        .or_else(|| ctx.cursor.staff_of(voice))
        .unwrap_or(1);

    // Sounding duration.  A non-grace note without one cannot be placed;
    // skip it and keep translating.
    let duration = node.child_i32("duration");
    let measure_rest = node
        .child("rest")
        .is_some_and(|r| r.attribute("measure") == Some("yes"));
    let sounding = if grace {
        zero()
    } else if let Some(d) = duration {
        Rational32::new(d.max(0), 4 * ctx.divisions)
    } else if measure_rest {
        ctx.declared
    } else {
        diags.structural(line, "note has no duration; skipping");
        return;
    };

    // Event boundary for this voice — unless this note continues a chord,
    // in which case the held element and any pending tuplet stop survive
    // until the chord closes.
    let markers = read_tuplet_markers(node);
    if !chord_marked {
        event_boundary(ctx, voice, line, diags);

        // (1) staff and cursor resolution — at most one staff-change
        // marker per contiguous run of same-staff events, placed between
        // the previous note and this one.  Chord members never move staff.
        if let Some(new_staff) = ctx.cursor.resolve_staff_change(voice, staff) {
            ctx.measure_of(voice)
                .elements
                .push(MeasureElement::StaffChange { staff: new_staff });
        }

        // Tuplet starts open before the note materializes; stops only
        // ever apply after it has been placed.
        for marker in &markers {
            if marker.start {
                let (actual, normal) = read_time_modification(node);
                ctx.tuplets.start(
                    voice,
                    marker.number,
                    actual,
                    normal,
                    ctx.cursor.insertion_point(),
                );
            }
        }
    }

    let mut note = read_note(ctx, node, voice, staff, sounding, measure_rest, grace_node);
    note.in_tuplet = ctx.tuplets.in_tuplet(voice);

    // (2) note-borne queueable decorations pass through the same queues
    // as direction-borne ones, then (5) everything pending for the voice
    // flushes onto the note in FIFO order per kind.
    for slur in read_slurs(node) {
        ctx.pending.enqueue_slur(voice, slur);
    }
    for mark in read_notation_dynamics(node) {
        ctx.pending.enqueue_dynamic(voice, mark);
    }
    ctx.pending.flush_onto(voice, &mut note.decorations);

    // Harmonies anchor at this note's position-in-measure, not at the
    // note itself.
    if ctx.pending.has_harmonies() && !chord_marked {
        let position = note.position;
        let harmonies = ctx.pending.take_harmonies();
        let figured_basses = ctx.pending.take_figured_basses();
        let measure = ctx.measure_of(voice);
        for harmony in harmonies {
            measure.harmonies.push(PositionedHarmony { position, harmony });
        }
        for figures in figured_basses {
            measure
                .figured_basses
                .push(PositionedFiguredBass { position, figures });
        }
    }

    // (3) standalone-vs-chord: the note is held until the next event
    // decides; a chord continuation merges into the held element.  An
    // orphan continuation is recovered as a standalone note and must
    // advance the cursor like one.
    let orphan = chord_marked && !ctx.chords.is_holding(voice);
    if let Some(assembled) = ctx.chords.push(note, chord_marked, line, diags) {
        place(ctx, assembled);
    }

    // (7) advance — chord members share the primary's onset, grace notes
    // take no time.
    if (!chord_marked || orphan) && !grace {
        ctx.cursor.advance(voice, sounding);
    }

    // Stops scheduled last: they pop at the next boundary, after this
    // note (or its chord) has landed inside the tuplet.
    for marker in &markers {
        if !marker.start {
            ctx.tuplets.schedule_stop(voice, marker.number);
        }
    }

    ctx.current_voice = voice;
    log::trace!("voice {voice}: {:?}", ctx.voice_state(voice));
}

fn read_note(
    ctx: &mut PartContext,
    node: &Element,
    voice: i32,
    staff: i32,
    sounding: Rational,
    measure_rest: bool,
    grace_node: Option<&Element>,
) -> Note {
    let kind = if node.has_child("rest") {
        NoteKind::Rest { measure_rest }
    } else if let Some(unpitched) = node.child("unpitched") {
        NoteKind::Unpitched {
            display_step: unpitched
                .child_text("display-step")
                .unwrap_or("C")
                .to_string(),
            display_octave: unpitched.child_i32("display-octave").unwrap_or(4),
        }
    } else {
        let pitch = node.child("pitch");
        NoteKind::Pitched(Pitch {
            step: pitch
                .and_then(|p| p.child_text("step"))
                .unwrap_or("C")
                .to_string(),
            octave: pitch.and_then(|p| p.child_i32("octave")).unwrap_or(4),
            alter: pitch.and_then(|p| p.child_f64("alter")),
        })
    };

    let dots = node.children_named("dot").count() as u8;
    let note_type = node.child_text("type").map(String::from);
    let display = note_type
        .as_deref()
        .and_then(note_type_fraction)
        .map(|base| dotted(base, dots))
        .unwrap_or(sounding);

    let mut decorations = Decorations::default();
    for tie in node.children_named("tie") {
        match tie.attribute("type") {
            Some("start") => decorations.tie_start = true,
            Some("stop") => decorations.tie_stop = true,
            _ => {}
        }
    }
    for beam in node.children_named("beam") {
        decorations.beams.push(Beam {
            number: beam.attribute("number").and_then(|n| n.parse().ok()).unwrap_or(1),
            beam_type: beam.text.clone().unwrap_or_default(),
        });
    }
    for lyric in node.children_named("lyric") {
        let text = lyric.child_text("text").unwrap_or_default().to_string();
        if !text.is_empty() {
            decorations.lyrics.push(Lyric {
                number: lyric.attribute("number").and_then(|n| n.parse().ok()).unwrap_or(1),
                text,
                syllabic: lyric.child_text("syllabic").map(String::from),
            });
        }
    }
    if let Some(notations) = node.child("notations") {
        for group in &notations.children {
            match group.name.as_str() {
                "articulations" => decorations
                    .articulations
                    .extend(group.children.iter().map(|c| c.name.clone())),
                "ornaments" => decorations
                    .ornaments
                    .extend(group.children.iter().map(|c| c.name.clone())),
                "technical" => decorations
                    .technicals
                    .extend(group.children.iter().map(|c| c.name.clone())),
                _ => {}
            }
        }
    }

    Note {
        kind,
        sounding,
        display,
        position: ctx.cursor.insertion_point(),
        voice,
        staff,
        dots,
        grace: grace_node.is_some(),
        grace_slash: grace_node.is_some_and(|g| g.attribute("slash") == Some("yes")),
        in_chord: false,
        in_tuplet: false,
        padding: false,
        accidental: node.child_text("accidental").map(String::from),
        stem: node.child_text("stem").map(String::from),
        note_type,
        decorations,
    }
}

struct TupletMarker {
    start: bool,
    number: Option<i32>,
}

fn read_tuplet_markers(node: &Element) -> Vec<TupletMarker> {
    let Some(notations) = node.child("notations") else {
        return Vec::new();
    };
    notations
        .children_named("tuplet")
        .filter_map(|t| {
            let start = match t.attribute("type") {
                Some("start") => true,
                Some("stop") => false,
                _ => return None,
            };
            Some(TupletMarker {
                start,
                number: t.attribute("number").and_then(|n| n.parse().ok()),
            })
        })
        .collect()
}

fn read_time_modification(node: &Element) -> (i32, i32) {
    match node.child("time-modification") {
        Some(tm) => (
            tm.child_i32("actual-notes").unwrap_or(3),
            tm.child_i32("normal-notes").unwrap_or(2),
        ),
        None => (3, 2),
    }
}

fn read_slurs(node: &Element) -> Vec<Slur> {
    let Some(notations) = node.child("notations") else {
        return Vec::new();
    };
    notations
        .children_named("slur")
        .map(|s| Slur {
            kind: s.attribute("type").unwrap_or("start").to_string(),
            number: s.attribute("number").and_then(|n| n.parse().ok()).unwrap_or(1),
            placement: s.attribute("placement").map(String::from),
        })
        .collect()
}

fn read_notation_dynamics(node: &Element) -> Vec<String> {
    let Some(notations) = node.child("notations") else {
        return Vec::new();
    };
    notations
        .children_named("dynamics")
        .flat_map(|d| d.children.iter().map(|c| c.name.clone()))
        .collect()
}

// ─── Backup / forward ────────────────────────────────────────────────

fn handle_backup(ctx: &mut PartContext, node: &Element, diags: &mut Diagnostics) {
    event_boundary_all(ctx, node.line, diags);
    let Some(duration) = node.child_i32("duration") else {
        diags.structural(node.line, "backup has no duration; ignoring");
        return;
    };
    let duration = Rational32::new(duration.max(0), 4 * ctx.divisions);
    ctx.cursor.rewind(duration, node.line, diags);
}

fn handle_forward(ctx: &mut PartContext, node: &Element, diags: &mut Diagnostics) {
    event_boundary_all(ctx, node.line, diags);
    let Some(duration) = node.child_i32("duration") else {
        diags.structural(node.line, "forward has no duration; ignoring");
        return;
    };
    let duration = Rational32::new(duration.max(0), 4 * ctx.divisions);
    let voice = node.child_i32("voice").unwrap_or(ctx.current_voice);

    if let Some((position, pad)) = ctx.cursor.skip(duration) {
        // Pad, never truncate: the skip ran past the declared measure
        // length, so the overrun is materialized as an invisible rest.
        let staff = node
            .child_i32("staff")
            .or_else(|| ctx.cursor.staff_of(voice))
            .unwrap_or(1);
        let note = Note::padding(pad, position, staff, voice);
        ctx.measure_of(voice).elements.push(MeasureElement::Note(note));
        ctx.cursor.record_padding(voice, pad);
    }
}

// ─── Directions ──────────────────────────────────────────────────────

fn handle_direction(ctx: &mut PartContext, node: &Element) {
    let placement = node.attribute("placement").map(String::from);
    let voice = node.child_i32("voice").unwrap_or(ctx.current_voice);

    for child in &node.children {
        match child.name.as_str() {
            "direction-type" => {
                for dt in &child.children {
                    match dt.name.as_str() {
                        "dynamics" => {
                            for mark in &dt.children {
                                ctx.pending.enqueue_dynamic(voice, mark.name.clone());
                            }
                        }
                        "wedge" => {
                            ctx.pending.enqueue_wedge(
                                voice,
                                Wedge {
                                    kind: dt.attribute("type").unwrap_or("stop").to_string(),
                                    number: dt
                                        .attribute("number")
                                        .and_then(|n| n.parse().ok())
                                        .unwrap_or(1),
                                },
                            );
                        }
                        "words" => {
                            if let Some(text) = &dt.text {
                                ctx.pending.enqueue_direction(
                                    voice,
                                    Direction::Words {
                                        text: text.clone(),
                                        placement: placement.clone(),
                                    },
                                );
                            }
                        }
                        "pedal" => {
                            ctx.pending.enqueue_direction(
                                voice,
                                Direction::Pedal {
                                    kind: dt.attribute("type").unwrap_or("start").to_string(),
                                },
                            );
                        }
                        "octave-shift" => {
                            ctx.pending.enqueue_direction(
                                voice,
                                Direction::OctaveShift {
                                    kind: dt.attribute("type").unwrap_or("stop").to_string(),
                                    size: dt
                                        .attribute("size")
                                        .and_then(|s| s.parse().ok())
                                        .unwrap_or(8),
                                },
                            );
                        }
                        "scordatura" => {
                            let tunings = dt
                                .children_named("accord")
                                .map(|a| StaffTuning {
                                    line: a
                                        .attribute("string")
                                        .and_then(|s| s.parse().ok())
                                        .unwrap_or(1),
                                    step: a.child_text("tuning-step").unwrap_or("C").to_string(),
                                    octave: a.child_i32("tuning-octave").unwrap_or(4),
                                    alter: a.child_f64("tuning-alter"),
                                })
                                .collect();
                            ctx.pending
                                .enqueue_direction(voice, Direction::Scordatura { tunings });
                        }
                        "metronome" => {
                            ctx.pending.enqueue_global(Direction::Metronome {
                                beat_unit: dt
                                    .child_text("beat-unit")
                                    .unwrap_or("quarter")
                                    .to_string(),
                                per_minute: dt
                                    .child_f64("per-minute")
                                    .unwrap_or(120.0),
                                dotted: dt.has_child("beat-unit-dot"),
                            });
                        }
                        "segno" => ctx.pending.enqueue_global(Direction::Segno),
                        "coda" => ctx.pending.enqueue_global(Direction::Coda),
                        "rehearsal" => {
                            ctx.pending.enqueue_global(Direction::Rehearsal {
                                text: dt.text.clone().unwrap_or_default(),
                            });
                        }
                        _ => {}
                    }
                }
            }
            "sound" => {
                if let Some(tempo) = child.attribute("tempo").and_then(|t| t.parse().ok()) {
                    ctx.pending.enqueue_global(Direction::Tempo { quarter_bpm: tempo });
                }
                if child.attribute("dacapo") == Some("yes") {
                    ctx.pending.enqueue_global(Direction::DaCapo);
                }
                if child.attribute("dalsegno").is_some() {
                    ctx.pending.enqueue_global(Direction::DalSegno);
                }
                if child.attribute("fine").is_some() {
                    ctx.pending.enqueue_global(Direction::Fine);
                }
                if child.attribute("tocoda").is_some() {
                    ctx.pending.enqueue_global(Direction::ToCoda);
                }
            }
            _ => {}
        }
    }
}

// ─── Harmony / figured bass / barline readers ────────────────────────

fn read_harmony(node: &Element) -> Harmony {
    let mut root = HarmonyRoot {
        step: "C".to_string(),
        alter: None,
    };
    let mut kind = "major".to_string();
    let mut bass = None;

    for child in &node.children {
        match child.name.as_str() {
            "root" => {
                root.step = child.child_text("root-step").unwrap_or("C").to_string();
                root.alter = child.child_f64("root-alter");
            }
            "kind" => {
                kind = child.text.clone().unwrap_or_else(|| "major".to_string());
            }
            "bass" => {
                bass = Some(HarmonyRoot {
                    step: child.child_text("bass-step").unwrap_or("C").to_string(),
                    alter: child.child_f64("bass-alter"),
                });
            }
            _ => {}
        }
    }

    Harmony { root, kind, bass }
}

fn read_figures(node: &Element) -> Vec<Figure> {
    node.children_named("figure")
        .map(|f| Figure {
            number: f.child_i32("figure-number"),
            prefix: f.child_text("prefix").map(String::from),
            suffix: f.child_text("suffix").map(String::from),
        })
        .collect()
}

fn read_barline(node: &Element) -> Barline {
    Barline {
        location: node.attribute("location").unwrap_or("right").to_string(),
        bar_style: node.child_text("bar-style").map(String::from),
        repeat: node.child("repeat").map(|r| Repeat {
            direction: r.attribute("direction").unwrap_or("forward").to_string(),
        }),
        ending: node.child("ending").map(|e| Ending {
            number: e.attribute("number").unwrap_or("1").to_string(),
            ending_type: e.attribute("type").unwrap_or("start").to_string(),
            text: e.text.clone(),
        }),
    }
}

// ─── Duration helpers ────────────────────────────────────────────────

/// Graphic note type as a fraction of a whole note.
fn note_type_fraction(name: &str) -> Option<Rational> {
    let (numer, denom) = match name {
        "long" => (4, 1),
        "breve" => (2, 1),
        "whole" => (1, 1),
        "half" => (1, 2),
        "quarter" => (1, 4),
        "eighth" => (1, 8),
        "16th" => (1, 16),
        "32nd" => (1, 32),
        "64th" => (1, 64),
        "128th" => (1, 128),
        "256th" => (1, 256),
        _ => return None,
    };
    Some(Rational32::new(numer, denom))
}

/// Apply augmentation dots: each dot adds half of the previous addition.
fn dotted(base: Rational, dots: u8) -> Rational {
    let mut result = base;
    let mut addition = base / 2;
    for _ in 0..dots {
        result = result + addition;
        addition = addition / 2;
    }
    result
}
