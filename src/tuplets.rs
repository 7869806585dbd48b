//! Tuplet stack manager — builds possibly-nested tuplet trees from the
//! flat start/stop markers MusicXML writes, since the format does not
//! nest tuplet elements explicitly.
//!
//! Each voice has its own stack of currently open tuplets.  A start
//! marker pushes; notes and chords append to the top of the stack; a stop
//! marker pops the tuplet with the matching nesting number and hands it
//! to its new parent — the tuplet below it, or the measure.  Stops are
//! scheduled and applied at event boundaries, because a stop can arrive
//! on the very note that still belongs inside the tuplet.

use std::collections::BTreeMap;

use crate::diagnostics::Diagnostics;
use crate::msr::{Rational, Tuplet, TupletElement};

#[derive(Debug, Default)]
struct VoiceStack {
    open: Vec<Tuplet>,
    pending_stops: Vec<Option<i32>>,
}

/// Per-voice tuplet stacks for the measure currently being translated.
#[derive(Debug, Default)]
pub struct TupletStackManager {
    stacks: BTreeMap<i32, VoiceStack>,
}

impl TupletStackManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// A start marker: open a new tuplet on the voice's stack.  The
    /// nesting number defaults to the current stack depth plus one when
    /// the marker omits it.
    pub fn start(
        &mut self,
        voice: i32,
        nesting_number: Option<i32>,
        actual: i32,
        normal: i32,
        position: Rational,
    ) {
        let stack = self.stacks.entry(voice).or_default();
        let nesting_number = nesting_number.unwrap_or(stack.open.len() as i32 + 1);
        stack.open.push(Tuplet {
            nesting_number,
            actual,
            normal,
            position,
            elements: Vec::new(),
        });
    }

    /// Whether the voice has an open tuplet — notes materialized now are
    /// tuplet members.
    pub fn in_tuplet(&self, voice: i32) -> bool {
        self.stacks.get(&voice).is_some_and(|s| !s.open.is_empty())
    }

    /// Place a finished element: into the top of the voice's stack, or
    /// back to the caller for measure placement when no tuplet is open.
    pub fn place(&mut self, voice: i32, element: TupletElement) -> Option<TupletElement> {
        match self.stacks.get_mut(&voice) {
            Some(stack) if !stack.open.is_empty() => {
                stack.open.last_mut().unwrap().elements.push(element);
                None
            }
            _ => Some(element),
        }
    }

    /// A stop marker: schedule the pop for the next event boundary.
    pub fn schedule_stop(&mut self, voice: i32, nesting_number: Option<i32>) {
        self.stacks
            .entry(voice)
            .or_default()
            .pending_stops
            .push(nesting_number);
    }

    pub fn has_pending_stop(&self, voice: i32) -> bool {
        self.stacks
            .get(&voice)
            .is_some_and(|s| !s.pending_stops.is_empty())
    }

    /// Apply scheduled stops for one voice.  Returns the tuplets that
    /// closed at stack bottom, for appending into the measure.
    pub fn apply_pending_stops(
        &mut self,
        voice: i32,
        line: u32,
        diags: &mut Diagnostics,
    ) -> Vec<Tuplet> {
        let Some(stack) = self.stacks.get_mut(&voice) else {
            return Vec::new();
        };
        let mut closed = Vec::new();
        let pending = std::mem::take(&mut stack.pending_stops);

        for nesting_number in pending {
            // Search from the top of the stack downward; on duplicate
            // numbers the topmost wins.
            let index = match nesting_number {
                Some(n) => stack.open.iter().rposition(|t| t.nesting_number == n),
                None => {
                    if stack.open.is_empty() {
                        None
                    } else {
                        Some(stack.open.len() - 1)
                    }
                }
            };
            let Some(index) = index else {
                diags.structural(
                    line,
                    format!(
                        "tuplet stop{} in voice {voice} with no matching start; ignoring",
                        nesting_number.map_or(String::new(), |n| format!(" (number {n})"))
                    ),
                );
                continue;
            };

            // A stop for a buried tuplet force-closes the inner ones
            // still open above it.
            while stack.open.len() > index + 1 {
                let inner = stack.open.pop().unwrap();
                diags.warning(
                    line,
                    format!(
                        "tuplet {} in voice {voice} stopped while tuplet {} is still open; \
                         force-closing the inner one",
                        stack.open[index].nesting_number, inner.nesting_number
                    ),
                );
                close_into(&mut stack.open, inner, &mut closed);
            }

            let tuplet = stack.open.pop().unwrap();
            close_into(&mut stack.open, tuplet, &mut closed);
        }

        closed
    }

    /// Apply scheduled stops for every voice (backup/forward and measure
    /// boundaries).  Returns `(voice, tuplet)` pairs closed at stack bottom.
    pub fn apply_all_pending_stops(
        &mut self,
        line: u32,
        diags: &mut Diagnostics,
    ) -> Vec<(i32, Tuplet)> {
        let voices: Vec<i32> = self
            .stacks
            .iter()
            .filter(|(_, s)| !s.pending_stops.is_empty())
            .map(|(&v, _)| v)
            .collect();
        let mut out = Vec::new();
        for voice in voices {
            for tuplet in self.apply_pending_stops(voice, line, diags) {
                out.push((voice, tuplet));
            }
        }
        out
    }

    /// Measure boundary: the stack must be empty.  Remaining open tuplets
    /// are force-closed with a warning — a tuplet is never left open
    /// across a measure boundary in the output tree.
    pub fn force_close_all(&mut self, line: u32, diags: &mut Diagnostics) -> Vec<(i32, Tuplet)> {
        let mut out = Vec::new();
        for (&voice, stack) in self.stacks.iter_mut() {
            stack.pending_stops.clear();
            while let Some(tuplet) = stack.open.pop() {
                diags.warning(
                    line,
                    format!(
                        "tuplet {} in voice {voice} still open at measure end; force-closing",
                        tuplet.nesting_number
                    ),
                );
                let mut closed = Vec::new();
                close_into(&mut stack.open, tuplet, &mut closed);
                out.extend(closed.into_iter().map(|t| (voice, t)));
            }
        }
        out
    }

    /// True when no voice has an open tuplet or a pending stop.
    pub fn is_empty(&self) -> bool {
        self.stacks
            .values()
            .all(|s| s.open.is_empty() && s.pending_stops.is_empty())
    }
}

/// Append a popped tuplet to its new parent: the tuplet now at the top of
/// the stack, or the closed list when the stack is empty.
fn close_into(open: &mut Vec<Tuplet>, tuplet: Tuplet, closed: &mut Vec<Tuplet>) {
    match open.last_mut() {
        Some(parent) => parent.elements.push(TupletElement::Tuplet(tuplet)),
        None => closed.push(tuplet),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msr::{zero, Decorations, Note, NoteKind};
    use num_rational::Rational32;

    fn eighth(voice: i32) -> TupletElement {
        TupletElement::Note(Note {
            kind: NoteKind::Rest {
                measure_rest: false,
            },
            sounding: Rational32::new(1, 12),
            display: Rational32::new(1, 8),
            position: zero(),
            voice,
            staff: 1,
            dots: 0,
            grace: false,
            grace_slash: false,
            in_chord: false,
            in_tuplet: true,
            padding: false,
            accidental: None,
            stem: None,
            note_type: None,
            decorations: Decorations::default(),
        })
    }

    #[test]
    fn simple_triplet_closes_at_stack_bottom() {
        let mut tuplets = TupletStackManager::new();
        let mut diags = Diagnostics::new();

        tuplets.start(1, Some(1), 3, 2, zero());
        for _ in 0..3 {
            assert!(tuplets.place(1, eighth(1)).is_none());
        }
        tuplets.schedule_stop(1, Some(1));
        let closed = tuplets.apply_pending_stops(1, 0, &mut diags);

        assert_eq!(closed.len(), 1);
        let tuplet = &closed[0];
        assert_eq!((tuplet.actual, tuplet.normal), (3, 2));
        assert_eq!(tuplet.elements.len(), 3);
        assert!(tuplets.is_empty());
        assert!(diags.is_empty());
    }

    #[test]
    fn nested_tuplet_lands_inside_its_parent() {
        let mut tuplets = TupletStackManager::new();
        let mut diags = Diagnostics::new();

        tuplets.start(1, Some(1), 3, 2, zero());
        tuplets.place(1, eighth(1));
        tuplets.start(1, Some(2), 5, 4, zero());
        tuplets.place(1, eighth(1));
        tuplets.schedule_stop(1, Some(2));
        // Inner stop closes into the outer tuplet, not the measure.
        assert!(tuplets.apply_pending_stops(1, 0, &mut diags).is_empty());
        assert!(tuplets.in_tuplet(1));

        tuplets.schedule_stop(1, Some(1));
        let closed = tuplets.apply_pending_stops(1, 0, &mut diags);
        assert_eq!(closed.len(), 1);
        let outer = &closed[0];
        assert_eq!(outer.elements.len(), 2);
        assert!(matches!(outer.elements[1], TupletElement::Tuplet(_)));
    }

    #[test]
    fn default_nesting_number_is_depth_plus_one() {
        let mut tuplets = TupletStackManager::new();
        let mut diags = Diagnostics::new();

        tuplets.start(1, None, 3, 2, zero());
        tuplets.start(1, None, 3, 2, zero());
        tuplets.schedule_stop(1, Some(2));
        assert!(tuplets.apply_pending_stops(1, 0, &mut diags).is_empty());
        tuplets.schedule_stop(1, Some(1));
        assert_eq!(tuplets.apply_pending_stops(1, 0, &mut diags).len(), 1);
        assert!(diags.is_empty());
    }

    #[test]
    fn stop_without_start_is_structural() {
        let mut tuplets = TupletStackManager::new();
        let mut diags = Diagnostics::new();

        tuplets.schedule_stop(1, Some(1));
        let closed = tuplets.apply_pending_stops(1, 30, &mut diags);
        assert!(closed.is_empty());
        assert_eq!(diags.structural_count(), 1);
        assert!(diags.mentions("no matching start"));
    }

    #[test]
    fn duplicate_nesting_numbers_pop_the_topmost() {
        let mut tuplets = TupletStackManager::new();
        let mut diags = Diagnostics::new();

        tuplets.start(1, Some(1), 3, 2, zero());
        tuplets.start(1, Some(1), 5, 4, zero());
        tuplets.schedule_stop(1, Some(1));
        assert!(tuplets.apply_pending_stops(1, 0, &mut diags).is_empty());
        // The 5:4 (topmost) closed into the 3:2, which is still open.
        assert!(tuplets.in_tuplet(1));
        assert!(diags.is_empty());
    }

    #[test]
    fn measure_end_force_closes_open_tuplets() {
        let mut tuplets = TupletStackManager::new();
        let mut diags = Diagnostics::new();

        tuplets.start(1, Some(1), 3, 2, zero());
        tuplets.place(1, eighth(1));
        let closed = tuplets.force_close_all(40, &mut diags);

        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].0, 1);
        assert!(tuplets.is_empty());
        assert_eq!(diags.warning_count(), 1);
        assert!(diags.mentions("still open at measure end"));
    }
}
