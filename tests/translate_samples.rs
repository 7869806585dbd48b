//! Integration tests — whole translations of small MusicXML documents,
//! checking the shape of the resulting score tree.

use msrlib::msr::{Direction, MeasureElement, NoteKind, Voice};
use msrlib::{translate_musicxml, Rational, Score, Translation};
use pretty_assertions::assert_eq;

fn translate(xml: &str) -> Translation {
    translate_musicxml(xml).expect("translation should succeed")
}

fn r(numer: i32, denom: i32) -> Rational {
    Rational::new(numer, denom)
}

fn first_voice(score: &Score) -> &Voice {
    &score.parts()[0].staves[0].voices[0]
}

// ─── Scenario A: two standalone quarter notes ───────────────────────

#[test]
fn two_quarter_notes_stay_standalone() {
    let translation = translate(
        r#"<score-partwise version="4.0">
  <part-list>
    <score-part id="P1"><part-name>Music</part-name></score-part>
  </part-list>
  <part id="P1">
    <measure number="1">
      <attributes>
        <divisions>2</divisions>
        <time><beats>2</beats><beat-type>4</beat-type></time>
      </attributes>
      <note>
        <pitch><step>C</step><octave>4</octave></pitch>
        <duration>2</duration><voice>1</voice><type>quarter</type>
      </note>
      <note>
        <pitch><step>D</step><octave>4</octave></pitch>
        <duration>2</duration><voice>1</voice><type>quarter</type>
      </note>
    </measure>
  </part>
</score-partwise>"#,
    );

    assert!(translation.diagnostics.is_empty(), "no diagnostics expected");
    let voice = first_voice(&translation.score);
    assert_eq!(voice.measures.len(), 1);

    let measure = &voice.measures[0];
    assert_eq!(measure.declared_length, r(1, 2));
    assert_eq!(measure.filled_length, r(1, 2));
    assert_eq!(measure.elements.len(), 2);

    match (&measure.elements[0], &measure.elements[1]) {
        (MeasureElement::Note(first), MeasureElement::Note(second)) => {
            assert!(!first.in_chord && !first.in_tuplet);
            assert_eq!(first.sounding, r(1, 4));
            assert_eq!(first.position, r(0, 1));
            assert_eq!(second.position, r(1, 4));
        }
        other => panic!("expected two standalone notes, got {other:?}"),
    }
}

// ─── Scenario B: chord of three ─────────────────────────────────────

#[test]
fn chord_continuations_merge_into_one_chord() {
    let translation = translate(
        r#"<score-partwise>
  <part-list>
    <score-part id="P1"><part-name>Music</part-name></score-part>
  </part-list>
  <part id="P1">
    <measure number="1">
      <attributes>
        <divisions>1</divisions>
        <time><beats>1</beats><beat-type>4</beat-type></time>
      </attributes>
      <note>
        <pitch><step>C</step><octave>4</octave></pitch>
        <duration>1</duration><voice>1</voice><type>quarter</type>
      </note>
      <note>
        <chord/>
        <pitch><step>E</step><octave>4</octave></pitch>
        <duration>1</duration><voice>1</voice><type>quarter</type>
      </note>
      <note>
        <chord/>
        <pitch><step>G</step><octave>4</octave></pitch>
        <duration>1</duration><voice>1</voice><type>quarter</type>
      </note>
    </measure>
  </part>
</score-partwise>"#,
    );

    assert!(translation.diagnostics.is_empty());
    let measure = &first_voice(&translation.score).measures[0];
    assert_eq!(measure.elements.len(), 1, "no leftover standalone notes");

    match &measure.elements[0] {
        MeasureElement::Chord(chord) => {
            let steps: Vec<&str> = chord
                .notes
                .iter()
                .map(|n| match &n.kind {
                    NoteKind::Pitched(p) => p.step.as_str(),
                    _ => "?",
                })
                .collect();
            assert_eq!(steps, ["C", "E", "G"]);
            assert_eq!(chord.sounding, r(1, 4));
            assert!(chord.notes.iter().all(|n| n.in_chord));
        }
        other => panic!("expected a chord, got {other:?}"),
    }
    assert_eq!(measure.filled_length, r(1, 4));
}

// ─── Scenario C: 3:2 triplet ────────────────────────────────────────

#[test]
fn triplet_markers_build_one_tuplet() {
    let translation = translate(
        r#"<score-partwise>
  <part-list>
    <score-part id="P1"><part-name>Music</part-name></score-part>
  </part-list>
  <part id="P1">
    <measure number="1">
      <attributes>
        <divisions>6</divisions>
        <time><beats>1</beats><beat-type>4</beat-type></time>
      </attributes>
      <note>
        <pitch><step>C</step><octave>4</octave></pitch>
        <duration>2</duration><voice>1</voice><type>eighth</type>
        <time-modification><actual-notes>3</actual-notes><normal-notes>2</normal-notes></time-modification>
        <notations><tuplet type="start" number="1"/></notations>
      </note>
      <note>
        <pitch><step>D</step><octave>4</octave></pitch>
        <duration>2</duration><voice>1</voice><type>eighth</type>
        <time-modification><actual-notes>3</actual-notes><normal-notes>2</normal-notes></time-modification>
      </note>
      <note>
        <pitch><step>E</step><octave>4</octave></pitch>
        <duration>2</duration><voice>1</voice><type>eighth</type>
        <time-modification><actual-notes>3</actual-notes><normal-notes>2</normal-notes></time-modification>
        <notations><tuplet type="stop" number="1"/></notations>
      </note>
    </measure>
  </part>
</score-partwise>"#,
    );

    assert!(translation.diagnostics.is_empty());
    let measure = &first_voice(&translation.score).measures[0];
    assert_eq!(measure.elements.len(), 1);

    match &measure.elements[0] {
        MeasureElement::Tuplet(tuplet) => {
            assert_eq!(tuplet.actual, 3);
            assert_eq!(tuplet.normal, 2);
            assert_eq!(tuplet.elements.len(), 3);
            assert_eq!(tuplet.sounding(), r(1, 4));
        }
        other => panic!("expected a tuplet, got {other:?}"),
    }
    assert_eq!(measure.filled_length, r(1, 4));
}

// ─── Scenario D: direction attaches to the following note ───────────

#[test]
fn dynamic_before_a_note_attaches_to_that_note() {
    let translation = translate(
        r#"<score-partwise>
  <part-list>
    <score-part id="P1"><part-name>Music</part-name></score-part>
  </part-list>
  <part id="P1">
    <measure number="1">
      <attributes>
        <divisions>1</divisions>
        <time><beats>2</beats><beat-type>4</beat-type></time>
      </attributes>
      <note>
        <pitch><step>C</step><octave>4</octave></pitch>
        <duration>1</duration><voice>1</voice><type>quarter</type>
      </note>
      <direction placement="below">
        <direction-type><dynamics><p/></dynamics></direction-type>
        <voice>1</voice>
      </direction>
      <note>
        <pitch><step>D</step><octave>4</octave></pitch>
        <duration>1</duration><voice>1</voice><type>quarter</type>
      </note>
    </measure>
  </part>
</score-partwise>"#,
    );

    assert!(translation.diagnostics.is_empty());
    let measure = &first_voice(&translation.score).measures[0];
    match (&measure.elements[0], &measure.elements[1]) {
        (MeasureElement::Note(first), MeasureElement::Note(second)) => {
            assert!(
                first.decorations.dynamics.is_empty(),
                "the earlier note must not receive the dynamic"
            );
            assert_eq!(second.decorations.dynamics, vec!["p".to_string()]);
        }
        other => panic!("expected two notes, got {other:?}"),
    }
}

// ─── Scenario E: backup into a second voice ─────────────────────────

#[test]
fn backup_tracks_voices_independently() {
    let translation = translate(
        r#"<score-partwise>
  <part-list>
    <score-part id="P1"><part-name>Music</part-name></score-part>
  </part-list>
  <part id="P1">
    <measure number="1">
      <attributes>
        <divisions>2</divisions>
        <time><beats>2</beats><beat-type>4</beat-type></time>
      </attributes>
      <note>
        <pitch><step>C</step><octave>5</octave></pitch>
        <duration>2</duration><voice>1</voice><type>quarter</type>
      </note>
      <note>
        <pitch><step>D</step><octave>5</octave></pitch>
        <duration>2</duration><voice>1</voice><type>quarter</type>
      </note>
      <backup><duration>2</duration></backup>
      <note>
        <pitch><step>G</step><octave>4</octave></pitch>
        <duration>2</duration><voice>2</voice><type>quarter</type>
      </note>
    </measure>
  </part>
</score-partwise>"#,
    );

    assert!(translation.diagnostics.is_empty());
    let part = &translation.score.parts()[0];
    let voice1 = part.voice(1).expect("voice 1");
    let voice2 = part.voice(2).expect("voice 2");

    assert_eq!(voice1.measures[0].filled_length, r(1, 2));
    assert_eq!(voice2.measures[0].filled_length, r(1, 4));

    // The second voice's note starts where the backup left the cursor.
    match &voice2.measures[0].elements[0] {
        MeasureElement::Note(n) => {
            assert_eq!(n.position, r(1, 4));
            assert_eq!(n.voice, 2);
        }
        other => panic!("expected a note, got {other:?}"),
    }
}

// ─── Skeleton and metadata ──────────────────────────────────────────

#[test]
fn part_groups_and_metadata_survive_translation() {
    let translation = translate(
        r#"<score-partwise version="3.1">
  <work><work-title>Kleine Suite</work-title></work>
  <identification>
    <creator type="composer">Anna Writer</creator>
    <encoding><software>TestWriter 2</software></encoding>
  </identification>
  <part-list>
    <part-group type="start" number="1">
      <group-name>Strings</group-name>
      <group-symbol>bracket</group-symbol>
    </part-group>
    <score-part id="P1"><part-name>Violin</part-name></score-part>
    <score-part id="P2"><part-name>Cello</part-name></score-part>
    <part-group type="stop" number="1"/>
  </part-list>
  <part id="P1">
    <measure number="1">
      <attributes><divisions>1</divisions><time><beats>1</beats><beat-type>4</beat-type></time></attributes>
      <note><pitch><step>A</step><octave>4</octave></pitch><duration>1</duration><voice>1</voice></note>
    </measure>
  </part>
  <part id="P2">
    <measure number="1">
      <attributes><divisions>1</divisions><time><beats>1</beats><beat-type>4</beat-type></time></attributes>
      <note><pitch><step>C</step><octave>3</octave></pitch><duration>1</duration><voice>1</voice></note>
    </measure>
  </part>
</score-partwise>"#,
    );

    let score = &translation.score;
    assert_eq!(score.work_title.as_deref(), Some("Kleine Suite"));
    assert_eq!(score.composer.as_deref(), Some("Anna Writer"));
    assert_eq!(score.software.as_deref(), Some("TestWriter 2"));
    assert_eq!(score.version.as_deref(), Some("3.1"));

    assert_eq!(score.part_groups.len(), 1);
    assert_eq!(score.part_groups[0].name.as_deref(), Some("Strings"));
    assert_eq!(score.parts().len(), 2);
    assert_eq!(score.measure_count(), 1);

    // Both parts got their content.
    for part in score.parts() {
        assert_eq!(part.staves[0].voices[0].measures[0].elements.len(), 1);
    }
}

#[test]
fn grand_staff_voices_are_homed_on_their_staves() {
    let translation = translate(
        r#"<score-partwise>
  <part-list>
    <score-part id="P1"><part-name>Piano</part-name></score-part>
  </part-list>
  <part id="P1">
    <measure number="1">
      <attributes>
        <divisions>1</divisions>
        <time><beats>1</beats><beat-type>4</beat-type></time>
        <staves>2</staves>
        <clef number="1"><sign>G</sign><line>2</line></clef>
        <clef number="2"><sign>F</sign><line>4</line></clef>
      </attributes>
      <note>
        <pitch><step>E</step><octave>5</octave></pitch>
        <duration>1</duration><voice>1</voice><staff>1</staff>
      </note>
      <backup><duration>1</duration></backup>
      <note>
        <pitch><step>C</step><octave>3</octave></pitch>
        <duration>1</duration><voice>5</voice><staff>2</staff>
      </note>
    </measure>
  </part>
</score-partwise>"#,
    );

    assert!(translation.diagnostics.is_empty());
    let part = &translation.score.parts()[0];
    assert_eq!(part.staves.len(), 2);
    assert_eq!(part.staves[0].clef.as_ref().unwrap().sign, "G");
    assert_eq!(part.staves[1].clef.as_ref().unwrap().sign, "F");

    // Voice 1 lives on staff 1, voice 5 on staff 2.
    assert_eq!(part.staves[0].voices.len(), 1);
    assert_eq!(part.staves[0].voices[0].number, 1);
    assert_eq!(part.staves[1].voices.len(), 1);
    assert_eq!(part.staves[1].voices[0].number, 5);
}

#[test]
fn voice_independent_marks_attach_to_the_first_note() {
    let translation = translate(
        r#"<score-partwise>
  <part-list>
    <score-part id="P1"><part-name>Music</part-name></score-part>
  </part-list>
  <part id="P1">
    <measure number="1">
      <attributes><divisions>1</divisions><time><beats>1</beats><beat-type>4</beat-type></time></attributes>
      <direction placement="above">
        <direction-type><rehearsal>A</rehearsal></direction-type>
      </direction>
      <direction>
        <direction-type>
          <metronome><beat-unit>quarter</beat-unit><per-minute>96</per-minute></metronome>
        </direction-type>
        <sound tempo="96"/>
      </direction>
      <note>
        <pitch><step>C</step><octave>4</octave></pitch>
        <duration>1</duration><voice>1</voice>
      </note>
    </measure>
  </part>
</score-partwise>"#,
    );

    assert!(translation.diagnostics.is_empty());
    let measure = &first_voice(&translation.score).measures[0];
    match &measure.elements[0] {
        MeasureElement::Note(note) => {
            let directions = &note.decorations.directions;
            assert!(directions
                .iter()
                .any(|d| matches!(d, Direction::Rehearsal { text } if text == "A")));
            assert!(directions
                .iter()
                .any(|d| matches!(d, Direction::Metronome { per_minute, .. } if *per_minute == 96.0)));
            assert!(directions
                .iter()
                .any(|d| matches!(d, Direction::Tempo { quarter_bpm } if *quarter_bpm == 96.0)));
        }
        other => panic!("expected a note, got {other:?}"),
    }
}

#[test]
fn score_round_trips_through_json() {
    let translation = translate(
        r#"<score-partwise>
  <part-list>
    <score-part id="P1"><part-name>Music</part-name></score-part>
  </part-list>
  <part id="P1">
    <measure number="1">
      <attributes><divisions>1</divisions><time><beats>1</beats><beat-type>4</beat-type></time></attributes>
      <note><pitch><step>C</step><octave>4</octave></pitch><duration>1</duration><voice>1</voice></note>
    </measure>
  </part>
</score-partwise>"#,
    );

    let json = msrlib::score_to_json(&translation.score).expect("serialize");
    let deserialized: Score = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(deserialized.parts().len(), translation.score.parts().len());
    assert_eq!(deserialized.measure_count(), 1);
}
