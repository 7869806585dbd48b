//! Skeleton builder — first of the two translation phases.
//!
//! One traversal of the source tree's declarations creates the empty
//! Score → PartGroup → Part → Staff hierarchy, with no musical content.
//! Only part-group, part, and staff-count declarations are visited; the
//! populator never has to create a part, and creates staves and voices
//! lazily only when the source referenced one without declaring it.

use crate::diagnostics::{Diagnostics, TranslationError};
use crate::msr::{Part, PartGroup, PartGroupElement, Score, Staff};
use crate::mxsr::Element;

/// Build the empty score hierarchy from a `score-partwise` tree.
pub fn build_skeleton(root: &Element, diags: &mut Diagnostics) -> Result<Score, TranslationError> {
    if root.children.is_empty() {
        return Err(TranslationError::EmptySourceTree);
    }

    let mut score = Score::new();
    score.version = root.attribute("version").map(String::from);

    for child in &root.children {
        match child.name.as_str() {
            "work" => {
                // Only a fallback; <credit type="title"> takes priority.
                if score.work_title.is_none() {
                    score.work_title = child.child_text("work-title").map(String::from);
                }
            }
            "movement-title" => {
                score.movement_title = child.text.clone();
            }
            "identification" => read_identification(child, &mut score),
            "credit" => read_credit(child, &mut score),
            "part-list" => read_part_list(child, &mut score)?,
            _ => {}
        }
    }

    if score.parts().is_empty() {
        return Err(TranslationError::EmptySourceTree);
    }

    // Declared staves, eagerly created per part.
    for part_node in root.children_named("part") {
        let Some(id) = part_node.attribute("id") else {
            return Err(TranslationError::MalformedSkeleton {
                line: part_node.line,
                message: "part has no id attribute".to_string(),
            });
        };
        let declared = declared_staff_count(part_node);
        match score.part_mut(id) {
            Some(part) => {
                for number in 1..=declared {
                    part.staves.push(Staff {
                        number,
                        ..Default::default()
                    });
                }
            }
            None => {
                diags.structural(
                    part_node.line,
                    format!("part '{id}' is not declared in the part-list; skipping"),
                );
            }
        }
    }

    Ok(score)
}

fn read_identification(node: &Element, score: &mut Score) {
    for child in &node.children {
        match child.name.as_str() {
            "creator" => {
                let text = child.text.clone();
                match child.attribute("type").unwrap_or("") {
                    // <credit type="composer"> takes priority.
                    "composer" => {
                        if score.composer.is_none() {
                            score.composer = text;
                        }
                    }
                    "arranger" => score.arranger = text,
                    _ => {}
                }
            }
            "encoding" => {
                if let Some(software) = child.child_text("software") {
                    score.software = Some(software.to_string());
                }
            }
            _ => {}
        }
    }
}

fn read_credit(node: &Element, score: &mut Score) {
    let credit_type = node.child_text("credit-type").unwrap_or("");
    let text: String = node
        .children_named("credit-words")
        .filter_map(|c| c.text.as_deref())
        .collect::<Vec<_>>()
        .join("\n");
    if text.is_empty() {
        return;
    }
    match credit_type {
        "title" => score.work_title = Some(text),
        "composer" => score.composer = Some(text),
        _ => {}
    }
}

/// Walk the part-list, pairing part-group start/stop markers by number and
/// attaching parts to the innermost open group.  Parts outside any group
/// land in synthesized implicit groups, one per contiguous run.
fn read_part_list(list: &Element, score: &mut Score) -> Result<(), TranslationError> {
    let mut open: Vec<PartGroup> = Vec::new();
    let mut implicit: Option<PartGroup> = None;

    for child in &list.children {
        match child.name.as_str() {
            "part-group" => {
                let number = child.attribute("number").unwrap_or("1").to_string();
                match child.attribute("type") {
                    Some("start") => {
                        if let Some(group) = implicit.take() {
                            score.part_groups.push(group);
                        }
                        open.push(read_part_group(child, number));
                    }
                    Some("stop") => {
                        close_group(&mut open, &number, score, child.line)?;
                    }
                    other => {
                        return Err(TranslationError::MalformedSkeleton {
                            line: child.line,
                            message: format!(
                                "part-group {number} has type {other:?}, expected start or stop"
                            ),
                        });
                    }
                }
            }
            "score-part" => {
                let Some(id) = child.attribute("id") else {
                    return Err(TranslationError::MalformedSkeleton {
                        line: child.line,
                        message: "score-part has no id attribute".to_string(),
                    });
                };
                let part = Part {
                    id: id.to_string(),
                    name: child
                        .child_text("part-name")
                        .unwrap_or_default()
                        .to_string(),
                    abbreviation: child.child_text("part-abbreviation").map(String::from),
                    ..Default::default()
                };
                match open.last_mut() {
                    Some(group) => group.elements.push(PartGroupElement::Part(part)),
                    None => implicit
                        .get_or_insert_with(implicit_group)
                        .elements
                        .push(PartGroupElement::Part(part)),
                }
            }
            _ => {}
        }
    }

    if let Some(group) = open.pop() {
        return Err(TranslationError::MalformedSkeleton {
            line: list.line,
            message: format!("part-group {} was never closed", group.number),
        });
    }
    if let Some(group) = implicit.take() {
        score.part_groups.push(group);
    }

    Ok(())
}

fn read_part_group(node: &Element, number: String) -> PartGroup {
    PartGroup {
        number,
        name: node.child_text("group-name").map(String::from),
        abbreviation: node.child_text("group-abbreviation").map(String::from),
        symbol: node.child_text("group-symbol").map(String::from),
        group_barline: node.child_text("group-barline") == Some("yes"),
        implicit: false,
        elements: Vec::new(),
    }
}

/// Close the most recently started open group with the given number.
/// A stop with no matching open start is fatal.
fn close_group(
    open: &mut Vec<PartGroup>,
    number: &str,
    score: &mut Score,
    line: u32,
) -> Result<(), TranslationError> {
    let Some(index) = open.iter().rposition(|g| g.number == number) else {
        return Err(TranslationError::MalformedSkeleton {
            line,
            message: format!("part-group {number} closes without a matching open"),
        });
    };
    // Groups started after it become its children.
    while open.len() > index + 1 {
        let inner = open.pop().unwrap();
        open[index].elements.push(PartGroupElement::Group(inner));
    }
    let group = open.pop().unwrap();
    match open.last_mut() {
        Some(parent) => parent.elements.push(PartGroupElement::Group(group)),
        None => score.part_groups.push(group),
    }
    Ok(())
}

fn implicit_group() -> PartGroup {
    PartGroup {
        number: "0".to_string(),
        implicit: true,
        ..Default::default()
    }
}

/// First declared staff count of a part, from `<attributes><staves>`.
fn declared_staff_count(part_node: &Element) -> i32 {
    part_node
        .children_named("measure")
        .flat_map(|m| m.children_named("attributes"))
        .find_map(|a| a.child_i32("staves"))
        .unwrap_or(1)
        .max(1)
}
