//! Reading and writing plan markdown
//!
//! ```text
//! # Title
//! **Goal:** one sentence
//!
//! ## Analysis
//! ## Questions
//! ## Phase 1: Name
//! - [ ] 1.1 todo
//! - [/] 1.2 in progress
//! - [x] 1.3 done (done: 2024-05-01)
//! - [>] 1.4 blocked (blocked: reason)
//! - [!] 1.5 needs review (review: note)
//! ## Notes
//! ```
//!
//! Writing always produces the canonical form: title and goal on adjacent
//! lines, one blank line between sections, no blank lines at the edges of a
//! section body and a single trailing newline. Parsing the canonical form
//! gives back the same plan.

use super::model::{Phase, PhaseLine, Plan, Section, Task, TaskState, TaskStatus};

const GOAL_PREFIX: &str = "**Goal:**";

// ============================================
// Parsing
// ============================================

/// Section being collected.
enum Open {
    Analysis(Vec<String>),
    Questions(Vec<String>),
    Phase(Phase),
    Notes(Vec<String>),
    Other { heading: String, body: Vec<String> },
}

impl Open {
    fn from_heading(line: &str) -> Self {
        let text = line.trim_start_matches('#').trim();
        let lower = text.to_ascii_lowercase();
        match lower.as_str() {
            "analysis" => return Open::Analysis(Vec::new()),
            "questions" | "open questions" => return Open::Questions(Vec::new()),
            "notes" => return Open::Notes(Vec::new()),
            _ => {}
        }
        if let Some((number, name)) = parse_phase_heading(text) {
            return Open::Phase(Phase {
                number,
                name,
                lines: Vec::new(),
            });
        }
        Open::Other {
            heading: line.trim_end().to_string(),
            body: Vec::new(),
        }
    }

    fn push(&mut self, line: &str) {
        match self {
            Open::Analysis(body) | Open::Questions(body) | Open::Notes(body) => {
                body.push(line.to_string())
            }
            Open::Other { body, .. } => body.push(line.to_string()),
            Open::Phase(phase) => phase.lines.push(parse_phase_line(line)),
        }
    }

    fn close(self) -> Section {
        match self {
            Open::Analysis(body) => Section::Analysis(trim_blank_edges(body)),
            Open::Questions(body) => Section::Questions(trim_blank_edges(body)),
            Open::Notes(body) => Section::Notes(trim_blank_edges(body)),
            Open::Other { heading, body } => Section::Other {
                heading,
                body: trim_blank_edges(body),
            },
            Open::Phase(mut phase) => {
                while matches!(phase.lines.first(), Some(PhaseLine::Raw(l)) if l.trim().is_empty())
                {
                    phase.lines.remove(0);
                }
                while matches!(phase.lines.last(), Some(PhaseLine::Raw(l)) if l.trim().is_empty())
                {
                    phase.lines.pop();
                }
                phase.assign_missing_steps();
                Section::Phase(phase)
            }
        }
    }
}

fn trim_blank_edges(mut lines: Vec<String>) -> Vec<String> {
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    let start = lines
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or(lines.len());
    lines.split_off(start)
}

fn is_section_heading(line: &str) -> bool {
    line.starts_with("## ") || line.trim_end() == "##"
}

fn is_title(line: &str) -> bool {
    line.starts_with("# ")
}

/// `Phase 2: Name`, `Phase 2 - Name`, `Phase 2. Name` or just `Phase 2`.
fn parse_phase_heading(text: &str) -> Option<(u32, String)> {
    let head = text.get(..5)?;
    if !head.eq_ignore_ascii_case("phase") {
        return None;
    }
    let rest = &text[5..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim_start();
    let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    let number = rest[..digits].parse().ok()?;
    let tail = &rest[digits..];
    if !tail.is_empty() && !tail.starts_with([':', '-', '.', ' ']) {
        return None;
    }
    let name = tail
        .trim_start_matches(|c: char| c == ':' || c == '-' || c == '.' || c.is_whitespace())
        .trim_end()
        .to_string();
    Some((number, name))
}

fn parse_phase_line(line: &str) -> PhaseLine {
    match parse_task(line) {
        Some(task) => PhaseLine::Task(task),
        None => PhaseLine::Raw(line.to_string()),
    }
}

/// A top-level checkbox item. Indented items and unknown markers are not
/// tasks.
fn parse_task(line: &str) -> Option<Task> {
    let rest = line
        .strip_prefix("- [")
        .or_else(|| line.strip_prefix("* ["))?;
    let mut chars = rest.chars();
    let status = TaskStatus::from_marker(chars.next()?)?;
    let rest = chars.as_str().strip_prefix(']')?;
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    let rest = rest.trim();

    let (step, text) = match rest.split_once(' ') {
        Some((first, tail)) if is_step(first) => (first.to_string(), tail.trim()),
        None if is_step(rest) => (rest.to_string(), ""),
        _ => (String::new(), rest),
    };

    let (title, state) = match status {
        TaskStatus::Todo => (text.to_string(), TaskState::Todo),
        TaskStatus::Doing => (text.to_string(), TaskState::Doing),
        TaskStatus::Done => {
            let (title, on) = split_suffix(text, "done");
            let on = on.filter(|d| !d.is_empty());
            (title, TaskState::Done { on })
        }
        TaskStatus::Blocked => {
            let (title, reason) = split_suffix(text, "blocked");
            (
                title,
                TaskState::Blocked {
                    reason: reason.unwrap_or_default(),
                },
            )
        }
        TaskStatus::Review => {
            let (title, note) = split_suffix(text, "review");
            (
                title,
                TaskState::Review {
                    note: note.unwrap_or_default(),
                },
            )
        }
    };

    Some(Task { step, title, state })
}

fn is_step(token: &str) -> bool {
    match token.split_once('.') {
        Some((phase, index)) => {
            !phase.is_empty()
                && !index.is_empty()
                && phase.chars().all(|c| c.is_ascii_digit())
                && index.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Split `title (key: value)` into its parts.
fn split_suffix(text: &str, key: &str) -> (String, Option<String>) {
    let open = format!("({}:", key);
    if text.ends_with(')') {
        if let Some(at) = text.rfind(&open) {
            let value = text[at + open.len()..text.len() - 1].trim().to_string();
            let title = text[..at].trim_end().to_string();
            return (title, Some(value));
        }
    }
    (text.to_string(), None)
}

/// Parse a plan document. Never fails.
pub fn parse(text: &str) -> Plan {
    let mut plan = Plan::default();
    let mut open: Option<Open> = None;

    for line in text.lines() {
        if let Some(Open::Notes(body)) = open.as_mut() {
            body.push(line.to_string());
            continue;
        }

        if is_section_heading(line) {
            if let Some(section) = open.take() {
                plan.sections.push(section.close());
            }
            open = Some(Open::from_heading(line));
            continue;
        }

        match open.as_mut() {
            Some(section) => section.push(line),
            None if plan.title.is_none() && is_title(line) => {
                plan.title = Some(line[2..].trim().to_string());
            }
            None if plan.title.is_none() => plan.preamble.push(line.to_string()),
            None => match line.trim_start().strip_prefix(GOAL_PREFIX) {
                Some(goal) if plan.goal.is_none() => plan.goal = Some(goal.trim().to_string()),
                _ => plan.intro.push(line.to_string()),
            },
        }
    }

    if let Some(section) = open {
        plan.sections.push(section.close());
    }
    plan.preamble = trim_blank_edges(std::mem::take(&mut plan.preamble));
    plan.intro = trim_blank_edges(std::mem::take(&mut plan.intro));
    plan
}

// ============================================
// Writing
// ============================================

fn task_line(task: &Task) -> String {
    let mut line = format!("- [{}]", task.status().marker());
    if !task.step.is_empty() {
        line.push(' ');
        line.push_str(&task.step);
    }
    if !task.title.is_empty() {
        line.push(' ');
        line.push_str(&task.title);
    }
    let suffix = match &task.state {
        TaskState::Done { on: Some(on) } if !on.is_empty() => Some(("done", on)),
        TaskState::Blocked { reason } if !reason.is_empty() => Some(("blocked", reason)),
        TaskState::Review { note } if !note.is_empty() => Some(("review", note)),
        _ => None,
    };
    if let Some((key, value)) = suffix {
        line.push_str(&format!(" ({}: {})", key, value));
    }
    line
}

fn phase_heading(phase: &Phase) -> String {
    if phase.name.is_empty() {
        format!("## Phase {}", phase.number)
    } else {
        format!("## Phase {}: {}", phase.number, phase.name)
    }
}

fn section_block(section: &Section) -> Vec<String> {
    let (heading, body): (String, Vec<String>) = match section {
        Section::Analysis(body) => ("## Analysis".into(), body.clone()),
        Section::Questions(body) => ("## Questions".into(), body.clone()),
        Section::Notes(body) => ("## Notes".into(), body.clone()),
        Section::Other { heading, body } => (heading.clone(), body.clone()),
        Section::Phase(phase) => (
            phase_heading(phase),
            phase
                .lines
                .iter()
                .map(|line| match line {
                    PhaseLine::Task(task) => task_line(task),
                    PhaseLine::Raw(raw) => raw.clone(),
                })
                .collect(),
        ),
    };
    let mut block = vec![heading];
    block.extend(trim_blank_edges(body));
    block
}

/// Canonical markdown for a plan.
pub fn render(plan: &Plan) -> String {
    let mut blocks: Vec<Vec<String>> = Vec::new();

    let preamble = trim_blank_edges(plan.preamble.clone());
    if !preamble.is_empty() {
        blocks.push(preamble);
    }
    let mut head = Vec::new();
    if let Some(title) = &plan.title {
        head.push(format!("# {}", title));
    }
    if let Some(goal) = &plan.goal {
        head.push(format!("{} {}", GOAL_PREFIX, goal));
    }
    if !head.is_empty() {
        blocks.push(head);
    }
    let intro = trim_blank_edges(plan.intro.clone());
    if !intro.is_empty() {
        blocks.push(intro);
    }
    blocks.extend(plan.sections.iter().map(section_block));

    let mut out = blocks
        .iter()
        .map(|block| block.join("\n"))
        .collect::<Vec<_>>()
        .join("\n\n");
    out.push('\n');
    out
}

impl Plan {
    pub fn parse(text: &str) -> Self {
        parse(text)
    }

    pub fn to_markdown(&self) -> String {
        render(self)
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&render(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# Ship the exporter
**Goal:** Export every store to CSV.

## Analysis
The exporter reads slots and writes rows.

## Questions
- Which delimiter?

## Phase 1: Build
- [x] 1.1 Read slots (done: 2024-05-01)
- [>] 1.2 Write rows (blocked: waiting on delimiter)
- [ ] 1.3 Wire the CLI
  - [ ] nested detail
- [!] 1.4 Error messages (review: wording)
- [ ] 1.5 Docs

## Phase 2 - Release
- [/] 2.1 Tag

## Notes
## Not a section
- [ ] not a task either
";

    #[test]
    fn test_parse_sample() {
        let plan = parse(SAMPLE);
        assert_eq!(plan.title.as_deref(), Some("Ship the exporter"));
        assert_eq!(plan.goal.as_deref(), Some("Export every store to CSV."));
        assert_eq!(plan.phases().count(), 2);
        assert_eq!(plan.questions(), vec!["Which delimiter?"]);

        let statuses: Vec<TaskStatus> = plan
            .phases()
            .next()
            .unwrap()
            .tasks()
            .map(Task::status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                TaskStatus::Done,
                TaskStatus::Blocked,
                TaskStatus::Todo,
                TaskStatus::Review,
                TaskStatus::Todo,
            ]
        );
        assert_eq!(plan.next_task().unwrap().step, "1.3");
        assert_eq!(
            plan.task("1.2").unwrap().state,
            TaskState::Blocked {
                reason: "waiting on delimiter".into()
            }
        );
        assert_eq!(plan.task("2.1").unwrap().status(), TaskStatus::Doing);
        assert_eq!(
            plan.notes().unwrap(),
            "## Not a section\n- [ ] not a task either"
        );
    }

    #[test]
    fn test_canonical_form_is_stable() {
        let rendered = render(&parse(SAMPLE));
        assert_eq!(rendered, SAMPLE.replace("## Phase 2 - Release", "## Phase 2: Release"));
        assert_eq!(render(&parse(&rendered)), rendered);
        assert_eq!(parse(&rendered), parse(SAMPLE));
    }

    #[test]
    fn test_blank_lines_normalized() {
        let messy = "\n\n# T\n\n\n**Goal:** g\n\n## Phase 1: A\n\n\n- [ ] 1.1 a\n\n\n\n## Notes\n\nkeep\n\n";
        let rendered = render(&parse(messy));
        assert_eq!(rendered, "# T\n**Goal:** g\n\n## Phase 1: A\n- [ ] 1.1 a\n\n## Notes\nkeep\n");
    }

    #[test]
    fn test_missing_steps_assigned() {
        let plan = parse("# T\n## Phase 3: X\n- [ ] first\n- [ ] 3.2 second\n- [x] third\n");
        let steps: Vec<&str> = plan.tasks().map(|t| t.step.as_str()).collect();
        assert_eq!(steps, vec!["3.3", "3.2", "3.4"]);
    }

    #[test]
    fn test_unknown_marker_is_raw() {
        let plan = parse("## Phase 1: X\n- [?] 1.1 what\n- [ ]1.2 glued\n* [ ] 1.3 star\n");
        let phase = plan.phases().next().unwrap();
        assert!(matches!(&phase.lines[0], PhaseLine::Raw(l) if l == "- [?] 1.1 what"));
        assert!(matches!(&phase.lines[1], PhaseLine::Raw(_)));
        assert_eq!(phase.tasks().count(), 1);
    }

    #[test]
    fn test_phase_heading_variants() {
        assert_eq!(parse_phase_heading("Phase 1: Build"), Some((1, "Build".into())));
        assert_eq!(parse_phase_heading("phase 12. Ship"), Some((12, "Ship".into())));
        assert_eq!(parse_phase_heading("Phase 4"), Some((4, String::new())));
        assert_eq!(parse_phase_heading("Phases 4"), None);
        assert_eq!(parse_phase_heading("Phase two"), None);
        assert_eq!(parse_phase_heading("Phase 4x"), None);
    }

    #[test]
    fn test_other_sections_preserved() {
        let text = "# T\n\nintro text\n\n## Risks\n- [ ] 9.9 not a task here\n\n## Notes\n";
        let plan = parse(text);
        assert_eq!(plan.intro, vec!["intro text"]);
        assert!(matches!(
            &plan.sections[0],
            Section::Other { heading, body } if heading == "## Risks" && body.len() == 1
        ));
        assert_eq!(plan.tasks().count(), 0);
        assert_eq!(render(&plan), text);
    }

    #[test]
    fn test_task_line_without_suffix() {
        let plan = parse("## Phase 1: X\n- [x] 1.1 done without date\n- [>] 1.2 blocked, no reason\n");
        assert_eq!(plan.task("1.1").unwrap().state, TaskState::Done { on: None });
        let rendered = render(&plan);
        assert!(rendered.contains("- [x] 1.1 done without date\n"));
        assert!(rendered.contains("- [>] 1.2 blocked, no reason\n"));
    }

    #[test]
    fn test_empty_document() {
        let plan = parse("");
        assert_eq!(plan, Plan::default());
        assert_eq!(render(&plan), "\n");
    }
}
