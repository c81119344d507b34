//! Plan document model and task transitions

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Task status as written in the checkbox marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    Doing,
    Done,
    Blocked,
    Review,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::Doing => "doing",
            TaskStatus::Done => "done",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Review => "review",
        }
    }

    pub fn marker(&self) -> char {
        match self {
            TaskStatus::Todo => ' ',
            TaskStatus::Doing => '/',
            TaskStatus::Done => 'x',
            TaskStatus::Blocked => '>',
            TaskStatus::Review => '!',
        }
    }

    pub fn from_marker(marker: char) -> Option<Self> {
        match marker {
            ' ' => Some(TaskStatus::Todo),
            '/' => Some(TaskStatus::Doing),
            'x' | 'X' => Some(TaskStatus::Done),
            '>' => Some(TaskStatus::Blocked),
            '!' => Some(TaskStatus::Review),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status plus the data that only exists in that status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskState {
    Todo,
    Doing,
    Done { on: Option<String> },
    Blocked { reason: String },
    Review { note: String },
}

impl TaskState {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskState::Todo => TaskStatus::Todo,
            TaskState::Doing => TaskStatus::Doing,
            TaskState::Done { .. } => TaskStatus::Done,
            TaskState::Blocked { .. } => TaskStatus::Blocked,
            TaskState::Review { .. } => TaskStatus::Review,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    /// `{phase}.{index}`, stable once written
    pub step: String,
    pub title: String,
    #[serde(flatten)]
    pub state: TaskState,
}

impl Task {
    pub fn status(&self) -> TaskStatus {
        self.state.status()
    }
}

/// A line inside a phase: a task, or anything else kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseLine {
    Task(Task),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    pub number: u32,
    pub name: String,
    pub lines: Vec<PhaseLine>,
}

impl Phase {
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.lines.iter().filter_map(|line| match line {
            PhaseLine::Task(task) => Some(task),
            PhaseLine::Raw(_) => None,
        })
    }

    fn tasks_mut(&mut self) -> impl Iterator<Item = &mut Task> {
        self.lines.iter_mut().filter_map(|line| match line {
            PhaseLine::Task(task) => Some(task),
            PhaseLine::Raw(_) => None,
        })
    }

    /// Give tasks without a step the next free index in this phase.
    pub(crate) fn assign_missing_steps(&mut self) {
        let prefix = format!("{}.", self.number);
        let mut next = self
            .tasks()
            .filter_map(|t| t.step.strip_prefix(&prefix)?.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        let number = self.number;
        for task in self.tasks_mut().filter(|t| t.step.is_empty()) {
            next += 1;
            task.step = format!("{}.{}", number, next);
        }
    }
}

/// A `##` section of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section {
    Analysis(Vec<String>),
    Questions(Vec<String>),
    Phase(Phase),
    /// Everything from `## Notes` to the end of the document
    Notes(Vec<String>),
    /// Any other section, heading line kept as written
    Other { heading: String, body: Vec<String> },
}

/// Counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub todo: usize,
    pub doing: usize,
    pub done: usize,
    pub blocked: usize,
    pub review: usize,
}

impl Progress {
    pub fn total(&self) -> usize {
        self.todo + self.doing + self.done + self.blocked + self.review
    }

    /// Share of done tasks, 0..=100.
    pub fn percent_done(&self) -> u32 {
        match self.total() {
            0 => 0,
            total => (self.done * 100 / total) as u32,
        }
    }
}

/// Input for a brand-new plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanDraft {
    pub title: String,
    pub goal: String,
    #[serde(default)]
    pub analysis: Option<String>,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub phases: Vec<PhaseDraft>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseDraft {
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<String>,
}

/// A parsed plan document.
///
/// Parsing never fails; lines that do not fit the structure are kept in the
/// section they appeared in and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// Lines before the title
    pub preamble: Vec<String>,
    pub title: Option<String>,
    pub goal: Option<String>,
    /// Lines between the title and the first section, other than the goal
    pub intro: Vec<String>,
    pub sections: Vec<Section>,
}

fn text_lines(text: &str) -> Vec<String> {
    text.lines().map(|l| l.trim_end().to_string()).collect()
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl Plan {
    pub fn from_draft(draft: PlanDraft) -> Result<Self> {
        let title = single_line(&draft.title);
        if title.is_empty() {
            return Err(Error::validation("plan title is empty", "give the plan a title"));
        }
        let goal = single_line(&draft.goal);
        if goal.is_empty() {
            return Err(Error::validation(
                "plan goal is empty",
                "state the goal in one sentence",
            ));
        }

        let mut sections = Vec::new();
        if let Some(analysis) = draft.analysis.filter(|a| !a.trim().is_empty()) {
            sections.push(Section::Analysis(text_lines(analysis.trim())));
        }
        if !draft.questions.is_empty() {
            sections.push(Section::Questions(
                draft
                    .questions
                    .iter()
                    .map(|q| format!("- {}", single_line(q)))
                    .collect(),
            ));
        }
        for (i, phase) in draft.phases.into_iter().enumerate() {
            let number = i as u32 + 1;
            let lines = phase
                .tasks
                .iter()
                .enumerate()
                .map(|(j, title)| {
                    PhaseLine::Task(Task {
                        step: format!("{}.{}", number, j + 1),
                        title: single_line(title),
                        state: TaskState::Todo,
                    })
                })
                .collect();
            sections.push(Section::Phase(Phase {
                number,
                name: single_line(&phase.name),
                lines,
            }));
        }
        sections.push(Section::Notes(
            draft
                .notes
                .map(|n| text_lines(n.trim()))
                .unwrap_or_default(),
        ));

        Ok(Plan {
            preamble: Vec::new(),
            title: Some(title),
            goal: Some(goal),
            intro: Vec::new(),
            sections,
        })
    }

    pub fn phases(&self) -> impl Iterator<Item = &Phase> {
        self.sections.iter().filter_map(|s| match s {
            Section::Phase(phase) => Some(phase),
            _ => None,
        })
    }

    /// All tasks in document order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.phases().flat_map(|phase| phase.tasks())
    }

    pub fn task(&self, step: &str) -> Option<&Task> {
        self.tasks().find(|t| t.step == step)
    }

    fn task_mut(&mut self, step: &str) -> Result<&mut Task> {
        self.sections
            .iter_mut()
            .filter_map(|s| match s {
                Section::Phase(phase) => Some(phase),
                _ => None,
            })
            .flat_map(|phase| phase.tasks_mut())
            .find(|t| t.step == step)
            .ok_or_else(|| Error::Plan(format!("step {} does not exist in the plan", step)))
    }

    /// First todo task in document order. Blocked and review tasks are never
    /// returned, wherever they sit.
    pub fn next_task(&self) -> Option<&Task> {
        self.tasks().find(|t| t.status() == TaskStatus::Todo)
    }

    pub fn tasks_with(&self, status: TaskStatus) -> Vec<&Task> {
        self.tasks().filter(|t| t.status() == status).collect()
    }

    pub fn blocked_tasks(&self) -> Vec<&Task> {
        self.tasks_with(TaskStatus::Blocked)
    }

    pub fn review_tasks(&self) -> Vec<&Task> {
        self.tasks_with(TaskStatus::Review)
    }

    fn transition(&mut self, step: &str, state: TaskState) -> Result<Task> {
        let task = self.task_mut(step)?;
        task.state = state;
        Ok(task.clone())
    }

    pub fn start(&mut self, step: &str) -> Result<Task> {
        self.transition(step, TaskState::Doing)
    }

    pub fn complete(&mut self, step: &str, on: NaiveDate) -> Result<Task> {
        let on = on.format("%Y-%m-%d").to_string();
        self.transition(step, TaskState::Done { on: Some(on) })
    }

    pub fn block(&mut self, step: &str, reason: &str) -> Result<Task> {
        let reason = required_text(reason, "block reason", "say what the task is waiting on")?;
        self.transition(step, TaskState::Blocked { reason })
    }

    pub fn flag_review(&mut self, step: &str, note: &str) -> Result<Task> {
        let note = required_text(note, "review note", "say what needs reviewing")?;
        self.transition(step, TaskState::Review { note })
    }

    pub fn reset(&mut self, step: &str) -> Result<Task> {
        self.transition(step, TaskState::Todo)
    }

    /// Add text to the end of the Notes section, creating it if needed.
    pub fn append_note(&mut self, text: &str) {
        let lines = text_lines(text.trim_end());
        if let Some(Section::Notes(body)) = self
            .sections
            .iter_mut()
            .find(|s| matches!(s, Section::Notes(_)))
        {
            body.extend(lines);
            return;
        }
        self.sections.push(Section::Notes(lines));
    }

    pub fn progress(&self) -> Progress {
        let mut progress = Progress::default();
        for task in self.tasks() {
            match task.status() {
                TaskStatus::Todo => progress.todo += 1,
                TaskStatus::Doing => progress.doing += 1,
                TaskStatus::Done => progress.done += 1,
                TaskStatus::Blocked => progress.blocked += 1,
                TaskStatus::Review => progress.review += 1,
            }
        }
        progress
    }

    /// Items of the Questions section.
    pub fn questions(&self) -> Vec<String> {
        self.sections
            .iter()
            .filter_map(|s| match s {
                Section::Questions(body) => Some(body),
                _ => None,
            })
            .flatten()
            .filter_map(|line| {
                line.strip_prefix("- ")
                    .or_else(|| line.strip_prefix("* "))
                    .map(|q| q.trim().to_string())
            })
            .collect()
    }

    pub fn analysis(&self) -> Option<String> {
        self.body_of(|s| matches!(s, Section::Analysis(_)))
    }

    pub fn notes(&self) -> Option<String> {
        self.body_of(|s| matches!(s, Section::Notes(_)))
    }

    fn body_of(&self, pick: impl Fn(&Section) -> bool) -> Option<String> {
        self.sections.iter().find(|s| pick(s)).map(|s| match s {
            Section::Analysis(body) | Section::Notes(body) | Section::Questions(body) => {
                body.join("\n")
            }
            Section::Other { body, .. } => body.join("\n"),
            Section::Phase(_) => String::new(),
        })
    }
}

fn required_text(value: &str, what: &str, suggestion: &str) -> Result<String> {
    let value = single_line(value);
    if value.is_empty() {
        return Err(Error::validation(format!("{} is empty", what), suggestion));
    }
    Ok(value)
}
