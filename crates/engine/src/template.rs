// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt template resolution.
//!
//! Placeholders are replaced literally: user content flows through
//! verbatim, so dollar signs, braces, or backslashes in a task
//! description can never be re-interpreted as substitution patterns.

use crew_core::{SubtaskStatus, Task, TaskContextEntry};

/// Replace each `{placeholder}` with its value, literally.
pub fn substitute(template: &str, vars: &[(&str, String)]) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        let needle = format!("{{{name}}}");
        if out.contains(&needle) {
            out = out.replace(&needle, value);
        }
    }
    out
}

fn default_template(mode: &str) -> &'static str {
    if mode.starts_with("plan") {
        "You are planning the task {taskId}: {taskTitle}\n\n\
         {taskDescription}\n{relatedTaskSection}{planCommentsSection}\n\
         Produce an implementation plan with concrete subtasks. For large \
         tasks, split the work into independent phases.\n"
    } else if mode.starts_with("investigate") {
        "Investigate the task {taskId}: {taskTitle}\n\n{taskDescription}\n\
         {relatedTaskSection}\nReport findings; do not change code.\n"
    } else if mode.starts_with("technical_design") {
        "Write a technical design for {taskId}: {taskTitle}\n\n\
         {taskDescription}\n{planSection}{priorReviewSection}\n"
    } else if mode.contains("review") {
        "Review the changes for {taskId}: {taskTitle}\n\n{taskDescription}\n\
         {planSection}{subtasksSection}{priorReviewSection}\n"
    } else {
        "Implement the task {taskId}: {taskTitle}\n\n{taskDescription}\n\
         {planSection}{subtasksSection}{planCommentsSection}{relatedTaskSection}\n"
    }
}

fn subtasks_section(task: &Task) -> String {
    let subtasks = task.effective_subtasks();
    if subtasks.is_empty() {
        return String::new();
    }
    let mut section = String::from("\n## Subtasks\n");
    for subtask in subtasks {
        let mark = match subtask.status {
            SubtaskStatus::Done => "x",
            _ => " ",
        };
        section.push_str(&format!("- [{mark}] {}\n", subtask.name));
    }
    section
}

fn plan_section(task: &Task) -> String {
    match &task.plan {
        Some(plan) => format!("\n## Plan\n{plan}\n"),
        None => String::new(),
    }
}

fn context_section(entries: &[TaskContextEntry], kind: &str, heading: &str) -> String {
    let matching: Vec<&TaskContextEntry> = entries.iter().filter(|e| e.kind == kind).collect();
    if matching.is_empty() {
        return String::new();
    }
    let mut section = format!("\n## {heading}\n");
    for entry in matching {
        section.push_str(&entry.content);
        section.push('\n');
    }
    section
}

fn related_task_section(task: &Task) -> String {
    match &task.parent_task_id {
        Some(parent) => format!("\nParent task: {parent}\n"),
        None => String::new(),
    }
}

/// Resolve the full prompt for a run.
pub fn build_prompt(
    task: &Task,
    mode: &str,
    context_entries: &[TaskContextEntry],
    queued_messages: &[String],
    validation_errors: Option<&str>,
) -> String {
    let vars: Vec<(&str, String)> = vec![
        ("taskTitle", task.title.clone()),
        ("taskDescription", task.description.clone()),
        ("taskId", task.id.clone()),
        ("subtasksSection", subtasks_section(task)),
        ("planSection", plan_section(task)),
        (
            "planCommentsSection",
            context_section(context_entries, "plan_comment", "Plan comments"),
        ),
        (
            "priorReviewSection",
            context_section(context_entries, "review", "Prior review"),
        ),
        ("relatedTaskSection", related_task_section(task)),
    ];

    let mut prompt = substitute(default_template(mode), &vars);

    for message in queued_messages {
        prompt.push_str("\n## Additional instructions\n");
        prompt.push_str(message);
        prompt.push('\n');
    }

    prompt.push_str(
        "\nWhen you are done, finish with a \"## Summary\" section describing what you did.\n",
    );

    if let Some(errors) = validation_errors {
        prompt.push_str("\n## Fix these errors\nValidation failed; fix the following and try again:\n");
        prompt.push_str(errors);
        prompt.push('\n');
    }

    prompt
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
