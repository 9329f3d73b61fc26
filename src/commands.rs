use std::io::{self, Read, Write};

use chrono::{DateTime, Local, Utc};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};

use crate::error::{Result, RosterError};
use crate::models::{NewTask, NewUser, Role, Task, TaskDuration, TaskPatch, TaskStatus, Template};
use crate::roster::Roster;
use crate::schedule::{parse_datetime, parse_day};
use crate::storage::{JsonFileStorage, Storage};
use crate::tasks::BatchDefaults;

fn local(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn bold(s: &str) -> Cell {
    Cell::new(s).add_attribute(Attribute::Bold)
}

fn status_color(status: TaskStatus) -> Color {
    match status {
        TaskStatus::Pending => Color::Yellow,
        TaskStatus::Assigned => Color::Cyan,
        TaskStatus::Completed => Color::Green,
    }
}

fn user_name<S: Storage>(roster: &Roster<S>, id: u64) -> String {
    roster.user(id).map(|u| u.name.clone()).unwrap_or_else(|| format!("#{}", id))
}

/// Builds a duration from CLI flags, filling an absent part from `base`.
fn duration_from(hours: Option<u32>, minutes: Option<u32>, base: TaskDuration) -> Option<TaskDuration> {
    if hours.is_none() && minutes.is_none() {
        return None;
    }
    Some(TaskDuration {
        hours: hours.unwrap_or(base.hours),
        minutes: minutes.unwrap_or(base.minutes),
    })
}

/// Logs in by email.
pub fn cmd_login<S: Storage>(roster: &mut Roster<S>, email: String, password: String) -> Result<()> {
    let user = roster.login(&email, &password)?;
    println!("Logged in as {} ({})", user.name, user.role);
    Ok(())
}

pub fn cmd_logout<S: Storage>(roster: &mut Roster<S>) -> Result<()> {
    roster.logout()?;
    println!("Logged out.");
    Ok(())
}

pub fn cmd_whoami<S: Storage>(roster: &Roster<S>) -> Result<()> {
    match roster.current_user() {
        Some(u) => println!("{} <{}> ({}, id = {})", u.name, u.email, u.role, u.id),
        None => println!("Not logged in."),
    }
    Ok(())
}

/// Registers a new employee account and logs it in.
pub fn cmd_signup<S: Storage>(
    roster: &mut Roster<S>,
    name: String,
    email: String,
    facility: Option<String>,
    password: String,
) -> Result<()> {
    let user = roster.sign_up(&name, &email, facility, &password)?;
    println!("Account created (id = {}). Logged in as {}.", user.id, user.name);
    Ok(())
}

/// Creates a task, optionally starting from a saved template.
///
/// Flags given on the command line override the template's values.
#[allow(clippy::too_many_arguments)]
pub fn cmd_task_add<S: Storage>(
    roster: &mut Roster<S>,
    title: Option<String>,
    description: Option<String>,
    start: String,
    hours: Option<u32>,
    minutes: Option<u32>,
    end: Option<String>,
    deadline: Option<String>,
    template: Option<String>,
) -> Result<()> {
    let start_date = parse_datetime(&start)?;
    let mut input = match &template {
        Some(name) => roster.task_from_template(name, start_date)?,
        None => NewTask {
            title: String::new(),
            description: String::new(),
            start_date,
            end_date: None,
            duration: None,
            registration_deadline: None,
        },
    };
    if let Some(t) = title {
        input.title = t;
    }
    if let Some(d) = description {
        input.description = d;
    }
    if let Some(d) = duration_from(hours, minutes, input.duration.unwrap_or(TaskDuration::new(0, 0))) {
        input.duration = Some(d);
    }
    if let Some(e) = end {
        input.end_date = Some(parse_datetime(&e)?);
        if hours.is_none() && minutes.is_none() {
            input.duration = None;
        }
    }
    if let Some(d) = deadline {
        input.registration_deadline = Some(parse_datetime(&d)?);
    }
    let task = roster.add_task(input)?;
    println!("Task added (id = {})", task.id);
    Ok(())
}

/// Creates one task per `title|description` line read from stdin.
pub fn cmd_task_batch<S: Storage>(
    roster: &mut Roster<S>,
    start: String,
    deadline: Option<String>,
    hours: u32,
    minutes: u32,
) -> Result<()> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .map_err(|e| RosterError::Validation(format!("Could not read stdin: {}", e)))?;
    let defaults = BatchDefaults {
        start_date: parse_datetime(&start)?,
        registration_deadline: deadline.as_deref().map(parse_datetime).transpose()?,
        duration: TaskDuration::new(hours, minutes),
    };
    let created = roster.add_tasks_batch(&input, &defaults)?;
    println!("Created {} tasks.", created.len());
    Ok(())
}

/// Lists tasks in a table, ordered by start.
pub fn cmd_task_list<S: Storage>(
    roster: &Roster<S>,
    status: Option<TaskStatus>,
    mine: bool,
    on: Option<String>,
) -> Result<()> {
    let mut tasks: Vec<Task> = if mine {
        roster.user_tasks()?.into_iter().cloned().collect()
    } else {
        roster.tasks().to_vec()
    };
    if let Some(s) = status {
        tasks.retain(|t| t.status == s);
    }
    if let Some(day) = on {
        let day = parse_day(&day)?;
        let ids: Vec<u64> = roster.tasks_on(day).iter().map(|t| t.id).collect();
        tasks.retain(|t| ids.contains(&t.id));
    }
    if tasks.is_empty() {
        println!("No tasks found.");
        return Ok(());
    }
    tasks.sort_by_key(|t| t.start_date);

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            bold("ID"),
            bold("Title"),
            bold("Start"),
            bold("End"),
            bold("Duration"),
            bold("Deadline"),
            bold("Registered"),
            bold("Assignee"),
            bold("Status"),
        ]);

    let now = Utc::now();
    for t in tasks {
        let deadline_color = if t.status == TaskStatus::Pending && t.registration_deadline < now {
            Color::Red
        } else {
            Color::Reset
        };
        table.add_row(vec![
            Cell::new(t.id),
            Cell::new(&t.title),
            Cell::new(local(t.start_date)),
            Cell::new(local(t.end_date)),
            Cell::new(t.duration),
            Cell::new(local(t.registration_deadline)).fg(deadline_color),
            Cell::new(t.registered_employees.len()),
            Cell::new(t.assigned_to.map(|id| user_name(roster, id)).unwrap_or_default()),
            Cell::new(t.status).fg(status_color(t.status)),
        ]);
    }

    println!("{table}");
    Ok(())
}

/// Prints one task with its registrants.
pub fn cmd_task_show<S: Storage>(roster: &Roster<S>, id: u64) -> Result<()> {
    let t = roster.task(id).ok_or(RosterError::TaskNotFound(id))?;
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.add_row(vec![bold("Title"), Cell::new(&t.title)]);
    table.add_row(vec![bold("Description"), Cell::new(&t.description)]);
    table.add_row(vec![bold("Start"), Cell::new(local(t.start_date))]);
    table.add_row(vec![bold("End"), Cell::new(local(t.end_date))]);
    table.add_row(vec![bold("Duration"), Cell::new(t.duration)]);
    table.add_row(vec![bold("Deadline"), Cell::new(local(t.registration_deadline))]);
    table.add_row(vec![bold("Created by"), Cell::new(user_name(roster, t.created_by))]);
    table.add_row(vec![bold("Status"), Cell::new(t.status).fg(status_color(t.status))]);
    table.add_row(vec![
        bold("Assignee"),
        Cell::new(t.assigned_to.map(|u| user_name(roster, u)).unwrap_or_else(|| "-".into())),
    ]);
    let registrants: Vec<String> = roster
        .registrants(id)?
        .iter()
        .map(|u| format!("{} (id {})", u.name, u.id))
        .collect();
    table.add_row(vec![bold("Registered"), Cell::new(registrants.join("\n"))]);
    println!("{table}");
    Ok(())
}

/// Edits a task's fields. A lone `--hours` or `--minutes` keeps the other
/// part of the current duration.
#[allow(clippy::too_many_arguments)]
pub fn cmd_task_edit<S: Storage>(
    roster: &mut Roster<S>,
    id: u64,
    title: Option<String>,
    description: Option<String>,
    start: Option<String>,
    hours: Option<u32>,
    minutes: Option<u32>,
    deadline: Option<String>,
) -> Result<()> {
    let current = roster.task(id).ok_or(RosterError::TaskNotFound(id))?.duration;
    let patch = TaskPatch {
        title,
        description,
        start_date: start.as_deref().map(parse_datetime).transpose()?,
        duration: duration_from(hours, minutes, current),
        registration_deadline: deadline.as_deref().map(parse_datetime).transpose()?,
        ..TaskPatch::default()
    };
    if patch.is_empty() {
        println!("Nothing to change.");
        return Ok(());
    }
    let task = roster.update_task(id, patch)?;
    println!("Task {} updated.", id);
    if task.status == TaskStatus::Assigned {
        if let Some(u) = task.assigned_to {
            println!("Task {} is assigned to {}.", id, user_name(roster, u));
        }
    }
    Ok(())
}

pub fn cmd_task_remove<S: Storage>(roster: &mut Roster<S>, id: u64) -> Result<()> {
    roster.delete_task(id)?;
    println!("Task {} removed.", id);
    Ok(())
}

pub fn cmd_task_register<S: Storage>(roster: &mut Roster<S>, id: u64) -> Result<()> {
    roster.register_for_task(id)?;
    println!("Registered for task {}.", id);
    Ok(())
}

pub fn cmd_task_unregister<S: Storage>(roster: &mut Roster<S>, id: u64) -> Result<()> {
    roster.unregister_from_task(id)?;
    println!("Unregistered from task {}.", id);
    Ok(())
}

pub fn cmd_task_assign<S: Storage>(roster: &mut Roster<S>, id: u64, user: u64) -> Result<()> {
    roster.assign_task(id, user)?;
    println!("Task {} assigned to {}.", id, user_name(roster, user));
    Ok(())
}

pub fn cmd_task_complete<S: Storage>(roster: &mut Roster<S>, id: u64) -> Result<()> {
    roster.complete_task(id)?;
    println!("Task {} marked as completed.", id);
    Ok(())
}

/// Runs the deadline sweep and reports what it assigned.
pub fn cmd_sweep<S: Storage>(roster: &mut Roster<S>) -> Result<()> {
    let made = roster.refresh()?;
    if made.is_empty() {
        println!("No tasks to assign.");
    }
    for a in made {
        println!("Task {} assigned to {}.", a.task_id, user_name(roster, a.user_id));
    }
    Ok(())
}

/// Saves a template, replacing one with the same name.
pub fn cmd_template_add<S: Storage>(
    roster: &mut Roster<S>,
    name: String,
    title: String,
    description: Option<String>,
    hours: u32,
    minutes: u32,
) -> Result<()> {
    let replaced = roster.template(name.trim()).is_some();
    roster.save_template(
        &name,
        Template {
            title,
            description,
            duration: TaskDuration::new(hours, minutes),
        },
    )?;
    if replaced {
        println!("Template '{}' replaced.", name.trim());
    } else {
        println!("Template '{}' saved.", name.trim());
    }
    Ok(())
}

pub fn cmd_template_list<S: Storage>(roster: &Roster<S>) -> Result<()> {
    if roster.templates().is_empty() {
        println!("No templates found.");
        return Ok(());
    }
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Name", "Title", "Description", "Duration"]);
    for (name, t) in roster.templates() {
        table.add_row(vec![
            name.clone(),
            t.title.clone(),
            t.description.clone().unwrap_or_else(|| "-".into()),
            t.duration.to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub fn cmd_template_remove<S: Storage>(roster: &mut Roster<S>, name: String) -> Result<()> {
    if roster.delete_template(&name)? {
        println!("Template '{}' removed.", name);
    } else {
        println!("Template '{}' not found.", name);
    }
    Ok(())
}

pub fn cmd_user_add<S: Storage>(
    roster: &mut Roster<S>,
    name: String,
    email: String,
    role: Role,
    facility: Option<String>,
) -> Result<()> {
    let user = roster.create_user(NewUser { name, email, role, facility })?;
    println!("User added (id = {})", user.id);
    Ok(())
}

pub fn cmd_user_list<S: Storage>(roster: &Roster<S>, search: Option<String>) -> Result<()> {
    let users = roster.search_users(search.as_deref().unwrap_or(""));
    if users.is_empty() {
        println!("No users found.");
        return Ok(());
    }
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec![bold("ID"), bold("Name"), bold("Email"), bold("Facility"), bold("Role"), bold("Status")]);
    for u in users {
        let (status, color) = if u.is_active {
            ("active", Color::Green)
        } else {
            ("inactive", Color::Red)
        };
        table.add_row(vec![
            Cell::new(u.id),
            Cell::new(&u.name),
            Cell::new(&u.email),
            Cell::new(u.facility.as_deref().unwrap_or("-")),
            Cell::new(u.role),
            Cell::new(status).fg(color),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub fn cmd_user_role<S: Storage>(roster: &mut Roster<S>, id: u64, role: Role) -> Result<()> {
    let user = roster.update_user_role(id, role)?;
    println!("{} is now a {}.", user.name, user.role);
    Ok(())
}

pub fn cmd_user_status<S: Storage>(roster: &mut Roster<S>, id: u64, status: String) -> Result<()> {
    let active = match status.trim().to_lowercase().as_str() {
        "active" => true,
        "inactive" => false,
        other => {
            return Err(RosterError::Validation(format!(
                "Unknown status '{}'. Use active or inactive.",
                other
            )))
        }
    };
    let user = roster.update_user_status(id, active)?;
    println!("{} is now {}.", user.name, if user.is_active { "active" } else { "inactive" });
    Ok(())
}

pub fn cmd_user_remove<S: Storage>(roster: &mut Roster<S>, id: u64) -> Result<()> {
    let user = roster.delete_user(id)?;
    println!("User {} removed.", user.name);
    Ok(())
}

/// Deletes all stored users, tasks, templates and the session.
pub fn cmd_reset(storage: &mut JsonFileStorage, force: bool) -> Result<()> {
    if !force {
        print!("Are you sure you want to delete all users, tasks and templates? This cannot be undone. [y/N] ");
        let mut input = String::new();
        let answered = io::stdout().flush().and_then(|_| io::stdin().read_line(&mut input));
        if answered.is_err() || input.trim().to_lowercase() != "y" {
            println!("Aborted.");
            return Ok(());
        }
    }
    storage.wipe()?;
    println!("Data in {} reset successfully.", storage.dir().display());
    Ok(())
}
