use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::error::{Result, RosterError};
use crate::models::{NewTask, Template};
use crate::roster::Roster;
use crate::schedule;
use crate::storage::Storage;

pub(crate) fn check_template(name: &str, template: &Template) -> std::result::Result<(), String> {
    if name.trim().is_empty() {
        return Err("empty template name".into());
    }
    schedule::validate_duration(&template.duration).map_err(|e| e.to_string())
}

impl<S: Storage> Roster<S> {
    /// Saved templates keyed by name.
    pub fn templates(&self) -> &BTreeMap<String, Template> {
        &self.templates
    }

    /// Looks a template up by name, ignoring surrounding whitespace.
    pub fn template(&self, name: &str) -> Option<&Template> {
        self.templates.get(name.trim())
    }

    /// Stores `template` under `name`, replacing any existing entry.
    pub fn save_template(&mut self, name: &str, template: Template) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RosterError::Validation("Please provide a template name".into()));
        }
        schedule::validate_duration(&template.duration)?;
        let mut templates = self.templates.clone();
        let replaced = templates.insert(name.to_string(), template).is_some();
        self.commit_templates(templates)?;
        tracing::info!(template = name, replaced, "template saved");
        Ok(())
    }

    /// Removes the template; returns whether one existed.
    pub fn delete_template(&mut self, name: &str) -> Result<bool> {
        let name = name.trim();
        if !self.templates.contains_key(name) {
            return Ok(false);
        }
        let mut templates = self.templates.clone();
        templates.remove(name);
        self.commit_templates(templates)?;
        tracing::info!(template = name, "template deleted");
        Ok(true)
    }

    /// Task input pre-filled from a template, starting at `start`.
    pub fn task_from_template(&self, name: &str, start: DateTime<Utc>) -> Result<NewTask> {
        let template = self
            .template(name)
            .ok_or_else(|| RosterError::Validation(format!("Template '{}' not found", name)))?;
        Ok(NewTask {
            title: template.title.clone(),
            description: template.description.clone().unwrap_or_default(),
            start_date: start,
            end_date: None,
            duration: Some(template.duration),
            registration_deadline: None,
        })
    }
}
