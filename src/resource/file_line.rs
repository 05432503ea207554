//! Anchored single-line edits to existing config files
//!
//! The anchor finds the line that controls a setting. An uncommented match
//! wins over a commented one, so `#Port 22` is only replaced when no live
//! `Port` line exists. Unrelated content is never touched.

use declarative::{ApplyContext, Error, Resource, ResourceState, Result};
use regex::Regex;
use similar::TextDiff;
use std::path::{Path, PathBuf};

use super::{path_arg, read_file, write_file};

/// One line in a file, located by an anchored pattern
#[derive(Debug, Clone)]
pub struct FileLine {
    path: PathBuf,
    anchor: Regex,
    line: String,
    create: bool,
    as_user: Option<String>,
}

impl FileLine {
    /// `anchor` must match the setting's line whether or not it is commented
    pub fn new(path: impl AsRef<Path>, anchor: Regex, line: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            anchor,
            line: line.into(),
            create: false,
            as_user: None,
        }
    }

    /// Create the file when it does not exist instead of failing
    pub fn create_if_missing(mut self) -> Self {
        self.create = true;
        self
    }

    /// Read and write the file as this user
    pub fn owned_by(mut self, user: impl Into<String>) -> Self {
        self.as_user = Some(user.into());
        self
    }

    fn current(&self, ctx: &ApplyContext) -> Result<Option<String>> {
        let content = read_file(ctx, &self.path, self.as_user.as_deref())?;
        if content.is_none() && !self.create {
            return Err(Error::conflict(
                path_arg(&self.path),
                "file does not exist; expected an existing config file to edit",
            ));
        }
        Ok(content)
    }
}

/// Index of the line that controls the setting
fn locate(lines: &[&str], anchor: &Regex) -> Option<usize> {
    let matches: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| anchor.is_match(l))
        .map(|(i, _)| i)
        .collect();

    matches
        .iter()
        .copied()
        .find(|&i| !lines[i].trim_start().starts_with('#'))
        .or_else(|| matches.first().copied())
}

/// Content with the anchored line replaced, or `line` appended
pub fn edit_content(content: &str, anchor: &Regex, line: &str) -> String {
    let mut lines: Vec<&str> = content.lines().collect();

    match locate(&lines, anchor) {
        Some(index) => lines[index] = line,
        None => lines.push(line),
    }

    let mut edited = lines.join("\n");
    edited.push('\n');
    edited
}

impl Resource for FileLine {
    fn id(&self) -> String {
        format!("{}:{}", self.path.display(), self.line)
    }

    fn description(&self) -> String {
        format!("Set '{}' in {}", self.line, self.path.display())
    }

    fn resource_type(&self) -> &'static str {
        "file_line"
    }

    fn probe(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        let Some(content) = self.current(ctx)? else {
            return Ok(ResourceState::Absent);
        };
        let lines: Vec<&str> = content.lines().collect();

        Ok(match locate(&lines, &self.anchor) {
            Some(index) => ResourceState::present_with(lines[index].trim_end()),
            None => ResourceState::Absent,
        })
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::present_with(self.line.clone())
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<()> {
        let content = self.current(ctx)?.unwrap_or_default();
        let edited = edit_content(&content, &self.anchor, &self.line);
        write_file(ctx, &self.path, &edited, self.as_user.as_deref())
    }

    fn preview(&self, ctx: &ApplyContext) -> Result<Option<String>> {
        let content = self.current(ctx)?.unwrap_or_default();
        let edited = edit_content(&content, &self.anchor, &self.line);
        let path = path_arg(&self.path);

        let diff = TextDiff::from_lines(&content, &edited)
            .unified_diff()
            .context_radius(1)
            .header(&path, &path)
            .to_string();
        Ok(Some(diff))
    }
}
