//! Pending change display

use colored::Colorize;
use declarative::{DiffSummary, FailurePolicy, PendingChange, ResourceState};
use std::collections::BTreeMap;

fn type_heading(resource_type: &str) -> &str {
    match resource_type {
        "apt_package" => "Packages",
        "apt_repository" | "apt_source" => "Package sources",
        "file_line" | "sshd_effective" => "Config files",
        "user" | "authorized_keys" => "Users",
        "service" | "service_restart" => "Services",
        "ufw_rule" | "ufw" => "Firewall",
        "remote_script" => "Installers",
        "postgres_role" | "postgres_database" | "mysql_user" => "Databases",
        "certificate" => "Certificates",
        "public_ip" => "Discovery",
        other => other,
    }
}

fn state_desc(change: &PendingChange) -> String {
    if let Some(err) = &change.probe_error {
        return format!("(state unknown: {err})");
    }
    match (&change.current, &change.desired) {
        (ResourceState::Absent, ResourceState::Present { value: Some(to) }) => {
            format!("(absent) → {to}")
        }
        (ResourceState::Absent, _) => "(absent)".to_string(),
        (ResourceState::Present { value: from }, ResourceState::Present { value: to }) => format!(
            "{} → {}",
            from.as_deref().unwrap_or("current"),
            to.as_deref().unwrap_or("desired")
        ),
        _ => String::new(),
    }
}

/// Print the changes a run would make, grouped by resource type
pub fn display_changes(changes: &[PendingChange]) {
    if changes.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    let mut by_type: BTreeMap<&str, Vec<&PendingChange>> = BTreeMap::new();
    for change in changes {
        by_type
            .entry(type_heading(&change.resource_type))
            .or_default()
            .push(change);
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Pending Changes".bold()
    );
    println!("│");

    for (heading, group) in &by_type {
        println!("│ {}", heading.bold());

        for change in group {
            let symbol = if change.probe_error.is_some() {
                "?".dimmed()
            } else if change.is_addition() {
                "+".green()
            } else {
                "~".yellow()
            };
            let soft = if change.policy == FailurePolicy::Soft {
                " [optional]".dimmed().to_string()
            } else {
                String::new()
            };

            println!(
                "│   {} {:<22} {}{}",
                symbol,
                change.action,
                state_desc(change).dimmed(),
                soft
            );

            if let Some(preview) = &change.preview {
                for line in preview.lines() {
                    let line = if line.starts_with('+') && !line.starts_with("+++") {
                        line.green()
                    } else if line.starts_with('-') && !line.starts_with("---") {
                        line.red()
                    } else {
                        line.dimmed()
                    };
                    println!("│       {line}");
                }
            }
        }
        println!("│");
    }

    let summary = DiffSummary::from_changes(changes);
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} changes ({} new, {} modified, {} unknown)",
        summary.total().to_string().bold(),
        summary.additions.to_string().green(),
        summary.modifications.to_string().yellow(),
        summary.unknown.to_string().dimmed()
    );
    println!("└─────────────────────────────────────────────────────┘");
}
