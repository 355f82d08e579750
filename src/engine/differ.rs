//! Plan display

use colored::{ColoredString, Colorize};
use reconcile::{Change, ChangeSummary, ResourceChange, group_by_kind};

fn symbol(change: &Change) -> ColoredString {
    let symbol = change.symbol();
    match change {
        Change::Create => symbol.green(),
        Change::Update { .. } => symbol.yellow(),
        Change::Replace { .. } => symbol.magenta(),
        Change::Delete => symbol.red(),
        Change::Forget | Change::NoOp => symbol.dimmed(),
        Change::Unknown { .. } => symbol.red().bold(),
    }
}

fn detail(change: &Change) -> String {
    match change {
        Change::Create => "(will create)".to_string(),
        Change::Update { detail, .. } => detail.clone(),
        Change::Replace { fields } => format!("{} cannot change in place", fields.join(", ")),
        Change::Delete => "(will delete)".to_string(),
        Change::Forget => "(already gone, will stop tracking)".to_string(),
        Change::NoOp => String::new(),
        Change::Unknown { error } => error.clone(),
    }
}

/// Display planned changes grouped by kind
pub fn display_changes(changes: &[ResourceChange]) {
    if changes.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Planned Changes".bold()
    );
    println!("│");

    for (kind, kind_changes) in group_by_kind(changes) {
        println!("│ {}", kind.bold());
        for change in kind_changes {
            println!(
                "│   {:<3} {:<40} {}",
                symbol(&change.change),
                change.address,
                detail(&change.change).dimmed()
            );
            if !matches!(change.change, Change::Unknown { .. }) {
                println!("│         {}", change.description.dimmed());
            }
        }
        println!("│");
    }

    let summary = ChangeSummary::from_changes(changes);
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} to add, {} to change, {} to replace, {} to remove",
        summary.additions.to_string().green(),
        summary.updates.to_string().yellow(),
        summary.replacements.to_string().magenta(),
        summary.removals.to_string().red()
    );
    if summary.errors > 0 {
        println!(
            "│          {} could not be planned",
            summary.errors.to_string().red().bold()
        );
    }
    println!("└─────────────────────────────────────────────────────┘");
}
