//! Markdown rendering of a snapshot.

use std::fmt::Write;

use super::PlaybookSnapshot;

/// Renders `playbook.md`: bullets grouped by section, sections in first-seen order.
pub fn render_markdown(snapshot: &PlaybookSnapshot) -> String {
    let mut out = String::from("# Playbook\n\n");

    if snapshot.bullets.is_empty() {
        out.push_str("_No bullets yet._\n");
        return out;
    }

    let _ = writeln!(out, "{} bullets\n", snapshot.bullets.len());

    let mut sections: Vec<&str> = Vec::new();
    for bullet in &snapshot.bullets {
        if !sections.contains(&bullet.section.as_str()) {
            sections.push(&bullet.section);
        }
    }

    for section in sections {
        let _ = writeln!(out, "## {}\n", section);
        for bullet in snapshot.bullets.iter().filter(|b| b.section == section) {
            let _ = writeln!(
                out,
                "- **{}** {} _(helpful {}, harmful {}, updated {})_",
                bullet.id,
                bullet.content,
                bullet.helpful_count,
                bullet.harmful_count,
                bullet.updated_at.format("%Y-%m-%d")
            );
        }
        out.push('\n');
    }

    out
}
