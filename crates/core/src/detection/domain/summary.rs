use std::collections::HashMap;

use crate::detection::domain::finding::Finding;

/// Builds the human-readable summary for object findings, e.g.
/// `"Found 3 objects: 2 persons, 1 car"`.
///
/// Labels are ordered by count descending, then alphabetically.
pub fn object_summary(findings: &[Finding]) -> String {
    if findings.is_empty() {
        return "No objects detected".to_string();
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for finding in findings {
        *counts.entry(finding.label()).or_default() += 1;
    }
    let mut counts: Vec<(&str, usize)> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let parts: Vec<String> = counts
        .iter()
        .map(|(label, count)| {
            let plural = if *count > 1 { "s" } else { "" };
            format!("{count} {label}{plural}")
        })
        .collect();

    format!("Found {} objects: {}", findings.len(), parts.join(", "))
}

pub fn classification_summary(label: &str, confidence: f32) -> String {
    format!("Classified as {label} with {confidence:.2} confidence")
}

pub fn error_summary(error: &dyn std::fmt::Display) -> String {
    format!("Error processing image: {error}")
}
