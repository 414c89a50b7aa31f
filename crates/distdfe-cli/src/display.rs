//! Terminal rendering of poll outcomes, and XML export.

use std::path::Path;

use anyhow::Context;
use distdfe_core::{NormalizedDocument, PollOutcome};
use rust_decimal::Decimal;
use tracing::info;

/// Print one line per document followed by a cursor summary.
pub fn print_outcome(outcome: &PollOutcome) {
    for doc in &outcome.documents {
        println!("{}", document_line(doc));
    }
    if !outcome.documents.is_empty() {
        println!();
    }
    println!("{}", summary_line(outcome));
}

pub fn document_line(doc: &NormalizedDocument) -> String {
    format!(
        "{:<7}  {}  {}  {:>16}  {} ({})",
        doc.kind.as_str(),
        doc.access_key,
        doc.issued_at.format("%d/%m/%Y"),
        format_brl(doc.total_value),
        doc.counterparty_name,
        doc.counterparty_tax_id,
    )
}

pub fn summary_line(outcome: &PollOutcome) -> String {
    let mut line = format!("{} document(s)", outcome.documents.len());
    if outcome.dropped > 0 {
        line.push_str(&format!(", {} undecodable", outcome.dropped));
    }
    line.push_str(&format!(
        "; cursor {} of {} ({})",
        outcome.new_cursor, outcome.max_cursor, outcome.message
    ));
    if outcome.has_more() {
        line.push_str("; more documents available");
    }
    line
}

/// Brazilian currency formatting: `R$ 1.234,56`.
pub fn format_brl(value: Decimal) -> String {
    let fixed = format!("{:.2}", value.abs().round_dp(2));
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    let sign = if value.is_sign_negative() && !value.is_zero() { "-" } else { "" };
    format!("{sign}R$ {grouped},{frac_part}")
}

/// Write each document's original XML to `<access key>.xml` under `dir`.
pub fn export_xml(documents: &[NormalizedDocument], dir: &Path) -> anyhow::Result<usize> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    for doc in documents {
        let path = dir.join(format!("{}.xml", doc.access_key));
        std::fs::write(&path, &doc.raw_xml)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    info!(count = documents.len(), dir = %dir.display(), "exported XML");
    Ok(documents.len())
}
