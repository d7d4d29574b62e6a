//! Widget face synthesis
//!
//! Turns a card snapshot into the data the host needs to draw one face of a
//! widget. Styling beyond a fill colour is left to the host.

use crate::data::{CardSnapshot, FaceState, WidgetPayload};

/// Longest detail text rendered on the back face.
pub const MAX_DETAIL_CHARS: usize = 180;

/// Most tags rendered on the back face.
pub const MAX_BACK_TAGS: usize = 4;

const BACK_FILL: &str = "#ffffff";

pub fn synthesize(card: &CardSnapshot, face: FaceState) -> WidgetPayload {
    match face {
        FaceState::Front => front(card),
        FaceState::Back => back(card),
    }
}

fn front(card: &CardSnapshot) -> WidgetPayload {
    let content = [
        card.icon.clone(),
        card.title.clone(),
        card.category.as_str().to_uppercase(),
        card.summary.clone(),
        "Double-click to see details".to_string(),
    ]
    .join("\n");

    WidgetPayload {
        face: FaceState::Front,
        title: format!("{} - Summary (Double-click to flip)", card.title),
        alt: format!("{} - {}", card.title, card.category),
        content,
        fill_color: card.category.color().to_string(),
    }
}

fn back(card: &CardSnapshot) -> WidgetPayload {
    let mut lines = vec![format!("{} {}", card.icon, card.title)];

    let details = card
        .details
        .as_deref()
        .unwrap_or("No additional details available.");
    lines.push(truncate_details(details, MAX_DETAIL_CHARS));

    if !card.tags.is_empty() {
        let tags: Vec<&str> = card.tags.iter().take(MAX_BACK_TAGS).map(String::as_str).collect();
        lines.push(format!("Tags: {}", tags.join(" • ")));
    }
    if card.reference.is_some() {
        lines.push("Reference available".to_string());
    }
    lines.push("Double-click to return".to_string());

    WidgetPayload {
        face: FaceState::Back,
        title: format!("{} - Details (Double-click to flip)", card.title),
        alt: format!("{} - {}", card.title, card.category),
        content: lines.join("\n"),
        fill_color: BACK_FILL.to_string(),
    }
}

/// Shortens `details` to at most `max_chars`, preferring whole sentences.
pub fn truncate_details(details: &str, max_chars: usize) -> String {
    if details.chars().count() <= max_chars {
        return details.to_string();
    }

    let budget = max_chars.saturating_sub(20);
    let mut result = String::new();
    for sentence in details.split_inclusive(". ") {
        if result.chars().count() + sentence.chars().count() > budget {
            break;
        }
        result.push_str(sentence);
    }

    if result.is_empty() {
        let cut: String = details.chars().take(max_chars.saturating_sub(3)).collect();
        return format!("{}...", cut);
    }
    result.trim_end().to_string()
}
