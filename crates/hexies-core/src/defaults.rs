//! Built-in catalog served when neither the backend nor a fresh cache is available

use chrono::{DateTime, TimeZone, Utc};

use crate::data::{CatalogItem, Category, ItemId};

struct Seed {
    id: &'static str,
    title: &'static str,
    category: Category,
    icon: &'static str,
    summary: &'static str,
    details: &'static str,
    free: bool,
    tags: &'static [&'static str],
}

const SEEDS: &[Seed] = &[
    Seed {
        id: "methods-1",
        title: "Retrospective",
        category: Category::Methods,
        icon: "🔍",
        summary: "Reflect and improve team processes",
        details: "A collaborative session to discuss what went well, what didn't, and how to improve in the next iteration.",
        free: true,
        tags: &["agile", "continuous-improvement", "team-building"],
    },
    Seed {
        id: "methods-2",
        title: "Design Thinking",
        category: Category::Methods,
        icon: "💡",
        summary: "Human-centered problem solving",
        details: "Empathize, define, ideate, prototype and test: creative problem solving grounded in understanding users.",
        free: false,
        tags: &["innovation", "user-centered", "creativity"],
    },
    Seed {
        id: "methods-4",
        title: "SWOT Analysis",
        category: Category::Methods,
        icon: "⚖️",
        summary: "Analyze strengths, weaknesses, opportunities, threats",
        details: "Strategic planning tool to evaluate internal and external factors affecting an organization or project.",
        free: true,
        tags: &["strategy", "analysis", "planning"],
    },
    Seed {
        id: "teams-2",
        title: "Tuckman Stages",
        category: Category::Teams,
        icon: "📈",
        summary: "Team development lifecycle",
        details: "Forming, storming, norming, performing: the stages most teams pass through as they mature.",
        free: true,
        tags: &["team-development", "dynamics"],
    },
    Seed {
        id: "teams-3",
        title: "RACI Matrix",
        category: Category::Teams,
        icon: "📊",
        summary: "Clarify roles and responsibilities",
        details: "Responsible, accountable, consulted, informed: a grid that makes ownership explicit for every task.",
        free: false,
        tags: &["roles", "responsibility", "clarity"],
    },
    Seed {
        id: "product-1",
        title: "User Story Mapping",
        category: Category::Product,
        icon: "🗺️",
        summary: "Visualize user journey and features",
        details: "Arrange user stories along the user journey to find the smallest release that delivers value.",
        free: true,
        tags: &["user-stories", "planning", "mvp"],
    },
    Seed {
        id: "product-2",
        title: "Product Roadmap",
        category: Category::Product,
        icon: "🛣️",
        summary: "Strategic product development timeline",
        details: "A shared view of where the product is going and why, organised by themes and outcomes.",
        free: false,
        tags: &["strategy", "planning"],
    },
    Seed {
        id: "leadership-3",
        title: "Delegation Matrix",
        category: Category::Leadership,
        icon: "🤝",
        summary: "Effective task delegation framework",
        details: "Decide what to do, delegate, schedule or drop based on urgency and importance.",
        free: true,
        tags: &["delegation", "prioritization"],
    },
    Seed {
        id: "leadership-2",
        title: "Situational Leadership",
        category: Category::Leadership,
        icon: "🧭",
        summary: "Adapt leadership style to situation",
        details: "Match directing, coaching, supporting or delegating to the competence and commitment of the person.",
        free: false,
        tags: &["leadership-style", "coaching"],
    },
    Seed {
        id: "anti-1",
        title: "Confirmation Bias",
        category: Category::AntiPatterns,
        icon: "🙈",
        summary: "Seeking only confirming information",
        details: "Favouring information that confirms existing beliefs while dismissing evidence against them.",
        free: true,
        tags: &["bias", "decision-making"],
    },
    Seed {
        id: "anti-2",
        title: "Analysis Paralysis",
        category: Category::AntiPatterns,
        icon: "🌀",
        summary: "Over-analyzing instead of acting",
        details: "Endless analysis delays decisions until the opportunity has passed.",
        free: true,
        tags: &["decision-making", "delivery"],
    },
    Seed {
        id: "anti-4",
        title: "Groupthink",
        category: Category::AntiPatterns,
        icon: "🐑",
        summary: "Conformity over critical thinking",
        details: "The desire for harmony suppresses dissent and leads to poor decisions.",
        free: false,
        tags: &["team-dynamics", "bias"],
    },
];

fn seeded_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// The built-in system catalog.
pub fn default_catalog() -> Vec<CatalogItem> {
    let created_at = seeded_at();
    SEEDS
        .iter()
        .map(|seed| CatalogItem {
            id: ItemId::new(seed.id),
            title: seed.title.to_string(),
            category: seed.category,
            icon: seed.icon.to_string(),
            summary: seed.summary.to_string(),
            details: Some(seed.details.to_string()),
            reference: None,
            tags: seed.tags.iter().map(|t| t.to_string()).collect(),
            is_free: seed.free,
            is_user_created: false,
            owner_id: None,
            created_at,
        })
        .collect()
}
