use anyhow::{Context, Result};
use practizio_core::{NewPractice, PracticeId};
use practizio_storage::PracticeStore;
use serde::Serialize;

struct SeedPractice {
    title: &'static str,
    description: &'static str,
    tags: &'static [&'static str],
    category: &'static str,
    prompt: &'static str,
}

const CONVERSATION_BASICS_PROMPT: &str = "You coach people on asking better questions in conversation.

Students bring closed questions (ones that can be answered with yes, no or a single fact) and rewrite them as open invitations that start with \"Tell me about...\".

When asked to generate, offer one everyday closed question for the student to rework.

When asked to review, return the student's statement with light corrections, two or three stronger alternatives, and a short note on what made the rewrite inviting or where it still closes the conversation down.

Keep feedback warm and specific. Point at words, not at the person.";

const EXPERIENCE_MAPPING_PROMPT: &str = "You coach people on Experience Mapping: exploring someone's experience one phase at a time through \"Tell me about...\" prompts.

Help the student break an experience into its sequence of moments, then write a prompt for each that asks about concrete detail rather than opinion.

When asked to generate, offer one closed question about an experience plus a hint that maps it as six imperative verbs, for example \"plan -> pack -> travel -> arrive -> explore -> return\".

When asked to review, check that the student's prompts cover different phases of the map, correct their wording where needed, add three prompts that go deeper into the map, and explain briefly what the set still misses.

The goal is the whole journey, not just where it ended.";

const SEED_PRACTICES: &[SeedPractice] = &[
    SeedPractice {
        title: "Conversation Basics",
        description: "Turn closed yes/no questions into open \"Tell me about...\" statements that invite the other person to keep talking.",
        tags: &["beginner", "conversation", "open-ended questions"],
        category: "Communication Skills",
        prompt: CONVERSATION_BASICS_PROMPT,
    },
    SeedPractice {
        title: "Experience Mapping",
        description: "Break an experience into its moments and write questions that walk someone through each step of their story.",
        tags: &["intermediate", "storytelling", "experience design"],
        category: "Advanced Techniques",
        prompt: EXPERIENCE_MAPPING_PROMPT,
    },
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedReport {
    pub skipped: bool,
    pub inserted: Vec<PracticeId>,
}

/// Inserts the built-in practices with their prompts. A store that already
/// holds practices is left alone unless `force` is set.
pub fn seed(store: &PracticeStore, force: bool) -> Result<SeedReport> {
    let existing = store.list_practices().context("Failed to read practices")?;
    if !existing.is_empty() && !force {
        return Ok(SeedReport {
            skipped: true,
            inserted: Vec::new(),
        });
    }

    let mut inserted = Vec::with_capacity(SEED_PRACTICES.len());
    for seed in SEED_PRACTICES {
        let practice = store
            .create_practice(
                NewPractice::new(seed.title, seed.description, seed.category)
                    .with_tags(seed.tags.iter().copied()),
            )
            .with_context(|| format!("Failed to seed practice '{}'", seed.title))?;
        store
            .create_system_prompt(practice.id, seed.prompt)
            .with_context(|| format!("Failed to seed system prompt for '{}'", seed.title))?;
        inserted.push(practice.id);
    }
    Ok(SeedReport {
        skipped: false,
        inserted,
    })
}
