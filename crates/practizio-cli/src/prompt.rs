use crate::practice::require_id;
use crate::CliContext;
use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use practizio_core::{PracticeId, SystemPrompt};
use practizio_storage::PracticeStore;
use std::fs;
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
pub enum PromptCommand {
    Show(PromptTargetArgs),
    Set(PromptSetArgs),
    #[command(alias = "rm")]
    Remove(PromptTargetArgs),
}

#[derive(Args, Debug)]
pub struct PromptTargetArgs {
    pub practice_id: String,
}

#[derive(Args, Debug)]
pub struct PromptSetArgs {
    pub practice_id: String,
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub content: Option<String>,
    #[arg(long)]
    pub file: Option<PathBuf>,
}

pub fn handle(ctx: &CliContext, command: PromptCommand) -> Result<()> {
    match command {
        PromptCommand::Show(args) => show_prompt(ctx, &args),
        PromptCommand::Set(args) => set_prompt(ctx, &args),
        PromptCommand::Remove(args) => remove_prompt(ctx, &args),
    }
}

/// An unknown practice is an error here, not an absent prompt.
fn practice_prompt(store: &PracticeStore, practice_id: PracticeId) -> Result<Option<SystemPrompt>> {
    store.get_practice(practice_id)?;
    Ok(store.system_prompt_for_practice(practice_id)?)
}

fn remove_practice_prompt(store: &PracticeStore, practice_id: PracticeId) -> Result<bool> {
    store.get_practice(practice_id)?;
    Ok(store.delete_system_prompt_for_practice(practice_id)?)
}

fn show_prompt(ctx: &CliContext, args: &PromptTargetArgs) -> Result<()> {
    let practice_id = require_id(&args.practice_id)?;
    let prompt = practice_prompt(&ctx.store, practice_id)
        .with_context(|| format!("Failed to load system prompt for practice [{practice_id}]"))?;
    if ctx.json {
        return ctx.emit(&prompt);
    }
    match prompt {
        Some(prompt) => {
            println!("System Prompt [{}] for practice [{practice_id}]:", prompt.id);
            println!("{}", prompt.content);
        }
        None => println!("Practice [{practice_id}] has no system prompt."),
    }
    Ok(())
}

fn prompt_content(args: &PromptSetArgs) -> Result<String> {
    let content = match (&args.content, &args.file) {
        (Some(content), _) => content.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => bail!("Provide --content or --file."),
    };
    Ok(content)
}

fn set_prompt(ctx: &CliContext, args: &PromptSetArgs) -> Result<()> {
    let practice_id = require_id(&args.practice_id)?;
    let content = prompt_content(args)?;
    let prompt = ctx
        .store
        .upsert_system_prompt(practice_id, content)
        .with_context(|| format!("Failed to set system prompt for practice [{practice_id}]"))?;
    if ctx.json {
        return ctx.emit(&prompt);
    }
    println!(
        "Saved system prompt [{}] for practice [{practice_id}].",
        prompt.id
    );
    Ok(())
}

fn remove_prompt(ctx: &CliContext, args: &PromptTargetArgs) -> Result<()> {
    let practice_id = require_id(&args.practice_id)?;
    let removed = remove_practice_prompt(&ctx.store, practice_id)
        .with_context(|| format!("Failed to remove system prompt for practice [{practice_id}]"))?;
    if ctx.json {
        return ctx.emit(&serde_json::json!({ "practiceId": practice_id, "deleted": removed }));
    }
    if removed {
        println!("Removed system prompt for practice [{practice_id}].");
    } else {
        println!("Practice [{practice_id}] had no system prompt.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_practice_is_an_error_for_show_and_remove() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PracticeStore::open_dir(dir.path()).expect("open");
        assert!(practice_prompt(&store, 9).is_err());
        assert!(remove_practice_prompt(&store, 9).is_err());

        let practice = store
            .create_practice(practizio_core::NewPractice::new("T", "D", "C"))
            .expect("create");
        assert_eq!(practice_prompt(&store, practice.id).expect("show"), None);
        assert!(!remove_practice_prompt(&store, practice.id).expect("remove"));

        store
            .upsert_system_prompt(practice.id, "Coach")
            .expect("prompt");
        assert!(remove_practice_prompt(&store, practice.id).expect("remove"));
    }

    #[test]
    fn content_flag_wins() {
        let args = PromptSetArgs {
            practice_id: "1".to_string(),
            content: Some("Be brief.".to_string()),
            file: None,
        };
        assert_eq!(prompt_content(&args).expect("content"), "Be brief.");
    }

    #[test]
    fn content_reads_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("prompt.txt");
        fs::write(&path, "You are a coach.\n").expect("write");
        let args = PromptSetArgs {
            practice_id: "1".to_string(),
            content: None,
            file: Some(path),
        };
        assert_eq!(prompt_content(&args).expect("content"), "You are a coach.\n");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let args = PromptSetArgs {
            practice_id: "1".to_string(),
            content: None,
            file: Some(dir.path().join("absent.txt")),
        };
        let err = prompt_content(&args).expect_err("missing");
        assert!(err.to_string().contains("absent.txt"));
    }
}
