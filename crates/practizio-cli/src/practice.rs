use crate::CliContext;
use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Subcommand};
use practizio_core::{parse_id, NewPractice, Practice, PracticeId, PracticePatch};
use practizio_storage::PracticeStore;

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
pub enum PracticeCommand {
    List(PracticeListArgs),
    Show(PracticeTargetArgs),
    Add(PracticeAddArgs),
    Edit(PracticeEditArgs),
    #[command(alias = "rm")]
    Remove(PracticeTargetArgs),
    Categories,
}

#[derive(Args, Debug)]
pub struct PracticeListArgs {
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long, alias = "query")]
    pub search: Option<String>,
}

#[derive(Args, Debug)]
pub struct PracticeTargetArgs {
    pub id: String,
}

#[derive(Args, Debug)]
pub struct PracticeAddArgs {
    pub title: String,
    #[arg(long, alias = "desc")]
    pub description: String,
    #[arg(long)]
    pub category: String,
    #[arg(long = "tag", value_delimiter = ',')]
    pub tags: Vec<String>,
}

#[derive(Args, Debug)]
pub struct PracticeEditArgs {
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long, alias = "desc")]
    pub description: Option<String>,
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long = "tag", value_delimiter = ',', conflicts_with = "clear_tags")]
    pub tags: Vec<String>,
    #[arg(long)]
    pub clear_tags: bool,
}

pub fn handle(ctx: &CliContext, command: PracticeCommand) -> Result<()> {
    match command {
        PracticeCommand::List(args) => list_practices(ctx, &args),
        PracticeCommand::Show(args) => show_practice(ctx, &args),
        PracticeCommand::Add(args) => add_practice(ctx, args),
        PracticeCommand::Edit(args) => edit_practice(ctx, args),
        PracticeCommand::Remove(args) => remove_practice(ctx, &args),
        PracticeCommand::Categories => list_categories(ctx),
    }
}

pub(crate) fn require_id(raw: &str) -> Result<PracticeId> {
    parse_id(raw).ok_or_else(|| anyhow!("'{raw}' is not a valid practice id."))
}

fn select_practices(store: &PracticeStore, args: &PracticeListArgs) -> Result<Vec<Practice>> {
    let practices = match (args.category.as_deref(), args.search.as_deref()) {
        (None, None) => store.list_practices()?,
        (Some(category), None) => store.list_by_category(category)?,
        (None, Some(query)) => store.search_practices(query)?,
        (Some(category), Some(query)) => {
            let mut hits = store.search_practices(query)?;
            hits.retain(|practice| practice.category == category);
            hits
        }
    };
    Ok(practices)
}

fn list_practices(ctx: &CliContext, args: &PracticeListArgs) -> Result<()> {
    let practices = select_practices(&ctx.store, args).context("Failed to list practices")?;
    if ctx.json {
        return ctx.emit(&practices);
    }
    if practices.is_empty() {
        println!("No practices found.");
        return Ok(());
    }
    for practice in &practices {
        print_practice_line(practice);
    }
    Ok(())
}

fn print_practice_line(practice: &Practice) {
    if practice.tags.is_empty() {
        println!("- [{}] ({}) {}", practice.id, practice.category, practice.title);
    } else {
        println!(
            "- [{}] ({}) {} #{}",
            practice.id,
            practice.category,
            practice.title,
            practice.tags.join(" #")
        );
    }
}

fn show_practice(ctx: &CliContext, args: &PracticeTargetArgs) -> Result<()> {
    let id = require_id(&args.id)?;
    let merged = ctx
        .store
        .practice_with_prompt(id)
        .with_context(|| format!("Failed to load practice [{id}]"))?;

    if ctx.json {
        return ctx.emit(&merged);
    }

    let practice = &merged.practice;
    println!("ID: {}", practice.id);
    println!("Title: {}", practice.title);
    println!("Category: {}", practice.category);
    println!("Description: {}", practice.description);
    if !practice.tags.is_empty() {
        println!("Tags: {}", practice.tags.join(", "));
    }
    println!("Created: {}", practice.created_at.to_rfc3339());
    println!("Updated: {}", practice.updated_at.to_rfc3339());
    match (&merged.system_prompt, merged.system_prompt_id) {
        (Some(content), Some(prompt_id)) => {
            println!("System Prompt [{prompt_id}]:");
            println!("{content}");
        }
        _ => println!("System Prompt: (none)"),
    }
    Ok(())
}

fn add_practice(ctx: &CliContext, args: PracticeAddArgs) -> Result<()> {
    let new = NewPractice::new(args.title, args.description, args.category).with_tags(args.tags);
    let practice = ctx
        .store
        .create_practice(new)
        .context("Failed to add practice")?;
    if ctx.json {
        return ctx.emit(&practice);
    }
    println!("Added practice [{}] {}.", practice.id, practice.title);
    Ok(())
}

fn edit_patch(args: PracticeEditArgs) -> PracticePatch {
    let tags = if args.clear_tags {
        Some(Vec::new())
    } else if args.tags.is_empty() {
        None
    } else {
        Some(args.tags)
    };
    PracticePatch {
        title: args.title,
        description: args.description,
        tags,
        category: args.category,
    }
}

fn edit_practice(ctx: &CliContext, args: PracticeEditArgs) -> Result<()> {
    let id = require_id(&args.id)?;
    let patch = edit_patch(args);
    if patch.is_empty() {
        bail!("Nothing to change for practice [{id}].");
    }
    let practice = ctx
        .store
        .update_practice(id, patch)
        .with_context(|| format!("Failed to update practice [{id}]"))?;
    if ctx.json {
        return ctx.emit(&practice);
    }
    println!("Updated practice [{id}].");
    Ok(())
}

fn remove_practice(ctx: &CliContext, args: &PracticeTargetArgs) -> Result<()> {
    let id = require_id(&args.id)?;
    ctx.store
        .delete_practice(id)
        .with_context(|| format!("Failed to remove practice [{id}]"))?;
    if ctx.json {
        return ctx.emit(&serde_json::json!({ "id": id, "deleted": true }));
    }
    println!("Removed practice [{id}] and its system prompt.");
    Ok(())
}

fn list_categories(ctx: &CliContext) -> Result<()> {
    let categories = ctx
        .store
        .list_categories()
        .context("Failed to list categories")?;
    if ctx.json {
        return ctx.emit(&categories);
    }
    for category in &categories {
        println!("{category}");
    }
    Ok(())
}
