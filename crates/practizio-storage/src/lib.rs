//! File-backed store for practices and their system prompts.
//!
//! Each collection lives in its own JSON array file. Every operation runs a
//! full read-modify-write cycle under the store lock, and every write goes
//! through a temp file plus rename so a failed write never truncates the
//! previous state.

mod json_file;

use chrono::Utc;
use json_file::{read_array, storage_error, write_array, write_atomic, FileLock};
use practizio_core::{
    advance_timestamp, NewPractice, Practice, PracticeId, PracticePatch, PracticeWithPrompt,
    SystemPrompt, SystemPromptId, ValidationError,
};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{info, warn};

pub const PRACTICES_FILE: &str = "mini-practices.json";
pub const PROMPTS_FILE: &str = "system-prompts.json";
pub const LOCK_FILE: &str = ".practizio.lock";
pub const DATA_DIR_ENV: &str = "PRACTIZIO_DATA_DIR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Practice,
    SystemPrompt,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Practice => "practice",
            RecordKind::SystemPrompt => "system prompt",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("{kind} {id} not found")]
    NotFound { kind: RecordKind, id: u64 },
    #[error("practice {practice_id} already has a system prompt; update it instead")]
    Conflict { practice_id: PracticeId },
    #[error("storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupt store file {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    Validation,
    NotFound,
    Conflict,
    Storage,
}

impl StoreErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreErrorKind::Validation => "validation",
            StoreErrorKind::NotFound => "not_found",
            StoreErrorKind::Conflict => "conflict",
            StoreErrorKind::Storage => "storage",
        }
    }
}

impl StoreError {
    pub fn kind(&self) -> StoreErrorKind {
        match self {
            StoreError::Validation(_) => StoreErrorKind::Validation,
            StoreError::NotFound { .. } => StoreErrorKind::NotFound,
            StoreError::Conflict { .. } => StoreErrorKind::Conflict,
            StoreError::Storage { .. } | StoreError::Corrupt { .. } => StoreErrorKind::Storage,
        }
    }

    fn practice_not_found(id: PracticeId) -> Self {
        StoreError::NotFound {
            kind: RecordKind::Practice,
            id,
        }
    }

    fn prompt_not_found(id: SystemPromptId) -> Self {
        StoreError::NotFound {
            kind: RecordKind::SystemPrompt,
            id,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub root: PathBuf,
    pub practices_path: PathBuf,
    pub prompts_path: PathBuf,
    pub lock_path: PathBuf,
}

impl StorePaths {
    pub fn in_dir(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            practices_path: root.join(PRACTICES_FILE),
            prompts_path: root.join(PROMPTS_FILE),
            lock_path: root.join(LOCK_FILE),
            root,
        }
    }
}

/// Picks the store directory: explicit flag, then `PRACTIZIO_DATA_DIR`, then
/// the platform data directory.
pub fn resolve_data_dir(flag: Option<&Path>) -> PathBuf {
    resolve_data_dir_from(flag, std::env::var(DATA_DIR_ENV).ok(), dirs::data_dir())
}

fn resolve_data_dir_from(
    flag: Option<&Path>,
    env_value: Option<String>,
    platform_dir: Option<PathBuf>,
) -> PathBuf {
    if let Some(path) = flag {
        if !path.as_os_str().is_empty() {
            return path.to_path_buf();
        }
    }
    if let Some(value) = env_value {
        if !value.trim().is_empty() {
            return PathBuf::from(value);
        }
    }
    match platform_dir {
        Some(dir) => dir.join("practizio"),
        None => PathBuf::from(".practizio"),
    }
}

pub struct PracticeStore {
    paths: StorePaths,
    guard: Mutex<()>,
}

/// Held for the duration of one operation: the in-process mutex first, then
/// the advisory file lock shared with other processes.
struct StoreLock<'a> {
    _file: FileLock,
    _guard: MutexGuard<'a, ()>,
}

impl PracticeStore {
    /// Opens the store, creating the directory and any missing collection
    /// file as an empty array.
    pub fn open(paths: StorePaths) -> Result<Self> {
        fs::create_dir_all(&paths.root).map_err(|err| storage_error(&paths.root, err))?;
        let store = Self {
            paths,
            guard: Mutex::new(()),
        };
        {
            let _lock = store.lock()?;
            for path in [&store.paths.practices_path, &store.paths.prompts_path] {
                if !path.exists() {
                    write_atomic(path, b"[]")?;
                }
            }
        }
        info!(event = "store_open", root = %store.paths.root.display());
        Ok(store)
    }

    pub fn open_dir(root: impl AsRef<Path>) -> Result<Self> {
        Self::open(StorePaths::in_dir(root.as_ref()))
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    fn lock(&self) -> Result<StoreLock<'_>> {
        let guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let file = FileLock::acquire(&self.paths.lock_path)?;
        Ok(StoreLock {
            _file: file,
            _guard: guard,
        })
    }

    fn load_practices(&self) -> Result<Vec<Practice>> {
        read_array(&self.paths.practices_path)
    }

    fn save_practices(&self, practices: &[Practice]) -> Result<()> {
        write_array(&self.paths.practices_path, practices)
    }

    fn load_prompts(&self) -> Result<Vec<SystemPrompt>> {
        read_array(&self.paths.prompts_path)
    }

    fn save_prompts(&self, prompts: &[SystemPrompt]) -> Result<()> {
        write_array(&self.paths.prompts_path, prompts)
    }

    fn require_practice(&self, id: PracticeId) -> Result<Practice> {
        self.load_practices()?
            .into_iter()
            .find(|practice| practice.id == id)
            .ok_or_else(|| StoreError::practice_not_found(id))
    }

    pub fn create_practice(&self, new: NewPractice) -> Result<Practice> {
        new.validate()?;
        let _lock = self.lock()?;
        let mut practices = self.load_practices()?;
        let id = next_id(practices.iter().map(|practice| practice.id));
        let practice = new.into_practice(id, Utc::now());
        practices.push(practice.clone());
        self.save_practices(&practices)?;
        Ok(practice)
    }

    pub fn get_practice(&self, id: PracticeId) -> Result<Practice> {
        let _lock = self.lock()?;
        self.require_practice(id)
    }

    pub fn update_practice(&self, id: PracticeId, patch: PracticePatch) -> Result<Practice> {
        patch.validate()?;
        let _lock = self.lock()?;
        let mut practices = self.load_practices()?;
        let practice = practices
            .iter_mut()
            .find(|practice| practice.id == id)
            .ok_or_else(|| StoreError::practice_not_found(id))?;
        patch.apply_to(practice);
        practice.updated_at = advance_timestamp(practice.updated_at);
        let updated = practice.clone();
        self.save_practices(&practices)?;
        Ok(updated)
    }

    /// Deletes a practice and its system prompt. The prompt goes first; if
    /// the practice write then fails the prompts file is restored, so a failed
    /// delete keeps both records.
    pub fn delete_practice(&self, id: PracticeId) -> Result<()> {
        let _lock = self.lock()?;
        let mut practices = self.load_practices()?;
        let idx = practices
            .iter()
            .position(|practice| practice.id == id)
            .ok_or_else(|| StoreError::practice_not_found(id))?;

        let original_prompts = self.load_prompts()?;
        let prompts: Vec<SystemPrompt> = original_prompts
            .iter()
            .filter(|prompt| prompt.practice_id != id)
            .cloned()
            .collect();
        let prompts_changed = prompts.len() != original_prompts.len();
        if prompts_changed {
            self.save_prompts(&prompts)?;
        }

        practices.remove(idx);
        if let Err(err) = self.save_practices(&practices) {
            if prompts_changed {
                if let Err(rollback) = self.save_prompts(&original_prompts) {
                    warn!(
                        event = "store_rollback_failed",
                        practice_id = id,
                        error = %rollback
                    );
                }
            }
            return Err(err);
        }
        Ok(())
    }

    pub fn list_practices(&self) -> Result<Vec<Practice>> {
        let _lock = self.lock()?;
        self.load_practices()
    }

    pub fn search_practices(&self, term: &str) -> Result<Vec<Practice>> {
        if term.trim().is_empty() {
            return Err(ValidationError::Blank("search term").into());
        }
        let query = term.trim().to_lowercase();
        let _lock = self.lock()?;
        Ok(self
            .load_practices()?
            .into_iter()
            .filter(|practice| practice.matches(&query))
            .collect())
    }

    pub fn list_by_category(&self, category: &str) -> Result<Vec<Practice>> {
        let _lock = self.lock()?;
        Ok(self
            .load_practices()?
            .into_iter()
            .filter(|practice| practice.category == category)
            .collect())
    }

    /// Distinct categories in byte-wise ascending order (uppercase ASCII
    /// sorts before lowercase).
    pub fn list_categories(&self) -> Result<Vec<String>> {
        let _lock = self.lock()?;
        let categories: BTreeSet<String> = self
            .load_practices()?
            .into_iter()
            .map(|practice| practice.category)
            .collect();
        Ok(categories.into_iter().collect())
    }

    pub fn practice_with_prompt(&self, id: PracticeId) -> Result<PracticeWithPrompt> {
        let _lock = self.lock()?;
        let practice = self.require_practice(id)?;
        let prompts = self.load_prompts()?;
        let prompt = prompts.iter().find(|prompt| prompt.practice_id == id);
        Ok(PracticeWithPrompt::new(practice, prompt))
    }

    pub fn create_system_prompt(
        &self,
        practice_id: PracticeId,
        content: impl Into<String>,
    ) -> Result<SystemPrompt> {
        let _lock = self.lock()?;
        self.require_practice(practice_id)?;
        let mut prompts = self.load_prompts()?;
        if prompts.iter().any(|prompt| prompt.practice_id == practice_id) {
            return Err(StoreError::Conflict { practice_id });
        }
        let prompt = new_prompt(&prompts, practice_id, content.into());
        prompts.push(prompt.clone());
        self.save_prompts(&prompts)?;
        Ok(prompt)
    }

    /// Absence is a normal answer here, not an error.
    pub fn system_prompt_for_practice(
        &self,
        practice_id: PracticeId,
    ) -> Result<Option<SystemPrompt>> {
        let _lock = self.lock()?;
        Ok(self
            .load_prompts()?
            .into_iter()
            .find(|prompt| prompt.practice_id == practice_id))
    }

    /// Creates the practice's prompt, or rewrites the existing one in place.
    pub fn upsert_system_prompt(
        &self,
        practice_id: PracticeId,
        content: impl Into<String>,
    ) -> Result<SystemPrompt> {
        let content = content.into();
        let _lock = self.lock()?;
        self.require_practice(practice_id)?;
        let mut prompts = self.load_prompts()?;
        let prompt = match prompts
            .iter_mut()
            .find(|prompt| prompt.practice_id == practice_id)
        {
            Some(existing) => {
                existing.content = content;
                existing.updated_at = advance_timestamp(existing.updated_at);
                existing.clone()
            }
            None => {
                let prompt = new_prompt(&prompts, practice_id, content);
                prompts.push(prompt.clone());
                prompt
            }
        };
        self.save_prompts(&prompts)?;
        Ok(prompt)
    }

    pub fn list_system_prompts(&self) -> Result<Vec<SystemPrompt>> {
        let _lock = self.lock()?;
        self.load_prompts()
    }

    pub fn get_system_prompt(&self, id: SystemPromptId) -> Result<SystemPrompt> {
        let _lock = self.lock()?;
        self.load_prompts()?
            .into_iter()
            .find(|prompt| prompt.id == id)
            .ok_or_else(|| StoreError::prompt_not_found(id))
    }

    pub fn update_system_prompt(
        &self,
        id: SystemPromptId,
        content: impl Into<String>,
    ) -> Result<SystemPrompt> {
        let _lock = self.lock()?;
        let mut prompts = self.load_prompts()?;
        let prompt = prompts
            .iter_mut()
            .find(|prompt| prompt.id == id)
            .ok_or_else(|| StoreError::prompt_not_found(id))?;
        prompt.content = content.into();
        prompt.updated_at = advance_timestamp(prompt.updated_at);
        let updated = prompt.clone();
        self.save_prompts(&prompts)?;
        Ok(updated)
    }

    pub fn delete_system_prompt(&self, id: SystemPromptId) -> Result<()> {
        let _lock = self.lock()?;
        let mut prompts = self.load_prompts()?;
        let idx = prompts
            .iter()
            .position(|prompt| prompt.id == id)
            .ok_or_else(|| StoreError::prompt_not_found(id))?;
        prompts.remove(idx);
        self.save_prompts(&prompts)
    }

    /// Returns whether a prompt was removed.
    pub fn delete_system_prompt_for_practice(&self, practice_id: PracticeId) -> Result<bool> {
        let _lock = self.lock()?;
        let mut prompts = self.load_prompts()?;
        let before = prompts.len();
        prompts.retain(|prompt| prompt.practice_id != practice_id);
        if prompts.len() == before {
            return Ok(false);
        }
        self.save_prompts(&prompts)?;
        Ok(true)
    }
}

fn new_prompt(existing: &[SystemPrompt], practice_id: PracticeId, content: String) -> SystemPrompt {
    let now = Utc::now();
    SystemPrompt {
        id: next_id(existing.iter().map(|prompt| prompt.id)),
        practice_id,
        content,
        created_at: now,
        updated_at: now,
    }
}

/// One past the current maximum, or 1 for an empty collection. Deleting the
/// highest record frees its id for reuse.
fn next_id(ids: impl Iterator<Item = u64>) -> u64 {
    ids.max().map(|max| max + 1).unwrap_or(1)
}
