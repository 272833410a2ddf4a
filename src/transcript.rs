//! Chat transcript: the ordered message list and its JSON persistence.
//!
//! Every mutation bumps `revision`, which the virtual list uses as the
//! sequence identity for its offset memo. A pending assistant reply is an
//! AI message with empty content (the placeholder); at most one exists and
//! it is always the last message.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// File stem used for the persisted transcript.
pub const STORAGE_KEY: &str = "chatMessages";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub sender: Sender,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: format!("user-{}", uuid::Uuid::new_v4()),
            sender: Sender::User,
            content: content.into(),
            thought: None,
        }
    }

    pub fn ai(content: impl Into<String>, thought: Option<String>) -> Self {
        Self {
            id: format!("ai-{}", uuid::Uuid::new_v4()),
            sender: Sender::Ai,
            content: content.into(),
            thought,
        }
    }

    pub fn placeholder() -> Self {
        Self::ai(String::new(), None)
    }

    pub fn is_placeholder(&self) -> bool {
        self.sender == Sender::Ai && self.content.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
    revision: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from persisted messages, dropping placeholders left behind by
    /// a session that exited mid-request.
    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        let before = messages.len();
        let messages: Vec<ChatMessage> =
            messages.into_iter().filter(|m| !m.is_placeholder()).collect();
        if messages.len() != before {
            info!(
                "transcript: dropped {} stale placeholder(s)",
                before - messages.len()
            );
        }
        Self {
            messages,
            revision: 0,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn get(&self, idx: usize) -> Option<&ChatMessage> {
        self.messages.get(idx)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether the last message is a pending reply.
    pub fn has_placeholder(&self) -> bool {
        self.messages.last().is_some_and(ChatMessage::is_placeholder)
    }

    /// Append a user prompt followed by a reply placeholder.
    ///
    /// Returns false (and changes nothing) when the prompt is blank or the
    /// last message is the same user prompt.
    pub fn push_prompt(&mut self, prompt: &str) -> bool {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return false;
        }
        let last = self.messages.last();
        if last.is_some_and(|m| m.sender == Sender::User && m.content == prompt) {
            debug!("transcript: duplicate prompt ignored");
            return false;
        }
        self.messages.push(ChatMessage::user(prompt));
        self.messages.push(ChatMessage::placeholder());
        self.revision += 1;
        true
    }

    /// Fill the trailing placeholder with the reply, keeping its id.
    /// Returns the index of the resolved message.
    pub fn resolve_placeholder(&mut self, answer: &str, thought: Option<String>) -> Option<usize> {
        if !self.has_placeholder() || answer.is_empty() {
            return None;
        }
        let idx = self.messages.len() - 1;
        let msg = &mut self.messages[idx];
        msg.content = answer.to_string();
        msg.thought = thought.filter(|t| !t.trim().is_empty());
        self.revision += 1;
        Some(idx)
    }

    /// Remove the trailing placeholder (request cancelled or failed).
    pub fn drop_placeholder(&mut self) -> Option<usize> {
        if !self.has_placeholder() {
            return None;
        }
        self.messages.pop();
        self.revision += 1;
        Some(self.messages.len())
    }

    pub fn clear(&mut self) {
        if !self.messages.is_empty() {
            self.messages.clear();
            self.revision += 1;
        }
    }

    /// Swap in messages read from disk. Returns false when nothing changed.
    pub fn replace(&mut self, other: Transcript) -> bool {
        if other.messages == self.messages {
            return false;
        }
        self.messages = other.messages;
        self.revision += 1;
        true
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// `$XDG_DATA_HOME/chatview/chatMessages.json`, falling back to
/// `~/.local/share`.
pub fn default_path() -> Option<PathBuf> {
    let data_dir = std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local").join("share"))
        })?;
    Some(data_dir.join("chatview").join(format!("{STORAGE_KEY}.json")))
}

/// Read a transcript. A missing file is an empty transcript.
///
/// A file that does not parse is moved aside to `<name>.json.corrupt` and
/// the transcript starts empty, so the next save cannot overwrite it.
pub fn load(path: &Path) -> anyhow::Result<Transcript> {
    let Some(text) = read(path)? else {
        return Ok(Transcript::new());
    };
    match serde_json::from_str::<Vec<ChatMessage>>(&text) {
        Ok(messages) => Ok(loaded(path, messages)),
        Err(e) => {
            let aside = corrupt_path(path);
            fs::rename(path, &aside).with_context(|| {
                format!(
                    "{} is unparsable ({e}) and could not be moved to {}",
                    path.display(),
                    aside.display()
                )
            })?;
            warn!(
                "transcript: {} is unparsable ({e}); moved to {}, starting empty",
                path.display(),
                aside.display()
            );
            Ok(Transcript::new())
        }
    }
}

/// Re-read a transcript another process changed. Unlike [`load`], an
/// unparsable file is an error and is left in place.
pub fn reload(path: &Path) -> anyhow::Result<Transcript> {
    let Some(text) = read(path)? else {
        return Ok(Transcript::new());
    };
    let messages = serde_json::from_str::<Vec<ChatMessage>>(&text)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(loaded(path, messages))
}

/// Where [`load`] moves a transcript it cannot parse.
pub fn corrupt_path(path: &Path) -> PathBuf {
    path.with_extension("json.corrupt")
}

/// File contents, or `None` when the file is missing or blank.
fn read(path: &Path) -> anyhow::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => Ok(None),
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("transcript: {} not found, starting empty", path.display());
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}

fn loaded(path: &Path, messages: Vec<ChatMessage>) -> Transcript {
    debug!(
        "transcript: loaded {} message(s) from {}",
        messages.len(),
        path.display()
    );
    Transcript::from_messages(messages)
}

/// Write the transcript atomically (temp file + rename).
pub fn save(path: &Path, transcript: &Transcript) -> anyhow::Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(transcript.messages())?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    debug!(
        "transcript: saved {} message(s) to {}",
        transcript.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_prompt_adds_user_and_placeholder() {
        let mut t = Transcript::new();
        assert!(t.push_prompt("  hello  "));
        assert_eq!(t.len(), 2);
        assert_eq!(t.messages()[0].content, "hello");
        assert_eq!(t.messages()[0].sender, Sender::User);
        assert!(t.has_placeholder());
        assert_eq!(t.revision(), 1);
    }

    #[test]
    fn blank_and_duplicate_prompts_are_ignored() {
        let mut t = Transcript::new();
        assert!(!t.push_prompt("   "));
        assert!(t.push_prompt("hello"));
        // Aborted request: the user prompt is the last message again.
        t.drop_placeholder();
        let rev = t.revision();
        assert!(!t.push_prompt("hello"));
        assert_eq!(t.revision(), rev);
        assert_eq!(t.len(), 1);
        assert!(t.push_prompt("again"));
    }

    #[test]
    fn same_prompt_can_be_asked_after_a_reply() {
        let mut t = Transcript::new();
        assert!(t.push_prompt("hello"));
        t.resolve_placeholder("hi there", None);
        assert!(t.push_prompt("hello"));
        assert_eq!(t.len(), 4);
        assert_eq!(t.messages()[2].content, "hello");
        assert!(t.has_placeholder());
    }

    #[test]
    fn resolve_keeps_placeholder_id() {
        let mut t = Transcript::new();
        t.push_prompt("q");
        let id = t.messages()[1].id.clone();
        assert_eq!(
            t.resolve_placeholder("answer", Some("because".into())),
            Some(1)
        );
        let msg = &t.messages()[1];
        assert_eq!(msg.id, id);
        assert_eq!(msg.content, "answer");
        assert_eq!(msg.thought.as_deref(), Some("because"));
        assert!(!t.has_placeholder());
        // Nothing left to resolve
        assert_eq!(t.resolve_placeholder("again", None), None);
    }

    #[test]
    fn empty_answer_does_not_resolve() {
        let mut t = Transcript::new();
        t.push_prompt("q");
        assert_eq!(t.resolve_placeholder("", None), None);
        assert!(t.has_placeholder());
    }

    #[test]
    fn blank_thought_is_dropped() {
        let mut t = Transcript::new();
        t.push_prompt("q");
        t.resolve_placeholder("a", Some("  ".into()));
        assert_eq!(t.messages()[1].thought, None);
    }

    #[test]
    fn drop_placeholder_returns_removed_index() {
        let mut t = Transcript::new();
        t.push_prompt("q");
        assert_eq!(t.drop_placeholder(), Some(1));
        assert_eq!(t.len(), 1);
        assert_eq!(t.drop_placeholder(), None);
    }

    #[test]
    fn from_messages_drops_stale_placeholders() {
        let t = Transcript::from_messages(vec![
            ChatMessage::user("q"),
            ChatMessage::placeholder(),
        ]);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn replace_detects_no_change() {
        let mut t = Transcript::new();
        t.push_prompt("q");
        t.resolve_placeholder("a", None);
        let same = Transcript::from_messages(t.messages().to_vec());
        let rev = t.revision();
        assert!(!t.replace(same));
        assert_eq!(t.revision(), rev);
        assert!(t.replace(Transcript::new()));
        assert!(t.is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chatMessages.json");
        let mut t = Transcript::new();
        t.push_prompt("q");
        t.resolve_placeholder("a", Some("t".into()));
        save(&path, &t).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.messages(), t.messages());
    }

    #[test]
    fn load_missing_and_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("none.json");
        assert!(load(&missing).unwrap().is_empty());
        let corrupt = dir.path().join("bad.json");
        fs::write(&corrupt, "{not json").unwrap();
        assert!(reload(&corrupt).is_err());
        assert!(corrupt.exists());
        assert!(load(&corrupt).unwrap().is_empty());
        assert!(!corrupt.exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("bad.json.corrupt")).unwrap(),
            "{not json"
        );
    }

    #[test]
    fn unparsable_history_survives_the_next_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chatMessages.json");
        let truncated = r#"[{"id":"u1","sender":"user","content":"precious"},{"id":"#;
        fs::write(&path, truncated).unwrap();

        let mut t = load(&path).unwrap();
        assert!(t.is_empty());
        assert!(t.push_prompt("new"));
        save(&path, &t).unwrap();

        assert_eq!(fs::read_to_string(corrupt_path(&path)).unwrap(), truncated);
        assert_eq!(load(&path).unwrap().messages()[0].content, "new");
    }

    #[test]
    fn thought_field_is_optional_on_disk() {
        let json = r#"[{"id":"u1","sender":"user","content":"hi"}]"#;
        let messages: Vec<ChatMessage> = serde_json::from_str(json).unwrap();
        assert_eq!(messages[0].thought, None);
        let out = serde_json::to_string(&messages).unwrap();
        assert!(!out.contains("thought"));
    }
}
