use std::fs;

use chatview::llm::{CancelToken, LlmClient, Reply, Unavailable, is_cancelled};
use chatview::render::{MessageNode, RenderCache, RenderOptions};
use chatview::transcript::{self, ChatMessage, Sender, Transcript};
use chatview::virtual_list::{ListConfig, MountRegistry, VirtualList, Window};

/// Answers every prompt by echoing it.
struct Echo;

impl LlmClient for Echo {
    fn send(&self, history: &[ChatMessage], cancel: &CancelToken) -> anyhow::Result<Reply> {
        if cancel.is_cancelled() {
            return Err(chatview::llm::Cancelled.into());
        }
        let prompt = history
            .iter()
            .rev()
            .find(|m| m.sender == Sender::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(Reply {
            answer: format!("You said: **{prompt}**"),
            thought: Some("Repeat the prompt back.".into()),
        })
    }
}

fn opts(width: usize) -> RenderOptions {
    RenderOptions {
        width,
        loading: false,
        spinner_frame: 0,
        expanded: false,
    }
}

fn render_all(
    list: &mut VirtualList,
    registry: &mut MountRegistry<MessageNode>,
    cache: &mut RenderCache,
    t: &Transcript,
) -> Window {
    list.layout_items(t.messages(), t.revision(), registry, |msg, _| {
        cache.render(msg, &opts(40))
    })
}

#[test]
fn chat_round_trip_persists() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("chatMessages.json");

    let mut t = transcript::load(&path).unwrap();
    assert!(t.is_empty());
    assert!(t.push_prompt("hello"));
    transcript::save(&path, &t).unwrap();

    let reply = Echo.send(t.messages(), &CancelToken::new()).unwrap();
    let idx = t.resolve_placeholder(&reply.answer, reply.thought).unwrap();
    assert_eq!(idx, 1);
    transcript::save(&path, &t).unwrap();

    let loaded = transcript::load(&path).unwrap();
    assert_eq!(loaded.messages(), t.messages());
    assert_eq!(loaded.messages()[1].content, "You said: **hello**");
    assert_eq!(
        loaded.messages()[1].thought.as_deref(),
        Some("Repeat the prompt back.")
    );
}

#[test]
fn interrupted_session_drops_placeholder_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chatMessages.json");
    let mut t = Transcript::new();
    t.push_prompt("left hanging");
    transcript::save(&path, &t).unwrap();

    let loaded = transcript::load(&path).unwrap();
    assert_eq!(loaded.len(), 1);
    assert!(!loaded.has_placeholder());
}

#[test]
fn persisted_format_uses_lowercase_senders() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chatMessages.json");
    let mut t = Transcript::new();
    t.push_prompt("q");
    t.resolve_placeholder("a", None);
    transcript::save(&path, &t).unwrap();

    let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw[0]["sender"], "user");
    assert_eq!(raw[1]["sender"], "ai");
    assert!(raw[1].get("thought").is_none());
}

#[test]
fn cancelled_request_is_recognized() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = Echo.send(&[ChatMessage::user("x")], &cancel).unwrap_err();
    assert!(is_cancelled(&err));
    assert_eq!(err.to_string(), "Request aborted");

    let err = Unavailable::new("GEMINI_API_KEY is not set")
        .send(&[ChatMessage::user("x")], &CancelToken::new())
        .unwrap_err();
    assert!(!is_cancelled(&err));
}

#[test]
fn placeholder_resolution_keeps_viewport_anchor() {
    let mut t = Transcript::new();
    for i in 0..12 {
        t.push_prompt(&format!("question {i}"));
        t.resolve_placeholder(&format!("answer {i}\n\nwith a second paragraph"), None);
    }
    t.push_prompt("pending");

    let mut list = VirtualList::new(ListConfig::new(6, 3, 20).unwrap(), 10);
    let mut registry = MountRegistry::new();
    let mut cache = RenderCache::new();

    render_all(&mut list, &mut registry, &mut cache, &t);
    list.scroll_to_index(4);
    render_all(&mut list, &mut registry, &mut cache, &t);
    list.scroll_to_index(4);
    let window = render_all(&mut list, &mut registry, &mut cache, &t);
    assert_eq!(window.range.start, 4);
    let anchor = list.offsets().offset_top(4) as i64 - list.scroll_top() as i64;

    // The reply lands far below the viewport.
    let idx = t
        .resolve_placeholder("a long answer\n\n- one\n- two\n- three", None)
        .unwrap();
    list.invalidate(idx);
    render_all(&mut list, &mut registry, &mut cache, &t);
    let after = list.offsets().offset_top(4) as i64 - list.scroll_top() as i64;
    assert_eq!(anchor, after);
}
