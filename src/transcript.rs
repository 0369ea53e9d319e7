//! Transcript view model.
//!
//! Stands in for the chat page: an ordered list of entries (text bubbles,
//! images, galleries, notices) plus a change log that a renderer drains to
//! draw incremental updates. Bubbles are addressed by [`BubbleId`], the same
//! way the turn tracker refers to them.

use serde::{Deserialize, Serialize};

use crate::turn::Role;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of one text bubble, e.g. `agent-msg-3f2a9c1e`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BubbleId(String);

impl BubbleId {
    /// Generate a fresh id for a bubble authored by `role`.
    pub fn generate(role: Role) -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        BubbleId(format!("{}-msg-{}", role, &uuid[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BubbleId {
    fn from(s: &str) -> Self {
        BubbleId(s.to_string())
    }
}

impl std::fmt::Display for BubbleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable key of any entry, used by renderers to track what they drew.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey(u64);

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// One contiguous utterance from one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bubble {
    pub id: BubbleId,
    pub role: Role,
    pub text: String,
    /// Live, possibly incomplete transcript text.
    pub transient: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub url: String,
    pub alt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Bubble(Bubble),
    Image(Image),
    Gallery(Vec<Image>),
    Notice { text: String, kind: NoticeKind },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: EntryKey,
    pub content: Content,
}

/// A view mutation, in the order it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Appended(EntryKey),
    Updated(EntryKey),
    Removed(EntryKey),
    Scrolled,
}

pub const IMAGE_ALT: &str = "Generated Image";
pub const GALLERY_IMAGE_ALT: &str = "Generated Place Image";

// ---------------------------------------------------------------------------
// Transcript
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<Entry>,
    next_key: u64,
    changes: Vec<Change>,
    /// Last entry that was visible when the view last scrolled.
    scroll_anchor: Option<EntryKey>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bubbles(&self) -> impl Iterator<Item = &Bubble> {
        self.entries.iter().filter_map(|e| match &e.content {
            Content::Bubble(b) => Some(b),
            _ => None,
        })
    }

    pub fn bubble(&self, id: &BubbleId) -> Option<&Bubble> {
        self.bubbles().find(|b| &b.id == id)
    }

    pub fn entry(&self, key: EntryKey) -> Option<&Entry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Append a new bubble and return its id.
    pub fn push_bubble(&mut self, role: Role, text: impl Into<String>, transient: bool) -> BubbleId {
        let id = BubbleId::generate(role);
        self.push(Content::Bubble(Bubble {
            id: id.clone(),
            role,
            text: text.into(),
            transient,
        }));
        id
    }

    pub fn push_image(&mut self, url: impl Into<String>) -> EntryKey {
        self.push(Content::Image(Image {
            url: url.into(),
            alt: IMAGE_ALT.to_string(),
        }))
    }

    pub fn push_gallery<I, S>(&mut self, urls: I) -> EntryKey
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let images = urls
            .into_iter()
            .map(|url| Image {
                url: url.into(),
                alt: GALLERY_IMAGE_ALT.to_string(),
            })
            .collect();
        self.push(Content::Gallery(images))
    }

    pub fn push_notice(&mut self, text: impl Into<String>, kind: NoticeKind) -> EntryKey {
        self.push(Content::Notice {
            text: text.into(),
            kind,
        })
    }

    /// Replace a bubble's text. Returns `false` if the bubble is gone.
    pub fn set_text(&mut self, id: &BubbleId, text: &str) -> bool {
        self.update_bubble(id, |b| {
            b.text.clear();
            b.text.push_str(text);
        })
    }

    pub fn append_text(&mut self, id: &BubbleId, text: &str) -> bool {
        self.update_bubble(id, |b| b.text.push_str(text))
    }

    pub fn set_transient(&mut self, id: &BubbleId, transient: bool) -> bool {
        self.update_bubble(id, |b| b.transient = transient)
    }

    pub fn remove(&mut self, id: &BubbleId) -> Option<Bubble> {
        let pos = self
            .entries
            .iter()
            .position(|e| matches!(&e.content, Content::Bubble(b) if &b.id == id))?;
        let entry = self.entries.remove(pos);
        self.changes.push(Change::Removed(entry.key));
        match entry.content {
            Content::Bubble(b) => Some(b),
            _ => None,
        }
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_anchor = self.entries.last().map(|e| e.key);
        self.changes.push(Change::Scrolled);
    }

    /// Whether the last scroll happened after the newest entry was added.
    pub fn is_scrolled_to_bottom(&self) -> bool {
        self.scroll_anchor == self.entries.last().map(|e| e.key)
    }

    /// Drain the pending change log.
    pub fn take_changes(&mut self) -> Vec<Change> {
        std::mem::take(&mut self.changes)
    }

    fn push(&mut self, content: Content) -> EntryKey {
        let key = EntryKey(self.next_key);
        self.next_key += 1;
        self.entries.push(Entry { key, content });
        self.changes.push(Change::Appended(key));
        key
    }

    fn update_bubble(&mut self, id: &BubbleId, f: impl FnOnce(&mut Bubble)) -> bool {
        let found = self.entries.iter_mut().find_map(|e| match &mut e.content {
            Content::Bubble(b) if &b.id == id => Some((e.key, b)),
            _ => None,
        });
        match found {
            Some((key, bubble)) => {
                f(bubble);
                self.changes.push(Change::Updated(key));
                true
            }
            None => false,
        }
    }
}
