//! Terminal rendering of the chat view.
//!
//! The renderer drains the transcript's change log and draws each change.
//! With ANSI enabled, the most recently drawn entry is redrawn in place as
//! transcription fragments arrive; earlier entries are frozen in scrollback.
//! If a frozen bubble keeps growing (a notice or status line landed below it),
//! only the new text is printed, as a continuation line.
//! In plain mode every append or update is printed as a new line.

use std::collections::HashMap;
use std::io::{self, Write};

use colored::*;
use crossterm::cursor::MoveToPreviousLine;
use crossterm::queue;
use crossterm::terminal::{self, Clear, ClearType};
use unicode_width::UnicodeWidthStr;

use crate::status::{StatusClass, StatusIndicator};
use crate::transcript::{Bubble, Change, Content, Entry, EntryKey, NoticeKind};
use crate::turn::Role;
use crate::view::ChatView;

/// Used when the terminal size cannot be queried.
const FALLBACK_COLUMNS: u16 = 80;

/// The segment currently at the bottom of the screen.
struct Live {
    key: EntryKey,
    /// Screen rows it occupies, after wrapping.
    rows: usize,
    /// Bubble text already frozen above this segment. Empty when the segment
    /// is the whole entry.
    base: String,
}

pub struct TerminalRenderer<W: Write> {
    out: W,
    ansi: bool,
    columns: Option<u16>,
    live: Option<Live>,
    /// Bubble text as last drawn, per entry.
    shown: HashMap<EntryKey, String>,
    last_status: Option<(String, StatusClass)>,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W, ansi: bool) -> Self {
        Self {
            out,
            ansi,
            columns: None,
            live: None,
            shown: HashMap::new(),
            last_status: None,
        }
    }

    /// Fix the terminal width instead of querying it on every redraw.
    pub fn with_columns(mut self, columns: u16) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Draw everything that changed since the last call.
    pub fn render(&mut self, view: &mut ChatView) -> io::Result<()> {
        self.render_status(&view.status)?;
        for change in view.transcript.take_changes() {
            match change {
                Change::Appended(key) => {
                    if let Some(entry) = view.transcript.entry(key) {
                        self.draw(entry, String::new())?;
                    }
                }
                Change::Updated(key) => {
                    if let Some(entry) = view.transcript.entry(key) {
                        self.redraw(entry)?;
                    }
                }
                Change::Removed(key) => {
                    if self.ansi && self.is_live(key) {
                        self.erase_live()?;
                    }
                    self.shown.remove(&key);
                }
                Change::Scrolled => self.out.flush()?,
            }
        }
        self.out.flush()
    }

    fn render_status(&mut self, status: &StatusIndicator) -> io::Result<()> {
        let current = (status.text(), status.class());
        if self.last_status.as_ref() == Some(&current) {
            return Ok(());
        }
        let line = format!("[{}]", current.0);
        let line = if self.ansi {
            match current.1 {
                StatusClass::Connected => line.green().to_string(),
                StatusClass::Connecting => line.yellow().to_string(),
                StatusClass::Disconnected => line.dimmed().to_string(),
                StatusClass::Error => line.red().to_string(),
            }
        } else {
            line
        };
        writeln!(self.out, "{line}")?;
        self.live = None;
        self.last_status = Some(current);
        Ok(())
    }

    fn is_live(&self, key: EntryKey) -> bool {
        self.live.as_ref().is_some_and(|l| l.key == key)
    }

    fn redraw(&mut self, entry: &Entry) -> io::Result<()> {
        if !self.ansi {
            return self.draw(entry, String::new());
        }
        let Content::Bubble(bubble) = &entry.content else {
            return Ok(());
        };

        if self.is_live(entry.key) {
            let base = match &self.live {
                Some(live) if bubble.text.starts_with(live.base.as_str()) => live.base.clone(),
                _ => String::new(),
            };
            self.erase_live()?;
            return self.draw(entry, base);
        }

        // Frozen in scrollback: print only what is new.
        let base = match self.shown.get(&entry.key) {
            Some(shown) if bubble.text.starts_with(shown.as_str()) => {
                if bubble.text.len() == shown.len() {
                    return Ok(());
                }
                shown.clone()
            }
            _ => String::new(),
        };
        self.draw(entry, base)
    }

    fn draw(&mut self, entry: &Entry, base: String) -> io::Result<()> {
        let (painted, visible) = match &entry.content {
            Content::Bubble(b) if !base.is_empty() => (
                self.format_continuation(b, &base[..], self.ansi),
                self.format_continuation(b, &base[..], false),
            ),
            _ => (self.format_entry(entry, self.ansi), self.format_entry(entry, false)),
        };
        let rows = self.rows(&visible);
        writeln!(self.out, "{painted}")?;
        if let Content::Bubble(b) = &entry.content {
            self.shown.insert(entry.key, b.text.clone());
        }
        self.live = Some(Live {
            key: entry.key,
            rows,
            base,
        });
        Ok(())
    }

    fn erase_live(&mut self) -> io::Result<()> {
        if let Some(live) = self.live.take() {
            let rows = u16::try_from(live.rows).unwrap_or(u16::MAX);
            queue!(self.out, MoveToPreviousLine(rows), Clear(ClearType::FromCursorDown))?;
        }
        Ok(())
    }

    /// Screen rows `text` takes once wrapped at the terminal width.
    fn rows(&self, text: &str) -> usize {
        let columns = self
            .columns
            .or_else(|| terminal::size().ok().map(|(cols, _)| cols))
            .filter(|cols| *cols > 0)
            .unwrap_or(FALLBACK_COLUMNS) as usize;
        text.split('\n')
            .map(|line| line.width().div_ceil(columns).max(1))
            .sum()
    }

    fn format_entry(&self, entry: &Entry, paint: bool) -> String {
        match &entry.content {
            Content::Bubble(b) => {
                let prefix = match b.role {
                    Role::User => "you ›",
                    Role::Agent => "agent ›",
                };
                let prefix = match (paint, b.role) {
                    (false, _) => prefix.to_string(),
                    (true, Role::User) => prefix.bright_cyan().bold().to_string(),
                    (true, Role::Agent) => prefix.bright_green().bold().to_string(),
                };
                format!("{prefix} {}", self.format_body(b, &b.text, paint))
            }
            Content::Image(image) => {
                let label = format!("[image] {}", image.url);
                format!("{} {}", agent_prefix(paint), paint_media(label, paint))
            }
            Content::Gallery(images) => {
                let mut out = format!(
                    "{} {}",
                    agent_prefix(paint),
                    paint_media(format!("[gallery] {} images", images.len()), paint)
                );
                for image in images {
                    out.push_str("\n    ");
                    out.push_str(&paint_media(image.url.clone(), paint));
                }
                out
            }
            Content::Notice { text, kind } => match (self.ansi, paint, kind) {
                (false, _, NoticeKind::Info) => format!("* {text}"),
                (false, _, NoticeKind::Error) => format!("! {text}"),
                (true, false, _) => text.clone(),
                (true, true, NoticeKind::Info) => text.italic().to_string(),
                (true, true, NoticeKind::Error) => text.red().to_string(),
            },
        }
    }

    fn format_continuation(&self, bubble: &Bubble, base: &str, paint: bool) -> String {
        let rest = &bubble.text[base.len()..];
        let marker = if paint {
            "  …".dimmed().to_string()
        } else {
            "  …".to_string()
        };
        format!("{marker} {}", self.format_body(bubble, rest, paint))
    }

    /// Transient text is dimmed, or marked with a trailing ellipsis in plain
    /// mode.
    fn format_body(&self, bubble: &Bubble, text: &str, paint: bool) -> String {
        if !self.ansi {
            let marker = if bubble.transient { " …" } else { "" };
            return format!("{text}{marker}");
        }
        match (paint, bubble.transient) {
            (false, _) => text.to_string(),
            (true, true) => text.dimmed().italic().to_string(),
            (true, false) => text.to_string(),
        }
    }
}

fn agent_prefix(paint: bool) -> String {
    if paint {
        "agent ›".bright_green().bold().to_string()
    } else {
        "agent ›".to_string()
    }
}

fn paint_media(text: String, paint: bool) -> String {
    if paint {
        text.bright_magenta().to_string()
    } else {
        text
    }
}
