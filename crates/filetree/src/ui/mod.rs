mod rows;
mod types;

pub use rows::{Row, RowModel, SharedRows, VisibleRow};
pub use types::View;

use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::cell::RefCell;
use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::entry::{Entry, EntryId};
use crate::scanner::FsLister;
use crate::schedule::{ScanCompletion, TokioScheduler};
use crate::settings::Settings;
use crate::tree::Tree;
use types::Pending;

const THROBBER: [char; 8] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧'];

pub struct App {
    tree: Tree,
    rows: SharedRows,
    /// Scan results from the blocking pool
    completions: Option<mpsc::UnboundedReceiver<ScanCompletion>>,
    settings: Settings,
    view: View,
    /// Open directories; the root is always open
    expanded: HashSet<EntryId>,
    /// Selection by identity, so it survives rescans
    selected: Option<EntryId>,
    list_state: ListState,
    jump_input: String,
    status_message: String,
    pending: Rc<RefCell<Pending>>,
    throbber_frame: usize,
}

impl App {
    /// A browser over the local filesystem rooted at `root`. Scans run on
    /// `runtime`'s blocking pool.
    pub fn new(settings: Settings, root: &Path, runtime: Handle) -> Result<Self> {
        let rows = SharedRows::new();
        let (scheduler, completions) = TokioScheduler::new(runtime, Arc::new(FsLister));
        let tree = Tree::new(rows.clone(), scheduler);
        Self::with_tree(tree, rows, settings, Some(completions), root)
    }

    /// Builds a browser around `tree`, whose sink must be `rows`. Without a
    /// completion channel the caller feeds scan results to the tree itself.
    pub fn with_tree(
        mut tree: Tree,
        rows: SharedRows,
        settings: Settings,
        completions: Option<mpsc::UnboundedReceiver<ScanCompletion>>,
        root: &Path,
    ) -> Result<Self> {
        let root_id = tree
            .load(root, None)
            .with_context(|| format!("Failed to open {}", root.display()))?;

        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Ok(Self {
            tree,
            rows,
            completions,
            settings,
            view: View::Browse,
            expanded: HashSet::new(),
            selected: Some(root_id),
            list_state,
            jump_input: String::new(),
            status_message: String::from("Press '?' for help"),
            pending: Rc::default(),
            throbber_frame: 0,
        })
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn selected(&self) -> Option<EntryId> {
        self.selected
    }

    pub fn is_expanded(&self, id: EntryId) -> bool {
        self.expanded.contains(&id)
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub async fn run(&mut self) -> Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        info!("browser started");
        let result = self.run_event_loop(&mut terminal).await;

        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        result
    }

    async fn run_event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> Result<()> {
        let tick_rate = Duration::from_millis(self.settings.ui.tick_rate_ms);

        loop {
            self.tick();
            terminal.draw(|f| self.render(f))?;

            if event::poll(tick_rate)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press && self.handle_key(key.code) {
                        return Ok(());
                    }
                }
            }

            tokio::task::yield_now().await;
        }
    }

    /// Applies finished scans and picks up what their continuations left.
    pub fn tick(&mut self) {
        if let Some(completions) = self.completions.as_mut() {
            while let Ok(completion) = completions.try_recv() {
                self.tree.complete(completion);
            }
        }

        let pending = std::mem::take(&mut *self.pending.borrow_mut());
        self.expanded.extend(pending.expand);
        if let Some(id) = pending.select {
            self.selected = Some(id);
        }
        if let Some(message) = pending.message {
            self.status_message = message;
        }

        self.throbber_frame = self.throbber_frame.wrapping_add(1);
    }

    /// Handles one key press. Returns true when the browser should quit.
    pub fn handle_key(&mut self, code: KeyCode) -> bool {
        match self.view {
            View::Help => self.view = View::Browse,
            View::Jump => match code {
                KeyCode::Esc => {
                    self.view = View::Browse;
                    self.jump_input.clear();
                }
                KeyCode::Enter => {
                    self.view = View::Browse;
                    let input = std::mem::take(&mut self.jump_input);
                    if !input.trim().is_empty() {
                        self.jump(input.trim());
                    }
                }
                KeyCode::Backspace => {
                    self.jump_input.pop();
                }
                KeyCode::Char(c) => self.jump_input.push(c),
                _ => {}
            },
            View::Browse => match code {
                KeyCode::Char('q') => return true,
                KeyCode::Char('?') => self.view = View::Help,
                KeyCode::Char('/') => {
                    self.view = View::Jump;
                    self.jump_input.clear();
                }
                KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
                KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
                KeyCode::Char('g') => self.select_edge(false),
                KeyCode::Char('G') => self.select_edge(true),
                KeyCode::Enter => self.activate_selected(),
                KeyCode::Right | KeyCode::Char('l') => self.expand_selected(),
                KeyCode::Left | KeyCode::Char('h') => self.collapse_selected(),
                KeyCode::Char('r') => self.refresh_selected(),
                KeyCode::Char('R') => self.refresh_all(),
                KeyCode::Char('u') => self.toggle_unsaved(),
                _ => {}
            },
        }
        false
    }

    fn visible(&self) -> Vec<VisibleRow> {
        self.rows
            .borrow()
            .visible(&self.expanded, self.settings.ui.show_hidden)
    }

    /// Index of the selection among `visible`. If the selected entry is
    /// gone, the old position is kept (clamped).
    fn selected_index(&self, visible: &[VisibleRow]) -> Option<usize> {
        if visible.is_empty() {
            return None;
        }
        self.selected
            .and_then(|id| visible.iter().position(|v| v.id == id))
            .or_else(|| {
                self.list_state
                    .selected()
                    .map(|i| i.min(visible.len() - 1))
            })
    }

    fn select_index(&mut self, visible: &[VisibleRow], index: usize) {
        self.selected = visible.get(index).map(|v| v.id);
        self.list_state.select(Some(index));
    }

    fn move_selection(&mut self, delta: isize) {
        let visible = self.visible();
        if visible.is_empty() {
            return;
        }
        let current = self.selected_index(&visible).unwrap_or(0) as isize;
        let next = (current + delta).clamp(0, visible.len() as isize - 1) as usize;
        self.select_index(&visible, next);
    }

    fn select_edge(&mut self, last: bool) {
        let visible = self.visible();
        if visible.is_empty() {
            return;
        }
        let index = if last { visible.len() - 1 } else { 0 };
        self.select_index(&visible, index);
    }

    fn expand_selected(&mut self) {
        let Some(id) = self.selected else {
            return;
        };
        if self.tree.dir(id).is_none() {
            return;
        }
        self.expanded.insert(id);
        self.tree.init(id, None);
    }

    /// Opens a selected directory, or reports the full path of a selected
    /// file as the one to edit.
    fn activate_selected(&mut self) {
        let Some(id) = self.selected else {
            return;
        };
        if self.tree.dir(id).is_some() {
            self.expand_selected();
            return;
        }
        let Some(path) = self.tree.path_of(id) else {
            return;
        };
        info!(path = %path.display(), "file activated");
        self.status_message = format!("Opened {}", path.display());
    }

    fn collapse_selected(&mut self) {
        let Some(id) = self.selected else {
            return;
        };
        if self.expanded.remove(&id) {
            return;
        }
        let parent = self.rows.borrow().get(id).and_then(|row| row.parent);
        if let Some(parent) = parent {
            self.selected = Some(parent);
        }
    }

    fn label(&self, id: EntryId) -> String {
        self.tree
            .path_of(id)
            .map(|path| self.tree.relative_path(path))
            .unwrap_or_default()
    }

    /// Rescans the selected directory, or the directory holding the
    /// selected file.
    fn refresh_selected(&mut self) {
        let Some(id) = self.selected else {
            return;
        };
        let dir = if self.tree.dir(id).is_some() {
            Some(id)
        } else {
            self.tree.entry(id).and_then(Entry::parent)
        };
        let Some(dir) = dir else {
            return;
        };

        let label = self.label(dir);
        debug!(dir = %label, "refresh requested");
        self.status_message = format!("Refreshing {}", label);

        let pending = self.pending.clone();
        self.tree.refresh(
            dir,
            Some(Box::new(move |_tree: &mut Tree| {
                pending.borrow_mut().message = Some(format!("Refreshed {}", label));
            })),
        );
    }

    fn refresh_all(&mut self) {
        let Some(root) = self.tree.root() else {
            return;
        };
        self.status_message = "Refreshing loaded directories".to_string();

        let pending = self.pending.clone();
        self.tree.refresh_loaded(
            root,
            Some(Box::new(move |_tree: &mut Tree| {
                pending.borrow_mut().message = Some("Refreshed loaded directories".to_string());
            })),
        );
    }

    fn toggle_unsaved(&mut self) {
        let Some(id) = self.selected else {
            return;
        };
        let Some(file) = self.tree.entry(id).and_then(Entry::as_file) else {
            self.status_message = "Only files can be marked unsaved".to_string();
            return;
        };
        let unsaved = !file.is_unsaved();
        self.tree.mark_unsaved(id, unsaved);
    }

    /// Resolves `input` lazily, opening every directory on the way and
    /// selecting the target once it is found.
    fn jump(&mut self, input: &str) {
        let target = shellexpand::tilde(input).to_string();
        self.status_message = format!("Looking for {}", target);

        let pending = self.pending.clone();
        let shown = target.clone();
        self.tree.resolve_path(
            &target,
            Box::new(move |tree: &mut Tree, entry: Option<EntryId>| {
                let mut pending = pending.borrow_mut();
                match entry {
                    Some(id) => {
                        if let Some(parent) = tree.entry(id).and_then(Entry::parent) {
                            pending.expand.push(parent);
                        }
                        pending.select = Some(id);
                        pending.message = Some(tree.relative_path(&shown));
                        true
                    }
                    None => {
                        pending.expand.clear();
                        pending.select = None;
                        pending.message = Some(format!("Not found: {}", shown));
                        false
                    }
                }
            }),
        );
    }

    fn render(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(0),    // Tree
                Constraint::Length(3), // Info pane
                Constraint::Length(1), // Status bar
            ])
            .split(f.area());

        match self.view {
            View::Help => self.render_help(f, chunks[0]),
            View::Browse | View::Jump => self.render_tree(f, chunks[0]),
        }
        self.render_info(f, chunks[1]);

        if self.view == View::Jump {
            self.render_jump_bar(f, chunks[2]);
        } else {
            self.render_status_bar(f, chunks[2]);
        }
    }

    fn render_tree(&mut self, f: &mut Frame, area: Rect) {
        let visible = self.visible();
        let index = self.selected_index(&visible);
        self.list_state.select(index);
        if let Some(i) = index {
            self.selected = visible.get(i).map(|v| v.id);
        }

        let title = match self.tree.root_path() {
            Some(path) => format!("Files | {}", path.display()),
            None => "Files".to_string(),
        };
        let throbber = THROBBER[self.throbber_frame % THROBBER.len()];
        let marker = &self.settings.ui.unsaved_marker;

        let rows = self.rows.borrow();
        let items: Vec<ListItem> = visible
            .iter()
            .filter_map(|v| {
                let row = rows.get(v.id)?;
                let fold = if !row.is_dir() {
                    ' '
                } else if row.busy {
                    throbber
                } else if v.depth == 0 || self.expanded.contains(&v.id) {
                    '▼'
                } else {
                    '▶'
                };

                let mut spans = vec![Span::raw(format!(
                    "{}{} {} {}",
                    "  ".repeat(v.depth),
                    fold,
                    row.icon(),
                    row.name
                ))];
                if row.unsaved {
                    spans.push(Span::styled(
                        format!(" {}", marker),
                        Style::default().fg(Color::Yellow),
                    ));
                }
                if let Some(error) = &row.error {
                    spans.push(Span::styled(
                        format!("  ({})", error),
                        Style::default().fg(Color::Red),
                    ));
                }
                Some(ListItem::new(Line::from(spans)))
            })
            .collect();
        drop(rows);

        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_style(
                Style::default()
                    .bg(Color::DarkGray)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol(">> ");

        f.render_stateful_widget(list, area, &mut self.list_state);
    }

    fn render_info(&self, f: &mut Frame, area: Rect) {
        let text = match self.selected.and_then(|id| self.tree.entry(id)) {
            Some(entry) => {
                let mut parts = vec![self.tree.relative_path(entry.path())];
                match entry.as_dir() {
                    Some(dir) => {
                        parts.push(format!("{:?}", dir.lifecycle()));
                        if dir.has_unsaved() {
                            parts.push(format!("{} unsaved", dir.dirty_count()));
                        }
                        if let Some(at) = dir.loaded_at() {
                            parts.push(format!(
                                "scanned {}",
                                at.with_timezone(&chrono::Local).format("%H:%M:%S")
                            ));
                        }
                    }
                    None => {
                        parts.push(format!("{:?}", entry.class()));
                        if entry.shows_unsaved() {
                            parts.push("unsaved".to_string());
                        }
                    }
                }
                parts.join(" | ")
            }
            None => "Nothing selected".to_string(),
        };

        let paragraph = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title("Info"))
            .wrap(Wrap { trim: true });

        f.render_widget(paragraph, area);
    }

    fn render_help(&self, f: &mut Frame, area: Rect) {
        let help_text = vec![
            Line::from(vec![Span::styled(
                "filetree - Keyboard Shortcuts",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )]),
            Line::from(""),
            Line::from(vec![Span::styled(
                "Navigation:",
                Style::default().fg(Color::Yellow),
            )]),
            Line::from("  j/↓         Move down one item"),
            Line::from("  k/↑         Move up one item"),
            Line::from("  g           Jump to top"),
            Line::from("  G           Jump to bottom"),
            Line::from("  Enter       Open directory, or select file for editing"),
            Line::from("  l/→         Open directory"),
            Line::from("  h/←         Close directory / go to parent"),
            Line::from("  /           Go to a path"),
            Line::from(""),
            Line::from(vec![Span::styled(
                "Actions:",
                Style::default().fg(Color::Yellow),
            )]),
            Line::from("  r           Rescan selected directory"),
            Line::from("  R           Rescan every loaded directory"),
            Line::from("  u           Toggle unsaved marker on a file"),
            Line::from(""),
            Line::from(vec![Span::styled(
                "General:",
                Style::default().fg(Color::Yellow),
            )]),
            Line::from("  ?           Show this help"),
            Line::from("  q           Quit"),
            Line::from(""),
            Line::from(vec![Span::styled(
                "Press any key to close",
                Style::default()
                    .fg(Color::Gray)
                    .add_modifier(Modifier::ITALIC),
            )]),
        ];

        let paragraph = Paragraph::new(help_text)
            .block(Block::default().borders(Borders::ALL).title("Help (?)"))
            .wrap(Wrap { trim: true });

        f.render_widget(paragraph, area);
    }

    fn render_jump_bar(&self, f: &mut Frame, area: Rect) {
        let line = Line::from(vec![
            Span::styled("Go to: ", Style::default().fg(Color::Cyan)),
            Span::raw(&self.jump_input),
            Span::styled("█", Style::default().fg(Color::Gray)),
        ]);
        f.render_widget(Paragraph::new(vec![line]), area);
    }

    fn render_status_bar(&self, f: &mut Frame, area: Rect) {
        let help_text = match self.view {
            View::Help => "Press any key to close help",
            _ => "q: quit | ↑↓/jk: navigate | l/h: open/close | r/R: rescan | u: unsaved | /: go to",
        };

        let status_line = if self.status_message.is_empty() {
            Line::from(vec![Span::styled(
                help_text,
                Style::default().fg(Color::Gray),
            )])
        } else {
            Line::from(vec![
                Span::styled(&self.status_message, Style::default().fg(Color::Yellow)),
                Span::raw(" | "),
                Span::styled(help_text, Style::default().fg(Color::Gray)),
            ])
        };

        f.render_widget(Paragraph::new(vec![status_line]), area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::ScanQueue;
    use crate::testing::MemLister;

    fn create_test_app() -> (App, ScanQueue, MemLister) {
        let lister = MemLister::new();
        lister.add_file("/root/docs/deep/x.md");
        lister.add_file("/root/docs/readme.md");
        lister.add_file("/root/notes.md");

        let rows = SharedRows::new();
        let queue = ScanQueue::new();
        let tree = Tree::new(rows.clone(), queue.clone());
        let mut app =
            App::with_tree(tree, rows, Settings::default(), None, Path::new("/root")).unwrap();
        pump(&mut app, &queue, &lister);
        (app, queue, lister)
    }

    fn pump(app: &mut App, queue: &ScanQueue, lister: &MemLister) {
        queue.run_until_idle(app.tree_mut(), lister);
        app.tick();
    }

    fn selected_name(app: &App) -> String {
        let id = app.selected().unwrap();
        app.tree().entry(id).unwrap().name().to_string()
    }

    #[test]
    fn test_navigation_and_lazy_expand() {
        let (mut app, queue, lister) = create_test_app();
        assert_eq!(app.visible().len(), 3);

        app.handle_key(KeyCode::Char('j'));
        assert_eq!(selected_name(&app), "docs");
        let docs = app.selected().unwrap();

        app.handle_key(KeyCode::Enter);
        assert!(app.is_expanded(docs));
        pump(&mut app, &queue, &lister);
        assert_eq!(app.visible().len(), 5);
        assert_eq!(lister.calls("/root/docs"), 1);

        app.handle_key(KeyCode::Char('G'));
        assert_eq!(selected_name(&app), "notes.md");
        app.handle_key(KeyCode::Char('g'));
        assert_eq!(selected_name(&app), "root");

        // Close docs, then move from it to its parent
        app.handle_key(KeyCode::Char('j'));
        app.handle_key(KeyCode::Char('h'));
        assert!(!app.is_expanded(docs));
        assert_eq!(app.visible().len(), 3);
        app.handle_key(KeyCode::Char('h'));
        assert_eq!(selected_name(&app), "root");
    }

    #[test]
    fn test_jump_opens_ancestors() {
        let (mut app, queue, lister) = create_test_app();

        app.handle_key(KeyCode::Char('/'));
        assert_eq!(app.view(), View::Jump);
        for c in "docs/deep/x.md".chars() {
            app.handle_key(KeyCode::Char(c));
        }
        app.handle_key(KeyCode::Enter);
        assert_eq!(app.view(), View::Browse);
        pump(&mut app, &queue, &lister);

        let target = app.tree().lookup("docs/deep/x.md").unwrap();
        let docs = app.tree().lookup("docs").unwrap();
        let deep = app.tree().lookup("docs/deep").unwrap();
        assert_eq!(app.selected(), Some(target));
        assert!(app.is_expanded(docs));
        assert!(app.is_expanded(deep));
        assert!(app.visible().iter().any(|v| v.id == target));
        // Each directory on the way is scanned once
        assert_eq!(lister.calls("/root/docs"), 1);
        assert_eq!(lister.calls("/root/docs/deep"), 1);
    }

    #[test]
    fn test_jump_to_missing_path() {
        let (mut app, queue, lister) = create_test_app();

        app.handle_key(KeyCode::Char('/'));
        for c in "docs/nope.md".chars() {
            app.handle_key(KeyCode::Char(c));
        }
        app.handle_key(KeyCode::Enter);
        pump(&mut app, &queue, &lister);

        assert_eq!(app.status_message(), "Not found: docs/nope.md");
        assert_eq!(selected_name(&app), "root");
    }

    #[test]
    fn test_enter_on_file_reports_its_path() {
        let (mut app, _queue, _lister) = create_test_app();

        app.handle_key(KeyCode::Char('G'));
        assert_eq!(selected_name(&app), "notes.md");
        app.handle_key(KeyCode::Enter);
        assert_eq!(app.status_message(), "Opened /root/notes.md");

        // Right only opens directories
        let notes = app.selected().unwrap();
        app.handle_key(KeyCode::Right);
        assert!(!app.is_expanded(notes));
    }

    #[test]
    fn test_toggle_unsaved_marks_ancestors() {
        let (mut app, _queue, _lister) = create_test_app();
        let root = app.tree().root().unwrap();

        app.handle_key(KeyCode::Char('G'));
        let notes = app.selected().unwrap();
        app.handle_key(KeyCode::Char('u'));
        assert!(app.tree().is_unsaved(notes));
        assert_eq!(app.tree().dirty_count(root), 1);

        app.handle_key(KeyCode::Char('u'));
        assert!(!app.tree().is_unsaved(notes));
        assert_eq!(app.tree().dirty_count(root), 0);

        app.handle_key(KeyCode::Char('g'));
        app.handle_key(KeyCode::Char('u'));
        assert_eq!(app.status_message(), "Only files can be marked unsaved");
    }

    #[test]
    fn test_refresh_keeps_selection() {
        let (mut app, queue, lister) = create_test_app();
        app.handle_key(KeyCode::Char('G'));
        let notes = app.selected().unwrap();

        lister.add_dir("/root/added");
        app.handle_key(KeyCode::Char('r'));
        assert_eq!(app.status_message(), "Refreshing .");
        pump(&mut app, &queue, &lister);

        assert_eq!(app.status_message(), "Refreshed .");
        assert_eq!(app.selected(), Some(notes));
        assert_eq!(app.visible().len(), 4);

        app.handle_key(KeyCode::Char('R'));
        pump(&mut app, &queue, &lister);
        assert_eq!(app.status_message(), "Refreshed loaded directories");
        assert_eq!(app.selected(), Some(notes));
    }

    #[test]
    fn test_help_and_quit() {
        let (mut app, _queue, _lister) = create_test_app();

        assert!(!app.handle_key(KeyCode::Char('?')));
        assert_eq!(app.view(), View::Help);
        assert!(!app.handle_key(KeyCode::Char('q')));
        assert_eq!(app.view(), View::Browse);
        assert!(app.handle_key(KeyCode::Char('q')));
    }
}
