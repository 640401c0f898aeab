use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use roll_recon::{CanonicalVoter, ConflictKind, ConflictRecord, RollAudit};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Conflicts,
    Voters,
    Booths,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Conflicts => Page::Voters,
            Page::Voters => Page::Booths,
            Page::Booths => Page::Conflicts,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Conflicts => Page::Booths,
            Page::Voters => Page::Conflicts,
            Page::Booths => Page::Voters,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Conflicts => "Conflicts",
            Page::Voters => "Canonical Roll",
            Page::Booths => "Booths",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictFilter {
    All,
    Kind(ConflictKind),
}

pub struct App {
    pub voters: Vec<CanonicalVoter>,
    pub conflicts: Vec<ConflictRecord>,
    pub filtered_conflicts: Vec<ConflictRecord>,
    pub audit: Option<RollAudit>,
    pub current_page: Page,
    pub conflict_state: TableState,
    pub voter_state: TableState,
    pub booth_state: TableState,
    pub show_detail: bool,
    pub filter: ConflictFilter,
}

impl App {
    pub fn new(
        voters: Vec<CanonicalVoter>,
        conflicts: Vec<ConflictRecord>,
        audit: Option<RollAudit>,
    ) -> Self {
        let mut conflict_state = TableState::default();
        if !conflicts.is_empty() {
            conflict_state.select(Some(0));
        }
        let mut voter_state = TableState::default();
        if !voters.is_empty() {
            voter_state.select(Some(0));
        }
        let mut booth_state = TableState::default();
        booth_state.select(Some(0));

        let filtered_conflicts = conflicts.clone();

        Self {
            voters,
            conflicts,
            filtered_conflicts,
            audit,
            current_page: Page::Conflicts,
            conflict_state,
            voter_state,
            booth_state,
            show_detail: false,
            filter: ConflictFilter::All,
        }
    }

    pub fn apply_filter(&mut self, filter: ConflictFilter) {
        self.filter = filter;
        self.filtered_conflicts = match filter {
            ConflictFilter::All => self.conflicts.clone(),
            ConflictFilter::Kind(kind) => self
                .conflicts
                .iter()
                .filter(|c| c.kind == kind)
                .cloned()
                .collect(),
        };
        if self.filtered_conflicts.is_empty() {
            self.conflict_state.select(None);
        } else {
            self.conflict_state.select(Some(0));
        }
    }

    pub fn selected_conflict(&self) -> Option<&ConflictRecord> {
        self.conflict_state
            .selected()
            .and_then(|i| self.filtered_conflicts.get(i))
    }

    pub fn selected_voter(&self) -> Option<&CanonicalVoter> {
        self.voter_state.selected().and_then(|i| self.voters.get(i))
    }

    fn active_len(&self) -> usize {
        match self.current_page {
            Page::Conflicts => self.filtered_conflicts.len(),
            Page::Voters => self.voters.len(),
            Page::Booths => self.audit.as_ref().map(|a| a.booths.len()).unwrap_or(0),
        }
    }

    fn active_state(&mut self) -> &mut TableState {
        match self.current_page {
            Page::Conflicts => &mut self.conflict_state,
            Page::Voters => &mut self.voter_state,
            Page::Booths => &mut self.booth_state,
        }
    }

    pub fn next(&mut self) {
        self.step(1);
    }

    pub fn previous(&mut self) {
        self.step(-1);
    }

    pub fn page_down(&mut self) {
        self.step(20);
    }

    pub fn page_up(&mut self) {
        self.step(-20);
    }

    fn step(&mut self, delta: i64) {
        let len = self.active_len() as i64;
        if len == 0 {
            return;
        }
        let state = self.active_state();
        let current = state.selected().unwrap_or(0) as i64;
        // Single steps wrap; page jumps clamp
        let next = if delta.abs() > 1 {
            (current + delta).clamp(0, len - 1)
        } else {
            (current + delta).rem_euclid(len)
        };
        state.select(Some(next as usize));
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter => app.show_detail = !app.show_detail,
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.current_page = app.current_page.previous();
                    } else {
                        app.current_page = app.current_page.next();
                    }
                }
                KeyCode::Char('c') => app.apply_filter(ConflictFilter::All),
                KeyCode::Char('1') if app.current_page == Page::Conflicts => {
                    app.apply_filter(ConflictFilter::Kind(ConflictKind::CrossBoothIdentity));
                }
                KeyCode::Char('2') if app.current_page == Page::Conflicts => {
                    app.apply_filter(ConflictFilter::Kind(ConflictKind::SerialCollision));
                }
                KeyCode::Char('3') if app.current_page == Page::Conflicts => {
                    app.apply_filter(ConflictFilter::Kind(ConflictKind::UnplaceableIdentity));
                }
                KeyCode::Char('4') if app.current_page == Page::Conflicts => {
                    app.apply_filter(ConflictFilter::Kind(ConflictKind::StructuralGap));
                }
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home => app.active_state().select(Some(0)),
                KeyCode::End => {
                    let len = app.active_len();
                    if len > 0 {
                        app.active_state().select(Some(len - 1));
                    }
                }
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail && app.current_page != Page::Booths {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(chunks[1]);

        match app.current_page {
            Page::Conflicts => {
                render_conflicts(f, content_chunks[0], app);
                render_conflict_detail(f, content_chunks[1], app);
            }
            Page::Voters => {
                render_voters(f, content_chunks[0], app);
                render_voter_detail(f, content_chunks[1], app);
            }
            Page::Booths => {}
        }
    } else {
        match app.current_page {
            Page::Conflicts => render_conflicts(f, chunks[1], app),
            Page::Voters => render_voters(f, chunks[1], app),
            Page::Booths => render_booths(f, chunks[1], app),
        }
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let pages = [Page::Conflicts, Page::Voters, Page::Booths];

    let mut tab_spans = vec![];
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }
        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        tab_spans.push(Span::styled(page.title(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Voters: {}", app.voters.len()),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Conflicts: {}", app.conflicts.len()),
        Style::default().fg(if app.conflicts.is_empty() {
            Color::Green
        } else {
            Color::Red
        }),
    ));
    if let Some(audit) = &app.audit {
        tab_spans.push(Span::raw("  |  "));
        tab_spans.push(Span::styled(
            if audit.is_final() { "FINAL" } else { "NOT FINAL" },
            Style::default().fg(if audit.is_final() {
                Color::Green
            } else {
                Color::Red
            }),
        ));
    }

    let header = Paragraph::new(vec![Line::from(tab_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(header, area);
}

fn kind_color(kind: ConflictKind) -> Color {
    match kind {
        ConflictKind::CrossBoothIdentity => Color::Magenta,
        ConflictKind::SerialCollision => Color::Red,
        ConflictKind::UnplaceableIdentity => Color::Yellow,
        ConflictKind::StructuralGap => Color::Cyan,
    }
}

fn render_conflicts(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["Kind", "Booth", "Serial", "Identity", "Note"]
        .iter()
        .map(|h| {
            Cell::from(*h).style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        });
    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = app.filtered_conflicts.iter().map(|c| {
        let color = kind_color(c.kind);
        Row::new(vec![
            Cell::from(c.kind.as_str()).style(Style::default().fg(color)),
            Cell::from(format!("{}/{}", c.ward, c.booth)),
            Cell::from(
                c.serial
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::from(c.identity_id.clone().unwrap_or_else(|| "-".to_string())),
            Cell::from(truncate(&c.note, 48)),
        ])
        .height(1)
    });

    let title = match app.filter {
        ConflictFilter::All => " Conflicts ".to_string(),
        ConflictFilter::Kind(kind) => format!(" Conflicts - {} ", kind),
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(22),
            Constraint::Length(10),
            Constraint::Length(8),
            Constraint::Length(12),
            Constraint::Min(30),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(title),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.conflict_state);
}

fn render_voters(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["Serial", "Identity", "Name", "Age", "G", "House"]
        .iter()
        .map(|h| {
            Cell::from(*h).style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        });
    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = app.voters.iter().map(|v| {
        let serial = v
            .unique_serial()
            .unwrap_or_else(|| format!("W{:03}B{:03}-????", v.ward, v.booth));
        let serial_color = if v.serial.is_some() {
            Color::Green
        } else {
            Color::Red
        };
        Row::new(vec![
            Cell::from(serial).style(Style::default().fg(serial_color)),
            Cell::from(v.identity_id.clone()),
            Cell::from(truncate(v.name.as_deref().unwrap_or("-"), 28)),
            Cell::from(v.age.map(|a| a.to_string()).unwrap_or_else(|| "-".into())),
            Cell::from(v.gender.map(|g| g.as_str()).unwrap_or("-")),
            Cell::from(truncate(v.house_number.as_deref().unwrap_or("-"), 10)),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(15),
            Constraint::Length(12),
            Constraint::Length(30),
            Constraint::Length(5),
            Constraint::Length(3),
            Constraint::Length(12),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Canonical Roll "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.voter_state);
}

fn render_booths(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["Booth", "Voters", "Expected", "Complete %", "Gaps", "Pending", "Status"]
        .iter()
        .map(|h| {
            Cell::from(*h).style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        });
    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let booths = app
        .audit
        .as_ref()
        .map(|a| a.booths.as_slice())
        .unwrap_or(&[]);

    let rows = booths.iter().map(|b| {
        let status = if b.is_final() { "FINAL" } else { "OPEN" };
        let status_color = if b.is_final() { Color::Green } else { Color::Red };
        Row::new(vec![
            Cell::from(format!("{}/{}", b.ward, b.booth)),
            Cell::from(b.voter_count.to_string()),
            Cell::from(b.expected_count.to_string()),
            Cell::from(format!("{:.1}", b.completeness_pct())),
            Cell::from(b.gaps.len().to_string()),
            Cell::from(b.unresolved_pending.to_string()),
            Cell::from(status).style(Style::default().fg(status_color)),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Length(8),
            Constraint::Length(10),
            Constraint::Length(12),
            Constraint::Length(6),
            Constraint::Length(9),
            Constraint::Length(8),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Booth Audit "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.booth_state);
}

fn render_conflict_detail(f: &mut Frame, area: Rect, app: &App) {
    let conflict = match app.selected_conflict() {
        Some(c) => c,
        None => {
            let empty = Paragraph::new("No conflict selected").block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Yellow))
                    .title(" Conflict Detail "),
            );
            f.render_widget(empty, area);
            return;
        }
    };

    let label = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
    let mut content = vec![
        Line::from(""),
        Line::from(vec![
            Span::styled("  Kind: ", label),
            Span::styled(
                conflict.kind.as_str(),
                Style::default().fg(kind_color(conflict.kind)),
            ),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Booth: ", label),
            Span::raw(format!("{}/{}", conflict.ward, conflict.booth)),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Note: ", label),
            Span::raw(conflict.note.clone()),
        ]),
        Line::from(""),
        Line::from("  ─────────────────────────────────────"),
    ];

    if let Some(existing) = &conflict.existing {
        content.push(Line::from(""));
        content.push(Line::from(Span::styled(
            "  EXISTING CLAIM",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        )));
        content.push(Line::from(vec![
            Span::styled("  Identity: ", label),
            Span::raw(existing.identity_id.clone()),
        ]));
        content.push(Line::from(vec![
            Span::styled("  Name: ", label),
            Span::raw(existing.name.clone().unwrap_or_else(|| "-".into())),
        ]));
        content.push(Line::from(vec![
            Span::styled("  Serial: ", label),
            Span::raw(
                existing
                    .serial
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".into()),
            ),
        ]));
        content.push(Line::from(vec![
            Span::styled("  Batches: ", label),
            Span::raw(existing.provenance.join(", ")),
        ]));
    }

    if let Some(incoming) = &conflict.incoming {
        content.push(Line::from(""));
        content.push(Line::from(Span::styled(
            "  INCOMING CLAIM",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        )));
        content.push(Line::from(vec![
            Span::styled("  Identity: ", label),
            Span::raw(
                incoming
                    .identity_id
                    .clone()
                    .unwrap_or_else(|| "<no identity>".into()),
            ),
        ]));
        content.push(Line::from(vec![
            Span::styled("  Name: ", label),
            Span::raw(incoming.name.clone().unwrap_or_else(|| "-".into())),
        ]));
        content.push(Line::from(vec![
            Span::styled("  Serial: ", label),
            Span::raw(
                incoming
                    .claimed_serial
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".into()),
            ),
        ]));
        content.push(Line::from(vec![
            Span::styled("  Batch: ", label),
            Span::raw(incoming.source_batch.clone()),
        ]));
    }

    content.push(Line::from(""));
    content.push(Line::from(Span::styled(
        "  Press Enter to close",
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    )));

    let panel = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Conflict Detail "),
    );
    f.render_widget(panel, area);
}

fn render_voter_detail(f: &mut Frame, area: Rect, app: &App) {
    let voter = match app.selected_voter() {
        Some(v) => v,
        None => {
            let empty = Paragraph::new("No voter selected").block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Yellow))
                    .title(" Voter Detail "),
            );
            f.render_widget(empty, area);
            return;
        }
    };

    let label = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
    let field = |name: &str, value: String, quality: &str| {
        Line::from(vec![
            Span::styled(format!("  {}: ", name), label),
            Span::raw(value),
            Span::styled(
                format!("  [{}]", quality),
                Style::default().fg(Color::DarkGray),
            ),
        ])
    };

    let content = vec![
        Line::from(""),
        Line::from(vec![
            Span::styled("  Identity: ", label),
            Span::raw(voter.identity_id.clone()),
        ]),
        Line::from(vec![
            Span::styled("  Serial: ", label),
            Span::raw(voter.unique_serial().unwrap_or_else(|| "unplaced".into())),
        ]),
        Line::from(""),
        field(
            "Name",
            voter.name.clone().unwrap_or_else(|| "-".into()),
            voter.quality_of("name").as_str(),
        ),
        field(
            "Age",
            voter.age.map(|a| a.to_string()).unwrap_or_else(|| "-".into()),
            voter.quality_of("age").as_str(),
        ),
        field(
            "Gender",
            voter.gender.map(|g| g.as_str().to_string()).unwrap_or_else(|| "-".into()),
            voter.quality_of("gender").as_str(),
        ),
        field(
            "Relation",
            format!(
                "{} {}",
                voter
                    .relation_role
                    .map(|r| r.as_str())
                    .unwrap_or("-"),
                voter.relation_name.as_deref().unwrap_or(""),
            ),
            voter.quality_of("relation").as_str(),
        ),
        field(
            "House",
            voter.house_number.clone().unwrap_or_else(|| "-".into()),
            voter.quality_of("house_number").as_str(),
        ),
        Line::from(""),
        Line::from("  ─────────────────────────────────────"),
        Line::from(""),
        Line::from(Span::styled(
            "  PROVENANCE",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Batches: ", label),
            Span::styled(
                voter.provenance.join(", "),
                Style::default().fg(Color::Green),
            ),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            "  Press Enter to close",
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        )),
    ];

    let panel = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Voter Detail "),
    );
    f.render_widget(panel, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &mut App) {
    let len = app.active_len();
    let selected = app.active_state().selected().map(|i| i + 1).unwrap_or(0);

    let mut spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected, len),
        Style::default().fg(Color::Cyan),
    )];

    if app.current_page == Page::Conflicts {
        if let ConflictFilter::Kind(kind) = app.filter {
            spans.push(Span::raw(" | "));
            spans.push(Span::styled(
                format!("Filter: {}", kind),
                Style::default().fg(Color::Green),
            ));
            spans.push(Span::raw(" ("));
            spans.push(Span::styled("c", Style::default().fg(Color::Yellow)));
            spans.push(Span::raw(" clear)"));
        } else {
            spans.push(Span::raw(" | "));
            spans.push(Span::styled("1-4", Style::default().fg(Color::Yellow)));
            spans.push(Span::raw(" filter kind"));
        }
    }

    spans.push(Span::raw(" | "));
    spans.push(Span::styled("Enter", Style::default().fg(Color::Yellow)));
    spans.push(Span::raw(" Details | "));
    spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
    spans.push(Span::raw(" Page | "));
    spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
    spans.push(Span::raw(" Nav | "));
    spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );
    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
