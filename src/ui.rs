use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use dotacao_form::{format_date, parse_date, Feedback, FlowState, RemoteLedger, Session, SheetsBackend};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame, Terminal,
};
use std::io;
use tokio::runtime::Runtime;

/// Brand green of the submit button
const SUBMIT_COLOR: Color = Color::Rgb(0x00, 0x51, 0x3F);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Unit,
    BudgetLine,
    SequentialCode,
    Amount,
    Date,
    Submit,
}

impl Focus {
    const ORDER: [Focus; 6] = [
        Focus::Unit,
        Focus::BudgetLine,
        Focus::SequentialCode,
        Focus::Amount,
        Focus::Date,
        Focus::Submit,
    ];

    /// Whether the control is shown in `state`
    pub fn is_active(&self, state: FlowState) -> bool {
        match self {
            Focus::Unit => true,
            Focus::BudgetLine => state != FlowState::NoUnit,
            _ => state == FlowState::BudgetLineChosen,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Focus::Unit => " Selecione o Órgão ",
            Focus::BudgetLine => " Selecione a Dotação ",
            Focus::SequentialCode => " Selecione o Sequencial ",
            Focus::Amount => " Digite o valor (R$) - ex: 1.000,00 ",
            Focus::Date => " Data da Disponibilização (DD/MM/AAAA) ",
            Focus::Submit => "",
        }
    }
}

pub struct App {
    pub session: Session,
    pub focus: Focus,
    pub date_text: String,
    pub spreadsheet_title: String,
}

impl App {
    pub fn new(session: Session, spreadsheet_title: &str) -> Self {
        let date_text = session.date().map(format_date).unwrap_or_default();

        Self {
            session,
            focus: Focus::Unit,
            date_text,
            spreadsheet_title: spreadsheet_title.to_string(),
        }
    }

    /// Submit is reachable only once all three picks are made
    pub fn is_active(&self, control: Focus) -> bool {
        match control {
            Focus::Submit => self.session.selection().is_complete(),
            other => other.is_active(self.session.state()),
        }
    }

    fn active_controls(&self) -> Vec<Focus> {
        Focus::ORDER
            .iter()
            .copied()
            .filter(|f| self.is_active(*f))
            .collect()
    }

    pub fn next_focus(&mut self) {
        let controls = self.active_controls();
        let i = controls.iter().position(|f| *f == self.focus).unwrap_or(0);
        self.focus = controls[(i + 1) % controls.len()];
    }

    pub fn previous_focus(&mut self) {
        let controls = self.active_controls();
        let i = controls.iter().position(|f| *f == self.focus).unwrap_or(0);
        self.focus = controls[(i + controls.len() - 1) % controls.len()];
    }

    /// Keep focus on a visible control after the state moved backwards
    fn clamp_focus(&mut self) {
        if !self.is_active(self.focus) {
            self.focus = Focus::Unit;
        }
    }

    /// Step through the focused selector's options; the blank entry comes first.
    pub fn cycle_option(&mut self, forward: bool) {
        let result = match self.focus {
            Focus::Unit => {
                let options = with_blank(self.session.unit_options());
                let current = self.session.selection().unit().unwrap_or("").to_string();
                let pick = step(&options, &current, forward);
                self.session.select_unit(&pick)
            }
            Focus::BudgetLine => {
                let options = with_blank(self.session.budget_line_options());
                let current = self.session.selection().budget_line().unwrap_or("").to_string();
                let pick = step(&options, &current, forward);
                self.session.select_budget_line(&pick)
            }
            Focus::SequentialCode => {
                let options: Vec<Option<i64>> = std::iter::once(None)
                    .chain(self.session.sequential_code_options().into_iter().map(Some))
                    .collect();
                let current = self.session.selection().sequential_code();
                let pick = step(&options, &current, forward);
                self.session.select_sequential_code(pick)
            }
            _ => Ok(()),
        };

        // Options come from the session itself, so a rejection is a bug; keep the old pick
        if let Err(e) = result {
            tracing::warn!(error = %e, "selector rejected its own option");
        }
        self.clamp_focus();
    }

    pub fn type_char(&mut self, c: char) {
        match self.focus {
            Focus::Amount => {
                let mut text = self.session.amount_text().to_string();
                text.push(c);
                self.session.set_amount_text(&text);
            }
            Focus::Date => {
                self.date_text.push(c);
                self.sync_date();
            }
            _ => {}
        }
    }

    pub fn backspace(&mut self) {
        match self.focus {
            Focus::Amount => {
                let mut text = self.session.amount_text().to_string();
                text.pop();
                self.session.set_amount_text(&text);
            }
            Focus::Date => {
                self.date_text.pop();
                self.sync_date();
            }
            _ => {}
        }
    }

    fn sync_date(&mut self) {
        self.session.set_date(parse_date(&self.date_text).ok());
    }

    fn is_text_field(&self) -> bool {
        matches!(self.focus, Focus::Amount | Focus::Date)
    }
}

fn with_blank(options: Vec<String>) -> Vec<String> {
    std::iter::once(String::new()).chain(options).collect()
}

fn step<T: PartialEq + Clone>(options: &[T], current: &T, forward: bool) -> T {
    let len = options.len();
    let i = options.iter().position(|o| o == current).unwrap_or(0);
    let next = if forward { (i + 1) % len } else { (i + len - 1) % len };
    options[next].clone()
}

pub fn run_ui<B: SheetsBackend + ?Sized>(
    app: &mut App,
    ledger: &RemoteLedger<B>,
    runtime: &Runtime,
) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app, ledger, runtime);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<T: ratatui::backend::Backend, B: SheetsBackend + ?Sized>(
    terminal: &mut Terminal<T>,
    app: &mut App,
    ledger: &RemoteLedger<B>,
    runtime: &Runtime,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Esc => return Ok(()),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Ok(())
                }
                KeyCode::Char('q') if !app.is_text_field() => return Ok(()),
                KeyCode::Tab => app.next_focus(),
                KeyCode::BackTab => app.previous_focus(),
                KeyCode::Down => app.cycle_option(true),
                KeyCode::Up => app.cycle_option(false),
                KeyCode::Enter => {
                    if app.focus == Focus::Submit {
                        // One interaction at a time: the append completes before the next key
                        runtime.block_on(app.session.submit(ledger));
                    } else {
                        app.next_focus();
                    }
                }
                KeyCode::Backspace => app.backspace(),
                KeyCode::Char(c) => app.type_char(c),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(3), // Unit
            Constraint::Length(3), // Budget line
            Constraint::Length(3), // Sequential code
            Constraint::Length(3), // Amount
            Constraint::Length(3), // Date
            Constraint::Length(3), // Submit
            Constraint::Min(3),    // Feedback
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    let selection = app.session.selection();
    render_selector(
        f,
        chunks[1],
        app,
        Focus::Unit,
        selection.unit().map(str::to_string),
        app.session.unit_options().len(),
    );
    render_selector(
        f,
        chunks[2],
        app,
        Focus::BudgetLine,
        selection.budget_line().map(str::to_string),
        app.session.budget_line_options().len(),
    );
    render_selector(
        f,
        chunks[3],
        app,
        Focus::SequentialCode,
        selection.sequential_code().map(|c| c.to_string()),
        app.session.sequential_code_options().len(),
    );
    render_text_field(f, chunks[4], app, Focus::Amount, app.session.amount_text());
    render_text_field(f, chunks[5], app, Focus::Date, &app.date_text);
    render_submit(f, chunks[6], app);
    render_feedback(f, chunks[7], app);
    render_status_bar(f, chunks[8], app);
}

fn control_block(app: &App, control: Focus) -> Block<'static> {
    let border = if app.focus == control {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::White)
    };

    Block::default()
        .borders(Borders::ALL)
        .border_style(border)
        .title(control.title().to_string())
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "Disponibilização de Dotação",
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("Planilha: {}", app.spreadsheet_title),
            Style::default().fg(Color::Green),
        ),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(header, area);
}

fn render_selector(
    f: &mut Frame,
    area: Rect,
    app: &App,
    control: Focus,
    value: Option<String>,
    option_count: usize,
) {
    if !app.is_active(control) {
        f.render_widget(Paragraph::new("").block(Block::default()), area);
        return;
    }

    let value_span = match value {
        Some(v) => Span::styled(v, Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        None => Span::styled("—", Style::default().fg(Color::DarkGray)),
    };

    let line = Line::from(vec![
        Span::styled(" ◀ ", Style::default().fg(Color::Yellow)),
        value_span,
        Span::styled(" ▶ ", Style::default().fg(Color::Yellow)),
        Span::styled(
            format!("  ({} opções)", option_count),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ),
    ]);

    f.render_widget(Paragraph::new(line).block(control_block(app, control)), area);
}

fn render_text_field(f: &mut Frame, area: Rect, app: &App, control: Focus, text: &str) {
    if !app.is_active(control) {
        f.render_widget(Paragraph::new("").block(Block::default()), area);
        return;
    }

    let mut spans = vec![Span::raw(format!(" {}", text))];
    if app.focus == control {
        spans.push(Span::styled("▏", Style::default().fg(Color::Yellow)));
    }

    f.render_widget(
        Paragraph::new(Line::from(spans)).block(control_block(app, control)),
        area,
    );
}

fn render_submit(f: &mut Frame, area: Rect, app: &App) {
    if !app.is_active(Focus::Submit) {
        f.render_widget(Paragraph::new("").block(Block::default()), area);
        return;
    }

    let style = if app.focus == Focus::Submit {
        Style::default()
            .bg(SUBMIT_COLOR)
            .fg(Color::White)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().bg(SUBMIT_COLOR).fg(Color::Gray)
    };

    let button = Paragraph::new(Line::from(Span::styled("  ENVIAR PARA SMO  ", style)))
        .alignment(ratatui::layout::Alignment::Center)
        .block(control_block(app, Focus::Submit));

    f.render_widget(button, area);
}

fn render_feedback(f: &mut Frame, area: Rect, app: &App) {
    let (text, color) = match app.session.feedback() {
        Some(Feedback::Success(m)) => (m.as_str(), Color::Green),
        Some(Feedback::Error(m)) => (m.as_str(), Color::Red),
        Some(Feedback::Warning(m)) => (m.as_str(), Color::Yellow),
        None => ("", Color::White),
    };

    let paragraph = Paragraph::new(text)
        .style(Style::default().fg(color))
        .wrap(ratatui::widgets::Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color)),
        );

    f.render_widget(paragraph, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, _app: &App) {
    let status_spans = vec![
        Span::styled(" Tab", Style::default().fg(Color::Yellow)),
        Span::raw(" Campo | "),
        Span::styled("↑/↓", Style::default().fg(Color::Yellow)),
        Span::raw(" Opção | "),
        Span::styled("Enter", Style::default().fg(Color::Yellow)),
        Span::raw(" Enviar | "),
        Span::styled("Esc", Style::default().fg(Color::Red)),
        Span::raw(" Sair"),
    ];

    let status_bar = Paragraph::new(Line::from(status_spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use dotacao_form::{AmountFormat, ReferenceRow, ReferenceTable};
    use std::sync::Arc;

    fn app() -> App {
        let table = Arc::new(ReferenceTable::from_rows(vec![
            ReferenceRow::new("SEDUC", "12.361.0001", 1),
            ReferenceRow::new("SESAU", "10.301.0002", 2),
        ]));
        let session = Session::new(
            table,
            AmountFormat::default(),
            NaiveDate::from_ymd_opt(2024, 5, 20).unwrap(),
        );
        App::new(session, "Controle")
    }

    #[test]
    fn test_focus_only_visits_active_controls() {
        let mut app = app();
        app.next_focus();
        assert_eq!(app.focus, Focus::Unit);

        app.cycle_option(true);
        assert_eq!(app.session.selection().unit(), Some("SEDUC"));
        app.next_focus();
        assert_eq!(app.focus, Focus::BudgetLine);
    }

    #[test]
    fn test_cycle_wraps_through_blank() {
        let mut app = app();
        app.cycle_option(false);
        assert_eq!(app.session.selection().unit(), Some("SESAU"));
        app.cycle_option(true);
        assert_eq!(app.session.selection().unit(), None);
    }

    #[test]
    fn test_clearing_unit_pulls_focus_back() {
        let mut app = app();
        app.cycle_option(true);
        app.focus = Focus::BudgetLine;
        app.cycle_option(true);
        assert_eq!(app.session.state(), FlowState::BudgetLineChosen);

        app.focus = Focus::Unit;
        app.cycle_option(true); // SEDUC -> SESAU
        assert_eq!(app.session.selection().budget_line(), None);
        app.focus = Focus::Amount;
        app.clamp_focus();
        assert_eq!(app.focus, Focus::Unit);
    }

    #[test]
    fn test_submit_needs_sequential_code() {
        let mut app = app();
        app.cycle_option(true);
        app.focus = Focus::BudgetLine;
        app.cycle_option(true);
        assert_eq!(app.session.state(), FlowState::BudgetLineChosen);
        assert!(!app.is_active(Focus::Submit));

        app.focus = Focus::SequentialCode;
        app.cycle_option(true);
        assert_eq!(app.session.selection().sequential_code(), Some(1));
        assert!(app.is_active(Focus::Submit));

        app.focus = Focus::Date;
        app.next_focus();
        assert_eq!(app.focus, Focus::Submit);
    }

    #[test]
    fn test_typing_date_updates_session() {
        let mut app = app();
        assert_eq!(app.date_text, "20/05/2024");

        app.focus = Focus::Date;
        for _ in 0..4 {
            app.backspace();
        }
        assert_eq!(app.date_text, "20/05/");
        assert_eq!(app.session.date(), None);

        for c in "2025".chars() {
            app.type_char(c);
        }
        assert_eq!(app.session.date(), NaiveDate::from_ymd_opt(2025, 5, 20));
    }
}
