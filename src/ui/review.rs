use anyhow::Result;
use crossterm::event::{self, Event, KeyCode};
use tui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Span, Spans},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};

use crate::db::{CountByStatus, DashboardStats};
use crate::models::ClientSummary;

/// Which decision the reason popup is collecting a reason for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonFor {
    Reject,
    RequestChanges,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewAction {
    Quit,
    Refresh,
    Approve(i32),
    Reject(i32, String),
    RequestChanges(i32, String),
}

// State of the review queue screen
pub struct ReviewState {
    stats: DashboardStats,
    list_state: ListState,
    reason: Option<(ReasonFor, String)>,
    message: Option<String>,
}

impl ReviewState {
    pub fn new(stats: DashboardStats) -> Self {
        let mut list_state = ListState::default();
        if !stats.review_queue.is_empty() {
            list_state.select(Some(0));
        }

        Self {
            stats,
            list_state,
            reason: None,
            message: None,
        }
    }

    /// Swaps in fresh numbers, keeping the selection where possible.
    pub fn replace_stats(&mut self, stats: DashboardStats) {
        let len = stats.review_queue.len();
        self.stats = stats;
        let selected = match (self.list_state.selected(), len) {
            (_, 0) => None,
            (Some(i), len) => Some(i.min(len - 1)),
            (None, _) => Some(0),
        };
        self.list_state.select(selected);
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    fn queue(&self) -> &[ClientSummary] {
        &self.stats.review_queue
    }

    pub fn next(&mut self) {
        if self.queue().is_empty() {
            return;
        }

        let i = match self.list_state.selected() {
            Some(i) if i + 1 < self.queue().len() => i + 1,
            _ => 0,
        };
        self.list_state.select(Some(i));
    }

    pub fn previous(&mut self) {
        if self.queue().is_empty() {
            return;
        }

        let i = match self.list_state.selected() {
            Some(0) | None => self.queue().len() - 1,
            Some(i) => i - 1,
        };
        self.list_state.select(Some(i));
    }

    pub fn selected_client(&self) -> Option<&ClientSummary> {
        self.list_state.selected().and_then(|i| self.queue().get(i))
    }

    pub fn selected_client_id(&self) -> Option<i32> {
        self.selected_client().map(|c| c.id)
    }

    /// Handles one key press.
    pub fn handle_key(&mut self, code: KeyCode) -> Option<ReviewAction> {
        if let Some((purpose, text)) = &mut self.reason {
            match code {
                KeyCode::Esc => self.reason = None,
                KeyCode::Backspace => {
                    text.pop();
                }
                KeyCode::Char(c) => text.push(c),
                KeyCode::Enter => {
                    let reason = text.trim().to_string();
                    if reason.is_empty() {
                        self.message = Some("A reason is required".into());
                        return None;
                    }
                    let purpose = *purpose;
                    self.reason = None;
                    let id = self.selected_client_id()?;
                    return Some(match purpose {
                        ReasonFor::Reject => ReviewAction::Reject(id, reason),
                        ReasonFor::RequestChanges => ReviewAction::RequestChanges(id, reason),
                    });
                }
                _ => {}
            }
            return None;
        }

        self.message = None;
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return Some(ReviewAction::Quit),
            KeyCode::Char('r') => return Some(ReviewAction::Refresh),
            KeyCode::Char('a') => return self.selected_client_id().map(ReviewAction::Approve),
            KeyCode::Char('x') if self.selected_client().is_some() => {
                self.reason = Some((ReasonFor::Reject, String::new()));
            }
            KeyCode::Char('c') if self.selected_client().is_some() => {
                self.reason = Some((ReasonFor::RequestChanges, String::new()));
            }
            KeyCode::Down => self.next(),
            KeyCode::Up => self.previous(),
            _ => {}
        }
        None
    }
}

fn count_line(title: &str, counts: &[CountByStatus]) -> Spans<'static> {
    let mut spans = vec![Span::styled(
        format!("{title}: "),
        Style::default().add_modifier(Modifier::BOLD),
    )];
    for c in counts {
        spans.push(Span::raw(format!("{} {}  ", c.status, c.count)));
    }
    Spans::from(spans)
}

pub fn render_review<B: Backend>(frame: &mut Frame<B>, state: &mut ReviewState) {
    let size = frame.size();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(6), Constraint::Min(1), Constraint::Length(3)].as_ref())
        .split(size);

    let invoices: Vec<Span> = state
        .stats
        .invoices_by_status
        .iter()
        .map(|row| Span::raw(format!("{} {} (€ {})  ", row.status, row.count, row.amount.round_dp(2))))
        .collect();
    let summary = Paragraph::new(vec![
        count_line("Onboarding", &state.stats.clients_by_onboarding),
        count_line("Approval", &state.stats.clients_by_approval),
        Spans::from(invoices),
        Spans::from(format!("Outstanding: € {}", state.stats.outstanding.round_dp(2))),
    ])
    .block(Block::default().title("Overview").borders(Borders::ALL));
    frame.render_widget(summary, chunks[0]);

    let items: Vec<ListItem> = state
        .queue()
        .iter()
        .map(|client| {
            ListItem::new(Spans::from(vec![
                Span::raw(format!("{:<32}", client.name)),
                Span::raw(format!(" KvK {:<10}", client.kvk_number.as_deref().unwrap_or("-"))),
                Span::raw(format!(" BTW {:<16}", client.vat_id.as_deref().unwrap_or("-"))),
                Span::raw(format!(" {}", client.updated_at.format("%d-%m-%Y %H:%M"))),
            ]))
        })
        .collect();

    let queue = List::new(items)
        .block(Block::default().title("Awaiting review").borders(Borders::ALL))
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        );
    frame.render_stateful_widget(queue, chunks[1], &mut state.list_state);

    let footer = match (&state.message, state.selected_client()) {
        (Some(message), _) => message.clone(),
        (None, Some(_)) => "<A> Approve | <X> Reject | <C> Request changes | <R> Refresh | <Q> Quit".to_string(),
        (None, None) => "<R> Refresh | <Q> Quit".to_string(),
    };
    let buttons = Paragraph::new(footer)
        .block(Block::default().borders(Borders::TOP))
        .style(Style::default().fg(Color::White));
    frame.render_widget(buttons, chunks[2]);

    if let Some((purpose, text)) = &state.reason {
        render_reason_popup(frame, size, *purpose, text);
    }
}

fn render_reason_popup<B: Backend>(frame: &mut Frame<B>, size: Rect, purpose: ReasonFor, text: &str) {
    let popup_area = centered_rect(60, 20, size);
    let title = match purpose {
        ReasonFor::Reject => "Reason for rejection",
        ReasonFor::RequestChanges => "Changes requested",
    };

    let popup = Paragraph::new(vec![
        Spans::from(""),
        Spans::from(format!("{text}_")),
        Spans::from(""),
        Spans::from("<Enter> Confirm  <Esc> Cancel"),
    ])
    .block(Block::default().title(title).borders(Borders::ALL))
    .style(Style::default().fg(Color::White).bg(Color::Black));

    frame.render_widget(popup, popup_area);
}

// Helper function to create a centered rect
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

pub fn handle_input(state: &mut ReviewState) -> Result<Option<ReviewAction>> {
    if let Event::Key(key) = event::read()? {
        return Ok(state.handle_key(key.code));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::models::{ApprovalStatus, OnboardingStatus};

    fn summary(id: i32, name: &str) -> ClientSummary {
        ClientSummary {
            id,
            profile_id: 1,
            name: name.into(),
            kvk_number: Some("69241327".into()),
            vat_id: None,
            onboarding_status: OnboardingStatus::AdminReview,
            approval_status: ApprovalStatus::Pending,
            version: 3,
            updated_at: Utc::now(),
        }
    }

    fn state(queue: Vec<ClientSummary>) -> ReviewState {
        ReviewState::new(DashboardStats {
            clients_by_onboarding: vec![],
            clients_by_approval: vec![],
            review_queue: queue,
            invoices_by_status: vec![],
            outstanding: Decimal::ZERO,
        })
    }

    fn type_text(state: &mut ReviewState, text: &str) {
        for c in text.chars() {
            assert_eq!(state.handle_key(KeyCode::Char(c)), None);
        }
    }

    #[test]
    fn navigation_wraps() {
        let mut s = state(vec![summary(1, "Bakkerij"), summary(2, "Slagerij")]);
        assert_eq!(s.selected_client_id(), Some(1));
        s.handle_key(KeyCode::Up);
        assert_eq!(s.selected_client_id(), Some(2));
        s.handle_key(KeyCode::Down);
        assert_eq!(s.selected_client_id(), Some(1));
    }

    #[test]
    fn approve_targets_selection() {
        let mut s = state(vec![summary(1, "Bakkerij"), summary(2, "Slagerij")]);
        s.handle_key(KeyCode::Down);
        assert_eq!(s.handle_key(KeyCode::Char('a')), Some(ReviewAction::Approve(2)));
    }

    #[test]
    fn empty_queue_has_nothing_to_decide() {
        let mut s = state(vec![]);
        assert_eq!(s.handle_key(KeyCode::Char('a')), None);
        assert_eq!(s.handle_key(KeyCode::Char('x')), None);
        assert_eq!(s.handle_key(KeyCode::Char('q')), Some(ReviewAction::Quit));
    }

    #[test]
    fn reject_collects_a_reason() {
        let mut s = state(vec![summary(4, "Bakkerij")]);
        assert_eq!(s.handle_key(KeyCode::Char('x')), None);
        // keys go to the popup now, 'q' does not quit
        type_text(&mut s, "kvq");
        s.handle_key(KeyCode::Backspace);
        s.handle_key(KeyCode::Backspace);
        type_text(&mut s, " onbekend");
        assert_eq!(
            s.handle_key(KeyCode::Enter),
            Some(ReviewAction::Reject(4, "k onbekend".into()))
        );
    }

    #[test]
    fn blank_reason_is_refused() {
        let mut s = state(vec![summary(4, "Bakkerij")]);
        s.handle_key(KeyCode::Char('c'));
        type_text(&mut s, "  ");
        assert_eq!(s.handle_key(KeyCode::Enter), None);
        s.handle_key(KeyCode::Esc);
        assert_eq!(s.handle_key(KeyCode::Char('r')), Some(ReviewAction::Refresh));
    }

    #[test]
    fn refresh_keeps_selection_in_range() {
        let mut s = state(vec![summary(1, "A"), summary(2, "B"), summary(3, "C")]);
        s.handle_key(KeyCode::Up);
        assert_eq!(s.selected_client_id(), Some(3));
        let mut fewer = state(vec![summary(1, "A")]).stats;
        fewer.review_queue = vec![summary(1, "A")];
        s.replace_stats(fewer);
        assert_eq!(s.selected_client_id(), Some(1));
    }
}
