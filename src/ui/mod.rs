//! Terminal console for reviewers: dashboard numbers and the review queue.

pub mod review;

use std::io;

use anyhow::Result;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
};
use tui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};

use crate::auth::Caller;
use crate::db::Database;
use crate::onboarding::OnboardingEvent;
use crate::permissions;
use review::{handle_input, render_review, ReviewAction, ReviewState};

const QUEUE_LIMIT: i64 = 50;

async fn load_stats(db: &Database, caller: &Caller) -> Result<crate::db::DashboardStats> {
    let scope = caller.profile_scope(permissions::DASHBOARD_READ)?;
    Ok(db.dashboard_stats(scope.as_deref(), QUEUE_LIMIT).await?)
}

/// Runs the console until the reviewer quits.
pub async fn run_dashboard(db: Database, caller: Caller) -> Result<()> {
    let mut state = ReviewState::new(load_stats(&db, &caller).await?);

    // Setup terminal
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &db, &caller, &mut state).await;

    // Restore terminal
    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    result
}

async fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    db: &Database,
    caller: &Caller,
    state: &mut ReviewState,
) -> Result<()> {
    loop {
        terminal.draw(|f| render_review(f, state))?;

        let Some(action) = handle_input(state)? else {
            continue;
        };
        let (id, event) = match action {
            ReviewAction::Quit => break,
            ReviewAction::Refresh => {
                state.replace_stats(load_stats(db, caller).await?);
                continue;
            }
            ReviewAction::Approve(id) => (id, OnboardingEvent::Approve),
            ReviewAction::Reject(id, reason) => (id, OnboardingEvent::Reject { reason }),
            ReviewAction::RequestChanges(id, reason) => (id, OnboardingEvent::RequestChanges { reason }),
        };

        // decisions are checked the same way the API checks them
        let outcome = match db.get_client(id).await {
            Ok(client) => match event.required_permission() {
                Some(permission) => caller.require(permission, Some(client.profile_id)),
                None => Ok(()),
            },
            Err(e) => Err(e),
        };
        let outcome = match outcome {
            Ok(()) => db.transition_client(id, None, &event, Some(caller.id())).await.map(|(client, _)| client),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(client) => {
                tracing::info!(client_id = id, event = event.name(), "review decision recorded");
                state.replace_stats(load_stats(db, caller).await?);
                state.set_message(format!("{}: {}", client.name, client.approval_status));
            }
            Err(e) => state.set_message(format!("Error: {e}")),
        }
    }

    Ok(())
}
