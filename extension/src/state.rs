use tokio_util::sync::CancellationToken;

use crate::content::SelectionSnapshot;
use crate::tone::Tone;

/// State owned by one popup open, from open until accept or cancel.
pub struct PopupSession {
    pub snapshot: SelectionSnapshot,
    pub generation: u64,
    pub cancel: CancellationToken,
}

/// Identifies one in-flight rewrite so its outcome can be matched to the
/// popup open that requested it. `cancel` fires when that popup closes.
#[derive(Debug, Clone)]
pub struct RewriteTicket {
    pub generation: u64,
    pub text: String,
    pub tone: Tone,
    pub cancel: CancellationToken,
}

#[derive(Default)]
pub struct SessionState {
    current: Option<PopupSession>,
    next_generation: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a session for `snapshot`, cancelling any previous one.
    pub fn start(&mut self, snapshot: SelectionSnapshot) -> u64 {
        self.end();
        self.next_generation += 1;
        let generation = self.next_generation;
        self.current = Some(PopupSession {
            snapshot,
            generation,
            cancel: CancellationToken::new(),
        });
        generation
    }

    pub fn current(&self) -> Option<&PopupSession> {
        self.current.as_ref()
    }

    pub fn ticket(&self, tone: Tone) -> Option<RewriteTicket> {
        let session = self.current.as_ref()?;
        Some(RewriteTicket {
            generation: session.generation,
            text: session.snapshot.text.clone(),
            tone,
            cancel: session.cancel.clone(),
        })
    }

    /// Whether the ticket belongs to the popup open that is still showing.
    pub fn is_current(&self, ticket: &RewriteTicket) -> bool {
        self.current
            .as_ref()
            .is_some_and(|session| session.generation == ticket.generation)
    }

    pub fn end(&mut self) -> Option<PopupSession> {
        let session = self.current.take()?;
        session.cancel.cancel();
        Some(session)
    }
}
