//! Per-chat sessions cached in memory over the durable [`DraftStore`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use clank_proto::TokenDraft;
use tracing::{debug, info};

use crate::draft_store::{DraftStore, StoreError};

/// Where a chat is in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversationState {
    Idle,
    Collecting,
    Confirming,
    WizardName,
    WizardSymbol,
    WizardFees,
    WizardImage,
    WizardContext,
    MenuName,
    MenuSymbol,
    MenuFees,
    MenuContext,
    MenuImage,
    MenuSpoof,
    MenuProfileSave,
    MenuProfileLoad,
    MenuProfileDelete,
}

impl ConversationState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Collecting => "collecting",
            Self::Confirming => "confirming",
            Self::WizardName => "wizard_name",
            Self::WizardSymbol => "wizard_symbol",
            Self::WizardFees => "wizard_fees",
            Self::WizardImage => "wizard_image",
            Self::WizardContext => "wizard_context",
            Self::MenuName => "menu_name",
            Self::MenuSymbol => "menu_symbol",
            Self::MenuFees => "menu_fees",
            Self::MenuContext => "menu_context",
            Self::MenuImage => "menu_image",
            Self::MenuSpoof => "menu_spoof",
            Self::MenuProfileSave => "menu_profile_save",
            Self::MenuProfileLoad => "menu_profile_load",
            Self::MenuProfileDelete => "menu_profile_delete",
        }
    }

    pub fn is_wizard(self) -> bool {
        matches!(
            self,
            Self::WizardName
                | Self::WizardSymbol
                | Self::WizardFees
                | Self::WizardImage
                | Self::WizardContext
        )
    }

    /// The wizard step after this one, or `None` once the wizard is done.
    pub fn next_wizard_step(self) -> Option<Self> {
        match self {
            Self::WizardName => Some(Self::WizardSymbol),
            Self::WizardSymbol => Some(Self::WizardFees),
            Self::WizardFees => Some(Self::WizardImage),
            Self::WizardImage => Some(Self::WizardContext),
            _ => None,
        }
    }

    /// Only the wizard's image step ingests uploads; every other state
    /// deletes them.
    pub fn accepts_upload(self) -> bool {
        self == Self::WizardImage
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a session's draft has been read from durable storage yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hydration {
    Unloaded,
    Loading,
    Loaded,
}

/// Conversational state for one chat.
#[derive(Debug, Clone)]
pub struct Session {
    pub chat_id: i64,
    pub state: ConversationState,
    pub token: TokenDraft,
    pub created_at: DateTime<Utc>,
    is_deploying: bool,
    hydration: Hydration,
    last_active: Instant,
}

impl Session {
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            state: ConversationState::Idle,
            token: TokenDraft::default(),
            created_at: Utc::now(),
            is_deploying: false,
            hydration: Hydration::Unloaded,
            last_active: Instant::now(),
        }
    }

    pub fn hydration(&self) -> Hydration {
        self.hydration
    }

    pub fn is_deploying(&self) -> bool {
        self.is_deploying
    }

    /// Claims the deploy slot. Returns `false` when a deploy is already in flight.
    pub fn begin_deploy(&mut self) -> bool {
        if self.is_deploying {
            return false;
        }
        self.is_deploying = true;
        true
    }

    pub fn finish_deploy(&mut self) {
        self.is_deploying = false;
    }

    fn touch(&mut self) {
        self.last_active = Instant::now();
    }
}

/// In-memory session cache with write-through draft persistence.
#[derive(Debug)]
pub struct SessionStore {
    sessions: HashMap<i64, Session>,
    drafts: DraftStore,
    idle_ttl: Duration,
}

impl SessionStore {
    pub fn new(drafts: DraftStore, idle_ttl: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            drafts,
            idle_ttl,
        }
    }

    /// The session for `chat_id`, created and hydrated on first access.
    pub fn get(&mut self, chat_id: i64) -> &mut Session {
        let drafts = &self.drafts;
        let session = self.sessions.entry(chat_id).or_insert_with(|| Session::new(chat_id));
        if session.hydration == Hydration::Unloaded {
            hydrate(session, drafts);
        }
        session.touch();
        session
    }

    /// Takes the session out of the cache so it can be mutated alongside
    /// the draft store. Pair with [`checkin`](Self::checkin).
    pub fn checkout(&mut self, chat_id: i64) -> Session {
        self.get(chat_id);
        self.sessions
            .remove(&chat_id)
            .unwrap_or_else(|| Session::new(chat_id))
    }

    pub fn checkin(&mut self, mut session: Session) {
        session.touch();
        self.sessions.insert(session.chat_id, session);
    }

    /// A fresh `collecting` session for `chat_id`, replacing whatever was cached.
    ///
    /// The durable draft is cleared unless `keep_draft` is set, in which case
    /// the fresh session starts from it.
    pub fn fresh_session(&mut self, chat_id: i64, keep_draft: bool) -> Result<Session, StoreError> {
        self.sessions.remove(&chat_id);
        let mut session = Session::new(chat_id);
        if keep_draft {
            session.token = self.drafts.get_draft(chat_id).unwrap_or_default();
        } else {
            self.drafts.clear_draft(chat_id)?;
        }
        session.hydration = Hydration::Loaded;
        session.state = ConversationState::Collecting;
        debug!(chat_id, keep_draft, "Session reset");
        Ok(session)
    }

    /// Replaces the cached session with a fresh one. See [`fresh_session`](Self::fresh_session).
    pub fn reset(&mut self, chat_id: i64, keep_draft: bool) -> Result<&mut Session, StoreError> {
        let session = self.fresh_session(chat_id, keep_draft)?;
        Ok(self.sessions.entry(chat_id).or_insert(session))
    }

    /// Writes the session's draft through to durable storage.
    ///
    /// Returns `false` when the stored copy was already identical.
    pub fn persist(&mut self, session: &Session) -> Result<bool, StoreError> {
        self.drafts.save_draft(session.chat_id, &session.token)
    }

    /// Drops sessions idle for longer than the TTL. In-flight deploys are kept.
    pub fn evict_idle(&mut self) -> usize {
        let ttl = self.idle_ttl;
        let before = self.sessions.len();
        self.sessions
            .retain(|_, s| s.is_deploying || s.last_active.elapsed() < ttl);
        let evicted = before - self.sessions.len();
        if evicted > 0 {
            info!(evicted, remaining = self.sessions.len(), "Evicted idle sessions");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn drafts(&self) -> &DraftStore {
        &self.drafts
    }

    pub fn drafts_mut(&mut self) -> &mut DraftStore {
        &mut self.drafts
    }
}

fn hydrate(session: &mut Session, drafts: &DraftStore) {
    session.hydration = Hydration::Loading;
    if let Some(draft) = drafts.get_draft(session.chat_id) {
        session.token = draft;
        if session.state == ConversationState::Idle && !session.token.is_blank() {
            session.state = ConversationState::Collecting;
        }
        debug!(chat_id = session.chat_id, "Hydrated draft from store");
    }
    session.hydration = Hydration::Loaded;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp_dir: &TempDir, ttl: Duration) -> SessionStore {
        let drafts = DraftStore::open(temp_dir.path().join("drafts.json")).unwrap();
        SessionStore::new(drafts, ttl)
    }

    fn draft(symbol: &str) -> TokenDraft {
        TokenDraft {
            symbol: Some(symbol.to_string()),
            ..TokenDraft::default()
        }
    }

    #[test]
    fn test_new_chat_starts_idle_and_loaded() {
        let temp_dir = TempDir::new().unwrap();
        let mut sessions = store(&temp_dir, Duration::from_secs(60));

        let session = sessions.get(7);
        assert_eq!(session.state, ConversationState::Idle);
        assert_eq!(session.hydration(), Hydration::Loaded);
        assert!(session.token.is_blank());
    }

    #[test]
    fn test_hydrates_durable_draft_once() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("drafts.json");
        {
            let mut drafts = DraftStore::open(&path).unwrap();
            drafts.save_draft(7, &draft("MCAT")).unwrap();
        }

        let mut sessions = SessionStore::new(DraftStore::open(&path).unwrap(), Duration::from_secs(60));
        let session = sessions.get(7);
        assert_eq!(session.token.symbol.as_deref(), Some("MCAT"));
        assert_eq!(session.state, ConversationState::Collecting);

        // Live edits survive later lookups even though the store still has MCAT.
        session.token.symbol = Some("LIVE".to_string());
        assert_eq!(sessions.get(7).token.symbol.as_deref(), Some("LIVE"));
    }

    #[test]
    fn test_checkout_checkin_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let mut sessions = store(&temp_dir, Duration::from_secs(60));

        let mut session = sessions.checkout(3);
        assert!(sessions.is_empty());
        session.state = ConversationState::WizardName;
        sessions.checkin(session);
        assert_eq!(sessions.get(3).state, ConversationState::WizardName);
    }

    #[test]
    fn test_reset_clears_durable_draft_by_default() {
        let temp_dir = TempDir::new().unwrap();
        let mut sessions = store(&temp_dir, Duration::from_secs(60));
        let session = sessions.checkout(1);
        let mut session = session;
        session.token = draft("MCAT");
        sessions.persist(&session).unwrap();
        sessions.checkin(session);

        let fresh = sessions.reset(1, false).unwrap();
        assert_eq!(fresh.state, ConversationState::Collecting);
        assert!(fresh.token.is_blank());
        assert!(sessions.drafts().get_draft(1).is_none());
    }

    #[test]
    fn test_reset_can_keep_durable_draft() {
        let temp_dir = TempDir::new().unwrap();
        let mut sessions = store(&temp_dir, Duration::from_secs(60));
        sessions.drafts_mut().save_draft(1, &draft("MCAT")).unwrap();

        let fresh = sessions.reset(1, true).unwrap();
        assert_eq!(fresh.token.symbol.as_deref(), Some("MCAT"));
        assert!(sessions.drafts().get_draft(1).is_some());
    }

    #[test]
    fn test_persist_is_write_through() {
        let temp_dir = TempDir::new().unwrap();
        let mut sessions = store(&temp_dir, Duration::from_secs(60));
        let mut session = sessions.checkout(9);
        session.token = draft("MCAT");

        assert!(sessions.persist(&session).unwrap());
        assert!(!sessions.persist(&session).unwrap());
        assert_eq!(sessions.drafts().disk_writes(), 1);
    }

    #[test]
    fn test_evict_idle_keeps_deploying_sessions() {
        let temp_dir = TempDir::new().unwrap();
        let mut sessions = store(&temp_dir, Duration::ZERO);
        sessions.get(1);
        assert!(sessions.get(2).begin_deploy());

        assert_eq!(sessions.evict_idle(), 1);
        assert_eq!(sessions.len(), 1);
        assert!(sessions.get(2).is_deploying());
    }

    #[test]
    fn test_deploy_flag_is_exclusive() {
        let mut session = Session::new(1);
        assert!(session.begin_deploy());
        assert!(!session.begin_deploy());
        session.finish_deploy();
        assert!(session.begin_deploy());
    }

    #[test]
    fn test_wizard_order() {
        let mut step = ConversationState::WizardName;
        let mut seen = vec![step.as_str()];
        while let Some(next) = step.next_wizard_step() {
            seen.push(next.as_str());
            step = next;
        }
        assert_eq!(
            seen,
            ["wizard_name", "wizard_symbol", "wizard_fees", "wizard_image", "wizard_context"]
        );
    }
}
