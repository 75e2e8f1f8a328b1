//! The conversation state machine.
//!
//! [`Conversation::handle`] interprets one inbound event for one chat against
//! that chat's [`Session`] and returns the actions to deliver. Dispatch order:
//!
//! 1. Commands (`/start`, `/wizard`, `/deploy`, ...) work in every state.
//! 2. Link extraction: any text carrying a post/cast URL or social links is
//!    merged into the draft and the session returns to `collecting`.
//! 3. The current state's own input rules.
//!
//! Every draft mutation is written through to the [`DraftStore`] before the
//! turn returns.
//!
//! [`DraftStore`]: crate::draft_store::DraftStore

mod readiness;
pub mod render;

pub use readiness::{ReadyStatus, get_ready_status};

use std::sync::Arc;

use clank_proto::{
    ExtractedLinks, FileResolver, ImageUploader, InboundEvent, Keyboard, LinkExtractor,
    OutboundAction, TokenDeployer,
};
use tracing::{debug, info, warn};

use crate::deploy_config::{create_config_from_session, validate_config};
use crate::draft_store::StoreError;
use crate::parse::{
    FieldUpdate, InputError, parse_fees, parse_field_lines, parse_image_ref, parse_name,
    parse_preset_name, parse_spoof, parse_symbol,
};
use crate::session::{ConversationState, Session, SessionStore};

use render::{CONFIRM_NO, CONFIRM_YES, MENU_PREFIX, PRESET_DELETE_PREFIX, PRESET_LOAD_PREFIX, WIZARD_START};

const YES_WORDS: &[&str] = &["yes", "y", "deploy", "go", "confirm", "/confirm"];
const NO_WORDS: &[&str] = &["no", "n", "cancel", "/cancel"];
const SKIP: &str = "/skip";

/// What one event produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Turn {
    pub actions: Vec<OutboundAction>,
    /// `false` when no rule claimed the input; the caller may answer with a
    /// generic hint.
    pub handled: bool,
}

impl Turn {
    fn say(&mut self, text: impl Into<String>) {
        self.actions.push(OutboundAction::send(text));
        self.handled = true;
    }

    fn say_with(&mut self, text: impl Into<String>, keyboard: Keyboard) {
        self.actions.push(OutboundAction::buttons(text, keyboard));
        self.handled = true;
    }
}

/// Drives every chat's conversation.
pub struct Conversation {
    sessions: SessionStore,
    links: Box<dyn LinkExtractor>,
    deployer: Option<Arc<dyn TokenDeployer>>,
    uploader: Option<Arc<dyn ImageUploader>>,
    files: Option<Arc<dyn FileResolver>>,
    deployer_address: Option<String>,
}

impl Conversation {
    pub fn new(sessions: SessionStore, links: Box<dyn LinkExtractor>) -> Self {
        Self {
            sessions,
            links,
            deployer: None,
            uploader: None,
            files: None,
            deployer_address: None,
        }
    }

    #[must_use]
    pub fn with_deployer(mut self, deployer: Arc<dyn TokenDeployer>) -> Self {
        self.deployer = Some(deployer);
        self
    }

    #[must_use]
    pub fn with_uploader(mut self, uploader: Arc<dyn ImageUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    #[must_use]
    pub fn with_file_resolver(mut self, files: Arc<dyn FileResolver>) -> Self {
        self.files = Some(files);
        self
    }

    #[must_use]
    pub fn with_deployer_address(mut self, address: impl Into<String>) -> Self {
        self.deployer_address = Some(address.into());
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn sessions_mut(&mut self) -> &mut SessionStore {
        &mut self.sessions
    }

    /// Processes one event for `chat_id`.
    ///
    /// Only storage failures are errors; bad input is answered in the chat.
    pub async fn handle(&mut self, chat_id: i64, event: InboundEvent) -> Result<Turn, StoreError> {
        let mut session = self.sessions.checkout(chat_id);
        let mut turn = Turn::default();
        let before = session.state;

        let result = self.dispatch(&mut session, event, &mut turn).await;
        if session.state != before {
            debug!(chat_id, from = %before, to = %session.state, "State transition");
        }
        self.sessions.checkin(session);
        result.map(|()| turn)
    }

    async fn dispatch(
        &mut self,
        session: &mut Session,
        event: InboundEvent,
        turn: &mut Turn,
    ) -> Result<(), StoreError> {
        match event {
            InboundEvent::Text { text, .. } => self.on_text(session, text.trim(), turn).await,
            InboundEvent::Button {
                callback_id,
                message_id,
                data,
            } => {
                turn.actions.push(OutboundAction::AnswerButton {
                    callback_id,
                    text: None,
                });
                turn.handled = true;
                self.on_button(session, message_id, &data, turn).await
            }
            InboundEvent::Photo {
                message_id,
                file_id,
            } => self.on_upload(session, message_id, &file_id, turn).await,
            InboundEvent::Document {
                message_id,
                file_id,
                mime_type,
            } => {
                let is_image = mime_type.as_deref().is_some_and(|m| m.starts_with("image/"));
                if is_image {
                    self.on_upload(session, message_id, &file_id, turn).await
                } else {
                    reject_upload(message_id, turn);
                    Ok(())
                }
            }
        }
    }

    async fn on_text(
        &mut self,
        session: &mut Session,
        text: &str,
        turn: &mut Turn,
    ) -> Result<(), StoreError> {
        if text.starts_with('/') && self.on_command(session, text, turn)? {
            return Ok(());
        }

        let links = self.links.extract(text);
        if !links.is_empty() {
            return self.merge_links(session, text, links, turn);
        }

        match session.state {
            ConversationState::Idle | ConversationState::Collecting => {
                self.collect_fields(session, text, turn)
            }
            ConversationState::Confirming => {
                let word = text.to_lowercase();
                if YES_WORDS.contains(&word.as_str()) {
                    self.commit(session, turn).await
                } else if NO_WORDS.contains(&word.as_str()) {
                    abort(session, turn);
                    Ok(())
                } else {
                    // Left to the caller's fallback.
                    Ok(())
                }
            }
            state if state.is_wizard() => self.wizard_step(session, text, turn),
            ConversationState::MenuProfileSave => self.save_preset(session, text, turn),
            ConversationState::MenuProfileLoad => self.load_preset(session, text, turn),
            ConversationState::MenuProfileDelete => self.delete_preset(session, text, turn),
            _ => self.menu_edit(session, text, turn),
        }
    }

    /// Returns `Ok(false)` when the command isn't a global one, so state
    /// handling can interpret it (`/skip`, `/confirm`).
    fn on_command(
        &mut self,
        session: &mut Session,
        text: &str,
        turn: &mut Turn,
    ) -> Result<bool, StoreError> {
        let (command, args) = parse_command(text);
        match command {
            "/start" => {
                session.state = ConversationState::Collecting;
                turn.say_with(render::welcome(), render::field_menu());
            }
            "/help" => turn.say(render::help()),
            "/new" => {
                *session = self.sessions.fresh_session(session.chat_id, false)?;
                turn.say(render::fresh_draft());
            }
            "/wizard" => self.start_wizard(session, turn)?,
            "/cancel" if session.state == ConversationState::Confirming => abort(session, turn),
            "/cancel" => {
                *session = self.sessions.fresh_session(session.chat_id, false)?;
                turn.say(render::cancelled());
            }
            "/status" => {
                let status = get_ready_status(&session.token);
                turn.say(render::status(session.state, &session.token, &status));
            }
            "/menu" => {
                turn.say_with("Which field?", render::field_menu());
            }
            "/deploy" => check_readiness(session, turn),
            "/save" if args.is_empty() => self.enter_menu(session, ConversationState::MenuProfileSave, turn),
            "/save" => self.save_preset(session, args, turn)?,
            "/load" if args.is_empty() => self.enter_menu(session, ConversationState::MenuProfileLoad, turn),
            "/load" => self.load_preset(session, args, turn)?,
            "/delete" if args.is_empty() => {
                self.enter_menu(session, ConversationState::MenuProfileDelete, turn);
            }
            "/delete" => self.delete_preset(session, args, turn)?,
            "/presets" => {
                let presets = self.sessions.drafts().list_presets(session.chat_id);
                turn.say(render::preset_list(&presets));
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    async fn on_button(
        &mut self,
        session: &mut Session,
        message_id: Option<i64>,
        data: &str,
        turn: &mut Turn,
    ) -> Result<(), StoreError> {
        match data {
            CONFIRM_YES if session.state == ConversationState::Confirming => {
                close_confirm_prompt(session, message_id, true, turn);
                self.commit(session, turn).await?;
            }
            CONFIRM_NO if session.state == ConversationState::Confirming => {
                close_confirm_prompt(session, message_id, false, turn);
                abort(session, turn);
            }
            CONFIRM_YES | CONFIRM_NO => turn.say(render::nothing_to_confirm()),
            WIZARD_START => self.start_wizard(session, turn)?,
            _ => {
                if let Some(field) = data.strip_prefix(MENU_PREFIX) {
                    match menu_state(field) {
                        Some(state) => self.enter_menu(session, state, turn),
                        None => debug!(data, "Unknown menu field"),
                    }
                } else if let Some(name) = data.strip_prefix(PRESET_LOAD_PREFIX) {
                    self.load_preset(session, name, turn)?;
                } else if let Some(name) = data.strip_prefix(PRESET_DELETE_PREFIX) {
                    self.delete_preset(session, name, turn)?;
                } else {
                    debug!(data, "Ignoring unknown button");
                }
            }
        }
        Ok(())
    }

    async fn on_upload(
        &mut self,
        session: &mut Session,
        message_id: i64,
        file_id: &str,
        turn: &mut Turn,
    ) -> Result<(), StoreError> {
        if !session.state.accepts_upload() {
            reject_upload(message_id, turn);
            return Ok(());
        }

        let Some(uploader) = self.uploader.clone() else {
            turn.say(render::upload_unavailable());
            return Ok(());
        };
        let url = match &self.files {
            Some(files) => files.file_url(file_id).await,
            None => None,
        };
        let Some(url) = url else {
            turn.say(render::upload_unreadable());
            return Ok(());
        };

        match uploader.upload(&url).await {
            Ok(image) => {
                info!(chat_id = session.chat_id, image = %image, "Uploaded image");
                session.token.image = Some(image);
                self.sessions.persist(session)?;
                turn.say(render::updated("image"));
                advance_wizard(session, turn);
            }
            Err(e) => {
                warn!(chat_id = session.chat_id, error = %e, "Image upload failed");
                turn.say(render::upload_failed(&e.to_string()));
            }
        }
        Ok(())
    }

    fn merge_links(
        &mut self,
        session: &mut Session,
        text: &str,
        links: ExtractedLinks,
        turn: &mut Turn,
    ) -> Result<(), StoreError> {
        let mut count = links.socials.len();
        if let Some(context) = links.context {
            session.token.context = context;
            count += 1;
        }
        session.token.socials.extend(links.socials);

        // Field lines sent alongside the links still count.
        let fields = parse_field_lines(text);
        if let Ok(updates) = &fields {
            for update in updates.iter().cloned() {
                update.apply(&mut session.token);
            }
        }

        session.state = ConversationState::Collecting;
        self.sessions.persist(session)?;
        turn.say(render::links_merged(count));
        if let Err(e) = fields {
            turn.say(render::input_error(&e));
        }
        check_readiness(session, turn);
        Ok(())
    }

    fn collect_fields(
        &mut self,
        session: &mut Session,
        text: &str,
        turn: &mut Turn,
    ) -> Result<(), StoreError> {
        let updates = match parse_field_lines(text) {
            Ok(updates) if updates.is_empty() => return Ok(()),
            Ok(updates) => updates,
            Err(e) => {
                turn.say(render::input_error(&e));
                return Ok(());
            }
        };

        let fields: Vec<&str> = updates.iter().map(FieldUpdate::field_name).collect();
        let summary = render::updated(&fields.join(", "));
        for update in updates {
            update.apply(&mut session.token);
        }
        session.state = ConversationState::Collecting;
        self.sessions.persist(session)?;
        turn.say(summary);
        check_readiness(session, turn);
        Ok(())
    }

    fn start_wizard(&mut self, session: &mut Session, turn: &mut Turn) -> Result<(), StoreError> {
        *session = self.sessions.fresh_session(session.chat_id, true)?;
        session.state = ConversationState::WizardName;
        turn.say(render::wizard_prompt(session.state, &session.token));
        Ok(())
    }

    fn wizard_step(
        &mut self,
        session: &mut Session,
        text: &str,
        turn: &mut Turn,
    ) -> Result<(), StoreError> {
        let skip = text.eq_ignore_ascii_case(SKIP);
        let update = match session.state {
            _ if skip => None,
            ConversationState::WizardName => Some(parse_name(text).map(FieldUpdate::Name)),
            ConversationState::WizardSymbol => Some(parse_symbol(text).map(FieldUpdate::Symbol)),
            ConversationState::WizardFees => Some(parse_fees(text).map(FieldUpdate::Fees)),
            ConversationState::WizardImage => Some(parse_image_ref(text).map(FieldUpdate::Image)),
            // A usable link would have been taken by link extraction.
            _ => Some(Err(InputError::Context)),
        };

        match update {
            Some(Err(e)) => {
                turn.say(render::input_error(&e));
                return Ok(());
            }
            Some(Ok(update)) => {
                update.apply(&mut session.token);
                self.sessions.persist(session)?;
            }
            None if session.state == ConversationState::WizardSymbol
                && session.token.normalized().symbol.is_none() =>
            {
                turn.say(render::input_error(&InputError::Symbol(String::new())));
                return Ok(());
            }
            None => {}
        }

        advance_wizard(session, turn);
        Ok(())
    }

    fn enter_menu(&mut self, session: &mut Session, state: ConversationState, turn: &mut Turn) {
        let prefix = match state {
            ConversationState::MenuProfileLoad => Some(PRESET_LOAD_PREFIX),
            ConversationState::MenuProfileDelete => Some(PRESET_DELETE_PREFIX),
            _ => None,
        };
        if let Some(prefix) = prefix {
            let presets = self.sessions.drafts().list_presets(session.chat_id);
            if presets.is_empty() {
                turn.say(render::preset_list(&presets));
                return;
            }
            session.state = state;
            turn.say_with(render::menu_prompt(state), render::preset_keyboard(&presets, prefix));
            return;
        }
        session.state = state;
        turn.say(render::menu_prompt(state));
    }

    fn menu_edit(
        &mut self,
        session: &mut Session,
        text: &str,
        turn: &mut Turn,
    ) -> Result<(), StoreError> {
        if text.eq_ignore_ascii_case(SKIP) {
            session.state = ConversationState::Collecting;
            check_readiness(session, turn);
            return Ok(());
        }

        let update = match session.state {
            ConversationState::MenuName => parse_name(text).map(FieldUpdate::Name),
            ConversationState::MenuSymbol => parse_symbol(text).map(FieldUpdate::Symbol),
            ConversationState::MenuFees => parse_fees(text).map(FieldUpdate::Fees),
            ConversationState::MenuImage => parse_image_ref(text).map(FieldUpdate::Image),
            ConversationState::MenuSpoof => parse_spoof(text).map(FieldUpdate::SpoofTo),
            _ => Err(InputError::Context),
        };
        let update = match update {
            Ok(update) => update,
            Err(e) => {
                turn.say(render::input_error(&e));
                return Ok(());
            }
        };

        let field = update.field_name();
        update.apply(&mut session.token);
        session.state = ConversationState::Collecting;
        self.sessions.persist(session)?;
        turn.say(render::updated(field));
        check_readiness(session, turn);
        Ok(())
    }

    fn save_preset(
        &mut self,
        session: &mut Session,
        text: &str,
        turn: &mut Turn,
    ) -> Result<(), StoreError> {
        let name = match parse_preset_name(text) {
            Ok(name) => name,
            Err(e) => {
                turn.say(render::input_error(&e));
                return Ok(());
            }
        };
        match self
            .sessions
            .drafts_mut()
            .save_preset(session.chat_id, &name, &session.token)
        {
            Ok(()) => turn.say(render::preset_saved(&name)),
            Err(StoreError::TooManyPresets(max)) => {
                turn.say(format!("⚠️ You already have {max} presets. /delete one first."));
            }
            Err(e) => return Err(e),
        }
        if session.state == ConversationState::MenuProfileSave {
            session.state = ConversationState::Collecting;
        }
        Ok(())
    }

    fn load_preset(
        &mut self,
        session: &mut Session,
        text: &str,
        turn: &mut Turn,
    ) -> Result<(), StoreError> {
        let Some((name, draft)) = self.sessions.drafts().load_preset(session.chat_id, text.trim())
        else {
            turn.say(render::preset_missing(text.trim()));
            return Ok(());
        };
        session.token = draft;
        session.state = ConversationState::Collecting;
        self.sessions.persist(session)?;
        turn.say(render::preset_loaded(&name));
        check_readiness(session, turn);
        Ok(())
    }

    fn delete_preset(
        &mut self,
        session: &mut Session,
        text: &str,
        turn: &mut Turn,
    ) -> Result<(), StoreError> {
        match self
            .sessions
            .drafts_mut()
            .delete_preset(session.chat_id, text.trim())?
        {
            Some(name) => turn.say(render::preset_deleted(&name)),
            None => turn.say(render::preset_missing(text.trim())),
        }
        if session.state == ConversationState::MenuProfileDelete {
            session.state = ConversationState::Collecting;
        }
        Ok(())
    }

    async fn commit(&mut self, session: &mut Session, turn: &mut Turn) -> Result<(), StoreError> {
        if !session.begin_deploy() {
            turn.say(render::deploy_in_flight());
            return Ok(());
        }
        let result = self.run_deploy(session, turn).await;
        session.finish_deploy();
        result
    }

    async fn run_deploy(&mut self, session: &mut Session, turn: &mut Turn) -> Result<(), StoreError> {
        session.state = ConversationState::Collecting;

        let status = get_ready_status(&session.token);
        if !status.ready {
            turn.say(render::not_ready(&status));
            return Ok(());
        }
        let validated = match create_config_from_session(&session.token, self.deployer_address.as_deref())
            .and_then(validate_config)
        {
            Ok(validated) => validated,
            Err(e) => {
                warn!(chat_id = session.chat_id, error = %e, "Deploy config rejected");
                turn.say(render::config_rejected(&e.to_string()));
                return Ok(());
            }
        };
        let Some(deployer) = self.deployer.clone() else {
            turn.say(render::deploy_unavailable());
            return Ok(());
        };

        info!(chat_id = session.chat_id, symbol = %validated.config.symbol, "Deploying token");
        let outcome = deployer.deploy(&validated.config).await;
        if outcome.success {
            info!(chat_id = session.chat_id, address = ?outcome.address, "Deploy succeeded");
            let mut text = render::deploy_succeeded(&validated.config, &outcome);
            let warnings: Vec<_> = validated.warnings().cloned().collect();
            if !warnings.is_empty() {
                text.push_str("\n\n");
                text.push_str(&render::notes(&warnings));
            }
            turn.say(text);
            *session = self.sessions.fresh_session(session.chat_id, false)?;
        } else {
            warn!(chat_id = session.chat_id, error = ?outcome.error, "Deploy failed");
            turn.say(render::deploy_failed(&outcome));
        }
        Ok(())
    }
}

/// Moves a ready draft to `confirming` with a summary, or reports what's missing.
fn check_readiness(session: &mut Session, turn: &mut Turn) {
    let status = get_ready_status(&session.token);
    if status.ready {
        session.state = ConversationState::Confirming;
        turn.say_with(render::confirm_prompt(&session.token), render::confirm_keyboard());
    } else {
        if session.state == ConversationState::Confirming {
            session.state = ConversationState::Collecting;
        }
        turn.say(render::not_ready(&status));
    }
}

fn advance_wizard(session: &mut Session, turn: &mut Turn) {
    match session.state.next_wizard_step() {
        Some(next) => {
            session.state = next;
            turn.say(render::wizard_prompt(next, &session.token));
        }
        None => {
            session.state = ConversationState::Collecting;
            check_readiness(session, turn);
        }
    }
}

/// Rewrites the answered prompt so its buttons can't be pressed again.
fn close_confirm_prompt(
    session: &Session,
    message_id: Option<i64>,
    deploying: bool,
    turn: &mut Turn,
) {
    if let Some(message_id) = message_id {
        turn.actions.push(OutboundAction::Edit {
            message_id,
            text: render::confirm_closed(&session.token, deploying),
        });
    }
}

fn abort(session: &mut Session, turn: &mut Turn) {
    session.state = ConversationState::Collecting;
    turn.say(render::deploy_aborted());
}

fn reject_upload(message_id: i64, turn: &mut Turn) {
    turn.actions.push(OutboundAction::Delete { message_id });
    turn.say(render::upload_rejected());
}

fn menu_state(field: &str) -> Option<ConversationState> {
    Some(match field {
        "name" => ConversationState::MenuName,
        "symbol" => ConversationState::MenuSymbol,
        "fees" => ConversationState::MenuFees,
        "context" => ConversationState::MenuContext,
        "image" => ConversationState::MenuImage,
        "spoof" => ConversationState::MenuSpoof,
        "save" => ConversationState::MenuProfileSave,
        "load" => ConversationState::MenuProfileLoad,
        "delete" => ConversationState::MenuProfileDelete,
        _ => return None,
    })
}

/// Splits `/cmd@bot args` into the command and its arguments.
fn parse_command(text: &str) -> (&str, &str) {
    let (first, rest) = text
        .split_once(char::is_whitespace)
        .unwrap_or((text, ""));
    let command = first.split('@').next().unwrap_or(first);
    (command, rest.trim())
}
