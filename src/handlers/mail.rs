//! Mail: inbox listing, reading, deleting, and line-buffered composition.
//!
//! While a composition is open, raw input lines land here instead of the
//! parser; a lone `.` seals and sends the letter. Delivery reaches online
//! players in memory and offline players through the repository.

use crate::engine::Engine;
use crate::mail::{deliver, MailCompose, MailMessage};
use crate::parser::{parse, Command, MailCommand};
use crate::types::SessionId;

pub async fn handle(engine: &mut Engine, session: SessionId, command: MailCommand) {
    match command {
        MailCommand::List => list(engine, session).await,
        MailCommand::Read(n) => read(engine, session, n).await,
        MailCommand::Delete(n) => delete(engine, session, n).await,
        MailCommand::Send(name) => begin_compose(engine, session, &name).await,
        MailCommand::Abort => abort(engine, session).await,
    }
}

/// Inbox position (stored ascending by send time) for a 1-based
/// newest-first display index.
fn inbox_position(len: usize, display_index: usize) -> Option<usize> {
    if display_index == 0 || display_index > len {
        return None;
    }
    Some(len - display_index)
}

async fn list(engine: &mut Engine, session: SessionId) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    if player.inbox.is_empty() {
        engine.bus.send_text(session, "Your inbox is empty.").await;
        return;
    }
    let lines: Vec<String> = player
        .inbox
        .iter()
        .rev()
        .enumerate()
        .map(|(i, message)| {
            format!(
                "{:>3}. From {} ({}){}",
                i + 1,
                message.from_name,
                message.sent_at_display(),
                if message.read { "" } else { " [NEW]" },
            )
        })
        .collect();
    engine.bus.send_text(session, "Your mail:").await;
    for line in lines {
        engine.bus.send_text(session, line).await;
    }
}

async fn read(engine: &mut Engine, session: SessionId, display_index: usize) {
    let Some(player) = engine.players.get_mut(session) else {
        return;
    };
    let Some(at) = inbox_position(player.inbox.len(), display_index) else {
        engine.bus.send_error(session, "No such message.").await;
        return;
    };
    let message = &mut player.inbox[at];
    message.read = true;
    let header = format!("From {} ({}):", message.from_name, message.sent_at_display());
    let body = message.body.clone();
    engine.players.mark_dirty(session);
    engine.bus.send_text(session, header).await;
    for line in body.lines() {
        engine.bus.send_text(session, line.to_string()).await;
    }
}

async fn delete(engine: &mut Engine, session: SessionId, display_index: usize) {
    let Some(player) = engine.players.get_mut(session) else {
        return;
    };
    let Some(at) = inbox_position(player.inbox.len(), display_index) else {
        engine.bus.send_error(session, "No such message.").await;
        return;
    };
    player.inbox.remove(at);
    engine.players.mark_dirty(session);
    engine.bus.send_text(session, "Message deleted.").await;
}

async fn begin_compose(engine: &mut Engine, session: SessionId, recipient: &str) {
    // Recipient must exist somewhere: online here, or on record.
    let known = engine.players.by_name(recipient).is_some()
        || matches!(engine.player_repo.find_by_name(recipient), Ok(Some(_)));
    if !known {
        engine.bus.send_error(session, "No such player.").await;
        return;
    }
    let Some(player) = engine.players.get_mut(session) else {
        return;
    };
    player.mail_compose = Some(MailCompose::new(recipient));
    engine
        .bus
        .send_info(
            session,
            format!("Composing to {}. End with a single '.' on its own line.", recipient),
        )
        .await;
}

async fn abort(engine: &mut Engine, session: SessionId) {
    let Some(player) = engine.players.get_mut(session) else {
        return;
    };
    if player.mail_compose.take().is_none() {
        engine
            .bus
            .send_error(session, "You aren't composing anything.")
            .await;
        return;
    }
    engine.bus.send_info(session, "Letter discarded.").await;
}

/// Raw input while a composition is open.
pub async fn compose_line(engine: &mut Engine, session: SessionId, line: &str) {
    let trimmed = line.trim();

    if trimmed == "." {
        finish_compose(engine, session).await;
        return;
    }
    // `mail abort` still works inside a composition; a second `mail send`
    // is a conflict. Anything else is body text.
    match parse(trimmed) {
        Command::Mail(MailCommand::Abort) => {
            abort(engine, session).await;
            return;
        }
        Command::Mail(MailCommand::Send(_)) => {
            engine
                .bus
                .send_error(session, "You are already composing a letter.")
                .await;
            return;
        }
        _ => {}
    }

    let Some(player) = engine.players.get_mut(session) else {
        return;
    };
    let Some(compose) = player.mail_compose.as_mut() else {
        return;
    };
    if compose.push_line(line).is_err() {
        engine
            .bus
            .send_error(session, "The letter is overlong; that line was dropped.")
            .await;
    }
}

async fn finish_compose(engine: &mut Engine, session: SessionId) {
    let (from_name, compose) = {
        let Some(player) = engine.players.get_mut(session) else {
            return;
        };
        let Some(compose) = player.mail_compose.clone() else {
            return;
        };
        (player.name.clone(), compose)
    };

    let Some(body) = compose.body() else {
        engine
            .bus
            .send_error(session, "The letter is empty; write something or 'mail abort'.")
            .await;
        return;
    };

    let message = MailMessage::new(from_name, body, engine.now());
    let recipient = compose.recipient_name.clone();

    if let Some(target_session) = engine.players.session_by_name(&recipient) {
        if let Some(target) = engine.players.get_mut(target_session) {
            deliver(&mut target.inbox, message);
        }
        engine.players.mark_dirty(target_session);
        engine
            .bus
            .send_info(target_session, "You have new mail.")
            .await;
    } else {
        // Offline delivery through the repository.
        match engine.player_repo.find_by_name(&recipient) {
            Ok(Some(mut record)) => {
                deliver(&mut record.inbox, message);
                if let Err(e) = engine.player_repo.save(&record) {
                    tracing::warn!(to = %recipient, error = %e, "offline mail delivery failed");
                    engine
                        .bus
                        .send_error(session, "The courier loses your letter. Try again.")
                        .await;
                    return;
                }
            }
            Ok(None) => {
                engine.bus.send_error(session, "No such player.").await;
                if let Some(player) = engine.players.get_mut(session) {
                    player.mail_compose = None;
                }
                return;
            }
            Err(e) => {
                tracing::warn!(to = %recipient, error = %e, "offline mail delivery failed");
                engine
                    .bus
                    .send_error(session, "The courier loses your letter. Try again.")
                    .await;
                return;
            }
        }
    }

    if let Some(player) = engine.players.get_mut(session) {
        player.mail_compose = None;
    }
    engine
        .bus
        .send_info(session, format!("Your letter to {} is sent.", recipient))
        .await;
}
