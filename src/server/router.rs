//! Frame routing.
//!
//! Given a frame received on a session, rewrite its source to the sender's
//! authenticated identity, select recipients from the destination fields,
//! and fan the frame out. Frames addressed to user 0 are for the server
//! itself and go to the local callback hub instead of the wire.
//!
//! Fan-out is sequential and forgiving: a recipient whose send fails is
//! logged and skipped, never torn down here (its own receive loop will
//! notice the broken connection).

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::session::{Session, SessionManager};
use crate::callbacks::{CallbackHub, dispatch_frame};
use crate::core::{SERVER_USER_ID, WILDCARD_ID};
use crate::transport::{Frame, TransportError};

/// Recipient set computed from a frame's destination fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    /// Deliver to the server's own callbacks; nothing is forwarded.
    Local,
    /// Every session except the sender.
    BroadcastExcept(u64),
    /// Every session in the group, sender included if it matches.
    Group(u32),
    /// Every session of the user, sender included if it matches.
    User(u32),
    /// Sessions matching both user and group.
    UserAndGroup(u32, u32),
}

fn classify(frame: &Frame, sender_session_id: u64) -> Route {
    match (frame.dest_user_id, frame.dest_group_id) {
        (SERVER_USER_ID, _) => Route::Local,
        (WILDCARD_ID, WILDCARD_ID) => Route::BroadcastExcept(sender_session_id),
        (WILDCARD_ID, group) => Route::Group(group),
        (user, WILDCARD_ID) => Route::User(user),
        (user, group) => Route::UserAndGroup(user, group),
    }
}

/// Stamp the sender's identity into the source fields.
///
/// Mandatory before any forwarding so recipients see the authentic origin
/// rather than whatever the sender claimed.
fn rewrite_source(frame: &mut Frame, sender: &Session) {
    if frame.src_user_id == 0 || frame.src_user_id == WILDCARD_ID {
        frame.src_user_id = sender.user_id();
    }
    if frame.src_group_id == 0 {
        frame.src_group_id = sender.group_id();
    }
}

/// Route one frame received on `sender`.
pub(crate) async fn route_frame(
    manager: &SessionManager,
    hub: &CallbackHub,
    sender: &Session,
    mut frame: Frame,
    send_timeout: Option<Duration>,
) {
    rewrite_source(&mut frame, sender);

    let route = classify(&frame, sender.session_id());
    debug!(session_id = sender.session_id(), ?route, "routing frame");
    let recipients = match route {
        Route::Local => {
            dispatch_frame(hub, &frame);
            return;
        }
        Route::BroadcastExcept(sender_id) => {
            let mut all = manager.snapshot_all();
            all.retain(|s| s.session_id() != sender_id);
            all
        }
        Route::Group(group_id) => manager.snapshot_group(group_id),
        Route::User(user_id) => manager.snapshot_user(user_id),
        Route::UserAndGroup(user_id, group_id) => manager.snapshot_user_group(user_id, group_id),
    };

    deliver(hub, &recipients, &frame, send_timeout).await;
}

/// Owner-initiated delivery (not a forward, so there is no sender to skip).
///
/// A user-specific destination goes to that user's sessions; otherwise a
/// group-specific destination goes to that group; otherwise every live
/// session gets a copy.
pub(crate) async fn send_from_server(
    manager: &SessionManager,
    hub: &CallbackHub,
    frame: &Frame,
    send_timeout: Option<Duration>,
) {
    let recipients = if frame.dest_user_id != SERVER_USER_ID && frame.dest_user_id != WILDCARD_ID {
        manager.snapshot_user(frame.dest_user_id)
    } else if frame.dest_group_id != 0 && frame.dest_group_id != WILDCARD_ID {
        manager.snapshot_group(frame.dest_group_id)
    } else {
        manager.snapshot_all()
    };

    deliver(hub, &recipients, frame, send_timeout).await;
}

/// Sequential fan-out. Failures are logged and skipped.
async fn deliver(
    hub: &CallbackHub,
    recipients: &[Arc<Session>],
    frame: &Frame,
    send_timeout: Option<Duration>,
) {
    for session in recipients {
        if !session.is_alive() {
            continue;
        }
        let result = match send_timeout {
            Some(limit) => match tokio::time::timeout(limit, session.send(frame)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout),
            },
            None => session.send(frame).await,
        };
        if let Err(e) = result {
            warn!(session_id = session.session_id(), error = %e, "send failed during fan-out");
            hub.raise_log_message(&format!(
                "send to session {} failed: {e}",
                session.session_id()
            ));
        }
    }
}
