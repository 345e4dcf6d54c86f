// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier handling for the two address spaces the network uses: the
//! classical phone-form JID and the opaque Linked Identity (LID) form.
//! Reply routing always threads the original remote JID; this module only
//! decides what we can record as a phone number.

use serde::Serialize;

/// Longest a real E.164 number can be. Anything longer is a LID.
const MAX_PHONE_DIGITS: usize = 15;

/// A parsed sender identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Identity {
    Phone(String),
    Lid(String),
}

impl Identity {
    /// The normalized phone number, when this identity has one.
    pub fn phone(&self) -> Option<&str> {
        match self {
            Self::Phone(p) => Some(p),
            Self::Lid(_) => None,
        }
    }

    /// Stable identifier for contact rows: the phone, or a `LID_<digits>`
    /// pseudo-identifier for unresolved linked identities.
    pub fn record_key(&self) -> String {
        match self {
            Self::Phone(p) => p.clone(),
            Self::Lid(digits) => format!("LID_{digits}"),
        }
    }

    pub fn is_lid(&self) -> bool {
        matches!(self, Self::Lid(_))
    }
}

/// Digits-only phone normalization; a leading `0` is rewritten to the
/// `62` country prefix. Idempotent.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if let Some(rest) = digits.strip_prefix('0') {
        format!("62{rest}")
    } else {
        digits
    }
}

/// The identifier part of a JID, before the `@`.
pub fn jid_user(jid: &str) -> &str {
    jid.split('@').next().unwrap_or(jid).split(':').next().unwrap_or(jid)
}

/// Whether a remote JID addresses a group conversation.
pub fn is_group_jid(jid: &str) -> bool {
    jid.ends_with("@g.us")
}

/// Parse a sender JID into an identity. The `@lid` server marker and
/// over-long digit runs both indicate a linked identity.
pub fn parse_identity(jid: &str) -> Identity {
    let user = jid_user(jid);
    let digits: String = user.chars().filter(|c| c.is_ascii_digit()).collect();
    if jid.ends_with("@lid") || digits.len() > MAX_PHONE_DIGITS {
        Identity::Lid(digits)
    } else {
        Identity::Phone(normalize_phone(&digits))
    }
}

/// For a group message, identity comes from the participant JID; for a
/// direct chat, from the remote JID itself.
pub fn sender_identity(remote_jid: &str, participant: Option<&str>) -> Identity {
    if is_group_jid(remote_jid) {
        match participant {
            Some(p) => parse_identity(p),
            None => Identity::Lid(String::new()),
        }
    } else {
        parse_identity(remote_jid)
    }
}

#[cfg(test)]
#[path = "jid_tests.rs"]
mod tests;
