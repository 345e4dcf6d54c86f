// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn ws_user_id_parses_from_query() {
    assert_eq!(ws_user_id("userId=42"), Some(42));
    assert_eq!(ws_user_id("foo=bar&userId=7&x=1"), Some(7));
    assert_eq!(ws_user_id("userId=abc"), None);
    assert_eq!(ws_user_id(""), None);
}
