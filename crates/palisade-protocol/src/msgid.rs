//! Message id constants.
//!
//! Ids are grouped into closed bands (see [`route_for`](crate::route_for)):
//!
//! ```text
//! [   1,  999]  Gate control   (resume, heartbeat, session init, errors)
//! [1001, 1999]  Login          → Service/login
//! [2001, 2999]  Chat           → Service/chat
//! [3001, 3999]  Game logic     → Game
//! ```
//!
//! Gate-band payloads never leave the Gate; the pool keep-alives
//! (`SERVICE_PING`/`SERVICE_PONG`) exist only on the Gate↔Service link.

// ----- Gate control band [1, 999] -----

pub const RESUME_REQ: i32 = 1;
pub const RESUME_RSP: i32 = 2;
pub const SESSION_INIT: i32 = 3;

pub const HEARTBEAT_REQ: i32 = 10;
pub const HEARTBEAT_RSP: i32 = 11;

/// Gate↔Service pool keep-alive; keeps NAT state warm between tiers.
pub const SERVICE_PING: i32 = 12;
pub const SERVICE_PONG: i32 = 13;

pub const ERROR_RSP: i32 = 21;

// ----- Login band [1001, 1999] -----

pub const LOGIN_REQ: i32 = 1001;
pub const LOGIN_RSP: i32 = 1002;

// ----- Chat band [2001, 2999] -----

pub const CHAT_SEND_REQ: i32 = 2001;
pub const CHAT_SEND_RSP: i32 = 2002;
pub const CHAT_MESSAGE_PUSH: i32 = 2003;

// ----- Game band [3001, 3999] -----

pub const PLAYER_ENTER_GAME_REQ: i32 = 3001;
pub const PLAYER_ENTER_GAME_RSP: i32 = 3002;
pub const LOAD_PLAYER_DATA_REQ: i32 = 3003;
pub const LOAD_PLAYER_DATA_RSP: i32 = 3004;
pub const PLAYER_RESUME_REQ: i32 = 3005;
pub const PLAYER_OFFLINE_NOTIFY: i32 = 3006;
