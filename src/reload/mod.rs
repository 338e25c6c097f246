//! # Live Reload
//!
//! A LiveReload v7 compatible server. Browsers load `/livereload.js`, open a
//! WebSocket and get a `reload` message for every changed output file.
//!
//! | Route | Response |
//! |-------|----------|
//! | `GET /` | Server status JSON |
//! | `GET /livereload.js` | Client script |
//! | `GET /changed?files=a,b` | Broadcasts a reload for each file |
//! | `POST /changed` | Same, for a JSON body `{"files": [...]}` |
//! | `GET /livereload` (WebSocket) | Protocol v7 session |

mod protocol;
mod server;

pub use protocol::{
    changed_files, reply_to, ChangedBody, ChangedQuery, ServerMessage, CLIENT_SCRIPT, PROTOCOL_V7, SERVER_NAME,
};
pub use server::{ReloadError, ReloadServer};
