//! The dogma data model: revisions, authors, entries, changes, commits.

mod author;
mod change;
mod commit;
mod entry;
mod revision;

pub use author::Author;
pub use change::{Change, ChangeContent};
pub use commit::{Commit, CommitMessage, Markup, decode_message, encode_message};
pub use entry::{Entry, EntryContent, EntryType};
pub use revision::Revision;
