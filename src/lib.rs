//! Read and edit a `wp-config.php` script as a key-value store.
//!
//! Lookups run the script in a sandboxed evaluator and report the constants,
//! variables and included files it defines ([`Reader`]). Edits are made
//! lexically, leaving the rest of the file byte for byte intact
//! ([`FileTransformer`]). [`ConfigStore`] ties the two together.

mod discover;
mod error;
mod eval;
mod lexer;
mod model;
mod reader;
mod remote;
mod salts;
mod store;
mod syntax;
mod template;
mod transformer;

pub use discover::{CONFIG_FILE_NAME, creation_target, find_upward, resolve_existing};
pub use error::{Error, ScriptError, ScriptErrorKind};
pub use eval::{Bindings, Scope, Snapshot, execute_file, execute_source};
pub use lexer::Span;
pub use model::{
    Anchor, CACHE_KEY_SALT, DEFAULT_ANCHOR, Entry, EntryKind, MutationOptions, Placement,
    SALT_KEYS, SetOutcome, ShuffleReport, TypeFilter, Value,
};
pub use reader::{Reader, diff, read_entries};
pub use remote::{DEFAULT_SALT_URL, RemoteSaltService, SALT_URL_ENV, SaltSource};
pub use salts::{
    DEFAULT_KEY_LENGTH, KEY_ALPHABET, generate_key, generate_key_with, generate_salt_set,
    is_salt_key, parse_salts,
};
pub use store::{ConfigStore, CreateOptions};
pub use syntax::{Program, parse_program};
pub use template::render as render_template;
pub use transformer::{FileTransformer, Transformer, quote_literal};
