#![forbid(unsafe_code)]
#![warn(
    clippy::cognitive_complexity,
    clippy::dbg_macro,
    clippy::debug_assert_with_mut_call,
    clippy::doc_link_with_quotes,
    clippy::doc_markdown,
    clippy::empty_line_after_outer_attr,
    clippy::empty_structs_with_brackets,
    keyword_idents,
    clippy::missing_const_for_fn,
    missing_debug_implementations,
    // clippy::missing_errors_doc,
    // clippy::missing_panics_doc,
    clippy::mod_module_files,
    non_ascii_idents,
    noop_method_call,
    clippy::print_stderr,
    // clippy::print_stdout,
    clippy::semicolon_if_nothing_returned,
    clippy::unseparated_literal_suffix,
    clippy::shadow_unrelated,
    clippy::similar_names,
    unused_crate_dependencies,
    unused_extern_crates,
    unused_import_braces,
    clippy::unused_self,
    clippy::used_underscore_binding,
    clippy::useless_let_if_seq,
    clippy::wildcard_imports
)]

#[macro_use]
extern crate lazy_static;

pub mod aggregator;
pub mod app_config;
pub mod app_state;
pub mod command_line;
pub mod database_manager;
pub mod editor_counter;
pub mod editor_filter;
pub mod editor_source;
pub mod identifier_source;
pub mod kv_store;
pub mod pipeline;
pub mod publisher;
pub mod render_wikitext;
pub mod sitelinks;
pub mod sql_utils;
pub mod wiki_site;

use tracing_subscriber as _;

#[cfg(test)]
use tempfile as _;
