//! Path rewriting and Markdown text passes for published notebooks.
//!
//! - [`rewrite`] rewrites recognizable path tokens (links, `src`/`href`
//!   attributes, relative string literals, module imports) and nothing else
//! - [`fragment`] reduces a notebook to a website Markdown fragment and
//!   splices web-content regions between documents
//! - [`passes`] holds the small `&str -> String` text passes shared by the
//!   website and notebook finishers

pub mod fragment;
pub mod passes;
pub mod rewrite;

pub use fragment::{Injection, inject_web_content, render_fragment, select_web_content, web_source_reference};
pub use rewrite::{PathToken, RewriteRule, Rewritten, TokenKind, rewrite, scan_tokens};
